// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::drive::{ChassisSpeeds, VisionMeasurement};
use crate::geometry::{Pose2d, Rotation2d};

// Command from teleop/autonomous -> runtime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChassisCommand {
    /// m/s, forward
    pub vx: f64,
    /// m/s, left
    pub vy: f64,
    /// rad/s, counter-clockwise
    pub omega: f64,
    /// Interpret vx/vy in the field frame
    #[serde(default)]
    pub field_relative: bool,
}

impl From<&ChassisCommand> for ChassisSpeeds {
    fn from(cmd: &ChassisCommand) -> Self {
        Self::new(cmd.vx, cmd.vy, cmd.omega)
    }
}

// Camera pose estimate -> runtime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisionMessage {
    pub x: f64,
    pub y: f64,
    /// rad
    pub heading: f64,
    /// Seconds between capture and publish
    #[serde(default)]
    pub latency: f64,
    #[serde(default)]
    pub std_devs: Option<[f64; 3]>,
}

impl VisionMessage {
    /// Place the capture on the runtime clock given the receive time
    pub fn into_measurement(self, received_at: f64) -> VisionMeasurement {
        VisionMeasurement {
            pose: Pose2d::new(self.x, self.y, Rotation2d::from_radians(self.heading)),
            timestamp: received_at - self.latency.max(0.0),
            std_devs: self.std_devs,
        }
    }
}

// Fused pose published by runtime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseReport {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
    pub timestamp: f64,
}

impl PoseReport {
    pub fn new(pose: Pose2d, speeds: ChassisSpeeds, timestamp: f64) -> Self {
        Self {
            x: pose.x(),
            y: pose.y(),
            heading: pose.heading.radians(),
            vx: speeds.vx,
            vy: speeds.vy,
            omega: speeds.omega,
            timestamp,
        }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_defaults_robot_relative() {
        let cmd: ChassisCommand =
            serde_json::from_str(r#"{"vx": 1.0, "vy": 0.5, "omega": 0.0}"#).unwrap();
        assert!(!cmd.field_relative);
        assert_eq!(ChassisSpeeds::from(&cmd), ChassisSpeeds::new(1.0, 0.5, 0.0));
    }

    #[test]
    fn test_vision_latency_backdates_timestamp() {
        let msg: VisionMessage = serde_json::from_str(
            r#"{"x": 1.0, "y": 2.0, "heading": 0.5, "latency": 0.1}"#,
        )
        .unwrap();
        let measurement = msg.into_measurement(3.0);
        assert!((measurement.timestamp - 2.9).abs() < 1e-12);
        assert_eq!(measurement.pose.x(), 1.0);
        assert!(measurement.std_devs.is_none());
    }

    #[test]
    fn test_health_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RuntimeHealth::CmdStale).unwrap(),
            "\"cmd_stale\""
        );
    }
}
