// Timeouts, topics, drivetrain configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::drive::{EstimatorConfig, SwerveDriveConfig};
use crate::error::ConfigError;
use crate::geometry::Translation2d;
use crate::motor::{ConversionFactor, SimMotorConfig};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_CHASSIS: &str = "frc/cmd/chassis"; // commands
pub const TOPIC_VISION_POSE: &str = "frc/vision/pose"; // camera pose estimates
pub const TOPIC_STATE_POSE: &str = "frc/state/pose"; // fused pose
pub const TOPIC_HEALTH: &str = "frc/state/health"; // health status

/// Where one swerve module sits on the chassis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    /// Forward offset from robot center, m
    pub x: f64,
    /// Left offset from robot center, m
    pub y: f64,
}

/// Swerve drivetrain description, loaded from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveConfig {
    pub modules: Vec<ModuleConfig>,
    pub wheel_radius: f64,
    /// Drive motor turns per wheel turn
    pub drive_reduction: f64,
    pub max_speed: f64,
    #[serde(default)]
    pub drive_motor: SimMotorConfig,
    #[serde(default = "default_steer_motor")]
    pub steer_motor: SimMotorConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
}

// The simulated steering motor stands for the module azimuth itself
fn default_steer_motor() -> SimMotorConfig {
    SimMotorConfig {
        free_speed: 40.0,
        position_tolerance: 0.02,
        velocity_tolerance: 0.5,
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        // 0.6 m square base with 4 inch wheels
        let half = 0.3;
        let modules = [
            ("front_left", half, half),
            ("front_right", half, -half),
            ("back_left", -half, half),
            ("back_right", -half, -half),
        ]
        .into_iter()
        .map(|(name, x, y)| ModuleConfig {
            name: name.to_string(),
            x,
            y,
        })
        .collect();

        Self {
            modules,
            wheel_radius: 0.0508,
            drive_reduction: 6.12,
            max_speed: 4.5,
            drive_motor: SimMotorConfig::default(),
            steer_motor: default_steer_motor(),
            estimator: EstimatorConfig::default(),
        }
    }
}

impl DriveConfig {
    /// Read and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        info!(
            "Loaded drive config from {} ({} modules)",
            path.display(),
            config.modules.len()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.modules.len() < 2 {
            return Err(ConfigError::Invalid(format!(
                "need at least 2 swerve modules, got {}",
                self.modules.len()
            )));
        }
        if !(self.max_speed.is_finite() && self.max_speed > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "max_speed must be positive, got {}",
                self.max_speed
            )));
        }
        if let Some(m) = self.modules.iter().find(|m| !(m.x.is_finite() && m.y.is_finite())) {
            return Err(ConfigError::Invalid(format!(
                "module {} has a non-finite position",
                m.name
            )));
        }
        self.drive_factor()?;
        Ok(())
    }

    /// Wheel meters per drive-motor radian
    pub fn drive_factor(&self) -> Result<ConversionFactor, ConfigError> {
        Ok(ConversionFactor::from_wheel_and_reduction(
            self.wheel_radius,
            self.drive_reduction,
        )?)
    }

    pub fn translations(&self) -> Vec<Translation2d> {
        self.modules
            .iter()
            .map(|m| Translation2d::new(m.x, m.y))
            .collect()
    }

    pub fn swerve_drive_config(&self) -> SwerveDriveConfig {
        SwerveDriveConfig {
            max_speed: self.max_speed,
            estimator: self.estimator,
        }
    }
}
