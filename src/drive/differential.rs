// Differential (tank) drivetrain
//
// Two wheel sides driven in linear units, a gyro and a pose estimator.
// Closed-loop commands go through DifferentialKinematics; open-loop tank and
// arcade commands mix raw output fractions.

use tracing::debug;

use super::gyro::Gyro;
use super::kinematics::{
    ChassisSpeeds, DifferentialKinematics, DifferentialWheelSpeeds, check_max_speed,
};
use super::pose::{EstimatorConfig, PoseEstimator, SharedPoseEstimator};
use crate::error::{DriveError, KinematicsError};
use crate::geometry::Pose2d;
use crate::motor::capability::{Encoder, FeedbackVelocityController};
use crate::motor::units::Linear;

/// Mix throttle and turn into (left, right) output fractions.
///
/// If either side exceeds [-1, 1] both are divided by the larger magnitude,
/// preserving their ratio. Positive turn is counter-clockwise.
pub fn arcade_mix(throttle: f64, turn: f64) -> (f64, f64) {
    let left = throttle - turn;
    let right = throttle + turn;
    let largest = left.abs().max(right.abs());
    if largest > 1.0 {
        (left / largest, right / largest)
    } else {
        (left, right)
    }
}

pub struct DifferentialDrive<W, G> {
    left: W,
    right: W,
    kinematics: DifferentialKinematics,
    gyro: G,
    estimator: SharedPoseEstimator,
    last_distances: (f64, f64),
    max_speed: f64,
}

impl<W, G> DifferentialDrive<W, G>
where
    W: FeedbackVelocityController<Linear>,
    G: Gyro,
{
    pub fn new(
        left: W,
        right: W,
        kinematics: DifferentialKinematics,
        gyro: G,
        max_speed: f64,
        estimator: EstimatorConfig,
    ) -> Result<Self, KinematicsError> {
        let max_speed = check_max_speed(max_speed)?;
        let estimator = SharedPoseEstimator::new(PoseEstimator::new(
            estimator,
            Pose2d::default(),
            gyro.heading(),
        ));
        let last_distances = (left.position(), right.position());
        debug!(
            "Differential drive, track width {:.3} m",
            kinematics.track_width()
        );
        Ok(Self {
            left,
            right,
            kinematics,
            gyro,
            estimator,
            last_distances,
            max_speed,
        })
    }

    pub fn left(&self) -> &W {
        &self.left
    }

    pub fn right(&self) -> &W {
        &self.right
    }

    pub fn estimator(&self) -> SharedPoseEstimator {
        self.estimator.clone()
    }

    /// Closed-loop drive; `speeds.vy` is ignored
    pub fn drive_chassis_speeds(
        &mut self,
        speeds: ChassisSpeeds,
    ) -> Result<(), DriveError<W::Error>> {
        let wheels = self
            .kinematics
            .to_wheel_speeds(speeds)
            .desaturate(self.max_speed);
        self.set_wheel_speeds(wheels)
    }

    pub fn set_wheel_speeds(
        &mut self,
        wheels: DifferentialWheelSpeeds,
    ) -> Result<(), DriveError<W::Error>> {
        self.left
            .set_target_velocity(wheels.left)
            .map_err(|error| side_error(0, error))?;
        self.right
            .set_target_velocity(wheels.right)
            .map_err(|error| side_error(1, error))
    }

    /// Measured chassis motion
    pub fn chassis_speeds(&self) -> ChassisSpeeds {
        self.kinematics.to_chassis_speeds(DifferentialWheelSpeeds {
            left: self.left.velocity(),
            right: self.right.velocity(),
        })
    }

    /// Open-loop output per side, clamped to [-1, 1]
    pub fn tank(&mut self, left: f64, right: f64) -> Result<(), DriveError<W::Error>> {
        self.left
            .set_open_loop_power(left.clamp(-1.0, 1.0))
            .map_err(|error| side_error(0, error))?;
        self.right
            .set_open_loop_power(right.clamp(-1.0, 1.0))
            .map_err(|error| side_error(1, error))
    }

    pub fn arcade(&mut self, throttle: f64, turn: f64) -> Result<(), DriveError<W::Error>> {
        let (left, right) = arcade_mix(throttle, turn);
        self.tank(left, right)
    }

    pub fn stop(&mut self) -> Result<(), DriveError<W::Error>> {
        self.left.stop().map_err(|error| side_error(0, error))?;
        self.right.stop().map_err(|error| side_error(1, error))
    }

    pub fn disable(&mut self) -> Result<(), DriveError<W::Error>> {
        self.left.disable().map_err(|error| side_error(0, error))?;
        self.right.disable().map_err(|error| side_error(1, error))
    }

    pub fn update_pose(&mut self, timestamp: f64) -> Pose2d {
        let distances = (self.left.position(), self.right.position());
        let twist = self.kinematics.to_twist(
            distances.0 - self.last_distances.0,
            distances.1 - self.last_distances.1,
        );
        self.last_distances = distances;
        self.estimator.update_pose(timestamp, self.gyro.heading(), twist)
    }

    pub fn pose(&self) -> Pose2d {
        self.estimator.pose()
    }

    pub fn reset_pose(&mut self, pose: Pose2d) {
        self.last_distances = (self.left.position(), self.right.position());
        self.estimator.reset_pose(pose, self.gyro.heading());
    }
}

fn side_error<E>(index: usize, error: E) -> DriveError<E> {
    DriveError::Module {
        index,
        name: if index == 0 { "left" } else { "right" }.to_string(),
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::adapter::{AngularAsLinear, as_linear};
    use crate::motor::capability::{Actuator, VelocityController};
    use crate::motor::sim::{SimGyro, SimMotor};
    use approx::assert_relative_eq;
    use std::time::Duration;

    #[test]
    fn test_arcade_mix_normalizes() {
        assert_eq!(arcade_mix(0.5, 0.0), (0.5, 0.5));
        assert_eq!(arcade_mix(0.0, 1.0), (-1.0, 1.0));
        assert_eq!(arcade_mix(1.0, 0.5), (0.5 / 1.5, 1.0));
    }

    type SimDifferential = DifferentialDrive<AngularAsLinear<SimMotor>, SimGyro>;

    fn sim_drive() -> (SimDifferential, SimMotor, SimMotor, SimGyro) {
        let left = SimMotor::default();
        let right = SimMotor::default();
        let gyro = SimGyro::new();
        let drive = DifferentialDrive::new(
            as_linear(left.clone(), 0.0762).unwrap(),
            as_linear(right.clone(), 0.0762).unwrap(),
            DifferentialKinematics::new(0.6).unwrap(),
            gyro.clone(),
            4.0,
            EstimatorConfig::default(),
        )
        .unwrap();
        (drive, left, right, gyro)
    }

    #[test]
    fn test_chassis_speeds_to_wheels() {
        let (mut drive, left, right, _) = sim_drive();
        drive.drive_chassis_speeds(ChassisSpeeds::new(1.0, 0.0, 1.0)).unwrap();
        assert_relative_eq!(drive.left().target_velocity(), 0.7, epsilon = 1e-9);
        assert_relative_eq!(drive.right().target_velocity(), 1.3, epsilon = 1e-9);

        left.step(Duration::from_millis(20));
        right.step(Duration::from_millis(20));
        let measured = drive.chassis_speeds();
        assert_relative_eq!(measured.vx, 1.0, epsilon = 1e-9);
        assert_relative_eq!(measured.omega, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rejects_non_positive_max_speed() {
        for max_speed in [-2.0, 0.0, f64::NAN] {
            let result = DifferentialDrive::new(
                as_linear(SimMotor::default(), 0.0762).unwrap(),
                as_linear(SimMotor::default(), 0.0762).unwrap(),
                DifferentialKinematics::new(0.6).unwrap(),
                SimGyro::new(),
                max_speed,
                EstimatorConfig::default(),
            );
            assert!(matches!(result, Err(KinematicsError::InvalidMaxSpeed { .. })));
        }
    }

    #[test]
    fn test_tank_is_open_loop() {
        let (mut drive, left, _, _) = sim_drive();
        drive.tank(2.0, -0.25).unwrap();
        assert_eq!(left.open_loop_power(), 1.0);
        assert_eq!(drive.right().open_loop_power(), -0.25);

        drive.stop().unwrap();
        assert_eq!(left.open_loop_power(), 0.0);
    }

    #[test]
    fn test_odometry_drives_straight() {
        let (mut drive, left, right, _) = sim_drive();
        drive.drive_chassis_speeds(ChassisSpeeds::new(2.0, 0.0, 0.0)).unwrap();
        for i in 1..=25 {
            left.step(Duration::from_millis(20));
            right.step(Duration::from_millis(20));
            drive.update_pose(i as f64 * 0.02);
        }
        assert_relative_eq!(drive.pose().x(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(drive.pose().y(), 0.0, epsilon = 1e-9);
    }
}
