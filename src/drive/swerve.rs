// Swerve modules and the swerve drivetrain
//
// A module is a steering position controller plus a drive velocity
// controller. Commands are optimized so steering never turns more than a
// quarter turn: driving backwards at angle + 180 deg is the same motion.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::gyro::Gyro;
use super::kinematics::{
    ChassisSpeeds, SwerveKinematics, check_max_speed, desaturate_wheel_speeds,
};
use super::pose::{EstimatorConfig, PoseEstimator, SharedPoseEstimator};
use crate::error::{DriveError, KinematicsError, ModuleError};
use crate::geometry::{Pose2d, Rotation2d, Translation2d, wrap_angle};
use crate::motor::capability::{Encoder, FeedbackPositionController, FeedbackVelocityController};
use crate::motor::units::{Angular, Linear};

/// Wheel speed (m/s, signed) and heading of one module
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleState {
    pub speed: f64,
    pub angle: Rotation2d,
}

/// Open-loop variant: drive output fraction in [-1, 1] and heading
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModulePower {
    pub power: f64,
    pub angle: Rotation2d,
}

/// Distance travelled by the wheel (m) and its heading
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModulePosition {
    pub distance: f64,
    pub angle: Rotation2d,
}

// Shared by speed and power commands. The boundary (exactly 90 deg) does
// not flip, and zero magnitudes flip like any other value so the quarter
// turn bound holds unconditionally.
fn optimize_command(value: f64, angle: Rotation2d, current: Rotation2d) -> (f64, Rotation2d) {
    let delta = current.delta_to(angle).radians();
    if delta.abs() > std::f64::consts::FRAC_PI_2 {
        (-value, (angle + Rotation2d::HALF_TURN).wrapped())
    } else {
        (value, angle.wrapped())
    }
}

/// Equivalent command that keeps steering travel from `current` within 90 deg
pub fn optimize(desired: ModuleState, current: Rotation2d) -> ModuleState {
    desired.optimize(current)
}

impl ModuleState {
    pub fn new(speed: f64, angle: Rotation2d) -> Self {
        Self { speed, angle }
    }

    pub fn optimize(self, current: Rotation2d) -> Self {
        let (speed, angle) = optimize_command(self.speed, self.angle, current);
        Self { speed, angle }
    }
}

impl ModulePower {
    pub fn new(power: f64, angle: Rotation2d) -> Self {
        Self { power, angle }
    }

    pub fn optimize(self, current: Rotation2d) -> Self {
        let (power, angle) = optimize_command(self.power, self.angle, current);
        Self { power, angle }
    }
}

/// One steerable, driven wheel.
///
/// `S` steers in radians of module heading; `D` drives in wheel-surface
/// meters (typically an angular motor wrapped with `as_linear`).
pub struct SwerveModule<S, D> {
    name: String,
    translation: Translation2d,
    steer: S,
    drive: D,
    target: ModuleState,
}

impl<S, D> SwerveModule<S, D>
where
    S: FeedbackPositionController<Angular>,
    D: FeedbackVelocityController<Linear>,
{
    pub fn new(name: impl Into<String>, translation: Translation2d, steer: S, drive: D) -> Self {
        Self {
            name: name.into(),
            translation,
            steer,
            drive,
            target: ModuleState::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mounting offset from robot center
    pub fn translation(&self) -> Translation2d {
        self.translation
    }

    /// Measured steering heading, wrapped
    pub fn angle(&self) -> Rotation2d {
        Rotation2d::from_radians(Encoder::<Angular>::position(&self.steer)).wrapped()
    }

    pub fn state(&self) -> ModuleState {
        ModuleState::new(Encoder::<Linear>::velocity(&self.drive), self.angle())
    }

    pub fn position(&self) -> ModulePosition {
        ModulePosition {
            distance: Encoder::<Linear>::position(&self.drive),
            angle: self.angle(),
        }
    }

    /// Last optimized command
    pub fn target_state(&self) -> ModuleState {
        self.target
    }

    pub fn at_target(&self) -> bool {
        self.steer.at_target_position() && self.drive.at_target_velocity()
    }

    /// Optimize against the measured heading, then steer and drive.
    ///
    /// The two writes are not atomic: if drive fails, steering already moved.
    /// The next control cycle re-commands both.
    pub fn set_state(
        &mut self,
        desired: ModuleState,
    ) -> Result<ModuleState, ModuleError<S::Error, D::Error>> {
        let optimized = desired.optimize(self.angle());
        self.steer_to(optimized.angle).map_err(ModuleError::Steer)?;
        self.drive
            .set_target_velocity(optimized.speed)
            .map_err(ModuleError::Drive)?;

        trace!(
            "{}: speed {:.3} m/s, angle {:.1} deg",
            self.name,
            optimized.speed,
            optimized.angle.degrees()
        );
        self.target = optimized;
        Ok(optimized)
    }

    /// Open-loop drive with optimized steering
    pub fn set_power(
        &mut self,
        desired: ModulePower,
    ) -> Result<ModulePower, ModuleError<S::Error, D::Error>> {
        let optimized = desired.optimize(self.angle());
        self.steer_to(optimized.angle).map_err(ModuleError::Steer)?;
        self.drive
            .set_open_loop_power(optimized.power)
            .map_err(ModuleError::Drive)?;
        self.target = ModuleState::new(0.0, optimized.angle);
        Ok(optimized)
    }

    pub fn stop(&mut self) -> Result<(), ModuleError<S::Error, D::Error>> {
        self.drive.stop().map_err(ModuleError::Drive)?;
        self.steer.stop().map_err(ModuleError::Steer)?;
        self.target.speed = 0.0;
        Ok(())
    }

    pub fn disable(&mut self) -> Result<(), ModuleError<S::Error, D::Error>> {
        self.drive.disable().map_err(ModuleError::Drive)?;
        self.steer.disable().map_err(ModuleError::Steer)?;
        self.target.speed = 0.0;
        Ok(())
    }

    pub fn reset_drive_distance(&mut self) -> Result<(), ModuleError<S::Error, D::Error>> {
        Encoder::<Linear>::set_encoder_position(&mut self.drive, 0.0).map_err(ModuleError::Drive)
    }

    // Steering encoders may be multi-turn; aim at the nearest equivalent
    // angle from where the module is now, not at the wrapped value.
    fn steer_to(&mut self, angle: Rotation2d) -> Result<(), S::Error> {
        let measured = Encoder::<Angular>::position(&self.steer);
        let target = measured + wrap_angle(angle.radians() - measured);
        self.steer.set_target_position(target)
    }
}

/// Drivetrain settings shared by all modules
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwerveDriveConfig {
    /// Fastest any wheel may be asked to go, m/s
    pub max_speed: f64,
    pub estimator: EstimatorConfig,
}

impl Default for SwerveDriveConfig {
    fn default() -> Self {
        Self {
            max_speed: 4.5,
            estimator: EstimatorConfig::default(),
        }
    }
}

pub type SwerveDriveError<S, D> = DriveError<ModuleError<S, D>>;

/// N swerve modules, a gyro and a pose estimator
pub struct SwerveDrive<S, D, G> {
    modules: Vec<SwerveModule<S, D>>,
    kinematics: SwerveKinematics,
    gyro: G,
    estimator: SharedPoseEstimator,
    last_positions: Vec<ModulePosition>,
    max_speed: f64,
}

impl<S, D, G> SwerveDrive<S, D, G>
where
    S: FeedbackPositionController<Angular>,
    D: FeedbackVelocityController<Linear>,
    G: Gyro,
{
    pub fn new(
        modules: Vec<SwerveModule<S, D>>,
        gyro: G,
        config: SwerveDriveConfig,
    ) -> Result<Self, KinematicsError> {
        let max_speed = check_max_speed(config.max_speed)?;
        let kinematics = SwerveKinematics::new(modules.iter().map(|m| m.translation()).collect())?;
        let last_positions = modules.iter().map(|m| m.position()).collect();
        let estimator = SharedPoseEstimator::new(PoseEstimator::new(
            config.estimator,
            Pose2d::default(),
            gyro.heading(),
        ));

        debug!("Swerve drive with {} modules", modules.len());
        Ok(Self {
            modules,
            kinematics,
            gyro,
            estimator,
            last_positions,
            max_speed,
        })
    }

    pub fn modules(&self) -> &[SwerveModule<S, D>] {
        &self.modules
    }

    pub fn kinematics(&self) -> &SwerveKinematics {
        &self.kinematics
    }

    pub fn gyro(&self) -> &G {
        &self.gyro
    }

    /// Handle for other threads (vision) to share the estimate
    pub fn estimator(&self) -> SharedPoseEstimator {
        self.estimator.clone()
    }

    /// Robot-relative drive; wheel speeds are desaturated to `max_speed`
    pub fn drive_chassis_speeds(
        &mut self,
        speeds: ChassisSpeeds,
    ) -> Result<(), SwerveDriveError<S::Error, D::Error>> {
        let mut states = self.kinematics.to_module_states(speeds);
        desaturate_wheel_speeds(&mut states, self.max_speed);
        self.set_module_states(&states)
    }

    /// Field-relative drive using the estimated heading
    pub fn drive_field_relative(
        &mut self,
        speeds: ChassisSpeeds,
    ) -> Result<(), SwerveDriveError<S::Error, D::Error>> {
        let heading = self.estimator.pose().heading;
        self.drive_chassis_speeds(ChassisSpeeds::from_field_relative(
            speeds.vx,
            speeds.vy,
            speeds.omega,
            heading,
        ))
    }

    /// Measured chassis motion
    pub fn chassis_speeds(&self) -> ChassisSpeeds {
        // Count always matches: the kinematics was built from these modules
        self.kinematics
            .to_chassis_speeds(&self.module_states())
            .unwrap_or_default()
    }

    pub fn module_states(&self) -> Vec<ModuleState> {
        self.modules.iter().map(|m| m.state()).collect()
    }

    pub fn module_positions(&self) -> Vec<ModulePosition> {
        self.modules.iter().map(|m| m.position()).collect()
    }

    pub fn set_module_states(
        &mut self,
        states: &[ModuleState],
    ) -> Result<(), SwerveDriveError<S::Error, D::Error>> {
        self.check_count(states.len())?;
        for (index, (module, &state)) in self.modules.iter_mut().zip(states).enumerate() {
            module
                .set_state(state)
                .map_err(|error| module_error(index, module.name(), error))?;
        }
        Ok(())
    }

    pub fn set_module_powers(
        &mut self,
        powers: &[ModulePower],
    ) -> Result<(), SwerveDriveError<S::Error, D::Error>> {
        self.check_count(powers.len())?;
        for (index, (module, &power)) in self.modules.iter_mut().zip(powers).enumerate() {
            module
                .set_power(power)
                .map_err(|error| module_error(index, module.name(), error))?;
        }
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), SwerveDriveError<S::Error, D::Error>> {
        for (index, module) in self.modules.iter_mut().enumerate() {
            module
                .stop()
                .map_err(|error| module_error(index, module.name(), error))?;
        }
        Ok(())
    }

    pub fn disable(&mut self) -> Result<(), SwerveDriveError<S::Error, D::Error>> {
        for (index, module) in self.modules.iter_mut().enumerate() {
            module
                .disable()
                .map_err(|error| module_error(index, module.name(), error))?;
        }
        Ok(())
    }

    /// Fold wheel travel since the last call into the pose estimate
    pub fn update_pose(&mut self, timestamp: f64) -> Result<Pose2d, KinematicsError> {
        let positions = self.module_positions();
        let deltas: Vec<ModulePosition> = positions
            .iter()
            .zip(&self.last_positions)
            .map(|(now, last)| ModulePosition {
                distance: now.distance - last.distance,
                angle: now.angle,
            })
            .collect();

        let twist = self.kinematics.to_twist(&deltas)?;
        self.last_positions = positions;
        Ok(self.estimator.update_pose(timestamp, self.gyro.heading(), twist))
    }

    pub fn pose(&self) -> Pose2d {
        self.estimator.pose()
    }

    pub fn reset_pose(&mut self, pose: Pose2d) {
        self.last_positions = self.module_positions();
        self.estimator.reset_pose(pose, self.gyro.heading());
    }

    fn check_count(&self, actual: usize) -> Result<(), KinematicsError> {
        let expected = self.modules.len();
        if actual == expected {
            Ok(())
        } else {
            Err(KinematicsError::ModuleCountMismatch { expected, actual })
        }
    }
}

fn module_error<E>(index: usize, name: &str, error: E) -> DriveError<E> {
    DriveError::Module {
        index,
        name: name.to_string(),
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::adapter::{AngularAsLinear, as_linear};
    use crate::motor::capability::PositionController;
    use crate::motor::sim::{SimGyro, SimMotor};
    use approx::assert_relative_eq;
    use std::time::Duration;

    fn deg(d: f64) -> Rotation2d {
        Rotation2d::from_degrees(d)
    }

    #[test]
    fn test_optimize_within_quarter_turn_unchanged() {
        let out = optimize(ModuleState::new(2.0, deg(-170.0)), deg(170.0));
        assert_eq!(out.speed, 2.0);
        assert_relative_eq!(out.angle.degrees(), -170.0, epsilon = 1e-9);
    }

    #[test]
    fn test_optimize_flips_past_quarter_turn() {
        let out = optimize(ModuleState::new(1.0, deg(170.0)), deg(0.0));
        assert_eq!(out.speed, -1.0);
        assert_relative_eq!(out.angle.degrees(), -10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_optimize_boundary_does_not_flip() {
        let out = optimize(
            ModuleState::new(1.0, Rotation2d::from_radians(std::f64::consts::FRAC_PI_2)),
            Rotation2d::ZERO,
        );
        assert_eq!(out.speed, 1.0);
        assert_eq!(out.angle.radians(), std::f64::consts::FRAC_PI_2);
    }

    #[test]
    fn test_optimize_zero_speed_still_flips_angle() {
        let out = optimize(ModuleState::new(0.0, deg(180.0)), deg(0.0));
        assert_eq!(out.speed.abs(), 0.0);
        assert_relative_eq!(out.angle.degrees(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_power_optimizes_like_speed() {
        let out = ModulePower::new(0.5, deg(-135.0)).optimize(deg(0.0));
        assert_eq!(out.power, -0.5);
        assert_relative_eq!(out.angle.degrees(), 45.0, epsilon = 1e-9);
    }

    type SimModule = SwerveModule<SimMotor, AngularAsLinear<SimMotor>>;

    fn sim_module(x: f64, y: f64) -> (SimModule, SimMotor, SimMotor) {
        let steer = SimMotor::default();
        let drive = SimMotor::default();
        let module = SwerveModule::new(
            "test",
            Translation2d::new(x, y),
            steer.clone(),
            as_linear(drive.clone(), 0.05).unwrap(),
        );
        (module, steer, drive)
    }

    #[test]
    fn test_module_steers_short_way_on_multi_turn_encoder() {
        let (mut module, steer, _) = sim_module(0.3, 0.3);
        // Steering encoder has wound up two full turns
        let mut steer_handle = steer.clone();
        steer_handle.set_encoder_position(4.0 * std::f64::consts::PI + 0.1).unwrap();

        module.set_state(ModuleState::new(1.0, Rotation2d::from_radians(0.3))).unwrap();
        assert_relative_eq!(
            steer.target_position(),
            4.0 * std::f64::consts::PI + 0.3,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_module_drive_target_in_linear_units() {
        let (mut module, _, drive) = sim_module(0.3, 0.3);
        let applied = module.set_state(ModuleState::new(1.0, Rotation2d::ZERO)).unwrap();
        assert_eq!(applied.speed, 1.0);
        // 1 m/s over a 0.05 m wheel is 20 rad/s at the shaft
        assert_relative_eq!(
            crate::motor::capability::VelocityController::target_velocity(&drive),
            20.0,
            epsilon = 1e-9
        );
    }

    fn sim_drive() -> (SwerveDrive<SimMotor, AngularAsLinear<SimMotor>, SimGyro>, Vec<SimMotor>) {
        let mut motors = Vec::new();
        let mut modules = Vec::new();
        for (x, y) in [(0.3, 0.3), (0.3, -0.3), (-0.3, 0.3), (-0.3, -0.3)] {
            let (module, steer, drive) = sim_module(x, y);
            motors.push(steer);
            motors.push(drive);
            modules.push(module);
        }
        let drive =
            SwerveDrive::new(modules, SimGyro::new(), SwerveDriveConfig::default()).unwrap();
        (drive, motors)
    }

    #[test]
    fn test_drive_forward_updates_pose() {
        let (mut drive, motors) = sim_drive();
        drive.drive_chassis_speeds(ChassisSpeeds::new(1.0, 0.0, 0.0)).unwrap();

        for i in 1..=50 {
            for motor in &motors {
                motor.step(Duration::from_millis(20));
            }
            drive.update_pose(i as f64 * 0.02).unwrap();
        }

        let speeds = drive.chassis_speeds();
        assert_relative_eq!(speeds.vx, 1.0, epsilon = 1e-9);
        assert_relative_eq!(drive.pose().x(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(drive.pose().y(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_wheel_speeds_desaturated() {
        let (mut drive, _) = sim_drive();
        drive.drive_chassis_speeds(ChassisSpeeds::new(10.0, 0.0, 0.0)).unwrap();
        for module in drive.modules() {
            assert_relative_eq!(module.target_state().speed, 4.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_rejects_negative_max_speed() {
        let modules = [(0.3, 0.3), (-0.3, -0.3)]
            .into_iter()
            .map(|(x, y)| sim_module(x, y).0)
            .collect();
        let config = SwerveDriveConfig {
            max_speed: -2.0,
            ..Default::default()
        };
        let err = SwerveDrive::new(modules, SimGyro::new(), config).err();
        assert_eq!(err, Some(KinematicsError::InvalidMaxSpeed { max_speed: -2.0 }));
    }

    #[test]
    fn test_state_count_mismatch() {
        let (mut drive, _) = sim_drive();
        let err = drive.set_module_states(&[ModuleState::default()]).unwrap_err();
        assert!(matches!(
            err,
            DriveError::Kinematics(KinematicsError::ModuleCountMismatch { expected: 4, actual: 1 })
        ));
    }

    #[test]
    fn test_reset_pose() {
        let (mut drive, _) = sim_drive();
        drive.reset_pose(Pose2d::new(3.0, 2.0, deg(90.0)));
        let pose = drive.update_pose(0.02).unwrap();
        assert_relative_eq!(pose.x(), 3.0);
        assert_relative_eq!(pose.heading.degrees(), 90.0, epsilon = 1e-9);
    }
}
