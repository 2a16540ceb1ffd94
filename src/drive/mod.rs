// Drivetrain composition
//
// Provides:
// - Chassis kinematics for swerve and differential bases
// - Swerve module optimization and the swerve drivetrain
// - Differential drivetrain with open-loop tank/arcade
// - Pose estimation shared between the control loop and vision

pub mod differential;
pub mod gyro;
pub mod kinematics;
pub mod pose;
pub mod swerve;

pub use differential::{DifferentialDrive, arcade_mix};
pub use gyro::Gyro;
pub use kinematics::{
    ChassisSpeeds, DifferentialKinematics, DifferentialWheelSpeeds, SwerveKinematics,
    desaturate_wheel_speeds,
};
pub use pose::{EstimatorConfig, PoseEstimator, SharedPoseEstimator, VisionMeasurement};
pub use swerve::{
    ModulePosition, ModulePower, ModuleState, SwerveDrive, SwerveDriveConfig, SwerveModule,
    optimize,
};
