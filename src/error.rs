// Error types for the drive stack
//
// Device failures are never translated: they surface with the device's own
// error type, tagged only with where in a module or drivetrain they happened.

use std::path::PathBuf;

/// Invalid linear/angular conversion, rejected at construction
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("Conversion factor must be finite and positive, got {factor}")]
    InvalidFactor { factor: f64 },

    #[error("Gear reduction must be finite and positive, got {reduction}")]
    InvalidReduction { reduction: f64 },

    #[error("Cannot undo a {applied} m/rad conversion with {requested} m/rad")]
    FactorMismatch { applied: f64, requested: f64 },
}

/// Chassis geometry or state-count problems
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KinematicsError {
    #[error("Swerve kinematics needs at least 2 modules, got {count}")]
    NotEnoughModules { count: usize },

    #[error("Module layout is degenerate, chassis motion cannot be recovered")]
    SingularGeometry,

    #[error("Expected {expected} module values, got {actual}")]
    ModuleCountMismatch { expected: usize, actual: usize },

    #[error("Track width must be finite and positive, got {width}")]
    InvalidTrackWidth { width: f64 },

    #[error("Max wheel speed must be finite and positive, got {max_speed}")]
    InvalidMaxSpeed { max_speed: f64 },
}

/// Loading or validating a drive configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Kinematics(#[from] KinematicsError),
}

/// Failure while commanding one swerve module.
///
/// Steering is commanded first; a `Drive` error means steering already
/// accepted its new target.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError<S, D> {
    #[error("steering controller: {0}")]
    Steer(S),

    #[error("drive controller: {0}")]
    Drive(D),
}

/// Failure while commanding a drivetrain
#[derive(Debug, thiserror::Error)]
pub enum DriveError<E> {
    #[error("module {index} ({name}): {error}")]
    Module {
        index: usize,
        name: String,
        error: E,
    },

    #[error(transparent)]
    Kinematics(#[from] KinematicsError),
}
