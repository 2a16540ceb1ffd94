//! Motor-control abstractions and drivetrains for competition robots.
//!
//! - [`motor`]: capability traits for position/velocity controllers and
//!   encoders, linear/angular unit adapters, simulated devices.
//! - [`drive`]: swerve and differential kinematics, swerve module
//!   optimization, drivetrains and pose estimation.
//! - [`runtime`]: a 50 Hz control loop fed over zenoh.

pub mod config;
pub mod drive;
pub mod error;
pub mod geometry;
pub mod messages;
pub mod motor;
pub mod runtime;
pub mod scheduler;
