// Motor capability layer
//
// Provides:
// - Unit domains (angular / linear) and the conversion factor between them
// - Capability traits every device driver and adapter implements
// - Adapters that re-express a capability in the other unit domain
// - Simulated motor and gyro for running without hardware

pub mod adapter;
pub mod capability;
pub mod sim;
pub mod units;

pub use adapter::{AngularAsLinear, Converted, LinearAsAngular, as_angular, as_linear};
pub use capability::{
    Actuator, Device, Encoder, FeedbackPositionController, FeedbackVelocityController,
    PositionController, VelocityController,
};
pub use sim::{SimGyro, SimMotor, SimMotorConfig};
pub use units::{Angular, ConversionFactor, Linear, TravelRange, UnitDomain};
