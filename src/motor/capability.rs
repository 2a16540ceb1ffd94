// Capability contracts shared by device drivers and adapters
//
// Drivetrains and path followers are written against these traits, never
// against a concrete motor controller. Writes may fail with the device's own
// error type; reads return the latest cached value.
//
// Sign convention: error = measured - target, for positions and velocities.

use super::units::{TravelRange, UnitDomain};

/// Anything that talks to hardware and can fail doing so
pub trait Device {
    type Error: std::error::Error + Send + Sync + 'static;
}

/// Position and velocity feedback in domain `D`
pub trait Encoder<D: UnitDomain>: Device {
    fn position(&self) -> f64;

    fn velocity(&self) -> f64;

    /// Re-zero the sensor so that it reads `position` from now on
    fn set_encoder_position(&mut self, position: f64) -> Result<(), Self::Error>;
}

/// Unit-free output shared by every controller
pub trait Actuator: Device {
    /// Drive with a raw output fraction in [-1, 1], bypassing closed-loop control.
    ///
    /// Setpoint tracking stays off until a new target is set.
    fn set_open_loop_power(&mut self, power: f64) -> Result<(), Self::Error>;

    /// Current open-loop output; zero while a closed-loop target is active
    fn open_loop_power(&self) -> f64;

    /// Command zero output. Idempotent.
    fn stop(&mut self) -> Result<(), Self::Error>;

    /// Command zero output and release the motor. Idempotent.
    fn disable(&mut self) -> Result<(), Self::Error>;
}

/// Closed-loop position control in domain `D`
pub trait PositionController<D: UnitDomain>: Actuator {
    /// Request a new setpoint. Values outside the travel range are clamped.
    fn set_target_position(&mut self, position: f64) -> Result<(), Self::Error>;

    /// Last commanded setpoint, after clamping
    fn target_position(&self) -> f64;

    fn measured_position(&self) -> f64;

    fn position_tolerance(&self) -> f64;

    fn set_position_tolerance(&mut self, tolerance: f64);

    fn position_range(&self) -> Option<TravelRange>;

    fn set_position_range(&mut self, range: Option<TravelRange>);

    fn position_error(&self) -> f64 {
        self.measured_position() - self.target_position()
    }

    fn at_target_position(&self) -> bool {
        self.position_error().abs() < self.position_tolerance()
    }
}

/// Closed-loop velocity control in domain `D`
pub trait VelocityController<D: UnitDomain>: Actuator {
    fn set_target_velocity(&mut self, velocity: f64) -> Result<(), Self::Error>;

    fn target_velocity(&self) -> f64;

    fn measured_velocity(&self) -> f64;

    fn velocity_tolerance(&self) -> f64;

    fn set_velocity_tolerance(&mut self, tolerance: f64);

    fn velocity_error(&self) -> f64 {
        self.measured_velocity() - self.target_velocity()
    }

    fn at_target_velocity(&self) -> bool {
        self.velocity_error().abs() < self.velocity_tolerance()
    }
}

/// Position controller that also exposes its encoder
pub trait FeedbackPositionController<D: UnitDomain>: PositionController<D> + Encoder<D> {}

impl<D: UnitDomain, T: PositionController<D> + Encoder<D> + ?Sized> FeedbackPositionController<D>
    for T
{
}

/// Velocity controller that also exposes its encoder
pub trait FeedbackVelocityController<D: UnitDomain>: VelocityController<D> + Encoder<D> {}

impl<D: UnitDomain, T: VelocityController<D> + Encoder<D> + ?Sized> FeedbackVelocityController<D>
    for T
{
}

// Borrowed views. `&'a mut T` is a capability for as long as the borrow
// lives, so an adapter built over it carries that lifetime in its type.

impl<T: Device + ?Sized> Device for &mut T {
    type Error = T::Error;
}

impl<D: UnitDomain, T: Encoder<D> + ?Sized> Encoder<D> for &mut T {
    fn position(&self) -> f64 {
        (**self).position()
    }

    fn velocity(&self) -> f64 {
        (**self).velocity()
    }

    fn set_encoder_position(&mut self, position: f64) -> Result<(), Self::Error> {
        (**self).set_encoder_position(position)
    }
}

impl<T: Actuator + ?Sized> Actuator for &mut T {
    fn set_open_loop_power(&mut self, power: f64) -> Result<(), Self::Error> {
        (**self).set_open_loop_power(power)
    }

    fn open_loop_power(&self) -> f64 {
        (**self).open_loop_power()
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        (**self).stop()
    }

    fn disable(&mut self) -> Result<(), Self::Error> {
        (**self).disable()
    }
}

impl<D: UnitDomain, T: PositionController<D> + ?Sized> PositionController<D> for &mut T {
    fn set_target_position(&mut self, position: f64) -> Result<(), Self::Error> {
        (**self).set_target_position(position)
    }

    fn target_position(&self) -> f64 {
        (**self).target_position()
    }

    fn measured_position(&self) -> f64 {
        (**self).measured_position()
    }

    fn position_tolerance(&self) -> f64 {
        (**self).position_tolerance()
    }

    fn set_position_tolerance(&mut self, tolerance: f64) {
        (**self).set_position_tolerance(tolerance)
    }

    fn position_range(&self) -> Option<TravelRange> {
        (**self).position_range()
    }

    fn set_position_range(&mut self, range: Option<TravelRange>) {
        (**self).set_position_range(range)
    }

    fn position_error(&self) -> f64 {
        (**self).position_error()
    }

    fn at_target_position(&self) -> bool {
        (**self).at_target_position()
    }
}

impl<D: UnitDomain, T: VelocityController<D> + ?Sized> VelocityController<D> for &mut T {
    fn set_target_velocity(&mut self, velocity: f64) -> Result<(), Self::Error> {
        (**self).set_target_velocity(velocity)
    }

    fn target_velocity(&self) -> f64 {
        (**self).target_velocity()
    }

    fn measured_velocity(&self) -> f64 {
        (**self).measured_velocity()
    }

    fn velocity_tolerance(&self) -> f64 {
        (**self).velocity_tolerance()
    }

    fn set_velocity_tolerance(&mut self, tolerance: f64) {
        (**self).set_velocity_tolerance(tolerance)
    }

    fn velocity_error(&self) -> f64 {
        (**self).velocity_error()
    }

    fn at_target_velocity(&self) -> bool {
        (**self).at_target_velocity()
    }
}
