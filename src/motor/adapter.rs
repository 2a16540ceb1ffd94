// Unit-conversion adapters
//
// `Converted<C, From, To>` presents a capability built for domain `From` as
// one built for domain `To`. Every call is a 1:1 forward to the wrapped
// object; unit-bearing arguments and results pass through the conversion
// factor, everything else (open-loop power, errors) passes through untouched.
//
// Ownership is decided by `C`: move a device in to own it, or pass
// `&mut device` to get a view that cannot outlive the device.

use std::marker::PhantomData;

use tracing::trace;

use super::capability::{Actuator, Device, Encoder, PositionController, VelocityController};
use super::units::{Angular, Conversion, ConversionFactor, Linear, TravelRange, UnitDomain};
use crate::error::ConversionError;

/// A capability re-expressed in another unit domain
#[derive(Debug)]
pub struct Converted<C, From, To> {
    inner: C,
    factor: ConversionFactor,
    _domains: PhantomData<fn() -> (From, To)>,
}

/// Angular device driven and measured in linear units
pub type AngularAsLinear<C> = Converted<C, Angular, Linear>;

/// Linear device driven and measured in angular units
pub type LinearAsAngular<C> = Converted<C, Linear, Angular>;

/// Wrap an angular capability so it speaks meters
pub fn as_linear<C>(
    source: C,
    meters_per_radian: f64,
) -> Result<AngularAsLinear<C>, ConversionError> {
    Ok(Converted::new(source, ConversionFactor::new(meters_per_radian)?))
}

/// Wrap a linear capability so it speaks radians
pub fn as_angular<C>(
    source: C,
    meters_per_radian: f64,
) -> Result<LinearAsAngular<C>, ConversionError> {
    Ok(Converted::new(source, ConversionFactor::new(meters_per_radian)?))
}

impl<C> AngularAsLinear<C> {
    /// Undo `as_linear` exactly: hands back the wrapped angular capability.
    ///
    /// Stacking `as_angular` on top instead would round every value twice.
    pub fn as_angular(self, meters_per_radian: f64) -> Result<C, ConversionError> {
        self.unwrap_with(meters_per_radian)
    }
}

impl<C> LinearAsAngular<C> {
    /// Undo `as_angular` exactly: hands back the wrapped linear capability
    pub fn as_linear(self, meters_per_radian: f64) -> Result<C, ConversionError> {
        self.unwrap_with(meters_per_radian)
    }
}

impl<C, From, To> Converted<C, From, To>
where
    From: Conversion<To>,
    To: UnitDomain,
{
    pub fn new(inner: C, factor: ConversionFactor) -> Self {
        Self {
            inner,
            factor,
            _domains: PhantomData,
        }
    }

    pub fn factor(&self) -> ConversionFactor {
        self.factor
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    /// Give the wrapped capability back
    pub fn into_inner(self) -> C {
        self.inner
    }

    // Only the factor that was applied may undo the conversion
    fn unwrap_with(self, meters_per_radian: f64) -> Result<C, ConversionError> {
        let requested = ConversionFactor::new(meters_per_radian)?;
        if requested == self.factor {
            Ok(self.inner)
        } else {
            Err(ConversionError::FactorMismatch {
                applied: self.factor.get(),
                requested: requested.get(),
            })
        }
    }

    // inner domain -> outer domain
    fn outward(&self, value: f64) -> f64 {
        From::convert(value, self.factor)
    }

    // outer domain -> inner domain
    fn inward(&self, value: f64) -> f64 {
        From::revert(value, self.factor)
    }
}

impl<C: Device, From, To> Device for Converted<C, From, To> {
    type Error = C::Error;
}

impl<C, From, To> Actuator for Converted<C, From, To>
where
    C: Actuator,
{
    fn set_open_loop_power(&mut self, power: f64) -> Result<(), Self::Error> {
        self.inner.set_open_loop_power(power)
    }

    fn open_loop_power(&self) -> f64 {
        self.inner.open_loop_power()
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        self.inner.stop()
    }

    fn disable(&mut self) -> Result<(), Self::Error> {
        self.inner.disable()
    }
}

impl<C, From, To> Encoder<To> for Converted<C, From, To>
where
    C: Encoder<From>,
    From: Conversion<To>,
    To: UnitDomain,
{
    fn position(&self) -> f64 {
        self.outward(self.inner.position())
    }

    fn velocity(&self) -> f64 {
        self.outward(self.inner.velocity())
    }

    fn set_encoder_position(&mut self, position: f64) -> Result<(), Self::Error> {
        let position = self.inward(position);
        self.inner.set_encoder_position(position)
    }
}

impl<C, From, To> PositionController<To> for Converted<C, From, To>
where
    C: PositionController<From>,
    From: Conversion<To>,
    To: UnitDomain,
{
    fn set_target_position(&mut self, position: f64) -> Result<(), Self::Error> {
        let inner = self.inward(position);
        trace!(
            "Position target {:.4} {} -> {:.4} {}",
            position,
            To::POSITION_UNIT,
            inner,
            From::POSITION_UNIT
        );
        self.inner.set_target_position(inner)
    }

    fn target_position(&self) -> f64 {
        self.outward(self.inner.target_position())
    }

    fn measured_position(&self) -> f64 {
        self.outward(self.inner.measured_position())
    }

    fn position_tolerance(&self) -> f64 {
        self.outward(self.inner.position_tolerance())
    }

    fn set_position_tolerance(&mut self, tolerance: f64) {
        let tolerance = self.inward(tolerance);
        self.inner.set_position_tolerance(tolerance)
    }

    fn position_range(&self) -> Option<TravelRange> {
        self.inner
            .position_range()
            .map(|range| range.map(|bound| self.outward(bound)))
    }

    fn set_position_range(&mut self, range: Option<TravelRange>) {
        let range = range.map(|range| range.map(|bound| self.inward(bound)));
        self.inner.set_position_range(range)
    }

    fn position_error(&self) -> f64 {
        self.outward(self.inner.position_error())
    }

    fn at_target_position(&self) -> bool {
        self.inner.at_target_position()
    }
}

impl<C, From, To> VelocityController<To> for Converted<C, From, To>
where
    C: VelocityController<From>,
    From: Conversion<To>,
    To: UnitDomain,
{
    fn set_target_velocity(&mut self, velocity: f64) -> Result<(), Self::Error> {
        let inner = self.inward(velocity);
        trace!(
            "Velocity target {:.4} {} -> {:.4} {}",
            velocity,
            To::VELOCITY_UNIT,
            inner,
            From::VELOCITY_UNIT
        );
        self.inner.set_target_velocity(inner)
    }

    fn target_velocity(&self) -> f64 {
        self.outward(self.inner.target_velocity())
    }

    fn measured_velocity(&self) -> f64 {
        self.outward(self.inner.measured_velocity())
    }

    fn velocity_tolerance(&self) -> f64 {
        self.outward(self.inner.velocity_tolerance())
    }

    fn set_velocity_tolerance(&mut self, tolerance: f64) {
        let tolerance = self.inward(tolerance);
        self.inner.set_velocity_tolerance(tolerance)
    }

    fn velocity_error(&self) -> f64 {
        self.outward(self.inner.velocity_error())
    }

    fn at_target_velocity(&self) -> bool {
        self.inner.at_target_velocity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    /// Minimal angular position/velocity controller with clamping
    #[derive(Debug, Default)]
    struct Stub {
        target: f64,
        measured: f64,
        target_velocity: f64,
        measured_velocity: f64,
        tolerance: f64,
        range: Option<TravelRange>,
        power: f64,
        fail_writes: bool,
    }

    #[derive(Debug, PartialEq)]
    struct BusFault;

    impl fmt::Display for BusFault {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "bus fault")
        }
    }

    impl std::error::Error for BusFault {}

    impl Device for Stub {
        type Error = BusFault;
    }

    impl Actuator for Stub {
        fn set_open_loop_power(&mut self, power: f64) -> Result<(), BusFault> {
            self.power = power;
            Ok(())
        }
        fn open_loop_power(&self) -> f64 {
            self.power
        }
        fn stop(&mut self) -> Result<(), BusFault> {
            self.power = 0.0;
            Ok(())
        }
        fn disable(&mut self) -> Result<(), BusFault> {
            self.stop()
        }
    }

    impl PositionController<Angular> for Stub {
        fn set_target_position(&mut self, position: f64) -> Result<(), BusFault> {
            if self.fail_writes {
                return Err(BusFault);
            }
            self.target = self.range.map_or(position, |r| r.clamp(position));
            Ok(())
        }
        fn target_position(&self) -> f64 {
            self.target
        }
        fn measured_position(&self) -> f64 {
            self.measured
        }
        fn position_tolerance(&self) -> f64 {
            self.tolerance
        }
        fn set_position_tolerance(&mut self, tolerance: f64) {
            self.tolerance = tolerance;
        }
        fn position_range(&self) -> Option<TravelRange> {
            self.range
        }
        fn set_position_range(&mut self, range: Option<TravelRange>) {
            self.range = range;
        }
    }

    impl VelocityController<Angular> for Stub {
        fn set_target_velocity(&mut self, velocity: f64) -> Result<(), BusFault> {
            self.target_velocity = velocity;
            Ok(())
        }
        fn target_velocity(&self) -> f64 {
            self.target_velocity
        }
        fn measured_velocity(&self) -> f64 {
            self.measured_velocity
        }
        fn velocity_tolerance(&self) -> f64 {
            self.tolerance
        }
        fn set_velocity_tolerance(&mut self, tolerance: f64) {
            self.tolerance = tolerance;
        }
    }

    #[test]
    fn test_linear_position_clamped_in_angular_range() {
        // 0.5 m/rad, 2 m -> 4 rad, clamped to pi
        let stub = Stub {
            range: Some(TravelRange::new(-std::f64::consts::PI, std::f64::consts::PI)),
            ..Default::default()
        };
        let mut linear = as_linear(stub, 0.5).unwrap();
        linear.set_target_position(2.0).unwrap();

        assert_eq!(linear.inner().target_position(), std::f64::consts::PI);
        assert_eq!(linear.target_position(), std::f64::consts::PI * 0.5);
    }

    #[test]
    fn test_unclamped_target_scales() {
        let mut linear = as_linear(Stub::default(), 0.5).unwrap();
        linear.set_target_position(2.0).unwrap();
        assert_eq!(linear.inner().target_position(), 4.0);
    }

    #[test]
    fn test_measured_and_error_scale() {
        let stub = Stub {
            target: 1.0,
            measured: -3.0,
            measured_velocity: 10.0,
            ..Default::default()
        };
        let linear = as_linear(stub, 0.25).unwrap();
        assert_eq!(linear.measured_position(), -0.75);
        assert_eq!(linear.position_error(), -1.0);
        assert_eq!(VelocityController::<Linear>::measured_velocity(&linear), 2.5);
    }

    #[test]
    fn test_tolerance_and_range_convert() {
        let mut linear = as_linear(Stub::default(), 2.0).unwrap();
        linear.set_position_tolerance(0.1);
        assert!((linear.inner().position_tolerance() - 0.05).abs() < 1e-12);

        linear.set_position_range(Some(TravelRange::new(-4.0, 4.0)));
        assert_eq!(linear.inner().position_range(), Some(TravelRange::new(-2.0, 2.0)));
        assert_eq!(linear.position_range(), Some(TravelRange::new(-4.0, 4.0)));
    }

    #[test]
    fn test_open_loop_power_is_not_scaled() {
        let mut linear = as_linear(Stub::default(), 3.0).unwrap();
        linear.set_open_loop_power(0.4).unwrap();
        assert_eq!(linear.open_loop_power(), 0.4);
        linear.stop().unwrap();
        assert_eq!(linear.inner().open_loop_power(), 0.0);
    }

    #[test]
    fn test_wrapped_error_propagates_unchanged() {
        let stub = Stub {
            fail_writes: true,
            ..Default::default()
        };
        let mut linear = as_linear(stub, 1.0).unwrap();
        assert_eq!(linear.set_target_position(1.0), Err(BusFault));
    }

    #[test]
    fn test_invalid_factor_rejected() {
        assert!(as_linear(Stub::default(), 0.0).is_err());
        assert!(as_angular(Stub::default(), -2.0).is_err());
    }

    #[test]
    fn test_borrowed_view_writes_through() {
        let mut stub = Stub::default();
        {
            let mut view = as_linear(&mut stub, 0.5).unwrap();
            view.set_target_position(1.0).unwrap();
        }
        assert_eq!(stub.target_position(), 2.0);
    }

    #[test]
    fn test_round_trip_restores_original_units() {
        let stub = Stub {
            measured: 1.5,
            ..Default::default()
        };
        let linear = as_linear(stub, 0.5).unwrap();
        let mut angular = as_angular(linear, 0.5).unwrap();
        angular.set_target_position(0.75).unwrap();

        assert_eq!(angular.target_position(), 0.75);
        assert_eq!(angular.measured_position(), 1.5);
        assert_eq!(angular.into_inner().into_inner().target_position(), 0.75);
    }

    #[test]
    fn test_undo_with_same_factor_returns_original() {
        let stub = Stub {
            measured: 0.1,
            measured_velocity: -0.7,
            ..Default::default()
        };
        let mut original = as_linear(stub, 0.013).unwrap().as_angular(0.013).unwrap();
        original.set_target_position(0.3).unwrap();
        assert_eq!(original.target_position(), 0.3);
        assert_eq!(original.measured_position(), 0.1);
        assert_eq!(original.measured_velocity(), -0.7);
    }

    #[test]
    fn test_undo_with_other_factor_rejected() {
        let err = as_linear(Stub::default(), 0.5)
            .unwrap()
            .as_angular(0.25)
            .unwrap_err();
        assert_eq!(
            err,
            ConversionError::FactorMismatch {
                applied: 0.5,
                requested: 0.25
            }
        );
        assert!(as_angular(Stub::default(), 2.0).unwrap().as_linear(0.0).is_err());
    }
}
