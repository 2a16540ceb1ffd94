// Unit domains and the scalar that links them.
//
// Every capability is expressed in one domain: angular (rad, rad/s) or
// linear (m, m/s). A ConversionFactor (meters per radian) moves values
// between them: linear = angular * k, angular = linear / k.

use serde::{Deserialize, Serialize};

use crate::error::ConversionError;

/// Marker for a family of units a capability is expressed in
pub trait UnitDomain: Copy + Send + Sync + 'static {
    /// Short unit label for positions, used in adapter trace output
    const POSITION_UNIT: &'static str;
    /// Short unit label for velocities
    const VELOCITY_UNIT: &'static str;
}

/// Shaft rotation: radians and radians per second
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Angular {}

/// Surface travel: meters and meters per second
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linear {}

impl UnitDomain for Angular {
    const POSITION_UNIT: &'static str = "rad";
    const VELOCITY_UNIT: &'static str = "rad/s";
}

impl UnitDomain for Linear {
    const POSITION_UNIT: &'static str = "m";
    const VELOCITY_UNIT: &'static str = "m/s";
}

/// Direction of a conversion from `Self` into `To`.
///
/// `convert` maps a value of `Self` into `To`, `revert` maps it back.
pub trait Conversion<To: UnitDomain>: UnitDomain {
    fn convert(value: f64, factor: ConversionFactor) -> f64;
    fn revert(value: f64, factor: ConversionFactor) -> f64;
}

impl Conversion<Linear> for Angular {
    fn convert(value: f64, factor: ConversionFactor) -> f64 {
        value * factor.get()
    }

    fn revert(value: f64, factor: ConversionFactor) -> f64 {
        value / factor.get()
    }
}

impl Conversion<Angular> for Linear {
    fn convert(value: f64, factor: ConversionFactor) -> f64 {
        value / factor.get()
    }

    fn revert(value: f64, factor: ConversionFactor) -> f64 {
        value * factor.get()
    }
}

/// Meters of linear travel per radian of rotation.
///
/// Always finite and strictly positive; construction fails otherwise.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct ConversionFactor(f64);

impl ConversionFactor {
    pub fn new(meters_per_radian: f64) -> Result<Self, ConversionError> {
        if meters_per_radian.is_finite() && meters_per_radian > 0.0 {
            Ok(Self(meters_per_radian))
        } else {
            Err(ConversionError::InvalidFactor {
                factor: meters_per_radian,
            })
        }
    }

    /// A wheel driven directly by the shaft travels `radius` meters per radian
    pub fn from_wheel_radius(radius: f64) -> Result<Self, ConversionError> {
        Self::new(radius)
    }

    /// Wheel behind a gear reduction (motor turns per wheel turn)
    pub fn from_wheel_and_reduction(radius: f64, reduction: f64) -> Result<Self, ConversionError> {
        if !(reduction.is_finite() && reduction > 0.0) {
            return Err(ConversionError::InvalidReduction { reduction });
        }
        Self::new(radius / reduction)
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl<'de> Deserialize<'de> for ConversionFactor {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Closed interval of allowed positions for a bounded mechanism
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TravelRange {
    pub min: f64,
    pub max: f64,
}

impl TravelRange {
    /// Bounds may be given in either order
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// Maps both bounds through `f`, re-ordering if needed
    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self::new(f(self.min), f(self.max))
    }
}
