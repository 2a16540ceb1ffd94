//! Planar geometry used by kinematics and pose estimation.
//!
//! Field frame: +x forward, +y left, counter-clockwise rotations positive.

use std::f64::consts::{PI, TAU};
use std::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Wrap an angle in radians into (-pi, pi]
pub fn wrap_angle(radians: f64) -> f64 {
    PI - (PI - radians).rem_euclid(TAU)
}

/// An orientation in the plane, stored in radians (not wrapped)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rotation2d(f64);

impl Rotation2d {
    pub const ZERO: Self = Self(0.0);
    pub const HALF_TURN: Self = Self(PI);

    pub fn from_radians(radians: f64) -> Self {
        Self(radians)
    }

    pub fn from_degrees(degrees: f64) -> Self {
        Self(degrees.to_radians())
    }

    pub fn radians(self) -> f64 {
        self.0
    }

    pub fn degrees(self) -> f64 {
        self.0.to_degrees()
    }

    pub fn cos(self) -> f64 {
        self.0.cos()
    }

    pub fn sin(self) -> f64 {
        self.0.sin()
    }

    /// Same orientation expressed in (-pi, pi]
    pub fn wrapped(self) -> Self {
        Self(wrap_angle(self.0))
    }

    /// Shortest signed rotation from `self` to `other`, in (-pi, pi]
    pub fn delta_to(self, other: Self) -> Self {
        Self(wrap_angle(other.0 - self.0))
    }
}

impl Add for Rotation2d {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Rotation2d {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Rotation2d {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Translation2d {
    pub x: f64,
    pub y: f64,
}

impl Translation2d {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn rotate_by(&self, rotation: Rotation2d) -> Self {
        let (sin, cos) = rotation.radians().sin_cos();
        Self {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }
}

impl Add for Translation2d {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Translation2d {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// A change in pose expressed in the robot frame at the start of the motion
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist2d {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
}

/// Robot position and heading on the field
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2d {
    pub translation: Translation2d,
    pub heading: Rotation2d,
}

impl Pose2d {
    pub fn new(x: f64, y: f64, heading: Rotation2d) -> Self {
        Self {
            translation: Translation2d::new(x, y),
            heading,
        }
    }

    pub fn x(&self) -> f64 {
        self.translation.x
    }

    pub fn y(&self) -> f64 {
        self.translation.y
    }

    pub fn is_finite(&self) -> bool {
        self.translation.x.is_finite()
            && self.translation.y.is_finite()
            && self.heading.radians().is_finite()
    }

    /// Follow `twist` along a constant-curvature arc from this pose
    pub fn exp(&self, twist: Twist2d) -> Self {
        let Twist2d { dx, dy, dtheta } = twist;
        let (sin, cos) = dtheta.sin_cos();

        // Series expansion near zero keeps straight-line motion exact
        let (s, c) = if dtheta.abs() < 1e-9 {
            (1.0 - dtheta * dtheta / 6.0, 0.5 * dtheta)
        } else {
            (sin / dtheta, (1.0 - cos) / dtheta)
        };

        let local = Translation2d::new(dx * s - dy * c, dx * c + dy * s);
        Self {
            translation: self.translation + local.rotate_by(self.heading),
            heading: self.heading + Rotation2d::from_radians(dtheta),
        }
    }
}
