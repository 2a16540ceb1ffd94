// Chassis kinematics for swerve and differential drivetrains
//
// Swerve: each module i at (x_i, y_i) from robot center sees
//   vx_i = vx - omega * y_i
//   vy_i = vy + omega * x_i
// Stacking gives a 2N x 3 matrix; its pseudo-inverse maps measured module
// velocities back to the least-squares chassis motion.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::swerve::{ModulePosition, ModuleState};
use crate::error::KinematicsError;
use crate::geometry::{Rotation2d, Translation2d, Twist2d};

/// Robot-relative chassis velocity
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChassisSpeeds {
    /// Forward, m/s
    pub vx: f64,
    /// Left, m/s
    pub vy: f64,
    /// Counter-clockwise, rad/s
    pub omega: f64,
}

impl ChassisSpeeds {
    pub fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self { vx, vy, omega }
    }

    /// Convert field-relative speeds to robot-relative given the robot heading
    pub fn from_field_relative(vx: f64, vy: f64, omega: f64, heading: Rotation2d) -> Self {
        let robot = Translation2d::new(vx, vy).rotate_by(-heading);
        Self::new(robot.x, robot.y, omega)
    }

    pub fn is_zero(&self) -> bool {
        self.vx == 0.0 && self.vy == 0.0 && self.omega == 0.0
    }
}

/// Inverse and forward kinematics for N swerve modules
#[derive(Debug, Clone)]
pub struct SwerveKinematics {
    translations: Vec<Translation2d>,
    inverse: DMatrix<f64>,
    forward: DMatrix<f64>,
    last_angles: Vec<Rotation2d>,
}

impl SwerveKinematics {
    pub fn new(translations: Vec<Translation2d>) -> Result<Self, KinematicsError> {
        let count = translations.len();
        if count < 2 {
            return Err(KinematicsError::NotEnoughModules { count });
        }

        let mut inverse = DMatrix::<f64>::zeros(count * 2, 3);
        for (i, t) in translations.iter().enumerate() {
            inverse[(2 * i, 0)] = 1.0;
            inverse[(2 * i, 2)] = -t.y;
            inverse[(2 * i + 1, 1)] = 1.0;
            inverse[(2 * i + 1, 2)] = t.x;
        }

        // All modules at one point cannot observe rotation
        if inverse.rank(1e-9) < 3 {
            return Err(KinematicsError::SingularGeometry);
        }
        let forward = inverse
            .clone()
            .pseudo_inverse(1e-9)
            .map_err(|_| KinematicsError::SingularGeometry)?;

        Ok(Self {
            last_angles: vec![Rotation2d::ZERO; count],
            translations,
            inverse,
            forward,
        })
    }

    pub fn module_count(&self) -> usize {
        self.translations.len()
    }

    pub fn translations(&self) -> &[Translation2d] {
        &self.translations
    }

    /// Chassis speeds -> one state per module, in construction order.
    ///
    /// A zero command keeps each module's previous angle so wheels do not
    /// snap back to 0 when the robot stops.
    pub fn to_module_states(&mut self, speeds: ChassisSpeeds) -> Vec<ModuleState> {
        if speeds.is_zero() {
            return self
                .last_angles
                .iter()
                .map(|&angle| ModuleState::new(0.0, angle))
                .collect();
        }

        let chassis = DVector::from_column_slice(&[speeds.vx, speeds.vy, speeds.omega]);
        let modules = &self.inverse * chassis;

        let states: Vec<ModuleState> = (0..self.module_count())
            .map(|i| {
                let vx = modules[2 * i];
                let vy = modules[2 * i + 1];
                ModuleState::new(vx.hypot(vy), Rotation2d::from_radians(vy.atan2(vx)))
            })
            .collect();

        for (last, state) in self.last_angles.iter_mut().zip(&states) {
            *last = state.angle;
        }
        states
    }

    /// Measured module states -> least-squares chassis speeds
    pub fn to_chassis_speeds(
        &self,
        states: &[ModuleState],
    ) -> Result<ChassisSpeeds, KinematicsError> {
        self.check_count(states.len())?;
        let modules = DVector::from_iterator(
            states.len() * 2,
            states
                .iter()
                .flat_map(|s| [s.speed * s.angle.cos(), s.speed * s.angle.sin()]),
        );
        let chassis = &self.forward * modules;
        Ok(ChassisSpeeds::new(chassis[0], chassis[1], chassis[2]))
    }

    /// Module distance deltas since the last update -> chassis twist
    pub fn to_twist(&self, deltas: &[ModulePosition]) -> Result<Twist2d, KinematicsError> {
        self.check_count(deltas.len())?;
        let modules = DVector::from_iterator(
            deltas.len() * 2,
            deltas
                .iter()
                .flat_map(|d| [d.distance * d.angle.cos(), d.distance * d.angle.sin()]),
        );
        let chassis = &self.forward * modules;
        Ok(Twist2d {
            dx: chassis[0],
            dy: chassis[1],
            dtheta: chassis[2],
        })
    }

    /// Reset remembered angles, e.g. after re-homing the steering
    pub fn reset_angles(&mut self, angles: &[Rotation2d]) -> Result<(), KinematicsError> {
        self.check_count(angles.len())?;
        self.last_angles.copy_from_slice(angles);
        Ok(())
    }

    fn check_count(&self, actual: usize) -> Result<(), KinematicsError> {
        let expected = self.module_count();
        if actual == expected {
            Ok(())
        } else {
            Err(KinematicsError::ModuleCountMismatch { expected, actual })
        }
    }
}

/// Reject a wheel speed limit that would flip or zero every command
pub(crate) fn check_max_speed(max_speed: f64) -> Result<f64, KinematicsError> {
    if max_speed.is_finite() && max_speed > 0.0 {
        Ok(max_speed)
    } else {
        Err(KinematicsError::InvalidMaxSpeed { max_speed })
    }
}

/// Scale all module speeds down proportionally if any exceeds `max_speed`.
///
/// A non-positive `max_speed` leaves the states untouched.
pub fn desaturate_wheel_speeds(states: &mut [ModuleState], max_speed: f64) {
    let fastest = states.iter().map(|s| s.speed.abs()).fold(0.0f64, f64::max);

    if max_speed > 0.0 && fastest > max_speed {
        let scale = max_speed / fastest;
        for state in states {
            state.speed *= scale;
        }
    }
}

/// Left/right wheel surface speeds, m/s
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DifferentialWheelSpeeds {
    pub left: f64,
    pub right: f64,
}

impl DifferentialWheelSpeeds {
    /// Scale both sides down if either exceeds `max_speed`; a non-positive
    /// limit is ignored
    pub fn desaturate(self, max_speed: f64) -> Self {
        let fastest = self.left.abs().max(self.right.abs());
        if max_speed > 0.0 && fastest > max_speed {
            let scale = max_speed / fastest;
            Self {
                left: self.left * scale,
                right: self.right * scale,
            }
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifferentialKinematics {
    track_width: f64,
}

impl DifferentialKinematics {
    pub fn new(track_width: f64) -> Result<Self, KinematicsError> {
        if track_width.is_finite() && track_width > 0.0 {
            Ok(Self { track_width })
        } else {
            Err(KinematicsError::InvalidTrackWidth { width: track_width })
        }
    }

    pub fn track_width(&self) -> f64 {
        self.track_width
    }

    /// Lateral speed is ignored; a differential base cannot strafe
    pub fn to_wheel_speeds(&self, speeds: ChassisSpeeds) -> DifferentialWheelSpeeds {
        let half = self.track_width / 2.0;
        DifferentialWheelSpeeds {
            left: speeds.vx - speeds.omega * half,
            right: speeds.vx + speeds.omega * half,
        }
    }

    pub fn to_chassis_speeds(&self, wheels: DifferentialWheelSpeeds) -> ChassisSpeeds {
        ChassisSpeeds::new(
            (wheels.left + wheels.right) / 2.0,
            0.0,
            (wheels.right - wheels.left) / self.track_width,
        )
    }

    pub fn to_twist(&self, left_delta: f64, right_delta: f64) -> Twist2d {
        Twist2d {
            dx: (left_delta + right_delta) / 2.0,
            dy: 0.0,
            dtheta: (right_delta - left_delta) / self.track_width,
        }
    }
}
