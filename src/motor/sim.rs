// Simulated motor and gyro
//
// Stand-ins for vendor controllers so the runtime and tests can close the
// loop without hardware. A SimMotor is a cheap cloneable handle: one clone
// goes to the drivetrain as a controller, another to the Scheduler to step
// the physics.

use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::capability::{Actuator, Device, Encoder, PositionController, VelocityController};
use super::units::{Angular, TravelRange};
use crate::drive::gyro::Gyro;
use crate::geometry::Rotation2d;
use crate::scheduler::Updatable;

/// Physical limits of a simulated motor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimMotorConfig {
    /// Shaft speed at full output, rad/s
    pub free_speed: f64,
    pub position_tolerance: f64,
    pub velocity_tolerance: f64,
}

impl Default for SimMotorConfig {
    fn default() -> Self {
        // Roughly a brushless FRC motor at 12 V
        Self {
            free_speed: 590.0,
            position_tolerance: 0.01,
            velocity_tolerance: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ControlMode {
    Disabled,
    OpenLoop(f64),
    Position(f64),
    Velocity(f64),
}

#[derive(Debug)]
struct SimMotorState {
    config: SimMotorConfig,
    mode: ControlMode,
    position: f64,
    velocity: f64,
    target_position: f64,
    target_velocity: f64,
    range: Option<TravelRange>,
}

impl SimMotorState {
    fn step(&mut self, dt: f64) {
        let free_speed = self.config.free_speed;
        match self.mode {
            ControlMode::Disabled => self.velocity = 0.0,
            ControlMode::OpenLoop(power) => {
                self.velocity = power.clamp(-1.0, 1.0) * free_speed;
                self.position += self.velocity * dt;
            }
            ControlMode::Velocity(target) => {
                self.velocity = target.clamp(-free_speed, free_speed);
                self.position += self.velocity * dt;
            }
            ControlMode::Position(target) => {
                let max_step = free_speed * dt;
                let step = (target - self.position).clamp(-max_step, max_step);
                self.position += step;
                self.velocity = if dt > 0.0 { step / dt } else { 0.0 };
            }
        }

        if let Some(range) = self.range {
            if !range.contains(self.position) {
                self.position = range.clamp(self.position);
                self.velocity = 0.0;
            }
        }
    }
}

/// Simulated brushless motor with integrated encoder, in shaft radians
#[derive(Debug, Clone)]
pub struct SimMotor {
    state: Arc<Mutex<SimMotorState>>,
}

impl SimMotor {
    pub fn new(config: SimMotorConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimMotorState {
                config,
                mode: ControlMode::Disabled,
                position: 0.0,
                velocity: 0.0,
                target_position: 0.0,
                target_velocity: 0.0,
                range: None,
            })),
        }
    }

    /// Advance the simulation by `dt`
    pub fn step(&self, dt: Duration) {
        self.lock().step(dt.as_secs_f64());
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().mode != ControlMode::Disabled
    }

    fn lock(&self) -> MutexGuard<'_, SimMotorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimMotor {
    fn default() -> Self {
        Self::new(SimMotorConfig::default())
    }
}

impl Updatable for SimMotor {
    fn update(&mut self, dt: Duration) {
        self.step(dt);
    }
}

impl Device for SimMotor {
    type Error = Infallible;
}

impl Actuator for SimMotor {
    fn set_open_loop_power(&mut self, power: f64) -> Result<(), Infallible> {
        self.lock().mode = ControlMode::OpenLoop(power.clamp(-1.0, 1.0));
        Ok(())
    }

    fn open_loop_power(&self) -> f64 {
        match self.lock().mode {
            ControlMode::OpenLoop(power) => power,
            _ => 0.0,
        }
    }

    fn stop(&mut self) -> Result<(), Infallible> {
        self.lock().mode = ControlMode::OpenLoop(0.0);
        Ok(())
    }

    fn disable(&mut self) -> Result<(), Infallible> {
        let mut state = self.lock();
        if state.mode != ControlMode::Disabled {
            debug!("Sim motor disabled");
        }
        state.mode = ControlMode::Disabled;
        Ok(())
    }
}

impl Encoder<Angular> for SimMotor {
    fn position(&self) -> f64 {
        self.lock().position
    }

    fn velocity(&self) -> f64 {
        self.lock().velocity
    }

    fn set_encoder_position(&mut self, position: f64) -> Result<(), Infallible> {
        let mut state = self.lock();
        let offset = position - state.position;
        state.position = position;
        // Keep an active position setpoint pointing at the same physical spot
        if let ControlMode::Position(target) = state.mode {
            state.mode = ControlMode::Position(target + offset);
            state.target_position += offset;
        }
        Ok(())
    }
}

impl PositionController<Angular> for SimMotor {
    fn set_target_position(&mut self, position: f64) -> Result<(), Infallible> {
        let mut state = self.lock();
        let target = state.range.map_or(position, |range| range.clamp(position));
        trace!("Sim motor position target {:.4} rad (requested {:.4})", target, position);
        state.target_position = target;
        state.mode = ControlMode::Position(target);
        Ok(())
    }

    fn target_position(&self) -> f64 {
        self.lock().target_position
    }

    fn measured_position(&self) -> f64 {
        self.lock().position
    }

    fn position_tolerance(&self) -> f64 {
        self.lock().config.position_tolerance
    }

    fn set_position_tolerance(&mut self, tolerance: f64) {
        self.lock().config.position_tolerance = tolerance.abs();
    }

    fn position_range(&self) -> Option<TravelRange> {
        self.lock().range
    }

    fn set_position_range(&mut self, range: Option<TravelRange>) {
        let mut state = self.lock();
        state.range = range;
        if let (Some(range), ControlMode::Position(target)) = (range, state.mode) {
            let clamped = range.clamp(target);
            state.target_position = clamped;
            state.mode = ControlMode::Position(clamped);
        }
    }
}

impl VelocityController<Angular> for SimMotor {
    fn set_target_velocity(&mut self, velocity: f64) -> Result<(), Infallible> {
        let mut state = self.lock();
        state.target_velocity = velocity;
        state.mode = ControlMode::Velocity(velocity);
        Ok(())
    }

    fn target_velocity(&self) -> f64 {
        self.lock().target_velocity
    }

    fn measured_velocity(&self) -> f64 {
        self.lock().velocity
    }

    fn velocity_tolerance(&self) -> f64 {
        self.lock().config.velocity_tolerance
    }

    fn set_velocity_tolerance(&mut self, tolerance: f64) {
        self.lock().config.velocity_tolerance = tolerance.abs();
    }
}

/// Simulated yaw sensor; clones share one heading
#[derive(Debug, Clone, Default)]
pub struct SimGyro {
    heading: Arc<Mutex<f64>>,
}

impl SimGyro {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance heading by `omega` rad/s over `dt`
    pub fn integrate(&self, omega: f64, dt: Duration) {
        *self.lock() += omega * dt.as_secs_f64();
    }

    fn lock(&self) -> MutexGuard<'_, f64> {
        self.heading.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Gyro for SimGyro {
    fn heading(&self) -> Rotation2d {
        Rotation2d::from_radians(*self.lock())
    }

    fn set_heading(&mut self, heading: Rotation2d) {
        *self.lock() = heading.radians();
    }
}
