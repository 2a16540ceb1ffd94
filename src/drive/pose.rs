//! Pose estimation from wheel odometry, gyro heading and vision.
//!
//! The control loop feeds odometry every cycle while a vision listener may
//! inject measurements from another thread at any time. [`SharedPoseEstimator`]
//! serializes all four operations (read, odometry update, reset, vision)
//! behind one mutex.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geometry::{Pose2d, Rotation2d, Twist2d};

/// Trust settings for the estimator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Odometry standard deviations [x m, y m, heading rad]
    pub state_std_devs: [f64; 3],
    /// Default vision standard deviations [x m, y m, heading rad]
    pub vision_std_devs: [f64; 3],
    /// Measurements older than this (seconds) relative to the latest
    /// odometry update are dropped
    pub max_vision_latency: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            state_std_devs: [0.1, 0.1, 0.1],
            vision_std_devs: [0.9, 0.9, 0.9],
            max_vision_latency: 0.5,
        }
    }
}

/// A field pose observed by a camera
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisionMeasurement {
    pub pose: Pose2d,
    /// Capture time, seconds, on the same clock as odometry updates
    pub timestamp: f64,
    /// Overrides the configured vision standard deviations
    pub std_devs: Option<[f64; 3]>,
}

/// Odometry integrator with vision correction.
///
/// Heading always comes from the gyro plus an offset fixed at reset; vision
/// corrections to heading move that offset so later odometry keeps them.
#[derive(Debug, Clone)]
pub struct PoseEstimator {
    config: EstimatorConfig,
    pose: Pose2d,
    heading_offset: Rotation2d,
    last_timestamp: f64,
    vision_applied: u64,
}

impl PoseEstimator {
    pub fn new(config: EstimatorConfig, initial: Pose2d, gyro_heading: Rotation2d) -> Self {
        Self {
            config,
            pose: initial,
            heading_offset: initial.heading - gyro_heading,
            last_timestamp: 0.0,
            vision_applied: 0,
        }
    }

    pub fn pose(&self) -> Pose2d {
        self.pose
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn vision_measurements_applied(&self) -> u64 {
        self.vision_applied
    }

    /// Integrate one odometry step. `twist.dtheta` is replaced by the gyro delta.
    pub fn update(&mut self, timestamp: f64, gyro_heading: Rotation2d, twist: Twist2d) -> Pose2d {
        let heading = (gyro_heading + self.heading_offset).wrapped();
        let dtheta = self.pose.heading.delta_to(heading).radians();

        let mut next = self.pose.exp(Twist2d { dtheta, ..twist });
        next.heading = heading;

        self.pose = next;
        self.last_timestamp = self.last_timestamp.max(timestamp);
        self.pose
    }

    /// Jump to `pose`; the gyro keeps its own zero
    pub fn reset(&mut self, pose: Pose2d, gyro_heading: Rotation2d) {
        debug!(
            "Pose reset to ({:.3}, {:.3}, {:.1} deg)",
            pose.x(),
            pose.y(),
            pose.heading.degrees()
        );
        self.heading_offset = pose.heading - gyro_heading;
        self.pose = Pose2d {
            heading: pose.heading.wrapped(),
            ..pose
        };
    }

    /// Blend one vision pose into the estimate. Returns false if it was rejected.
    pub fn add_vision_measurement(&mut self, measurement: &VisionMeasurement) -> bool {
        if !measurement.pose.is_finite() || !measurement.timestamp.is_finite() {
            warn!("Dropping non-finite vision measurement");
            return false;
        }

        let age = self.last_timestamp - measurement.timestamp;
        if age > self.config.max_vision_latency {
            debug!("Dropping vision measurement {:.3}s old", age);
            return false;
        }

        let vision_std_devs = measurement.std_devs.unwrap_or(self.config.vision_std_devs);
        let [kx, ky, kt] = std::array::from_fn(|i| {
            vision_gain(self.config.state_std_devs[i], vision_std_devs[i])
        });

        let error_heading = self.pose.heading.delta_to(measurement.pose.heading).radians();
        let correction_heading = Rotation2d::from_radians(kt * error_heading);

        self.pose.translation.x += kx * (measurement.pose.x() - self.pose.x());
        self.pose.translation.y += ky * (measurement.pose.y() - self.pose.y());
        self.pose.heading = (self.pose.heading + correction_heading).wrapped();
        self.heading_offset = self.heading_offset + correction_heading;
        self.vision_applied += 1;
        true
    }
}

// Steady-state Kalman gain for one diagonal axis
fn vision_gain(state_std_dev: f64, vision_std_dev: f64) -> f64 {
    let q = state_std_dev * state_std_dev;
    let r = vision_std_dev * vision_std_dev;
    if q == 0.0 { 0.0 } else { q / (q + (q * r).sqrt()) }
}

/// Thread-safe handle to one [`PoseEstimator`]; clones share the estimate
#[derive(Debug, Clone)]
pub struct SharedPoseEstimator {
    inner: Arc<Mutex<PoseEstimator>>,
}

impl SharedPoseEstimator {
    pub fn new(estimator: PoseEstimator) -> Self {
        Self {
            inner: Arc::new(Mutex::new(estimator)),
        }
    }

    pub fn pose(&self) -> Pose2d {
        self.lock().pose()
    }

    pub fn update_pose(&self, timestamp: f64, gyro_heading: Rotation2d, twist: Twist2d) -> Pose2d {
        self.lock().update(timestamp, gyro_heading, twist)
    }

    pub fn reset_pose(&self, pose: Pose2d, gyro_heading: Rotation2d) {
        self.lock().reset(pose, gyro_heading)
    }

    /// Apply a batch atomically; returns how many were accepted
    pub fn add_vision_measurements(&self, measurements: &[VisionMeasurement]) -> usize {
        let mut estimator = self.lock();
        measurements
            .iter()
            .filter(|m| estimator.add_vision_measurement(m))
            .count()
    }

    pub fn vision_measurements_applied(&self) -> u64 {
        self.lock().vision_measurements_applied()
    }

    fn lock(&self) -> MutexGuard<'_, PoseEstimator> {
        // The estimate stays usable even if a writer panicked mid-update
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
