// 50 Hz control loop with watchdog and a vision listener
// Note: the watchdog zeroes chassis speeds once commands stop arriving (eg. teleop crashed)
//
// The vision listener runs on its own task and writes into the shared pose
// estimator while the loop reads and updates it; the estimator's mutex is
// the only synchronization between them.

use std::time::{Duration, Instant};

use tokio::time::interval;
use tracing::{debug, info, warn};
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::Subscriber;
use zenoh::sample::Sample;

use crate::config::{
    CMD_TIMEOUT, DriveConfig, LOOP_HZ, TOPIC_CMD_CHASSIS, TOPIC_HEALTH, TOPIC_STATE_POSE,
    TOPIC_VISION_POSE,
};
use crate::drive::{ChassisSpeeds, SharedPoseEstimator, SwerveDrive, SwerveModule};
use crate::error::ConfigError;
use crate::geometry::Translation2d;
use crate::messages::{ChassisCommand, PoseReport, RuntimeHealth, VisionMessage};
use crate::motor::{AngularAsLinear, Converted, SimGyro, SimMotor};
use crate::scheduler::Scheduler;

pub type SimSwerveDrive = SwerveDrive<SimMotor, AngularAsLinear<SimMotor>, SimGyro>;

/// Simulated swerve robot: drivetrain plus the physics it needs stepped
pub struct SimRobot {
    pub drive: SimSwerveDrive,
    pub gyro: SimGyro,
    pub scheduler: Scheduler,
}

impl SimRobot {
    pub fn from_config(config: &DriveConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let factor = config.drive_factor()?;
        let mut scheduler = Scheduler::new();

        let modules = config
            .modules
            .iter()
            .map(|m| {
                let steer = SimMotor::new(config.steer_motor);
                let drive = SimMotor::new(config.drive_motor);
                scheduler.register(Box::new(steer.clone()));
                scheduler.register(Box::new(drive.clone()));
                SwerveModule::new(
                    m.name.clone(),
                    Translation2d::new(m.x, m.y),
                    steer,
                    Converted::new(drive, factor),
                )
            })
            .collect();

        let gyro = SimGyro::new();
        let drive = SwerveDrive::new(modules, gyro.clone(), config.swerve_drive_config())?;
        Ok(Self {
            drive,
            gyro,
            scheduler,
        })
    }

    /// One control cycle: command, advance physics, integrate odometry
    pub fn step(
        &mut self,
        cmd: &ChassisCommand,
        dt: Duration,
        timestamp: f64,
    ) -> Result<PoseReport, Box<dyn std::error::Error + Send + Sync>> {
        let speeds = ChassisSpeeds::from(cmd);
        if cmd.field_relative {
            self.drive.drive_field_relative(speeds)?;
        } else {
            self.drive.drive_chassis_speeds(speeds)?;
        }

        self.scheduler.tick(dt);
        let measured = self.drive.chassis_speeds();
        self.gyro.integrate(measured.omega, dt);

        let pose = self.drive.update_pose(timestamp)?;
        Ok(PoseReport::new(pose, measured, timestamp))
    }
}

pub struct Runtime {
    latest_cmd: Option<ChassisCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: ChassisCommand) {
        debug!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    /// Command to apply this cycle, after the watchdog
    pub fn compute_command(&mut self) -> ChassisCommand {
        self.compute_command_at(Instant::now())
    }

    fn compute_command_at(&mut self, now: Instant) -> ChassisCommand {
        let cmd_age = now.saturating_duration_since(self.cmd_received_at);
        let stop = ChassisCommand {
            vx: 0.0,
            vy: 0.0,
            omega: 0.0,
            field_relative: false,
        };

        if cmd_age > CMD_TIMEOUT {
            // Watchdog triggered - stop the robot
            if self.health != RuntimeHealth::CmdStale {
                warn!("Command stale ({:?} old), stopping robot", cmd_age);
            }
            self.health = RuntimeHealth::CmdStale;
            stop
        } else if let Some(cmd) = self.latest_cmd {
            self.health = RuntimeHealth::Ok;
            cmd
        } else {
            // No command ever received
            self.health = RuntimeHealth::CmdStale;
            stop
        }
    }
}

/// Feed camera poses into the estimator until the subscriber closes
async fn vision_listener(
    subscriber: Subscriber<FifoChannelHandler<Sample>>,
    estimator: SharedPoseEstimator,
    start: Instant,
) {
    while let Ok(sample) = subscriber.recv_async().await {
        let payload = sample.payload().to_bytes();
        match serde_json::from_slice::<VisionMessage>(&payload) {
            Ok(msg) => {
                let measurement = msg.into_measurement(start.elapsed().as_secs_f64());
                if estimator.add_vision_measurements(&[measurement]) == 0 {
                    debug!("Vision measurement rejected");
                }
            }
            Err(e) => {
                warn!("Failed to parse vision message: {}", e);
            }
        }
    }
    info!("Vision listener stopped");
}

pub async fn run(config: DriveConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut robot = SimRobot::from_config(&config)?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_CHASSIS).await?;
    let vision_subscriber = session.declare_subscriber(TOPIC_VISION_POSE).await?;
    let pub_pose = session.declare_publisher(TOPIC_STATE_POSE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let start = Instant::now();
    tokio::spawn(vision_listener(vision_subscriber, robot.drive.estimator(), start));

    let mut runtime = Runtime::new();
    let period = Duration::from_millis(1000 / LOOP_HZ);
    let mut tick = interval(period);

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout, {} modules",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis(),
        config.modules.len()
    );
    info!("Subscribed to: {}, {}", TOPIC_CMD_CHASSIS, TOPIC_VISION_POSE);
    info!("Publishing to: {}, {}", TOPIC_STATE_POSE, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<ChassisCommand>(&payload) {
                Ok(cmd) => {
                    runtime.on_command(cmd);
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }

        // 2. Compute command (includes watchdog logic) and drive
        let cmd = runtime.compute_command();
        let report = robot.step(&cmd, period, start.elapsed().as_secs_f64())?;

        // 3. Publish pose
        let report_json = serde_json::to_string(&report)?;
        pub_pose.put(report_json).await?;

        // 4. Publish health
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::VisionMeasurement;
    use crate::geometry::{Pose2d, Rotation2d};
    use approx::assert_relative_eq;

    #[test]
    fn test_watchdog_starts_stale() {
        let mut runtime = Runtime::new();
        let cmd = runtime.compute_command();
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
        assert_eq!(cmd.vx, 0.0);
    }

    #[test]
    fn test_watchdog_passes_fresh_then_stops_stale() {
        let mut runtime = Runtime::new();
        let sent = ChassisCommand {
            vx: 1.0,
            vy: 0.0,
            omega: 0.5,
            field_relative: false,
        };
        runtime.on_command(sent);

        let now = Instant::now();
        assert_eq!(runtime.compute_command_at(now), sent);
        assert_eq!(runtime.health(), RuntimeHealth::Ok);

        let later = now + CMD_TIMEOUT + Duration::from_millis(1);
        assert_eq!(runtime.compute_command_at(later).vx, 0.0);
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_sim_robot_drives_forward() {
        let mut robot = SimRobot::from_config(&DriveConfig::default()).unwrap();
        let cmd = ChassisCommand {
            vx: 1.0,
            vy: 0.0,
            omega: 0.0,
            field_relative: false,
        };
        let dt = Duration::from_millis(20);
        let mut report = None;
        for i in 1..=50 {
            report = Some(robot.step(&cmd, dt, i as f64 * 0.02).unwrap());
        }
        let report = report.unwrap();
        assert_relative_eq!(report.vx, 1.0, epsilon = 1e-6);
        assert_relative_eq!(report.x, 1.0, epsilon = 1e-3);
        assert_eq!(robot.scheduler.len(), 8);
    }

    #[test]
    fn test_sim_robot_spins_and_tracks_heading() {
        let mut robot = SimRobot::from_config(&DriveConfig::default()).unwrap();
        let cmd = ChassisCommand {
            vx: 0.0,
            vy: 0.0,
            omega: 1.0,
            field_relative: false,
        };
        let dt = Duration::from_millis(20);
        // Let the steering settle first
        for i in 1..=10 {
            robot.step(&cmd, dt, i as f64 * 0.02).unwrap();
        }
        let before = robot.drive.pose().heading.radians();
        for i in 11..=35 {
            robot.step(&cmd, dt, i as f64 * 0.02).unwrap();
        }
        let turned = robot.drive.pose().heading.radians() - before;
        assert_relative_eq!(turned, 0.5, epsilon = 1e-3);
    }

    #[test]
    fn test_vision_reaches_running_robot() {
        let robot = SimRobot::from_config(&DriveConfig::default()).unwrap();
        let estimator = robot.drive.estimator();
        let accepted = estimator.add_vision_measurements(&[VisionMeasurement {
            pose: Pose2d::new(1.0, 0.0, Rotation2d::ZERO),
            timestamp: 0.0,
            std_devs: Some([0.1, 0.1, 0.1]),
        }]);
        assert_eq!(accepted, 1);
        assert_relative_eq!(robot.drive.pose().x(), 0.5, epsilon = 1e-12);
    }
}
