// Keyboard teleop: WASD translate, Z/X rotate, R/F speed, G field-relative, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use frc_drive_runtime::config::TOPIC_CMD_CHASSIS;
use frc_drive_runtime::messages::ChassisCommand;

const SPEEDS: [f64; 3] = [0.5, 1.5, 3.0]; // m/s
const OMEGA_SPEEDS: [f64; 3] = [0.5, 1.5, 3.0]; // rad/s
const INPUT_TIMEOUT_MS: u64 = 100; // Reset velocities after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_CHASSIS).await?;

    info!("Controls: WASD=move, Z/X=rotate, R/F=speed, G=field-relative, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;
    let mut field_relative = false;

    let mut cmd = ChassisCommand {
        vx: 0.0,
        vy: 0.0,
        omega: 0.0,
        field_relative,
    };
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                let speed = SPEEDS[speed_idx];

                match code {
                    KeyCode::Char('w') if pressed => {
                        cmd.vx = speed;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        cmd.vx = -speed;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        cmd.vy = speed;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        cmd.vy = -speed;
                        last_movement_input = Instant::now();
                    }

                    // Rotation, counter-clockwise positive
                    KeyCode::Char('z') if pressed => {
                        cmd.omega = OMEGA_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('x') if pressed => {
                        cmd.omega = -OMEGA_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    KeyCode::Char('g') if kind == KeyEventKind::Press => {
                        field_relative = !field_relative;
                        info!("Field-relative: {}", field_relative);
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Reset velocities if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            cmd.vx = 0.0;
            cmd.vy = 0.0;
            cmd.omega = 0.0;
        }
        cmd.field_relative = field_relative;

        // Always publish at ~50Hz so the runtime watchdog stays fed
        publisher.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
