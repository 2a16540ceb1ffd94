use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use frc_drive_runtime::config::DriveConfig;

/// Simulated swerve drivetrain driven over zenoh
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Drivetrain config (JSON); built-in 4-module base if omitted
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init(); // installs the subscriber globally

    let args = Args::parse();
    let config = match args.config {
        Some(path) => match DriveConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Config error: {}", e);
                std::process::exit(2);
            }
        },
        None => {
            info!("No config given, using default drivetrain");
            DriveConfig::default()
        }
    };

    if let Err(e) = frc_drive_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
