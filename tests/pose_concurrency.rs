//! Stress test: vision injection from a background thread while the control
//! loop reads and integrates the pose.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use frc_drive_runtime::drive::{
    EstimatorConfig, PoseEstimator, SharedPoseEstimator, VisionMeasurement,
};
use frc_drive_runtime::geometry::{Pose2d, Rotation2d, Twist2d};

const MEASUREMENTS: usize = 5_000;

#[test]
fn pose_reads_never_torn_by_vision_writer() {
    // Every write keeps x == y, so a half-applied update would break it
    let estimator = SharedPoseEstimator::new(PoseEstimator::new(
        EstimatorConfig::default(),
        Pose2d::default(),
        Rotation2d::ZERO,
    ));
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let estimator = estimator.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut accepted = 0;
            for i in 0..MEASUREMENTS {
                let v = (i % 100) as f64 * 0.25;
                accepted += estimator.add_vision_measurements(&[VisionMeasurement {
                    pose: Pose2d::new(v, v, Rotation2d::ZERO),
                    timestamp: f64::MAX,
                    std_devs: Some([0.1, 0.1, 0.1]),
                }]);
            }
            done.store(true, Ordering::Release);
            accepted
        })
    };

    let mut reads = 0u64;
    while !done.load(Ordering::Acquire) {
        let pose = estimator.pose();
        assert_eq!(pose.x(), pose.y(), "torn read at iteration {reads}");
        // Diagonal odometry keeps the invariant too
        let pose = estimator.update_pose(
            0.0,
            Rotation2d::ZERO,
            Twist2d {
                dx: 0.01,
                dy: 0.01,
                dtheta: 0.0,
            },
        );
        assert_eq!(pose.x(), pose.y());
        reads += 1;
    }

    let accepted = writer.join().unwrap();
    assert_eq!(accepted, MEASUREMENTS);
    assert_eq!(estimator.vision_measurements_applied(), MEASUREMENTS as u64);
}
