use crate::geometry::Rotation2d;

/// Yaw source for odometry. Counter-clockwise positive, continuous (not wrapped).
pub trait Gyro {
    fn heading(&self) -> Rotation2d;

    fn set_heading(&mut self, heading: Rotation2d);
}

impl<G: Gyro + ?Sized> Gyro for &mut G {
    fn heading(&self) -> Rotation2d {
        (**self).heading()
    }

    fn set_heading(&mut self, heading: Rotation2d) {
        (**self).set_heading(heading)
    }
}
