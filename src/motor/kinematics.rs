// Differential-drive geometry for the two-wheeled base
// Converts distances and turn angles into timed wheel commands.

use std::f32::consts::PI;
use std::time::Duration;

use crate::config::{ROTATION_FRICTION_FACTOR, TRACK_WIDTH_MM, WHEEL_DIAMETER_MM};

/// Wheel and chassis dimensions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveGeometry {
    pub wheel_diameter_mm: f32,
    /// Distance between the two wheel contact points
    pub track_width_mm: f32,
    /// Empirical correction applied to in-place turn durations (< 1.0)
    pub friction_factor: f32,
}

impl Default for DriveGeometry {
    fn default() -> Self {
        Self {
            wheel_diameter_mm: WHEEL_DIAMETER_MM,
            track_width_mm: TRACK_WIDTH_MM,
            friction_factor: ROTATION_FRICTION_FACTOR,
        }
    }
}

impl DriveGeometry {
    /// Seconds needed to cover `distance_mm` at `speed_rpm`.
    /// Infinite when the speed is zero.
    pub fn time_for_distance(&self, distance_mm: f32, speed_rpm: f32) -> f32 {
        let rotations = distance_mm / (self.wheel_diameter_mm * PI);
        rotations * 60.0 / speed_rpm.abs()
    }

    /// Arc each wheel travels during an in-place turn of `angle_deg`
    pub fn rotation_arc_mm(&self, angle_deg: f32) -> f32 {
        angle_deg.rem_euclid(360.0) / 360.0 * PI * self.track_width_mm
    }

    /// Friction-corrected seconds for an in-place turn of `angle_deg`
    pub fn rotation_time(&self, angle_deg: f32, speed_rpm: f32) -> f32 {
        self.time_for_distance(self.rotation_arc_mm(angle_deg), speed_rpm) * self.friction_factor
    }
}

/// Rewrite a turn so that its angle is non-negative, flipping the speed sign
pub fn canonical_rotation(speed_rpm: f32, angle_deg: f32) -> (f32, f32) {
    if angle_deg < 0.0 {
        (-speed_rpm, -angle_deg)
    } else {
        (speed_rpm, angle_deg)
    }
}

/// Seconds a motor needs to turn its shaft by `angle_deg` at `speed_rpm`
pub fn angle_move_time(angle_deg: f32, speed_rpm: f32) -> f32 {
    (angle_deg.abs() / 360.0 * 60.0) / speed_rpm.abs()
}

/// Convert seconds to a non-zero duration. `None` for zero, negative, NaN or infinite input.
pub fn seconds_to_duration(seconds: f32) -> Option<Duration> {
    Duration::try_from_secs_f32(seconds)
        .ok()
        .filter(|d| !d.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> DriveGeometry {
        DriveGeometry {
            wheel_diameter_mm: 80.0,
            track_width_mm: 150.0,
            friction_factor: 0.9,
        }
    }

    #[test]
    fn test_time_for_distance() {
        // 251.2 / (80 * pi) rotations at 100 RPM
        let t = geometry().time_for_distance(251.2, 100.0);
        assert!((t - 0.6).abs() < 0.01, "got {}", t);
    }

    #[test]
    fn test_time_for_distance_ignores_speed_sign() {
        let g = geometry();
        assert_eq!(g.time_for_distance(300.0, -150.0), g.time_for_distance(300.0, 150.0));
        assert!(g.time_for_distance(300.0, 0.0).is_infinite());
    }

    #[test]
    fn test_rotation_arc() {
        let g = geometry();
        // Half a turn covers half the track circumference
        assert!((g.rotation_arc_mm(180.0) - PI * 150.0 / 2.0).abs() < 1e-3);
        assert!((g.rotation_arc_mm(450.0) - g.rotation_arc_mm(90.0)).abs() < 1e-3);
        assert_eq!(g.rotation_arc_mm(360.0), 0.0);
    }

    #[test]
    fn test_rotation_time_applies_friction() {
        let g = geometry();
        let raw = g.time_for_distance(g.rotation_arc_mm(90.0), 30.0);
        assert!((g.rotation_time(90.0, 30.0) - raw * 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_canonical_rotation() {
        assert_eq!(canonical_rotation(-30.0, -90.0), (30.0, 90.0));
        assert_eq!(canonical_rotation(30.0, 90.0), (30.0, 90.0));
        assert_eq!(canonical_rotation(30.0, -45.0), (-30.0, 45.0));
    }

    #[test]
    fn test_angle_move_time() {
        // One full shaft turn at 60 RPM takes one second
        assert!((angle_move_time(360.0, 60.0) - 1.0).abs() < 1e-6);
        assert!((angle_move_time(-180.0, -60.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_seconds_to_duration() {
        assert_eq!(seconds_to_duration(0.5), Some(Duration::from_millis(500)));
        assert_eq!(seconds_to_duration(0.0), None);
        assert_eq!(seconds_to_duration(-1.0), None);
        assert_eq!(seconds_to_duration(f32::INFINITY), None);
        assert_eq!(seconds_to_duration(f32::NAN), None);
    }
}
