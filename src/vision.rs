// Camera collaborator
//
// The camera process segments the ball and publishes its blob over zenoh.
// This module keeps the freshest blob and turns it into bearing and distance.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::Subscriber;
use zenoh::sample::Sample;

use crate::config::{
    BALL_DIAMETER_MM, FOCAL_LENGTH_MM, HORIZONTAL_FOV_DEG, IMAGE_WIDTH_PX, PIXEL_WIDTH_MM,
    RobotConfig, TOPIC_VISION_BLOB,
};
use crate::messages::BlobObservation;

/// Source of ball observations
pub trait Vision {
    /// Latest ball blob, `None` when the ball is not in view
    fn ball_blob(&mut self) -> impl Future<Output = Option<BlobObservation>> + Send;

    /// Estimated distance to the ball, in millimeters
    fn distance_to(&self, blob: &BlobObservation) -> f32;

    /// Horizontal angle to the ball in degrees, positive to the right
    fn bearing_angle(&self, blob: &BlobObservation) -> f32;
}

/// Fixed camera and target geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraGeometry {
    pub image_width_px: f32,
    pub horizontal_fov_deg: f32,
    pub focal_length_mm: f32,
    pub pixel_width_mm: f32,
    pub ball_diameter_mm: f32,
}

impl Default for CameraGeometry {
    fn default() -> Self {
        Self {
            image_width_px: IMAGE_WIDTH_PX,
            horizontal_fov_deg: HORIZONTAL_FOV_DEG,
            focal_length_mm: FOCAL_LENGTH_MM,
            pixel_width_mm: PIXEL_WIDTH_MM,
            ball_diameter_mm: BALL_DIAMETER_MM,
        }
    }
}

impl From<&RobotConfig> for CameraGeometry {
    fn from(config: &RobotConfig) -> Self {
        Self {
            image_width_px: config.image_width_px,
            horizontal_fov_deg: config.horizontal_fov_deg,
            focal_length_mm: config.focal_length_mm,
            pixel_width_mm: config.pixel_width_mm,
            ball_diameter_mm: config.ball_diameter_mm,
        }
    }
}

impl CameraGeometry {
    /// Focal length expressed in pixels
    pub fn focal_length_px(&self) -> f32 {
        self.focal_length_mm / self.pixel_width_mm
    }

    /// Pinhole model: real size * focal length / apparent size
    pub fn distance_mm(&self, blob: &BlobObservation) -> f32 {
        // A blob is never less than one pixel tall
        self.ball_diameter_mm * self.focal_length_px() / blob.height.max(1.0)
    }

    /// Linear mapping of the centroid offset onto the field of view
    pub fn bearing_deg(&self, blob: &BlobObservation) -> f32 {
        let half_fov = self.horizontal_fov_deg / 2.0;
        let offset = (blob.cx - self.image_width_px / 2.0) / self.image_width_px;
        (offset * self.horizontal_fov_deg).clamp(-half_fov, half_fov)
    }
}

/// Most recent observation with a staleness window
#[derive(Debug, Clone)]
pub struct LatestObservation {
    latest: Option<(BlobObservation, Instant)>,
    timeout: Duration,
}

impl LatestObservation {
    pub fn new(timeout: Duration) -> Self {
        Self {
            latest: None,
            timeout,
        }
    }

    pub fn on_observation(&mut self, blob: BlobObservation) {
        self.latest = Some((blob, Instant::now()));
    }

    /// The last observation, unless it has gone stale
    pub fn current(&self) -> Option<BlobObservation> {
        match self.latest {
            Some((blob, received_at)) if received_at.elapsed() <= self.timeout => Some(blob),
            _ => None,
        }
    }
}

/// Ball observations received over zenoh
pub struct ZenohVision {
    subscriber: Subscriber<FifoChannelHandler<Sample>>,
    latest: LatestObservation,
    geometry: CameraGeometry,
}

impl ZenohVision {
    pub async fn declare(
        session: &zenoh::Session,
        geometry: CameraGeometry,
        timeout: Duration,
    ) -> zenoh::Result<Self> {
        let subscriber = session.declare_subscriber(TOPIC_VISION_BLOB).await?;
        debug!("Subscribed to: {}", TOPIC_VISION_BLOB);
        Ok(Self {
            subscriber,
            latest: LatestObservation::new(timeout),
            geometry,
        })
    }
}

impl Vision for ZenohVision {
    async fn ball_blob(&mut self) -> Option<BlobObservation> {
        // Drain all pending samples (non-blocking), keep latest
        while let Ok(Some(sample)) = self.subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<BlobObservation>(&payload) {
                Ok(blob) => self.latest.on_observation(blob),
                Err(e) => warn!("Failed to parse blob: {}", e),
            }
        }
        self.latest.current()
    }

    fn distance_to(&self, blob: &BlobObservation) -> f32 {
        self.geometry.distance_mm(blob)
    }

    fn bearing_angle(&self, blob: &BlobObservation) -> f32 {
        self.geometry.bearing_deg(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(cx: f32, height: f32) -> BlobObservation {
        BlobObservation { cx, cy: 120.0, height }
    }

    #[test]
    fn test_centered_blob_is_straight_ahead() {
        let camera = CameraGeometry::default();
        assert_eq!(camera.bearing_deg(&blob(160.0, 40.0)), 0.0);
    }

    #[test]
    fn test_bearing_sign_and_bounds() {
        let camera = CameraGeometry::default();
        assert!(camera.bearing_deg(&blob(240.0, 40.0)) > 0.0);
        assert!(camera.bearing_deg(&blob(80.0, 40.0)) < 0.0);
        assert_eq!(camera.bearing_deg(&blob(320.0, 40.0)), 70.8 / 2.0);
        assert_eq!(camera.bearing_deg(&blob(-50.0, 40.0)), -70.8 / 2.0);
    }

    #[test]
    fn test_distance_shrinks_as_blob_grows() {
        let camera = CameraGeometry::default();
        let far = camera.distance_mm(&blob(160.0, 20.0));
        let near = camera.distance_mm(&blob(160.0, 80.0));
        assert!(near < far);
        // 70 mm ball, 2.8 / 0.012 px focal length, 70 px tall
        let d = camera.distance_mm(&blob(160.0, 70.0));
        assert!((d - 233.33).abs() < 0.1, "got {}", d);
        assert!(camera.distance_mm(&blob(160.0, 0.0)).is_finite());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_observation_goes_stale() {
        let mut latest = LatestObservation::new(Duration::from_millis(250));
        assert_eq!(latest.current(), None);

        latest.on_observation(blob(100.0, 30.0));
        latest.on_observation(blob(200.0, 30.0));
        assert_eq!(latest.current(), Some(blob(200.0, 30.0)));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(latest.current(), None);
    }
}
