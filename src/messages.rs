// Define message types for the runtime

use serde::{Deserialize, Serialize};

// Ball blob from the camera process -> runtime (pixels)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BlobObservation {
    pub cx: f32,
    pub cy: f32,
    pub height: f32,
}

/// Where the controller thinks the target is
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TargetEstimate {
    /// Degrees, positive = target to the right
    pub bearing_deg: f32,
    pub distance_mm: f32,
}

/// A motor command sequence issued by one pursuit step
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Maneuver {
    Rotate { angle_deg: f32, speed: f32 },
    Translate { distance_mm: f32, speed: f32 },
    Creep { speed: f32 },
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RobotHealth {
    #[default]
    Ok,
    /// No target in view
    Searching,
    /// A motor did not acknowledge on the last step
    MotorUnavailable,
}

// Telemetry published once per loop iteration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RobotStatus {
    pub health: RobotHealth,
    pub left_speed: f32,
    pub right_speed: f32,
    pub target: Option<TargetEstimate>,
    pub maneuvers: Vec<Maneuver>,
}

/// Aux sensor board reading (millimeters / raw line sensor values)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct SensorReading {
    pub front_distance: u16,
    pub back_distance: u16,
    pub line: [u16; 4],
}
