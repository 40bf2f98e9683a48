// Timing, wiring, geometry and topics
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// Pursuit loop period (~20 perceptions per second)
pub const LOOP_PERIOD: Duration = Duration::from_millis(50);

// Refractory delay of the motor driver board after every command
pub const COMMAND_DELAY: Duration = Duration::from_millis(20);

// Observations older than this are treated as "no target"
pub const OBSERVATION_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_VISION_BLOB: &str = "ballchaser/vision/blob"; // camera -> runtime
pub const TOPIC_STATUS: &str = "ballchaser/state/status"; // telemetry
pub const TOPIC_HEALTH: &str = "ballchaser/state/health"; // health status
pub const TOPIC_SENSORS: &str = "ballchaser/state/sensors"; // aux sensor board

// Serial port of the USB-to-I2C bridge
pub const BRIDGE_PORT: &str = "/dev/ttyACM0";

// Motor driver board: I2C bus 4, address 0x09, right motor in slot 1, left in slot 2
pub const MOTOR_BUS_PIN: u8 = 4;
pub const MOTOR_ADDRESS: u8 = 0x09;
pub const RIGHT_MOTOR_SLOT: u8 = 1;
pub const LEFT_MOTOR_SLOT: u8 = 2;

// Distance/line sensor board on I2C bus 2
pub const SENSOR_BUS_PIN: u8 = 2;
pub const SENSOR_ADDRESS: u8 = 0x10;

// Drivetrain (millimeters)
pub const WHEEL_DIAMETER_MM: f32 = 80.0;
pub const TRACK_WIDTH_MM: f32 = 150.0;
pub const ROTATION_FRICTION_FACTOR: f32 = 0.9;

// Pursuit behaviour (RPM, degrees)
pub const DEAD_BAND_DEG: f32 = 5.0;
pub const ROTATION_SPEED: f32 = 50.0;
pub const PURSUIT_SPEED: f32 = 150.0;
pub const CREEP_SPEED: f32 = 50.0;

// Camera (OV7725 at QVGA) and target
pub const IMAGE_WIDTH_PX: f32 = 320.0;
pub const HORIZONTAL_FOV_DEG: f32 = 70.8;
pub const FOCAL_LENGTH_MM: f32 = 2.8;
pub const PIXEL_WIDTH_MM: f32 = 0.012;
pub const BALL_DIAMETER_MM: f32 = 70.0;

// Log file used when not in debug mode
pub const LOG_FILE: &str = "robot.log";

/// Error loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Runtime configuration. Every field falls back to the constants above.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RobotConfig {
    pub bridge_port: String,
    /// Use the in-memory bus instead of the serial bridge
    pub simulate: bool,

    pub motor_bus_pin: u8,
    pub motor_address: u8,
    pub right_motor_slot: u8,
    pub left_motor_slot: u8,
    pub command_delay_ms: u64,

    /// Read the aux sensor board and publish its readings
    pub sensors_enabled: bool,
    pub sensor_bus_pin: u8,
    pub sensor_address: u8,

    pub loop_period_ms: u64,
    pub observation_timeout_ms: u64,

    pub wheel_diameter_mm: f32,
    pub track_width_mm: f32,
    pub rotation_friction_factor: f32,

    pub dead_band_deg: f32,
    pub rotation_speed: f32,
    pub pursuit_speed: f32,
    pub creep_speed: f32,

    pub image_width_px: f32,
    pub horizontal_fov_deg: f32,
    pub focal_length_mm: f32,
    pub pixel_width_mm: f32,
    pub ball_diameter_mm: f32,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            bridge_port: BRIDGE_PORT.to_string(),
            simulate: false,
            motor_bus_pin: MOTOR_BUS_PIN,
            motor_address: MOTOR_ADDRESS,
            right_motor_slot: RIGHT_MOTOR_SLOT,
            left_motor_slot: LEFT_MOTOR_SLOT,
            command_delay_ms: COMMAND_DELAY.as_millis() as u64,
            sensors_enabled: false,
            sensor_bus_pin: SENSOR_BUS_PIN,
            sensor_address: SENSOR_ADDRESS,
            loop_period_ms: LOOP_PERIOD.as_millis() as u64,
            observation_timeout_ms: OBSERVATION_TIMEOUT.as_millis() as u64,
            wheel_diameter_mm: WHEEL_DIAMETER_MM,
            track_width_mm: TRACK_WIDTH_MM,
            rotation_friction_factor: ROTATION_FRICTION_FACTOR,
            dead_band_deg: DEAD_BAND_DEG,
            rotation_speed: ROTATION_SPEED,
            pursuit_speed: PURSUIT_SPEED,
            creep_speed: CREEP_SPEED,
            image_width_px: IMAGE_WIDTH_PX,
            horizontal_fov_deg: HORIZONTAL_FOV_DEG,
            focal_length_mm: FOCAL_LENGTH_MM,
            pixel_width_mm: PIXEL_WIDTH_MM,
            ball_diameter_mm: BALL_DIAMETER_MM,
        }
    }
}

impl RobotConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn command_delay(&self) -> Duration {
        Duration::from_millis(self.command_delay_ms)
    }

    pub fn loop_period(&self) -> Duration {
        Duration::from_millis(self.loop_period_ms)
    }

    pub fn observation_timeout(&self) -> Duration {
        Duration::from_millis(self.observation_timeout_ms)
    }
}
