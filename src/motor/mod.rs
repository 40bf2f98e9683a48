// Motor control module for the two-wheeled base
//
// Provides:
// - Per-motor command channel over the shared bus
// - Cooldown timer that stops a motor once a timed command expires
// - Differential-drive geometry (distance/angle -> run time)

mod channel;
pub mod cooldown;
pub mod kinematics;

pub use channel::{MotorChannel, MotorError, SPEED_REPLY_LEN};
pub use cooldown::CooldownTimer;
pub use kinematics::DriveGeometry;
