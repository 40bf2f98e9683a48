// One motor slot on a Me Encoder Motor driver board
//
// Tracks the last commanded speed, turns intents into frames and pushes them
// over the shared bus. Every send is followed by a short refractory delay.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::cooldown::CooldownTimer;
use super::kinematics::{angle_move_time, seconds_to_duration};
use crate::bus::{BusError, SharedBus, with_bus};
use crate::protocol::{FRAME_OVERHEAD, FrameError, MotorCommand, clamp_speed, decode};

/// Length of a speed reply frame: slot + opcode + one f32
pub const SPEED_REPLY_LEN: usize = FRAME_OVERHEAD + 2 + 4;

/// Error types for motor commands
#[derive(Debug, thiserror::Error)]
pub enum MotorError {
    #[error("Motor {slot} at 0x{address:02X} cannot be run, check that it is powered")]
    Unavailable { address: u8, slot: u8 },

    #[error("Invalid motor slot {0}, expected 1 or 2")]
    InvalidSlot(u8),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Invalid reply frame: {0}")]
    Frame(#[from] FrameError),
}

impl MotorError {
    /// Conditions the pursuit loop skips and retries on its next pass
    pub fn is_recoverable(&self) -> bool {
        match self {
            MotorError::Unavailable { .. } => true,
            MotorError::Bus(e) => e.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MotorError>;

/// State shared between the channel and its cooldown task
struct ChannelState {
    bus: SharedBus,
    address: u8,
    slot: u8,
    current_speed: f32,
    command_delay: Duration,
}

impl ChannelState {
    /// Encode, send and wait out the driver's refractory period
    async fn send(&mut self, command: MotorCommand) -> Result<()> {
        let frame = command.encode(self.slot);
        let address = self.address;
        debug!(
            "Motor 0x{:02X}/{}: {:?} -> {:02X?}",
            address, self.slot, command, frame
        );
        with_bus(&self.bus, |bus| bus.send(&frame, address))?;
        tokio::time::sleep(self.command_delay).await;
        Ok(())
    }

    fn is_ready(&self) -> Result<bool> {
        let address = self.address;
        Ok(with_bus(&self.bus, |bus| bus.is_ready(address))?)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_ready()? {
            Ok(())
        } else {
            Err(MotorError::Unavailable {
                address: self.address,
                slot: self.slot + 1,
            })
        }
    }

    async fn stop(&mut self) -> Result<()> {
        self.send(MotorCommand::Stop).await?;
        self.current_speed = 0.0;
        Ok(())
    }
}

/// A single motor on the bus
pub struct MotorChannel {
    name: &'static str,
    address: u8,
    slot: u8,
    state: Arc<Mutex<ChannelState>>,
    stopper: CooldownTimer,
}

impl MotorChannel {
    /// Create a channel for `slot` (1 or 2) of the driver board at `address`
    pub fn new(
        name: &'static str,
        bus: SharedBus,
        address: u8,
        slot: u8,
        command_delay: Duration,
    ) -> Result<Self> {
        if !(1..=2).contains(&slot) {
            return Err(MotorError::InvalidSlot(slot));
        }

        let state = Arc::new(Mutex::new(ChannelState {
            bus,
            address,
            slot: slot - 1,
            current_speed: 0.0,
            command_delay,
        }));

        let target = Arc::clone(&state);
        let stopper = CooldownTimer::new(move || {
            let target = Arc::clone(&target);
            async move {
                debug!("Cooldown expired for {} motor", name);
                if let Err(e) = target.lock().await.stop().await {
                    warn!("Cooldown stop of {} motor failed: {}", name, e);
                }
            }
        });

        info!("Motor channel '{}' on 0x{:02X}, slot {}", name, address, slot);
        Ok(Self {
            name,
            address,
            slot: slot - 1,
            state,
            stopper,
        })
    }

    /// Run at `speed` RPM, optionally for `time` only.
    ///
    /// Without a time limit the command is skipped when the speed is unchanged.
    /// With a time limit the command is always sent and the cooldown is re-armed.
    pub async fn run_at_speed(&mut self, speed: f32, time: Option<Duration>) -> Result<()> {
        let speed = clamp_speed(speed);
        let time = time.filter(|t| !t.is_zero());

        let mut state = self.state.lock().await;
        state.ensure_ready()?;

        if speed == state.current_speed && time.is_none() {
            return Ok(());
        }

        let command = match time {
            Some(t) => {
                // A stale stop must not land after the new command
                self.stopper.cancel();
                MotorCommand::RunAtSpeedForTime {
                    speed,
                    time: t.as_secs_f32(),
                }
            }
            None => MotorCommand::RunAtSpeed { speed },
        };
        state.send(command).await?;
        state.current_speed = speed;
        drop(state);

        if let Some(t) = time {
            self.stopper.start(t);
        }
        Ok(())
    }

    /// Turn the shaft by `angle` degrees at `speed` RPM. Never deduplicated.
    pub async fn move_by_angle(&mut self, angle: f32, speed: f32) -> Result<()> {
        let speed = clamp_speed(speed);

        let mut state = self.state.lock().await;
        state.ensure_ready()?;

        self.stopper.cancel();
        state
            .send(MotorCommand::RotateByAngle { angle, speed })
            .await?;
        state.current_speed = speed;
        drop(state);

        // Busy until the board has finished the move
        if let Some(t) = seconds_to_duration(angle_move_time(angle, speed)) {
            self.stopper.start(t);
        }
        Ok(())
    }

    /// Reset the motor and forget the commanded speed
    pub async fn stop(&mut self) -> Result<()> {
        self.stopper.cancel();
        self.state.lock().await.stop().await
    }

    /// Read the speed reported by the driver board (diagnostics only)
    pub async fn query_speed(&mut self) -> Result<f32> {
        let mut state = self.state.lock().await;
        state.send(MotorCommand::QuerySpeed).await?;

        let mut reply = [0u8; SPEED_REPLY_LEN];
        let address = state.address;
        with_bus(&state.bus, |bus| bus.receive(&mut reply, address))?;

        // Skip the echoed slot and opcode
        let frame = decode(&reply)?;
        frame.f32_arg(0).ok_or(MotorError::Frame(FrameError::TooShort {
            len: reply.len(),
        }))
    }

    /// Addresses of every slave answering on this channel's bus
    pub async fn scan(&self) -> Result<Vec<u8>> {
        let state = self.state.lock().await;
        Ok(with_bus(&state.bus, |bus| bus.scan())?)
    }

    /// Last commanded speed (0 once stopped)
    pub async fn current_speed(&self) -> f32 {
        self.state.lock().await.current_speed
    }

    /// Whether a timed command is still waiting for its automatic stop
    pub fn cooldown_armed(&self) -> bool {
        self.stopper.is_armed()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// 0-based slot index
    pub fn slot(&self) -> u8 {
        self.slot
    }
}
