// Pursuit controller for the two-wheeled base
//
// Perceive -> decide -> act:
// 1. ask the camera for the ball
// 2. turn toward it when it is off-axis, drive to it once the wheels are idle
// 3. creep forward when nothing is in view
// 4. wait for the next tick
//
// Every move is open-loop: a speed plus a duration derived from one estimate.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::bus::SharedBus;
use crate::config::{
    CREEP_SPEED, DEAD_BAND_DEG, LOOP_PERIOD, PURSUIT_SPEED, ROTATION_SPEED, RobotConfig,
};
use crate::messages::{Maneuver, RobotHealth, RobotStatus, TargetEstimate};
use crate::motor::kinematics::{canonical_rotation, seconds_to_duration};
use crate::motor::{DriveGeometry, MotorChannel, MotorError};
use crate::vision::Vision;

/// Error types for the pursuit loop
#[derive(Debug, thiserror::Error)]
pub enum RobotError {
    #[error("Motor error: {0}")]
    Motor(#[from] MotorError),

    #[error("Pursuit loop interrupted by stop signal")]
    Interrupted,
}

/// Tuning of the pursuit behaviour
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PursuitSettings {
    /// Bearings smaller than this (degrees) are not corrected
    pub dead_band_deg: f32,
    pub rotation_speed: f32,
    pub pursuit_speed: f32,
    /// Forward speed while no target is in view
    pub creep_speed: f32,
    pub loop_period: Duration,
}

impl Default for PursuitSettings {
    fn default() -> Self {
        Self {
            dead_band_deg: DEAD_BAND_DEG,
            rotation_speed: ROTATION_SPEED,
            pursuit_speed: PURSUIT_SPEED,
            creep_speed: CREEP_SPEED,
            loop_period: LOOP_PERIOD,
        }
    }
}

impl From<&RobotConfig> for PursuitSettings {
    fn from(config: &RobotConfig) -> Self {
        Self {
            dead_band_deg: config.dead_band_deg,
            rotation_speed: config.rotation_speed,
            pursuit_speed: config.pursuit_speed,
            creep_speed: config.creep_speed,
            loop_period: config.loop_period(),
        }
    }
}

impl From<&RobotConfig> for DriveGeometry {
    fn from(config: &RobotConfig) -> Self {
        Self {
            wheel_diameter_mm: config.wheel_diameter_mm,
            track_width_mm: config.track_width_mm,
            friction_factor: config.rotation_friction_factor,
        }
    }
}

/// Outcome of one pursuit step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    pub target: Option<TargetEstimate>,
    /// Maneuvers whose commands reached the bus
    pub maneuvers: Vec<Maneuver>,
    /// A maneuver was skipped because a motor was unavailable or the bus timed out
    pub skipped: bool,
}

/// The robot: two motors and the loop that chases the ball
pub struct Robot {
    right: MotorChannel,
    left: MotorChannel,
    geometry: DriveGeometry,
    settings: PursuitSettings,
}

impl Robot {
    pub fn new(
        right: MotorChannel,
        left: MotorChannel,
        geometry: DriveGeometry,
        settings: PursuitSettings,
    ) -> Self {
        Self {
            right,
            left,
            geometry,
            settings,
        }
    }

    /// Both motors on one driver board, wired as in `config`
    pub fn from_config(bus: SharedBus, config: &RobotConfig) -> Result<Self, MotorError> {
        let right = MotorChannel::new(
            "right",
            bus.clone(),
            config.motor_address,
            config.right_motor_slot,
            config.command_delay(),
        )?;
        let left = MotorChannel::new(
            "left",
            bus,
            config.motor_address,
            config.left_motor_slot,
            config.command_delay(),
        )?;
        Ok(Self::new(
            right,
            left,
            DriveGeometry::from(config),
            PursuitSettings::from(config),
        ))
    }

    pub fn right(&mut self) -> &mut MotorChannel {
        &mut self.right
    }

    pub fn left(&mut self) -> &mut MotorChannel {
        &mut self.left
    }

    pub fn geometry(&self) -> &DriveGeometry {
        &self.geometry
    }

    /// Whether either motor has a non-zero commanded speed
    pub async fn is_moving(&self) -> bool {
        self.right.current_speed().await != 0.0 || self.left.current_speed().await != 0.0
    }

    /// Drive both wheels. The left motor is mounted mirrored, so its speed is negated.
    pub async fn run_two_motors(
        &mut self,
        right_speed: f32,
        left_speed: f32,
        time: Option<Duration>,
    ) -> Result<(), MotorError> {
        debug!("Running motors at speed {} and {}", right_speed, left_speed);
        self.right.run_at_speed(right_speed, time).await?;
        self.left.run_at_speed(-left_speed, time).await
    }

    /// Turn in place by `angle_deg` (positive = right) at `speed` RPM
    pub async fn rotate(&mut self, speed: f32, angle_deg: f32) -> Result<(), MotorError> {
        let (speed, angle_deg) = canonical_rotation(speed, angle_deg);
        let Some(time) = seconds_to_duration(self.geometry.rotation_time(angle_deg, speed)) else {
            debug!("Rotation of {}° at {} RPM is a no-op", angle_deg, speed);
            return Ok(());
        };

        info!("Rotating {:.1}° at {} RPM for {:?}", angle_deg, speed, time);
        // Same signed speed on both wheels turns the base in place
        self.right.run_at_speed(speed, Some(time)).await?;
        self.left.run_at_speed(speed, Some(time)).await
    }

    /// Drive straight for `distance_mm` at `speed` RPM
    pub async fn move_toward(&mut self, distance_mm: f32, speed: f32) -> Result<(), MotorError> {
        let Some(time) = seconds_to_duration(self.geometry.time_for_distance(distance_mm, speed))
        else {
            debug!("Move of {} mm at {} RPM is a no-op", distance_mm, speed);
            return Ok(());
        };

        info!("Moving {:.0} mm at {} RPM for {:?}", distance_mm, speed, time);
        self.run_two_motors(speed, speed, Some(time)).await
    }

    /// Search placeholder: roll forward until something is seen
    pub async fn creep(&mut self) -> Result<(), MotorError> {
        let speed = self.settings.creep_speed;
        // TODO: scan in place for a lost target instead of creeping forward
        self.run_two_motors(speed, speed, None).await
    }

    /// Stop both motors. Both are always attempted; the first failure is returned.
    pub async fn stop(&mut self) -> Result<(), MotorError> {
        info!("Stopping motors...");
        let right = self.right.stop().await;
        let left = self.left.stop().await;
        right.and(left)
    }

    async fn execute(&mut self, maneuver: Maneuver) -> Result<(), MotorError> {
        match maneuver {
            Maneuver::Rotate { angle_deg, speed } => self.rotate(speed, angle_deg).await,
            Maneuver::Translate { distance_mm, speed } => {
                self.move_toward(distance_mm, speed).await
            }
            Maneuver::Creep { .. } => self.creep().await,
        }
    }

    /// Run a maneuver. A recoverable motor failure marks the step as skipped
    /// and returns `false`; the caller must not issue anything else this pass.
    async fn attempt(
        &mut self,
        maneuver: Maneuver,
        report: &mut StepReport,
    ) -> Result<bool, RobotError> {
        match self.execute(maneuver).await {
            Ok(()) => {
                report.maneuvers.push(maneuver);
                Ok(true)
            }
            Err(e) if e.is_recoverable() => {
                warn!("Skipping step after {:?}: {}", maneuver, e);
                report.skipped = true;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// One perceive-decide-act pass
    pub async fn step<V: Vision>(&mut self, vision: &mut V) -> Result<StepReport, RobotError> {
        let mut report = StepReport::default();

        match vision.ball_blob().await {
            Some(blob) => {
                let bearing_deg = vision.bearing_angle(&blob);
                let distance_mm = vision.distance_to(&blob);
                debug!("Ball at {:.1}°, {:.0} mm", bearing_deg, distance_mm);
                report.target = Some(TargetEstimate {
                    bearing_deg,
                    distance_mm,
                });

                if bearing_deg.abs() >= self.settings.dead_band_deg {
                    let rotate = Maneuver::Rotate {
                        angle_deg: bearing_deg,
                        speed: self.settings.rotation_speed,
                    };
                    if !self.attempt(rotate, &mut report).await? {
                        return Ok(report);
                    }
                }

                if !self.is_moving().await {
                    let translate = Maneuver::Translate {
                        distance_mm,
                        speed: self.settings.pursuit_speed,
                    };
                    self.attempt(translate, &mut report).await?;
                }
            }
            None => {
                if !self.is_moving().await {
                    let creep = Maneuver::Creep {
                        speed: self.settings.creep_speed,
                    };
                    self.attempt(creep, &mut report).await?;
                }
            }
        }

        Ok(report)
    }

    /// Telemetry snapshot after a step
    pub async fn status(&self, report: &StepReport) -> RobotStatus {
        let health = if report.skipped {
            RobotHealth::MotorUnavailable
        } else if report.target.is_none() {
            RobotHealth::Searching
        } else {
            RobotHealth::Ok
        };

        RobotStatus {
            health,
            left_speed: self.left.current_speed().await,
            right_speed: self.right.current_speed().await,
            target: report.target,
            maneuvers: report.maneuvers.clone(),
        }
    }

    /// Chase the ball until `shutdown` resolves or a fatal error occurs.
    ///
    /// Motors are stopped on every exit path. A stop signal returns
    /// `RobotError::Interrupted`.
    pub async fn pursue<V: Vision>(
        &mut self,
        vision: &mut V,
        shutdown: impl Future<Output = ()>,
        status: &watch::Sender<RobotStatus>,
    ) -> Result<(), RobotError> {
        tokio::pin!(shutdown);
        let mut tick = interval(self.settings.loop_period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Pursuit started: {:?} loop, {}° dead band",
            self.settings.loop_period, self.settings.dead_band_deg
        );

        loop {
            let outcome = tokio::select! {
                biased;
                _ = &mut shutdown => None,
                outcome = async {
                    tick.tick().await;
                    self.step(vision).await
                } => Some(outcome),
            };

            match outcome {
                Some(Ok(report)) => {
                    status.send_replace(self.status(&report).await);
                }
                Some(Err(e)) => {
                    error!("Pursuit step failed: {}", e);
                    if let Err(stop_err) = self.stop().await {
                        error!("Failed to stop motors: {}", stop_err);
                    }
                    return Err(e);
                }
                None => {
                    error!("Stop signal received");
                    if let Err(stop_err) = self.stop().await {
                        error!("Failed to stop motors: {}", stop_err);
                    }
                    return Err(RobotError::Interrupted);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{SimBus, shared};
    use crate::config::MOTOR_ADDRESS;
    use crate::protocol::{Opcode, decode};

    fn robot(sim: &SimBus) -> Robot {
        let config = RobotConfig {
            simulate: true,
            ..Default::default()
        };
        Robot::from_config(shared(sim.clone()), &config).unwrap()
    }

    /// (slot, opcode, args) of every frame on the bus
    fn frames(sim: &SimBus) -> Vec<(u8, u8, Vec<u8>)> {
        sim.sent()
            .iter()
            .map(|f| {
                let d = decode(&f.bytes).unwrap();
                (d.slot, d.opcode, d.args)
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_rotation_is_canonicalized() {
        let negative = SimBus::with_devices(&[MOTOR_ADDRESS]);
        robot(&negative).rotate(-30.0, -90.0).await.unwrap();

        let positive = SimBus::with_devices(&[MOTOR_ADDRESS]);
        robot(&positive).rotate(30.0, 90.0).await.unwrap();

        assert_eq!(negative.sent(), positive.sent());
        assert_eq!(frames(&positive).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_uses_same_speed_on_both_wheels() {
        let sim = SimBus::with_devices(&[MOTOR_ADDRESS]);
        let mut robot = robot(&sim);
        robot.rotate(50.0, -45.0).await.unwrap();

        let sent = frames(&sim);
        assert_eq!(sent.len(), 2);
        for (slot, (frame_slot, opcode, _)) in [0u8, 1].iter().zip(&sent) {
            assert_eq!(frame_slot, slot);
            assert_eq!(*opcode, Opcode::MoveSpdTime as u8);
        }
        assert_eq!(sent[0].2, sent[1].2);
        let speed = f32::from_le_bytes([sent[0].2[0], sent[0].2[1], sent[0].2[2], sent[0].2[3]]);
        assert_eq!(speed, -50.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_toward_uses_opposite_signs() {
        let sim = SimBus::with_devices(&[MOTOR_ADDRESS]);
        let mut robot = robot(&sim);
        robot.move_toward(300.0, 150.0).await.unwrap();

        assert_eq!(robot.right().current_speed().await, 150.0);
        assert_eq!(robot.left().current_speed().await, -150.0);
        assert!(robot.is_moving().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_speed_rotation_is_noop() {
        let sim = SimBus::with_devices(&[MOTOR_ADDRESS]);
        let mut robot = robot(&sim);
        robot.rotate(0.0, 90.0).await.unwrap();
        robot.move_toward(300.0, 0.0).await.unwrap();
        assert!(sim.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_resets_both_motors() {
        let sim = SimBus::with_devices(&[MOTOR_ADDRESS]);
        let mut robot = robot(&sim);
        robot.run_two_motors(100.0, 100.0, None).await.unwrap();
        robot.stop().await.unwrap();

        assert!(!robot.is_moving().await);
        let opcodes: Vec<u8> = frames(&sim).iter().map(|f| f.1).collect();
        assert_eq!(
            opcodes,
            vec![
                Opcode::MoveSpd as u8,
                Opcode::MoveSpd as u8,
                Opcode::Reset as u8,
                Opcode::Reset as u8
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_health() {
        let sim = SimBus::with_devices(&[MOTOR_ADDRESS]);
        let robot = robot(&sim);

        let searching = robot.status(&StepReport::default()).await;
        assert_eq!(searching.health, RobotHealth::Searching);

        let report = StepReport {
            skipped: true,
            ..Default::default()
        };
        assert_eq!(
            robot.status(&report).await.health,
            RobotHealth::MotorUnavailable
        );
    }
}
