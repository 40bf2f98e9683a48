// Process glue: buses, zenoh session, pursuit loop and telemetry
//
// The pursuit loop and the telemetry publisher run side by side on the same task.
// Ctrl+C stops both motors and ends the loop.

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

// local imports
use crate::bus::{BusMode, SerialBus, SharedBus, SimBus, shared, with_bus};
use crate::config::{RobotConfig, TOPIC_HEALTH, TOPIC_SENSORS, TOPIC_STATUS, TOPIC_VISION_BLOB};
use crate::messages::RobotStatus;
use crate::robot::{Robot, RobotError};
use crate::sensors::AuxSensorBoard;
use crate::vision::{CameraGeometry, ZenohVision};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Motor bus and, when enabled, sensor bus
fn open_buses(config: &RobotConfig) -> Result<(SharedBus, Option<SharedBus>), BoxError> {
    if config.simulate {
        info!("Simulation mode: using in-memory bus");
        let sim = SimBus::with_devices(&[config.motor_address, config.sensor_address]);
        let sensor_bus = config.sensors_enabled.then(|| shared(sim.clone()));
        return Ok((shared(sim), sensor_bus));
    }

    info!("Opening bus bridge on {}", config.bridge_port);
    let motor_bus = SerialBus::open(&config.bridge_port, config.motor_bus_pin)?;
    let sensor_bus = config
        .sensors_enabled
        .then(|| shared(motor_bus.on_pin(config.sensor_bus_pin)));
    Ok((shared(motor_bus), sensor_bus))
}

enum Exit {
    Pursuit(Result<(), RobotError>),
    Telemetry(Result<(), BoxError>),
}

pub async fn run(config: RobotConfig) -> Result<(), BoxError> {
    let (motor_bus, sensor_bus) = open_buses(&config)?;
    with_bus(&motor_bus, |bus| bus.init(BusMode::Master))?;

    let slaves = with_bus(&motor_bus, |bus| bus.scan())?;
    debug!("Slaves on motor bus: {:02X?}", slaves);
    if !slaves.contains(&config.motor_address) {
        warn!(
            "Motor driver 0x{:02X} not found on the bus, check that it is powered",
            config.motor_address
        );
    }

    let mut robot = Robot::from_config(motor_bus, &config)?;

    let sensors = match sensor_bus {
        Some(bus) => {
            with_bus(&bus, |b| b.init(BusMode::Master))?;
            Some(AuxSensorBoard::new(bus, config.sensor_address))
        }
        None => None,
    };

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let mut vision = ZenohVision::declare(
        &session,
        CameraGeometry::from(&config),
        config.observation_timeout(),
    )
    .await?;
    let pub_status = session.declare_publisher(TOPIC_STATUS).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;
    let pub_sensors = session.declare_publisher(TOPIC_SENSORS).await?;

    info!("Subscribed to: {}", TOPIC_VISION_BLOB);
    info!("Publishing to: {}, {}", TOPIC_STATUS, TOPIC_HEALTH);

    let (status_tx, mut status_rx) = watch::channel(RobotStatus::default());

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    // Publish every status the loop produces
    let telemetry = async {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();

            let status_json = serde_json::to_string(&status)?;
            pub_status.put(status_json).await?;

            let health_json = serde_json::to_string(&status.health)?;
            pub_health.put(health_json).await?;

            if let Some(board) = &sensors {
                match board.read().await {
                    Ok(reading) => {
                        let reading_json = serde_json::to_string(&reading)?;
                        pub_sensors.put(reading_json).await?;
                    }
                    Err(e) if e.is_timeout() => debug!("No data from sensor board: {}", e),
                    Err(e) => warn!("Sensor board read failed: {}", e),
                }
            }
        }
        Ok::<(), BoxError>(())
    };

    let exit = tokio::select! {
        result = robot.pursue(&mut vision, shutdown, &status_tx) => Exit::Pursuit(result),
        result = telemetry => Exit::Telemetry(result),
    };

    match exit {
        Exit::Pursuit(Err(RobotError::Interrupted)) => {
            error!("The pursuit loop was stopped by an interrupt");
            Ok(())
        }
        Exit::Pursuit(result) => Ok(result?),
        Exit::Telemetry(result) => {
            error!("Telemetry stopped, stopping motors");
            robot.stop().await?;
            result
        }
    }
}
