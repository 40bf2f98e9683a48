// Bus diagnostic: scan the I2C bus and ask both motors for their speed
//
// Only the speed query is written to the motors - no movement.
//
// Usage: cargo run --example bus_diagnostic -- [port]
// Example: cargo run --example bus_diagnostic -- /dev/ttyACM0

use ballchaser_runtime::bus::{Bus, BusMode, SerialBus, SharedBus, shared};
use ballchaser_runtime::config::{
    BRIDGE_PORT, COMMAND_DELAY, LEFT_MOTOR_SLOT, MOTOR_ADDRESS, MOTOR_BUS_PIN, RIGHT_MOTOR_SLOT,
    SENSOR_ADDRESS,
};
use ballchaser_runtime::motor::MotorChannel;

const MOTORS: [(&str, u8); 2] = [("right", RIGHT_MOTOR_SLOT), ("left", LEFT_MOTOR_SLOT)];

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    // Get port from args or use default
    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| BRIDGE_PORT.to_string());

    println!("Ball chaser bus diagnostic");
    println!("Serial port: {}", port);
    println!();

    println!("Step 1: Opening bus bridge...");
    let mut serial = match SerialBus::open(&port, MOTOR_BUS_PIN) {
        Ok(bus) => {
            println!("  ✓ Bridge opened, I2C bus {}", bus.pin());
            bus
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Verify the USB cable is connected");
            return Err(e.into());
        }
    };
    serial.init(BusMode::Master)?;
    println!();

    println!("Step 2: Scanning for slaves...");
    let slaves = serial.scan()?;
    for address in &slaves {
        let role = match *address {
            MOTOR_ADDRESS => "motor driver",
            SENSOR_ADDRESS => "sensor board",
            _ => "unknown",
        };
        println!("  ✓ 0x{:02X} ({})", address, role);
    }
    if !slaves.contains(&MOTOR_ADDRESS) {
        println!("  ⚠ Motor driver 0x{:02X} not found - check its power supply", MOTOR_ADDRESS);
        return Ok(());
    }
    println!();

    println!("Step 3: Querying motor speeds...");
    let bus: SharedBus = shared(serial);
    for (name, slot) in MOTORS {
        let mut motor = MotorChannel::new(name, bus.clone(), MOTOR_ADDRESS, slot, COMMAND_DELAY)?;
        let label = format!(
            "{} (0x{:02X}, slot {})",
            motor.name(),
            motor.address(),
            motor.slot() + 1
        );
        match motor.query_speed().await {
            Ok(speed) => println!("  Motor {}: {:.1} RPM", label, speed),
            Err(e) => println!("  Motor {}: ERROR - {}", label, e),
        }
    }
    println!();
    println!("Diagnostic complete. Speeds should be ~0 when the wheels are stationary.");

    Ok(())
}
