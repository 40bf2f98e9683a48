// Point-to-point bus transport (I2C master)
//
// Motor driver boards and the sensor board are I2C slaves. The host reaches them
// through a USB-to-I2C bridge (`SerialBus`), or through `SimBus` when simulating.

use std::sync::{Arc, Mutex};

pub mod serial;
pub mod sim;

pub use serial::SerialBus;
pub use sim::SimBus;

/// Role of the host on the bus
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusMode {
    Master = 0,
    Slave = 1,
}

/// Error types for bus communication
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout waiting for slave 0x{address:02X}")]
    Timeout { address: u8 },

    #[error("Slave 0x{address:02X} did not acknowledge (status 0x{status:02X})")]
    Nack { address: u8, status: u8 },

    #[error("Invalid response from bridge: {reason}")]
    InvalidResponse { reason: String },
}

impl BusError {
    /// A read or write that did not complete in time. Callers treat this as "no data".
    pub fn is_timeout(&self) -> bool {
        matches!(self, BusError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, BusError>;

/// Master-side bus primitives
pub trait Bus {
    /// Configure the host's role on the bus
    fn init(&mut self, mode: BusMode) -> Result<()>;

    /// Write `data` to the slave at `address`
    fn send(&mut self, data: &[u8], address: u8) -> Result<()>;

    /// Fill `buffer` with bytes read from the slave at `address`
    fn receive(&mut self, buffer: &mut [u8], address: u8) -> Result<()>;

    /// Whether the slave at `address` acknowledges
    fn is_ready(&mut self, address: u8) -> Result<bool>;

    /// Addresses of every slave that acknowledges
    fn scan(&mut self) -> Result<Vec<u8>>;
}

/// A bus shared by every device wired to it (both motor slots share one address)
pub type SharedBus = Arc<Mutex<dyn Bus + Send>>;

/// Wrap a bus so that several devices can use it
pub fn shared<B: Bus + Send + 'static>(bus: B) -> SharedBus {
    Arc::new(Mutex::new(bus))
}

/// Run `f` with exclusive access to the bus. The guard never lives across an await.
pub fn with_bus<T>(bus: &SharedBus, f: impl FnOnce(&mut dyn Bus) -> T) -> T {
    let mut guard = bus.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut *guard)
}
