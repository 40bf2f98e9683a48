// USB-to-I2C bridge protocol
//
// Request: [0x55, Op, Pin, Address, Length, Data..., Checksum]
// Reply:   [0x55, Status, Length, Data..., Checksum]
//
// Checksum is the inverted byte sum of everything after the sync byte.
//
// Transfers block the calling thread until the reply arrives or the port
// timeout (100 ms) expires. On the current-thread runtime that stalls every
// other task, cooldown timers included, for the length of one exchange.

use serialport::{self, SerialPort};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, trace};

use super::{Bus, BusError, BusMode, Result};

/// Default serial configuration for the bridge
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Sync byte that starts every bridge packet
const SYNC: u8 = 0x55;

/// Status byte of an acknowledged request
const STATUS_ACK: u8 = 0x00;

/// Bridge operations
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum BridgeOp {
    Init = 0x01,
    Write = 0x02,
    Read = 0x03,
    Probe = 0x04,
    Scan = 0x05,
}

/// I2C bus reached through a serial bridge.
/// Buses on other pins of the same bridge share its port (see `on_pin`).
pub struct SerialBus {
    port: Arc<Mutex<Box<dyn SerialPort>>>,
    pin: u8,
}

impl SerialBus {
    /// Open the bridge and select the I2C bus wired to `pin`
    pub fn open(port_name: &str, pin: u8) -> Result<Self> {
        Self::open_with_baudrate(port_name, pin, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, pin: u8, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self {
            port: Arc::new(Mutex::new(port)),
            pin,
        })
    }

    /// Another bus of the same bridge
    pub fn on_pin(&self, pin: u8) -> Self {
        Self {
            port: Arc::clone(&self.port),
            pin,
        }
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    /// Inverted 8-bit sum
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    fn build_request(op: BridgeOp, pin: u8, address: u8, data: &[u8]) -> Vec<u8> {
        let mut packet = Vec::with_capacity(6 + data.len());
        packet.push(SYNC);
        packet.push(op as u8);
        packet.push(pin);
        packet.push(address);
        packet.push(data.len() as u8);
        packet.extend_from_slice(data);

        let checksum = Self::checksum(&packet[1..]);
        packet.push(checksum);
        packet
    }

    /// Send a request and return the reply data
    fn transact(&mut self, op: BridgeOp, address: u8, data: &[u8]) -> Result<Vec<u8>> {
        let request = Self::build_request(op, self.pin, address, data);
        trace!("Bridge request {:?}: {:02X?}", op, request);

        // One request/reply exchange at a time across every pin
        let mut port = self.port.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        port.write_all(&request)?;
        port.flush()?;
        Self::read_reply(&mut **port, address)
    }

    fn read_reply(port: &mut dyn SerialPort, address: u8) -> Result<Vec<u8>> {
        let mut head = [0u8; 3];
        port.read_exact(&mut head).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                BusError::Timeout { address }
            } else {
                BusError::Io(e)
            }
        })?;

        if head[0] != SYNC {
            return Err(BusError::InvalidResponse {
                reason: format!("Invalid sync byte: 0x{:02X}", head[0]),
            });
        }
        let status = head[1];
        let length = head[2] as usize;

        // Data + checksum
        let mut remaining = vec![0u8; length + 1];
        port.read_exact(&mut remaining)?;

        let mut checksum_data = vec![status, head[2]];
        checksum_data.extend_from_slice(&remaining[..length]);
        if Self::checksum(&checksum_data) != remaining[length] {
            return Err(BusError::InvalidResponse {
                reason: "Checksum mismatch".to_string(),
            });
        }

        if status != STATUS_ACK {
            return Err(BusError::Nack { address, status });
        }

        remaining.truncate(length);
        Ok(remaining)
    }
}

impl Bus for SerialBus {
    fn init(&mut self, mode: BusMode) -> Result<()> {
        debug!("Initializing bus on pin {} as {:?}", self.pin, mode);
        self.transact(BridgeOp::Init, 0, &[mode as u8])?;
        Ok(())
    }

    fn send(&mut self, data: &[u8], address: u8) -> Result<()> {
        self.transact(BridgeOp::Write, address, data)?;
        Ok(())
    }

    fn receive(&mut self, buffer: &mut [u8], address: u8) -> Result<()> {
        let reply = self.transact(BridgeOp::Read, address, &[buffer.len() as u8])?;
        if reply.len() != buffer.len() {
            return Err(BusError::InvalidResponse {
                reason: format!("Expected {} bytes, got {}", buffer.len(), reply.len()),
            });
        }
        buffer.copy_from_slice(&reply);
        Ok(())
    }

    fn is_ready(&mut self, address: u8) -> Result<bool> {
        match self.transact(BridgeOp::Probe, address, &[]) {
            Ok(_) => Ok(true),
            Err(BusError::Nack { .. }) | Err(BusError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn scan(&mut self) -> Result<Vec<u8>> {
        self.transact(BridgeOp::Scan, 0, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        // ~(0x02 + 0x04 + 0x09 + 0x02 + 0xA5 + 0x01) = ~0xB7 = 0x48
        let data = [0x02u8, 0x04, 0x09, 0x02, 0xA5, 0x01];
        assert_eq!(SerialBus::checksum(&data), 0x48);
    }

    #[test]
    fn test_build_request() {
        let packet = SerialBus::build_request(BridgeOp::Write, 4, 0x09, &[0xA5, 0x01]);
        // Sync + Op + Pin + Address + Length + Data (2) + Checksum
        assert_eq!(packet.len(), 8);
        assert_eq!(packet[0], SYNC);
        assert_eq!(packet[1], BridgeOp::Write as u8);
        assert_eq!(packet[2], 4);
        assert_eq!(packet[3], 0x09);
        assert_eq!(packet[4], 2);
        assert_eq!(packet[7], 0x48);
    }

    #[test]
    fn test_probe_request_has_no_data() {
        let packet = SerialBus::build_request(BridgeOp::Probe, 2, 0x10, &[]);
        assert_eq!(packet.len(), 6);
        assert_eq!(packet[4], 0);
        assert_eq!(packet[5], SerialBus::checksum(&packet[1..5]));
    }
}
