// Distance/line sensor board (Arduino slave)
//
// Reply: six big-endian u16 = front distance, back distance, 4 line sensors.

use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::trace;

use crate::bus::{BusError, SharedBus, with_bus};
use crate::messages::SensorReading;

/// Size of one reading on the wire
pub const READING_LEN: usize = 12;

/// How long to wait for the board before giving up
pub const READY_TIMEOUT: Duration = Duration::from_millis(100);

/// Polling interval while waiting for the board
const READY_POLL: Duration = Duration::from_millis(10);

pub struct AuxSensorBoard {
    bus: SharedBus,
    address: u8,
}

impl AuxSensorBoard {
    pub fn new(bus: SharedBus, address: u8) -> Self {
        Self { bus, address }
    }

    async fn wait_until_ready(&self) -> Result<(), BusError> {
        let address = self.address;
        while !with_bus(&self.bus, |bus| bus.is_ready(address))? {
            sleep(READY_POLL).await;
        }
        Ok(())
    }

    /// Read one sample. Times out if the board does not answer within `READY_TIMEOUT`.
    pub async fn read(&self) -> Result<SensorReading, BusError> {
        let address = self.address;
        timeout(READY_TIMEOUT, self.wait_until_ready())
            .await
            .map_err(|_| BusError::Timeout { address })??;

        let mut buffer = [0u8; READING_LEN];
        with_bus(&self.bus, |bus| bus.receive(&mut buffer, address))?;
        let reading = decode_reading(&buffer);
        trace!("Sensor reading: {:?}", reading);
        Ok(reading)
    }
}

/// Unpack six big-endian u16 values
pub fn decode_reading(buffer: &[u8; READING_LEN]) -> SensorReading {
    let word = |i: usize| u16::from_be_bytes([buffer[2 * i], buffer[2 * i + 1]]);
    SensorReading {
        front_distance: word(0),
        back_distance: word(1),
        line: [word(2), word(3), word(4), word(5)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{SimBus, shared};

    const ADDR: u8 = 0x10;

    #[test]
    fn test_decode_reading() {
        let buffer = [
            0x01, 0x2C, // 300
            0x00, 0x64, // 100
            0x00, 0x01, 0x00, 0x02, 0x03, 0xE8, 0xFF, 0xFF,
        ];
        let reading = decode_reading(&buffer);
        assert_eq!(reading.front_distance, 300);
        assert_eq!(reading.back_distance, 100);
        assert_eq!(reading.line, [1, 2, 1000, 0xFFFF]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_from_ready_board() {
        let sim = SimBus::with_devices(&[ADDR]);
        sim.push_reply(ADDR, vec![0, 50, 0, 60, 0, 0, 0, 0, 0, 0, 0, 0]);
        let board = AuxSensorBoard::new(shared(sim), ADDR);

        let reading = board.read().await.unwrap();
        assert_eq!(reading.front_distance, 50);
        assert_eq!(reading.back_distance, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_times_out_when_board_is_busy() {
        let sim = SimBus::with_devices(&[ADDR]);
        sim.set_ready(ADDR, false);
        let board = AuxSensorBoard::new(shared(sim), ADDR);

        let err = board.read().await.unwrap_err();
        assert!(err.is_timeout());
    }
}
