// In-memory bus used for simulation and tests
//
// Records every write, answers reads from per-address reply queues and lets
// callers take slaves offline.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::{Bus, BusError, BusMode, Result};

/// A write observed on the simulated bus
#[derive(Debug, Clone, PartialEq)]
pub struct SentFrame {
    pub address: u8,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct SimState {
    mode: Option<BusMode>,
    present: BTreeSet<u8>,
    offline: BTreeSet<u8>,
    replies: HashMap<u8, VecDeque<Vec<u8>>>,
    sent: Vec<SentFrame>,
}

/// Simulated bus. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct SimBus {
    state: Arc<Mutex<SimState>>,
}

impl SimBus {
    /// A bus with the given slaves attached
    pub fn with_devices(addresses: &[u8]) -> Self {
        let bus = Self::default();
        bus.state().present.extend(addresses.iter().copied());
        bus
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take a slave offline (`is_ready` false) or bring it back
    pub fn set_ready(&self, address: u8, ready: bool) {
        let mut state = self.state();
        if ready {
            state.offline.remove(&address);
        } else {
            state.offline.insert(address);
        }
    }

    /// Queue bytes returned by the next `receive` from `address`
    pub fn push_reply(&self, address: u8, bytes: Vec<u8>) {
        self.state().replies.entry(address).or_default().push_back(bytes);
    }

    /// Every write so far, in order
    pub fn sent(&self) -> Vec<SentFrame> {
        self.state().sent.clone()
    }

    pub fn mode(&self) -> Option<BusMode> {
        self.state().mode
    }
}

impl Bus for SimBus {
    fn init(&mut self, mode: BusMode) -> Result<()> {
        self.state().mode = Some(mode);
        Ok(())
    }

    fn send(&mut self, data: &[u8], address: u8) -> Result<()> {
        let mut state = self.state();
        if !state.present.contains(&address) || state.offline.contains(&address) {
            return Err(BusError::Nack {
                address,
                status: 0x01,
            });
        }
        debug!("sim bus write to 0x{:02X}: {:02X?}", address, data);
        state.sent.push(SentFrame {
            address,
            bytes: data.to_vec(),
        });
        Ok(())
    }

    fn receive(&mut self, buffer: &mut [u8], address: u8) -> Result<()> {
        let reply = self
            .state()
            .replies
            .get_mut(&address)
            .and_then(VecDeque::pop_front)
            .ok_or(BusError::Timeout { address })?;

        if reply.len() != buffer.len() {
            return Err(BusError::InvalidResponse {
                reason: format!("Expected {} bytes, got {}", buffer.len(), reply.len()),
            });
        }
        buffer.copy_from_slice(&reply);
        Ok(())
    }

    fn is_ready(&mut self, address: u8) -> Result<bool> {
        let state = self.state();
        Ok(state.present.contains(&address) && !state.offline.contains(&address))
    }

    fn scan(&mut self) -> Result<Vec<u8>> {
        let state = self.state();
        Ok(state.present.difference(&state.offline).copied().collect())
    }
}
