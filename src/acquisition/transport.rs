//! Transport seam toward the external IPC capture servers
//!
//! The wire protocol lives outside this crate. The engine's only
//! obligation toward the transport is lifecycle pairing: exactly one
//! connect and one release per acquisition thread (release happens when
//! the client is dropped), and populate calls sized by the configured
//! allocation batch.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::batch::PacketBatch;
use crate::errors::TransportError;

/// Factory for per-server capture clients
pub trait CaptureTransport: Send + Sync {
    /// Establish a capture stream to one server. Called once per
    /// acquisition thread per connection attempt.
    fn connect(&self, server: &str) -> Result<Box<dyn CaptureClient>, TransportError>;
}

/// An established capture stream. Dropped exactly once per connect.
pub trait CaptureClient: Send {
    /// Fill up to `batch.capacity()` buffers with captured frames and
    /// return the count. `Ok(0)` is an idle poll, not end-of-stream.
    fn populate(&mut self, batch: &mut PacketBatch) -> Result<usize, TransportError>;
}

/// In-process transport producing synthetic IPv4/UDP frames. Stands in for
/// a real IPC transport in the binary's loopback mode and in benches.
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    frames_per_poll: usize,
}

impl LoopbackTransport {
    pub fn new(frames_per_poll: usize) -> Self {
        Self { frames_per_poll }
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new(16)
    }
}

impl CaptureTransport for LoopbackTransport {
    fn connect(&self, server: &str) -> Result<Box<dyn CaptureClient>, TransportError> {
        Ok(Box::new(LoopbackClient {
            seed: server.bytes().map(u64::from).sum::<u64>(),
            sequence: 0,
            frames_per_poll: self.frames_per_poll,
        }))
    }
}

struct LoopbackClient {
    seed: u64,
    sequence: u64,
    frames_per_poll: usize,
}

impl CaptureClient for LoopbackClient {
    fn populate(&mut self, batch: &mut PacketBatch) -> Result<usize, TransportError> {
        batch.clear();
        let count = self.frames_per_poll.min(batch.capacity());
        for slot in 0..count {
            let frame = synthetic_udp_frame(self.seed, self.sequence);
            self.sequence = self.sequence.wrapping_add(1);
            batch.buffers_mut()[slot].fill(&frame);
        }
        batch.set_filled(count);
        Ok(count)
    }
}

/// Minimal IPv4/UDP frame with addresses derived from the seed, enough for
/// the decode stage to extract a flow key.
fn synthetic_udp_frame(seed: u64, sequence: u64) -> Vec<u8> {
    let mut frame = vec![0u8; 64];
    frame[0] = 0x45; // version 4, IHL 5
    frame[9] = 17; // UDP
    frame[12..16].copy_from_slice(&[10, 0, (seed % 256) as u8, (sequence % 8) as u8]);
    frame[16..20].copy_from_slice(&[10, 0, 0, 1]);
    let sport = 1024 + (sequence % 16) as u16;
    frame[20..22].copy_from_slice(&sport.to_be_bytes());
    frame[22..24].copy_from_slice(&53u16.to_be_bytes());
    frame
}

/// Scripted transport for tests: each server name maps to a fixed frame
/// sequence, after which the client idles. Connect attempts and releases
/// are counted so lifecycle pairing can be asserted.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: HashMap<String, Vec<Vec<u8>>>,
    refuse: Vec<String>,
    state: Arc<Mutex<ScriptedState>>,
}

#[derive(Debug, Default)]
struct ScriptedState {
    connects: usize,
    releases: usize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the frames one server will deliver, one populate cycle each
    pub fn script(mut self, server: &str, frames: Vec<Vec<u8>>) -> Self {
        self.scripts.insert(server.to_string(), frames);
        self
    }

    /// Make connect attempts to one server fail
    pub fn refuse(mut self, server: &str) -> Self {
        self.refuse.push(server.to_string());
        self
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    pub fn release_count(&self) -> usize {
        self.state.lock().releases
    }
}

impl CaptureTransport for ScriptedTransport {
    fn connect(&self, server: &str) -> Result<Box<dyn CaptureClient>, TransportError> {
        if self.refuse.iter().any(|s| s == server) {
            return Err(TransportError::Connect {
                server: server.to_string(),
                reason: "scripted refusal".to_string(),
            });
        }
        self.state.lock().connects += 1;
        Ok(Box::new(ScriptedClient {
            frames: self.scripts.get(server).cloned().unwrap_or_default(),
            cursor: 0,
            state: Arc::clone(&self.state),
        }))
    }
}

struct ScriptedClient {
    frames: Vec<Vec<u8>>,
    cursor: usize,
    state: Arc<Mutex<ScriptedState>>,
}

impl CaptureClient for ScriptedClient {
    fn populate(&mut self, batch: &mut PacketBatch) -> Result<usize, TransportError> {
        batch.clear();
        if self.cursor >= self.frames.len() {
            // script exhausted: idle until shutdown
            std::thread::yield_now();
            return Ok(0);
        }
        let frame = &self.frames[self.cursor];
        self.cursor += 1;
        batch.buffers_mut()[0].fill(frame);
        batch.set_filled(1);
        Ok(1)
    }
}

impl Drop for ScriptedClient {
    fn drop(&mut self) {
        self.state.lock().releases += 1;
    }
}
