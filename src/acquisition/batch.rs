//! Pre-allocated packet buffer batches
//!
//! Each acquisition thread owns one batch of `batch_size` buffers,
//! allocated before the acquisition loop starts so the hot path never
//! allocates for the common case.

use crate::errors::ConfigError;

/// Default capacity reserved per packet buffer, sized for an MTU frame
/// plus headroom.
pub const DEFAULT_PACKET_CAPACITY: usize = 2048;

/// One captured frame
#[derive(Debug, Clone, Default)]
pub struct Packet {
    data: Vec<u8>,
}

impl Packet {
    fn with_capacity(capacity: usize) -> Result<Self, ConfigError> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| ConfigError::AllocationFailed)?;
        Ok(Self { data })
    }

    /// Overwrite the buffer with a freshly captured frame, reusing the
    /// existing allocation where possible.
    pub fn fill(&mut self, frame: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(frame);
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Fixed-size pool of packet buffers plus a fill watermark
#[derive(Debug)]
pub struct PacketBatch {
    buffers: Vec<Packet>,
    filled: usize,
}

impl PacketBatch {
    /// Pre-allocate `batch_size` buffers. Exhaustion surfaces as
    /// [`ConfigError::AllocationFailed`], never a panic.
    pub fn allocate(batch_size: usize) -> Result<Self, ConfigError> {
        let mut buffers = Vec::new();
        buffers
            .try_reserve_exact(batch_size)
            .map_err(|_| ConfigError::AllocationFailed)?;
        for _ in 0..batch_size {
            buffers.push(Packet::with_capacity(DEFAULT_PACKET_CAPACITY)?);
        }
        Ok(Self { buffers, filled: 0 })
    }

    /// Number of buffers in the pool; matches the configured batch size
    pub fn capacity(&self) -> usize {
        self.buffers.len()
    }

    /// Buffers filled by the last populate cycle
    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Filled packets from the last populate cycle
    pub fn packets(&self) -> &[Packet] {
        &self.buffers[..self.filled]
    }

    /// Hand the transport a writable view of the whole pool. The returned
    /// closure contract: the transport fills a prefix and reports its
    /// length through [`set_filled`].
    ///
    /// [`set_filled`]: PacketBatch::set_filled
    pub fn buffers_mut(&mut self) -> &mut [Packet] {
        &mut self.buffers
    }

    /// Record how many buffers the transport filled this cycle
    pub fn set_filled(&mut self, count: usize) {
        self.filled = count.min(self.buffers.len());
    }

    /// Reset the watermark for the next cycle; allocations are retained
    pub fn clear(&mut self) {
        self.filled = 0;
    }

    /// Move the filled packets out for a cross-thread hand-off and restore
    /// the pool to full capacity. The drained slots are re-allocated; the
    /// surviving buffers keep their storage.
    pub fn take_filled(&mut self) -> Vec<Packet> {
        let drained: Vec<Packet> = self.buffers.drain(..self.filled).collect();
        let target = self.buffers.len() + drained.len();
        self.buffers.resize_with(target, Packet::default);
        self.filled = 0;
        drained
    }
}
