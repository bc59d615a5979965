//! Shared acquisition configuration
//!
//! One `AcquisitionConfig` is built per runmode startup and shared by every
//! acquisition thread. The server list and batch size are immutable after
//! construction and read without locking; only the logical holder count and
//! the round-robin cursor are mutated, and those use single atomic
//! read-modify-write operations. The cursor is the sole serialization point
//! of the whole core.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{error, info};

use crate::errors::ConfigError;

/// Batch size used when `ipc.allocation-batch` is left unset
pub const DEFAULT_ALLOCATION_BATCH: usize = 100;

#[derive(Debug)]
struct Shared {
    servers: Vec<String>,
    batch_size: usize,
    /// Logical holder count: the owning `AcquisitionConfig` plus every
    /// outstanding `AcquisitionHandle`. Memory itself is owned by `Arc`,
    /// so the free runs exactly once no matter how drops interleave.
    holders: AtomicUsize,
    /// Round-robin server cursor, advanced with wraparound
    next_server: AtomicUsize,
}

impl Shared {
    /// Decrement on every drop of a holder. A zero pre-value means more
    /// releases than acquisitions; that is a contract violation, not a
    /// recoverable error.
    fn release_holder(&self) {
        let prev = self.holders.fetch_sub(1, Ordering::AcqRel);
        if prev == 0 {
            error!("acquisition config released more times than it was acquired");
            debug_assert!(prev > 0, "refcount underflow");
        }
    }
}

/// Owning root of the shared configuration. Hands out one
/// [`AcquisitionHandle`] per acquisition thread via [`acquire`].
///
/// [`acquire`]: AcquisitionConfig::acquire
#[derive(Debug)]
pub struct AcquisitionConfig {
    shared: Arc<Shared>,
}

/// A counted reference to the shared configuration, held by exactly one
/// acquisition thread for its lifetime. Release happens on drop, so every
/// exit path of the thread pairs one acquire with one release.
#[derive(Debug)]
pub struct AcquisitionHandle {
    shared: Arc<Shared>,
}

impl AcquisitionConfig {
    /// Build the shared record from a parsed server list.
    ///
    /// Storage exhaustion is reported as [`ConfigError::AllocationFailed`]
    /// rather than a panic; construction failure is fatal to runmode
    /// startup.
    pub fn new(servers: Vec<String>, batch_size: Option<usize>) -> Result<Self, ConfigError> {
        if servers.is_empty() {
            return Err(ConfigError::EmptyServerList);
        }

        let batch_size = match batch_size {
            Some(batch) => batch,
            None => {
                info!(
                    default = DEFAULT_ALLOCATION_BATCH,
                    "no ipc.allocation-batch configured, using default"
                );
                DEFAULT_ALLOCATION_BATCH
            }
        };
        if batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ipc.allocation-batch",
                reason: "must be a positive integer".to_string(),
            });
        }

        let mut owned = Vec::new();
        owned
            .try_reserve_exact(servers.len())
            .map_err(|_| ConfigError::AllocationFailed)?;
        owned.extend(servers);

        Ok(Self {
            shared: Arc::new(Shared {
                servers: owned,
                batch_size,
                holders: AtomicUsize::new(1),
                next_server: AtomicUsize::new(0),
            }),
        })
    }

    /// Hand out a new counted reference. Single atomic increment; safe to
    /// call from any thread.
    pub fn acquire(&self) -> AcquisitionHandle {
        self.shared.holders.fetch_add(1, Ordering::AcqRel);
        AcquisitionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Live holder count, including this owning root
    pub fn holders(&self) -> usize {
        self.shared.holders.load(Ordering::Acquire)
    }

    pub fn servers(&self) -> &[String] {
        &self.shared.servers
    }

    pub fn batch_size(&self) -> usize {
        self.shared.batch_size
    }

    /// Acquisition-thread count is bound to server count by construction
    pub fn thread_count(&self) -> usize {
        self.shared.servers.len()
    }

    /// Atomically claim the next server in round-robin order.
    pub fn claim_next_server(&self) -> &str {
        claim(&self.shared)
    }

    #[cfg(test)]
    fn downgrade(&self) -> std::sync::Weak<Shared> {
        Arc::downgrade(&self.shared)
    }
}

impl AcquisitionHandle {
    /// Atomically claim the next server in round-robin order. Called once
    /// per acquisition thread at startup; the claim is the sole assignment
    /// point for the thread's lifetime.
    pub fn claim_next_server(&self) -> &str {
        claim(&self.shared)
    }

    pub fn servers(&self) -> &[String] {
        &self.shared.servers
    }

    pub fn batch_size(&self) -> usize {
        self.shared.batch_size
    }
}

/// `fetch_add` then modulo: wait-free, and each full round over the cursor
/// yields every index in `[0, servers.len())` exactly once. The counter is
/// monotonically increasing; claims happen once per thread spawn, so
/// counter wrap is unreachable in practice.
fn claim(shared: &Shared) -> &str {
    let idx = shared.next_server.fetch_add(1, Ordering::Relaxed) % shared.servers.len();
    &shared.servers[idx]
}

impl Drop for AcquisitionConfig {
    fn drop(&mut self) {
        self.shared.release_holder();
    }
}

impl Drop for AcquisitionHandle {
    fn drop(&mut self) {
        self.shared.release_holder();
    }
}
