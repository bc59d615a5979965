//! Telemetry with atomic counters and a JSON snapshot export
//!
//! Counters are plain atomics so the hot path never takes a lock.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters shared by the acquisition and pipeline threads
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Packets pulled from capture servers
    pub packets_received: AtomicU64,
    /// Batches handed downstream
    pub batches_delivered: AtomicU64,
    /// Transport-level errors observed by acquisition threads
    pub transport_errors: AtomicU64,
    /// Reconnect attempts after a transport error
    pub reconnects: AtomicU64,
    /// Acquisition contexts that claimed a server and started
    pub workers_started: AtomicU64,
    /// Acquisition contexts that exited and released their reference
    pub workers_finished: AtomicU64,
    /// Packets successfully decoded into a flow key
    pub packets_decoded: AtomicU64,
    /// Packets the decoder could not parse
    pub decode_errors: AtomicU64,
    /// Packets seen by detection
    pub packets_detected: AtomicU64,
    /// Packets recorded by the output stage
    pub packets_logged: AtomicU64,
}

/// Point-in-time copy of the counters, serializable for logging
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_received: u64,
    pub batches_delivered: u64,
    pub transport_errors: u64,
    pub reconnects: u64,
    pub workers_started: u64,
    pub workers_finished: u64,
    pub packets_decoded: u64,
    pub decode_errors: u64,
    pub packets_detected: u64,
    pub packets_logged: u64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            workers_started: self.workers_started.load(Ordering::Relaxed),
            workers_finished: self.workers_finished.load(Ordering::Relaxed),
            packets_decoded: self.packets_decoded.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            packets_detected: self.packets_detected.load(Ordering::Relaxed),
            packets_logged: self.packets_logged.load(Ordering::Relaxed),
        }
    }

    /// Snapshot rendered as a JSON object for the shutdown log line
    pub fn snapshot_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}
