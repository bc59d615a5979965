//! Error types and retry policies for the acquisition engine

use std::time::Duration;

use thiserror::Error;

/// Configuration-time errors. All of these are fatal to runmode startup;
/// the engine never runs with a partially valid server list.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Server list contained no usable identifiers
    #[error("ipc.server produced no usable server identifiers")]
    EmptyServerList,

    /// Requested runmode name is not registered
    #[error("unknown runmode topology '{0}'")]
    UnknownTopology(String),

    /// Storage for the shared configuration could not be obtained
    #[error("failed to allocate acquisition storage")]
    AllocationFailed,

    /// A required configuration key was absent
    #[error("missing required configuration key '{0}'")]
    MissingKey(&'static str),

    /// A configuration key held an unusable value
    #[error("configuration key '{key}' is invalid: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Errors raised while standing up or tearing down the thread graph.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// OS refused to start a thread; the whole runmode aborts startup
    #[error("failed to start thread '{name}': {source}")]
    ThreadStartFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// More releases than acquisitions on the shared configuration.
    /// Contract violation, not a recoverable condition.
    #[error("acquisition config released more times than it was acquired")]
    RefcountUnderflow,

    /// A pipeline thread panicked before teardown completed
    #[error("pipeline thread '{0}' panicked")]
    ThreadPanicked(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors surfaced by the IPC transport collaborator. The acquisition core
/// does not interpret these beyond logging and reconnecting; its only
/// obligation is that they never leak the shared configuration reference.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connection to a capture server could not be established
    #[error("failed to connect to capture server '{server}': {reason}")]
    Connect { server: String, reason: String },

    /// An established capture stream failed mid-read
    #[error("capture stream from '{server}' failed: {reason}")]
    Stream { server: String, reason: String },

    /// The capture server closed the stream
    #[error("capture server '{server}' closed the stream")]
    Closed { server: String },
}

/// Exponential backoff with jitter for reconnect loops
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current_attempt: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff strategy
    pub fn new(initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            current_attempt: 0,
            initial_backoff_ms,
            max_backoff_ms,
        }
    }

    /// Get the next backoff duration with jitter
    pub fn next_backoff(&mut self) -> Duration {
        let backoff_ms = self
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(self.current_attempt))
            .min(self.max_backoff_ms);

        self.current_attempt += 1;

        // ±20% jitter
        let jitter = (backoff_ms / 5) as i64;
        let jitter_amount = if jitter > 0 {
            (rand::random::<i64>() % (2 * jitter)) - jitter
        } else {
            0
        };
        let final_backoff = (backoff_ms as i64 + jitter_amount).max(0) as u64;

        Duration::from_millis(final_backoff)
    }

    /// Reset the backoff to initial state
    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    /// Get current attempt number
    pub fn attempt(&self) -> u32 {
        self.current_attempt
    }
}
