//! Per-server acquisition context
//!
//! Each context claims its server once at startup, holds one counted
//! reference to the shared configuration for its lifetime, and releases it
//! exactly once on every exit path, including transport-error exits.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use super::batch::PacketBatch;
use super::shared::AcquisitionHandle;
use super::telemetry::EngineMetrics;
use super::transport::CaptureTransport;
use crate::errors::{ConfigError, ExponentialBackoff};
use crate::shutdown::ShutdownSignal;

/// Downstream consumer of filled batches. Implementations either hand off
/// to another thread (blocking on a full queue; backpressure never drops)
/// or run the remaining pipeline stages inline.
pub trait PacketSink: Send {
    /// Consume the filled packets of the batch and leave it ready for the
    /// next populate cycle.
    fn deliver(&mut self, batch: &mut PacketBatch) -> Result<(), PipelineClosed>;
}

/// The downstream pipeline has gone away; acquisition winds down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineClosed;

/// Acquisition loop state for one capture server
pub struct AcquisitionWorker {
    handle: AcquisitionHandle,
    transport: Arc<dyn CaptureTransport>,
    sink: Box<dyn PacketSink>,
    shutdown: ShutdownSignal,
    metrics: Arc<EngineMetrics>,
}

impl AcquisitionWorker {
    pub fn new(
        handle: AcquisitionHandle,
        transport: Arc<dyn CaptureTransport>,
        sink: Box<dyn PacketSink>,
        shutdown: ShutdownSignal,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            handle,
            transport,
            sink,
            shutdown,
            metrics,
        }
    }

    /// Run until shutdown. Consumes the worker; the configuration
    /// reference is released when `self` drops at the end.
    pub fn run(mut self) {
        // Sole assignment point: one claim at startup, for the lifetime
        // of this context.
        let server = self.handle.claim_next_server().to_owned();
        self.metrics.workers_started.fetch_add(1, Ordering::Relaxed);
        info!(server = %server, "acquisition context started");

        if let Err(err) = self.acquire_loop(&server) {
            error!(server = %server, error = %err, "acquisition context failed");
        }

        self.metrics.workers_finished.fetch_add(1, Ordering::Relaxed);
        info!(server = %server, "acquisition context stopped");
    }

    fn acquire_loop(&mut self, server: &str) -> Result<(), ConfigError> {
        // Batch is allocated once, before the loop; the hot path reuses it.
        let mut batch = PacketBatch::allocate(self.handle.batch_size())?;
        let mut backoff = ExponentialBackoff::new(50, 5_000);

        while !self.shutdown.is_triggered() {
            let mut client = match self.transport.connect(server) {
                Ok(client) => {
                    backoff.reset();
                    client
                }
                Err(err) => {
                    self.metrics.transport_errors.fetch_add(1, Ordering::Relaxed);
                    self.metrics.reconnects.fetch_add(1, Ordering::Relaxed);
                    warn!(server = %server, error = %err, "connect failed, backing off");
                    self.sleep_unless_shutdown(backoff.next_backoff());
                    continue;
                }
            };

            while !self.shutdown.is_triggered() {
                match client.populate(&mut batch) {
                    Ok(0) => {
                        // idle poll
                        std::thread::yield_now();
                    }
                    Ok(count) => {
                        self.metrics
                            .packets_received
                            .fetch_add(count as u64, Ordering::Relaxed);
                        if self.sink.deliver(&mut batch).is_err() {
                            warn!(server = %server, "pipeline closed, stopping acquisition");
                            return Ok(());
                        }
                        self.metrics
                            .batches_delivered
                            .fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        self.metrics.transport_errors.fetch_add(1, Ordering::Relaxed);
                        self.metrics.reconnects.fetch_add(1, Ordering::Relaxed);
                        warn!(server = %server, error = %err, "capture stream failed, reconnecting");
                        break;
                    }
                }
            }
            // client dropped here: one release per connect
        }

        Ok(())
    }

    /// Backoff sleep that stays responsive to the shutdown signal
    fn sleep_unless_shutdown(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            if self.shutdown.is_triggered() {
                return;
            }
            std::thread::sleep(Duration::from_millis(10).min(duration));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::shared::AcquisitionConfig;
    use crate::acquisition::transport::ScriptedTransport;

    /// Sink that counts delivered packets and then clears the batch
    struct CountingSink {
        delivered: Arc<std::sync::atomic::AtomicU64>,
        closed_after: Option<usize>,
        calls: usize,
    }

    impl PacketSink for CountingSink {
        fn deliver(&mut self, batch: &mut PacketBatch) -> Result<(), PipelineClosed> {
            self.calls += 1;
            if let Some(limit) = self.closed_after {
                if self.calls > limit {
                    return Err(PipelineClosed);
                }
            }
            self.delivered
                .fetch_add(batch.filled() as u64, Ordering::Relaxed);
            batch.clear();
            Ok(())
        }
    }

    fn run_worker(
        transport: Arc<ScriptedTransport>,
        servers: Vec<String>,
        closed_after: Option<usize>,
    ) -> (u64, AcquisitionConfig, Arc<EngineMetrics>) {
        let config = AcquisitionConfig::new(servers, Some(4)).unwrap();
        let metrics = Arc::new(EngineMetrics::new());
        let delivered = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let shutdown = ShutdownSignal::new();

        let worker = AcquisitionWorker::new(
            config.acquire(),
            transport,
            Box::new(CountingSink {
                delivered: Arc::clone(&delivered),
                closed_after,
                calls: 0,
            }),
            shutdown.clone(),
            Arc::clone(&metrics),
        );

        let join = std::thread::spawn(move || worker.run());
        // Let the worker drain its script, then stop it.
        std::thread::sleep(Duration::from_millis(50));
        shutdown.trigger();
        join.join().unwrap();

        (delivered.load(Ordering::Relaxed), config, metrics)
    }

    #[test]
    fn test_worker_delivers_scripted_frames_and_releases() {
        let transport = Arc::new(
            ScriptedTransport::new().script("s1", vec![b"a".to_vec(), b"b".to_vec()]),
        );
        let (delivered, config, metrics) =
            run_worker(Arc::clone(&transport), vec!["s1".to_string()], None);

        assert_eq!(delivered, 2);
        assert_eq!(metrics.snapshot().packets_received, 2);
        // worker exited: its reference is released, only the root remains
        assert_eq!(config.holders(), 1);
        assert_eq!(transport.connect_count(), transport.release_count());
    }

    #[test]
    fn test_worker_releases_on_pipeline_close() {
        let transport = Arc::new(ScriptedTransport::new().script(
            "s1",
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()],
        ));
        let (_, config, metrics) =
            run_worker(Arc::clone(&transport), vec!["s1".to_string()], Some(1));

        // error exit path still released the reference and the client
        assert_eq!(config.holders(), 1);
        assert_eq!(metrics.snapshot().workers_finished, 1);
        assert_eq!(transport.connect_count(), transport.release_count());
    }

    #[test]
    fn test_worker_backs_off_on_refused_connect() {
        let transport = Arc::new(ScriptedTransport::new().refuse("down"));
        let (delivered, config, metrics) =
            run_worker(Arc::clone(&transport), vec!["down".to_string()], None);

        assert_eq!(delivered, 0);
        assert!(metrics.snapshot().transport_errors >= 1);
        assert_eq!(config.holders(), 1);
    }
}
