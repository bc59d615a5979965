//! Thread-graph construction
//!
//! For a given topology and shared configuration, spawns exactly one
//! acquisition context per configured server (acquisition-thread count is
//! bound to server count, independent of CPU affinity), plus the
//! topology's downstream threads. Spawn failure aborts the whole runmode:
//! the engine never runs a partially-initialized topology.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::bounded;
use tracing::{error, info, warn};

use super::topology::{ThreadRole, Topology};
use crate::acquisition::batch::Packet;
use crate::acquisition::shared::AcquisitionConfig;
use crate::acquisition::telemetry::{EngineMetrics, MetricsSnapshot};
use crate::acquisition::transport::CaptureTransport;
use crate::acquisition::worker::AcquisitionWorker;
use crate::errors::RuntimeError;
use crate::pipeline::stages::{self, ChannelSink, DecodedPacket, InlineSink};
use crate::shutdown::ShutdownSignal;

/// Threads reserved for process management when deriving the autofp
/// detect pool from available parallelism
const RESERVED_MANAGEMENT_THREADS: usize = 1;

/// Builds a [`ThreadGraph`] for one topology
pub struct ThreadGraphBuilder {
    topology: Topology,
    transport: Arc<dyn CaptureTransport>,
    detect_threads: Option<usize>,
    queue_depth: usize,
}

#[derive(Debug)]
struct NamedThread {
    name: String,
    handle: JoinHandle<()>,
}

/// A running acquisition thread graph
#[derive(Debug)]
pub struct ThreadGraph {
    threads: Vec<NamedThread>,
    shutdown: ShutdownSignal,
    metrics: Arc<EngineMetrics>,
    acquisition: AcquisitionConfig,
    topology: Topology,
}

impl ThreadGraphBuilder {
    pub fn new(topology: Topology, transport: Arc<dyn CaptureTransport>) -> Self {
        Self {
            topology,
            transport,
            detect_threads: None,
            queue_depth: 64,
        }
    }

    /// Override the autofp detect pool size. Unset derives it from
    /// available parallelism minus reservations.
    pub fn detect_threads(mut self, count: Option<usize>) -> Self {
        self.detect_threads = count;
        self
    }

    /// Capacity of the bounded hand-off queues
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Spawn the graph. On any spawn failure the already-started threads
    /// are shut down and joined before the error is returned.
    pub fn build(self, acquisition: AcquisitionConfig) -> Result<ThreadGraph, RuntimeError> {
        let shutdown = ShutdownSignal::new();
        let metrics = Arc::new(EngineMetrics::new());
        let mut threads = Vec::new();

        let spawned = match self.topology {
            Topology::AutoFp => {
                self.spawn_autofp(&acquisition, &shutdown, &metrics, &mut threads)
            }
            Topology::Single | Topology::Workers => {
                self.spawn_combined(&acquisition, &shutdown, &metrics, &mut threads)
            }
        };

        match spawned {
            Ok(()) => {
                info!(
                    mode = %self.topology,
                    threads = threads.len(),
                    servers = acquisition.thread_count(),
                    "thread graph started"
                );
                Ok(ThreadGraph {
                    threads,
                    shutdown,
                    metrics,
                    acquisition,
                    topology: self.topology,
                })
            }
            Err(err) => {
                error!(error = %err, "thread graph startup failed, aborting runmode");
                shutdown.trigger();
                for thread in threads {
                    let _ = thread.handle.join();
                }
                Err(err)
            }
        }
    }

    /// Single and workers topologies: one combined-pipeline thread per
    /// server, no cross-thread hand-off.
    fn spawn_combined(
        &self,
        acquisition: &AcquisitionConfig,
        shutdown: &ShutdownSignal,
        metrics: &Arc<EngineMetrics>,
        threads: &mut Vec<NamedThread>,
    ) -> Result<(), RuntimeError> {
        let prefix = match self.topology {
            Topology::Single => "S#",
            _ => ThreadRole::Worker.prefix(),
        };

        for index in 0..acquisition.thread_count() {
            let worker = AcquisitionWorker::new(
                acquisition.acquire(),
                Arc::clone(&self.transport),
                Box::new(InlineSink::new(Arc::clone(metrics))),
                shutdown.clone(),
                Arc::clone(metrics),
            );
            spawn_named(threads, format!("{}{:02}", prefix, index + 1), move || {
                worker.run()
            })?;
        }
        Ok(())
    }

    /// Autofp topology: receive and decode pinned per server, detection
    /// fanned out across a flow-pinned pool, one output thread.
    fn spawn_autofp(
        &self,
        acquisition: &AcquisitionConfig,
        shutdown: &ShutdownSignal,
        metrics: &Arc<EngineMetrics>,
        threads: &mut Vec<NamedThread>,
    ) -> Result<(), RuntimeError> {
        let pool_size = self.detect_threads.unwrap_or_else(derive_detect_pool).max(1);

        let (output_tx, output_rx) = bounded::<DecodedPacket>(self.queue_depth);
        let mut detect_txs = Vec::with_capacity(pool_size);
        for index in 0..pool_size {
            let (tx, rx) = bounded::<DecodedPacket>(self.queue_depth);
            detect_txs.push(tx);
            let out = output_tx.clone();
            let stage_metrics = Arc::clone(metrics);
            spawn_named(threads, format!("{}{:02}", ThreadRole::Detect.prefix(), index + 1), move || {
                stages::detect_loop(rx, out, stage_metrics)
            })?;
        }
        // detect threads hold the only long-lived output senders
        drop(output_tx);

        let output_metrics = Arc::clone(metrics);
        spawn_named(
            threads,
            format!("{}01", ThreadRole::Output.prefix()),
            move || stages::output_loop(output_rx, output_metrics),
        )?;

        for index in 0..acquisition.thread_count() {
            let (batch_tx, batch_rx) = bounded::<Vec<Packet>>(self.queue_depth);

            let routes = detect_txs.clone();
            let stage_metrics = Arc::clone(metrics);
            spawn_named(threads, format!("{}{:02}", ThreadRole::Decode.prefix(), index + 1), move || {
                stages::decode_loop(batch_rx, routes, stage_metrics)
            })?;

            let worker = AcquisitionWorker::new(
                acquisition.acquire(),
                Arc::clone(&self.transport),
                Box::new(ChannelSink::new(batch_tx)),
                shutdown.clone(),
                Arc::clone(metrics),
            );
            spawn_named(threads, format!("{}{:02}", ThreadRole::Receive.prefix(), index + 1), move || {
                worker.run()
            })?;
        }

        // teardown cascades from the acquisition threads outward: receive
        // exits on shutdown, decode on disconnect, detect and output after
        // the last sender drops
        Ok(())
    }
}

impl ThreadGraph {
    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn thread_names(&self) -> Vec<&str> {
        self.threads.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn acquisition(&self) -> &AcquisitionConfig {
        &self.acquisition
    }

    /// Cooperative teardown: signal, join every thread, verify the shared
    /// configuration came back to a single holder.
    pub fn stop(self) -> Result<MetricsSnapshot, RuntimeError> {
        info!(mode = %self.topology, "stopping thread graph");
        self.shutdown.trigger();

        let mut panicked: Option<String> = None;
        for thread in self.threads {
            if thread.handle.join().is_err() {
                error!(thread = %thread.name, "pipeline thread panicked");
                panicked.get_or_insert(thread.name);
            }
        }

        let holders = self.acquisition.holders();
        if holders != 1 {
            warn!(holders, "configuration references outlived their threads");
        }

        let snapshot = self.metrics.snapshot();
        info!(metrics = %self.metrics.snapshot_json(), "thread graph stopped");

        match panicked {
            Some(name) => Err(RuntimeError::ThreadPanicked(name)),
            None => Ok(snapshot),
        }
    }
}

fn spawn_named(
    threads: &mut Vec<NamedThread>,
    name: String,
    body: impl FnOnce() + Send + 'static,
) -> Result<(), RuntimeError> {
    let handle = thread::Builder::new()
        .name(name.clone())
        .spawn(body)
        .map_err(|source| RuntimeError::ThreadStartFailed {
            name: name.clone(),
            source,
        })?;
    threads.push(NamedThread { name, handle });
    Ok(())
}

fn derive_detect_pool() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .saturating_sub(RESERVED_MANAGEMENT_THREADS)
        .max(1)
}
