//! Downstream pipeline stages and hand-off sinks
//!
//! Stage loops exit when their upstream channel disconnects; teardown
//! cascades from the acquisition threads outward, so no stage needs its
//! own shutdown check. Hand-off sends block when a queue is full:
//! backpressure is a blocking hand-off, never a drop.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender};
use tracing::debug;

use super::flow::FlowKey;
use crate::acquisition::batch::{Packet, PacketBatch};
use crate::acquisition::telemetry::EngineMetrics;
use crate::acquisition::worker::{PacketSink, PipelineClosed};

/// A packet annotated with its flow key, ready for detection
#[derive(Debug, Clone)]
pub struct DecodedPacket {
    pub flow: FlowKey,
    pub packet: Packet,
}

/// Sink that moves filled packets across a bounded channel to a decode
/// thread. Used by the autofp topology.
pub struct ChannelSink {
    tx: Sender<Vec<Packet>>,
}

impl ChannelSink {
    pub fn new(tx: Sender<Vec<Packet>>) -> Self {
        Self { tx }
    }
}

impl PacketSink for ChannelSink {
    fn deliver(&mut self, batch: &mut PacketBatch) -> Result<(), PipelineClosed> {
        let packets = batch.take_filled();
        self.tx.send(packets).map_err(|_| PipelineClosed)
    }
}

/// Sink that runs decode, detect, and output inline on the acquisition
/// thread. Used by the single and workers topologies: no cross-thread
/// hand-off, per-thread pipeline state.
pub struct InlineSink {
    detector: FlowDetector,
}

impl InlineSink {
    pub fn new(metrics: Arc<EngineMetrics>) -> Self {
        Self {
            detector: FlowDetector::new(metrics),
        }
    }
}

impl PacketSink for InlineSink {
    fn deliver(&mut self, batch: &mut PacketBatch) -> Result<(), PipelineClosed> {
        for packet in batch.packets() {
            match FlowKey::from_frame(packet.data()) {
                Some(flow) => {
                    self.detector.metrics.packets_decoded.fetch_add(1, Ordering::Relaxed);
                    self.detector.inspect(flow);
                    self.detector
                        .metrics
                        .packets_logged
                        .fetch_add(1, Ordering::Relaxed);
                }
                None => {
                    self.detector.metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        batch.clear();
        Ok(())
    }
}

/// Per-thread detection state: per-flow packet counts
pub struct FlowDetector {
    flows: HashMap<FlowKey, u64>,
    metrics: Arc<EngineMetrics>,
}

impl FlowDetector {
    pub fn new(metrics: Arc<EngineMetrics>) -> Self {
        Self {
            flows: HashMap::new(),
            metrics,
        }
    }

    fn inspect(&mut self, flow: FlowKey) {
        *self.flows.entry(flow).or_insert(0) += 1;
        self.metrics.packets_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }
}

/// Decode loop for the autofp topology: parse flow keys and route each
/// packet to its detect thread by flow-hash affinity.
pub fn decode_loop(
    rx: Receiver<Vec<Packet>>,
    detect_txs: Vec<Sender<DecodedPacket>>,
    metrics: Arc<EngineMetrics>,
) {
    debug_assert!(!detect_txs.is_empty());
    for packets in rx.iter() {
        for packet in packets {
            let Some(flow) = FlowKey::from_frame(packet.data()) else {
                metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
                continue;
            };
            metrics.packets_decoded.fetch_add(1, Ordering::Relaxed);

            let target = flow.detect_index(detect_txs.len());
            if detect_txs[target].send(DecodedPacket { flow, packet }).is_err() {
                debug!("detect pool gone, decode stage exiting");
                return;
            }
        }
    }
}

/// Detect loop for the autofp topology: per-flow state stays on one
/// thread, preserving per-flow ordering. Events forward to output.
pub fn detect_loop(
    rx: Receiver<DecodedPacket>,
    output_tx: Sender<DecodedPacket>,
    metrics: Arc<EngineMetrics>,
) {
    let mut detector = FlowDetector::new(Arc::clone(&metrics));
    for decoded in rx.iter() {
        detector.inspect(decoded.flow);
        if output_tx.send(decoded).is_err() {
            debug!("output stage gone, detect stage exiting");
            return;
        }
    }
    debug!(flows = detector.flow_count(), "detect stage drained");
}

/// Output loop: record packet totals for the shutdown report
pub fn output_loop(rx: Receiver<DecodedPacket>, metrics: Arc<EngineMetrics>) {
    for _decoded in rx.iter() {
        metrics.packets_logged.fetch_add(1, Ordering::Relaxed);
    }
}
