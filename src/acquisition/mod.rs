// Acquisition core components
pub mod batch; // Pre-allocated packet buffer batches
pub mod server_list; // ipc.server parsing, round-robin order source
pub mod shared; // Shared AcquisitionConfig + counted handles + cursor
pub mod telemetry; // Atomic counters, JSON snapshot export
pub mod transport; // CaptureTransport seam, loopback + scripted impls
pub mod worker; // Per-server acquisition context loop

// Re-export commonly used types
pub use batch::{Packet, PacketBatch};
pub use server_list::parse_server_list;
pub use shared::{AcquisitionConfig, AcquisitionHandle, DEFAULT_ALLOCATION_BATCH};
pub use telemetry::{EngineMetrics, MetricsSnapshot};
pub use transport::{CaptureClient, CaptureTransport, LoopbackTransport, ScriptedTransport};
pub use worker::{AcquisitionWorker, PacketSink, PipelineClosed};
