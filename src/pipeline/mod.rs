// Downstream pipeline scaffolding
pub mod flow; // Symmetric flow keys for detect affinity
pub mod stages; // Decode/detect/output loops and hand-off sinks

pub use flow::FlowKey;
pub use stages::{ChannelSink, DecodedPacket, FlowDetector, InlineSink};
