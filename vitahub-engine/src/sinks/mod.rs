//! Delivery endpoints for downstream clients.

mod channel;

pub use channel::{ChannelSink, SinkReceiver, channel_sink};

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a registered sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SinkId(u64);

impl SinkId {
    /// A process-unique id.
    pub fn next() -> Self {
        Self(NEXT_SINK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sink#{}", self.0)
    }
}

/// Result of offering a frame to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Accepted,
    /// Outbound queue is full; the client is not keeping up.
    Full,
    /// The client side is gone.
    Closed,
}

/// Delivery endpoint of one downstream consumer.
///
/// Dropping a sink closes its delivery path.
pub trait Sink: Send {
    fn id(&self) -> SinkId;

    /// Hand over a frame. Must not block.
    fn offer(&self, frame: &Bytes) -> Delivery;
}
