use bytes::Bytes;
use flume::{Receiver, Sender};

use super::{Delivery, Sink, SinkId};

/// A sink backed by a bounded flume channel; the transport drains the other end.
#[derive(Debug)]
pub struct ChannelSink {
    id: SinkId,
    frame_tx: Sender<Bytes>,
}

/// Transport side of a [`ChannelSink`]. Yields frames until the hub drops the sink.
#[derive(Debug)]
pub struct SinkReceiver {
    id: SinkId,
    frame_rx: Receiver<Bytes>,
}

/// Create a sink holding at most `capacity` undelivered frames (at least one).
pub fn channel_sink(capacity: usize) -> (ChannelSink, SinkReceiver) {
    let id = SinkId::next();
    let (frame_tx, frame_rx) = flume::bounded(capacity.max(1));
    (ChannelSink { id, frame_tx }, SinkReceiver { id, frame_rx })
}

impl Sink for ChannelSink {
    fn id(&self) -> SinkId {
        self.id
    }

    fn offer(&self, frame: &Bytes) -> Delivery {
        // try_send so a stalled client never blocks the hub
        match self.frame_tx.try_send(frame.clone()) {
            Ok(()) => Delivery::Accepted,
            Err(flume::TrySendError::Full(_)) => Delivery::Full,
            Err(flume::TrySendError::Disconnected(_)) => Delivery::Closed,
        }
    }
}

impl SinkReceiver {
    pub fn id(&self) -> SinkId {
        self.id
    }

    /// Next frame, blocking. `None` once the sink was evicted or unregistered.
    pub fn recv(&self) -> Option<Bytes> {
        self.frame_rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Result<Bytes, flume::RecvTimeoutError> {
        self.frame_rx.recv_timeout(timeout)
    }

    /// Frames queued and not yet taken by the transport.
    pub fn pending(&self) -> usize {
        self.frame_rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_reports_full_queue() {
        let (sink, rx) = channel_sink(1);
        let frame = Bytes::from_static(b"F 1\x00\x00");

        assert_eq!(sink.offer(&frame), Delivery::Accepted);
        assert_eq!(sink.offer(&frame), Delivery::Full);
        assert_eq!(rx.pending(), 1);
        assert_eq!(rx.recv(), Some(frame));
    }

    #[test]
    fn test_offer_reports_closed_receiver() {
        let (sink, rx) = channel_sink(4);
        drop(rx);
        assert_eq!(sink.offer(&Bytes::from_static(b"O x")), Delivery::Closed);
    }

    #[test]
    fn test_dropping_sink_ends_receiver() {
        let (sink, rx) = channel_sink(0);
        assert_eq!(sink.id(), rx.id());
        assert_eq!(sink.offer(&Bytes::from_static(b"P {}")), Delivery::Accepted);
        drop(sink);
        assert!(rx.recv().is_some());
        assert_eq!(rx.recv(), None);
    }
}
