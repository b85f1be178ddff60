use bytes::{BufMut, Bytes, BytesMut};

use crate::StreamKey;

/// Kind of an outbound message. Clients tell messages apart by the leading tag bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Panadapter-state snapshot (JSON map).
    Panadapter,
    /// Slice state. Reserved, nothing emits it yet.
    Slice,
    /// Completed FFT frame.
    Fft,
    /// Completed and cropped waterfall tile.
    Waterfall,
    /// Opus audio chunk, forwarded verbatim.
    Opus,
}

impl MessageKind {
    pub const fn tag(self) -> &'static [u8; 2] {
        match self {
            MessageKind::Panadapter => b"P ",
            MessageKind::Slice => b"S ",
            MessageKind::Fft => b"F ",
            MessageKind::Waterfall => b"W ",
            MessageKind::Opus => b"O ",
        }
    }

    /// `[tag][payload]`, for kinds that don't name a stream.
    pub fn message(self, payload: &[u8]) -> Bytes {
        let mut out = BytesMut::with_capacity(2 + payload.len());
        out.put_slice(self.tag());
        out.put_slice(payload);
        out.freeze()
    }

    /// `[tag][stream id as uppercase hex][payload]`.
    pub fn stream_message(self, stream: StreamKey, payload: &[u8]) -> Bytes {
        let hex = stream.hex_ascii();
        let mut out = BytesMut::with_capacity(2 + hex.len() + payload.len());
        out.put_slice(self.tag());
        out.put_slice(&hex);
        out.put_slice(payload);
        out.freeze()
    }
}
