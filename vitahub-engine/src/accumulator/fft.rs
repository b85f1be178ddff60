use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, trace};
use vitahub_messages::{FftChunk, MessageKind, StreamKey};

use super::{AccumulatorConfig, BinBudget, OverrunPolicy, Progress, StreamTable};

struct FftState {
    budget: BinBudget,
    /// Little-endian u16 samples in arrival order.
    buffer: BytesMut,
}

impl FftState {
    fn new(frame: u32, total: u32) -> Self {
        Self {
            budget: BinBudget::start(frame, total),
            buffer: BytesMut::with_capacity(total as usize * 2),
        }
    }

    fn restart(&mut self, frame: u32, total: u32) {
        self.budget.restart(frame, total);
        self.buffer.clear();
    }

    fn append(&mut self, bins: &[u16]) {
        self.buffer.reserve(bins.len() * 2);
        for &bin in bins {
            self.buffer.put_u16_le(bin);
        }
    }

    fn emit(&mut self, stream: StreamKey) -> Bytes {
        let frame = MessageKind::Fft.stream_message(stream, &self.buffer);
        self.buffer.clear();
        frame
    }
}

/// Reassembles spectrum frames from per-stream FFT chunks.
pub struct FftAccumulator {
    config: AccumulatorConfig,
    streams: StreamTable<FftState>,
}

impl FftAccumulator {
    pub fn new(config: AccumulatorConfig) -> Self {
        let streams = StreamTable::new(config.max_streams);
        Self { config, streams }
    }

    /// Account for one chunk. Returns the tagged frame once its last bins arrive.
    pub fn accept(&mut self, stream: StreamKey, chunk: &FftChunk) -> Option<Bytes> {
        let total = u32::from(chunk.total_bins_in_frame);
        if !self.config.admits(total) {
            debug!("{}: rejecting fft frame {} declaring {} bins", stream, chunk.frame_index, total);
            return None;
        }

        let state = self
            .streams
            .get_or_insert_with(stream, || FftState::new(chunk.frame_index, total));

        if state.budget.frame() != chunk.frame_index {
            if state.budget.is_partial() {
                trace!("{}: fft frame {} abandoned for {}", stream, state.budget.frame(), chunk.frame_index);
            }
            state.restart(chunk.frame_index, total);
        }

        match state.budget.consume(u32::from(chunk.num_bins)) {
            Progress::Pending => {
                state.append(&chunk.bins);
                None
            }
            Progress::Complete => {
                state.append(&chunk.bins);
                Some(state.emit(stream))
            }
            Progress::Stale => {
                trace!("{}: late chunk for finished fft frame {}", stream, chunk.frame_index);
                None
            }
            Progress::Overrun { accepted } => match self.config.overrun {
                OverrunPolicy::Discard => {
                    debug!("{}: fft frame {} over-delivered, discarding", stream, chunk.frame_index);
                    state.buffer.clear();
                    state.budget.discard();
                    None
                }
                OverrunPolicy::EmitClamped => {
                    let keep = (accepted as usize).min(chunk.bins.len());
                    state.append(&chunk.bins[..keep]);
                    state.budget.mark_emitted();
                    Some(state.emit(stream))
                }
            },
        }
    }

    /// Streams with live accumulation state.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(frame_index: u32, total: u16, bins: &[u16]) -> FftChunk {
        FftChunk {
            frame_index,
            total_bins_in_frame: total,
            num_bins: bins.len() as u16,
            bins: bins.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn test_emits_tagged_frame_when_complete() {
        let mut acc = FftAccumulator::new(AccumulatorConfig::default());
        let stream = StreamKey(0x1A2B);

        assert_eq!(acc.accept(stream, &chunk(5, 3, &[10])), None);
        assert_eq!(acc.accept(stream, &chunk(5, 3, &[20])), None);
        let frame = acc.accept(stream, &chunk(5, 3, &[30])).expect("frame complete");

        assert_eq!(&frame[..], b"F 1A2B\x0a\x00\x14\x00\x1e\x00");
    }

    #[test]
    fn test_new_frame_discards_partial() {
        let mut acc = FftAccumulator::new(AccumulatorConfig::default());
        let stream = StreamKey(7);

        assert_eq!(acc.accept(stream, &chunk(1, 10, &[1, 2, 3, 4])), None);
        assert_eq!(acc.accept(stream, &chunk(2, 6, &[5, 6, 7])), None);
        let frame = acc.accept(stream, &chunk(2, 6, &[8, 9, 10])).expect("frame complete");

        let payload = &frame[3..];
        assert_eq!(payload.len(), 12);
        assert_eq!(&payload[..2], &5u16.to_le_bytes());
    }

    #[test]
    fn test_streams_do_not_interfere() {
        let mut acc = FftAccumulator::new(AccumulatorConfig::default());

        assert_eq!(acc.accept(StreamKey(0xA), &chunk(1, 2, &[1])), None);
        assert_eq!(acc.accept(StreamKey(0xB), &chunk(9, 2, &[100])), None);
        let a = acc.accept(StreamKey(0xA), &chunk(1, 2, &[2])).unwrap();
        let b = acc.accept(StreamKey(0xB), &chunk(9, 2, &[200])).unwrap();

        assert_eq!(&a[..], b"F A\x01\x00\x02\x00");
        assert_eq!(&b[..], b"F B\x64\x00\xc8\x00");
        assert_eq!(acc.stream_count(), 2);
    }

    #[test]
    fn test_duplicate_after_emit_is_ignored() {
        let mut acc = FftAccumulator::new(AccumulatorConfig::default());
        let stream = StreamKey(1);
        assert!(acc.accept(stream, &chunk(3, 1, &[1])).is_some());
        assert_eq!(acc.accept(stream, &chunk(3, 1, &[1])), None);
        // the next frame still works
        assert!(acc.accept(stream, &chunk(4, 1, &[2])).is_some());
    }

    #[test]
    fn test_overrun_discards_by_default() {
        let mut acc = FftAccumulator::new(AccumulatorConfig::default());
        let stream = StreamKey(1);
        assert_eq!(acc.accept(stream, &chunk(1, 3, &[1, 2])), None);
        assert_eq!(acc.accept(stream, &chunk(1, 3, &[3, 4])), None);
        assert_eq!(acc.accept(stream, &chunk(1, 3, &[5])), None);

        // the next frame starts clean
        assert_eq!(acc.accept(stream, &chunk(2, 3, &[7, 8])), None);
        let frame = acc.accept(stream, &chunk(2, 3, &[9])).expect("next frame completes");
        assert_eq!(&frame[..], b"F 1\x07\x00\x08\x00\x09\x00");
    }

    #[test]
    fn test_overrun_emit_clamped() {
        let config = AccumulatorConfig {
            overrun: OverrunPolicy::EmitClamped,
            ..Default::default()
        };
        let mut acc = FftAccumulator::new(config);
        let stream = StreamKey(1);
        assert_eq!(acc.accept(stream, &chunk(1, 3, &[1, 2])), None);
        let frame = acc.accept(stream, &chunk(1, 3, &[3, 4])).expect("clamped frame");
        assert_eq!(&frame[..], b"F 1\x01\x00\x02\x00\x03\x00");
    }

    #[test]
    fn test_rejects_empty_and_oversized_frames() {
        let config = AccumulatorConfig {
            max_frame_bins: 4,
            ..Default::default()
        };
        let mut acc = FftAccumulator::new(config);
        assert_eq!(acc.accept(StreamKey(1), &chunk(1, 0, &[])), None);
        assert_eq!(acc.accept(StreamKey(1), &chunk(1, 5, &[1])), None);
        assert_eq!(acc.stream_count(), 0);
    }
}
