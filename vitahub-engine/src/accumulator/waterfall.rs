use bytes::Bytes;
use log::{debug, trace};
use vitahub_messages::{MessageKind, StreamKey, ViewportExtent, WaterfallTile};

use super::{AccumulatorConfig, BinBudget, OverrunPolicy, Progress, StreamTable};
use crate::crop::{TileGeometry, crop_to_viewport};

struct WaterfallState {
    budget: BinBudget,
    samples: Vec<u16>,
}

impl WaterfallState {
    fn new(timecode: u32, total: u32) -> Self {
        Self {
            budget: BinBudget::start(timecode, total),
            samples: Vec::with_capacity(total as usize),
        }
    }

    fn restart(&mut self, timecode: u32, total: u32) {
        self.budget.restart(timecode, total);
        self.samples.clear();
    }

    fn emit(&mut self, stream: StreamKey, tile: &WaterfallTile, viewport: &ViewportExtent) -> Bytes {
        let geometry = TileGeometry {
            frame_low_freq: tile.frame_low_freq,
            bin_bandwidth: tile.bin_bandwidth,
            total_bins: u32::from(tile.total_bins_in_frame),
        };
        let pixels = crop_to_viewport(&geometry, &self.samples, viewport);
        self.samples.clear();
        MessageKind::Waterfall.stream_message(stream, &pixels)
    }
}

/// Reassembles waterfall tiles per stream and crops finished tiles to the display.
pub struct WaterfallAccumulator {
    config: AccumulatorConfig,
    streams: StreamTable<WaterfallState>,
}

impl WaterfallAccumulator {
    pub fn new(config: AccumulatorConfig) -> Self {
        let streams = StreamTable::new(config.max_streams);
        Self { config, streams }
    }

    /// Account for one tile chunk. `viewport` is the crop target, read at the
    /// time the chunk is handled; only the completing chunk's value matters.
    pub fn accept(&mut self, stream: StreamKey, tile: &WaterfallTile, viewport: &ViewportExtent) -> Option<Bytes> {
        let total = u32::from(tile.total_bins_in_frame);
        if !self.config.admits(total) {
            debug!("{}: rejecting waterfall tile {} declaring {} bins", stream, tile.timecode, total);
            return None;
        }

        let state = self
            .streams
            .get_or_insert_with(stream, || WaterfallState::new(tile.timecode, total));

        if state.budget.frame() != tile.timecode {
            if state.budget.is_partial() {
                trace!("{}: waterfall tile {} abandoned for {}", stream, state.budget.frame(), tile.timecode);
            }
            state.restart(tile.timecode, total);
        }

        match state.budget.consume(u32::from(tile.width)) {
            Progress::Pending => {
                state.samples.extend_from_slice(&tile.samples);
                None
            }
            Progress::Complete => {
                state.samples.extend_from_slice(&tile.samples);
                Some(state.emit(stream, tile, viewport))
            }
            Progress::Stale => {
                trace!("{}: late chunk for finished waterfall tile {}", stream, tile.timecode);
                None
            }
            Progress::Overrun { accepted } => match self.config.overrun {
                OverrunPolicy::Discard => {
                    debug!("{}: waterfall tile {} over-delivered, discarding", stream, tile.timecode);
                    state.samples.clear();
                    state.budget.discard();
                    None
                }
                OverrunPolicy::EmitClamped => {
                    let keep = (accepted as usize).min(tile.samples.len());
                    state.samples.extend_from_slice(&tile.samples[..keep]);
                    state.budget.mark_emitted();
                    Some(state.emit(stream, tile, viewport))
                }
            },
        }
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitahub_messages::Hertz;

    fn tile(timecode: u32, total: u16, samples: &[u16]) -> WaterfallTile {
        WaterfallTile {
            frame_low_freq: 0,
            bin_bandwidth: 100,
            width: samples.len() as u16,
            timecode,
            total_bins_in_frame: total,
            samples: samples.to_vec(),
            ..Default::default()
        }
    }

    fn viewport(pixel_width: u32) -> ViewportExtent {
        ViewportExtent {
            center_frequency: Hertz(400),
            bandwidth: Hertz(800),
            pixel_width,
        }
    }

    #[test]
    fn test_emits_cropped_tile() {
        let mut acc = WaterfallAccumulator::new(AccumulatorConfig::default());
        let stream = StreamKey(0x4200_0000);

        assert_eq!(acc.accept(stream, &tile(9, 8, &[1, 2, 3, 4]), &viewport(4)), None);
        let msg = acc
            .accept(stream, &tile(9, 8, &[5, 6, 7, 8]), &viewport(4))
            .expect("tile complete");

        assert_eq!(&msg[..10], b"W 42000000");
        assert_eq!(&msg[10..], &[2, 0, 4, 0, 6, 0, 8, 0]);
    }

    #[test]
    fn test_new_timecode_discards_partial() {
        let mut acc = WaterfallAccumulator::new(AccumulatorConfig::default());
        let stream = StreamKey(1);

        assert_eq!(acc.accept(stream, &tile(1, 8, &[9, 9, 9, 9]), &viewport(4)), None);
        assert_eq!(acc.accept(stream, &tile(2, 8, &[1, 2, 3, 4]), &viewport(4)), None);
        let msg = acc.accept(stream, &tile(2, 8, &[5, 6, 7, 8]), &viewport(4)).unwrap();
        assert_eq!(&msg[3..], &[2, 0, 4, 0, 6, 0, 8, 0]);
    }

    #[test]
    fn test_viewport_shrunk_mid_tile() {
        let mut acc = WaterfallAccumulator::new(AccumulatorConfig::default());
        let stream = StreamKey(1);

        assert_eq!(acc.accept(stream, &tile(1, 8, &[1, 2, 3, 4]), &viewport(8)), None);
        let msg = acc.accept(stream, &tile(1, 8, &[5, 6, 7, 8]), &viewport(2)).unwrap();
        assert_eq!(msg.len(), 3 + 4);
        assert_eq!(&msg[3..], &[4, 0, 8, 0]);
    }

    #[test]
    fn test_short_payload_is_zero_padded() {
        let mut acc = WaterfallAccumulator::new(AccumulatorConfig::default());
        let stream = StreamKey(1);
        // widths claim 8 bins but only 4 samples arrive
        let mut first = tile(1, 8, &[1, 2]);
        first.width = 4;
        let mut second = tile(1, 8, &[3, 4]);
        second.width = 4;

        assert_eq!(acc.accept(stream, &first, &viewport(4)), None);
        let msg = acc.accept(stream, &second, &viewport(4)).unwrap();
        assert_eq!(&msg[3..], &[2, 0, 4, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_overrun_discards_by_default() {
        let mut acc = WaterfallAccumulator::new(AccumulatorConfig::default());
        let stream = StreamKey(1);

        assert_eq!(acc.accept(stream, &tile(1, 4, &[1, 2, 3]), &viewport(4)), None);
        assert_eq!(acc.accept(stream, &tile(1, 4, &[4, 5, 6]), &viewport(4)), None);
        // late chunk for the discarded tile
        assert_eq!(acc.accept(stream, &tile(1, 4, &[7]), &viewport(4)), None);

        let msg = acc
            .accept(stream, &tile(2, 4, &[1, 2, 3, 4]), &viewport(4))
            .expect("next tile completes");
        // edges 200, 400, 600, 800 -> bins 1, 3, 3, 3
        assert_eq!(&msg[3..], &[2, 0, 4, 0, 4, 0, 4, 0]);
    }

    #[test]
    fn test_overrun_emit_clamped() {
        let config = AccumulatorConfig {
            overrun: OverrunPolicy::EmitClamped,
            ..Default::default()
        };
        let mut acc = WaterfallAccumulator::new(config);
        let stream = StreamKey(1);

        assert_eq!(acc.accept(stream, &tile(1, 4, &[1, 2, 3]), &viewport(2)), None);
        let msg = acc.accept(stream, &tile(1, 4, &[4, 5, 6]), &viewport(2)).unwrap();
        // viewport 0..800 over 2 pixels: edges 400, 800 -> bins 3 and 3
        assert_eq!(&msg[3..], &[4, 0, 4, 0]);
    }
}
