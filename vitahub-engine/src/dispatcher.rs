use std::collections::HashMap;

use log::{debug, trace};
use vitahub_messages::{DecodedPacket, PacketBody, PacketClass};

use crate::accumulator::{AccumulatorConfig, FftAccumulator, WaterfallAccumulator};
use crate::audio::AudioForwarder;
use crate::hub::{HubError, HubHandle};
use crate::viewport::ViewportStore;

/// Packets seen by the dispatcher, per route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub fft_chunks: u64,
    pub fft_frames: u64,
    pub waterfall_chunks: u64,
    /// Waterfall chunks dropped because no viewport was published yet.
    pub waterfall_gated: u64,
    pub waterfall_tiles: u64,
    pub opus_chunks: u64,
    pub opus_dropped: u64,
    pub meter_packets: u64,
    pub ignored: u64,
    pub unknown: u64,
}

/// Routes decoded packets to the accumulators, the audio path or nowhere.
///
/// Owned by the ingestion thread; none of its state is shared.
pub struct Dispatcher {
    fft: FftAccumulator,
    waterfall: WaterfallAccumulator,
    viewport: ViewportStore,
    hub: HubHandle,
    audio: AudioForwarder,
    meters: HashMap<u16, i16>,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(config: &AccumulatorConfig, viewport: ViewportStore, hub: HubHandle, audio: AudioForwarder) -> Self {
        Self {
            fft: FftAccumulator::new(config.clone()),
            waterfall: WaterfallAccumulator::new(config.clone()),
            viewport,
            hub,
            audio,
            meters: HashMap::new(),
            stats: DispatchStats::default(),
        }
    }

    /// Handle one packet. Only a stopped hub is an error.
    pub fn dispatch(&mut self, packet: DecodedPacket) -> Result<(), HubError> {
        let stream = packet.stream;
        match packet.body {
            PacketBody::Fft(chunk) => {
                self.stats.fft_chunks += 1;
                if let Some(frame) = self.fft.accept(stream, &chunk) {
                    self.stats.fft_frames += 1;
                    self.hub.broadcast(frame)?;
                }
            }
            PacketBody::Waterfall(tile) => {
                self.stats.waterfall_chunks += 1;
                let Some(viewport) = self.viewport.snapshot() else {
                    self.stats.waterfall_gated += 1;
                    trace!("{}: no viewport yet, dropping waterfall chunk", stream);
                    return Ok(());
                };
                if let Some(frame) = self.waterfall.accept(stream, &tile, &viewport) {
                    self.stats.waterfall_tiles += 1;
                    self.hub.broadcast(frame)?;
                }
            }
            PacketBody::Opus(payload) => {
                self.stats.opus_chunks += 1;
                if !self.audio.forward(payload) {
                    self.stats.opus_dropped += 1;
                }
            }
            PacketBody::Meter(readings) => {
                self.stats.meter_packets += 1;
                for reading in readings {
                    self.meters.insert(reading.id, reading.value);
                }
            }
            PacketBody::Opaque(_) => match packet.class {
                PacketClass::Unknown(code) => {
                    self.stats.unknown += 1;
                    debug!("{}: unknown packet class {:#06x}, dropped", stream, code);
                }
                class => {
                    self.stats.ignored += 1;
                    trace!("{}: ignoring {:?} packet", stream, class);
                }
            },
        }
        Ok(())
    }

    /// Last value reported for a meter.
    pub fn meter(&self, id: u16) -> Option<i16> {
        self.meters.get(&id).copied()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Tear down, letting queued audio drain. Returns the final counters.
    pub fn shutdown(self) -> DispatchStats {
        self.audio.shutdown();
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{HubConfig, hub};
    use crate::sinks::{SinkReceiver, channel_sink};
    use bytes::Bytes;
    use std::thread::{self, JoinHandle};
    use vitahub_messages::{FftChunk, Hertz, MeterReading, StreamKey, ViewportExtent, WaterfallTile};

    struct Harness {
        dispatcher: Dispatcher,
        viewport: ViewportStore,
        handle: HubHandle,
        rx: SinkReceiver,
        hub_thread: JoinHandle<()>,
    }

    fn harness() -> Harness {
        let (hub, handle) = hub(&HubConfig::default());
        let hub_thread = thread::spawn(move || hub.run());
        let (sink, rx) = channel_sink(64);
        handle.register(sink).unwrap();
        let viewport = ViewportStore::new();
        let audio = AudioForwarder::spawn(1, 8, handle.clone()).unwrap();
        let dispatcher = Dispatcher::new(&AccumulatorConfig::default(), viewport.clone(), handle.clone(), audio);
        Harness {
            dispatcher,
            viewport,
            handle,
            rx,
            hub_thread,
        }
    }

    impl Harness {
        fn finish(self) -> (DispatchStats, Vec<Bytes>) {
            let stats = self.dispatcher.shutdown();
            // members() round-trips through the hub, so every earlier broadcast is in the sink
            self.handle.members().unwrap();
            self.handle.stop().unwrap();
            self.hub_thread.join().unwrap();
            let mut frames = Vec::new();
            while let Some(frame) = self.rx.recv() {
                frames.push(frame);
            }
            (stats, frames)
        }
    }

    fn packet(stream: u32, class: PacketClass, body: PacketBody) -> DecodedPacket {
        DecodedPacket {
            stream: StreamKey(stream),
            class,
            body,
        }
    }

    fn waterfall(timecode: u32) -> PacketBody {
        PacketBody::Waterfall(WaterfallTile {
            bin_bandwidth: 100,
            width: 2,
            timecode,
            total_bins_in_frame: 2,
            samples: vec![1, 2],
            ..Default::default()
        })
    }

    #[test]
    fn test_waterfall_gated_until_viewport_observed() {
        let mut h = harness();
        h.dispatcher
            .dispatch(packet(0x42, PacketClass::Waterfall, waterfall(1)))
            .unwrap();
        assert_eq!(h.dispatcher.stats().waterfall_gated, 1);

        h.viewport.publish(ViewportExtent {
            center_frequency: Hertz(100),
            bandwidth: Hertz(200),
            pixel_width: 2,
        });
        h.dispatcher
            .dispatch(packet(0x42, PacketClass::Waterfall, waterfall(2)))
            .unwrap();

        let (stats, frames) = h.finish();
        assert_eq!(stats.waterfall_tiles, 1);
        assert_eq!(frames, vec![Bytes::from_static(b"W 42\x01\x00\x02\x00")]);
    }

    #[test]
    fn test_routes_fft_opus_meter_and_unknown() {
        let mut h = harness();
        let fft = PacketBody::Fft(FftChunk {
            frame_index: 1,
            total_bins_in_frame: 1,
            num_bins: 1,
            bins: vec![0x0102],
            ..Default::default()
        });
        h.dispatcher.dispatch(packet(0xA, PacketClass::Fft, fft)).unwrap();
        h.dispatcher
            .dispatch(packet(0xB, PacketClass::Opus, PacketBody::Opus(Bytes::from_static(b"op"))))
            .unwrap();
        h.dispatcher
            .dispatch(packet(
                0xC,
                PacketClass::Meter,
                PacketBody::Meter(vec![MeterReading { id: 3, value: -120 }]),
            ))
            .unwrap();
        h.dispatcher
            .dispatch(packet(0xD, PacketClass::Unknown(0x1234), PacketBody::Opaque(Bytes::new())))
            .unwrap();
        h.dispatcher
            .dispatch(packet(0xE, PacketClass::Discovery, PacketBody::Opaque(Bytes::new())))
            .unwrap();
        assert_eq!(h.dispatcher.meter(3), Some(-120));
        assert_eq!(h.dispatcher.meter(4), None);

        let (stats, mut frames) = h.finish();
        assert_eq!(stats.fft_frames, 1);
        assert_eq!(stats.opus_chunks, 1);
        assert_eq!(stats.meter_packets, 1);
        assert_eq!(stats.unknown, 1);
        assert_eq!(stats.ignored, 1);

        frames.sort();
        assert_eq!(
            frames,
            vec![Bytes::from_static(b"F A\x02\x01"), Bytes::from_static(b"O op")]
        );
    }
}
