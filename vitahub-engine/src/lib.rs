pub mod accumulator;
pub mod audio;
pub mod capture;
pub mod crop;
pub mod decode;
pub mod dispatcher;
pub mod fixtures;
pub mod hub;
pub mod panadapter;
pub mod sinks;
pub mod viewport;

pub use accumulator::{AccumulatorConfig, FftAccumulator, OverrunPolicy, WaterfallAccumulator};
pub use audio::AudioForwarder;
pub use capture::{PacketSource, ReplayFileSource, UdpCaptureSource, spawn_capture};
pub use decode::{DecodeError, FlexVitaDecoder, PacketDecoder};
pub use dispatcher::{DispatchStats, Dispatcher};
pub use hub::{Hub, HubConfig, HubError, HubHandle, hub};
pub use panadapter::{PanadapterPublisher, PanadapterRegistry};
pub use sinks::{ChannelSink, Delivery, Sink, SinkId, SinkReceiver, channel_sink};
pub use viewport::ViewportStore;

use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use flume::{Receiver, RecvError};
use log::{debug, info, trace};
use vitahub_messages::Command;

/// Tunables for the whole pipeline.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub accumulator: AccumulatorConfig,
    pub hub: HubConfig,
    /// Workers forwarding Opus chunks.
    pub audio_workers: usize,
    /// Opus chunks waiting for a worker before new ones are dropped.
    pub audio_queue: usize,
    /// Datagrams buffered between capture and ingestion.
    pub capture_queue: usize,
    /// Cadence of viewport refresh and panadapter snapshots.
    pub refresh_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            accumulator: AccumulatorConfig::default(),
            hub: HubConfig::default(),
            audio_workers: 2,
            audio_queue: 64,
            capture_queue: 1024,
            refresh_interval: Duration::from_secs(1),
        }
    }
}

enum Input {
    Command(Result<Command, RecvError>),
    Datagram(Result<Bytes, RecvError>),
}

/// The ingestion engine.
/// Owns the decoder and dispatcher, so all reassembly state lives on its thread.
pub struct Engine<D> {
    datagram_rx: Receiver<Bytes>,
    cmd_rx: Receiver<Command>,
    decoder: D,
    dispatcher: Dispatcher,
    undecodable: u64,
}

impl<D: PacketDecoder> Engine<D> {
    /// Create a new Engine instance.
    pub fn new(datagram_rx: Receiver<Bytes>, cmd_rx: Receiver<Command>, decoder: D, dispatcher: Dispatcher) -> Self {
        debug!("Constructing a new engine");
        Self {
            datagram_rx,
            cmd_rx,
            decoder,
            dispatcher,
            undecodable: 0,
        }
    }

    /// Run the engine (blocking).
    /// Returns once stopped, once capture ends, or with an error if the hub went away.
    pub fn run(mut self) -> Result<DispatchStats> {
        loop {
            let input = flume::Selector::new()
                .recv(&self.cmd_rx, Input::Command)
                .recv(&self.datagram_rx, Input::Datagram)
                .wait();

            match input {
                Input::Command(Ok(Command::Stop)) | Input::Command(Err(RecvError::Disconnected)) => {
                    debug!("Engine received stop");
                    break;
                }
                Input::Datagram(Err(RecvError::Disconnected)) => {
                    debug!("Capture channel closed");
                    break;
                }
                Input::Datagram(Ok(datagram)) => self.ingest(&datagram)?,
            }
        }

        let undecodable = self.undecodable;
        let stats = self.dispatcher.shutdown();
        info!(
            "Engine stopped: {} fft frames, {} waterfall tiles, {} opus chunks, {} undecodable datagrams",
            stats.fft_frames, stats.waterfall_tiles, stats.opus_chunks, undecodable
        );
        Ok(stats)
    }

    fn ingest(&mut self, datagram: &Bytes) -> Result<()> {
        match self.decoder.decode(datagram) {
            Ok(packet) => self.dispatcher.dispatch(packet)?,
            Err(e) => {
                self.undecodable += 1;
                trace!("Dropping datagram: {}", e);
            }
        }
        Ok(())
    }
}
