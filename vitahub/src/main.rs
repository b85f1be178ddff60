mod server;
mod status;

use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use log::{LevelFilter, info, warn};
use vitahub_engine::panadapter::parse_pan_spec;
use vitahub_engine::{
    AccumulatorConfig, AudioForwarder, Dispatcher, Engine, EngineConfig, FlexVitaDecoder, HubConfig, OverrunPolicy,
    PanadapterPublisher, PanadapterRegistry, ReplayFileSource, UdpCaptureSource, ViewportStore, hub, spawn_capture,
};
use vitahub_messages::{Command, PanadapterDescriptor, StreamKey};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Overrun {
    /// Drop a frame that receives more bins than it declared
    Discard,
    /// Keep the declared bins and emit the frame right away
    EmitClamped,
}

#[derive(Parser, Debug)]
#[command(name = "vitahub")]
#[command(about = "Reassembles FlexRadio VITA-49 telemetry and pushes it to connected clients")]
struct Cli {
    /// UDP address to capture VITA-49 datagrams on
    #[arg(long, default_value = "0.0.0.0:4991")]
    udp: SocketAddr,

    /// Replay a recording (u32 length-prefixed datagrams) instead of capturing
    #[arg(long, conflicts_with = "udp")]
    replay: Option<PathBuf>,

    /// Restart the replay at end of file
    #[arg(long, requires = "replay")]
    replay_loop: bool,

    /// TCP address clients connect to
    #[arg(short = 'l', long, default_value = "0.0.0.0:8283")]
    listen: SocketAddr,

    /// Static panadapter: ID:CENTER_MHZ:BANDWIDTH_MHZ:X_PIXELS[:Y_PIXELS]
    #[arg(long = "pan", value_parser = parse_pan_spec)]
    pans: Vec<PanadapterDescriptor>,

    /// TCP address streaming radio status lines (read only)
    #[arg(long)]
    status: Option<SocketAddr>,

    /// Panadapter id whose geometry drives waterfall cropping
    #[arg(long, value_parser = parse_stream_key)]
    current_pan: Option<StreamKey>,

    /// Viewport refresh and panadapter snapshot cadence, in milliseconds
    #[arg(long, default_value = "1000")]
    refresh_ms: u64,

    /// Frames a client may lag behind before it is dropped
    #[arg(long, default_value = "64")]
    sink_capacity: usize,

    /// Concurrent streams kept in each accumulator
    #[arg(long, default_value = "64")]
    max_streams: usize,

    /// Policy for chunks delivering more bins than their frame declared
    #[arg(long, value_enum, default_value = "discard")]
    overrun: Overrun,

    /// Workers forwarding audio
    #[arg(long, default_value = "2")]
    audio_workers: usize,

    /// More logging (-v debug, -vv trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_stream_key(s: &str) -> Result<StreamKey, String> {
    StreamKey::parse_hex(s).ok_or_else(|| format!("not a hex stream id: {s:?}"))
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            accumulator: AccumulatorConfig {
                max_streams: self.max_streams,
                overrun: match self.overrun {
                    Overrun::Discard => OverrunPolicy::Discard,
                    Overrun::EmitClamped => OverrunPolicy::EmitClamped,
                },
                ..Default::default()
            },
            hub: HubConfig {
                sink_capacity: self.sink_capacity,
                ..Default::default()
            },
            audio_workers: self.audio_workers,
            refresh_interval: Duration::from_millis(self.refresh_ms.max(1)),
            ..Default::default()
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::builder()
        .format(|buf, record| {
            writeln!(
                buf,
                "{:<5} - mod path |{}| - target | {} | args: |{}|",
                record.level(),
                record.module_path().unwrap_or(""),
                record.target(),
                record.args()
            )
        })
        .filter_level(LevelFilter::Warn)
        .filter_module("vitahub", level)
        .filter_module("vitahub_engine", level)
        .parse_default_env()
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = cli.engine_config();

    // Capture first: without a source there is nothing to do
    let (datagram_tx, datagram_rx) = flume::bounded(config.capture_queue);
    let capture_handle = match &cli.replay {
        Some(path) => {
            let source = ReplayFileSource::open(path, cli.replay_loop)
                .with_context(|| format!("cannot open replay file {}", path.display()))?;
            info!("Replaying {}", path.display());
            spawn_capture(source, datagram_tx)?
        }
        None => {
            let source = UdpCaptureSource::bind(cli.udp).with_context(|| format!("cannot capture on {}", cli.udp))?;
            info!("Capturing VITA-49 on {}", source.local_addr()?);
            spawn_capture(source, datagram_tx)?
        }
    };

    let (hub, hub_handle) = hub(&config.hub);
    let hub_thread = thread::Builder::new().name("hub".into()).spawn(move || hub.run())?;

    let registry = PanadapterRegistry::new();
    for pan in &cli.pans {
        registry.upsert(pan.clone());
    }
    if let Some(addr) = cli.status {
        status::spawn_reader(addr, registry.clone())?;
    }

    let viewport = ViewportStore::new();
    let (publisher_cmd_tx, publisher_cmd_rx) = flume::unbounded();
    let publisher = PanadapterPublisher::new(
        registry,
        viewport.clone(),
        hub_handle.clone(),
        config.refresh_interval,
        cli.current_pan,
        publisher_cmd_rx,
    );
    let publisher_thread = thread::Builder::new()
        .name("panadapters".into())
        .spawn(move || publisher.run())?;

    server::spawn(cli.listen, hub_handle.clone(), config.hub.sink_capacity)
        .with_context(|| format!("cannot listen for clients on {}", cli.listen))?;

    let audio = AudioForwarder::spawn(config.audio_workers, config.audio_queue, hub_handle.clone())?;
    let dispatcher = Dispatcher::new(&config.accumulator, viewport, hub_handle.clone(), audio);
    let (engine_cmd_tx, engine_cmd_rx) = flume::unbounded::<Command>();

    // Spawn engine thread
    let engine_handle = thread::Builder::new().name("engine".into()).spawn(move || {
        let engine = Engine::new(datagram_rx, engine_cmd_rx, FlexVitaDecoder, dispatcher);
        engine.run()
    })?;

    // The engine returns when capture ends or the hub fails
    let engine_result = engine_handle
        .join()
        .map_err(|_| anyhow::anyhow!("Engine thread panicked"))?;
    drop(engine_cmd_tx);

    let _ = publisher_cmd_tx.send(Command::Stop);
    if let Ok(Err(e)) = publisher_thread.join() {
        warn!("Panadapter publisher failed: {:#}", e);
    }
    let _ = hub_handle.stop();
    let _ = hub_thread.join();

    match capture_handle.join() {
        Ok(Err(e)) => return Err(e),
        Err(_) => anyhow::bail!("Capture thread panicked"),
        Ok(Ok(())) => {}
    }
    engine_result.map(|_| ())
}
