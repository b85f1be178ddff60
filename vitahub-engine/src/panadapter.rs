//! Panadapter geometry: the registry the radio-state side fills in, and the
//! publisher that turns it into the viewport and the `P ` snapshot message.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use flume::Receiver;
use log::{debug, trace};
use parking_lot::RwLock;
use thiserror::Error;
use vitahub_messages::{Command, Hertz, MessageKind, PanadapterDescriptor, StreamKey};

use crate::hub::HubHandle;
use crate::viewport::ViewportStore;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusLineError {
    #[error("bad panadapter id {0:?}")]
    BadStreamId(String),
    #[error("bad value for {key}: {value:?}")]
    BadValue { key: String, value: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PanSpecError {
    #[error("expected ID:CENTER_MHZ:BANDWIDTH_MHZ:X_PIXELS[:Y_PIXELS], got {0:?}")]
    Shape(String),
    #[error("bad {field} in panadapter spec: {value:?}")]
    Field { field: &'static str, value: String },
}

/// What a status line did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    Updated(StreamKey),
    Removed(StreamKey),
    /// Not a panadapter line.
    Ignored,
}

#[derive(Debug, Default)]
struct PanPatch {
    center: Option<Hertz>,
    bandwidth: Option<Hertz>,
    x_pixels: Option<u32>,
    y_pixels: Option<u32>,
    waterfall: Option<StreamKey>,
}

impl PanPatch {
    fn apply(self, pan: &mut PanadapterDescriptor) {
        if let Some(center) = self.center {
            pan.center = center;
        }
        if let Some(bandwidth) = self.bandwidth {
            pan.bandwidth = bandwidth;
        }
        if let Some(x) = self.x_pixels {
            pan.x_pixels = x;
        }
        if let Some(y) = self.y_pixels {
            pan.y_pixels = y;
        }
        if self.waterfall.is_some() {
            pan.waterfall = self.waterfall;
        }
    }
}

fn bad_value(key: &str, value: &str) -> StatusLineError {
    StatusLineError::BadValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_mhz(key: &str, value: &str) -> Result<Hertz, StatusLineError> {
    value
        .parse::<f64>()
        .map(Hertz::from_mhz_f64)
        .map_err(|_| bad_value(key, value))
}

/// Widest display accepted; every tile allocates two bytes per pixel.
pub const MAX_PIXELS: u32 = 16_384;

fn pixel_count(value: &str) -> Option<u32> {
    value.parse::<u32>().ok().filter(|&n| n <= MAX_PIXELS)
}

fn parse_pixels(key: &str, value: &str) -> Result<u32, StatusLineError> {
    pixel_count(value).ok_or_else(|| bad_value(key, value))
}

/// Shared map of known panadapters, keyed by panadapter stream id.
#[derive(Debug, Clone, Default)]
pub struct PanadapterRegistry {
    pans: Arc<RwLock<BTreeMap<StreamKey, PanadapterDescriptor>>>,
}

impl PanadapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, pan: PanadapterDescriptor) {
        self.pans.write().insert(pan.stream, pan);
    }

    pub fn remove(&self, stream: StreamKey) -> bool {
        self.pans.write().remove(&stream).is_some()
    }

    pub fn get(&self, stream: StreamKey) -> Option<PanadapterDescriptor> {
        self.pans.read().get(&stream).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<StreamKey, PanadapterDescriptor> {
        self.pans.read().clone()
    }

    /// Apply one radio status line. Only `display pan` lines are looked at:
    ///
    /// ```text
    /// S4C2A0F1|display pan 0x40000000 center=14.100000 bandwidth=0.200000 x_pixels=1024 y_pixels=700
    /// display pan set 0x40000000 xpixels=1280
    /// S4C2A0F1|display pan 0x40000000 removed
    /// ```
    ///
    /// Frequencies are MHz. Unknown keys are skipped. On error nothing is changed.
    pub fn apply_status_line(&self, line: &str) -> Result<StatusUpdate, StatusLineError> {
        let line = line.trim();
        let body = line.split_once('|').map_or(line, |(_, rest)| rest);
        let mut tokens = body.split_whitespace();

        if tokens.next() != Some("display") || tokens.next() != Some("pan") {
            return Ok(StatusUpdate::Ignored);
        }
        let mut id = tokens.next();
        if id == Some("set") {
            id = tokens.next();
        }
        let Some(id) = id else {
            return Ok(StatusUpdate::Ignored);
        };
        let stream = StreamKey::parse_hex(id).ok_or_else(|| StatusLineError::BadStreamId(id.to_string()))?;

        let mut patch = PanPatch::default();
        for token in tokens {
            if token == "removed" {
                self.remove(stream);
                return Ok(StatusUpdate::Removed(stream));
            }
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            match key {
                "center" => patch.center = Some(parse_mhz(key, value)?),
                "bandwidth" => patch.bandwidth = Some(parse_mhz(key, value)?),
                "x_pixels" | "xpixels" => patch.x_pixels = Some(parse_pixels(key, value)?),
                "y_pixels" | "ypixels" => patch.y_pixels = Some(parse_pixels(key, value)?),
                "waterfall" => {
                    patch.waterfall = Some(StreamKey::parse_hex(value).ok_or_else(|| bad_value(key, value))?);
                }
                _ => {}
            }
        }

        let mut pans = self.pans.write();
        let pan = pans
            .entry(stream)
            .or_insert_with(|| PanadapterDescriptor::new(stream));
        patch.apply(pan);
        Ok(StatusUpdate::Updated(stream))
    }
}

/// Parse a static panadapter description: `ID:CENTER_MHZ:BANDWIDTH_MHZ:X_PIXELS[:Y_PIXELS]`,
/// e.g. `0x40000000:14.1:0.2:1024`.
pub fn parse_pan_spec(spec: &str) -> Result<PanadapterDescriptor, PanSpecError> {
    let parts: Vec<&str> = spec.split(':').collect();
    if !(4..=5).contains(&parts.len()) {
        return Err(PanSpecError::Shape(spec.to_string()));
    }
    let field = |field: &'static str, value: &str| PanSpecError::Field {
        field,
        value: value.to_string(),
    };

    let stream = StreamKey::parse_hex(parts[0]).ok_or_else(|| field("id", parts[0]))?;
    let center = parts[1].parse::<f64>().map_err(|_| field("center", parts[1]))?;
    let bandwidth = parts[2].parse::<f64>().map_err(|_| field("bandwidth", parts[2]))?;
    let x_pixels = pixel_count(parts[3]).ok_or_else(|| field("x pixels", parts[3]))?;
    let y_pixels = match parts.get(4) {
        Some(y) => pixel_count(y).ok_or_else(|| field("y pixels", y))?,
        None => 0,
    };

    Ok(PanadapterDescriptor {
        stream,
        center: Hertz::from_mhz_f64(center),
        bandwidth: Hertz::from_mhz_f64(bandwidth),
        x_pixels,
        y_pixels,
        waterfall: None,
    })
}

/// `P ` + JSON object mapping `0x40000000`-style ids to descriptors.
pub fn snapshot_message(pans: &BTreeMap<StreamKey, PanadapterDescriptor>) -> serde_json::Result<Bytes> {
    let by_id: BTreeMap<String, &PanadapterDescriptor> = pans.iter().map(|(k, v)| (k.to_string(), v)).collect();
    let json = serde_json::to_vec(&by_id)?;
    Ok(MessageKind::Panadapter.message(&json))
}

/// Refreshes the viewport and re-broadcasts panadapter state on a fixed cadence.
pub struct PanadapterPublisher {
    registry: PanadapterRegistry,
    viewport: ViewportStore,
    hub: HubHandle,
    interval: Duration,
    preferred: Option<StreamKey>,
    cmd_rx: Receiver<Command>,
}

impl PanadapterPublisher {
    pub fn new(
        registry: PanadapterRegistry,
        viewport: ViewportStore,
        hub: HubHandle,
        interval: Duration,
        preferred: Option<StreamKey>,
        cmd_rx: Receiver<Command>,
    ) -> Self {
        Self {
            registry,
            viewport,
            hub,
            interval,
            preferred,
            cmd_rx,
        }
    }

    /// Run (blocking) until `Command::Stop`, the command channel closing or the hub stopping.
    pub fn run(self) -> Result<()> {
        loop {
            self.publish_once()?;
            match self.cmd_rx.recv_timeout(self.interval) {
                Ok(Command::Stop) | Err(flume::RecvTimeoutError::Disconnected) => break,
                Err(flume::RecvTimeoutError::Timeout) => {}
            }
        }
        debug!("Panadapter publisher stopped");
        Ok(())
    }

    /// One refresh. Returns the panadapter whose extent became the viewport, if any.
    pub fn publish_once(&self) -> Result<Option<StreamKey>> {
        let pans = self.registry.snapshot();

        let current = self.select(&pans);
        if let Some(pan) = current {
            self.viewport.publish(pan.extent());
        } else {
            trace!("No panadapter with usable geometry yet");
        }

        self.hub.broadcast(snapshot_message(&pans)?)?;
        Ok(current.map(|pan| pan.stream))
    }

    /// The preferred panadapter if it has geometry, else the lowest id that does.
    fn select<'a>(&self, pans: &'a BTreeMap<StreamKey, PanadapterDescriptor>) -> Option<&'a PanadapterDescriptor> {
        let usable = |pan: &&PanadapterDescriptor| !pan.extent().is_empty();
        self.preferred
            .and_then(|key| pans.get(&key))
            .filter(usable)
            .or_else(|| pans.values().find(usable))
    }
}
