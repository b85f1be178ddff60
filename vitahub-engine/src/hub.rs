//! Fan-out of finished frames to every connected sink.
//!
//! The [`Hub`] loop is the only owner of the sink set. Everything else talks
//! to it through a cloneable [`HubHandle`], so register, unregister and
//! broadcast requests are applied one at a time, in arrival order.

use bytes::Bytes;
use flume::{Receiver, Sender};
use log::{debug, info, warn};
use thiserror::Error;

use crate::sinks::{Delivery, Sink, SinkId};

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Requests buffered in front of the hub loop; producers block when it is full.
    pub queue_capacity: usize,
    /// Frames a client may lag behind before it is evicted.
    pub sink_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            sink_capacity: 64,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("broadcast hub is no longer running")]
    Stopped,
}

enum Request {
    Register(Box<dyn Sink>),
    Unregister(SinkId),
    Broadcast(Bytes),
    Members(Sender<Vec<SinkId>>),
    Stop,
}

/// The hub control loop. Run it on its own thread with [`Hub::run`].
pub struct Hub {
    requests: Receiver<Request>,
    sinks: Vec<Box<dyn Sink>>,
    delivered: u64,
    evicted: u64,
}

/// Cheap, cloneable sender side of the hub.
#[derive(Clone)]
pub struct HubHandle {
    requests: Sender<Request>,
}

/// Create a hub and its first handle.
pub fn hub(config: &HubConfig) -> (Hub, HubHandle) {
    let (requests_tx, requests) = flume::bounded(config.queue_capacity.max(1));
    let hub = Hub {
        requests,
        sinks: Vec::new(),
        delivered: 0,
        evicted: 0,
    };
    (hub, HubHandle { requests: requests_tx })
}

impl Hub {
    /// Serve requests until [`HubHandle::stop`] or until every handle is dropped.
    /// All sinks still registered are closed on the way out.
    pub fn run(mut self) {
        debug!("Hub loop started");
        while let Ok(request) = self.requests.recv() {
            match request {
                Request::Register(sink) => self.register(sink),
                Request::Unregister(id) => self.unregister(id),
                Request::Broadcast(frame) => self.broadcast(&frame),
                Request::Members(reply) => {
                    let _ = reply.send(self.sinks.iter().map(|s| s.id()).collect());
                }
                Request::Stop => break,
            }
        }
        info!(
            "Hub stopping: {} sinks closed, {} frames delivered, {} evictions",
            self.sinks.len(),
            self.delivered,
            self.evicted
        );
    }

    fn register(&mut self, sink: Box<dyn Sink>) {
        let id = sink.id();
        if self.sinks.iter().any(|s| s.id() == id) {
            warn!("{} registered twice, keeping the first", id);
            return;
        }
        self.sinks.push(sink);
        info!("{} registered ({} connected)", id, self.sinks.len());
    }

    fn unregister(&mut self, id: SinkId) {
        let before = self.sinks.len();
        self.sinks.retain(|s| s.id() != id);
        if self.sinks.len() < before {
            info!("{} unregistered ({} connected)", id, self.sinks.len());
        }
    }

    fn broadcast(&mut self, frame: &Bytes) {
        let mut delivered = 0u64;
        let mut evicted = 0u64;
        self.sinks.retain(|sink| match sink.offer(frame) {
            Delivery::Accepted => {
                delivered += 1;
                true
            }
            Delivery::Full => {
                warn!("{} is not keeping up, evicting", sink.id());
                evicted += 1;
                false
            }
            Delivery::Closed => {
                debug!("{} went away, evicting", sink.id());
                evicted += 1;
                false
            }
        });
        self.delivered += delivered;
        self.evicted += evicted;
    }
}

impl HubHandle {
    pub fn register(&self, sink: impl Sink + 'static) -> Result<(), HubError> {
        self.send(Request::Register(Box::new(sink)))
    }

    pub fn unregister(&self, id: SinkId) -> Result<(), HubError> {
        self.send(Request::Unregister(id))
    }

    /// Queue a frame for every sink. Blocks only while the hub's request queue is full.
    pub fn broadcast(&self, frame: Bytes) -> Result<(), HubError> {
        self.send(Request::Broadcast(frame))
    }

    /// Ids of the currently registered sinks, after every earlier request was applied.
    pub fn members(&self) -> Result<Vec<SinkId>, HubError> {
        let (reply_tx, reply_rx) = flume::bounded(1);
        self.send(Request::Members(reply_tx))?;
        reply_rx.recv().map_err(|_| HubError::Stopped)
    }

    pub fn stop(&self) -> Result<(), HubError> {
        self.send(Request::Stop)
    }

    fn send(&self, request: Request) -> Result<(), HubError> {
        self.requests.send(request).map_err(|_| HubError::Stopped)
    }
}
