use std::sync::Arc;

use parking_lot::RwLock;
use vitahub_messages::ViewportExtent;

/// Last published viewport extent, shared between the panadapter publisher
/// (writer) and the ingestion thread (reader).
///
/// The value is `Copy`, so both sides hold the lock only for a few-word copy.
#[derive(Debug, Clone, Default)]
pub struct ViewportStore {
    current: Arc<RwLock<Option<ViewportExtent>>>,
}

impl ViewportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current extent. Last writer wins.
    pub fn publish(&self, extent: ViewportExtent) {
        *self.current.write() = Some(extent);
    }

    /// Consistent copy of the current extent, `None` until one was published.
    pub fn snapshot(&self) -> Option<ViewportExtent> {
        *self.current.read()
    }
}
