//! Per-stream reassembly of fragmented FFT frames and waterfall tiles.
//!
//! Both accumulators follow the same discipline: state is created lazily on
//! the first chunk of an unseen stream, a new frame id (frame index or
//! timecode) resets it, and the frame is emitted exactly when the expected
//! bin count reaches zero. Counters never wrap; over-delivery is handled by
//! [`OverrunPolicy`].

mod fft;
mod waterfall;

pub use fft::FftAccumulator;
pub use waterfall::WaterfallAccumulator;

use std::collections::HashMap;

use vitahub_messages::StreamKey;

/// What to do with a chunk that carries more bins than its frame still expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverrunPolicy {
    /// Drop the partial frame and ignore the rest of its chunks.
    #[default]
    Discard,
    /// Keep the bins that fit the declared total and emit right away.
    EmitClamped,
}

#[derive(Debug, Clone)]
pub struct AccumulatorConfig {
    /// Stream states kept at most; the least recently touched one is evicted beyond this.
    pub max_streams: usize,
    /// Frames declaring more bins than this are rejected.
    pub max_frame_bins: u32,
    pub overrun: OverrunPolicy,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            max_streams: 64,
            max_frame_bins: u32::from(u16::MAX),
            overrun: OverrunPolicy::Discard,
        }
    }
}

impl AccumulatorConfig {
    pub(crate) fn admits(&self, total_bins: u32) -> bool {
        total_bins > 0 && total_bins <= self.max_frame_bins
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Collecting,
    Emitted,
    Discarded,
}

/// Outcome of accounting for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Progress {
    /// Frame still misses bins.
    Pending,
    /// The last expected bins arrived.
    Complete,
    /// Chunk carried more bins than expected; `accepted` of them fit.
    Overrun { accepted: u32 },
    /// Chunk belongs to a frame already emitted or discarded.
    Stale,
}

/// Bins still expected for the frame currently being assembled.
#[derive(Debug, Clone)]
pub(crate) struct BinBudget {
    frame: u32,
    total: u32,
    remaining: u32,
    phase: Phase,
}

impl BinBudget {
    pub(crate) fn start(frame: u32, total: u32) -> Self {
        Self {
            frame,
            total,
            remaining: total,
            phase: Phase::Collecting,
        }
    }

    pub(crate) fn frame(&self) -> u32 {
        self.frame
    }

    pub(crate) fn restart(&mut self, frame: u32, total: u32) {
        *self = Self::start(frame, total);
    }

    /// True while a frame has received some but not all of its bins.
    pub(crate) fn is_partial(&self) -> bool {
        self.phase == Phase::Collecting && self.remaining < self.total
    }

    pub(crate) fn consume(&mut self, bins: u32) -> Progress {
        if self.phase != Phase::Collecting {
            return Progress::Stale;
        }
        match self.remaining.checked_sub(bins) {
            Some(0) => {
                self.remaining = 0;
                self.phase = Phase::Emitted;
                Progress::Complete
            }
            Some(left) => {
                self.remaining = left;
                Progress::Pending
            }
            None => {
                let accepted = self.remaining;
                self.remaining = 0;
                Progress::Overrun { accepted }
            }
        }
    }

    pub(crate) fn mark_emitted(&mut self) {
        self.phase = Phase::Emitted;
    }

    pub(crate) fn discard(&mut self) {
        self.remaining = 0;
        self.phase = Phase::Discarded;
    }
}

struct Slot<S> {
    state: S,
    touched: u64,
}

/// Stream key -> accumulation state, bounded by `max_streams`.
///
/// Only ever touched from the ingestion thread, so there is no lock.
pub(crate) struct StreamTable<S> {
    slots: HashMap<StreamKey, Slot<S>>,
    max_streams: usize,
    clock: u64,
}

impl<S> StreamTable<S> {
    pub(crate) fn new(max_streams: usize) -> Self {
        Self {
            slots: HashMap::new(),
            max_streams: max_streams.max(1),
            clock: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn get_or_insert_with(&mut self, key: StreamKey, create: impl FnOnce() -> S) -> &mut S {
        self.clock += 1;
        if !self.slots.contains_key(&key) && self.slots.len() >= self.max_streams {
            self.evict_oldest();
        }
        let clock = self.clock;
        let slot = self.slots.entry(key).or_insert_with(|| Slot {
            state: create(),
            touched: clock,
        });
        slot.touched = clock;
        &mut slot.state
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .slots
            .iter()
            .min_by_key(|(_, slot)| slot.touched)
            .map(|(key, _)| *key);
        if let Some(key) = oldest {
            log::debug!("stream table full, dropping state of {}", key);
            self.slots.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_counts_down_to_complete() {
        let mut budget = BinBudget::start(1, 10);
        assert_eq!(budget.consume(4), Progress::Pending);
        assert!(budget.is_partial());
        assert_eq!(budget.consume(6), Progress::Complete);
        assert!(!budget.is_partial());
        assert_eq!(budget.consume(1), Progress::Stale);
    }

    #[test]
    fn test_budget_never_wraps() {
        let mut budget = BinBudget::start(1, 5);
        assert_eq!(budget.consume(3), Progress::Pending);
        assert_eq!(budget.consume(7), Progress::Overrun { accepted: 2 });
        budget.discard();
        assert_eq!(budget.consume(1), Progress::Stale);

        budget.restart(2, 5);
        assert_eq!(budget.frame(), 2);
        assert_eq!(budget.consume(5), Progress::Complete);
    }

    #[test]
    fn test_zero_bin_chunk_is_pending() {
        let mut budget = BinBudget::start(1, 2);
        assert_eq!(budget.consume(0), Progress::Pending);
        assert!(!budget.is_partial());
    }

    #[test]
    fn test_table_evicts_least_recently_touched() {
        let mut table: StreamTable<u32> = StreamTable::new(2);
        *table.get_or_insert_with(StreamKey(1), || 0) += 1;
        *table.get_or_insert_with(StreamKey(2), || 0) += 1;
        // touch 1 again so 2 becomes the oldest
        *table.get_or_insert_with(StreamKey(1), || 0) += 1;
        *table.get_or_insert_with(StreamKey(3), || 0) += 1;

        assert_eq!(table.len(), 2);
        assert_eq!(*table.get_or_insert_with(StreamKey(1), || 0), 2);
        // 2 was evicted and comes back fresh, pushing out 3
        assert_eq!(*table.get_or_insert_with(StreamKey(2), || 0), 0);
    }

    #[test]
    fn test_config_admits() {
        let config = AccumulatorConfig {
            max_frame_bins: 8,
            ..Default::default()
        };
        assert!(!config.admits(0));
        assert!(config.admits(8));
        assert!(!config.admits(9));
    }
}
