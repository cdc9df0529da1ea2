/// Snapshot pipeline: dirty-section cache, delta encoding and the
/// off-thread serializer
///
/// The kernel marks sections dirty in post-tick and asks the pipeline to
/// publish. Publication is throttled, skipped entirely with no observers,
/// and serialized off the sim thread.
pub mod cache;
pub mod delta;
pub mod sections;
pub mod worker;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::world::WorldState;

pub use cache::{FullSnapshot, SnapshotCache, TickSnapshot};
pub use delta::{DeltaEncoder, DeltaSnapshot};
pub use worker::{SnapshotKind, SnapshotWorker};

pub struct SnapshotPipeline {
    cache: SnapshotCache,
    encoder: DeltaEncoder,
    worker: Option<SnapshotWorker>,
    throttle_secs: f64,
    last_published: Option<f64>,
    observer_count: Arc<AtomicUsize>,
    published_total: u64,
}

impl SnapshotPipeline {
    pub fn new(throttle_ms: u64, observer_count: Arc<AtomicUsize>) -> Self {
        Self {
            cache: SnapshotCache::new(),
            encoder: DeltaEncoder::new(),
            worker: Some(SnapshotWorker::spawn()),
            throttle_secs: throttle_ms as f64 / 1000.0,
            last_published: None,
            observer_count,
            published_total: 0,
        }
    }

    /// Absorb the sections the state reports changed this tick
    pub fn absorb_dirty(&mut self, state: &mut WorldState) {
        let dirty = state.take_dirty();
        self.cache.mark_dirty(dirty);
    }

    pub fn invalidate_statics(&mut self) {
        self.cache.invalidate_statics();
    }

    /// Synchronous full snapshot for a newly connected observer
    pub fn initial_snapshot(&mut self, state: &mut WorldState) -> FullSnapshot {
        self.absorb_dirty(state);
        let tick = state.tick;
        self.cache.full_snapshot(state, tick)
    }

    /// Synchronous tick snapshot (static data stripped)
    pub fn tick_snapshot(&mut self, state: &mut WorldState) -> TickSnapshot {
        self.absorb_dirty(state);
        let tick = state.tick;
        self.cache.snapshot(state, tick)
    }

    /// Synchronous delta against the previously published sections
    pub fn delta_snapshot(&mut self, state: &mut WorldState, force_full: bool) -> DeltaSnapshot {
        self.absorb_dirty(state);
        let tick = state.tick;
        self.encoder.encode(&mut self.cache, state, tick, force_full)
    }

    /// Throttled post-tick publication toward observers. No observers, no
    /// work.
    pub fn maybe_publish(&mut self, state: &mut WorldState, now: f64) {
        if self.observer_count.load(Ordering::Relaxed) == 0 {
            // Still absorb the dirt so the next snapshot is correct
            self.absorb_dirty(state);
            return;
        }
        if let Some(last) = self.last_published {
            if now - last < self.throttle_secs {
                self.absorb_dirty(state);
                return;
            }
        }
        self.last_published = Some(now);

        let snapshot = self.tick_snapshot(state);
        if let Some(worker) = &self.worker {
            worker.submit_tick(snapshot);
        }
        self.published_total += 1;
    }

    /// Finished serializations ready for observer fan-out
    pub fn poll_serialized(&self) -> Vec<(SnapshotKind, Value)> {
        self.worker
            .as_ref()
            .map(|worker| worker.poll())
            .unwrap_or_default()
    }

    pub fn published_total(&self) -> u64 {
        self.published_total
    }

    pub fn shutdown(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.shutdown();
        }
    }
}

impl std::fmt::Debug for SnapshotPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotPipeline")
            .field("published_total", &self.published_total)
            .field("dirty", &self.cache.dirty_count())
            .finish()
    }
}
