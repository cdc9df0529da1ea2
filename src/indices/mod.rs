/// Derived lookup structures rebuilt from the authoritative state
///
/// Both indices are read-only to subsystems during a tick; the kernel
/// rewrites them in pre-tick on a fixed cadence or when they report dirty.
pub mod entity_index;
pub mod spatial;

pub use entity_index::EntityIndex;
pub use spatial::{RadiusHit, RadiusHits, SharedSpatialIndex};

/// Rebuild cadence in FAST fires (roughly every 250 ms)
pub const REBUILD_EVERY_FAST_TICKS: u64 = 5;
