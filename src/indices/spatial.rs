/// Grid-based spatial index shared by every proximity-sensitive subsystem
///
/// Uses cell-based chunking so radius queries touch O(k) entries instead of
/// scanning every entity. Query results are leased buffers returned to an
/// internal pool on drop, keeping steady-state queries allocation-free.
use bevy::prelude::*;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::world::types::{EntityId, EntityKind};
use crate::world::WorldState;

const CELL_SIZE: f32 = 16.0;
/// Movement beyond this distance since the last rebuild marks the index dirty
const MOVE_THRESHOLD: f32 = 8.0;

#[derive(Debug, Clone)]
struct SpatialEntry {
    id: EntityId,
    kind: EntityKind,
    position: Vec2,
}

/// One query result with the squared distance to the query center
#[derive(Debug, Clone)]
pub struct RadiusHit {
    pub id: EntityId,
    pub distance_sq: f32,
}

type BufferPool = Arc<Mutex<Vec<Vec<RadiusHit>>>>;

/// Leased query result buffer; returns to the pool when dropped
pub struct RadiusHits {
    hits: Vec<RadiusHit>,
    pool: BufferPool,
}

impl Deref for RadiusHits {
    type Target = [RadiusHit];

    fn deref(&self) -> &Self::Target {
        &self.hits
    }
}

impl Drop for RadiusHits {
    fn drop(&mut self) {
        let mut buffer = std::mem::take(&mut self.hits);
        buffer.clear();
        if let Ok(mut pool) = self.pool.lock() {
            if pool.len() < 32 {
                pool.push(buffer);
            }
        }
    }
}

impl std::fmt::Debug for RadiusHits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.hits.iter()).finish()
    }
}

/// Uniform-grid index over live entities (agents, animals, objects)
pub struct SharedSpatialIndex {
    cells: HashMap<IVec2, Vec<SpatialEntry>>,
    /// Position of each entity at the last rebuild
    tracked: HashMap<EntityId, Vec2>,
    dirty: AtomicBool,
    pool: BufferPool,
    rebuilds: u64,
}

impl Default for SharedSpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedSpatialIndex {
    pub fn new() -> Self {
        Self {
            cells: HashMap::with_capacity(256),
            tracked: HashMap::new(),
            dirty: AtomicBool::new(true),
            pool: Arc::new(Mutex::new(Vec::new())),
            rebuilds: 0,
        }
    }

    fn cell_of(position: Vec2) -> IVec2 {
        IVec2::new(
            (position.x / CELL_SIZE).floor() as i32,
            (position.y / CELL_SIZE).floor() as i32,
        )
    }

    /// Force a refresh on the next rebuild check
    pub fn invalidate(&self) {
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// True when the entity population changed or anything moved beyond the
    /// refresh threshold since the last rebuild
    pub fn is_dirty(&self, state: &WorldState) -> bool {
        if self.dirty.load(Ordering::Relaxed) {
            return true;
        }
        let live = state.entities.values().filter(|e| !e.is_dead).count();
        if live != self.tracked.len() {
            return true;
        }
        let threshold_sq = MOVE_THRESHOLD * MOVE_THRESHOLD;
        for record in state.entities.values() {
            if record.is_dead {
                continue;
            }
            match self.tracked.get(&record.id) {
                Some(&old) => {
                    if old.distance_squared(record.position) > threshold_sq {
                        return true;
                    }
                }
                None => return true,
            }
        }
        false
    }

    /// Reseed the grid from the live entity set
    pub fn rebuild(&mut self, state: &WorldState) {
        self.cells.clear();
        self.tracked.clear();

        for record in state.entities.values() {
            if record.is_dead {
                continue;
            }
            let entry = SpatialEntry {
                id: record.id.clone(),
                kind: record.kind,
                position: record.position,
            };
            self.cells
                .entry(Self::cell_of(record.position))
                .or_default()
                .push(entry);
            self.tracked.insert(record.id.clone(), record.position);
        }

        self.dirty.store(false, Ordering::Relaxed);
        self.rebuilds += 1;
    }

    /// Entities within `radius` of `center`, optionally filtered by kind.
    /// Distances in the result are squared.
    pub fn query_radius(
        &self,
        center: Vec2,
        radius: f32,
        filter: Option<EntityKind>,
    ) -> RadiusHits {
        let mut hits = self
            .pool
            .lock()
            .ok()
            .and_then(|mut pool| pool.pop())
            .unwrap_or_default();

        let radius_sq = radius * radius;
        let cell_radius = (radius / CELL_SIZE).ceil() as i32;
        let center_cell = Self::cell_of(center);

        for dy in -cell_radius..=cell_radius {
            for dx in -cell_radius..=cell_radius {
                let cell = center_cell + IVec2::new(dx, dy);
                let Some(entries) = self.cells.get(&cell) else {
                    continue;
                };
                for entry in entries {
                    if let Some(kind) = filter {
                        if entry.kind != kind {
                            continue;
                        }
                    }
                    let distance_sq = entry.position.distance_squared(center);
                    if distance_sq <= radius_sq {
                        hits.push(RadiusHit {
                            id: entry.id.clone(),
                            distance_sq,
                        });
                    }
                }
            }
        }

        RadiusHits {
            hits,
            pool: self.pool.clone(),
        }
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }
}

impl std::fmt::Debug for SharedSpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSpatialIndex")
            .field("cells", &self.cells.len())
            .field("tracked", &self.tracked.len())
            .field("rebuilds", &self.rebuilds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::types::AgentProfile;

    fn state_with_agents(positions: &[Vec2]) -> WorldState {
        let mut state = WorldState::new(1);
        for &position in positions {
            state.spawn_agent(
                AgentProfile {
                    position: Some(position),
                    ..AgentProfile::default()
                },
                0.0,
            );
        }
        state
    }

    #[test]
    fn test_query_radius_finds_nearby() {
        let state = state_with_agents(&[
            Vec2::new(10.0, 10.0),
            Vec2::new(20.0, 10.0),
            Vec2::new(500.0, 500.0),
        ]);
        let mut index = SharedSpatialIndex::new();
        index.rebuild(&state);

        let hits = index.query_radius(Vec2::new(10.0, 10.0), 50.0, None);
        assert_eq!(hits.len(), 2);
        let far = index.query_radius(Vec2::new(10.0, 10.0), 1000.0, None);
        assert_eq!(far.len(), 3);
    }

    #[test]
    fn test_query_filters_by_kind() {
        let mut state = state_with_agents(&[Vec2::new(10.0, 10.0)]);
        state.spawn_animal("deer", Vec2::new(12.0, 10.0));
        let mut index = SharedSpatialIndex::new();
        index.rebuild(&state);

        let animals = index.query_radius(Vec2::new(10.0, 10.0), 30.0, Some(EntityKind::Animal));
        assert_eq!(animals.len(), 1);
        let agents = index.query_radius(Vec2::new(10.0, 10.0), 30.0, Some(EntityKind::Agent));
        assert_eq!(agents.len(), 1);
    }

    #[test]
    fn test_distances_are_squared() {
        let state = state_with_agents(&[Vec2::new(0.0, 0.0), Vec2::new(3.0, 4.0)]);
        let mut index = SharedSpatialIndex::new();
        index.rebuild(&state);

        let hits = index.query_radius(Vec2::new(0.0, 0.0), 10.0, None);
        let other = hits
            .iter()
            .find(|h| h.distance_sq > 0.0)
            .expect("second agent in range");
        assert!((other.distance_sq - 25.0).abs() < 1e-4);
    }

    #[test]
    fn test_dead_entities_excluded() {
        let mut state = state_with_agents(&[Vec2::new(10.0, 10.0), Vec2::new(12.0, 10.0)]);
        let victim = state.agents.keys().next().cloned().unwrap();
        state.kill_agent(&victim);

        let mut index = SharedSpatialIndex::new();
        index.rebuild(&state);
        let hits = index.query_radius(Vec2::new(10.0, 10.0), 30.0, None);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_dirty_after_movement() {
        let mut state = state_with_agents(&[Vec2::new(10.0, 10.0)]);
        let id = state.agents.keys().next().cloned().unwrap();
        let mut index = SharedSpatialIndex::new();
        index.rebuild(&state);
        assert!(!index.is_dirty(&state));

        // Small move stays clean
        state.set_agent_position(&id, Vec2::new(12.0, 10.0));
        assert!(!index.is_dirty(&state));

        // Large move trips the threshold
        state.set_agent_position(&id, Vec2::new(60.0, 10.0));
        assert!(index.is_dirty(&state));

        index.rebuild(&state);
        assert!(!index.is_dirty(&state));
    }

    #[test]
    fn test_buffer_pool_reuse() {
        let state = state_with_agents(&[Vec2::new(10.0, 10.0)]);
        let mut index = SharedSpatialIndex::new();
        index.rebuild(&state);

        {
            let hits = index.query_radius(Vec2::new(10.0, 10.0), 30.0, None);
            assert_eq!(hits.len(), 1);
        }
        // Buffer returned; a second query reuses it without growing the pool
        let hits = index.query_radius(Vec2::new(10.0, 10.0), 30.0, None);
        assert_eq!(hits.len(), 1);
        drop(hits);
        assert!(index.pool.lock().unwrap().len() >= 1);
    }
}
