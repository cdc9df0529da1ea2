/// Delta snapshot encoder
///
/// Tracks the section versions last published and emits only the sections
/// that moved since. A section absent from the delta is guaranteed
/// unchanged; a section present covers every change to that slice.
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::world::{Section, WorldState};

use super::cache::SnapshotCache;
use super::sections::SectionData;

#[derive(Debug, Clone, Serialize)]
pub struct DeltaSnapshot {
    pub tick: u64,
    pub sim_time: f64,
    /// True when this delta is a full tick snapshot (forced or first)
    pub full: bool,
    pub sections: BTreeMap<Section, Arc<SectionData>>,
}

#[derive(Debug, Default)]
pub struct DeltaEncoder {
    published_versions: HashMap<Section, u64>,
    published_once: bool,
}

impl DeltaEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode the changes since the previous call. The first call and any
    /// `force_full` call publish every section.
    pub fn encode(
        &mut self,
        cache: &mut SnapshotCache,
        state: &WorldState,
        tick: u64,
        force_full: bool,
    ) -> DeltaSnapshot {
        let snapshot = cache.snapshot(state, tick);
        let full = force_full || !self.published_once;

        let sections: BTreeMap<Section, Arc<SectionData>> = snapshot
            .sections
            .iter()
            .filter(|(section, _)| {
                full || cache.version_of(**section)
                    > self.published_versions.get(*section).copied().unwrap_or(0)
            })
            .map(|(section, data)| (*section, data.clone()))
            .collect();

        self.published_versions = cache.versions();
        self.published_once = true;

        DeltaSnapshot {
            tick,
            sim_time: state.sim_time,
            full,
            sections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::types::{AgentProfile, ResourceKind};

    fn fresh() -> (WorldState, SnapshotCache, DeltaEncoder) {
        let mut state = WorldState::new(1);
        state.spawn_agent(AgentProfile::default(), 0.0);
        state.take_dirty();
        (state, SnapshotCache::new(), DeltaEncoder::new())
    }

    #[test]
    fn test_first_delta_is_full() {
        let (state, mut cache, mut encoder) = fresh();
        let delta = encoder.encode(&mut cache, &state, 1, false);
        assert!(delta.full);
        assert_eq!(delta.sections.len(), Section::ALL.len());
    }

    #[test]
    fn test_unchanged_state_produces_empty_delta() {
        let (state, mut cache, mut encoder) = fresh();
        encoder.encode(&mut cache, &state, 1, false);
        let delta = encoder.encode(&mut cache, &state, 2, false);
        assert!(!delta.full);
        assert!(delta.sections.is_empty());
    }

    #[test]
    fn test_delta_contains_only_touched_sections() {
        let (mut state, mut cache, mut encoder) = fresh();
        encoder.encode(&mut cache, &state, 1, false);

        // Touch only the agents section
        let id = state.agents.keys().next().cloned().unwrap();
        state.set_agent_position(&id, bevy::math::Vec2::new(50.0, 50.0));
        cache.mark_dirty(state.take_dirty());

        let delta = encoder.encode(&mut cache, &state, 2, false);
        assert!(delta.sections.contains_key(&Section::Agents));
        assert!(delta.sections.contains_key(&Section::Entities));
        assert!(!delta.sections.contains_key(&Section::Zones));
        assert!(!delta.sections.contains_key(&Section::Tasks));
        assert!(!delta.sections.contains_key(&Section::SocialGraph));
    }

    #[test]
    fn test_force_full_overrides() {
        let (mut state, mut cache, mut encoder) = fresh();
        encoder.encode(&mut cache, &state, 1, false);
        state.add_global_resource(ResourceKind::Wood, 5);
        cache.mark_dirty(state.take_dirty());

        let delta = encoder.encode(&mut cache, &state, 2, true);
        assert!(delta.full);
        assert_eq!(delta.sections.len(), Section::ALL.len());
    }

    #[test]
    fn test_versions_advance_after_publish() {
        let (mut state, mut cache, mut encoder) = fresh();
        encoder.encode(&mut cache, &state, 1, false);

        state.add_global_resource(ResourceKind::Wood, 5);
        cache.mark_dirty(state.take_dirty());
        let first = encoder.encode(&mut cache, &state, 2, false);
        assert!(first.sections.contains_key(&Section::WorldResources));

        // Already published: the same change does not reappear
        let second = encoder.encode(&mut cache, &state, 3, false);
        assert!(!second.sections.contains_key(&Section::WorldResources));
    }
}
