/// Dirty-section snapshot cache
///
/// Holds one shared deep copy per section. Dirty sections are rebuilt on
/// the next snapshot request and get a new version number; clean sections
/// reuse the cached copy, so a snapshot is mostly pointer clones.
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::world::{Section, WorldState};

use super::sections::{build_section, Overlays, SectionData, StaticSections};

/// Throttled per-tick snapshot shipped to observers
#[derive(Debug, Clone, Serialize)]
pub struct TickSnapshot {
    pub tick: u64,
    pub sim_time: f64,
    pub time_of_day: f32,
    pub sections: BTreeMap<Section, Arc<SectionData>>,
    pub overlays: Arc<Overlays>,
}

/// One-time full snapshot, tick data plus the static world
#[derive(Debug, Clone, Serialize)]
pub struct FullSnapshot {
    #[serde(flatten)]
    pub snapshot: TickSnapshot,
    pub statics: Arc<StaticSections>,
}

#[derive(Debug, Default)]
pub struct SnapshotCache {
    sections: HashMap<Section, Arc<SectionData>>,
    versions: HashMap<Section, u64>,
    dirty: HashSet<Section>,
    statics: Option<Arc<StaticSections>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        let mut cache = Self::default();
        // Everything is dirty until first build
        cache.dirty.extend(Section::ALL);
        cache
    }

    /// Absorb the sections the state reports changed
    pub fn mark_dirty(&mut self, sections: impl IntoIterator<Item = Section>) {
        self.dirty.extend(sections);
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    pub fn version_of(&self, section: Section) -> u64 {
        self.versions.get(&section).copied().unwrap_or(0)
    }

    /// Current versions of every section, used by the delta encoder
    pub fn versions(&self) -> HashMap<Section, u64> {
        Section::ALL
            .into_iter()
            .map(|section| (section, self.version_of(section)))
            .collect()
    }

    /// Rebuild dirty sections and hand out the shared copies
    pub fn snapshot(&mut self, state: &WorldState, tick: u64) -> TickSnapshot {
        let dirty: Vec<Section> = self.dirty.drain().collect();
        for section in dirty {
            let data = Arc::new(build_section(state, section));
            self.sections.insert(section, data);
            *self.versions.entry(section).or_insert(0) += 1;
        }
        // First call may find sections never marked dirty
        for section in Section::ALL {
            if !self.sections.contains_key(&section) {
                self.sections
                    .insert(section, Arc::new(build_section(state, section)));
                *self.versions.entry(section).or_insert(0) += 1;
            }
        }

        TickSnapshot {
            tick,
            sim_time: state.sim_time,
            time_of_day: state.time_of_day(),
            sections: Section::ALL
                .into_iter()
                .map(|section| (section, self.sections[&section].clone()))
                .collect(),
            overlays: Arc::new(Overlays::from_state(state)),
        }
    }

    /// Full snapshot: the tick view plus (cached) static world data
    pub fn full_snapshot(&mut self, state: &WorldState, tick: u64) -> FullSnapshot {
        let statics = self
            .statics
            .get_or_insert_with(|| Arc::new(StaticSections::from_state(state)))
            .clone();
        FullSnapshot {
            snapshot: self.snapshot(state, tick),
            statics,
        }
    }

    /// Terrain changed (tillage); rebuild statics on the next full snapshot
    pub fn invalidate_statics(&mut self) {
        self.statics = None;
    }
}
