/// Social relationship storage: affinity edges, bonds, truces, marriage
/// groups and reputation
///
/// Edges are symmetric by construction; every write goes through `set_edge`
/// which updates both directions and clamps to [-1, 1].
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use super::types::EntityId;

pub const AFFINITY_MIN: f32 = -1.0;
pub const AFFINITY_MAX: f32 = 1.0;

/// Permanent bond tags; bonded edges decay 20x slower
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BondKind {
    Family,
    Marriage,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SocialEdge {
    pub affinity: f32,
    pub bond: Option<BondKind>,
}

impl Default for SocialEdge {
    fn default() -> Self {
        Self {
            affinity: 0.0,
            bond: None,
        }
    }
}

/// Time-boxed hostility override between two agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Truce {
    pub a: EntityId,
    pub b: EntityId,
    pub expires_at: f64,
}

/// Poly-sized marriage group, at most `MAX_MARRIAGE_MEMBERS` members
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarriageGroup {
    pub id: EntityId,
    pub members: Vec<EntityId>,
    pub cohesion: f32,
    pub founded_at: f64,
    pub children: Vec<EntityId>,
}

pub const MAX_MARRIAGE_MEMBERS: usize = 8;

/// Derived friendly cluster recomputed after edge deltas
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialGroup {
    pub members: Vec<EntityId>,
    pub leader: Option<EntityId>,
    pub cohesion: f32,
    pub morale: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationEntry {
    pub delta: f32,
    pub reason: String,
    pub at: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reputation {
    pub value: f32,
    pub history: VecDeque<ReputationEntry>,
}

impl Default for Reputation {
    fn default() -> Self {
        Self {
            value: 0.5,
            history: VecDeque::new(),
        }
    }
}

pub const REPUTATION_HISTORY_LIMIT: usize = 50;

// ============================================================================
// STORE
// ============================================================================

/// Sparse adjacency store plus the bond and truce overlays
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SocialStore {
    edges: HashMap<EntityId, HashMap<EntityId, SocialEdge>>,
    pub truces: Vec<Truce>,
    pub marriages: Vec<MarriageGroup>,
    /// Open marriage proposals, (from, to)
    pub proposals: Vec<(EntityId, EntityId)>,
    pub groups: Vec<SocialGroup>,
    pub reputation: HashMap<EntityId, Reputation>,
    /// Set when any edge moved enough to matter; consumed by group derivation
    pub edges_modified: bool,
}

impl SocialStore {
    pub fn affinity(&self, a: &EntityId, b: &EntityId) -> f32 {
        self.edges
            .get(a)
            .and_then(|m| m.get(b))
            .map(|e| e.affinity)
            .unwrap_or(0.0)
    }

    pub fn edge(&self, a: &EntityId, b: &EntityId) -> Option<SocialEdge> {
        self.edges.get(a).and_then(|m| m.get(b)).copied()
    }

    /// Set both directions of an edge to `affinity`, clamped.
    /// Returns the clamped value actually stored.
    pub fn set_edge(&mut self, a: &EntityId, b: &EntityId, affinity: f32) -> f32 {
        let clamped = affinity.clamp(AFFINITY_MIN, AFFINITY_MAX);
        let bond = self.edge(a, b).and_then(|e| e.bond);
        let edge = SocialEdge {
            affinity: clamped,
            bond,
        };
        self.edges.entry(a.clone()).or_default().insert(b.clone(), edge);
        self.edges.entry(b.clone()).or_default().insert(a.clone(), edge);
        clamped
    }

    /// Add a delta to the symmetric edge. Returns (old, new) affinity.
    pub fn add_edge(&mut self, a: &EntityId, b: &EntityId, delta: f32) -> (f32, f32) {
        let old = self.affinity(a, b);
        let new = self.set_edge(a, b, old + delta);
        (old, new)
    }

    pub fn set_bond(&mut self, a: &EntityId, b: &EntityId, bond: Option<BondKind>) {
        let affinity = self.affinity(a, b);
        let edge = SocialEdge { affinity, bond };
        self.edges.entry(a.clone()).or_default().insert(b.clone(), edge);
        self.edges.entry(b.clone()).or_default().insert(a.clone(), edge);
    }

    pub fn neighbors(&self, id: &EntityId) -> impl Iterator<Item = (&EntityId, &SocialEdge)> {
        self.edges.get(id).into_iter().flat_map(|m| m.iter())
    }

    pub fn all_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.edges.keys()
    }

    /// Visit every undirected edge exactly once
    pub fn for_each_pair(&self, mut f: impl FnMut(&EntityId, &EntityId, &SocialEdge)) {
        for (a, neighbors) in &self.edges {
            for (b, edge) in neighbors {
                if a < b {
                    f(a, b, edge);
                }
            }
        }
    }

    /// Apply `f` to every stored directed edge value
    pub fn map_edges(&mut self, mut f: impl FnMut(&SocialEdge) -> f32) {
        for neighbors in self.edges.values_mut() {
            for edge in neighbors.values_mut() {
                edge.affinity = f(edge).clamp(AFFINITY_MIN, AFFINITY_MAX);
            }
        }
    }

    /// Drop near-zero unbonded edges so the adjacency stays sparse
    pub fn sweep_dead_edges(&mut self, epsilon: f32) {
        for neighbors in self.edges.values_mut() {
            for edge in neighbors.values_mut() {
                if edge.bond.is_none() && edge.affinity.abs() < epsilon {
                    edge.affinity = 0.0;
                }
            }
        }
    }

    pub fn remove_agent(&mut self, id: &EntityId) {
        self.edges.remove(id);
        for neighbors in self.edges.values_mut() {
            neighbors.remove(id);
        }
        self.truces.retain(|t| &t.a != id && &t.b != id);
        self.proposals.retain(|(a, b)| a != id && b != id);
        self.reputation.remove(id);
        for group in &mut self.marriages {
            group.members.retain(|m| m != id);
        }
        self.marriages.retain(|g| g.members.len() >= 2);
    }

    // ------------------------------------------------------------------
    // Truces
    // ------------------------------------------------------------------

    pub fn truce_active(&self, a: &EntityId, b: &EntityId, now: f64) -> bool {
        self.truces.iter().any(|t| {
            t.expires_at > now
                && ((&t.a == a && &t.b == b) || (&t.a == b && &t.b == a))
        })
    }

    /// Impose or extend a truce; halves negative affinity between the pair
    pub fn impose_truce(&mut self, a: &EntityId, b: &EntityId, now: f64, duration: f64) {
        let expires_at = now + duration;
        if let Some(existing) = self
            .truces
            .iter_mut()
            .find(|t| (&t.a == a && &t.b == b) || (&t.a == b && &t.b == a))
        {
            existing.expires_at = existing.expires_at.max(expires_at);
        } else {
            self.truces.push(Truce {
                a: a.clone(),
                b: b.clone(),
                expires_at,
            });
        }

        let affinity = self.affinity(a, b);
        if affinity < 0.0 {
            self.set_edge(a, b, affinity / 2.0);
        }
    }

    /// Remove expired truces, returning the expired pairs
    pub fn sweep_truces(&mut self, now: f64) -> Vec<(EntityId, EntityId)> {
        let mut expired = Vec::new();
        self.truces.retain(|t| {
            if t.expires_at <= now {
                expired.push((t.a.clone(), t.b.clone()));
                false
            } else {
                true
            }
        });
        expired
    }

    // ------------------------------------------------------------------
    // Marriage
    // ------------------------------------------------------------------

    pub fn marriage_of(&self, id: &EntityId) -> Option<&MarriageGroup> {
        self.marriages.iter().find(|g| g.members.contains(id))
    }

    pub fn are_married(&self, a: &EntityId, b: &EntityId) -> bool {
        self.marriages
            .iter()
            .any(|g| g.members.contains(a) && g.members.contains(b))
    }

    // ------------------------------------------------------------------
    // Reputation
    // ------------------------------------------------------------------

    pub fn reputation_value(&self, id: &EntityId) -> f32 {
        self.reputation.get(id).map(|r| r.value).unwrap_or(0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> EntityId {
        EntityId::from(s)
    }

    #[test]
    fn test_edges_are_symmetric() {
        let mut store = SocialStore::default();
        store.set_edge(&id("a"), &id("b"), 0.4);
        assert_eq!(store.affinity(&id("a"), &id("b")), 0.4);
        assert_eq!(store.affinity(&id("b"), &id("a")), 0.4);

        store.add_edge(&id("b"), &id("a"), -0.1);
        assert_eq!(store.affinity(&id("a"), &id("b")), store.affinity(&id("b"), &id("a")));
    }

    #[test]
    fn test_edge_clamped() {
        let mut store = SocialStore::default();
        assert_eq!(store.set_edge(&id("a"), &id("b"), 3.0), 1.0);
        assert_eq!(store.set_edge(&id("a"), &id("b"), -3.0), -1.0);
    }

    #[test]
    fn test_bond_survives_affinity_updates() {
        let mut store = SocialStore::default();
        store.set_edge(&id("a"), &id("b"), 0.5);
        store.set_bond(&id("a"), &id("b"), Some(BondKind::Family));
        store.set_edge(&id("a"), &id("b"), 0.7);
        assert_eq!(store.edge(&id("a"), &id("b")).unwrap().bond, Some(BondKind::Family));
        assert_eq!(store.edge(&id("b"), &id("a")).unwrap().bond, Some(BondKind::Family));
    }

    #[test]
    fn test_truce_halves_negative_affinity() {
        let mut store = SocialStore::default();
        store.set_edge(&id("a"), &id("b"), -0.8);
        store.impose_truce(&id("a"), &id("b"), 10.0, 60.0);
        assert!(store.truce_active(&id("a"), &id("b"), 30.0));
        assert!(store.truce_active(&id("b"), &id("a"), 30.0));
        assert_eq!(store.affinity(&id("a"), &id("b")), -0.4);

        let expired = store.sweep_truces(100.0);
        assert_eq!(expired.len(), 1);
        assert!(!store.truce_active(&id("a"), &id("b"), 100.0));
    }

    #[test]
    fn test_remove_agent_scrubs_references() {
        let mut store = SocialStore::default();
        store.set_edge(&id("a"), &id("b"), 0.5);
        store.set_edge(&id("a"), &id("c"), 0.2);
        store.impose_truce(&id("a"), &id("b"), 0.0, 60.0);
        store.marriages.push(MarriageGroup {
            id: id("marriage_1"),
            members: vec![id("a"), id("b")],
            cohesion: 0.8,
            founded_at: 0.0,
            children: Vec::new(),
        });

        store.remove_agent(&id("a"));
        assert_eq!(store.affinity(&id("b"), &id("a")), 0.0);
        assert!(store.truces.is_empty());
        assert!(store.marriages.is_empty());
    }

    #[test]
    fn test_for_each_pair_visits_once() {
        let mut store = SocialStore::default();
        store.set_edge(&id("a"), &id("b"), 0.5);
        store.set_edge(&id("b"), &id("c"), 0.2);

        let mut visits = 0;
        store.for_each_pair(|_, _, _| visits += 1);
        assert_eq!(visits, 2);
    }
}
