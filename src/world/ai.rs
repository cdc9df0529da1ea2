/// Per-agent AI records: goals, actions and memory
///
/// The records live in `WorldState` so snapshots can overlay decision data;
/// the planning logic itself lives in the AI subsystem.
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::types::{EntityId, NodeKind};

// ============================================================================
// GOALS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalKind {
    Eat,
    Drink,
    Rest,
    Socialize,
    Fun,
    GatherFood,
    Gather,
    Work,
    Build,
    Craft,
    Deposit,
    Explore,
    Flee,
}

impl GoalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalKind::Eat => "eat",
            GoalKind::Drink => "drink",
            GoalKind::Rest => "rest",
            GoalKind::Socialize => "socialize",
            GoalKind::Fun => "fun",
            GoalKind::GatherFood => "gather_food",
            GoalKind::Gather => "gather",
            GoalKind::Work => "work",
            GoalKind::Build => "build",
            GoalKind::Craft => "craft",
            GoalKind::Deposit => "deposit",
            GoalKind::Explore => "explore",
            GoalKind::Flee => "flee",
        }
    }
}

/// Resolved object of a goal or action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum GoalTarget {
    None,
    Entity(EntityId),
    Zone(EntityId),
    Node(EntityId),
    Task(EntityId),
    Point(Vec2),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: EntityId,
    pub kind: GoalKind,
    pub priority: i32,
    pub target: GoalTarget,
    pub created_at: f64,
    pub expires_at: Option<f64>,
}

impl Goal {
    pub fn is_expired(&self, now: f64) -> bool {
        self.expires_at.map(|t| now >= t).unwrap_or(false)
    }
}

// ============================================================================
// ACTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    MoveTo,
    GatherFrom,
    DrinkAt,
    RestIn,
    SocializeWith,
    PlayAt,
    Contribute,
    Deposit,
    Explore,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::MoveTo => "move_to",
            ActionKind::GatherFrom => "gather_from",
            ActionKind::DrinkAt => "drink_at",
            ActionKind::RestIn => "rest_in",
            ActionKind::SocializeWith => "socialize_with",
            ActionKind::PlayAt => "play_at",
            ActionKind::Contribute => "contribute",
            ActionKind::Deposit => "deposit",
            ActionKind::Explore => "explore",
        }
    }
}

/// A concrete step toward the current goal, with resolved targets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAction {
    pub kind: ActionKind,
    pub target_entity: Option<EntityId>,
    pub target_zone: Option<EntityId>,
    pub target_position: Option<Vec2>,
    pub started_at: f64,
    /// Remaining on-site work in seconds, for timed actions
    pub work_remaining: f32,
}

impl AgentAction {
    pub fn move_to(position: Vec2, started_at: f64) -> Self {
        Self {
            kind: ActionKind::MoveTo,
            target_entity: None,
            target_zone: None,
            target_position: Some(position),
            started_at,
            work_remaining: 0.0,
        }
    }
}

// ============================================================================
// MEMORY
// ============================================================================

/// A remembered resource location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownResource {
    pub node_id: EntityId,
    pub kind: NodeKind,
    pub position: Vec2,
    pub seen_at: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMemory {
    pub known_resources: HashMap<NodeKind, Vec<KnownResource>>,
    pub last_cleanup: f64,
}

impl AgentMemory {
    pub fn remember(&mut self, node: KnownResource) {
        let entries = self.known_resources.entry(node.kind).or_default();
        if let Some(existing) = entries.iter_mut().find(|e| e.node_id == node.node_id) {
            existing.seen_at = node.seen_at;
            existing.position = node.position;
        } else {
            entries.push(node);
        }
    }

    /// Drop entries older than `max_age` seconds
    pub fn prune(&mut self, now: f64, max_age: f64) -> usize {
        let mut dropped = 0;
        for entries in self.known_resources.values_mut() {
            let before = entries.len();
            entries.retain(|e| now - e.seen_at <= max_age);
            dropped += before - entries.len();
        }
        self.known_resources.retain(|_, v| !v.is_empty());
        self.last_cleanup = now;
        dropped
    }
}

// ============================================================================
// AI STATE
// ============================================================================

/// Per-agent AI record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiState {
    pub current_goal: Option<Goal>,
    pub goal_queue: Vec<Goal>,
    pub current_action: Option<AgentAction>,
    pub memory: AgentMemory,
    pub off_duty: bool,
    pub last_decision_time: f64,
}

impl AiState {
    pub fn clear_goal(&mut self) {
        self.current_goal = None;
        self.current_action = None;
    }
}

// ============================================================================
// LOOKUP CACHES
// ============================================================================

/// Lookup cache entry with a TTL, used by the planner's zone/resource lookups
#[derive(Debug, Clone)]
pub struct CachedLookup<T> {
    pub value: T,
    pub cached_at: f64,
}

impl<T: Clone> CachedLookup<T> {
    pub fn fresh(&self, now: f64, ttl: f64) -> Option<T> {
        if now - self.cached_at <= ttl {
            Some(self.value.clone())
        } else {
            None
        }
    }
}
