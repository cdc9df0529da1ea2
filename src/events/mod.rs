/// Batched simulation event bus
///
/// Subsystems emit events while a tick is running; the queue is flushed once
/// in post-tick so listeners never observe a mid-tick state. Event names are
/// a closed enum to keep the broad fan-out greppable.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

// ============================================================================
// EVENT CATALOG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    AgentBorn,
    AgentDied,
    AgentGoalChanged,
    AgentAssigned,
    AgentsHomeless,
    AnimalHunted,
    ArrivedAtZone,
    BuildingConstructionStarted,
    BuildingConstructed,
    BuildingDamaged,
    BuildingRepaired,
    CombatEngaged,
    CombatHit,
    CombatKill,
    CommandDropped,
    CrisisPrediction,
    CrisisWarning,
    GovernanceAction,
    GovernanceUpdate,
    HighOccupancy,
    KnowledgeLearned,
    KnowledgeShared,
    NeedCritical,
    NeedSatisfied,
    NoFreeHouses,
    NormSanctionApplied,
    PathfindingFailed,
    ProductionOutputGenerated,
    ProductionWorkerRemoved,
    ReputationUpdated,
    ResearchCompleted,
    ResourceGathered,
    RoleAssigned,
    SocialGroupsUpdate,
    SocialRally,
    SocialRelationChanged,
    TaskCompleted,
    TaskCreated,
    TaskProgress,
    TaskStalled,
    TruceAccepted,
    TruceExpired,
    TruceRejected,
}

/// One emitted event with its untyped payload bag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub name: EventName,
    pub payload: Value,
}

type Listener = Box<dyn FnMut(&SimEvent) + Send>;

// ============================================================================
// BUS
// ============================================================================

/// Queued emitter; batching is on during normal operation
pub struct EventBus {
    batching: bool,
    queue: VecDeque<SimEvent>,
    listeners: HashMap<EventName, Vec<Listener>>,
    wildcard: Vec<Listener>,
    emitted_total: u64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            batching: true,
            queue: VecDeque::new(),
            listeners: HashMap::new(),
            wildcard: Vec::new(),
            emitted_total: 0,
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue when batching, dispatch inline otherwise
    pub fn emit(&mut self, name: EventName, payload: Value) {
        self.emitted_total += 1;
        let event = SimEvent { name, payload };
        if self.batching {
            self.queue.push_back(event);
        } else {
            self.dispatch(&event);
        }
    }

    /// Drain the buffer, delivering each event in enqueue order
    pub fn flush(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(event) = self.queue.pop_front() {
            self.dispatch(&event);
            delivered += 1;
        }
        delivered
    }

    fn dispatch(&mut self, event: &SimEvent) {
        if let Some(listeners) = self.listeners.get_mut(&event.name) {
            for listener in listeners.iter_mut() {
                listener(event);
            }
        }
        for listener in self.wildcard.iter_mut() {
            listener(event);
        }
    }

    /// Disabling batching also flushes whatever is queued
    pub fn set_batching_enabled(&mut self, enabled: bool) {
        self.batching = enabled;
        if !enabled {
            self.flush();
        }
    }

    pub fn is_batching(&self) -> bool {
        self.batching
    }

    pub fn on(&mut self, name: EventName, listener: impl FnMut(&SimEvent) + Send + 'static) {
        self.listeners
            .entry(name)
            .or_default()
            .push(Box::new(listener));
    }

    /// Listener receiving every event, used by the observer bridge
    pub fn on_any(&mut self, listener: impl FnMut(&SimEvent) + Send + 'static) {
        self.wildcard.push(Box::new(listener));
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    pub fn queue_size(&self) -> usize {
        self.queue.len()
    }

    pub fn emitted_total(&self) -> u64 {
        self.emitted_total
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("batching", &self.batching)
            .field("queued", &self.queue.len())
            .field("emitted_total", &self.emitted_total)
            .finish()
    }
}
