/// The single authoritative world record
///
/// Every subsystem reads and mutates the simulation through this struct; all
/// cross-references are id lookups. Mutation helpers mark the snapshot
/// sections they touch so the delta encoder only copies what changed.
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use uuid::Uuid;

use super::ai::AiState;
use super::inventory::{
    Inventory, ReservationLedger, Stockpile, AGENT_INVENTORY_CAPACITY,
};
use super::social::SocialStore;
use super::terrain::TerrainGrid;
use super::types::{
    Agent, AgentProfile, BuildingState, ConstructionJob, EntityId, EntityKind, EntityRecord,
    IdGenerator, LifeStage, MaterialCost, Needs, ResourceKind, Role, Sex, StatKind, Task, Traits,
    WorldResourceNode, Zone, ZoneKind,
};

// ============================================================================
// SNAPSHOT SECTIONS
// ============================================================================

/// Named slices of the observable state; a section listed dirty is deep
/// copied on the next snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Section {
    Agents,
    Entities,
    Animals,
    Inventory,
    Zones,
    WorldResources,
    SocialGraph,
    Market,
    Trade,
    Marriage,
    Quests,
    Conflicts,
    Research,
    Recipes,
    Reputation,
    Norms,
    KnowledgeGraph,
    Tasks,
}

impl Section {
    pub const ALL: [Section; 18] = [
        Section::Agents,
        Section::Entities,
        Section::Animals,
        Section::Inventory,
        Section::Zones,
        Section::WorldResources,
        Section::SocialGraph,
        Section::Market,
        Section::Trade,
        Section::Marriage,
        Section::Quests,
        Section::Conflicts,
        Section::Research,
        Section::Recipes,
        Section::Reputation,
        Section::Norms,
        Section::KnowledgeGraph,
        Section::Tasks,
    ];
}

// ============================================================================
// HOUSEHOLDS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseholdMember {
    pub agent_id: EntityId,
    pub role: String,
    pub joined_at: f64,
}

/// Agents sharing a shelter zone and an inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Household {
    pub id: EntityId,
    pub zone_id: EntityId,
    pub members: Vec<HouseholdMember>,
    pub shared: Inventory,
    pub capacity: u32,
}

impl Household {
    pub fn has_member(&self, agent_id: &EntityId) -> bool {
        self.members.iter().any(|m| &m.agent_id == agent_id)
    }

    pub fn occupancy(&self) -> f32 {
        if self.capacity == 0 {
            return 1.0;
        }
        self.members.len() as f32 / self.capacity as f32
    }
}

// ============================================================================
// COMBAT LOG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum CombatLogEntry {
    Engaged {
        id: Uuid,
        attacker: EntityId,
        target: EntityId,
        position: Vec2,
        at: f64,
    },
    Hit {
        id: Uuid,
        attacker: EntityId,
        target: EntityId,
        weapon: String,
        damage: f32,
        at: f64,
    },
    Kill {
        id: Uuid,
        attacker: EntityId,
        target: EntityId,
        weapon: String,
        at: f64,
    },
    WeaponCrafted {
        id: Uuid,
        agent: EntityId,
        weapon: String,
        at: f64,
    },
    WeaponEquipped {
        id: Uuid,
        agent: EntityId,
        weapon: String,
        at: f64,
    },
}

pub const COMBAT_LOG_LIMIT: usize = 512;

// ============================================================================
// THIN STORES
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketState {
    pub prices: HashMap<ResourceKind, f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub from: EntityId,
    pub to: EntityId,
    pub resource: ResourceKind,
    pub amount: u32,
    pub at: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quest {
    pub id: EntityId,
    pub title: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeInfo {
    pub id: String,
    pub output: String,
    pub wood: u32,
    pub stone: u32,
    pub metal: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormsState {
    /// Zone kinds where violence draws a sanction
    pub protected_zones: Vec<ZoneKind>,
    pub truce_duration: f64,
}

impl Default for NormsState {
    fn default() -> Self {
        Self {
            protected_zones: vec![ZoneKind::Rest, ZoneKind::Social, ZoneKind::Food],
            truce_duration: 120.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeFact {
    pub subject: String,
    pub fact: String,
    pub learned_at: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeState {
    pub facts: Vec<KnowledgeFact>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchState {
    pub points: f32,
    pub unlocked: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Legend {
    pub title: String,
    pub subject: EntityId,
    pub started_at: f64,
    pub active: bool,
}

/// In-flight movement order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveTarget {
    pub destination: Vec2,
    pub speed: f32,
}

// ============================================================================
// WORLD STATE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldState {
    pub seed: u64,
    pub ids: IdGenerator,

    pub agents: BTreeMap<EntityId, Agent>,
    pub entities: BTreeMap<EntityId, EntityRecord>,
    pub needs: HashMap<EntityId, Needs>,
    pub ai: HashMap<EntityId, AiState>,
    pub inventories: HashMap<EntityId, Inventory>,
    pub movement: HashMap<EntityId, MoveTarget>,

    pub zones: BTreeMap<EntityId, Zone>,
    pub stockpiles: BTreeMap<EntityId, Stockpile>,
    pub world_resources: BTreeMap<EntityId, WorldResourceNode>,
    pub terrain: TerrainGrid,

    pub social: SocialStore,
    pub tasks: BTreeMap<EntityId, Task>,
    pub construction_jobs: Vec<ConstructionJob>,
    pub buildings: BTreeMap<EntityId, BuildingState>,
    pub households: BTreeMap<EntityId, Household>,
    pub reservations: ReservationLedger,
    pub global_resources: HashMap<ResourceKind, u32>,

    pub market: MarketState,
    pub trade_log: Vec<TradeRecord>,
    pub quests: Vec<Quest>,
    pub recipes: Vec<RecipeInfo>,
    pub norms: NormsState,
    pub knowledge: KnowledgeState,
    pub research: ResearchState,
    pub combat_log: VecDeque<CombatLogEntry>,
    pub legends: Vec<Legend>,

    /// FAST fires since start, monotonically non-decreasing
    pub tick: u64,
    /// SLOW fires since start
    pub cycles: u64,
    /// Scaled simulation seconds since start
    pub sim_time: f64,
    /// Game-day length in sim seconds
    pub day_length: f64,
    /// Offset applied when a command repositions the game clock
    pub day_offset: f64,
    pub player_id: Option<EntityId>,

    /// Raised by FORCE_EMERGENCE_EVALUATION; consumed by the emergence scan
    #[serde(skip)]
    pub force_emergence_scan: bool,
    /// Chat requests awaiting pickup by the interaction system
    #[serde(skip)]
    pub pending_chats: Vec<(EntityId, EntityId)>,
    #[serde(skip)]
    dirty: HashSet<Section>,
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new(0)
    }
}

impl WorldState {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ids: IdGenerator::default(),
            agents: BTreeMap::new(),
            entities: BTreeMap::new(),
            needs: HashMap::new(),
            ai: HashMap::new(),
            inventories: HashMap::new(),
            movement: HashMap::new(),
            zones: BTreeMap::new(),
            stockpiles: BTreeMap::new(),
            world_resources: BTreeMap::new(),
            terrain: TerrainGrid::default(),
            social: SocialStore::default(),
            tasks: BTreeMap::new(),
            construction_jobs: Vec::new(),
            buildings: BTreeMap::new(),
            households: BTreeMap::new(),
            reservations: ReservationLedger::default(),
            global_resources: HashMap::new(),
            market: MarketState::default(),
            trade_log: Vec::new(),
            quests: Vec::new(),
            recipes: Vec::new(),
            norms: NormsState::default(),
            knowledge: KnowledgeState::default(),
            research: ResearchState::default(),
            combat_log: VecDeque::new(),
            legends: Vec::new(),
            tick: 0,
            cycles: 0,
            sim_time: 0.0,
            day_length: 600.0,
            day_offset: 0.0,
            player_id: None,
            force_emergence_scan: false,
            pending_chats: Vec::new(),
            dirty: HashSet::new(),
        }
    }

    // ------------------------------------------------------------------
    // Dirty tracking
    // ------------------------------------------------------------------

    pub fn mark_dirty(&mut self, section: Section) {
        self.dirty.insert(section);
    }

    pub fn take_dirty(&mut self) -> HashSet<Section> {
        std::mem::take(&mut self.dirty)
    }

    pub fn dirty_sections(&self) -> &HashSet<Section> {
        &self.dirty
    }

    // ------------------------------------------------------------------
    // Time
    // ------------------------------------------------------------------

    /// Hour of the game day in [0, 24)
    pub fn time_of_day(&self) -> f32 {
        if self.day_length <= 0.0 {
            return 12.0;
        }
        let clock = (self.sim_time + self.day_offset).rem_euclid(self.day_length);
        ((clock / self.day_length) * 24.0) as f32
    }

    /// Reposition the game clock so `time_of_day()` reads `hour`
    pub fn set_time_of_day(&mut self, hour: f32) {
        let hour = hour.rem_euclid(24.0) as f64;
        let target = hour / 24.0 * self.day_length;
        self.day_offset = target - self.sim_time.rem_euclid(self.day_length);
    }

    pub fn is_night(&self) -> bool {
        let hour = self.time_of_day();
        hour < 6.0 || hour >= 22.0
    }

    // ------------------------------------------------------------------
    // Agents
    // ------------------------------------------------------------------

    pub fn alive_agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values().filter(|a| a.is_alive())
    }

    pub fn population(&self) -> usize {
        self.alive_agents().count()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Total live entity count, the scheduler's gating metric
    pub fn entity_count(&self) -> usize {
        self.entities.values().filter(|e| !e.is_dead).count()
    }

    /// Create an agent plus its entity mirror, needs, inventory and AI record
    pub fn spawn_agent(&mut self, profile: AgentProfile, now: f64) -> EntityId {
        let id = self.ids.next("agent");
        let age_years = profile.age_years.unwrap_or(20.0);
        let agent = Agent {
            id: id.clone(),
            name: profile
                .name
                .unwrap_or_else(|| format!("Settler {}", id.as_str())),
            sex: profile.sex.unwrap_or(Sex::Female),
            age_years,
            life_stage: LifeStage::for_age(age_years),
            generation: profile.generation.unwrap_or(0),
            is_dead: false,
            father: profile.father.clone(),
            mother: profile.mother.clone(),
            traits: profile.traits.unwrap_or_default().clamped(),
            position: profile.position.unwrap_or(Vec2::ZERO),
            immortal: profile.immortal,
            social_status: "commoner".to_string(),
            role: profile.role.unwrap_or(Role::Idle),
            equipped_weapon: None,
        };

        let mut record = EntityRecord::new(id.clone(), EntityKind::Agent, agent.position);
        record.set_stat(StatKind::Health, 100.0);
        record.set_stat(StatKind::Stamina, 100.0);
        record.set_stat(StatKind::Morale, 100.0);
        record.set_stat(StatKind::Stress, 0.0);
        record.set_stat(StatKind::Wounds, 0.0);

        // Family bonds toward known parents
        for parent in [&agent.father, &agent.mother].into_iter().flatten() {
            if self.agents.contains_key(parent) {
                self.social.add_edge(&id, parent, 0.6);
                self.social
                    .set_bond(&id, parent, Some(super::social::BondKind::Family));
            }
        }

        self.entities.insert(id.clone(), record);
        self.needs.insert(id.clone(), Needs::default());
        self.ai.insert(
            id.clone(),
            AiState {
                last_decision_time: now,
                ..AiState::default()
            },
        );
        self.inventories
            .insert(id.clone(), Inventory::new(AGENT_INVENTORY_CAPACITY));
        self.agents.insert(id.clone(), agent);

        self.mark_dirty(Section::Agents);
        self.mark_dirty(Section::Entities);
        self.mark_dirty(Section::Inventory);
        id
    }

    /// Mark an agent dead; owned records are scrubbed lazily by the life
    /// cycle system after the next index rebuild
    pub fn kill_agent(&mut self, id: &EntityId) -> bool {
        let Some(agent) = self.agents.get_mut(id) else {
            return false;
        };
        if agent.is_dead {
            return false;
        }
        agent.is_dead = true;
        if let Some(record) = self.entities.get_mut(id) {
            record.is_dead = true;
            record.set_stat(StatKind::Health, 0.0);
        }
        if let Some(ai) = self.ai.get_mut(id) {
            ai.clear_goal();
            ai.off_duty = true;
        }
        self.movement.remove(id);
        self.mark_dirty(Section::Agents);
        self.mark_dirty(Section::Entities);
        true
    }

    /// Remove an agent and every record owned on its behalf
    pub fn remove_agent(&mut self, id: &EntityId) {
        self.agents.remove(id);
        self.entities.remove(id);
        self.needs.remove(id);
        self.ai.remove(id);
        self.inventories.remove(id);
        self.movement.remove(id);
        self.social.remove_agent(id);
        for household in self.households.values_mut() {
            household.members.retain(|m| &m.agent_id != id);
        }
        for task in self.tasks.values_mut() {
            task.contributions.remove(id);
        }
        self.mark_dirty(Section::Agents);
        self.mark_dirty(Section::Entities);
        self.mark_dirty(Section::SocialGraph);
    }

    pub fn set_agent_position(&mut self, id: &EntityId, position: Vec2) {
        if let Some(agent) = self.agents.get_mut(id) {
            agent.position = position;
        }
        if let Some(record) = self.entities.get_mut(id) {
            record.position = position;
        }
        self.mark_dirty(Section::Agents);
        self.mark_dirty(Section::Entities);
    }

    // ------------------------------------------------------------------
    // Animals and objects
    // ------------------------------------------------------------------

    pub fn spawn_animal(&mut self, species: &str, position: Vec2) -> EntityId {
        let id = self.ids.next("animal");
        let mut record = EntityRecord::new(id.clone(), EntityKind::Animal, position);
        record.set_stat(StatKind::Health, 100.0);
        record.set_stat(StatKind::Stamina, 100.0);
        record.tags.push("animal".to_string());
        record.tags.push(format!("species:{}", species));
        self.entities.insert(id.clone(), record);
        self.mark_dirty(Section::Entities);
        self.mark_dirty(Section::Animals);
        id
    }

    pub fn animals(&self) -> impl Iterator<Item = &EntityRecord> {
        self.entities
            .values()
            .filter(|e| e.kind == EntityKind::Animal)
    }

    /// Insert a world resource node plus its entity mirror
    pub fn add_resource_node(&mut self, node: WorldResourceNode) {
        let mut record = EntityRecord::new(node.id.clone(), EntityKind::Object, node.position);
        record.set_stat(StatKind::Amount, node.amount as f32);
        record.tags.push("resource".to_string());
        record.tags.push(format!("node:{}", node.kind.as_str()));
        self.entities.insert(node.id.clone(), record);
        self.world_resources.insert(node.id.clone(), node);
        self.mark_dirty(Section::Entities);
        self.mark_dirty(Section::WorldResources);
    }

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------

    pub fn global_resource(&self, kind: ResourceKind) -> u32 {
        self.global_resources.get(&kind).copied().unwrap_or(0)
    }

    pub fn add_global_resource(&mut self, kind: ResourceKind, amount: u32) {
        *self.global_resources.entry(kind).or_insert(0) += amount;
        self.mark_dirty(Section::WorldResources);
    }

    pub fn take_global_resource(&mut self, kind: ResourceKind, amount: u32) -> u32 {
        let held = self.global_resource(kind);
        let taken = held.min(amount);
        if taken > 0 {
            self.global_resources.insert(kind, held - taken);
            self.mark_dirty(Section::WorldResources);
        }
        taken
    }

    /// Global materials plus everything sitting in stockpiles, before
    /// subtracting reservations
    pub fn raw_material_supply(&self) -> MaterialCost {
        let mut total = MaterialCost::new(
            self.global_resource(ResourceKind::Wood),
            self.global_resource(ResourceKind::Stone),
        );
        for stockpile in self.stockpiles.values() {
            total.wood += stockpile.inventory.amount(ResourceKind::Wood);
            total.stone += stockpile.inventory.amount(ResourceKind::Stone);
        }
        total
    }

    /// Total of one resource across global supply and stockpiles
    pub fn settlement_resource_total(&self, kind: ResourceKind) -> u32 {
        self.global_resource(kind)
            + self
                .stockpiles
                .values()
                .map(|s| s.inventory.amount(kind))
                .sum::<u32>()
    }

    /// Count of world resource nodes plus stocked resource units, reported
    /// in save metadata
    pub fn resource_count(&self) -> u64 {
        let stocked: u64 = self
            .stockpiles
            .values()
            .map(|s| s.inventory.total() as u64)
            .sum();
        let global: u64 = self.global_resources.values().map(|&v| v as u64).sum();
        self.world_resources.len() as u64 + stocked + global
    }

    // ------------------------------------------------------------------
    // Zones
    // ------------------------------------------------------------------

    pub fn zones_of_kind(&self, kind: ZoneKind) -> impl Iterator<Item = &Zone> {
        self.zones.values().filter(move |z| z.kind == kind)
    }

    pub fn zone_at(&self, position: Vec2) -> Option<&Zone> {
        self.zones.values().find(|z| z.bounds.contains(position))
    }

    pub fn first_stockpile_for_zone(&self, zone_id: &EntityId) -> Option<&EntityId> {
        self.stockpiles
            .values()
            .find(|s| &s.zone_id == zone_id)
            .map(|s| &s.id)
    }

    // ------------------------------------------------------------------
    // Combat log
    // ------------------------------------------------------------------

    pub fn push_combat_log(&mut self, entry: CombatLogEntry) {
        self.combat_log.push_back(entry);
        while self.combat_log.len() > COMBAT_LOG_LIMIT {
            self.combat_log.pop_front();
        }
        self.mark_dirty(Section::Conflicts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_agent_creates_owned_records() {
        let mut state = WorldState::new(1);
        let id = state.spawn_agent(AgentProfile::default(), 0.0);

        assert!(state.agents.contains_key(&id));
        assert!(state.entities.contains_key(&id));
        assert!(state.needs.contains_key(&id));
        assert!(state.ai.contains_key(&id));
        assert!(state.inventories.contains_key(&id));
        assert_eq!(state.population(), 1);
        assert_eq!(state.entities[&id].stat(StatKind::Health), 100.0);
    }

    #[test]
    fn test_kill_agent_marks_both_records() {
        let mut state = WorldState::new(1);
        let id = state.spawn_agent(AgentProfile::default(), 0.0);

        assert!(state.kill_agent(&id));
        assert!(!state.kill_agent(&id));
        assert!(state.agents[&id].is_dead);
        assert!(state.entities[&id].is_dead);
        assert_eq!(state.population(), 0);
        assert!(state.ai[&id].current_goal.is_none());
    }

    #[test]
    fn test_remove_agent_scrubs_everything() {
        let mut state = WorldState::new(1);
        let id = state.spawn_agent(AgentProfile::default(), 0.0);
        let other = state.spawn_agent(AgentProfile::default(), 0.0);
        state.social.set_edge(&id, &other, 0.5);

        state.remove_agent(&id);
        assert!(!state.agents.contains_key(&id));
        assert!(!state.entities.contains_key(&id));
        assert_eq!(state.social.affinity(&other, &id), 0.0);
    }

    #[test]
    fn test_family_bond_on_birth() {
        let mut state = WorldState::new(1);
        let mother = state.spawn_agent(AgentProfile::default(), 0.0);
        let child = state.spawn_agent(
            AgentProfile {
                mother: Some(mother.clone()),
                age_years: Some(0.0),
                generation: Some(1),
                ..AgentProfile::default()
            },
            0.0,
        );

        assert_eq!(
            state.social.edge(&child, &mother).unwrap().bond,
            Some(crate::world::social::BondKind::Family)
        );
    }

    #[test]
    fn test_dirty_sections_drain() {
        let mut state = WorldState::new(1);
        state.spawn_agent(AgentProfile::default(), 0.0);

        let dirty = state.take_dirty();
        assert!(dirty.contains(&Section::Agents));
        assert!(state.take_dirty().is_empty());
    }

    #[test]
    fn test_raw_material_supply_sums_stockpiles() {
        let mut state = WorldState::new(1);
        state.add_global_resource(ResourceKind::Wood, 10);
        let zone_id = EntityId::from("zone_1");
        let mut stockpile = Stockpile::new(
            EntityId::from("stockpile_1"),
            zone_id,
            crate::world::inventory::StockpileKind::General,
        );
        stockpile.inventory.add(ResourceKind::Wood, 5);
        stockpile.inventory.add(ResourceKind::Stone, 7);
        state.stockpiles.insert(stockpile.id.clone(), stockpile);

        assert_eq!(state.raw_material_supply(), MaterialCost::new(15, 7));
    }

    #[test]
    fn test_time_of_day_wraps() {
        let mut state = WorldState::new(1);
        state.day_length = 240.0;
        state.sim_time = 60.0;
        assert_eq!(state.time_of_day(), 6.0);
        state.sim_time = 300.0;
        assert_eq!(state.time_of_day(), 6.0);
        assert!(!state.is_night());
        state.sim_time = 10.0;
        assert!(state.is_night());
    }

    #[test]
    fn test_combat_log_bounded() {
        let mut state = WorldState::new(1);
        for _ in 0..(COMBAT_LOG_LIMIT + 10) {
            state.push_combat_log(CombatLogEntry::Engaged {
                id: Uuid::new_v4(),
                attacker: EntityId::from("a"),
                target: EntityId::from("b"),
                position: Vec2::ZERO,
                at: 0.0,
            });
        }
        assert_eq!(state.combat_log.len(), COMBAT_LOG_LIMIT);
    }
}
