/// Core domain types shared by every subsystem
///
/// Identifiers are opaque strings, stable for the lifetime of the thing they
/// name. All other cross-references between records are weak lookups by id;
/// the authoritative owner of each record is `WorldState`.
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Opaque string identifier for agents, entities, zones, tasks and nodes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Sequential id generator with a per-kind prefix ("agent_12", "zone_3", ...)
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IdGenerator {
    counters: HashMap<String, u64>,
}

impl IdGenerator {
    pub fn next(&mut self, prefix: &str) -> EntityId {
        let counter = self.counters.entry(prefix.to_string()).or_insert(0);
        *counter += 1;
        EntityId::new(format!("{}_{}", prefix, counter))
    }
}

// ============================================================================
// RESOURCES
// ============================================================================

/// Material and consumable kinds tracked by inventories and stockpiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Wood,
    Stone,
    Food,
    Water,
    RareMaterials,
    Metal,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Wood,
        ResourceKind::Stone,
        ResourceKind::Food,
        ResourceKind::Water,
        ResourceKind::RareMaterials,
        ResourceKind::Metal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Wood => "wood",
            ResourceKind::Stone => "stone",
            ResourceKind::Food => "food",
            ResourceKind::Water => "water",
            ResourceKind::RareMaterials => "rare_materials",
            ResourceKind::Metal => "metal",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "wood" => Some(ResourceKind::Wood),
            "stone" => Some(ResourceKind::Stone),
            "food" => Some(ResourceKind::Food),
            "water" => Some(ResourceKind::Water),
            "rare_materials" => Some(ResourceKind::RareMaterials),
            "metal" => Some(ResourceKind::Metal),
            _ => None,
        }
    }
}

/// A (wood, stone) construction cost, also the unit of reservation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialCost {
    pub wood: u32,
    pub stone: u32,
}

impl MaterialCost {
    pub fn new(wood: u32, stone: u32) -> Self {
        Self { wood, stone }
    }

    pub fn is_zero(&self) -> bool {
        self.wood == 0 && self.stone == 0
    }
}

// ============================================================================
// AGENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifeStage {
    Child,
    Adult,
    Elder,
}

impl LifeStage {
    pub fn for_age(age_years: f32) -> Self {
        if age_years < 16.0 {
            LifeStage::Child
        } else if age_years < 60.0 {
            LifeStage::Adult
        } else {
            LifeStage::Elder
        }
    }
}

/// Personality traits, each in [0, 1]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Traits {
    pub cooperation: f32,
    pub aggression: f32,
    pub diligence: f32,
    pub curiosity: f32,
    pub neuroticism: f32,
}

impl Default for Traits {
    fn default() -> Self {
        Self {
            cooperation: 0.5,
            aggression: 0.3,
            diligence: 0.5,
            curiosity: 0.5,
            neuroticism: 0.3,
        }
    }
}

impl Traits {
    pub fn clamped(mut self) -> Self {
        self.cooperation = self.cooperation.clamp(0.0, 1.0);
        self.aggression = self.aggression.clamp(0.0, 1.0);
        self.diligence = self.diligence.clamp(0.0, 1.0);
        self.curiosity = self.curiosity.clamp(0.0, 1.0);
        self.neuroticism = self.neuroticism.clamp(0.0, 1.0);
        self
    }
}

/// Work roles used by production assignment and governance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Idle,
    Forager,
    Farmer,
    Builder,
    Crafter,
    Guard,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Idle => "idle",
            Role::Forager => "forager",
            Role::Farmer => "farmer",
            Role::Builder => "builder",
            Role::Crafter => "crafter",
            Role::Guard => "guard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Role::Idle),
            "forager" => Some(Role::Forager),
            "farmer" => Some(Role::Farmer),
            "builder" => Some(Role::Builder),
            "crafter" => Some(Role::Crafter),
            "guard" => Some(Role::Guard),
            _ => None,
        }
    }
}

/// A living simulated person
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: EntityId,
    pub name: String,
    pub sex: Sex,
    pub age_years: f32,
    pub life_stage: LifeStage,
    pub generation: u32,
    pub is_dead: bool,
    pub father: Option<EntityId>,
    pub mother: Option<EntityId>,
    pub traits: Traits,
    pub position: Vec2,
    pub immortal: bool,
    pub social_status: String,
    pub role: Role,
    pub equipped_weapon: Option<String>,
}

impl Agent {
    pub fn is_alive(&self) -> bool {
        !self.is_dead
    }
}

/// Profile used when spawning a new agent from a command or birth
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: Option<String>,
    pub sex: Option<Sex>,
    pub age_years: Option<f32>,
    pub generation: Option<u32>,
    pub father: Option<EntityId>,
    pub mother: Option<EntityId>,
    pub traits: Option<Traits>,
    pub position: Option<Vec2>,
    pub immortal: bool,
    pub role: Option<Role>,
}

// ============================================================================
// ENTITIES
// ============================================================================

/// Classification of a generalized simulation object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Agent,
    Animal,
    Object,
}

/// Numeric stats carried by every entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    Health,
    Stamina,
    Morale,
    Stress,
    Wounds,
    Money,
    Amount,
}

/// Generalized simulation object: agents, animals and props share this record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub kind: EntityKind,
    pub position: Vec2,
    pub stats: HashMap<StatKind, f32>,
    pub tags: Vec<String>,
    pub is_dead: bool,
}

impl EntityRecord {
    pub fn new(id: EntityId, kind: EntityKind, position: Vec2) -> Self {
        Self {
            id,
            kind,
            position,
            stats: HashMap::new(),
            tags: Vec::new(),
            is_dead: false,
        }
    }

    pub fn stat(&self, kind: StatKind) -> f32 {
        self.stats.get(&kind).copied().unwrap_or(0.0)
    }

    pub fn set_stat(&mut self, kind: StatKind, value: f32) {
        self.stats.insert(kind, value);
    }

    /// Add a delta clamped to [0, 100]; returns the new value
    pub fn change_stat(&mut self, kind: StatKind, delta: f32) -> f32 {
        let next = (self.stat(kind) + delta).clamp(0.0, 100.0);
        self.stats.insert(kind, next);
        next
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

// ============================================================================
// NEEDS
// ============================================================================

/// Per-agent needs, each in [0, 100] where high means satisfied
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Needs {
    pub hunger: f32,
    pub thirst: f32,
    pub energy: f32,
    pub social: f32,
    pub fun: f32,
}

impl Default for Needs {
    fn default() -> Self {
        Self {
            hunger: 100.0,
            thirst: 100.0,
            energy: 100.0,
            social: 100.0,
            fun: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeedKind {
    Hunger,
    Thirst,
    Energy,
    Social,
    Fun,
}

impl NeedKind {
    pub const ALL: [NeedKind; 5] = [
        NeedKind::Hunger,
        NeedKind::Thirst,
        NeedKind::Energy,
        NeedKind::Social,
        NeedKind::Fun,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NeedKind::Hunger => "hunger",
            NeedKind::Thirst => "thirst",
            NeedKind::Energy => "energy",
            NeedKind::Social => "social",
            NeedKind::Fun => "fun",
        }
    }
}

impl Needs {
    pub fn get(&self, kind: NeedKind) -> f32 {
        match kind {
            NeedKind::Hunger => self.hunger,
            NeedKind::Thirst => self.thirst,
            NeedKind::Energy => self.energy,
            NeedKind::Social => self.social,
            NeedKind::Fun => self.fun,
        }
    }

    pub fn set(&mut self, kind: NeedKind, value: f32) {
        let value = value.clamp(0.0, 100.0);
        match kind {
            NeedKind::Hunger => self.hunger = value,
            NeedKind::Thirst => self.thirst = value,
            NeedKind::Energy => self.energy = value,
            NeedKind::Social => self.social = value,
            NeedKind::Fun => self.fun = value,
        }
    }

    pub fn change(&mut self, kind: NeedKind, delta: f32) {
        self.set(kind, self.get(kind) + delta);
    }
}

// ============================================================================
// ZONES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Rest,
    Work,
    Food,
    Water,
    Social,
    Storage,
    Kitchen,
    Shelter,
    Crafting,
    Bedroom,
}

impl ZoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneKind::Rest => "rest",
            ZoneKind::Work => "work",
            ZoneKind::Food => "food",
            ZoneKind::Water => "water",
            ZoneKind::Social => "social",
            ZoneKind::Storage => "storage",
            ZoneKind::Kitchen => "kitchen",
            ZoneKind::Shelter => "shelter",
            ZoneKind::Crafting => "crafting",
            ZoneKind::Bedroom => "bedroom",
        }
    }
}

/// Axis-aligned rectangle in world units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneBounds {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl ZoneBounds {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.w
            && point.y >= self.y
            && point.y <= self.y + self.h
    }

    pub fn intersects(&self, other: &ZoneBounds) -> bool {
        self.x < other.x + other.w
            && other.x < self.x + self.w
            && self.y < other.y + other.h
            && other.y < self.y + self.h
    }
}

/// Typed zone property bag
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneProps {
    pub capacity: Option<u32>,
    pub resource_kind: Option<ResourceKind>,
    pub base_yield: Option<u32>,
}

/// Building-related zone metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneMeta {
    pub label: Option<String>,
    pub under_construction: bool,
    pub crafting_station: bool,
    pub durability: Option<f32>,
    pub max_durability: Option<f32>,
    pub parent_zone: Option<EntityId>,
}

/// Rectangular region with a semantic type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: EntityId,
    pub kind: ZoneKind,
    pub bounds: ZoneBounds,
    pub props: ZoneProps,
    pub meta: ZoneMeta,
}

impl Zone {
    pub fn new(id: EntityId, kind: ZoneKind, bounds: ZoneBounds) -> Self {
        Self {
            id,
            kind,
            bounds,
            props: ZoneProps::default(),
            meta: ZoneMeta::default(),
        }
    }
}

// ============================================================================
// TASKS
// ============================================================================

/// Cooperative work item advanced by agent contributions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: EntityId,
    pub kind: String,
    pub required_work: f32,
    pub contributions: HashMap<EntityId, f32>,
    pub cost: MaterialCost,
    pub zone_id: Option<EntityId>,
    pub bounds: Option<ZoneBounds>,
    pub min_workers: u32,
    pub completed: bool,
    pub cancelled: bool,
    pub created_at: f64,
    pub label: Option<String>,
}

impl Task {
    pub fn total_contribution(&self) -> f32 {
        self.contributions.values().sum()
    }

    pub fn is_open(&self) -> bool {
        !self.completed && !self.cancelled
    }
}

/// Links a zone under construction to its reservation and task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstructionJob {
    pub zone_id: EntityId,
    pub task_id: EntityId,
    pub label: String,
    pub completes_at: f64,
}

/// Durability bookkeeping per constructed building
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingState {
    pub zone_id: EntityId,
    pub durability: f32,
    pub max_durability: f32,
    pub last_maintenance: f64,
    pub last_usage: f64,
    pub usage_count: u64,
    pub abandoned: bool,
    pub deterioration_rate: f32,
    pub upgraded: bool,
}

/// Condition bucket derived from durability thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingCondition {
    Healthy,
    Worn,
    Critical,
    Ruined,
    Destroyed,
}

impl BuildingCondition {
    pub fn for_durability(durability: f32) -> Self {
        if durability >= 75.0 {
            BuildingCondition::Healthy
        } else if durability >= 40.0 {
            BuildingCondition::Worn
        } else if durability >= 15.0 {
            BuildingCondition::Critical
        } else if durability > 0.0 {
            BuildingCondition::Ruined
        } else {
            BuildingCondition::Destroyed
        }
    }
}

// ============================================================================
// WORLD RESOURCES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    BerryBush,
    Tree,
    Rock,
    WaterHole,
    OreVein,
}

impl NodeKind {
    pub fn yields(&self) -> ResourceKind {
        match self {
            NodeKind::BerryBush => ResourceKind::Food,
            NodeKind::Tree => ResourceKind::Wood,
            NodeKind::Rock => ResourceKind::Stone,
            NodeKind::WaterHole => ResourceKind::Water,
            NodeKind::OreVein => ResourceKind::Metal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::BerryBush => "berry_bush",
            NodeKind::Tree => "tree",
            NodeKind::Rock => "rock",
            NodeKind::WaterHole => "water_hole",
            NodeKind::OreVein => "ore_vein",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "berry_bush" => Some(NodeKind::BerryBush),
            "tree" => Some(NodeKind::Tree),
            "rock" => Some(NodeKind::Rock),
            "water_hole" => Some(NodeKind::WaterHole),
            "ore_vein" => Some(NodeKind::OreVein),
            _ => None,
        }
    }
}

/// Harvestable resource node placed on the map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldResourceNode {
    pub id: EntityId,
    pub kind: NodeKind,
    pub position: Vec2,
    pub amount: u32,
    pub max_amount: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_roundtrip() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ResourceKind::from_str("plutonium"), None);
    }

    #[test]
    fn test_life_stage_for_age() {
        assert_eq!(LifeStage::for_age(5.0), LifeStage::Child);
        assert_eq!(LifeStage::for_age(30.0), LifeStage::Adult);
        assert_eq!(LifeStage::for_age(72.0), LifeStage::Elder);
    }

    #[test]
    fn test_zone_bounds_geometry() {
        let a = ZoneBounds::new(0.0, 0.0, 100.0, 50.0);
        assert_eq!(a.center(), Vec2::new(50.0, 25.0));
        assert_eq!(a.area(), 5000.0);
        assert!(a.contains(Vec2::new(10.0, 10.0)));
        assert!(!a.contains(Vec2::new(150.0, 10.0)));

        let b = ZoneBounds::new(90.0, 40.0, 50.0, 50.0);
        assert!(a.intersects(&b));
        let c = ZoneBounds::new(200.0, 200.0, 10.0, 10.0);
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_needs_clamped() {
        let mut needs = Needs::default();
        needs.change(NeedKind::Hunger, -150.0);
        assert_eq!(needs.hunger, 0.0);
        needs.change(NeedKind::Hunger, 40.0);
        assert_eq!(needs.hunger, 40.0);
        needs.change(NeedKind::Hunger, 500.0);
        assert_eq!(needs.hunger, 100.0);
    }

    #[test]
    fn test_entity_stat_change_clamped() {
        let mut record = EntityRecord::new(EntityId::from("e_1"), EntityKind::Animal, Vec2::ZERO);
        record.set_stat(StatKind::Health, 10.0);
        assert_eq!(record.change_stat(StatKind::Health, -25.0), 0.0);
        assert_eq!(record.change_stat(StatKind::Health, 130.0), 100.0);
    }

    #[test]
    fn test_id_generator_sequences() {
        let mut ids = IdGenerator::default();
        assert_eq!(ids.next("agent").as_str(), "agent_1");
        assert_eq!(ids.next("agent").as_str(), "agent_2");
        assert_eq!(ids.next("zone").as_str(), "zone_1");
    }

    #[test]
    fn test_building_condition_buckets() {
        assert_eq!(BuildingCondition::for_durability(100.0), BuildingCondition::Healthy);
        assert_eq!(BuildingCondition::for_durability(50.0), BuildingCondition::Worn);
        assert_eq!(BuildingCondition::for_durability(20.0), BuildingCondition::Critical);
        assert_eq!(BuildingCondition::for_durability(5.0), BuildingCondition::Ruined);
        assert_eq!(BuildingCondition::for_durability(0.0), BuildingCondition::Destroyed);
    }
}
