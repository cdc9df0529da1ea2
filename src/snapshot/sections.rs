/// Snapshot section structures
///
/// Each section is a self-contained deep copy of one observable slice of
/// the state. Sections carry no references into the live world, so a
/// finished snapshot can cross the thread boundary to the serializer.
use bevy::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::world::ai::{AgentAction, Goal};
use crate::world::inventory::{Inventory, Stockpile};
use crate::world::social::{BondKind, MarriageGroup, SocialGroup, Truce};
use crate::world::state::{
    CombatLogEntry, Household, KnowledgeState, Legend, MarketState, NormsState, Quest, RecipeInfo,
    ResearchState, TradeRecord,
};
use crate::world::terrain::{Biome, ObjectLayer, Road};
use crate::world::types::{
    Agent, EntityId, EntityKind, EntityRecord, Needs, ResourceKind, Task, WorldResourceNode, Zone,
};
use crate::world::{Section, WorldState};

/// One agent as observers see it
#[derive(Debug, Clone, Serialize)]
pub struct AgentView {
    #[serde(flatten)]
    pub agent: Agent,
    pub needs: Option<Needs>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeView {
    pub a: EntityId,
    pub b: EntityId,
    pub affinity: f32,
    pub bond: Option<BondKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SocialGraphView {
    pub edges: Vec<EdgeView>,
    pub groups: Vec<SocialGroup>,
    pub truces: Vec<Truce>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InventoryView {
    pub agents: BTreeMap<EntityId, Inventory>,
    pub stockpiles: Vec<Stockpile>,
    pub households: Vec<Household>,
    pub global: HashMap<ResourceKind, u32>,
}

/// Deep-copied payload of one section
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SectionData {
    Agents(Vec<AgentView>),
    Entities(Vec<EntityRecord>),
    Animals(Vec<EntityRecord>),
    Inventory(InventoryView),
    Zones(Vec<Zone>),
    WorldResources(Vec<WorldResourceNode>),
    SocialGraph(SocialGraphView),
    Market(MarketState),
    Trade(Vec<TradeRecord>),
    Marriage(Vec<MarriageGroup>),
    Quests(Vec<Quest>),
    Conflicts(Vec<CombatLogEntry>),
    Research(ResearchState),
    Recipes(Vec<RecipeInfo>),
    Reputation(BTreeMap<EntityId, f32>),
    Norms(NormsState),
    KnowledgeGraph(KnowledgeState),
    Tasks(Vec<Task>),
}

/// Build the deep copy for one section from the live state
pub fn build_section(state: &WorldState, section: Section) -> SectionData {
    match section {
        Section::Agents => SectionData::Agents(
            state
                .agents
                .values()
                .map(|agent| AgentView {
                    agent: agent.clone(),
                    needs: state.needs.get(&agent.id).copied(),
                })
                .collect(),
        ),
        Section::Entities => {
            SectionData::Entities(state.entities.values().cloned().collect())
        }
        Section::Animals => SectionData::Animals(
            state
                .entities
                .values()
                .filter(|e| e.kind == EntityKind::Animal)
                .cloned()
                .collect(),
        ),
        Section::Inventory => SectionData::Inventory(InventoryView {
            agents: state
                .inventories
                .iter()
                .map(|(id, inventory)| (id.clone(), inventory.clone()))
                .collect(),
            stockpiles: state.stockpiles.values().cloned().collect(),
            households: state.households.values().cloned().collect(),
            global: state.global_resources.clone(),
        }),
        Section::Zones => SectionData::Zones(state.zones.values().cloned().collect()),
        Section::WorldResources => {
            SectionData::WorldResources(state.world_resources.values().cloned().collect())
        }
        Section::SocialGraph => {
            let mut edges = Vec::new();
            state.social.for_each_pair(|a, b, edge| {
                if edge.affinity != 0.0 || edge.bond.is_some() {
                    edges.push(EdgeView {
                        a: a.clone(),
                        b: b.clone(),
                        affinity: edge.affinity,
                        bond: edge.bond,
                    });
                }
            });
            SectionData::SocialGraph(SocialGraphView {
                edges,
                groups: state.social.groups.clone(),
                truces: state.social.truces.clone(),
            })
        }
        Section::Market => SectionData::Market(state.market.clone()),
        Section::Trade => SectionData::Trade(state.trade_log.clone()),
        Section::Marriage => SectionData::Marriage(state.social.marriages.clone()),
        Section::Quests => SectionData::Quests(state.quests.clone()),
        Section::Conflicts => {
            SectionData::Conflicts(state.combat_log.iter().cloned().collect())
        }
        Section::Research => SectionData::Research(state.research.clone()),
        Section::Recipes => SectionData::Recipes(state.recipes.clone()),
        Section::Reputation => SectionData::Reputation(
            state
                .social
                .reputation
                .iter()
                .map(|(id, r)| (id.clone(), r.value))
                .collect(),
        ),
        Section::Norms => SectionData::Norms(state.norms.clone()),
        Section::KnowledgeGraph => SectionData::KnowledgeGraph(state.knowledge.clone()),
        Section::Tasks => SectionData::Tasks(state.tasks.values().cloned().collect()),
    }
}

// ============================================================================
// STATICS AND OVERLAYS
// ============================================================================

/// Static world data carried only by the full snapshot
#[derive(Debug, Clone, Serialize)]
pub struct StaticSections {
    pub terrain_tiles: Vec<Biome>,
    pub terrain_width: usize,
    pub terrain_height: usize,
    pub tile_size: f32,
    pub roads: Vec<Road>,
    pub object_layers: Vec<ObjectLayer>,
}

impl StaticSections {
    pub fn from_state(state: &WorldState) -> Self {
        let (terrain_width, terrain_height) = state.terrain.tile_counts();
        Self {
            terrain_tiles: state.terrain.tiles().to_vec(),
            terrain_width,
            terrain_height,
            tile_size: state.terrain.tile_size,
            roads: state.terrain.roads.clone(),
            object_layers: state.terrain.object_layers.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenealogyNode {
    pub id: EntityId,
    pub name: String,
    pub generation: u32,
    pub father: Option<EntityId>,
    pub mother: Option<EntityId>,
    pub is_dead: bool,
}

/// Per-agent AI decision fields overlaid on snapshots
#[derive(Debug, Clone, Serialize)]
pub struct AiOverlay {
    pub current_goal: Option<Goal>,
    pub goal_queue: Vec<Goal>,
    pub current_action: Option<AgentAction>,
    pub off_duty: bool,
    pub last_decision_time: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overlays {
    pub genealogy: Vec<GenealogyNode>,
    pub legends: Vec<Legend>,
    pub ai: BTreeMap<EntityId, AiOverlay>,
}

impl Overlays {
    pub fn from_state(state: &WorldState) -> Self {
        Self {
            genealogy: state
                .agents
                .values()
                .map(|a| GenealogyNode {
                    id: a.id.clone(),
                    name: a.name.clone(),
                    generation: a.generation,
                    father: a.father.clone(),
                    mother: a.mother.clone(),
                    is_dead: a.is_dead,
                })
                .collect(),
            legends: state.legends.iter().filter(|l| l.active).cloned().collect(),
            ai: state
                .ai
                .iter()
                .map(|(id, ai)| {
                    (
                        id.clone(),
                        AiOverlay {
                            current_goal: ai.current_goal.clone(),
                            goal_queue: ai.goal_queue.clone(),
                            current_action: ai.current_action.clone(),
                            off_duty: ai.off_duty,
                            last_decision_time: ai.last_decision_time,
                        },
                    )
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::types::AgentProfile;

    #[test]
    fn test_sections_build_for_every_key() {
        let mut state = WorldState::new(1);
        state.spawn_agent(AgentProfile::default(), 0.0);
        state.spawn_animal("deer", Vec2::new(5.0, 5.0));

        for section in Section::ALL {
            let data = build_section(&state, section);
            let json = serde_json::to_value(&data).expect("section serializes");
            assert!(!json.is_null());
        }
    }

    #[test]
    fn test_animals_section_filters_kind() {
        let mut state = WorldState::new(1);
        state.spawn_agent(AgentProfile::default(), 0.0);
        state.spawn_animal("deer", Vec2::new(5.0, 5.0));

        match build_section(&state, Section::Animals) {
            SectionData::Animals(animals) => {
                assert_eq!(animals.len(), 1);
                assert_eq!(animals[0].kind, EntityKind::Animal);
            }
            other => panic!("wrong section payload {:?}", other),
        }
    }

    #[test]
    fn test_overlays_carry_ai_fields() {
        let mut state = WorldState::new(1);
        let id = state.spawn_agent(AgentProfile::default(), 0.0);
        state.ai.get_mut(&id).unwrap().off_duty = true;

        let overlays = Overlays::from_state(&state);
        assert!(overlays.ai[&id].off_duty);
        assert_eq!(overlays.genealogy.len(), 1);
    }

    #[test]
    fn test_statics_match_terrain_dimensions() {
        let state = WorldState::new(1);
        let statics = StaticSections::from_state(&state);
        assert_eq!(
            statics.terrain_tiles.len(),
            statics.terrain_width * statics.terrain_height
        );
    }
}
