/// Id-to-record mirror for O(1) liveness and position lookups
///
/// Rebuilt wholesale in pre-tick; read-only to subsystems during a tick.
use bevy::prelude::*;
use std::collections::HashMap;

use crate::world::types::{EntityId, EntityKind, StatKind};
use crate::world::WorldState;

#[derive(Debug, Clone)]
pub struct EntityMeta {
    pub kind: EntityKind,
    pub position: Vec2,
    pub is_dead: bool,
}

#[derive(Debug, Default)]
pub struct EntityIndex {
    entries: HashMap<EntityId, EntityMeta>,
    agent_ids: Vec<EntityId>,
    rebuilds: u64,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reseed the mirror from the authoritative state
    pub fn rebuild(&mut self, state: &WorldState) {
        self.entries.clear();
        self.agent_ids.clear();

        for record in state.entities.values() {
            self.entries.insert(
                record.id.clone(),
                EntityMeta {
                    kind: record.kind,
                    position: record.position,
                    is_dead: record.is_dead,
                },
            );
        }
        for agent in state.agents.values() {
            if agent.is_alive() {
                self.agent_ids.push(agent.id.clone());
            }
        }
        self.rebuilds += 1;
    }

    /// Ensure every live agent has an entity mirror with matching position
    /// and health. Agents can appear in `state.agents` before their entity
    /// record exists (loader edge cases, direct state surgery in tests).
    pub fn sync_agents_to_entities(state: &mut WorldState) -> usize {
        let missing: Vec<EntityId> = state
            .agents
            .values()
            .filter(|a| a.is_alive() && !state.entities.contains_key(&a.id))
            .map(|a| a.id.clone())
            .collect();

        for id in &missing {
            let position = state.agents[id].position;
            let mut record =
                crate::world::types::EntityRecord::new(id.clone(), EntityKind::Agent, position);
            record.set_stat(StatKind::Health, 100.0);
            record.set_stat(StatKind::Stamina, 100.0);
            state.entities.insert(id.clone(), record);
        }

        // Position drift repair for existing mirrors
        let positions: Vec<(EntityId, Vec2)> = state
            .agents
            .values()
            .filter(|a| a.is_alive())
            .map(|a| (a.id.clone(), a.position))
            .collect();
        for (id, position) in positions {
            if let Some(record) = state.entities.get_mut(&id) {
                record.position = position;
            }
        }

        missing.len()
    }

    pub fn get(&self, id: &EntityId) -> Option<&EntityMeta> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn is_live(&self, id: &EntityId) -> bool {
        self.entries.get(id).map(|m| !m.is_dead).unwrap_or(false)
    }

    pub fn position_of(&self, id: &EntityId) -> Option<Vec2> {
        self.entries.get(id).map(|m| m.position)
    }

    /// Live agent ids in stable order, used for round-robin batching
    pub fn agent_ids(&self) -> &[EntityId] {
        &self.agent_ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::types::{Agent, AgentProfile, LifeStage, Role, Sex, Traits};

    #[test]
    fn test_rebuild_mirrors_entities() {
        let mut state = WorldState::new(1);
        let id = state.spawn_agent(AgentProfile::default(), 0.0);
        state.spawn_animal("deer", Vec2::new(5.0, 5.0));

        let mut index = EntityIndex::new();
        index.rebuild(&state);

        assert_eq!(index.len(), 2);
        assert!(index.is_live(&id));
        assert_eq!(index.agent_ids().len(), 1);
    }

    #[test]
    fn test_dead_agents_not_in_agent_list() {
        let mut state = WorldState::new(1);
        let id = state.spawn_agent(AgentProfile::default(), 0.0);
        state.kill_agent(&id);

        let mut index = EntityIndex::new();
        index.rebuild(&state);
        assert!(index.agent_ids().is_empty());
        assert!(!index.is_live(&id));
        assert!(index.contains(&id));
    }

    #[test]
    fn test_sync_creates_missing_mirrors() {
        let mut state = WorldState::new(1);
        // Insert an agent record directly, bypassing spawn_agent
        let id = EntityId::from("agent_raw");
        state.agents.insert(
            id.clone(),
            Agent {
                id: id.clone(),
                name: "Raw".to_string(),
                sex: Sex::Male,
                age_years: 20.0,
                life_stage: LifeStage::Adult,
                generation: 0,
                is_dead: false,
                father: None,
                mother: None,
                traits: Traits::default(),
                position: Vec2::new(3.0, 4.0),
                immortal: false,
                social_status: "commoner".to_string(),
                role: Role::Idle,
                equipped_weapon: None,
            },
        );

        let created = EntityIndex::sync_agents_to_entities(&mut state);
        assert_eq!(created, 1);
        assert_eq!(state.entities[&id].position, Vec2::new(3.0, 4.0));
    }

    #[test]
    fn test_sync_repairs_position_drift() {
        let mut state = WorldState::new(1);
        let id = state.spawn_agent(AgentProfile::default(), 0.0);
        state.agents.get_mut(&id).unwrap().position = Vec2::new(9.0, 9.0);

        EntityIndex::sync_agents_to_entities(&mut state);
        assert_eq!(state.entities[&id].position, Vec2::new(9.0, 9.0));
    }
}
