/// Life cycle: spawning, aging, death bookkeeping and animal upkeep
///
/// Death is two-phase. Entities are first marked dead (visible to every
/// system in the same tick), then their owned records are scrubbed after a
/// grace period so nothing mid-tick dereferences a vanished id.
use bevy::prelude::*;
use serde_json::json;
use std::collections::HashMap;

use crate::errors::SystemResult;
use crate::events::EventName;
use crate::world::types::{AgentProfile, EntityId, EntityKind, LifeStage, StatKind};

use super::{movement, SimContext, Subsystem};

/// Seconds a dead agent's records linger before removal
const CORPSE_GRACE_SECS: f64 = 30.0;
/// Game days per real year of aging; one day ages an agent one year
const YEARS_PER_DAY: f32 = 1.0;
const ELDER_DEATH_AGE: f32 = 80.0;

/// Spawn an agent from a profile and announce the birth
pub fn spawn_agent(ctx: &mut SimContext<'_>, profile: AgentProfile) -> EntityId {
    let now = ctx.now();
    let id = ctx.state.spawn_agent(profile, now);
    let agent = &ctx.state.agents[&id];
    ctx.bus.emit(
        EventName::AgentBorn,
        json!({
            "agentId": &id,
            "name": &agent.name,
            "generation": agent.generation,
        }),
    );
    id
}

/// Kill an agent by command or cause; immortal agents shrug it off
pub fn kill_agent(ctx: &mut SimContext<'_>, agent_id: &EntityId) -> bool {
    match ctx.state.agents.get(agent_id) {
        Some(agent) if agent.immortal => {
            debug!("KILL_AGENT ignored for immortal {}", agent_id);
            return false;
        }
        None => {
            debug!("KILL_AGENT for unknown agent {}", agent_id);
            return false;
        }
        _ => {}
    }
    if ctx.state.kill_agent(agent_id) {
        ctx.bus.emit(
            EventName::AgentDied,
            json!({ "agentId": agent_id, "cause": "command" }),
        );
        true
    } else {
        false
    }
}

pub fn cull_animal(ctx: &mut SimContext<'_>, entity_id: &EntityId) {
    let Some(record) = ctx.state.entities.get_mut(entity_id) else {
        debug!("CULL for unknown entity {}", entity_id);
        return;
    };
    if record.kind != EntityKind::Animal || record.is_dead {
        return;
    }
    record.is_dead = true;
    record.set_stat(StatKind::Health, 0.0);
    ctx.state.movement.remove(entity_id);
    ctx.state.mark_dirty(crate::world::Section::Animals);
    ctx.state.mark_dirty(crate::world::Section::Entities);
}

#[derive(Debug, Default)]
pub struct LifeCycleSystem {
    /// Dead agents awaiting record removal
    pending_removal: HashMap<EntityId, f64>,
}

impl LifeCycleSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn detect_health_deaths(&mut self, ctx: &mut SimContext<'_>) {
        let dead: Vec<EntityId> = ctx
            .state
            .entities
            .values()
            .filter(|e| !e.is_dead && e.stats.contains_key(&StatKind::Health))
            .filter(|e| e.stat(StatKind::Health) <= 0.0)
            .map(|e| e.id.clone())
            .collect();

        for id in dead {
            if ctx.state.agents.contains_key(&id) {
                if ctx.state.agents[&id].immortal {
                    // Immortals never drop below a sliver of health
                    if let Some(record) = ctx.state.entities.get_mut(&id) {
                        record.set_stat(StatKind::Health, 1.0);
                    }
                    continue;
                }
                ctx.state.kill_agent(&id);
                ctx.bus.emit(
                    EventName::AgentDied,
                    json!({ "agentId": id, "cause": "health" }),
                );
            } else if let Some(record) = ctx.state.entities.get_mut(&id) {
                record.is_dead = true;
            }
            ctx.spatial.invalidate();
        }
    }

    fn age_agents(&mut self, ctx: &mut SimContext<'_>, dt: f32) {
        let day_length = ctx.state.day_length as f32;
        if day_length <= 0.0 {
            return;
        }
        let years = dt / day_length * YEARS_PER_DAY;
        let mut of_old_age: Vec<EntityId> = Vec::new();

        for agent in ctx.state.agents.values_mut() {
            if agent.is_dead {
                continue;
            }
            agent.age_years += years;
            let stage = LifeStage::for_age(agent.age_years);
            if stage != agent.life_stage {
                agent.life_stage = stage;
            }
            if agent.age_years > ELDER_DEATH_AGE && !agent.immortal {
                of_old_age.push(agent.id.clone());
            }
        }

        for id in of_old_age {
            ctx.state.kill_agent(&id);
            ctx.bus.emit(
                EventName::AgentDied,
                json!({ "agentId": id, "cause": "old_age" }),
            );
            ctx.spatial.invalidate();
        }
    }

    fn sweep_corpses(&mut self, ctx: &mut SimContext<'_>) {
        let now = ctx.now();
        for agent in ctx.state.agents.values() {
            if agent.is_dead && !self.pending_removal.contains_key(&agent.id) {
                self.pending_removal.insert(agent.id.clone(), now);
            }
        }
        let dead_animals: Vec<EntityId> = ctx
            .state
            .entities
            .values()
            .filter(|e| e.is_dead && e.kind == EntityKind::Animal)
            .map(|e| e.id.clone())
            .collect();
        for id in dead_animals {
            self.pending_removal.entry(id).or_insert(now);
        }

        let expired: Vec<EntityId> = self
            .pending_removal
            .iter()
            .filter(|(_, &marked_at)| now - marked_at >= CORPSE_GRACE_SECS)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.pending_removal.remove(&id);
            if ctx.state.agents.contains_key(&id) {
                ctx.state.remove_agent(&id);
            } else {
                ctx.state.entities.remove(&id);
            }
            ctx.spatial.invalidate();
        }
    }

    /// Idle animals wander to a random nearby point
    fn wander_animals(&mut self, ctx: &mut SimContext<'_>) {
        use rand::Rng;
        let wanderers: Vec<(EntityId, Vec2)> = ctx
            .state
            .animals()
            .filter(|a| !a.is_dead && !ctx.state.movement.contains_key(&a.id))
            .map(|a| (a.id.clone(), a.position))
            .collect();

        for (id, position) in wanderers {
            if ctx.rng.gen_bool(0.5) {
                continue;
            }
            let offset = Vec2::new(
                ctx.rng.gen_range(-40.0..40.0),
                ctx.rng.gen_range(-40.0..40.0),
            );
            movement::order_move(ctx.state, &id, position + offset);
        }
    }
}

impl Subsystem for LifeCycleSystem {
    fn update(&mut self, ctx: &mut SimContext<'_>, dt: f32) -> SystemResult {
        self.detect_health_deaths(ctx);
        self.age_agents(ctx, dt);
        self.sweep_corpses(ctx);
        self.wander_animals(ctx);
        Ok(())
    }
}
