/// Combat resolution: engagement scan, damage, cooldowns, kills and
/// weapon crafting
///
/// Decisions run every 750 ms. An attacker engages the nearest eligible
/// target inside its reach (engagement radius extended by weapon range);
/// truces and protected zones suppress hostility. Damage flows into the
/// target's entity stats, with secondary morale, stress, wound and stamina
/// effects.
use bevy::prelude::*;
use lazy_static::lazy_static;
use rand::Rng;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

use crate::errors::SystemResult;
use crate::events::EventName;
use crate::world::state::CombatLogEntry;
use crate::world::types::{EntityId, EntityKind, ResourceKind, StatKind};
use crate::world::Section;

use super::{reputation, SimContext, Subsystem};

// ============================================================================
// WEAPONS
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Weapon {
    pub id: &'static str,
    pub base_damage: f32,
    pub crit_chance: f32,
    pub crit_multiplier: f32,
    pub range: f32,
    /// Seconds between attacks; None falls back to the base cooldown
    pub attack_speed: Option<f64>,
    pub cost_wood: u32,
    pub cost_stone: u32,
    pub cost_metal: u32,
}

pub const FISTS: Weapon = Weapon {
    id: "fists",
    base_damage: 3.0,
    crit_chance: 0.02,
    crit_multiplier: 1.5,
    range: 0.0,
    attack_speed: None,
    cost_wood: 0,
    cost_stone: 0,
    cost_metal: 0,
};

lazy_static! {
    pub static ref WEAPONS: HashMap<&'static str, Weapon> = {
        let mut weapons = HashMap::new();
        weapons.insert(
            "wooden_club",
            Weapon {
                id: "wooden_club",
                base_damage: 6.0,
                crit_chance: 0.05,
                crit_multiplier: 1.5,
                range: 10.0,
                attack_speed: Some(3.5),
                cost_wood: 8,
                cost_stone: 0,
                cost_metal: 0,
            },
        );
        weapons.insert(
            "stone_axe",
            Weapon {
                id: "stone_axe",
                base_damage: 10.0,
                crit_chance: 0.1,
                crit_multiplier: 1.8,
                range: 12.0,
                attack_speed: None,
                cost_wood: 5,
                cost_stone: 6,
                cost_metal: 0,
            },
        );
        weapons.insert(
            "spear",
            Weapon {
                id: "spear",
                base_damage: 12.0,
                crit_chance: 0.12,
                crit_multiplier: 2.0,
                range: 25.0,
                attack_speed: Some(2.5),
                cost_wood: 10,
                cost_stone: 3,
                cost_metal: 0,
            },
        );
        weapons.insert(
            "iron_sword",
            Weapon {
                id: "iron_sword",
                base_damage: 16.0,
                crit_chance: 0.15,
                crit_multiplier: 2.0,
                range: 15.0,
                attack_speed: Some(3.0),
                cost_wood: 2,
                cost_stone: 0,
                cost_metal: 8,
            },
        );
        weapons
    };
}

pub fn weapon_for(agent_weapon: Option<&str>) -> &'static Weapon {
    agent_weapon
        .and_then(|id| WEAPONS.get(id))
        .unwrap_or(&FISTS)
}

/// Craft a weapon from the agent's inventory and auto-equip it on success.
/// Validates the full cost before deducting anything.
pub fn craft_weapon(ctx: &mut SimContext<'_>, agent_id: &EntityId, weapon_id: &str) -> bool {
    let Some(weapon) = WEAPONS.get(weapon_id) else {
        debug!("craft for unknown weapon '{}'", weapon_id);
        return false;
    };
    if !ctx.state.agents.contains_key(agent_id) {
        debug!("craft by unknown agent {}", agent_id);
        return false;
    }
    let Some(inventory) = ctx.state.inventories.get_mut(agent_id) else {
        return false;
    };

    let costs = [
        (ResourceKind::Wood, weapon.cost_wood),
        (ResourceKind::Stone, weapon.cost_stone),
        (ResourceKind::Metal, weapon.cost_metal),
    ];
    if costs.iter().any(|&(kind, amount)| inventory.amount(kind) < amount) {
        debug!("craft of '{}' rejected: missing materials", weapon_id);
        return false;
    }
    for (kind, amount) in costs {
        inventory.remove(kind, amount);
    }

    if let Some(agent) = ctx.state.agents.get_mut(agent_id) {
        agent.equipped_weapon = Some(weapon_id.to_string());
    }
    let now = ctx.now();
    ctx.state.push_combat_log(CombatLogEntry::WeaponCrafted {
        id: Uuid::new_v4(),
        agent: agent_id.clone(),
        weapon: weapon_id.to_string(),
        at: now,
    });
    ctx.state.push_combat_log(CombatLogEntry::WeaponEquipped {
        id: Uuid::new_v4(),
        agent: agent_id.clone(),
        weapon: weapon_id.to_string(),
        at: now,
    });
    ctx.state.mark_dirty(Section::Inventory);
    info!("🗡️ {} crafted and equipped '{}'", agent_id, weapon_id);
    true
}

// ============================================================================
// SYSTEM
// ============================================================================

#[derive(Debug, Default)]
pub struct CombatSystem {
    /// Earliest time each attacker may strike again
    next_ready: HashMap<EntityId, f64>,
    last_decision: f64,
}

struct Candidate {
    id: EntityId,
    position: Vec2,
}

impl CombatSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn eligible_target(
        ctx: &mut SimContext<'_>,
        attacker_id: &EntityId,
        attacker_aggression: f32,
        target_id: &EntityId,
    ) -> bool {
        if target_id == attacker_id {
            return false;
        }
        let Some(meta) = ctx.index.get(target_id) else {
            return false;
        };
        if meta.is_dead {
            return false;
        }
        if meta.kind == EntityKind::Animal {
            return true;
        }
        let Some(target) = ctx.state.agents.get(target_id) else {
            return false;
        };
        if target.immortal || target.is_dead {
            return false;
        }
        let now = ctx.state.sim_time;
        if ctx.state.social.truce_active(attacker_id, target_id, now) {
            return false;
        }
        let affinity = ctx.state.social.affinity(attacker_id, target_id);
        if affinity <= ctx.config.combat.hostility_threshold {
            return true;
        }
        attacker_aggression >= ctx.config.combat.aggression_threshold
            && ctx.rng.gen::<f32>() < attacker_aggression * 0.25
    }

    fn resolve_attack(
        &mut self,
        ctx: &mut SimContext<'_>,
        attacker_id: &EntityId,
        target_id: &EntityId,
        weapon: &Weapon,
    ) {
        let now = ctx.now();
        let Some(target_meta) = ctx.index.get(target_id) else {
            return;
        };
        let target_position = target_meta.position;
        let target_is_animal = target_meta.kind == EntityKind::Animal;

        // Zone norms: violence in a protected zone draws a sanction that
        // imposes a truce instead of a hit
        let protected = ctx
            .state
            .zone_at(target_position)
            .map(|z| ctx.state.norms.protected_zones.contains(&z.kind))
            .unwrap_or(false);
        if protected && !target_is_animal {
            let duration = ctx.state.norms.truce_duration;
            ctx.state
                .social
                .impose_truce(attacker_id, target_id, now, duration);
            reputation::update_reputation(ctx, attacker_id, -0.05, "violence in protected zone");
            ctx.bus.emit(
                EventName::NormSanctionApplied,
                json!({
                    "agentId": attacker_id,
                    "targetId": target_id,
                    "sanction": "truce",
                }),
            );
            return;
        }

        let aggression = ctx
            .state
            .agents
            .get(attacker_id)
            .map(|a| a.traits.aggression)
            .unwrap_or(0.3);

        // Damage roll
        let spread: f32 = ctx.rng.gen_range(0.8..1.2);
        let mut damage = weapon.base_damage * spread * (0.5 + aggression * 0.7);
        if ctx.rng.gen::<f32>() < weapon.crit_chance {
            damage *= weapon.crit_multiplier;
        }
        let damage = damage.round().max(1.0);

        ctx.bus.emit(
            EventName::CombatEngaged,
            json!({ "attackerId": attacker_id, "targetId": target_id }),
        );
        ctx.state.push_combat_log(CombatLogEntry::Engaged {
            id: Uuid::new_v4(),
            attacker: attacker_id.clone(),
            target: target_id.clone(),
            position: target_position,
            at: now,
        });

        let remaining_health = {
            let Some(record) = ctx.state.entities.get_mut(target_id) else {
                return;
            };
            let health = record.change_stat(StatKind::Health, -damage);
            record.change_stat(StatKind::Morale, -0.6 * damage);
            record.change_stat(StatKind::Stress, 0.4 * damage);
            record.change_stat(StatKind::Wounds, 0.5 * damage);
            record.change_stat(StatKind::Stamina, -0.3 * damage);
            health
        };

        ctx.bus.emit(
            EventName::CombatHit,
            json!({
                "attackerId": attacker_id,
                "targetId": target_id,
                "weapon": weapon.id,
                "damage": damage,
            }),
        );
        ctx.state.push_combat_log(CombatLogEntry::Hit {
            id: Uuid::new_v4(),
            attacker: attacker_id.clone(),
            target: target_id.clone(),
            weapon: weapon.id.to_string(),
            damage,
            at: now,
        });
        ctx.state.mark_dirty(Section::Entities);

        if remaining_health <= 0.0 {
            self.handle_kill(ctx, attacker_id, target_id, weapon, target_is_animal);
        }
    }

    fn handle_kill(
        &mut self,
        ctx: &mut SimContext<'_>,
        attacker_id: &EntityId,
        target_id: &EntityId,
        weapon: &Weapon,
        target_is_animal: bool,
    ) {
        let now = ctx.now();
        if target_is_animal {
            if let Some(record) = ctx.state.entities.get_mut(target_id) {
                record.is_dead = true;
            }
            ctx.state.movement.remove(target_id);
        } else {
            ctx.state.kill_agent(target_id);
            // The fallen drop their weapon
            if let Some(agent) = ctx.state.agents.get_mut(target_id) {
                agent.equipped_weapon = None;
            }
            ctx.bus.emit(
                EventName::AgentDied,
                json!({ "agentId": target_id, "cause": "combat" }),
            );
        }
        ctx.spatial.invalidate();

        ctx.state.push_combat_log(CombatLogEntry::Kill {
            id: Uuid::new_v4(),
            attacker: attacker_id.clone(),
            target: target_id.clone(),
            weapon: weapon.id.to_string(),
            at: now,
        });
        ctx.bus.emit(
            EventName::CombatKill,
            json!({
                "attackerId": attacker_id,
                "targetId": target_id,
                "weapon": weapon.id,
            }),
        );
        if target_is_animal {
            ctx.bus.emit(
                EventName::AnimalHunted,
                json!({ "hunterId": attacker_id, "animalId": target_id }),
            );
        }
    }

    fn run_decisions(&mut self, ctx: &mut SimContext<'_>) {
        let now = ctx.now();

        struct Attacker {
            id: EntityId,
            position: Vec2,
            aggression: f32,
            weapon: &'static Weapon,
        }

        let attackers: Vec<Attacker> = ctx
            .state
            .alive_agents()
            .filter(|a| {
                ctx.state
                    .entities
                    .get(&a.id)
                    .map(|e| e.stat(StatKind::Stamina) > 0.0)
                    .unwrap_or(false)
            })
            .map(|a| Attacker {
                id: a.id.clone(),
                position: a.position,
                aggression: a.traits.aggression,
                weapon: weapon_for(a.equipped_weapon.as_deref()),
            })
            .collect();

        let use_batched = attackers.len() > ctx.config.combat.batch_threshold;
        // Batched path shares one candidate sweep across all attackers; the
        // compute service decides internally whether to fan out
        let candidates: Option<Vec<Candidate>> = use_batched.then(|| {
            ctx.state
                .entities
                .values()
                .filter(|e| !e.is_dead)
                .map(|e| Candidate {
                    id: e.id.clone(),
                    position: e.position,
                })
                .collect()
        });

        for attacker in attackers {
            // An earlier attack this pass may have killed this attacker
            let alive = ctx
                .state
                .agents
                .get(&attacker.id)
                .map(|a| a.is_alive())
                .unwrap_or(false);
            if !alive {
                continue;
            }
            let ready = self
                .next_ready
                .get(&attacker.id)
                .map(|&t| now >= t)
                .unwrap_or(true);
            if !ready {
                continue;
            }

            let radius = ctx
                .config
                .combat
                .engagement_radius
                .max(attacker.weapon.range);

            let target = match &candidates {
                Some(candidates) => {
                    let positions: Vec<Vec2> =
                        candidates.iter().map(|c| c.position).collect();
                    let distances = ctx.compute.distances_squared(attacker.position, &positions);
                    let radius_sq = radius * radius;
                    let mut in_reach: Vec<(usize, f32)> = distances
                        .iter()
                        .enumerate()
                        .filter(|(_, &d)| d <= radius_sq)
                        .map(|(i, &d)| (i, d))
                        .collect();
                    in_reach.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
                    in_reach
                        .into_iter()
                        .map(|(i, _)| candidates[i].id.clone())
                        .find(|id| {
                            Self::eligible_target(ctx, &attacker.id, attacker.aggression, id)
                        })
                }
                None => {
                    let hits = ctx.spatial.query_radius(attacker.position, radius, None);
                    let mut sorted: Vec<(EntityId, f32)> = hits
                        .iter()
                        .map(|h| (h.id.clone(), h.distance_sq))
                        .collect();
                    drop(hits);
                    sorted.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
                    sorted
                        .into_iter()
                        .map(|(id, _)| id)
                        .find(|id| {
                            Self::eligible_target(ctx, &attacker.id, attacker.aggression, id)
                        })
                }
            };

            let Some(target_id) = target else {
                continue;
            };

            self.resolve_attack(ctx, &attacker.id, &target_id, attacker.weapon);
            let cooldown = attacker
                .weapon
                .attack_speed
                .unwrap_or(ctx.config.combat.base_cooldown);
            self.next_ready.insert(attacker.id.clone(), now + cooldown);
        }

        // Shed cooldown entries for agents that are gone
        self.next_ready
            .retain(|id, _| ctx.state.agents.contains_key(id));
    }
}

impl Subsystem for CombatSystem {
    fn update(&mut self, ctx: &mut SimContext<'_>, _dt: f32) -> SystemResult {
        let now = ctx.now();
        if now - self.last_decision < ctx.config.combat.cadence_secs {
            return Ok(());
        }
        self.last_decision = now;
        self.run_decisions(ctx);
        Ok(())
    }
}
