/// Movement execution
///
/// Straight-line steering toward ordered targets on the open plane. Orders
/// come from the AI executor and from MOVE_TO commands; arrival inside a
/// zone raises the arrival event consumed by zone-bound behaviors.
use bevy::prelude::*;
use serde_json::json;

use crate::errors::SystemResult;
use crate::events::EventName;
use crate::world::state::MoveTarget;
use crate::world::types::EntityId;
use crate::world::{Section, WorldState};

use super::{SimContext, Subsystem};

pub const AGENT_SPEED: f32 = 24.0;
pub const ANIMAL_SPEED: f32 = 16.0;
const ARRIVAL_EPSILON: f32 = 0.5;

/// Order an entity to a destination, replacing any previous order
pub fn order_move(state: &mut WorldState, id: &EntityId, destination: Vec2) {
    let Some(record) = state.entities.get(id) else {
        debug!("MOVE_TO for unknown entity {}", id);
        return;
    };
    if record.is_dead {
        return;
    }
    let speed = match record.kind {
        crate::world::types::EntityKind::Animal => ANIMAL_SPEED,
        _ => AGENT_SPEED,
    };
    let destination = state.terrain.clamp_to_bounds(destination);
    state.movement.insert(
        id.clone(),
        MoveTarget { destination, speed },
    );
}

pub fn stop_movement(state: &mut WorldState, id: &EntityId) {
    state.movement.remove(id);
}

#[derive(Debug, Default)]
pub struct MovementSystem;

impl MovementSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Subsystem for MovementSystem {
    fn update(&mut self, ctx: &mut SimContext<'_>, dt: f32) -> SystemResult {
        struct Step {
            id: EntityId,
            position: Vec2,
            arrived: bool,
        }

        let mut steps: Vec<Step> = Vec::new();
        let mut stale: Vec<EntityId> = Vec::new();

        for (id, target) in ctx.state.movement.iter() {
            let Some(record) = ctx.state.entities.get(id) else {
                stale.push(id.clone());
                continue;
            };
            if record.is_dead {
                stale.push(id.clone());
                continue;
            }

            let to_target = target.destination - record.position;
            let distance = to_target.length();
            let step = target.speed * dt;

            if distance <= step.max(ARRIVAL_EPSILON) {
                steps.push(Step {
                    id: id.clone(),
                    position: target.destination,
                    arrived: true,
                });
            } else {
                steps.push(Step {
                    id: id.clone(),
                    position: record.position + to_target / distance * step,
                    arrived: false,
                });
            }
        }

        for id in stale {
            ctx.state.movement.remove(&id);
        }

        for step in steps {
            if ctx.state.agents.contains_key(&step.id) {
                ctx.state.set_agent_position(&step.id, step.position);
            } else if let Some(record) = ctx.state.entities.get_mut(&step.id) {
                record.position = step.position;
                ctx.state.mark_dirty(Section::Entities);
            }

            if step.arrived {
                ctx.state.movement.remove(&step.id);
                if let Some(zone) = ctx.state.zone_at(step.position) {
                    let zone_id = zone.id.clone();
                    let zone_kind = zone.kind;
                    ctx.bus.emit(
                        EventName::ArrivedAtZone,
                        json!({
                            "entityId": step.id,
                            "zoneId": zone_id,
                            "zoneKind": zone_kind.as_str(),
                        }),
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::testutil::TestBed;
    use crate::world::types::{AgentProfile, Zone, ZoneBounds, ZoneKind};

    fn agent_at(bed: &mut TestBed, position: Vec2) -> EntityId {
        bed.state.spawn_agent(
            AgentProfile {
                position: Some(position),
                ..AgentProfile::default()
            },
            0.0,
        )
    }

    #[test]
    fn test_moves_toward_destination() {
        let mut bed = TestBed::new();
        let id = agent_at(&mut bed, Vec2::new(0.0, 0.0));
        order_move(&mut bed.state, &id, Vec2::new(100.0, 0.0));

        let mut system = MovementSystem::new();
        bed.run(&mut system, 1.0);

        let position = bed.state.agents[&id].position;
        assert!((position.x - AGENT_SPEED).abs() < 1e-3);
        assert!(bed.state.movement.contains_key(&id));
    }

    #[test]
    fn test_arrival_snaps_and_clears_order() {
        let mut bed = TestBed::new();
        let id = agent_at(&mut bed, Vec2::new(0.0, 0.0));
        order_move(&mut bed.state, &id, Vec2::new(10.0, 0.0));

        let mut system = MovementSystem::new();
        bed.run(&mut system, 1.0);

        assert_eq!(bed.state.agents[&id].position, Vec2::new(10.0, 0.0));
        assert!(!bed.state.movement.contains_key(&id));
    }

    #[test]
    fn test_arrival_in_zone_emits_event() {
        let mut bed = TestBed::new();
        let id = agent_at(&mut bed, Vec2::new(0.0, 0.0));
        let zone_id = bed.state.ids.next("zone");
        bed.state.zones.insert(
            zone_id.clone(),
            Zone::new(
                zone_id.clone(),
                ZoneKind::Rest,
                ZoneBounds::new(5.0, -5.0, 10.0, 10.0),
            ),
        );
        order_move(&mut bed.state, &id, Vec2::new(10.0, 0.0));

        let mut system = MovementSystem::new();
        bed.run(&mut system, 1.0);

        let events = bed.flush_events();
        let arrival = events
            .iter()
            .find(|e| e.name == EventName::ArrivedAtZone)
            .expect("arrival event");
        assert_eq!(arrival.payload["zoneKind"], "rest");
    }

    #[test]
    fn test_dead_entities_lose_orders() {
        let mut bed = TestBed::new();
        let id = agent_at(&mut bed, Vec2::new(0.0, 0.0));
        order_move(&mut bed.state, &id, Vec2::new(100.0, 0.0));
        bed.state.kill_agent(&id);
        // kill_agent already drops the order; re-add to exercise the sweep
        bed.state.movement.insert(
            id.clone(),
            MoveTarget {
                destination: Vec2::new(100.0, 0.0),
                speed: AGENT_SPEED,
            },
        );

        let mut system = MovementSystem::new();
        bed.run(&mut system, 1.0);
        assert!(!bed.state.movement.contains_key(&id));
    }

    #[test]
    fn test_order_clamped_to_world() {
        let mut bed = TestBed::new();
        let id = agent_at(&mut bed, Vec2::new(10.0, 10.0));
        order_move(&mut bed.state, &id, Vec2::new(1e6, 1e6));
        let target = &bed.state.movement[&id];
        assert!(bed.state.terrain.in_bounds(target.destination));
    }
}
