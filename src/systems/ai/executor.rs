/// Action planning and execution
///
/// A goal resolves into one concrete action with a movement order; once the
/// agent arrives, the action's on-site effect runs (gathering, eating,
/// resting, contributing). Targets are validated at plan time and again on
/// arrival, so dead or vanished targets abandon the goal instead of
/// wedging the agent.
use bevy::prelude::*;

use crate::systems::SimContext;
use crate::world::ai::{ActionKind, AgentAction, Goal, GoalKind, GoalTarget, KnownResource};
use crate::world::types::{EntityId, NeedKind, ResourceKind, StatKind};

use super::super::{building, combat, movement, needs, tasks, world_resources};

/// Arrival distance for on-site interactions
pub const INTERACT_RANGE: f32 = 25.0;
const EAT_UNITS: u32 = 5;
const HUNGER_PER_FOOD: f32 = 12.0;
const DRINK_RESTORE: f32 = 60.0;
const REST_RESTORE_PER_VISIT: f32 = 20.0;
const REST_SATISFIED: f32 = 80.0;
const NEED_SATISFIED: f32 = 60.0;
const FUN_RESTORE: f32 = 40.0;
const GATHER_UNITS: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionProgress {
    InFlight,
    Completed,
    Failed,
}

/// Whether a need-driven goal has met its satisfaction threshold
pub fn goal_completed(ctx: &SimContext<'_>, agent_id: &EntityId, goal: &Goal) -> bool {
    let Some(agent_needs) = ctx.state.needs.get(agent_id) else {
        return false;
    };
    match goal.kind {
        GoalKind::Eat | GoalKind::GatherFood => agent_needs.hunger >= NEED_SATISFIED,
        GoalKind::Drink => agent_needs.thirst >= NEED_SATISFIED,
        GoalKind::Rest => agent_needs.energy >= REST_SATISFIED,
        GoalKind::Socialize => agent_needs.social >= NEED_SATISFIED,
        GoalKind::Fun => agent_needs.fun >= NEED_SATISFIED,
        GoalKind::Work | GoalKind::Build => match &goal.target {
            GoalTarget::Task(task_id) => ctx
                .state
                .tasks
                .get(task_id)
                .map(|t| t.completed)
                .unwrap_or(false),
            _ => false,
        },
        // One-shot goals complete through their action
        GoalKind::Gather
        | GoalKind::Craft
        | GoalKind::Deposit
        | GoalKind::Explore
        | GoalKind::Flee => false,
    }
}

/// Whether the goal can no longer be pursued at all
pub fn goal_invalid(ctx: &SimContext<'_>, _agent_id: &EntityId, goal: &Goal) -> bool {
    let now = ctx.state.sim_time;
    if goal.is_expired(now) {
        return true;
    }
    match &goal.target {
        GoalTarget::Entity(id) => !ctx.index.is_live(id),
        GoalTarget::Node(id) => ctx
            .state
            .world_resources
            .get(id)
            .map(|n| n.amount == 0)
            .unwrap_or(true),
        GoalTarget::Zone(id) => !ctx.state.zones.contains_key(id),
        GoalTarget::Task(id) => ctx
            .state
            .tasks
            .get(id)
            .map(|t| t.cancelled)
            .unwrap_or(true),
        GoalTarget::None | GoalTarget::Point(_) => false,
    }
}

/// Where the goal's target physically is
fn resolve_position(ctx: &SimContext<'_>, target: &GoalTarget) -> Option<Vec2> {
    match target {
        GoalTarget::Entity(id) => ctx.index.position_of(id),
        GoalTarget::Node(id) => ctx.state.world_resources.get(id).map(|n| n.position),
        GoalTarget::Zone(id) => ctx.state.zones.get(id).map(|z| z.bounds.center()),
        GoalTarget::Task(id) => {
            let task = ctx.state.tasks.get(id)?;
            task.bounds
                .map(|b| b.center())
                .or_else(|| {
                    task.zone_id
                        .as_ref()
                        .and_then(|z| ctx.state.zones.get(z))
                        .map(|z| z.bounds.center())
                })
        }
        GoalTarget::Point(point) => Some(*point),
        GoalTarget::None => None,
    }
}

fn action_kind_for(goal: &Goal) -> ActionKind {
    match goal.kind {
        GoalKind::Eat | GoalKind::GatherFood | GoalKind::Gather => match goal.target {
            GoalTarget::Node(_) => ActionKind::GatherFrom,
            _ => ActionKind::MoveTo,
        },
        GoalKind::Drink => ActionKind::DrinkAt,
        GoalKind::Rest => ActionKind::RestIn,
        GoalKind::Socialize => ActionKind::SocializeWith,
        GoalKind::Fun => ActionKind::PlayAt,
        GoalKind::Work | GoalKind::Build => ActionKind::Contribute,
        GoalKind::Deposit => ActionKind::Deposit,
        GoalKind::Craft => ActionKind::MoveTo,
        GoalKind::Explore | GoalKind::Flee => ActionKind::Explore,
    }
}

/// Produce the action for a goal and issue its movement order. None means
/// the target is gone and both goal and action should be abandoned.
pub fn plan_action(
    ctx: &mut SimContext<'_>,
    agent_id: &EntityId,
    goal: &Goal,
) -> Option<AgentAction> {
    if let GoalTarget::Entity(target) = &goal.target {
        if !ctx.index.is_live(target) {
            return None;
        }
    }
    let destination = resolve_position(ctx, &goal.target)?;
    let now = ctx.now();

    let action = AgentAction {
        kind: action_kind_for(goal),
        target_entity: match &goal.target {
            GoalTarget::Entity(id) | GoalTarget::Node(id) => Some(id.clone()),
            _ => None,
        },
        target_zone: match &goal.target {
            GoalTarget::Zone(id) => Some(id.clone()),
            GoalTarget::Task(id) => ctx
                .state
                .tasks
                .get(id)
                .and_then(|t| t.zone_id.clone()),
            _ => None,
        },
        target_position: Some(destination),
        started_at: now,
        work_remaining: 0.0,
    };

    movement::order_move(ctx.state, agent_id, destination);
    Some(action)
}

fn remember_node(ctx: &mut SimContext<'_>, agent_id: &EntityId, node_id: &EntityId) {
    let Some(node) = ctx.state.world_resources.get(node_id) else {
        return;
    };
    let entry = KnownResource {
        node_id: node.id.clone(),
        kind: node.kind,
        position: node.position,
        seen_at: ctx.state.sim_time,
    };
    if let Some(ai) = ctx.state.ai.get_mut(agent_id) {
        ai.memory.remember(entry);
    }
}

/// Eat straight from the carried inventory
fn eat_from_inventory(ctx: &mut SimContext<'_>, agent_id: &EntityId) -> bool {
    let eaten = match ctx.state.inventories.get_mut(agent_id) {
        Some(inventory) => inventory.remove(ResourceKind::Food, EAT_UNITS),
        None => 0,
    };
    if eaten == 0 {
        return false;
    }
    needs::satisfy(ctx, agent_id, NeedKind::Hunger, eaten as f32 * HUNGER_PER_FOOD);
    true
}

/// Advance the current action once the agent has arrived at its target.
/// Returns InFlight while movement is still pending.
pub fn progress_action(
    ctx: &mut SimContext<'_>,
    agent_id: &EntityId,
    goal: &Goal,
    action: &AgentAction,
) -> ActionProgress {
    // Still traveling
    if ctx.state.movement.contains_key(agent_id) {
        return ActionProgress::InFlight;
    }

    let Some(position) = ctx.index.position_of(agent_id).or_else(|| {
        ctx.state.entities.get(agent_id).map(|e| e.position)
    }) else {
        return ActionProgress::Failed;
    };
    if let Some(destination) = action.target_position {
        if position.distance(destination) > INTERACT_RANGE {
            // Arrived somewhere else (order was replaced or clamped); retry
            movement::order_move(ctx.state, agent_id, destination);
            return ActionProgress::InFlight;
        }
    }

    match goal.kind {
        GoalKind::Eat | GoalKind::GatherFood => {
            if let Some(node_id) = action.target_entity.clone() {
                let gathered = world_resources::gather_node(ctx, &node_id, EAT_UNITS, Some(agent_id));
                remember_node(ctx, agent_id, &node_id);
                if gathered == 0 && ctx.state.inventories.get(agent_id).map(|i| i.amount(ResourceKind::Food)).unwrap_or(0) == 0 {
                    return ActionProgress::Failed;
                }
            }
            if eat_from_inventory(ctx, agent_id) {
                ActionProgress::Completed
            } else {
                ActionProgress::Failed
            }
        }
        GoalKind::Drink => {
            if let Some(node_id) = action.target_entity.clone() {
                world_resources::gather_node(ctx, &node_id, EAT_UNITS, None);
                remember_node(ctx, agent_id, &node_id);
            }
            needs::satisfy(ctx, agent_id, NeedKind::Thirst, DRINK_RESTORE);
            ActionProgress::Completed
        }
        GoalKind::Rest => {
            needs::satisfy(ctx, agent_id, NeedKind::Energy, REST_RESTORE_PER_VISIT);
            if let Some(zone_id) = &action.target_zone {
                let now = ctx.state.sim_time;
                building::record_usage(ctx.state, zone_id, now);
            }
            let rested = ctx
                .state
                .needs
                .get(agent_id)
                .map(|n| n.energy >= REST_SATISFIED)
                .unwrap_or(true);
            if rested {
                ActionProgress::Completed
            } else {
                ActionProgress::InFlight
            }
        }
        GoalKind::Socialize => {
            let Some(target) = action.target_entity.clone() else {
                return ActionProgress::Failed;
            };
            if !ctx.index.is_live(&target) {
                return ActionProgress::Failed;
            }
            ctx.state.pending_chats.push((agent_id.clone(), target));
            ActionProgress::Completed
        }
        GoalKind::Fun => {
            needs::satisfy(ctx, agent_id, NeedKind::Fun, FUN_RESTORE);
            ActionProgress::Completed
        }
        GoalKind::Gather => {
            let Some(node_id) = action.target_entity.clone() else {
                return ActionProgress::Failed;
            };
            let gathered = world_resources::gather_node(ctx, &node_id, GATHER_UNITS, Some(agent_id));
            remember_node(ctx, agent_id, &node_id);
            if gathered > 0 {
                ActionProgress::Completed
            } else {
                ActionProgress::Failed
            }
        }
        GoalKind::Work | GoalKind::Build => {
            let GoalTarget::Task(task_id) = &goal.target else {
                return ActionProgress::Failed;
            };
            let diligence = ctx
                .state
                .agents
                .get(agent_id)
                .map(|a| a.traits.diligence)
                .unwrap_or(0.5);
            let work = 3.0 + diligence * 4.0;
            if !tasks::contribute(ctx, task_id, agent_id, work) {
                return ActionProgress::Failed;
            }
            let done = ctx
                .state
                .tasks
                .get(task_id)
                .map(|t| t.completed)
                .unwrap_or(true);
            if done {
                ActionProgress::Completed
            } else {
                ActionProgress::InFlight
            }
        }
        GoalKind::Craft => {
            // Pick the best weapon the carried materials cover
            let inventory = match ctx.state.inventories.get(agent_id) {
                Some(inventory) => inventory,
                None => return ActionProgress::Failed,
            };
            let affordable = ["iron_sword", "spear", "stone_axe", "wooden_club"]
                .into_iter()
                .find(|id| {
                    let weapon = &combat::WEAPONS[*id];
                    inventory.amount(ResourceKind::Wood) >= weapon.cost_wood
                        && inventory.amount(ResourceKind::Stone) >= weapon.cost_stone
                        && inventory.amount(ResourceKind::Metal) >= weapon.cost_metal
                });
            match affordable {
                Some(weapon_id) => {
                    if combat::craft_weapon(ctx, agent_id, weapon_id) {
                        ActionProgress::Completed
                    } else {
                        ActionProgress::Failed
                    }
                }
                None => ActionProgress::Failed,
            }
        }
        GoalKind::Deposit => {
            let Some(zone_id) = action.target_zone.clone() else {
                return ActionProgress::Failed;
            };
            let Some(stockpile_id) = ctx.state.first_stockpile_for_zone(&zone_id).cloned() else {
                return ActionProgress::Failed;
            };
            let carried: std::collections::HashMap<ResourceKind, u32> = ctx
                .state
                .inventories
                .get(agent_id)
                .map(|inventory| {
                    [ResourceKind::Wood, ResourceKind::Stone, ResourceKind::Food]
                        .into_iter()
                        .filter_map(|kind| {
                            let held = inventory.amount(kind);
                            (held > 0).then_some((kind, held))
                        })
                        .collect()
                })
                .unwrap_or_default();
            if carried.is_empty() {
                return ActionProgress::Completed;
            }
            match super::super::inventory::deposit_to_stockpile(
                ctx.state,
                agent_id,
                &stockpile_id,
                &carried,
            ) {
                Ok(()) => ActionProgress::Completed,
                Err(_) => ActionProgress::Failed,
            }
        }
        GoalKind::Explore | GoalKind::Flee => ActionProgress::Completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::testutil::TestBed;
    use crate::world::loader::spawn_node;
    use crate::world::types::{AgentProfile, NodeKind};

    fn agent_at(bed: &mut TestBed, x: f32, y: f32) -> EntityId {
        bed.state.spawn_agent(
            AgentProfile {
                position: Some(Vec2::new(x, y)),
                ..AgentProfile::default()
            },
            0.0,
        )
    }

    fn goal(bed: &mut TestBed, kind: GoalKind, target: GoalTarget) -> Goal {
        Goal {
            id: bed.state.ids.next("goal"),
            kind,
            priority: 5,
            target,
            created_at: 0.0,
            expires_at: None,
        }
    }

    #[test]
    fn test_plan_orders_movement_to_node() {
        let mut bed = TestBed::new();
        let agent = agent_at(&mut bed, 100.0, 100.0);
        let node = spawn_node(&mut bed.state, NodeKind::Tree, Vec2::new(200.0, 100.0));
        bed.reindex();
        let gather = goal(&mut bed, GoalKind::Gather, GoalTarget::Node(node.clone()));

        let mut ctx = bed.ctx();
        let action = plan_action(&mut ctx, &agent, &gather).expect("action");
        assert_eq!(action.kind, ActionKind::GatherFrom);
        assert_eq!(action.target_entity, Some(node));
        assert!(ctx.state.movement.contains_key(&agent));
    }

    #[test]
    fn test_plan_abandons_dead_entity_target() {
        let mut bed = TestBed::new();
        let agent = agent_at(&mut bed, 100.0, 100.0);
        let other = agent_at(&mut bed, 200.0, 100.0);
        bed.state.kill_agent(&other);
        bed.reindex();
        let socialize = goal(&mut bed, GoalKind::Socialize, GoalTarget::Entity(other));

        let mut ctx = bed.ctx();
        assert!(plan_action(&mut ctx, &agent, &socialize).is_none());
    }

    #[test]
    fn test_gather_on_arrival() {
        let mut bed = TestBed::new();
        let agent = agent_at(&mut bed, 100.0, 100.0);
        let node = spawn_node(&mut bed.state, NodeKind::Tree, Vec2::new(110.0, 100.0));
        bed.reindex();
        let gather = goal(&mut bed, GoalKind::Gather, GoalTarget::Node(node.clone()));

        let action = {
            let mut ctx = bed.ctx();
            plan_action(&mut ctx, &agent, &gather).expect("action")
        };
        // Simulate arrival
        bed.state.movement.remove(&agent);
        bed.state.set_agent_position(&agent, Vec2::new(110.0, 100.0));
        bed.reindex();

        let mut ctx = bed.ctx();
        let progress = progress_action(&mut ctx, &agent, &gather, &action);
        assert_eq!(progress, ActionProgress::Completed);
        assert_eq!(
            ctx.state.inventories[&agent].amount(ResourceKind::Wood),
            GATHER_UNITS
        );
        // The trip taught the agent where the tree is
        assert!(!ctx.state.ai[&agent].memory.known_resources.is_empty());
    }

    #[test]
    fn test_eat_gathers_then_restores_hunger() {
        let mut bed = TestBed::new();
        let agent = agent_at(&mut bed, 100.0, 100.0);
        let bush = spawn_node(&mut bed.state, NodeKind::BerryBush, Vec2::new(105.0, 100.0));
        bed.state.needs.get_mut(&agent).unwrap().set(NeedKind::Hunger, 15.0);
        bed.reindex();
        let eat = goal(&mut bed, GoalKind::Eat, GoalTarget::Node(bush));

        let action = {
            let mut ctx = bed.ctx();
            plan_action(&mut ctx, &agent, &eat).expect("action")
        };
        bed.state.movement.remove(&agent);
        bed.state.set_agent_position(&agent, Vec2::new(105.0, 100.0));
        bed.reindex();

        let mut ctx = bed.ctx();
        let progress = progress_action(&mut ctx, &agent, &eat, &action);
        assert_eq!(progress, ActionProgress::Completed);
        assert!(ctx.state.needs[&agent].hunger >= 60.0);
    }

    #[test]
    fn test_in_flight_while_moving() {
        let mut bed = TestBed::new();
        let agent = agent_at(&mut bed, 100.0, 100.0);
        let node = spawn_node(&mut bed.state, NodeKind::Tree, Vec2::new(500.0, 100.0));
        bed.reindex();
        let gather = goal(&mut bed, GoalKind::Gather, GoalTarget::Node(node));

        let action = {
            let mut ctx = bed.ctx();
            plan_action(&mut ctx, &agent, &gather).expect("action")
        };
        let mut ctx = bed.ctx();
        assert_eq!(
            progress_action(&mut ctx, &agent, &gather, &action),
            ActionProgress::InFlight
        );
    }

    #[test]
    fn test_work_contributes_until_done() {
        let mut bed = TestBed::new();
        let agent = agent_at(&mut bed, 100.0, 100.0);
        let task_id = {
            let mut ctx = bed.ctx();
            tasks::create_task(&mut ctx, "dig_well", 5.0, 0, 0, None)
        };
        bed.reindex();
        let work = goal(&mut bed, GoalKind::Work, GoalTarget::Task(task_id.clone()));

        // Task has no bounds, so the action happens in place
        let action = AgentAction {
            kind: ActionKind::Contribute,
            target_entity: None,
            target_zone: None,
            target_position: None,
            started_at: 0.0,
            work_remaining: 0.0,
        };
        let mut ctx = bed.ctx();
        let progress = progress_action(&mut ctx, &agent, &work, &action);
        assert_eq!(progress, ActionProgress::Completed);
        assert!(ctx.state.tasks[&task_id].completed);
    }

    #[test]
    fn test_goal_completion_thresholds() {
        let mut bed = TestBed::new();
        let agent = agent_at(&mut bed, 100.0, 100.0);
        let eat = goal(&mut bed, GoalKind::Eat, GoalTarget::None);

        bed.state.needs.get_mut(&agent).unwrap().set(NeedKind::Hunger, 30.0);
        {
            let ctx = bed.ctx();
            assert!(!goal_completed(&ctx, &agent, &eat));
        }
        bed.state.needs.get_mut(&agent).unwrap().set(NeedKind::Hunger, 70.0);
        {
            let ctx = bed.ctx();
            assert!(goal_completed(&ctx, &agent, &eat));
        }
    }

    #[test]
    fn test_goal_invalid_on_empty_node_or_expiry() {
        let mut bed = TestBed::new();
        agent_at(&mut bed, 100.0, 100.0);
        let node = spawn_node(&mut bed.state, NodeKind::Tree, Vec2::new(110.0, 100.0));
        bed.state.world_resources.get_mut(&node).unwrap().amount = 0;
        let agent = bed.state.agents.keys().next().cloned().unwrap();

        let gather = goal(&mut bed, GoalKind::Gather, GoalTarget::Node(node));
        {
            let ctx = bed.ctx();
            assert!(goal_invalid(&ctx, &agent, &gather));
        }

        let mut expired = goal(&mut bed, GoalKind::Explore, GoalTarget::Point(Vec2::ZERO));
        expired.expires_at = Some(1.0);
        bed.advance_time(5.0);
        let ctx = bed.ctx();
        assert!(goal_invalid(&ctx, &agent, &expired));
    }
}
