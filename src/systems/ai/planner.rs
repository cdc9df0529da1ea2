/// Goal selection
///
/// Critical needs short-circuit into urgent goals aimed at the nearest
/// satisfying resource or zone. Otherwise candidate goals are scored from
/// needs, role, traits, settlement supply and time of day, and the best
/// one wins. The whole decision carries a soft time budget; blowing it
/// falls back to an explore goal so an agent never stalls undecided.
use bevy::prelude::*;
use rand::Rng;
use std::collections::HashMap;
use std::time::Instant;

use crate::systems::SimContext;
use crate::world::ai::{CachedLookup, Goal, GoalKind, GoalTarget};
use crate::world::types::{EntityId, EntityKind, NeedKind, NodeKind, ResourceKind, Role, ZoneKind};

use super::super::needs::critical_threshold;

/// Urgent-goal priorities per need
fn urgent_priority(kind: NeedKind) -> i32 {
    match kind {
        NeedKind::Hunger | NeedKind::Thirst => 10,
        NeedKind::Energy | NeedKind::Social => 9,
        NeedKind::Fun => 8,
    }
}

/// Settlement wood/stone below this total prompts gathering work
const LOW_MATERIAL_THRESHOLD: u32 = 40;

/// TTL-bounded lookup caches shared across one planning batch
pub struct PlannerCaches {
    zone_lookup: HashMap<(EntityId, ZoneKind), CachedLookup<Option<EntityId>>>,
    nearest_node: HashMap<(EntityId, NodeKind), CachedLookup<Option<EntityId>>>,
}

impl Default for PlannerCaches {
    fn default() -> Self {
        Self {
            zone_lookup: HashMap::new(),
            nearest_node: HashMap::new(),
        }
    }
}

impl PlannerCaches {
    pub fn prune(&mut self, now: f64, zone_ttl: f64, node_ttl: f64) {
        self.zone_lookup
            .retain(|_, cached| now - cached.cached_at <= zone_ttl);
        self.nearest_node
            .retain(|_, cached| now - cached.cached_at <= node_ttl);
    }
}

/// Nearest non-empty node of `kind` within the search radius, cached per
/// agent. Any hit closer than the near-enough distance ends the scan.
pub fn nearest_node(
    ctx: &mut SimContext<'_>,
    caches: &mut PlannerCaches,
    agent_id: &EntityId,
    kind: NodeKind,
) -> Option<EntityId> {
    let now = ctx.now();
    let ttl = ctx.config.ai.resource_cache_ttl;
    if let Some(cached) = caches.nearest_node.get(&(agent_id.clone(), kind)) {
        if let Some(value) = cached.fresh(now, ttl) {
            return value;
        }
    }

    let origin = ctx.index.position_of(agent_id)?;
    let radius = ctx.config.ai.resource_search_radius;
    let near_enough_sq = ctx.config.ai.near_enough * ctx.config.ai.near_enough;

    let hits = ctx.spatial.query_radius(origin, radius, Some(EntityKind::Object));
    let mut best: Option<(EntityId, f32)> = None;
    for hit in hits.iter() {
        let Some(node) = ctx.state.world_resources.get(&hit.id) else {
            continue;
        };
        if node.kind != kind || node.amount == 0 {
            continue;
        }
        if best
            .as_ref()
            .map(|(_, d)| hit.distance_sq < *d)
            .unwrap_or(true)
        {
            best = Some((hit.id.clone(), hit.distance_sq));
            if hit.distance_sq <= near_enough_sq {
                break;
            }
        }
    }
    drop(hits);

    let result = best.map(|(id, _)| id);
    caches.nearest_node.insert(
        (agent_id.clone(), kind),
        CachedLookup {
            value: result.clone(),
            cached_at: now,
        },
    );
    result
}

/// Nearest zone of `kind` by center distance, cached per agent
pub fn nearest_zone(
    ctx: &mut SimContext<'_>,
    caches: &mut PlannerCaches,
    agent_id: &EntityId,
    kind: ZoneKind,
) -> Option<EntityId> {
    let now = ctx.now();
    let ttl = ctx.config.ai.zone_cache_ttl;
    if let Some(cached) = caches.zone_lookup.get(&(agent_id.clone(), kind)) {
        if let Some(value) = cached.fresh(now, ttl) {
            return value;
        }
    }

    let origin = ctx.index.position_of(agent_id)?;
    let result = ctx
        .state
        .zones
        .values()
        .filter(|z| z.kind == kind && !z.meta.under_construction)
        .map(|z| (z.id.clone(), z.bounds.center().distance_squared(origin)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(id, _)| id);

    caches.zone_lookup.insert(
        (agent_id.clone(), kind),
        CachedLookup {
            value: result.clone(),
            cached_at: now,
        },
    );
    result
}

/// Nearest other live agent inside the search radius. Large populations
/// run one distance sweep through the batch compute service instead of
/// per-cell spatial queries, the same gating combat and the social graph
/// use.
fn nearest_company(
    ctx: &mut SimContext<'_>,
    agent_id: &EntityId,
    origin: Vec2,
) -> Option<EntityId> {
    let radius = ctx.config.ai.resource_search_radius;
    let agent_ids = ctx.index.agent_ids();

    if agent_ids.len() >= ctx.config.ai.accel_threshold {
        let candidates: Vec<(EntityId, Vec2)> = agent_ids
            .iter()
            .filter(|id| *id != agent_id)
            .filter_map(|id| ctx.index.position_of(id).map(|p| (id.clone(), p)))
            .collect();
        let positions: Vec<Vec2> = candidates.iter().map(|(_, p)| *p).collect();
        let distances = ctx.compute.distances_squared(origin, &positions);
        let radius_sq = radius * radius;

        candidates
            .iter()
            .zip(distances.iter())
            .filter(|(_, &distance_sq)| distance_sq <= radius_sq)
            .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|((id, _), _)| id.clone())
    } else {
        let hits = ctx.spatial.query_radius(origin, radius, Some(EntityKind::Agent));
        hits.iter()
            .filter(|h| h.id != *agent_id && ctx.index.is_live(&h.id))
            .min_by(|a, b| {
                a.distance_sq
                    .partial_cmp(&b.distance_sq)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|h| h.id.clone())
    }
}

/// Target for an urgent goal raised by a critical need
fn urgent_target(
    ctx: &mut SimContext<'_>,
    caches: &mut PlannerCaches,
    agent_id: &EntityId,
    need: NeedKind,
) -> Option<GoalTarget> {
    match need {
        NeedKind::Hunger => nearest_node(ctx, caches, agent_id, NodeKind::BerryBush)
            .map(GoalTarget::Node)
            .or_else(|| {
                nearest_zone(ctx, caches, agent_id, ZoneKind::Food).map(GoalTarget::Zone)
            }),
        NeedKind::Thirst => nearest_node(ctx, caches, agent_id, NodeKind::WaterHole)
            .map(GoalTarget::Node)
            .or_else(|| {
                nearest_zone(ctx, caches, agent_id, ZoneKind::Water).map(GoalTarget::Zone)
            }),
        NeedKind::Energy => {
            nearest_zone(ctx, caches, agent_id, ZoneKind::Rest).map(GoalTarget::Zone)
        }
        NeedKind::Social | NeedKind::Fun => {
            nearest_zone(ctx, caches, agent_id, ZoneKind::Social).map(GoalTarget::Zone)
        }
    }
}

fn goal_kind_for_need(need: NeedKind) -> GoalKind {
    match need {
        NeedKind::Hunger => GoalKind::Eat,
        NeedKind::Thirst => GoalKind::Drink,
        NeedKind::Energy => GoalKind::Rest,
        NeedKind::Social => GoalKind::Socialize,
        NeedKind::Fun => GoalKind::Fun,
    }
}

struct ScoredGoal {
    kind: GoalKind,
    priority: i32,
    utility: f32,
    target: GoalTarget,
}

/// Random point near the agent, clamped into the world
pub fn explore_point(ctx: &mut SimContext<'_>, agent_id: &EntityId) -> Vec2 {
    let origin = ctx
        .index
        .position_of(agent_id)
        .unwrap_or(Vec2::new(
            ctx.state.terrain.width / 2.0,
            ctx.state.terrain.height / 2.0,
        ));
    let range = ctx.config.ai.explore_range;
    let offset = Vec2::new(
        ctx.rng.gen_range(-range..range),
        ctx.rng.gen_range(-range..range),
    );
    ctx.state.terrain.clamp_to_bounds(origin + offset)
}

fn fallback_explore(ctx: &mut SimContext<'_>, agent_id: &EntityId, now: f64) -> Goal {
    let point = explore_point(ctx, agent_id);
    Goal {
        id: ctx.state.ids.next("goal"),
        kind: GoalKind::Explore,
        priority: 1,
        target: GoalTarget::Point(point),
        created_at: now,
        expires_at: Some(now + 60.0),
    }
}

/// Select the next goal for an agent. Critical needs win outright; the
/// general ranking runs under the decision budget.
pub fn make_decision(
    ctx: &mut SimContext<'_>,
    caches: &mut PlannerCaches,
    agent_id: &EntityId,
) -> Option<Goal> {
    let started = Instant::now();
    let now = ctx.now();
    let budget_ms = ctx.config.ai.decision_budget_ms;

    let agent_needs = ctx.state.needs.get(agent_id).copied()?;
    let agent = ctx.state.agents.get(agent_id)?.clone();
    if agent.is_dead {
        return None;
    }

    // Urgent path: worst critical need first, hunger and thirst ahead of
    // the rest
    let mut critical: Vec<NeedKind> = NeedKind::ALL
        .into_iter()
        .filter(|&kind| agent_needs.get(kind) < critical_threshold(kind))
        .collect();
    critical.sort_by_key(|&kind| -urgent_priority(kind));
    for need in critical {
        if let Some(target) = urgent_target(ctx, caches, agent_id, need) {
            return Some(Goal {
                id: ctx.state.ids.next("goal"),
                kind: goal_kind_for_need(need),
                priority: urgent_priority(need),
                target,
                created_at: now,
                expires_at: Some(now + 120.0),
            });
        }
    }

    // General ranking
    let mut candidates: Vec<ScoredGoal> = Vec::new();

    // Low settlement materials pull foragers and builders to gather
    let supply = ctx.state.raw_material_supply();
    if supply.wood < LOW_MATERIAL_THRESHOLD
        && matches!(agent.role, Role::Forager | Role::Builder | Role::Idle)
    {
        if let Some(node) = nearest_node(ctx, caches, agent_id, NodeKind::Tree) {
            candidates.push(ScoredGoal {
                kind: GoalKind::Gather,
                priority: 5,
                utility: 0.5 + agent.traits.diligence * 0.4,
                target: GoalTarget::Node(node),
            });
        }
    }
    if supply.stone < LOW_MATERIAL_THRESHOLD
        && matches!(agent.role, Role::Forager | Role::Builder | Role::Idle)
    {
        if let Some(node) = nearest_node(ctx, caches, agent_id, NodeKind::Rock) {
            candidates.push(ScoredGoal {
                kind: GoalKind::Gather,
                priority: 5,
                utility: 0.45 + agent.traits.diligence * 0.4,
                target: GoalTarget::Node(node),
            });
        }
    }

    // Carried materials want depositing
    if let Some(inventory) = ctx.state.inventories.get(agent_id) {
        let carried = inventory.amount(ResourceKind::Wood) + inventory.amount(ResourceKind::Stone);
        if carried >= 20 {
            if let Some(zone) = nearest_zone(ctx, caches, agent_id, ZoneKind::Storage) {
                candidates.push(ScoredGoal {
                    kind: GoalKind::Deposit,
                    priority: 6,
                    utility: 0.6 + carried as f32 / 100.0,
                    target: GoalTarget::Zone(zone),
                });
            }
        }
    }

    // Open cooperative tasks draw workers
    let open_task = ctx
        .state
        .tasks
        .values()
        .find(|t| t.is_open() && t.total_contribution() < t.required_work);
    if let Some(task) = open_task {
        let task_id = task.id.clone();
        let base = if agent.role == Role::Builder { 0.7 } else { 0.4 };
        candidates.push(ScoredGoal {
            kind: GoalKind::Work,
            priority: 6,
            utility: base + agent.traits.diligence * 0.3,
            target: GoalTarget::Task(task_id),
        });
    }

    // Aggressive unarmed agents want a weapon when a crafting bench exists
    if agent.equipped_weapon.is_none() && agent.traits.aggression >= 0.6 {
        if let Some(zone) = nearest_zone(ctx, caches, agent_id, ZoneKind::Crafting) {
            candidates.push(ScoredGoal {
                kind: GoalKind::Craft,
                priority: 4,
                utility: 0.3 + agent.traits.aggression * 0.3,
                target: GoalTarget::Zone(zone),
            });
        }
    }

    // Sagging social need seeks company before it turns critical
    if agent_needs.social < 60.0 {
        if let Some(other) = nearest_company(ctx, agent_id, agent.position) {
            candidates.push(ScoredGoal {
                kind: GoalKind::Socialize,
                priority: 4,
                utility: (60.0 - agent_needs.social) / 60.0 + agent.traits.cooperation * 0.2,
                target: GoalTarget::Entity(other),
            });
        }
    }

    // Night pulls agents home
    if ctx.state.is_night() && agent_needs.energy < 70.0 {
        if let Some(zone) = nearest_zone(ctx, caches, agent_id, ZoneKind::Rest) {
            candidates.push(ScoredGoal {
                kind: GoalKind::Rest,
                priority: 5,
                utility: 0.5 + (70.0 - agent_needs.energy) / 100.0,
                target: GoalTarget::Zone(zone),
            });
        }
    }

    // Idle exploration scaled by curiosity
    candidates.push(ScoredGoal {
        kind: GoalKind::Explore,
        priority: 1,
        utility: 0.1 + agent.traits.curiosity * 0.2,
        target: GoalTarget::Point(explore_point(ctx, agent_id)),
    });

    // Budget check: an overlong undecided pass falls back to exploring
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    if elapsed_ms > budget_ms && candidates.is_empty() {
        return Some(fallback_explore(ctx, agent_id, now));
    }

    let best = candidates.into_iter().max_by(|a, b| {
        (a.priority, a.utility)
            .partial_cmp(&(b.priority, b.utility))
            .unwrap_or(std::cmp::Ordering::Equal)
    })?;

    Some(Goal {
        id: ctx.state.ids.next("goal"),
        kind: best.kind,
        priority: best.priority,
        target: best.target,
        created_at: now,
        expires_at: Some(now + 180.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::testutil::TestBed;
    use crate::world::loader::spawn_node;
    use crate::world::types::{AgentProfile, Zone, ZoneBounds};

    fn agent_at(bed: &mut TestBed, x: f32, y: f32) -> EntityId {
        bed.state.spawn_agent(
            AgentProfile {
                position: Some(Vec2::new(x, y)),
                ..AgentProfile::default()
            },
            0.0,
        )
    }

    #[test]
    fn test_critical_hunger_wins() {
        let mut bed = TestBed::new();
        let id = agent_at(&mut bed, 100.0, 100.0);
        let bush = spawn_node(&mut bed.state, NodeKind::BerryBush, Vec2::new(150.0, 100.0));
        bed.state.needs.get_mut(&id).unwrap().set(NeedKind::Hunger, 10.0);
        bed.reindex();

        let mut caches = PlannerCaches::default();
        let mut ctx = bed.ctx();
        let goal = make_decision(&mut ctx, &mut caches, &id).expect("goal");
        assert_eq!(goal.kind, GoalKind::Eat);
        assert_eq!(goal.priority, 10);
        assert_eq!(goal.target, GoalTarget::Node(bush));
    }

    #[test]
    fn test_hunger_outranks_fun() {
        let mut bed = TestBed::new();
        let id = agent_at(&mut bed, 100.0, 100.0);
        spawn_node(&mut bed.state, NodeKind::BerryBush, Vec2::new(150.0, 100.0));
        let zone_id = bed.state.ids.next("zone");
        bed.state.zones.insert(
            zone_id.clone(),
            Zone::new(
                zone_id,
                ZoneKind::Social,
                ZoneBounds::new(80.0, 80.0, 50.0, 50.0),
            ),
        );
        let needs = bed.state.needs.get_mut(&id).unwrap();
        needs.set(NeedKind::Hunger, 10.0);
        needs.set(NeedKind::Fun, 5.0);
        bed.reindex();

        let mut caches = PlannerCaches::default();
        let mut ctx = bed.ctx();
        let goal = make_decision(&mut ctx, &mut caches, &id).expect("goal");
        assert_eq!(goal.kind, GoalKind::Eat);
    }

    #[test]
    fn test_low_wood_sends_gatherers() {
        let mut bed = TestBed::new();
        let id = agent_at(&mut bed, 100.0, 100.0);
        let tree = spawn_node(&mut bed.state, NodeKind::Tree, Vec2::new(130.0, 100.0));
        bed.reindex();

        let mut caches = PlannerCaches::default();
        let mut ctx = bed.ctx();
        let goal = make_decision(&mut ctx, &mut caches, &id).expect("goal");
        assert_eq!(goal.kind, GoalKind::Gather);
        assert_eq!(goal.target, GoalTarget::Node(tree));
    }

    #[test]
    fn test_satisfied_world_explores() {
        let mut bed = TestBed::new();
        let id = agent_at(&mut bed, 100.0, 100.0);
        bed.state.add_global_resource(ResourceKind::Wood, 500);
        bed.state.add_global_resource(ResourceKind::Stone, 500);
        bed.reindex();

        let mut caches = PlannerCaches::default();
        let mut ctx = bed.ctx();
        let goal = make_decision(&mut ctx, &mut caches, &id).expect("goal");
        assert_eq!(goal.kind, GoalKind::Explore);
        match goal.target {
            GoalTarget::Point(point) => assert!(ctx.state.terrain.in_bounds(point)),
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn test_nearest_node_prefers_closest() {
        let mut bed = TestBed::new();
        let id = agent_at(&mut bed, 100.0, 100.0);
        spawn_node(&mut bed.state, NodeKind::Tree, Vec2::new(400.0, 100.0));
        let near = spawn_node(&mut bed.state, NodeKind::Tree, Vec2::new(140.0, 100.0));
        bed.reindex();

        let mut caches = PlannerCaches::default();
        let mut ctx = bed.ctx();
        assert_eq!(nearest_node(&mut ctx, &mut caches, &id, NodeKind::Tree), Some(near));
    }

    #[test]
    fn test_nearest_company_paths_agree() {
        let mut bed = TestBed::new();
        let seeker = agent_at(&mut bed, 100.0, 100.0);
        let near = agent_at(&mut bed, 120.0, 100.0);
        // Enough distant agents to trip the accelerated path
        for i in 0..40 {
            agent_at(&mut bed, 300.0 + i as f32 * 5.0, 400.0);
        }
        bed.reindex();

        let batched = {
            let mut ctx = bed.ctx();
            nearest_company(&mut ctx, &seeker, Vec2::new(100.0, 100.0))
        };
        assert_eq!(batched, Some(near));

        // Scalar path (threshold out of reach) must agree
        bed.config.ai.accel_threshold = 1000;
        let scalar = {
            let mut ctx = bed.ctx();
            nearest_company(&mut ctx, &seeker, Vec2::new(100.0, 100.0))
        };
        assert_eq!(scalar, batched);
    }

    #[test]
    fn test_nearest_node_cache_hits_within_ttl() {
        let mut bed = TestBed::new();
        let id = agent_at(&mut bed, 100.0, 100.0);
        let tree = spawn_node(&mut bed.state, NodeKind::Tree, Vec2::new(140.0, 100.0));
        bed.reindex();

        let mut caches = PlannerCaches::default();
        {
            let mut ctx = bed.ctx();
            assert_eq!(
                nearest_node(&mut ctx, &mut caches, &id, NodeKind::Tree),
                Some(tree.clone())
            );
        }
        // Remove the node; the cached answer survives until the TTL lapses
        bed.state.world_resources.remove(&tree);
        bed.state.entities.remove(&tree);
        {
            let mut ctx = bed.ctx();
            assert_eq!(
                nearest_node(&mut ctx, &mut caches, &id, NodeKind::Tree),
                Some(tree.clone())
            );
        }
        bed.advance_time(5.0);
        bed.reindex();
        {
            let mut ctx = bed.ctx();
            assert_eq!(nearest_node(&mut ctx, &mut caches, &id, NodeKind::Tree), None);
        }
    }
}
