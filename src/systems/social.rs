/// Social graph dynamics: proximity reinforcement, decay, truces, groups
/// and marriage
///
/// Reinforcement runs on the FAST cadence but staggers its agents across
/// sub-batches so the pair work is spread over several ticks. Decay and
/// group derivation run on their own slower cadences inside the update.
use bevy::prelude::*;
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::errors::SystemResult;
use crate::events::EventName;
use crate::world::social::{BondKind, MarriageGroup, SocialGroup, MAX_MARRIAGE_MEMBERS};
use crate::world::types::{EntityId, EntityKind};
use crate::world::Section;

use super::{SimContext, Subsystem};

/// Edge movement below this is not worth an event
const RELATION_EVENT_EPSILON: f32 = 0.01;
/// Edge magnitudes below this decay to exactly zero
const EDGE_ZERO_EPSILON: f32 = 1e-3;
/// Bonded edges decay at this fraction of the normal rate
const BONDED_DECAY_FACTOR: f32 = 0.05;
const RALLY_COHESION: f32 = 0.7;
const RALLY_MIN_MEMBERS: usize = 3;

// ============================================================================
// OPERATIONS
// ============================================================================

/// Apply a symmetric affinity delta; announces movements above the epsilon
pub fn adjust_affinity(ctx: &mut SimContext<'_>, a: &EntityId, b: &EntityId, delta: f32) {
    if a == b {
        return;
    }
    let (old, new) = ctx.state.social.add_edge(a, b, delta);
    if (new - old).abs() > RELATION_EVENT_EPSILON {
        ctx.state.social.edges_modified = true;
        ctx.bus.emit(
            EventName::SocialRelationChanged,
            json!({ "a": a, "b": b, "affinity": new }),
        );
        ctx.state.mark_dirty(Section::SocialGraph);
    }
}

pub fn propose_marriage(ctx: &mut SimContext<'_>, from: &EntityId, to: &EntityId) -> bool {
    if from == to
        || !ctx.state.agents.contains_key(from)
        || !ctx.state.agents.contains_key(to)
    {
        debug!("invalid marriage proposal {} -> {}", from, to);
        return false;
    }
    if ctx.state.social.are_married(from, to) {
        return false;
    }
    if let Some(group) = ctx.state.social.marriage_of(to) {
        if group.members.len() >= MAX_MARRIAGE_MEMBERS {
            return false;
        }
    }
    let already = ctx
        .state
        .social
        .proposals
        .iter()
        .any(|(a, b)| a == from && b == to);
    if !already {
        ctx.state.social.proposals.push((from.clone(), to.clone()));
    }
    true
}

/// Accept an open proposal: join an existing group (either side's) or found
/// a new one. The pair becomes a bonded marriage edge.
pub fn accept_proposal(ctx: &mut SimContext<'_>, from: &EntityId, to: &EntityId) -> bool {
    let position = ctx
        .state
        .social
        .proposals
        .iter()
        .position(|(a, b)| a == from && b == to);
    let Some(position) = position else {
        debug!("acceptance without proposal {} -> {}", from, to);
        return false;
    };
    ctx.state.social.proposals.remove(position);

    let now = ctx.now();
    let social = &mut ctx.state.social;
    let group_index = social
        .marriages
        .iter()
        .position(|g| g.members.contains(from) || g.members.contains(to));

    match group_index {
        Some(index) => {
            let group = &mut social.marriages[index];
            if group.members.len() >= MAX_MARRIAGE_MEMBERS {
                return false;
            }
            for id in [from, to] {
                if !group.members.contains(id) {
                    group.members.push(id.clone());
                }
            }
        }
        None => {
            let id = ctx.state.ids.next("marriage");
            ctx.state.social.marriages.push(MarriageGroup {
                id,
                members: vec![from.clone(), to.clone()],
                cohesion: 0.8,
                founded_at: now,
                children: Vec::new(),
            });
        }
    }

    ctx.state.social.set_bond(from, to, Some(BondKind::Marriage));
    adjust_affinity(ctx, from, to, 0.3);
    ctx.state.mark_dirty(Section::Marriage);
    true
}

/// Leave the marriage group; the departing agent's marriage bonds revert to
/// plain edges and a two-member group dissolves entirely
pub fn initiate_divorce(ctx: &mut SimContext<'_>, agent_id: &EntityId) -> bool {
    let social = &mut ctx.state.social;
    let Some(index) = social
        .marriages
        .iter()
        .position(|g| g.members.contains(agent_id))
    else {
        return false;
    };

    let mut group = social.marriages.remove(index);
    group.members.retain(|m| m != agent_id);
    let remaining = group.members.clone();
    if group.members.len() >= 2 {
        social.marriages.push(group);
    }

    for other in &remaining {
        if social.edge(agent_id, other).and_then(|e| e.bond) == Some(BondKind::Marriage) {
            social.set_bond(agent_id, other, None);
        }
    }
    // A dissolved pair group leaves no marriage bonds behind
    if remaining.len() == 1 {
        ctx.state.social.set_bond(agent_id, &remaining[0], None);
    }
    ctx.state.mark_dirty(Section::Marriage);
    true
}

// ============================================================================
// SYSTEM
// ============================================================================

#[derive(Debug, Default)]
pub struct SocialSystem {
    /// Rotating sub-batch cursor for proximity reinforcement
    batch_cursor: usize,
    last_decay: f64,
    last_group_derivation: f64,
}

impl SocialSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reinforce edges for the current sub-batch of agents. With enough
    /// candidates the distance math runs through the batch compute service.
    fn reinforce_proximity(&mut self, ctx: &mut SimContext<'_>, dt: f32) {
        let agent_ids = ctx.index.agent_ids();
        if agent_ids.len() < 2 {
            return;
        }

        let sub_batches = ctx.config.social.sub_batches.max(1);
        let batch = self.batch_cursor % sub_batches;
        self.batch_cursor = self.batch_cursor.wrapping_add(1);

        let radius = ctx.config.social.proximity_radius;
        let gain = ctx.config.social.reinforcement_per_second * dt;

        // This tick's slice of agents
        let slice: Vec<EntityId> = agent_ids
            .iter()
            .enumerate()
            .filter(|(i, _)| i % sub_batches == batch)
            .map(|(_, id)| id.clone())
            .collect();

        let mut touched = false;
        if slice.len() >= ctx.config.social.accel_threshold {
            // Batched path: one distance sweep per slice agent against all
            // live agents
            let candidates: Vec<(EntityId, Vec2)> = agent_ids
                .iter()
                .filter_map(|id| ctx.index.position_of(id).map(|p| (id.clone(), p)))
                .collect();
            let positions: Vec<Vec2> = candidates.iter().map(|(_, p)| *p).collect();
            let radius_sq = radius * radius;

            for a in &slice {
                let Some(origin) = ctx.index.position_of(a) else {
                    continue;
                };
                let distances = ctx.compute.distances_squared(origin, &positions);
                for ((other, _), &distance_sq) in candidates.iter().zip(distances.iter()) {
                    if other <= a || distance_sq > radius_sq {
                        continue;
                    }
                    let (old, new) = ctx.state.social.add_edge(a, other, gain);
                    touched |= (new - old).abs() > 0.0;
                }
            }
        } else {
            for a in &slice {
                let Some(origin) = ctx.index.position_of(a) else {
                    continue;
                };
                let hits = ctx.spatial.query_radius(origin, radius, Some(EntityKind::Agent));
                for hit in hits.iter() {
                    if &hit.id <= a || !ctx.index.is_live(&hit.id) {
                        continue;
                    }
                    let (old, new) = ctx.state.social.add_edge(a, &hit.id, gain);
                    touched |= (new - old).abs() > 0.0;
                }
            }
        }

        if touched {
            ctx.state.social.edges_modified = true;
            ctx.state.mark_dirty(Section::SocialGraph);
        }
    }

    /// Decay all edges toward zero; bonded edges 20x slower
    fn decay_edges(&mut self, ctx: &mut SimContext<'_>) {
        let now = ctx.now();
        let cadence = ctx.config.social.decay_cadence;
        if now - self.last_decay < cadence {
            return;
        }
        let elapsed = if self.last_decay == 0.0 {
            cadence
        } else {
            now - self.last_decay
        } as f32;
        self.last_decay = now;

        let rate = ctx.config.social.decay_per_second;
        ctx.state.social.map_edges(|edge| {
            let factor = if edge.bond.is_some() {
                BONDED_DECAY_FACTOR
            } else {
                1.0
            };
            let step = rate * factor * elapsed;
            let magnitude = (edge.affinity.abs() - step).max(0.0);
            let next = magnitude * edge.affinity.signum();
            if next.abs() < EDGE_ZERO_EPSILON {
                0.0
            } else {
                next
            }
        });
        ctx.state.social.sweep_dead_edges(EDGE_ZERO_EPSILON);
        ctx.state.mark_dirty(Section::SocialGraph);
    }

    fn sweep_truces(&mut self, ctx: &mut SimContext<'_>) {
        let now = ctx.now();
        let expired = ctx.state.social.sweep_truces(now);
        for (a, b) in expired {
            ctx.bus.emit(
                EventName::TruceExpired,
                json!({ "a": a, "b": b }),
            );
        }
    }

    /// Connected components over edges at or above the group threshold
    fn derive_groups(&mut self, ctx: &mut SimContext<'_>) {
        let now = ctx.now();
        if !ctx.state.social.edges_modified {
            return;
        }
        if now - self.last_group_derivation < ctx.config.social.group_cadence {
            return;
        }
        self.last_group_derivation = now;
        ctx.state.social.edges_modified = false;

        let threshold = ctx.config.social.group_threshold;
        let social = &ctx.state.social;

        // Adjacency restricted to strong edges between live agents
        let mut strong: HashMap<EntityId, Vec<EntityId>> = HashMap::new();
        social.for_each_pair(|a, b, edge| {
            if edge.affinity >= threshold && ctx.index.is_live(a) && ctx.index.is_live(b) {
                strong.entry(a.clone()).or_default().push(b.clone());
                strong.entry(b.clone()).or_default().push(a.clone());
            }
        });

        let mut visited: HashSet<EntityId> = HashSet::new();
        let mut groups: Vec<SocialGroup> = Vec::new();

        for start in strong.keys() {
            if visited.contains(start) {
                continue;
            }
            let mut members = Vec::new();
            let mut queue = VecDeque::from([start.clone()]);
            visited.insert(start.clone());
            while let Some(current) = queue.pop_front() {
                members.push(current.clone());
                if let Some(neighbors) = strong.get(&current) {
                    for next in neighbors {
                        if visited.insert(next.clone()) {
                            queue.push_back(next.clone());
                        }
                    }
                }
            }
            if members.len() < 2 {
                continue;
            }

            // Leader: best summed positive affinity inside the group
            let member_set: HashSet<&EntityId> = members.iter().collect();
            let mut leader: Option<(EntityId, f32)> = None;
            let mut positive_sum = 0.0;
            let mut positive_count = 0usize;
            for member in &members {
                let mut score = 0.0;
                for (other, edge) in social.neighbors(member) {
                    if member_set.contains(other) && edge.affinity > 0.0 {
                        score += edge.affinity;
                        positive_sum += edge.affinity;
                        positive_count += 1;
                    }
                }
                if leader.as_ref().map(|(_, best)| score > *best).unwrap_or(true) {
                    leader = Some((member.clone(), score));
                }
            }
            let cohesion = if positive_count > 0 {
                positive_sum / positive_count as f32
            } else {
                0.0
            };

            groups.push(SocialGroup {
                members,
                leader: leader.map(|(id, _)| id),
                cohesion,
                morale: 100.0,
            });
        }

        let rallies: Vec<&SocialGroup> = groups
            .iter()
            .filter(|g| g.cohesion > RALLY_COHESION && g.members.len() >= RALLY_MIN_MEMBERS)
            .collect();
        for group in &rallies {
            ctx.bus.emit(
                EventName::SocialRally,
                json!({
                    "members": &group.members,
                    "leader": &group.leader,
                    "cohesion": group.cohesion,
                }),
            );
        }

        ctx.bus.emit(
            EventName::SocialGroupsUpdate,
            json!({ "groups": groups.len() }),
        );
        ctx.state.social.groups = groups;
        ctx.state.mark_dirty(Section::SocialGraph);
    }
}

impl Subsystem for SocialSystem {
    fn update(&mut self, ctx: &mut SimContext<'_>, dt: f32) -> SystemResult {
        self.reinforce_proximity(ctx, dt);
        self.decay_edges(ctx);
        self.sweep_truces(ctx);
        self.derive_groups(ctx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::testutil::TestBed;
    use crate::world::types::AgentProfile;

    fn spawn_at(bed: &mut TestBed, x: f32, y: f32) -> EntityId {
        bed.state.spawn_agent(
            AgentProfile {
                position: Some(Vec2::new(x, y)),
                ..AgentProfile::default()
            },
            0.0,
        )
    }

    #[test]
    fn test_proximity_reinforces_nearby_pairs() {
        let mut bed = TestBed::new();
        let a = spawn_at(&mut bed, 10.0, 10.0);
        let b = spawn_at(&mut bed, 20.0, 10.0);
        let far = spawn_at(&mut bed, 900.0, 900.0);
        bed.reindex();

        let mut system = SocialSystem::new();
        // One full rotation of sub-batches
        for _ in 0..bed.config.social.sub_batches {
            bed.run(&mut system, 1.0);
        }

        assert!(bed.state.social.affinity(&a, &b) > 0.0);
        assert_eq!(bed.state.social.affinity(&a, &far), 0.0);
        // Symmetry holds
        assert_eq!(
            bed.state.social.affinity(&a, &b),
            bed.state.social.affinity(&b, &a)
        );
    }

    #[test]
    fn test_decay_pulls_edges_toward_zero() {
        let mut bed = TestBed::new();
        let a = spawn_at(&mut bed, 10.0, 10.0);
        let b = spawn_at(&mut bed, 700.0, 700.0);
        bed.reindex();
        bed.state.social.set_edge(&a, &b, 0.5);
        bed.state.social.set_edge(&a, &EntityId::from("x"), -0.5);

        let mut system = SocialSystem::new();
        bed.advance_time(10.0);
        bed.run(&mut system, 0.05);

        let positive = bed.state.social.affinity(&a, &b);
        assert!(positive < 0.5 && positive > 0.0);
        let negative = bed.state.social.affinity(&a, &EntityId::from("x"));
        assert!(negative > -0.5 && negative < 0.0);
    }

    #[test]
    fn test_bonded_edges_decay_slower() {
        let mut bed = TestBed::new();
        let a = spawn_at(&mut bed, 10.0, 10.0);
        let b = spawn_at(&mut bed, 700.0, 700.0);
        let c = spawn_at(&mut bed, 700.0, 100.0);
        bed.reindex();
        bed.state.social.set_edge(&a, &b, 0.5);
        bed.state.social.set_bond(&a, &b, Some(BondKind::Family));
        bed.state.social.set_edge(&a, &c, 0.5);

        let mut system = SocialSystem::new();
        bed.advance_time(20.0);
        bed.run(&mut system, 0.05);

        let bonded = bed.state.social.affinity(&a, &b);
        let plain = bed.state.social.affinity(&a, &c);
        assert!(bonded > plain);
    }

    #[test]
    fn test_tiny_edges_snap_to_zero() {
        let mut bed = TestBed::new();
        let a = spawn_at(&mut bed, 10.0, 10.0);
        let b = spawn_at(&mut bed, 700.0, 700.0);
        bed.reindex();
        bed.state.social.set_edge(&a, &b, 0.002);

        let mut system = SocialSystem::new();
        bed.advance_time(10.0);
        bed.run(&mut system, 0.05);
        assert_eq!(bed.state.social.affinity(&a, &b), 0.0);
    }

    #[test]
    fn test_group_derivation_and_rally() {
        let mut bed = TestBed::new();
        let ids: Vec<EntityId> = (0..3).map(|i| spawn_at(&mut bed, i as f32 * 10.0, 0.0)).collect();
        bed.reindex();
        for i in 0..3 {
            for j in (i + 1)..3 {
                bed.state.social.set_edge(&ids[i], &ids[j], 0.9);
            }
        }
        bed.state.social.edges_modified = true;

        let mut system = SocialSystem::new();
        bed.advance_time(2.0);
        bed.run(&mut system, 0.05);

        assert_eq!(bed.state.social.groups.len(), 1);
        let group = &bed.state.social.groups[0];
        assert_eq!(group.members.len(), 3);
        assert!(group.leader.is_some());
        assert!(group.cohesion > RALLY_COHESION);

        let events = bed.flush_events();
        assert!(events.iter().any(|e| e.name == EventName::SocialRally));
        assert!(events.iter().any(|e| e.name == EventName::SocialGroupsUpdate));
    }

    #[test]
    fn test_marriage_roundtrip() {
        let mut bed = TestBed::new();
        let a = spawn_at(&mut bed, 0.0, 0.0);
        let b = spawn_at(&mut bed, 10.0, 0.0);

        let mut ctx = bed.ctx();
        assert!(propose_marriage(&mut ctx, &a, &b));
        assert!(accept_proposal(&mut ctx, &a, &b));
        assert!(ctx.state.social.are_married(&a, &b));
        assert_eq!(
            ctx.state.social.edge(&a, &b).unwrap().bond,
            Some(BondKind::Marriage)
        );

        assert!(initiate_divorce(&mut ctx, &a));
        assert!(!ctx.state.social.are_married(&a, &b));
        assert_ne!(
            ctx.state.social.edge(&a, &b).and_then(|e| e.bond),
            Some(BondKind::Marriage)
        );
    }

    #[test]
    fn test_acceptance_requires_proposal() {
        let mut bed = TestBed::new();
        let a = spawn_at(&mut bed, 0.0, 0.0);
        let b = spawn_at(&mut bed, 10.0, 0.0);
        let mut ctx = bed.ctx();
        assert!(!accept_proposal(&mut ctx, &a, &b));
    }

    #[test]
    fn test_marriage_group_capped() {
        let mut bed = TestBed::new();
        let ids: Vec<EntityId> = (0..10).map(|i| spawn_at(&mut bed, i as f32, 0.0)).collect();

        let mut ctx = bed.ctx();
        propose_marriage(&mut ctx, &ids[0], &ids[1]);
        accept_proposal(&mut ctx, &ids[0], &ids[1]);
        for next in &ids[2..] {
            propose_marriage(&mut ctx, &ids[0], next);
            accept_proposal(&mut ctx, &ids[0], next);
        }
        let group = ctx.state.social.marriage_of(&ids[0]).unwrap();
        assert!(group.members.len() <= MAX_MARRIAGE_MEMBERS);
    }

    #[test]
    fn test_truce_expiry_event() {
        let mut bed = TestBed::new();
        let a = spawn_at(&mut bed, 0.0, 0.0);
        let b = spawn_at(&mut bed, 10.0, 0.0);
        bed.state.social.impose_truce(&a, &b, 0.0, 5.0);

        let mut system = SocialSystem::new();
        bed.advance_time(10.0);
        bed.run(&mut system, 0.05);

        let events = bed.flush_events();
        assert!(events.iter().any(|e| e.name == EventName::TruceExpired));
    }
}
