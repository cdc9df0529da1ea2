/// Per-agent reputation: bounded history and decay toward the neutral value
use bevy::prelude::*;
use serde_json::json;

use crate::errors::SystemResult;
use crate::events::EventName;
use crate::world::social::{Reputation, ReputationEntry, REPUTATION_HISTORY_LIMIT};
use crate::world::types::EntityId;
use crate::world::Section;

use super::{SimContext, Subsystem};

const NEUTRAL: f32 = 0.5;

/// Apply a clamped delta with a reason, keeping the bounded history
pub fn update_reputation(
    ctx: &mut SimContext<'_>,
    agent_id: &EntityId,
    delta: f32,
    reason: &str,
) -> f32 {
    if !ctx.state.agents.contains_key(agent_id) {
        debug!("reputation update for unknown agent {}", agent_id);
        return NEUTRAL;
    }
    let now = ctx.now();
    let entry = ctx
        .state
        .social
        .reputation
        .entry(agent_id.clone())
        .or_insert_with(Reputation::default);

    entry.value = (entry.value + delta).clamp(0.0, 1.0);
    entry.history.push_back(ReputationEntry {
        delta,
        reason: reason.to_string(),
        at: now,
    });
    while entry.history.len() > REPUTATION_HISTORY_LIMIT {
        entry.history.pop_front();
    }
    let value = entry.value;

    ctx.bus.emit(
        EventName::ReputationUpdated,
        json!({
            "agentId": agent_id,
            "value": value,
            "delta": delta,
            "reason": reason,
        }),
    );
    ctx.state.mark_dirty(Section::Reputation);
    value
}

#[derive(Debug, Default)]
pub struct ReputationSystem {
    last_decay: f64,
}

impl ReputationSystem {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Subsystem for ReputationSystem {
    fn update(&mut self, ctx: &mut SimContext<'_>, _dt: f32) -> SystemResult {
        let now = ctx.now();
        let cadence = ctx.config.social.decay_cadence;
        if now - self.last_decay < cadence {
            return Ok(());
        }
        let elapsed = if self.last_decay == 0.0 {
            cadence
        } else {
            now - self.last_decay
        } as f32;
        self.last_decay = now;

        let step = ctx.config.social.reputation_decay_per_second * elapsed;
        let mut moved = false;
        for reputation in ctx.state.social.reputation.values_mut() {
            let distance = reputation.value - NEUTRAL;
            if distance.abs() <= step {
                if reputation.value != NEUTRAL {
                    reputation.value = NEUTRAL;
                    moved = true;
                }
            } else {
                reputation.value -= step * distance.signum();
                moved = true;
            }
        }
        if moved {
            ctx.state.mark_dirty(Section::Reputation);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::testutil::TestBed;
    use crate::world::types::AgentProfile;

    #[test]
    fn test_update_clamps_and_records_history() {
        let mut bed = TestBed::new();
        let id = bed.state.spawn_agent(AgentProfile::default(), 0.0);

        let mut ctx = bed.ctx();
        let value = update_reputation(&mut ctx, &id, 0.8, "heroism");
        assert_eq!(value, 1.0);
        let value = update_reputation(&mut ctx, &id, -2.0, "betrayal");
        assert_eq!(value, 0.0);

        let reputation = &ctx.state.social.reputation[&id];
        assert_eq!(reputation.history.len(), 2);
        assert_eq!(reputation.history[1].reason, "betrayal");

        let events = bed.flush_events();
        assert_eq!(
            events
                .iter()
                .filter(|e| e.name == EventName::ReputationUpdated)
                .count(),
            2
        );
    }

    #[test]
    fn test_history_bounded() {
        let mut bed = TestBed::new();
        let id = bed.state.spawn_agent(AgentProfile::default(), 0.0);
        let mut ctx = bed.ctx();
        for i in 0..(REPUTATION_HISTORY_LIMIT + 20) {
            update_reputation(&mut ctx, &id, 0.001, &format!("event {}", i));
        }
        assert_eq!(
            ctx.state.social.reputation[&id].history.len(),
            REPUTATION_HISTORY_LIMIT
        );
    }

    #[test]
    fn test_decay_toward_neutral_from_both_sides() {
        let mut bed = TestBed::new();
        let high = bed.state.spawn_agent(AgentProfile::default(), 0.0);
        let low = bed.state.spawn_agent(AgentProfile::default(), 0.0);
        {
            let mut ctx = bed.ctx();
            update_reputation(&mut ctx, &high, 0.4, "good deed");
            update_reputation(&mut ctx, &low, -0.4, "bad deed");
        }

        let mut system = ReputationSystem::new();
        bed.advance_time(10.0);
        bed.run(&mut system, 1.0);

        let high_value = bed.state.social.reputation[&high].value;
        let low_value = bed.state.social.reputation[&low].value;
        assert!(high_value < 0.9 && high_value > NEUTRAL);
        assert!(low_value > 0.1 && low_value < NEUTRAL);
    }

    #[test]
    fn test_decay_settles_exactly_at_neutral() {
        let mut bed = TestBed::new();
        let id = bed.state.spawn_agent(AgentProfile::default(), 0.0);
        {
            let mut ctx = bed.ctx();
            update_reputation(&mut ctx, &id, 0.01, "small favor");
        }

        let mut system = ReputationSystem::new();
        for _ in 0..20 {
            bed.advance_time(10.0);
            bed.run(&mut system, 1.0);
        }
        assert_eq!(bed.state.social.reputation[&id].value, NEUTRAL);
    }

    #[test]
    fn test_unknown_agent_is_noop() {
        let mut bed = TestBed::new();
        let mut ctx = bed.ctx();
        update_reputation(&mut ctx, &EntityId::from("ghost"), 0.3, "nothing");
        assert!(ctx.state.social.reputation.is_empty());
    }
}
