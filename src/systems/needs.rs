/// Needs decay and threshold events
///
/// Five needs per agent, high means satisfied. Decay runs on the FAST
/// cadence; crossing a critical threshold emits one event per crossing, not
/// one per tick. Starvation and dehydration bleed health once the need
/// bottoms out.
use serde_json::json;
use std::collections::{HashMap, HashSet};

use crate::errors::SystemResult;
use crate::events::EventName;
use crate::world::types::{EntityId, NeedKind, StatKind};
use crate::world::Section;

use super::{SimContext, Subsystem};

/// Below these values a need counts as critical
pub fn critical_threshold(kind: NeedKind) -> f32 {
    match kind {
        NeedKind::Hunger => 20.0,
        NeedKind::Thirst => 20.0,
        NeedKind::Energy => 15.0,
        NeedKind::Social => 20.0,
        NeedKind::Fun => 15.0,
    }
}

/// Health lost per second while hunger or thirst sits at zero
const STARVATION_DAMAGE_PER_SECOND: f32 = 0.5;

#[derive(Debug, Default)]
pub struct NeedsSystem {
    /// Needs already reported critical, cleared when they recover
    critical: HashMap<EntityId, HashSet<NeedKind>>,
}

impl NeedsSystem {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Subsystem for NeedsSystem {
    fn update(&mut self, ctx: &mut SimContext<'_>, dt: f32) -> SystemResult {
        let rates = &ctx.config.needs;
        let decay = [
            (NeedKind::Hunger, rates.hunger_per_second),
            (NeedKind::Thirst, rates.thirst_per_second),
            (NeedKind::Energy, rates.energy_per_second),
            (NeedKind::Social, rates.social_per_second),
            (NeedKind::Fun, rates.fun_per_second),
        ];

        let agent_ids: Vec<EntityId> = ctx
            .state
            .alive_agents()
            .map(|a| a.id.clone())
            .collect();

        for id in agent_ids {
            let Some(mut needs) = ctx.state.needs.get(&id).copied() else {
                continue;
            };

            for (kind, per_second) in decay {
                needs.change(kind, -per_second * dt);
            }
            ctx.state.needs.insert(id.clone(), needs);

            // Threshold crossings
            let tracked = self.critical.entry(id.clone()).or_default();
            for kind in NeedKind::ALL {
                let value = needs.get(kind);
                let is_critical = value < critical_threshold(kind);
                if is_critical && !tracked.contains(&kind) {
                    tracked.insert(kind);
                    ctx.bus.emit(
                        EventName::NeedCritical,
                        json!({
                            "agentId": &id,
                            "need": kind.as_str(),
                            "value": value,
                        }),
                    );
                } else if !is_critical {
                    tracked.remove(&kind);
                }
            }

            // Bottomed-out hunger or thirst eats into health
            if needs.hunger <= 0.0 || needs.thirst <= 0.0 {
                if let Some(record) = ctx.state.entities.get_mut(&id) {
                    record.change_stat(StatKind::Health, -STARVATION_DAMAGE_PER_SECOND * dt);
                }
            }
        }

        // Drop tracking for agents that no longer exist
        self.critical.retain(|id, _| ctx.state.agents.contains_key(id));
        ctx.state.mark_dirty(Section::Agents);
        Ok(())
    }
}

/// Restore a need and emit the satisfaction event. Hunger and thirst
/// satisfaction also requests an early reservation sweep.
pub fn satisfy(ctx: &mut SimContext<'_>, agent_id: &EntityId, kind: NeedKind, amount: f32) {
    let Some(needs) = ctx.state.needs.get_mut(agent_id) else {
        return;
    };
    needs.change(kind, amount);
    let value = needs.get(kind);

    ctx.bus.emit(
        EventName::NeedSatisfied,
        json!({
            "agentId": agent_id,
            "need": kind.as_str(),
            "value": value,
        }),
    );
    if matches!(kind, NeedKind::Hunger | NeedKind::Thirst) {
        ctx.state.reservations.sweep_requested = true;
    }
    ctx.state.mark_dirty(Section::Agents);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::testutil::TestBed;
    use crate::world::types::AgentProfile;

    #[test]
    fn test_needs_decay_over_time() {
        let mut bed = TestBed::new();
        let id = bed.state.spawn_agent(AgentProfile::default(), 0.0);
        let mut system = NeedsSystem::new();

        bed.run(&mut system, 10.0);
        let needs = bed.state.needs[&id];
        assert!(needs.hunger < 100.0);
        assert!(needs.thirst < needs.hunger, "thirst decays faster");
    }

    #[test]
    fn test_critical_event_emitted_once_per_crossing() {
        let mut bed = TestBed::new();
        let id = bed.state.spawn_agent(AgentProfile::default(), 0.0);
        bed.state
            .needs
            .get_mut(&id)
            .unwrap()
            .set(NeedKind::Hunger, 21.0);
        let mut system = NeedsSystem::new();

        // Two updates while below threshold: one event
        bed.run(&mut system, 20.0);
        bed.run(&mut system, 1.0);
        let events = bed.flush_events();
        let critical: Vec<_> = events
            .iter()
            .filter(|e| {
                e.name == EventName::NeedCritical && e.payload["need"] == "hunger"
            })
            .collect();
        assert_eq!(critical.len(), 1);
    }

    #[test]
    fn test_recovery_rearms_critical_event() {
        let mut bed = TestBed::new();
        let id = bed.state.spawn_agent(AgentProfile::default(), 0.0);
        bed.state
            .needs
            .get_mut(&id)
            .unwrap()
            .set(NeedKind::Thirst, 10.0);
        let mut system = NeedsSystem::new();

        bed.run(&mut system, 0.1);
        bed.state
            .needs
            .get_mut(&id)
            .unwrap()
            .set(NeedKind::Thirst, 90.0);
        bed.run(&mut system, 0.1);
        bed.state
            .needs
            .get_mut(&id)
            .unwrap()
            .set(NeedKind::Thirst, 10.0);
        bed.run(&mut system, 0.1);

        let events = bed.flush_events();
        let critical = events
            .iter()
            .filter(|e| e.name == EventName::NeedCritical && e.payload["need"] == "thirst")
            .count();
        assert_eq!(critical, 2);
    }

    #[test]
    fn test_starvation_damages_health() {
        let mut bed = TestBed::new();
        let id = bed.state.spawn_agent(AgentProfile::default(), 0.0);
        bed.state
            .needs
            .get_mut(&id)
            .unwrap()
            .set(NeedKind::Hunger, 0.0);
        let mut system = NeedsSystem::new();

        bed.run(&mut system, 10.0);
        assert!(bed.state.entities[&id].stat(StatKind::Health) < 100.0);
    }

    #[test]
    fn test_satisfy_emits_and_requests_sweep() {
        let mut bed = TestBed::new();
        let id = bed.state.spawn_agent(AgentProfile::default(), 0.0);
        bed.state
            .needs
            .get_mut(&id)
            .unwrap()
            .set(NeedKind::Hunger, 15.0);

        let mut ctx = bed.ctx();
        satisfy(&mut ctx, &id, NeedKind::Hunger, 60.0);
        assert_eq!(ctx.state.needs[&id].hunger, 75.0);
        assert!(ctx.state.reservations.sweep_requested);

        let events = bed.flush_events();
        assert!(events.iter().any(|e| e.name == EventName::NeedSatisfied));
    }
}
