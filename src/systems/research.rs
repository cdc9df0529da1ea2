/// Settlement research: passive point gain and threshold unlocks
///
/// Thin and data-driven. Crafters generate points on the SLOW cadence;
/// crossing a threshold unlocks the entry and records the fact in the
/// knowledge store.
use bevy::prelude::*;
use serde_json::json;

use crate::errors::SystemResult;
use crate::events::EventName;
use crate::world::state::KnowledgeFact;
use crate::world::types::Role;
use crate::world::Section;

use super::{SimContext, Subsystem};

/// Unlock table: (id, points required)
const UNLOCKS: [(&str, f32); 5] = [
    ("basic_tools", 10.0),
    ("construction", 30.0),
    ("weaving", 60.0),
    ("metallurgy", 120.0),
    ("irrigation", 200.0),
];

const POINTS_PER_CRAFTER_SECOND: f32 = 0.05;
const POINTS_BASE_PER_SECOND: f32 = 0.01;

fn check_unlocks(ctx: &mut SimContext<'_>) {
    let points = ctx.state.research.points;
    let newly: Vec<&str> = UNLOCKS
        .iter()
        .filter(|(id, required)| {
            points >= *required && !ctx.state.research.unlocked.iter().any(|u| u == id)
        })
        .map(|(id, _)| *id)
        .collect();

    let now = ctx.now();
    for id in newly {
        ctx.state.research.unlocked.push(id.to_string());
        ctx.state.knowledge.facts.push(KnowledgeFact {
            subject: "research".to_string(),
            fact: id.to_string(),
            learned_at: now,
        });
        info!("🔬 Research unlocked: {}", id);
        ctx.bus.emit(
            EventName::ResearchCompleted,
            json!({ "id": id, "points": points }),
        );
        ctx.bus.emit(
            EventName::KnowledgeLearned,
            json!({ "subject": "research", "fact": id }),
        );
        ctx.state.mark_dirty(Section::Research);
        ctx.state.mark_dirty(Section::KnowledgeGraph);
    }
}

pub fn add_points(ctx: &mut SimContext<'_>, points: f32) {
    if !points.is_finite() || points <= 0.0 {
        debug!("ignoring non-positive research points {}", points);
        return;
    }
    ctx.state.research.points += points;
    ctx.state.mark_dirty(Section::Research);
    check_unlocks(ctx);
}

pub fn force_unlock(ctx: &mut SimContext<'_>, id: &str) {
    if !UNLOCKS.iter().any(|(known, _)| *known == id) {
        debug!("force unlock of unknown research '{}'", id);
        return;
    }
    if ctx.state.research.unlocked.iter().any(|u| u == id) {
        return;
    }
    ctx.state.research.unlocked.push(id.to_string());
    ctx.bus.emit(
        EventName::ResearchCompleted,
        json!({ "id": id, "forced": true }),
    );
    ctx.state.mark_dirty(Section::Research);
}

#[derive(Debug, Default)]
pub struct ResearchSystem;

impl ResearchSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Subsystem for ResearchSystem {
    fn update(&mut self, ctx: &mut SimContext<'_>, dt: f32) -> SystemResult {
        let crafters = ctx
            .state
            .alive_agents()
            .filter(|a| a.role == Role::Crafter)
            .count() as f32;
        let gain = (POINTS_BASE_PER_SECOND + crafters * POINTS_PER_CRAFTER_SECOND) * dt;
        ctx.state.research.points += gain;
        ctx.state.mark_dirty(Section::Research);
        check_unlocks(ctx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::testutil::TestBed;
    use crate::world::types::AgentProfile;

    #[test]
    fn test_points_accumulate_faster_with_crafters() {
        let mut bed = TestBed::new();
        bed.state.spawn_agent(
            AgentProfile {
                role: Some(Role::Crafter),
                ..AgentProfile::default()
            },
            0.0,
        );

        let mut system = ResearchSystem::new();
        bed.run(&mut system, 10.0);
        let with_crafter = bed.state.research.points;
        assert!(with_crafter > POINTS_BASE_PER_SECOND * 10.0);
    }

    #[test]
    fn test_threshold_unlock_fires_once() {
        let mut bed = TestBed::new();
        {
            let mut ctx = bed.ctx();
            add_points(&mut ctx, 15.0);
            add_points(&mut ctx, 1.0);
        }
        assert_eq!(bed.state.research.unlocked, vec!["basic_tools"]);
        let events = bed.flush_events();
        assert_eq!(
            events
                .iter()
                .filter(|e| e.name == EventName::ResearchCompleted)
                .count(),
            1
        );
    }

    #[test]
    fn test_force_unlock_known_only() {
        let mut bed = TestBed::new();
        let mut ctx = bed.ctx();
        force_unlock(&mut ctx, "metallurgy");
        force_unlock(&mut ctx, "alchemy");
        assert_eq!(ctx.state.research.unlocked, vec!["metallurgy"]);
    }

    #[test]
    fn test_negative_points_rejected() {
        let mut bed = TestBed::new();
        let mut ctx = bed.ctx();
        add_points(&mut ctx, -5.0);
        assert_eq!(ctx.state.research.points, 0.0);
    }
}
