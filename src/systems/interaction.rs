/// Paired social interactions
///
/// A chat binds two agents for a few seconds; completion raises both
/// agents' social need and nudges their affinity up. Dialogue content is a
/// data input elsewhere; the kernel only runs the session mechanics.
use bevy::prelude::*;
use serde_json::json;

use crate::errors::SystemResult;
use crate::events::EventName;
use crate::world::types::{EntityId, NeedKind};

use super::{needs, social, SimContext, Subsystem};

const CHAT_DURATION_SECS: f64 = 10.0;
const CHAT_SOCIAL_GAIN: f32 = 25.0;
const CHAT_FUN_GAIN: f32 = 8.0;
const CHAT_AFFINITY_GAIN: f32 = 0.05;

#[derive(Debug, Clone)]
struct ChatSession {
    a: EntityId,
    b: EntityId,
    ends_at: f64,
}

/// Request a chat between two live agents; the interaction system picks the
/// request up on its next update
pub fn start_chat(ctx: &mut SimContext<'_>, a: &EntityId, b: &EntityId) -> bool {
    if a == b {
        return false;
    }
    let both_alive = [a, b].into_iter().all(|id| {
        ctx.state
            .agents
            .get(id)
            .map(|agent| agent.is_alive())
            .unwrap_or(false)
    });
    if !both_alive {
        debug!("chat request with missing or dead agent ({}, {})", a, b);
        return false;
    }
    ctx.state.pending_chats.push((a.clone(), b.clone()));
    true
}

#[derive(Debug, Default)]
pub struct InteractionSystem {
    sessions: Vec<ChatSession>,
}

impl InteractionSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session unless either side is already engaged
    pub fn begin(&mut self, now: f64, a: &EntityId, b: &EntityId) -> bool {
        let busy = self
            .sessions
            .iter()
            .any(|s| [&s.a, &s.b].into_iter().any(|id| id == a || id == b));
        if busy {
            return false;
        }
        self.sessions.push(ChatSession {
            a: a.clone(),
            b: b.clone(),
            ends_at: now + CHAT_DURATION_SECS,
        });
        true
    }

    pub fn in_session(&self, id: &EntityId) -> bool {
        self.sessions.iter().any(|s| &s.a == id || &s.b == id)
    }
}

impl Subsystem for InteractionSystem {
    fn update(&mut self, ctx: &mut SimContext<'_>, _dt: f32) -> SystemResult {
        let now = ctx.now();

        // Pick up requested chats
        let requests = std::mem::take(&mut ctx.state.pending_chats);
        for (a, b) in requests {
            self.begin(now, &a, &b);
        }

        // Sessions whose participant died end without payoff
        self.sessions.retain(|s| {
            [&s.a, &s.b].into_iter().all(|id| {
                ctx.state
                    .agents
                    .get(id)
                    .map(|agent| agent.is_alive())
                    .unwrap_or(false)
            })
        });

        let finished: Vec<ChatSession> = self
            .sessions
            .iter()
            .filter(|s| s.ends_at <= now)
            .cloned()
            .collect();
        self.sessions.retain(|s| s.ends_at > now);

        for session in finished {
            for id in [&session.a, &session.b] {
                needs::satisfy(ctx, id, NeedKind::Social, CHAT_SOCIAL_GAIN);
                needs::satisfy(ctx, id, NeedKind::Fun, CHAT_FUN_GAIN);
            }
            social::adjust_affinity(ctx, &session.a, &session.b, CHAT_AFFINITY_GAIN);
            ctx.bus.emit(
                EventName::KnowledgeShared,
                json!({ "a": session.a, "b": session.b, "kind": "chat" }),
            );
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
    fn test_chat_completion_pays_off() {
        let mut bed = TestBed::new();
        let a = bed.state.spawn_agent(AgentProfile::default(), 0.0);
        let b = bed.state.spawn_agent(AgentProfile::default(), 0.0);
        bed.state.needs.get_mut(&a).unwrap().set(NeedKind::Social, 30.0);
        bed.state.needs.get_mut(&b).unwrap().set(NeedKind::Social, 30.0);

        let mut system = InteractionSystem::new();
        assert!(system.begin(0.0, &a, &b));
        assert!(system.in_session(&a));
        // Second begin for a busy agent is refused
        assert!(!system.begin(0.0, &a, &b));

        bed.advance_time(CHAT_DURATION_SECS + 1.0);
        bed.run(&mut system, 1.0);

        assert!(!system.in_session(&a));
        assert_eq!(bed.state.needs[&a].social, 55.0);
        assert!(bed.state.social.affinity(&a, &b) > 0.0);
    }

    #[test]
    fn test_death_ends_session_without_payoff() {
        let mut bed = TestBed::new();
        let a = bed.state.spawn_agent(AgentProfile::default(), 0.0);
        let b = bed.state.spawn_agent(AgentProfile::default(), 0.0);
        bed.state.needs.get_mut(&a).unwrap().set(NeedKind::Social, 30.0);

        let mut system = InteractionSystem::new();
        system.begin(0.0, &a, &b);
        bed.state.kill_agent(&b);

        bed.advance_time(CHAT_DURATION_SECS + 1.0);
        bed.run(&mut system, 1.0);
        assert_eq!(bed.state.needs[&a].social, 30.0);
    }

    #[test]
    fn test_start_chat_validates_agents() {
        let mut bed = TestBed::new();
        let a = bed.state.spawn_agent(AgentProfile::default(), 0.0);
        let mut ctx = bed.ctx();
        assert!(!start_chat(&mut ctx, &a, &a));
        assert!(!start_chat(&mut ctx, &a, &EntityId::from("ghost")));
    }
}
