/// AI orchestration: batched per-agent goal and action upkeep
///
/// Each MEDIUM fire processes a fixed batch of agents starting at a
/// round-robin cursor, so every agent is reconsidered within a bounded
/// number of fires regardless of population size.
pub mod executor;
pub mod planner;

use serde_json::json;

use crate::errors::SystemResult;
use crate::events::EventName;
use crate::world::types::EntityId;

use self::executor::ActionProgress;
use self::planner::PlannerCaches;

use super::{SimContext, Subsystem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GoalTransition {
    Active,
    Completed,
    Failed,
    Invalidated,
}

impl GoalTransition {
    fn as_str(&self) -> &'static str {
        match self {
            GoalTransition::Active => "active",
            GoalTransition::Completed => "completed",
            GoalTransition::Failed => "failed",
            GoalTransition::Invalidated => "invalidated",
        }
    }
}

pub struct AiSystem {
    cursor: usize,
    caches: PlannerCaches,
    last_memory_cleanup: f64,
}

impl Default for AiSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl AiSystem {
    pub fn new() -> Self {
        Self {
            cursor: 0,
            caches: PlannerCaches::default(),
            last_memory_cleanup: 0.0,
        }
    }

    fn emit_goal_change(
        ctx: &mut SimContext<'_>,
        agent_id: &EntityId,
        goal_id: Option<&EntityId>,
        kind: Option<&str>,
        transition: GoalTransition,
    ) {
        ctx.bus.emit(
            EventName::AgentGoalChanged,
            json!({
                "agentId": agent_id,
                "goalId": goal_id,
                "goalKind": kind,
                "status": transition.as_str(),
            }),
        );
    }

    /// One agent's goal/action upkeep
    fn step_agent(&mut self, ctx: &mut SimContext<'_>, agent_id: &EntityId) {
        let Some(ai) = ctx.state.ai.get(agent_id) else {
            return;
        };
        if ai.off_duty {
            return;
        }
        let is_player = ctx.state.player_id.as_ref() == Some(agent_id);
        let alive = ctx
            .state
            .agents
            .get(agent_id)
            .map(|a| a.is_alive())
            .unwrap_or(false);
        if is_player || !alive {
            return;
        }

        let current_goal = ai.current_goal.clone();
        let current_action = ai.current_action.clone();
        let now = ctx.now();

        if let Some(goal) = current_goal {
            // 1. Completed goals retire
            if executor::goal_completed(ctx, agent_id, &goal) {
                if let Some(ai) = ctx.state.ai.get_mut(agent_id) {
                    ai.clear_goal();
                    ai.last_decision_time = now;
                }
                Self::emit_goal_change(
                    ctx,
                    agent_id,
                    Some(&goal.id),
                    Some(goal.kind.as_str()),
                    GoalTransition::Completed,
                );
                return;
            }
            // 2. Invalid goals fail
            if executor::goal_invalid(ctx, agent_id, &goal) {
                if let Some(ai) = ctx.state.ai.get_mut(agent_id) {
                    ai.clear_goal();
                }
                Self::emit_goal_change(
                    ctx,
                    agent_id,
                    Some(&goal.id),
                    Some(goal.kind.as_str()),
                    GoalTransition::Invalidated,
                );
                return;
            }
            // 3. In-flight actions advance
            if let Some(action) = current_action {
                match executor::progress_action(ctx, agent_id, &goal, &action) {
                    ActionProgress::InFlight => {}
                    ActionProgress::Completed => {
                        let one_shot = matches!(
                            goal.kind,
                            crate::world::ai::GoalKind::Gather
                                | crate::world::ai::GoalKind::Craft
                                | crate::world::ai::GoalKind::Deposit
                                | crate::world::ai::GoalKind::Explore
                                | crate::world::ai::GoalKind::Socialize
                                | crate::world::ai::GoalKind::Fun
                                | crate::world::ai::GoalKind::Work
                                | crate::world::ai::GoalKind::Build
                                | crate::world::ai::GoalKind::Flee
                        );
                        if let Some(ai) = ctx.state.ai.get_mut(agent_id) {
                            if one_shot {
                                ai.clear_goal();
                                ai.last_decision_time = now;
                            } else {
                                ai.current_action = None;
                            }
                        }
                        if one_shot {
                            Self::emit_goal_change(
                                ctx,
                                agent_id,
                                Some(&goal.id),
                                Some(goal.kind.as_str()),
                                GoalTransition::Completed,
                            );
                        }
                    }
                    ActionProgress::Failed => {
                        if let Some(ai) = ctx.state.ai.get_mut(agent_id) {
                            ai.clear_goal();
                        }
                        Self::emit_goal_change(
                            ctx,
                            agent_id,
                            Some(&goal.id),
                            Some(goal.kind.as_str()),
                            GoalTransition::Failed,
                        );
                    }
                }
                return;
            }
            // 4. Goal without an action gets one planned
            match executor::plan_action(ctx, agent_id, &goal) {
                Some(action) => {
                    if let Some(ai) = ctx.state.ai.get_mut(agent_id) {
                        ai.current_action = Some(action);
                    }
                }
                None => {
                    if let Some(ai) = ctx.state.ai.get_mut(agent_id) {
                        ai.clear_goal();
                    }
                    Self::emit_goal_change(
                        ctx,
                        agent_id,
                        Some(&goal.id),
                        Some(goal.kind.as_str()),
                        GoalTransition::Invalidated,
                    );
                }
            }
            return;
        }

        // 5. No goal: decide
        if let Some(goal) = planner::make_decision(ctx, &mut self.caches, agent_id) {
            let action = executor::plan_action(ctx, agent_id, &goal);
            let goal_id = goal.id.clone();
            let goal_kind = goal.kind.as_str();
            if let Some(ai) = ctx.state.ai.get_mut(agent_id) {
                ai.current_goal = Some(goal);
                ai.current_action = action;
                ai.last_decision_time = now;
            }
            Self::emit_goal_change(
                ctx,
                agent_id,
                Some(&goal_id),
                Some(goal_kind),
                GoalTransition::Active,
            );
        }
    }

    fn cleanup_memories(&mut self, ctx: &mut SimContext<'_>) {
        let now = ctx.now();
        if now - self.last_memory_cleanup < ctx.config.ai.memory_cleanup_secs {
            return;
        }
        self.last_memory_cleanup = now;
        let max_age = ctx.config.ai.memory_max_age;

        let mut pruned = 0;
        for ai in ctx.state.ai.values_mut() {
            pruned += ai.memory.prune(now, max_age);
        }
        if pruned > 0 {
            bevy::log::debug!("🧠 Pruned {} stale memory entries", pruned);
        }
    }
}

impl Subsystem for AiSystem {
    fn update(&mut self, ctx: &mut SimContext<'_>, _dt: f32) -> SystemResult {
        let agent_ids: Vec<EntityId> = ctx.index.agent_ids().to_vec();
        if !agent_ids.is_empty() {
            let batch_size = ctx.config.ai.batch_size.max(1);
            for offset in 0..batch_size.min(agent_ids.len()) {
                let index = (self.cursor + offset) % agent_ids.len();
                let agent_id = agent_ids[index].clone();
                self.step_agent(ctx, &agent_id);
            }
            self.cursor = (self.cursor + batch_size) % agent_ids.len();
        }

        let now = ctx.now();
        self.caches.prune(
            now,
            ctx.config.ai.zone_cache_ttl,
            ctx.config.ai.resource_cache_ttl,
        );
        self.cleanup_memories(ctx);
        Ok(())
    }
}
