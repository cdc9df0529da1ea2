/// Cooperative task store
///
/// Tasks accumulate contributions from agents until the required work is
/// met. The system itself only watches for completion and stalls; creation,
/// cancellation and contribution are operations invoked by commands, the AI
/// executor and the building system.
use bevy::prelude::*;
use serde_json::json;
use std::collections::HashMap;

use crate::errors::SystemResult;
use crate::events::EventName;
use crate::world::types::{EntityId, MaterialCost, Task};
use crate::world::Section;

use super::{SimContext, Subsystem};

/// Seconds without progress before an in-flight task is reported stalled
const STALL_AFTER_SECS: f64 = 60.0;

pub fn create_task(
    ctx: &mut SimContext<'_>,
    kind: &str,
    required_work: f32,
    wood: u32,
    stone: u32,
    zone_id: Option<EntityId>,
) -> EntityId {
    let id = ctx.state.ids.next("task");
    let now = ctx.now();
    let task = Task {
        id: id.clone(),
        kind: kind.to_string(),
        required_work: required_work.max(0.0),
        contributions: HashMap::new(),
        cost: MaterialCost::new(wood, stone),
        zone_id,
        bounds: None,
        min_workers: 1,
        completed: false,
        cancelled: false,
        created_at: now,
        label: None,
    };
    ctx.state.tasks.insert(id.clone(), task);
    ctx.bus.emit(
        EventName::TaskCreated,
        json!({ "taskId": &id, "kind": kind, "requiredWork": required_work }),
    );
    ctx.state.mark_dirty(Section::Tasks);
    id
}

pub fn cancel_task(ctx: &mut SimContext<'_>, task_id: &EntityId) -> bool {
    let Some(task) = ctx.state.tasks.get_mut(task_id) else {
        debug!("cancel for unknown task {}", task_id);
        return false;
    };
    if !task.is_open() {
        return false;
    }
    task.cancelled = true;
    ctx.state.mark_dirty(Section::Tasks);
    true
}

/// Add work on behalf of an agent; completes the task when the total
/// reaches the requirement. Returns false when the task cannot accept work.
pub fn contribute(
    ctx: &mut SimContext<'_>,
    task_id: &EntityId,
    agent_id: &EntityId,
    amount: f32,
) -> bool {
    if amount <= 0.0 {
        return false;
    }
    if !ctx.state.agents.get(agent_id).map(|a| a.is_alive()).unwrap_or(false) {
        debug!("contribution from missing or dead agent {}", agent_id);
        return false;
    }
    let Some(task) = ctx.state.tasks.get_mut(task_id) else {
        debug!("contribution to unknown task {}", task_id);
        return false;
    };
    if !task.is_open() {
        return false;
    }

    *task.contributions.entry(agent_id.clone()).or_insert(0.0) += amount;
    let total = task.total_contribution();
    let done = total >= task.required_work;
    let kind = task.kind.clone();

    ctx.bus.emit(
        EventName::TaskProgress,
        json!({
            "taskId": task_id,
            "agentId": agent_id,
            "total": total,
            "requiredWork": ctx.state.tasks[task_id].required_work,
        }),
    );

    if done {
        ctx.state.tasks.get_mut(task_id).expect("task exists").completed = true;
        ctx.bus.emit(
            EventName::TaskCompleted,
            json!({ "taskId": task_id, "kind": kind }),
        );
    }
    ctx.state.mark_dirty(Section::Tasks);
    true
}

/// Complete a task regardless of contribution, used by construction
/// finalization
pub fn force_complete(ctx: &mut SimContext<'_>, task_id: &EntityId) -> bool {
    let Some(task) = ctx.state.tasks.get_mut(task_id) else {
        return false;
    };
    if !task.is_open() {
        return false;
    }
    task.completed = true;
    let kind = task.kind.clone();
    ctx.bus.emit(
        EventName::TaskCompleted,
        json!({ "taskId": task_id, "kind": kind, "forced": true }),
    );
    ctx.state.mark_dirty(Section::Tasks);
    true
}

#[derive(Debug, Default)]
pub struct TaskSystem {
    /// Last observed totals, for stall detection
    progress_seen: HashMap<EntityId, (f32, f64)>,
    stalled: HashMap<EntityId, bool>,
}

impl TaskSystem {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Subsystem for TaskSystem {
    fn update(&mut self, ctx: &mut SimContext<'_>, _dt: f32) -> SystemResult {
        let now = ctx.now();
        let mut stalls: Vec<EntityId> = Vec::new();

        for task in ctx.state.tasks.values() {
            if !task.is_open() || task.contributions.is_empty() {
                continue;
            }
            let total = task.total_contribution();
            let entry = self
                .progress_seen
                .entry(task.id.clone())
                .or_insert((total, now));
            if total > entry.0 {
                *entry = (total, now);
                self.stalled.insert(task.id.clone(), false);
            } else if now - entry.1 > STALL_AFTER_SECS
                && !self.stalled.get(&task.id).copied().unwrap_or(false)
            {
                stalls.push(task.id.clone());
            }
        }

        for task_id in stalls {
            self.stalled.insert(task_id.clone(), true);
            ctx.bus.emit(
                EventName::TaskStalled,
                json!({ "taskId": task_id }),
            );
        }

        // Forget closed tasks
        self.progress_seen
            .retain(|id, _| ctx.state.tasks.get(id).map(|t| t.is_open()).unwrap_or(false));
        self.stalled
            .retain(|id, _| ctx.state.tasks.get(id).map(|t| t.is_open()).unwrap_or(false));
        Ok(())
    }
}
