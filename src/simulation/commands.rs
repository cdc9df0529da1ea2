/// Command queue and dispatch
///
/// External callers enqueue typed commands at any time; the kernel drains
/// the queue at the start of each tick, before any subsystem runs, so a
/// command issued at tick T is visible to every update in tick T. The queue
/// is bounded; overflow drops the oldest entry and reports it.
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::systems::{self, SimContext};
use crate::world::types::{
    AgentProfile, EntityId, NeedKind, NodeKind, ResourceKind,
};

pub const TIME_SCALE_MIN: f32 = 0.1;
pub const TIME_SCALE_MAX: f32 = 10.0;

// ============================================================================
// COMMAND TAXONOMY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "command")]
pub enum AgentCommand {
    MoveTo { x: f32, y: f32 },
    StopMovement,
    /// Unrecognized wire variant; dispatched as a logged no-op
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "command")]
pub enum AnimalCommand {
    Spawn { species: String, x: f32, y: f32 },
    Cull { entity_id: EntityId },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "command")]
pub enum SocialCommand {
    ProposeMarriage { from: EntityId, to: EntityId },
    AcceptProposal { from: EntityId, to: EntityId },
    InitiateDivorce { agent_id: EntityId },
    AdjustAffinity { a: EntityId, b: EntityId, delta: f32 },
    ImposeTruce { a: EntityId, b: EntityId, duration_secs: f64 },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "command")]
pub enum ResearchCommand {
    AddPoints { points: f32 },
    ForceUnlock { id: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "command")]
pub enum WorldResourceCommand {
    SpawnNode { kind: NodeKind, x: f32, y: f32 },
    DepleteNode { node_id: EntityId },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "command")]
pub enum DialogueCommand {
    StartChat { a: EntityId, b: EntityId },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "command")]
pub enum BuildingCommand {
    EnqueueConstruction { label: String },
    Repair { zone_id: EntityId, perfect: bool },
    Demolish { zone_id: EntityId },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "command")]
pub enum TaskCommand {
    Create {
        kind: String,
        required_work: f32,
        wood: u32,
        stone: u32,
    },
    Cancel { task_id: EntityId },
    Contribute {
        task_id: EntityId,
        agent_id: EntityId,
        amount: f32,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "command")]
pub enum TimeCommand {
    SetTimeOfDay { hour: f32 },
    SetDayLength { seconds: f64 },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "command")]
pub enum RecipeCommand {
    CraftWeapon { agent_id: EntityId, weapon_id: String },
    #[serde(other)]
    Unknown,
}

/// Wire-format command: a tagged variant with a typed payload. Unknown
/// variants deserialize into the catch-all and are dropped at dispatch
/// with a debug log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum SimCommand {
    SetTimeScale {
        multiplier: f32,
    },
    ApplyResourceDelta {
        deltas: HashMap<ResourceKind, i64>,
    },
    GatherResource {
        resource_id: EntityId,
        amount: u32,
    },
    GiveResource {
        agent_id: EntityId,
        resource: ResourceKind,
        amount: u32,
    },
    SpawnAgent {
        profile: AgentProfile,
    },
    KillAgent {
        agent_id: EntityId,
    },
    AgentCommand {
        agent_id: EntityId,
        #[serde(flatten)]
        command: AgentCommand,
    },
    AnimalCommand {
        #[serde(flatten)]
        command: AnimalCommand,
    },
    NeedsCommand {
        agent_id: EntityId,
        need: NeedKind,
        value: f32,
    },
    RecipeCommand {
        #[serde(flatten)]
        command: RecipeCommand,
    },
    SocialCommand {
        #[serde(flatten)]
        command: SocialCommand,
    },
    ResearchCommand {
        #[serde(flatten)]
        command: ResearchCommand,
    },
    WorldResourceCommand {
        #[serde(flatten)]
        command: WorldResourceCommand,
    },
    DialogueCommand {
        #[serde(flatten)]
        command: DialogueCommand,
    },
    BuildingCommand {
        #[serde(flatten)]
        command: BuildingCommand,
    },
    ReputationCommand {
        agent_id: EntityId,
        delta: f32,
        reason: String,
    },
    TaskCommand {
        #[serde(flatten)]
        command: TaskCommand,
    },
    TimeCommand {
        #[serde(flatten)]
        command: TimeCommand,
    },
    ForceEmergenceEvaluation,
    SaveGame,
    Ping,
    /// Unrecognized wire variant; dispatched as a logged no-op
    #[serde(other)]
    Unknown,
}

/// Effects a command has on the kernel itself rather than the world state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelDirective {
    SetTimeScale(f32),
    SaveGame,
}

// ============================================================================
// QUEUE
// ============================================================================

/// Bounded FIFO with drop-oldest overflow
#[derive(Debug)]
pub struct CommandQueue {
    queue: VecDeque<SimCommand>,
    limit: usize,
    dropped_total: u64,
}

impl CommandQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(limit.min(256)),
            limit: limit.max(1),
            dropped_total: 0,
        }
    }

    /// Enqueue always succeeds; when the queue is full the oldest command
    /// is dropped and returned so the caller can report it
    pub fn push(&mut self, command: SimCommand) -> Option<SimCommand> {
        let dropped = if self.queue.len() >= self.limit {
            self.dropped_total += 1;
            self.queue.pop_front()
        } else {
            None
        };
        self.queue.push_back(command);
        dropped
    }

    pub fn drain(&mut self) -> Vec<SimCommand> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }
}

// ============================================================================
// DISPATCH
// ============================================================================

/// Route one command to its subsystem operation. Missing references and
/// out-of-range payloads are debug-logged no-ops; the returned directive
/// covers the few commands that act on the kernel instead of the state.
pub fn dispatch(ctx: &mut SimContext<'_>, command: SimCommand) -> Option<KernelDirective> {
    match command {
        SimCommand::SetTimeScale { multiplier } => {
            let clamped = multiplier.clamp(TIME_SCALE_MIN, TIME_SCALE_MAX);
            return Some(KernelDirective::SetTimeScale(clamped));
        }
        SimCommand::ApplyResourceDelta { deltas } => {
            for (resource, delta) in deltas {
                if delta >= 0 {
                    ctx.state.add_global_resource(resource, delta as u32);
                } else {
                    ctx.state.take_global_resource(resource, (-delta) as u32);
                }
            }
        }
        SimCommand::GatherResource { resource_id, amount } => {
            systems::world_resources::gather_node(ctx, &resource_id, amount, None);
        }
        SimCommand::GiveResource {
            agent_id,
            resource,
            amount,
        } => match ctx.state.inventories.get_mut(&agent_id) {
            Some(inventory) => {
                if !inventory.add(resource, amount) {
                    debug!("GIVE_RESOURCE overflow for {}", agent_id);
                }
            }
            None => debug!("GIVE_RESOURCE for unknown agent {}", agent_id),
        },
        SimCommand::SpawnAgent { profile } => {
            systems::lifecycle::spawn_agent(ctx, profile);
        }
        SimCommand::KillAgent { agent_id } => {
            systems::lifecycle::kill_agent(ctx, &agent_id);
        }
        SimCommand::AgentCommand { agent_id, command } => match command {
            AgentCommand::MoveTo { x, y } => {
                systems::movement::order_move(ctx.state, &agent_id, Vec2::new(x, y));
            }
            AgentCommand::StopMovement => {
                systems::movement::stop_movement(ctx.state, &agent_id);
            }
            AgentCommand::Unknown => debug!("unknown AGENT_COMMAND ignored"),
        },
        SimCommand::AnimalCommand { command } => match command {
            AnimalCommand::Spawn { species, x, y } => {
                ctx.state.spawn_animal(&species, Vec2::new(x, y));
            }
            AnimalCommand::Cull { entity_id } => {
                systems::lifecycle::cull_animal(ctx, &entity_id);
            }
            AnimalCommand::Unknown => debug!("unknown ANIMAL_COMMAND ignored"),
        },
        SimCommand::NeedsCommand {
            agent_id,
            need,
            value,
        } => match ctx.state.needs.get_mut(&agent_id) {
            Some(needs) => needs.set(need, value),
            None => debug!("NEEDS_COMMAND for unknown agent {}", agent_id),
        },
        SimCommand::RecipeCommand { command } => match command {
            RecipeCommand::CraftWeapon {
                agent_id,
                weapon_id,
            } => {
                systems::combat::craft_weapon(ctx, &agent_id, &weapon_id);
            }
            RecipeCommand::Unknown => debug!("unknown RECIPE_COMMAND ignored"),
        },
        SimCommand::SocialCommand { command } => match command {
            SocialCommand::ProposeMarriage { from, to } => {
                systems::social::propose_marriage(ctx, &from, &to);
            }
            SocialCommand::AcceptProposal { from, to } => {
                systems::social::accept_proposal(ctx, &from, &to);
            }
            SocialCommand::InitiateDivorce { agent_id } => {
                systems::social::initiate_divorce(ctx, &agent_id);
            }
            SocialCommand::AdjustAffinity { a, b, delta } => {
                systems::social::adjust_affinity(ctx, &a, &b, delta);
            }
            SocialCommand::ImposeTruce { a, b, duration_secs } => {
                let now = ctx.now();
                ctx.state.social.impose_truce(&a, &b, now, duration_secs.max(0.0));
            }
            SocialCommand::Unknown => debug!("unknown SOCIAL_COMMAND ignored"),
        },
        SimCommand::ResearchCommand { command } => match command {
            ResearchCommand::AddPoints { points } => {
                systems::research::add_points(ctx, points);
            }
            ResearchCommand::ForceUnlock { id } => {
                systems::research::force_unlock(ctx, &id);
            }
            ResearchCommand::Unknown => debug!("unknown RESEARCH_COMMAND ignored"),
        },
        SimCommand::WorldResourceCommand { command } => match command {
            WorldResourceCommand::SpawnNode { kind, x, y } => {
                crate::world::loader::spawn_node(ctx.state, kind, Vec2::new(x, y));
            }
            WorldResourceCommand::DepleteNode { node_id } => {
                systems::world_resources::deplete_node(ctx, &node_id);
            }
            WorldResourceCommand::Unknown => {
                debug!("unknown WORLD_RESOURCE_COMMAND ignored")
            }
        },
        SimCommand::DialogueCommand { command } => match command {
            DialogueCommand::StartChat { a, b } => {
                systems::interaction::start_chat(ctx, &a, &b);
            }
            DialogueCommand::Unknown => debug!("unknown DIALOGUE_COMMAND ignored"),
        },
        SimCommand::BuildingCommand { command } => match command {
            BuildingCommand::EnqueueConstruction { label } => {
                systems::building::try_schedule_construction(ctx, &label);
            }
            BuildingCommand::Repair { zone_id, perfect } => {
                systems::building::repair_building(ctx, &zone_id, perfect);
            }
            BuildingCommand::Demolish { zone_id } => {
                systems::building::demolish(ctx, &zone_id);
            }
            BuildingCommand::Unknown => debug!("unknown BUILDING_COMMAND ignored"),
        },
        SimCommand::ReputationCommand {
            agent_id,
            delta,
            reason,
        } => {
            systems::reputation::update_reputation(ctx, &agent_id, delta, &reason);
        }
        SimCommand::TaskCommand { command } => match command {
            TaskCommand::Create {
                kind,
                required_work,
                wood,
                stone,
            } => {
                systems::tasks::create_task(ctx, &kind, required_work, wood, stone, None);
            }
            TaskCommand::Cancel { task_id } => {
                systems::tasks::cancel_task(ctx, &task_id);
            }
            TaskCommand::Contribute {
                task_id,
                agent_id,
                amount,
            } => {
                systems::tasks::contribute(ctx, &task_id, &agent_id, amount);
            }
            TaskCommand::Unknown => debug!("unknown TASK_COMMAND ignored"),
        },
        SimCommand::TimeCommand { command } => match command {
            TimeCommand::SetTimeOfDay { hour } => {
                ctx.state.set_time_of_day(hour);
            }
            TimeCommand::SetDayLength { seconds } => {
                if seconds > 0.0 {
                    ctx.state.day_length = seconds;
                } else {
                    debug!("TIME_COMMAND with non-positive day length ignored");
                }
            }
            TimeCommand::Unknown => debug!("unknown TIME_COMMAND ignored"),
        },
        SimCommand::ForceEmergenceEvaluation => {
            ctx.state.force_emergence_scan = true;
        }
        SimCommand::SaveGame => return Some(KernelDirective::SaveGame),
        SimCommand::Ping => {
            debug!("PING at tick {}", ctx.state.tick);
        }
        SimCommand::Unknown => {
            debug!("unknown command type ignored");
        }
    }
    None
}
