/// Runner: the outward-facing facade over the kernel
///
/// Builds the headless app, registers every subsystem in its rate bucket,
/// bridges bus events to observers and exposes the command, snapshot and
/// query surfaces. The binary calls `run()`; tests and embedders drive time
/// manually with `advance`.
use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::SimulationConfig;
use crate::observers::{ObserverEvent, ObserverHub, ObserverId};
use crate::persistence::SaveStore;
use crate::simulation::scheduler::SystemDescriptor;
use crate::simulation::{CommandQueue, Kernel, Rate, SchedulerStats, SimCommand, SimulationPlugin};
use crate::snapshot::{DeltaSnapshot, FullSnapshot, TickSnapshot};
use crate::systems;
use crate::world::types::EntityId;
use crate::world::WorldSeed;

/// Cloneable handle for enqueueing commands from other threads
#[derive(Clone)]
pub struct RunnerHandle {
    commands: Arc<Mutex<CommandQueue>>,
    observers: ObserverHub,
}

impl RunnerHandle {
    /// Enqueue a command; the oldest command is dropped (and reported) on
    /// overflow, so this never refuses input
    pub fn enqueue_command(&self, command: SimCommand) -> bool {
        let dropped = match self.commands.lock() {
            Ok(mut queue) => queue.push(command),
            Err(_) => {
                warn!("command queue poisoned, command discarded");
                return true;
            }
        };
        if let Some(dropped) = dropped {
            self.observers.emit(
                ObserverEvent::CommandDropped,
                &json!({ "dropped": format!("{:?}", dropped) }),
            );
        }
        true
    }

    /// Wire-format ingress: parse a JSON command and enqueue it. Unknown
    /// variants enqueue as the catch-all and are dropped at dispatch;
    /// malformed payloads are debug-logged and ignored.
    pub fn enqueue_json(&self, json: &str) -> bool {
        match serde_json::from_str::<SimCommand>(json) {
            Ok(command) => self.enqueue_command(command),
            Err(e) => {
                debug!("malformed command ignored: {}", e);
                true
            }
        }
    }

    pub fn on(
        &self,
        event: ObserverEvent,
        callback: impl Fn(&serde_json::Value) + Send + Sync + 'static,
    ) -> ObserverId {
        self.observers.on(event, callback)
    }

    pub fn off(&self, id: ObserverId) -> bool {
        self.observers.off(id)
    }
}

pub struct Runner {
    app: App,
    handle: RunnerHandle,
    initialized: bool,
}

impl Runner {
    pub fn new(config: SimulationConfig) -> Self {
        let observers = ObserverHub::new();
        let commands = Arc::new(Mutex::new(CommandQueue::new(
            config.scheduler.command_queue_limit,
        )));
        let log_filter = config.log_filter.clone();
        let kernel = Kernel::new(config, observers.clone(), commands.clone());

        let mut app = App::new();
        app.add_plugins(
            MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(
                1.0 / 60.0,
            ))),
        );
        app.add_plugins(bevy::log::LogPlugin {
            filter: log_filter,
            ..Default::default()
        });
        app.insert_non_send_resource(kernel);
        app.add_plugins(SimulationPlugin);

        Self {
            app,
            handle: RunnerHandle {
                commands,
                observers,
            },
            initialized: false,
        }
    }

    fn kernel_mut(&mut self) -> Mut<'_, Kernel> {
        self.app.world_mut().non_send_resource_mut::<Kernel>()
    }

    /// One-time setup: subsystem registration in bucket order, observer
    /// bridge, initial population
    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;

        let observers = self.handle.observers.clone();
        let mut kernel = self.kernel_mut();

        // FAST bucket: motion and continuous bookkeeping
        kernel.register_system(SystemDescriptor {
            name: "movement",
            rate: Rate::Fast,
            enabled: true,
            min_entities: None,
            system: Box::new(systems::movement::MovementSystem::new()),
        });
        kernel.register_system(SystemDescriptor {
            name: "needs",
            rate: Rate::Fast,
            enabled: true,
            min_entities: Some(1),
            system: Box::new(systems::needs::NeedsSystem::new()),
        });
        kernel.register_system(SystemDescriptor {
            name: "social",
            rate: Rate::Fast,
            enabled: true,
            min_entities: Some(2),
            system: Box::new(systems::social::SocialSystem::new()),
        });

        // MEDIUM bucket: decisions and cooperative work
        kernel.register_system(SystemDescriptor {
            name: "ai",
            rate: Rate::Medium,
            enabled: true,
            min_entities: Some(1),
            system: Box::new(systems::ai::AiSystem::new()),
        });
        kernel.register_system(SystemDescriptor {
            name: "combat",
            rate: Rate::Medium,
            enabled: true,
            min_entities: Some(2),
            system: Box::new(systems::combat::CombatSystem::new()),
        });
        kernel.register_system(SystemDescriptor {
            name: "interaction",
            rate: Rate::Medium,
            enabled: true,
            min_entities: Some(2),
            system: Box::new(systems::interaction::InteractionSystem::new()),
        });
        kernel.register_system(SystemDescriptor {
            name: "tasks",
            rate: Rate::Medium,
            enabled: true,
            min_entities: None,
            system: Box::new(systems::tasks::TaskSystem::new()),
        });
        kernel.register_system(SystemDescriptor {
            name: "building",
            rate: Rate::Medium,
            enabled: true,
            min_entities: None,
            system: Box::new(systems::building::BuildingSystem::new()),
        });
        kernel.register_system(SystemDescriptor {
            name: "production",
            rate: Rate::Medium,
            enabled: true,
            min_entities: Some(1),
            system: Box::new(systems::production::ProductionSystem::new()),
        });
        kernel.register_system(SystemDescriptor {
            name: "household",
            rate: Rate::Medium,
            enabled: true,
            min_entities: Some(1),
            system: Box::new(systems::household::HouseholdSystem::new()),
        });
        kernel.register_system(SystemDescriptor {
            name: "reservations",
            rate: Rate::Medium,
            enabled: true,
            min_entities: None,
            system: Box::new(systems::reservations::ReservationSystem::new()),
        });
        kernel.register_system(SystemDescriptor {
            name: "inventory",
            rate: Rate::Medium,
            enabled: true,
            min_entities: None,
            system: Box::new(systems::inventory::InventorySystem::new()),
        });
        kernel.register_system(SystemDescriptor {
            name: "reputation",
            rate: Rate::Medium,
            enabled: true,
            min_entities: Some(1),
            system: Box::new(systems::reputation::ReputationSystem::new()),
        });

        // SLOW bucket: long-horizon upkeep
        kernel.register_system(SystemDescriptor {
            name: "lifecycle",
            rate: Rate::Slow,
            enabled: true,
            min_entities: None,
            system: Box::new(systems::lifecycle::LifeCycleSystem::new()),
        });
        kernel.register_system(SystemDescriptor {
            name: "world_resources",
            rate: Rate::Slow,
            enabled: true,
            min_entities: None,
            system: Box::new(systems::world_resources::WorldResourceSystem::new()),
        });
        kernel.register_system(SystemDescriptor {
            name: "research",
            rate: Rate::Slow,
            enabled: true,
            min_entities: Some(1),
            system: Box::new(systems::research::ResearchSystem::new()),
        });
        kernel.register_system(SystemDescriptor {
            name: "emergence",
            rate: Rate::Slow,
            enabled: true,
            min_entities: Some(1),
            system: Box::new(systems::emergence::EmergenceSystem::new()),
        });
        kernel.register_system(SystemDescriptor {
            name: "governance",
            rate: Rate::Slow,
            enabled: true,
            min_entities: Some(2),
            system: Box::new(systems::governance::GovernanceSystem::new()),
        });

        // Bridge domain events out to observers once they flush
        kernel.bus.on_any(move |event| {
            observers.emit(
                ObserverEvent::SimEvent,
                &json!({ "event": event.name, "payload": &event.payload }),
            );
        });

        let population = kernel.config.initial_population;
        kernel.seed_population(population);
        info!("✅ Runner initialized");
    }

    /// Install terrain and seed resources and animals
    pub fn initialize_world_resources(&mut self, seed: &WorldSeed) {
        self.kernel_mut().initialize_world_resources(seed);
    }

    pub fn set_save_store(&mut self, store: Arc<dyn SaveStore>) {
        self.kernel_mut().set_save_store(store);
    }

    pub fn start(&mut self) {
        self.kernel_mut().start();
    }

    pub fn stop(&mut self) {
        self.kernel_mut().stop();
    }

    /// Blocking run loop for the binary
    pub fn run(mut self) {
        self.app.run();
    }

    /// Manual time stepping for tests and embedders
    pub fn advance(&mut self, wall_dt: Duration) {
        self.kernel_mut().step(wall_dt);
    }

    /// Advance `total` in fixed `step` increments
    pub fn advance_by(&mut self, total: Duration, step: Duration) {
        let mut remaining = total;
        while remaining > Duration::ZERO {
            let slice = remaining.min(step);
            self.advance(slice);
            remaining -= slice;
        }
    }

    // ------------------------------------------------------------------
    // Command and observer surface
    // ------------------------------------------------------------------

    pub fn handle(&self) -> RunnerHandle {
        self.handle.clone()
    }

    pub fn enqueue_command(&self, command: SimCommand) -> bool {
        self.handle.enqueue_command(command)
    }

    pub fn on(
        &self,
        event: ObserverEvent,
        callback: impl Fn(&serde_json::Value) + Send + Sync + 'static,
    ) -> ObserverId {
        self.handle.on(event, callback)
    }

    pub fn off(&self, id: ObserverId) -> bool {
        self.handle.off(id)
    }

    // ------------------------------------------------------------------
    // Snapshots and queries
    // ------------------------------------------------------------------

    pub fn initial_snapshot(&mut self) -> FullSnapshot {
        let mut kernel = self.kernel_mut();
        let kernel = &mut *kernel;
        kernel.snapshots.initial_snapshot(&mut kernel.state)
    }

    pub fn tick_snapshot(&mut self) -> TickSnapshot {
        let mut kernel = self.kernel_mut();
        let kernel = &mut *kernel;
        kernel.snapshots.tick_snapshot(&mut kernel.state)
    }

    pub fn delta_snapshot(&mut self, force_full: bool) -> DeltaSnapshot {
        let mut kernel = self.kernel_mut();
        let kernel = &mut *kernel;
        kernel.snapshots.delta_snapshot(&mut kernel.state, force_full)
    }

    pub fn entity_details(&mut self, id: &EntityId) -> Option<crate::simulation::EntityDetails> {
        self.kernel_mut().entity_details(id)
    }

    pub fn player_id(&mut self) -> Option<EntityId> {
        self.kernel_mut().state.player_id.clone()
    }

    pub fn stats(&mut self) -> SchedulerStats {
        self.kernel_mut().stats()
    }

    /// Direct kernel access for scenario tests
    pub fn with_kernel<R>(&mut self, f: impl FnOnce(&mut Kernel) -> R) -> R {
        let mut kernel = self.kernel_mut();
        f(&mut kernel)
    }
}
