/// The simulation kernel
///
/// Owns the authoritative state, the indices, the event bus, the command
/// queue, the scheduler and the snapshot pipeline. One `step` advances the
/// scaled clock and runs every due rate fire as pre-tick, bucket, post-tick.
use bevy::prelude::*;
use serde::Serialize;
use serde_json::json;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::SeedableRng;

use crate::compute::BatchCompute;
use crate::config::SimulationConfig;
use crate::errors::{SystemError, SystemResult};
use crate::events::EventBus;
use crate::indices::{EntityIndex, SharedSpatialIndex, REBUILD_EVERY_FAST_TICKS};
use crate::observers::{ObserverEvent, ObserverHub};
use crate::persistence::{SaveBlob, SaveReceipt, SaveStore};
use crate::snapshot::SnapshotPipeline;
use crate::systems::SimContext;
use crate::world::ai::AiState;
use crate::world::inventory::Inventory;
use crate::world::loader;
use crate::world::types::{Agent, AgentProfile, EntityId, EntityRecord, Needs, Role};
use crate::world::{SimRng, WorldSeed, WorldState};

use super::commands::{self, CommandQueue, KernelDirective, SimCommand};
use super::scheduler::{
    Rate, SchedulerStats, SystemDescriptor, SystemRegistry, TickScheduler,
};
use super::tick::{SimClock, TickMetrics};

/// Detail view returned for one entity on request
#[derive(Debug, Clone, Serialize)]
pub struct EntityDetails {
    pub entity: EntityRecord,
    pub agent: Option<Agent>,
    pub needs: Option<Needs>,
    pub role: Option<Role>,
    pub inventory: Option<Inventory>,
    pub reputation: f32,
    pub relationship_count: usize,
    pub ai: Option<AiState>,
}

pub struct Kernel {
    pub config: SimulationConfig,
    pub clock: SimClock,
    pub state: WorldState,
    pub index: EntityIndex,
    pub spatial: SharedSpatialIndex,
    pub bus: EventBus,
    registry: SystemRegistry,
    pub scheduler: TickScheduler,
    commands: Arc<Mutex<CommandQueue>>,
    pub snapshots: SnapshotPipeline,
    pub rng: SimRng,
    pub compute: BatchCompute,
    metrics: TickMetrics,
    observers: ObserverHub,

    rebuilding: bool,
    last_rebuild_tick: u64,

    save_store: Option<Arc<dyn SaveStore>>,
    last_autosave: f64,
    runtime: Option<tokio::runtime::Runtime>,
    receipt_tx: Sender<Result<SaveReceipt, String>>,
    receipt_rx: Receiver<Result<SaveReceipt, String>>,
    saves_requested: u64,
    saves_completed: u64,
}

impl Kernel {
    pub fn new(
        config: SimulationConfig,
        observers: ObserverHub,
        commands: Arc<Mutex<CommandQueue>>,
    ) -> Self {
        let compute = BatchCompute::new(config.accelerated_compute);
        let snapshots =
            SnapshotPipeline::new(config.snapshot_throttle_ms, observers.tick_observer_count());
        let scheduler = TickScheduler::new(
            config.scheduler.fast_ms,
            config.scheduler.medium_ms,
            config.scheduler.slow_ms,
        );
        let mut state = WorldState::new(config.seed);
        state.day_length = config.day_length;
        let (receipt_tx, receipt_rx) = mpsc::channel();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("persistence")
            .build()
            .map_err(|e| {
                warn!("persistence runtime unavailable, saves run inline: {}", e);
                e
            })
            .ok();

        Self {
            rng: SimRng::seed_from_u64(config.seed),
            state,
            config,
            clock: SimClock::default(),
            index: EntityIndex::new(),
            spatial: SharedSpatialIndex::new(),
            bus: EventBus::new(),
            registry: SystemRegistry::default(),
            scheduler,
            commands,
            snapshots,
            compute,
            metrics: TickMetrics::default(),
            observers,
            rebuilding: false,
            last_rebuild_tick: 0,
            save_store: None,
            last_autosave: 0.0,
            runtime,
            receipt_tx,
            receipt_rx,
            saves_requested: 0,
            saves_completed: 0,
        }
    }

    // ------------------------------------------------------------------
    // Wiring
    // ------------------------------------------------------------------

    pub fn register_system(&mut self, descriptor: SystemDescriptor) {
        self.registry.register(descriptor);
    }

    pub fn set_system_enabled(&mut self, name: &str, enabled: bool) -> bool {
        self.registry.set_enabled(name, enabled)
    }

    pub fn set_save_store(&mut self, store: Arc<dyn SaveStore>) {
        self.save_store = Some(store);
    }

    pub fn observers(&self) -> &ObserverHub {
        &self.observers
    }

    /// Terrain intake plus resource and animal seeding
    pub fn initialize_world_resources(&mut self, seed: &WorldSeed) {
        loader::initialize_world(&mut self.state, seed, &mut self.rng);
        self.snapshots.invalidate_statics();
        self.rebuild_indices();
    }

    /// Spawn the starting population, including the off-duty player agent
    pub fn seed_population(&mut self, count: usize) {
        let now = self.clock.sim_time;
        let center = Vec2::new(self.state.terrain.width / 2.0, self.state.terrain.height / 2.0);

        if self.state.player_id.is_none() {
            let player_id = self.state.spawn_agent(
                AgentProfile {
                    name: Some("Player".to_string()),
                    position: Some(center),
                    immortal: true,
                    ..AgentProfile::default()
                },
                now,
            );
            if let Some(ai) = self.state.ai.get_mut(&player_id) {
                ai.off_duty = true;
            }
            self.state.player_id = Some(player_id);
        }

        use rand::Rng;
        for _ in 0..count {
            let offset = Vec2::new(
                self.rng.gen_range(-60.0..60.0),
                self.rng.gen_range(-60.0..60.0),
            );
            let position = self.state.terrain.clamp_to_bounds(center + offset);
            self.state.spawn_agent(
                AgentProfile {
                    position: Some(position),
                    ..AgentProfile::default()
                },
                now,
            );
        }
        self.rebuild_indices();
        info!("👥 Seeded {} settlers (population {})", count, self.state.population());
    }

    pub fn start(&mut self) {
        self.scheduler.start(self.clock.sim_time);
        info!("▶️ Scheduler started at t={:.2}s", self.clock.sim_time);
    }

    pub fn stop(&mut self) {
        self.scheduler.stop();
        self.snapshots.shutdown();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        info!("⏹️ Scheduler stopped at tick {}", self.state.tick);
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats::collect(&self.scheduler, &self.registry)
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// Advance by one wall-clock delta, running every due rate fire
    pub fn step(&mut self, wall_dt: Duration) {
        if !self.scheduler.is_running() {
            self.poll_async();
            return;
        }
        self.clock.advance(wall_dt);
        self.state.sim_time = self.clock.sim_time;

        let fires = self.scheduler.due_fires(self.clock.sim_time);
        for fire in fires {
            self.metrics.start_tick();
            match self.pre_tick(fire.rate) {
                Ok(()) => {
                    self.run_bucket(fire.rate, fire.dt);
                    if let Err(e) = self.post_tick(fire.rate) {
                        error!("post-tick failed after {:?} fire: {}", fire.rate, e);
                    }
                }
                Err(e) => {
                    error!("pre-tick failed, {:?} fire aborted: {}", fire.rate, e);
                }
            }
            self.metrics.end_tick();
        }
        self.poll_async();
    }

    fn context(&mut self) -> SimContext<'_> {
        SimContext {
            state: &mut self.state,
            index: &self.index,
            spatial: &self.spatial,
            bus: &mut self.bus,
            rng: &mut self.rng,
            compute: &self.compute,
            config: &self.config,
        }
    }

    fn pre_tick(&mut self, rate: Rate) -> SystemResult {
        if rate == Rate::Fast {
            self.state.tick += 1;
        }
        if rate == Rate::Slow {
            self.state.cycles += 1;
        }

        // Commands apply before any subsystem observes the tick
        let drained: Vec<SimCommand> = self
            .commands
            .lock()
            .map_err(|_| SystemError::infrastructure("command queue poisoned"))?
            .drain();
        if !drained.is_empty() {
            let mut directives: Vec<KernelDirective> = Vec::new();
            {
                let mut ctx = self.context();
                for command in drained {
                    if let Some(directive) = commands::dispatch(&mut ctx, command) {
                        directives.push(directive);
                    }
                }
            }
            for directive in directives {
                match directive {
                    KernelDirective::SetTimeScale(multiplier) => {
                        self.clock.set_time_scale(multiplier);
                        info!("⏩ Time scale set to {:.1}x", multiplier);
                    }
                    KernelDirective::SaveGame => self.trigger_save("command"),
                }
            }
        }

        // Index refresh on cadence or when movement invalidated the grid
        if rate == Rate::Fast {
            let due = self.last_rebuild_tick == 0
                || self.state.tick - self.last_rebuild_tick >= REBUILD_EVERY_FAST_TICKS
                || self.spatial.is_dirty(&self.state);
            if due {
                self.rebuild_indices();
            }
        }
        Ok(())
    }

    /// Guarded, coalescing index rebuild
    fn rebuild_indices(&mut self) {
        if self.rebuilding {
            return;
        }
        self.rebuilding = true;
        EntityIndex::sync_agents_to_entities(&mut self.state);
        self.index.rebuild(&self.state);
        self.spatial.rebuild(&self.state);
        self.last_rebuild_tick = self.state.tick.max(1);
        self.rebuilding = false;
    }

    fn run_bucket(&mut self, rate: Rate, dt: f32) {
        let mut registry = std::mem::take(&mut self.registry);
        let entity_count = self.state.entity_count();

        for entry in registry.bucket_mut(rate) {
            if !entry.enabled {
                continue;
            }
            if let Some(min) = entry.min_entities {
                if entity_count < min {
                    continue;
                }
            }

            let started = Instant::now();
            let result = {
                let mut ctx = SimContext {
                    state: &mut self.state,
                    index: &self.index,
                    spatial: &self.spatial,
                    bus: &mut self.bus,
                    rng: &mut self.rng,
                    compute: &self.compute,
                    config: &self.config,
                };
                entry.system.update(&mut ctx, dt)
            };
            entry.stats.runs += 1;
            entry.stats.last_duration = started.elapsed();
            match result {
                Ok(()) => entry.stats.last_error = None,
                Err(e) => {
                    entry.stats.failures += 1;
                    entry.stats.last_error = Some(e.to_string());
                    error!("⚠️ system '{}' failed, continuing: {}", entry.name, e);
                }
            }
        }

        self.registry = registry;
    }

    fn post_tick(&mut self, rate: Rate) -> SystemResult {
        // Deliver this tick's events before the next tick's commands
        self.bus.flush();

        let now = self.clock.sim_time;
        self.snapshots.maybe_publish(&mut self.state, now);

        if rate == Rate::Slow
            && self.save_store.is_some()
            && now - self.last_autosave >= self.config.autosave_secs
        {
            self.last_autosave = now;
            self.trigger_save("autosave");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Fire-and-forget save; completion never gates a tick
    pub fn trigger_save(&mut self, reason: &str) {
        let Some(store) = self.save_store.clone() else {
            debug!("save requested ({}) but no store is wired", reason);
            return;
        };
        let blob = SaveBlob::capture(&self.state);
        let tx = self.receipt_tx.clone();
        self.saves_requested += 1;
        info!("💾 Save requested ({})", reason);

        match &self.runtime {
            Some(runtime) => {
                runtime.spawn_blocking(move || {
                    let result = store.save(&blob).map_err(|e| e.to_string());
                    let _ = tx.send(result);
                });
            }
            None => {
                let result = store.save(&blob).map_err(|e| e.to_string());
                let _ = tx.send(result);
            }
        }
    }

    /// Drain worker output and save receipts back onto the sim thread
    fn poll_async(&mut self) {
        for (kind, value) in self.snapshots.poll_serialized() {
            let payload = json!({ "kind": kind.as_str(), "snapshot": value });
            self.observers.emit(ObserverEvent::Tick, &payload);
        }
        while let Ok(result) = self.receipt_rx.try_recv() {
            match result {
                Ok(receipt) => {
                    self.saves_completed += 1;
                    info!("💾 Saved {} ({} bytes)", receipt.save_id, receipt.size_bytes);
                }
                Err(e) => warn!("save failed, retrying next autosave: {}", e),
            }
        }
    }

    pub fn saves_requested(&self) -> u64 {
        self.saves_requested
    }

    pub fn saves_completed(&self) -> u64 {
        self.saves_completed
    }

    /// Block briefly until in-flight saves land, used on shutdown and by
    /// scenario tests
    pub fn drain_saves(&mut self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while self.saves_completed < self.saves_requested && Instant::now() < deadline {
            self.poll_async();
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn entity_details(&self, id: &EntityId) -> Option<EntityDetails> {
        let entity = self.state.entities.get(id)?.clone();
        let agent = self.state.agents.get(id).cloned();
        Some(EntityDetails {
            needs: self.state.needs.get(id).copied(),
            role: agent.as_ref().map(|a| a.role),
            inventory: self.state.inventories.get(id).cloned(),
            reputation: self.state.social.reputation_value(id),
            relationship_count: self.state.social.neighbors(id).count(),
            ai: self.state.ai.get(id).cloned(),
            entity,
            agent,
        })
    }

}

impl Drop for Kernel {
    fn drop(&mut self) {
        self.snapshots.shutdown();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
