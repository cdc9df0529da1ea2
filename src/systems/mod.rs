/// Subsystem framework
///
/// Each subsystem is a plain struct owning its private timers and caches.
/// The scheduler hands it a `SimContext` borrowing the authoritative state,
/// the read-only indices, the event bus and the kernel RNG for the duration
/// of one update. Subsystems never hold references to each other; anything
/// cross-cutting goes through `WorldState` or events.
pub mod ai;
pub mod building;
pub mod combat;
pub mod emergence;
pub mod governance;
pub mod household;
pub mod interaction;
pub mod inventory;
pub mod lifecycle;
pub mod movement;
pub mod needs;
pub mod production;
pub mod reputation;
pub mod research;
pub mod reservations;
pub mod social;
pub mod tasks;
pub mod world_resources;

use crate::compute::BatchCompute;
use crate::config::SimulationConfig;
use crate::errors::SystemResult;
use crate::events::EventBus;
use crate::indices::{EntityIndex, SharedSpatialIndex};
use crate::world::{SimRng, WorldState};

/// Borrowed view of the kernel handed to a subsystem for one update
pub struct SimContext<'a> {
    pub state: &'a mut WorldState,
    pub index: &'a EntityIndex,
    pub spatial: &'a SharedSpatialIndex,
    pub bus: &'a mut EventBus,
    pub rng: &'a mut SimRng,
    pub compute: &'a BatchCompute,
    pub config: &'a SimulationConfig,
}

impl SimContext<'_> {
    /// Scaled simulation seconds since start
    pub fn now(&self) -> f64 {
        self.state.sim_time
    }
}

pub trait Subsystem: Send {
    fn update(&mut self, ctx: &mut SimContext<'_>, dt: f32) -> SystemResult;
}

#[cfg(test)]
pub mod testutil {
    //! Shared scaffolding for subsystem unit tests

    use super::*;
    use rand::SeedableRng;

    /// Everything a subsystem test needs, owned in one bundle
    pub struct TestBed {
        pub state: WorldState,
        pub index: EntityIndex,
        pub spatial: SharedSpatialIndex,
        pub bus: EventBus,
        pub rng: SimRng,
        pub compute: BatchCompute,
        pub config: SimulationConfig,
        delivered: std::sync::Arc<std::sync::Mutex<Vec<crate::events::SimEvent>>>,
    }

    impl TestBed {
        pub fn new() -> Self {
            Self::with_config(SimulationConfig::default())
        }

        pub fn with_config(config: SimulationConfig) -> Self {
            let delivered = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
            let sink = delivered.clone();
            let mut bus = EventBus::new();
            bus.on_any(move |event| {
                sink.lock().unwrap().push(event.clone());
            });
            Self {
                state: WorldState::new(config.seed),
                index: EntityIndex::new(),
                spatial: SharedSpatialIndex::new(),
                bus,
                rng: SimRng::seed_from_u64(config.seed),
                compute: BatchCompute::new(false),
                config,
                delivered,
            }
        }

        /// Refresh both indices from the current state
        pub fn reindex(&mut self) {
            EntityIndex::sync_agents_to_entities(&mut self.state);
            self.index.rebuild(&self.state);
            self.spatial.rebuild(&self.state);
        }

        pub fn ctx(&mut self) -> SimContext<'_> {
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

        /// Run one subsystem update, panicking on subsystem error
        pub fn run(&mut self, system: &mut dyn Subsystem, dt: f32) {
            let mut ctx = self.ctx();
            system.update(&mut ctx, dt).expect("subsystem update failed");
        }

        /// Advance sim time without running anything
        pub fn advance_time(&mut self, seconds: f64) {
            self.state.sim_time += seconds;
        }

        /// Flush the bus and drain everything delivered so far
        pub fn flush_events(&mut self) -> Vec<crate::events::SimEvent> {
            self.bus.flush();
            std::mem::take(&mut *self.delivered.lock().unwrap())
        }
    }
}
