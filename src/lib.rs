pub mod compute;
pub mod config;
pub mod errors;
pub mod events;
pub mod indices;
pub mod observers;
pub mod persistence;
pub mod runner;
pub mod simulation;
pub mod snapshot;
pub mod systems;
pub mod world;

pub use config::SimulationConfig;
pub use runner::{Runner, RunnerHandle};
pub use simulation::{Kernel, Rate, SimCommand};
pub use world::{EntityId, WorldSeed, WorldState};
