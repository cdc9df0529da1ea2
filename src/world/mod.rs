/// Authoritative world model: state record, domain types and bootstrap
pub mod ai;
pub mod inventory;
pub mod loader;
pub mod social;
pub mod state;
pub mod terrain;
pub mod types;

pub use state::{Section, WorldState};
pub use terrain::WorldSeed;
pub use types::EntityId;

/// Deterministic RNG used across the kernel, seeded from the world seed
pub type SimRng = rand_pcg::Pcg64;
