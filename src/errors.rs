//! Common error types for the simulator kernel
//!
//! Expected failure modes travel as `Result`s or booleans; the scheduler is
//! the boundary where subsystem errors are logged and swallowed so one bad
//! update never stops the tick loop.

use thiserror::Error;

use crate::world::types::EntityId;

/// Failure raised by a subsystem update or tick hook
#[derive(Debug, Clone, Error)]
pub enum SystemError {
    /// Malformed command payload or out-of-range parameter
    #[error("validation: {0}")]
    Validation(String),

    /// Inventory overflow, insufficient supply, stockpile full
    #[error("capacity: {0}")]
    Capacity(String),

    /// A command or operation named something that does not exist
    #[error("missing reference: {0}")]
    MissingRef(EntityId),

    /// Degraded infrastructure (worker gone, store unavailable)
    #[error("infrastructure: {0}")]
    Infrastructure(String),

    /// Core invariant violated; the system self-heals on the next rebuild
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("{0}")]
    Other(String),
}

impl SystemError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn capacity(msg: impl Into<String>) -> Self {
        Self::Capacity(msg.into())
    }

    pub fn infrastructure(msg: impl Into<String>) -> Self {
        Self::Infrastructure(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }
}

/// Persistence collaborator failures; autosave retries on the next cadence
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store rejected blob: {0}")]
    Store(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type SystemResult = Result<(), SystemError>;
