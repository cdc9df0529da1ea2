/// Batched distance computation service
///
/// Proximity-heavy subsystems (combat with many attackers, social
/// reinforcement) hand a whole position batch to this service instead of
/// computing pairwise distances inline. The accelerated path fans chunks out
/// on the compute task pool; the scalar path performs the same per-element
/// arithmetic, so both produce identical results and callers never branch on
/// which one ran.
use bevy::prelude::*;
use bevy::tasks::{ComputeTaskPool, TaskPool};

/// Below this batch size the scalar path is always used
pub const ACCEL_MIN_BATCH: usize = 256;
const CHUNK_SIZE: usize = 1024;

#[derive(Debug, Clone)]
pub struct BatchCompute {
    accelerated: bool,
}

impl BatchCompute {
    /// Set up the service once; initializes the task pool when acceleration
    /// is requested and degrades to scalar-only when it is not.
    pub fn new(accelerated: bool) -> Self {
        if accelerated {
            ComputeTaskPool::get_or_init(TaskPool::new);
            info!("⚡ Batch compute service ready (accelerated)");
        } else {
            info!("⚙️ Batch compute service ready (scalar only)");
        }
        Self { accelerated }
    }

    pub fn is_accelerated(&self) -> bool {
        self.accelerated
    }

    /// Squared distances from `origin` to every entry of `positions`,
    /// in input order
    pub fn distances_squared(&self, origin: Vec2, positions: &[Vec2]) -> Vec<f32> {
        if self.accelerated && positions.len() >= ACCEL_MIN_BATCH {
            self.distances_squared_parallel(origin, positions)
        } else {
            distances_squared_scalar(origin, positions)
        }
    }

    fn distances_squared_parallel(&self, origin: Vec2, positions: &[Vec2]) -> Vec<f32> {
        let pool = ComputeTaskPool::get();
        let mut chunks: Vec<(usize, Vec<f32>)> = pool.scope(|scope| {
            for (chunk_index, chunk) in positions.chunks(CHUNK_SIZE).enumerate() {
                scope.spawn(async move { (chunk_index, distances_squared_scalar(origin, chunk)) });
            }
        });

        chunks.sort_by_key(|(index, _)| *index);
        let mut result = Vec::with_capacity(positions.len());
        for (_, chunk) in chunks {
            result.extend(chunk);
        }
        result
    }
}

fn distances_squared_scalar(origin: Vec2, positions: &[Vec2]) -> Vec<f32> {
    positions
        .iter()
        .map(|p| origin.distance_squared(*p))
        .collect()
}
