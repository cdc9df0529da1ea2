/// Core simulation: scheduler, command surface, kernel and tick plumbing
///
/// The kernel lives in the Bevy world as a non-send resource; the plugin
/// installs the driver that advances it from the app's run loop and a
/// periodic metrics report.
use bevy::prelude::*;

pub mod commands;
pub mod kernel;
pub mod scheduler;
pub mod tick;

pub use commands::{CommandQueue, KernelDirective, SimCommand};
pub use kernel::{EntityDetails, Kernel};
pub use scheduler::{Rate, SchedulerStats, SystemDescriptor, SystemRegistry, TickScheduler};
pub use tick::{SimClock, TickMetrics};

const METRICS_LOG_INTERVAL_SECS: f32 = 30.0;

/// Plugin that advances the kernel from the app's outer loop
pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        info!("🔌 SimulationPlugin: installing kernel driver");
        app.add_systems(Update, (drive_kernel, log_kernel_metrics).chain());
    }
}

/// Advance the kernel by this frame's wall delta
fn drive_kernel(mut kernel: NonSendMut<Kernel>, time: Res<Time>) {
    kernel.step(time.delta());
}

/// Periodic one-line health report
fn log_kernel_metrics(
    kernel: NonSend<Kernel>,
    time: Res<Time>,
    mut accumulated: Local<f32>,
) {
    *accumulated += time.delta_secs();
    if *accumulated < METRICS_LOG_INTERVAL_SECS {
        return;
    }
    *accumulated = 0.0;

    let stats = kernel.stats();
    info!(
        "🎯 tick {} | population {} | fires {:?} | queued events {}",
        kernel.state.tick,
        kernel.state.population(),
        stats.ticks_per_rate,
        kernel.bus.queue_size(),
    );
}
