/// Multi-rate scheduler: rate buckets, cadence accumulators and the
/// subsystem registry
///
/// Three cadences (FAST 50 ms, MEDIUM 250 ms, SLOW 1000 ms by default) fire
/// against scaled simulation time. Each fire computes the delta since the
/// previous fire at that rate; the kernel wraps every fire in its pre/post
/// hooks. Within a bucket, systems run in registration order.
use std::time::Duration;

use serde::Serialize;

use crate::systems::Subsystem;

// ============================================================================
// RATES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rate {
    Fast,
    Medium,
    Slow,
}

impl Rate {
    pub const ALL: [Rate; 3] = [Rate::Fast, Rate::Medium, Rate::Slow];

    pub fn index(&self) -> usize {
        match self {
            Rate::Fast => 0,
            Rate::Medium => 1,
            Rate::Slow => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rate::Fast => "fast",
            Rate::Medium => "medium",
            Rate::Slow => "slow",
        }
    }
}

// ============================================================================
// CADENCES
// ============================================================================

#[derive(Debug, Clone)]
struct RateCadence {
    period: f64,
    next_due: f64,
    last_fire: Option<f64>,
    fires: u64,
}

impl RateCadence {
    fn new(period: f64) -> Self {
        Self {
            period,
            next_due: 0.0,
            last_fire: None,
            fires: 0,
        }
    }
}

/// One scheduled rate fire with its delta in seconds
#[derive(Debug, Clone, Copy)]
pub struct RateFire {
    pub rate: Rate,
    pub dt: f32,
}

/// Cadence bookkeeping for the three rates
#[derive(Debug, Clone)]
pub struct TickScheduler {
    cadences: [RateCadence; 3],
    running: bool,
    /// Fires allowed per rate per step before missed fires are dropped
    catch_up_cap: u32,
}

impl TickScheduler {
    pub fn new(fast_ms: u64, medium_ms: u64, slow_ms: u64) -> Self {
        Self {
            cadences: [
                RateCadence::new(fast_ms as f64 / 1000.0),
                RateCadence::new(medium_ms as f64 / 1000.0),
                RateCadence::new(slow_ms as f64 / 1000.0),
            ],
            running: false,
            catch_up_cap: 4,
        }
    }

    /// Arm all three cadences; the first step after `start` fires every rate
    pub fn start(&mut self, now: f64) {
        for cadence in &mut self.cadences {
            cadence.next_due = now;
        }
        self.running = true;
    }

    /// Halt future fires; an in-flight fire completes but nothing new is due
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn fires_for(&self, rate: Rate) -> u64 {
        self.cadences[rate.index()].fires
    }

    pub fn period_secs(&self, rate: Rate) -> f64 {
        self.cadences[rate.index()].period
    }

    /// All fires due at `now`, FAST before MEDIUM before SLOW. Missed fires
    /// beyond the catch-up cap are dropped so a long stall cannot spiral.
    pub fn due_fires(&mut self, now: f64) -> Vec<RateFire> {
        if !self.running {
            return Vec::new();
        }

        let mut fires = Vec::new();
        for rate in Rate::ALL {
            let cadence = &mut self.cadences[rate.index()];

            let behind = ((now - cadence.next_due) / cadence.period).floor();
            if behind >= self.catch_up_cap as f64 {
                let dropped = behind - (self.catch_up_cap as f64 - 1.0);
                cadence.next_due += dropped * cadence.period;
            }

            while cadence.next_due <= now {
                let fire_time = cadence.next_due;
                let dt = match cadence.last_fire {
                    Some(previous) => (fire_time - previous).max(0.0),
                    None => cadence.period,
                };
                cadence.last_fire = Some(fire_time);
                cadence.next_due += cadence.period;
                cadence.fires += 1;
                fires.push(RateFire {
                    rate,
                    dt: dt as f32,
                });
            }
        }
        fires
    }
}

// ============================================================================
// SYSTEM REGISTRY
// ============================================================================

/// Registration record for one subsystem
pub struct SystemDescriptor {
    pub name: &'static str,
    pub rate: Rate,
    pub enabled: bool,
    /// Skip the system while fewer live entities exist than this
    pub min_entities: Option<usize>,
    pub system: Box<dyn Subsystem>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemStats {
    pub runs: u64,
    pub failures: u64,
    #[serde(skip)]
    pub last_duration: Duration,
    pub last_error: Option<String>,
}

pub struct RegisteredSystem {
    pub name: &'static str,
    pub rate: Rate,
    pub enabled: bool,
    pub min_entities: Option<usize>,
    pub system: Box<dyn Subsystem>,
    pub stats: SystemStats,
}

/// Ordered collection of registered subsystems
#[derive(Default)]
pub struct SystemRegistry {
    entries: Vec<RegisteredSystem>,
}

impl SystemRegistry {
    pub fn register(&mut self, descriptor: SystemDescriptor) {
        self.entries.push(RegisteredSystem {
            name: descriptor.name,
            rate: descriptor.rate,
            enabled: descriptor.enabled,
            min_entities: descriptor.min_entities,
            system: descriptor.system,
            stats: SystemStats::default(),
        });
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Mutable access to one rate bucket, registration order preserved
    pub fn bucket_mut(&mut self, rate: Rate) -> impl Iterator<Item = &mut RegisteredSystem> {
        self.entries.iter_mut().filter(move |e| e.rate == rate)
    }

    pub fn entries(&self) -> &[RegisteredSystem] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Point-in-time scheduler metrics for callers
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub ticks_per_rate: [u64; 3],
    pub total_ticks: u64,
    pub systems: Vec<SystemStatEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatEntry {
    pub name: &'static str,
    pub rate: Rate,
    pub enabled: bool,
    pub runs: u64,
    pub failures: u64,
    pub last_duration_us: u128,
    pub last_error: Option<String>,
}

impl SchedulerStats {
    pub fn collect(scheduler: &TickScheduler, registry: &SystemRegistry) -> Self {
        let ticks_per_rate = [
            scheduler.fires_for(Rate::Fast),
            scheduler.fires_for(Rate::Medium),
            scheduler.fires_for(Rate::Slow),
        ];
        Self {
            ticks_per_rate,
            total_ticks: ticks_per_rate.iter().sum(),
            systems: registry
                .entries()
                .iter()
                .map(|e| SystemStatEntry {
                    name: e.name,
                    rate: e.rate,
                    enabled: e.enabled,
                    runs: e.stats.runs,
                    failures: e.stats.failures,
                    last_duration_us: e.stats.last_duration.as_micros(),
                    last_error: e.stats.last_error.clone(),
                })
                .collect(),
        }
    }
}
