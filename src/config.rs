/// Simulation configuration
///
/// Every tunable has a default so the kernel runs with no config file at
/// all; a RON file can override any subset and a bad file degrades to the
/// defaults with a warning instead of failing startup.
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub fast_ms: u64,
    pub medium_ms: u64,
    pub slow_ms: u64,
    pub command_queue_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fast_ms: 50,
            medium_ms: 250,
            slow_ms: 1000,
            command_queue_limit: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Agents considered per MEDIUM tick
    pub batch_size: usize,
    pub decision_budget_ms: f64,
    pub explore_range: f32,
    pub resource_search_radius: f32,
    /// Early-exit distance for nearest-resource searches
    pub near_enough: f32,
    pub zone_cache_ttl: f64,
    pub resource_cache_ttl: f64,
    pub memory_cleanup_secs: f64,
    pub memory_max_age: f64,
    /// Nearby-agent candidate count at which the accelerated distance path
    /// kicks in
    pub accel_threshold: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            decision_budget_ms: 5.0,
            explore_range: 150.0,
            resource_search_radius: 500.0,
            near_enough: 100.0,
            zone_cache_ttl: 1.0,
            resource_cache_ttl: 2.0,
            memory_cleanup_secs: 300.0,
            memory_max_age: 600.0,
            accel_threshold: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    pub cadence_secs: f64,
    pub engagement_radius: f32,
    pub base_cooldown: f64,
    /// Mutual affinity at or below this makes a pair hostile
    pub hostility_threshold: f32,
    /// Aggression at or above this can start unprovoked attacks
    pub aggression_threshold: f32,
    /// Attacker count above which the batched query path is used
    pub batch_threshold: usize,
    /// Attacker count at which the accelerated distance path kicks in
    pub accel_threshold: usize,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            cadence_secs: 0.75,
            engagement_radius: 70.0,
            base_cooldown: 4.0,
            hostility_threshold: -0.4,
            aggression_threshold: 0.6,
            batch_threshold: 10,
            accel_threshold: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialConfig {
    pub proximity_radius: f32,
    pub reinforcement_per_second: f32,
    pub decay_per_second: f32,
    pub decay_cadence: f64,
    pub group_threshold: f32,
    pub group_cadence: f64,
    /// Proximity work is staggered across this many sub-batches per update
    pub sub_batches: usize,
    /// Candidate count at which the accelerated distance path kicks in
    pub accel_threshold: usize,
    pub reputation_decay_per_second: f32,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            proximity_radius: 100.0,
            reinforcement_per_second: 0.01,
            decay_per_second: 0.005,
            decay_cadence: 2.0,
            group_threshold: 0.6,
            group_cadence: 1.0,
            sub_batches: 10,
            accel_threshold: 20,
            reputation_decay_per_second: 0.002,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub spoilage_cadence: f64,
    pub food_spoilage: f32,
    pub water_spoilage: f32,
    pub reservation_max_age: f64,
    /// Tighter age used by the opportunistic sweep after need satisfaction
    pub reservation_opportunistic_age: f64,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            spoilage_cadence: 10.0,
            food_spoilage: 0.02,
            water_spoilage: 0.01,
            reservation_max_age: 300.0,
            reservation_opportunistic_age: 120.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildingConfig {
    pub maintenance_cadence: f64,
    pub production_cadence: f64,
    /// Seconds without usage before a building counts as abandoned
    pub abandoned_after: f64,
    pub placement_attempts: usize,
    pub water_clearance: f32,
    pub normal_deterioration_per_hour: f32,
    pub abandoned_deterioration_per_hour: f32,
    pub production_workers: usize,
}

impl Default for BuildingConfig {
    fn default() -> Self {
        Self {
            maintenance_cadence: 5.0,
            production_cadence: 12.0,
            abandoned_after: 300.0,
            placement_attempts: 50,
            water_clearance: 60.0,
            normal_deterioration_per_hour: 2.0,
            abandoned_deterioration_per_hour: 10.0,
            production_workers: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub poll_cadence: f64,
    pub food_emergency_per_capita: f32,
    pub food_safe_per_capita: f32,
    pub water_emergency_per_capita: f32,
    pub water_safe_per_capita: f32,
    pub housing_full_occupancy: f32,
    pub max_reassignments: usize,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            poll_cadence: 30.0,
            food_emergency_per_capita: 1.0,
            food_safe_per_capita: 2.0,
            water_emergency_per_capita: 1.0,
            water_safe_per_capita: 2.0,
            housing_full_occupancy: 0.95,
            max_reassignments: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NeedsConfig {
    pub hunger_per_second: f32,
    pub thirst_per_second: f32,
    pub energy_per_second: f32,
    pub social_per_second: f32,
    pub fun_per_second: f32,
}

impl Default for NeedsConfig {
    fn default() -> Self {
        Self {
            hunger_per_second: 0.12,
            thirst_per_second: 0.18,
            energy_per_second: 0.06,
            social_per_second: 0.05,
            fun_per_second: 0.04,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    pub world_width: f32,
    pub world_height: f32,
    pub tile_size: f32,
    pub initial_population: usize,
    pub day_length: f64,
    pub snapshot_throttle_ms: u64,
    pub autosave_secs: f64,
    pub accelerated_compute: bool,
    /// Filter string handed to the app's log plugin, EnvFilter syntax
    pub log_filter: String,
    pub scheduler: SchedulerConfig,
    pub ai: AiConfig,
    pub combat: CombatConfig,
    pub social: SocialConfig,
    pub inventory: InventoryConfig,
    pub building: BuildingConfig,
    pub governance: GovernanceConfig,
    pub needs: NeedsConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            world_width: 1000.0,
            world_height: 1000.0,
            tile_size: 10.0,
            initial_population: 8,
            day_length: 600.0,
            snapshot_throttle_ms: 250,
            autosave_secs: 60.0,
            accelerated_compute: true,
            log_filter: "info".to_string(),
            scheduler: SchedulerConfig::default(),
            ai: AiConfig::default(),
            combat: CombatConfig::default(),
            social: SocialConfig::default(),
            inventory: InventoryConfig::default(),
            building: BuildingConfig::default(),
            governance: GovernanceConfig::default(),
            needs: NeedsConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Load from a RON file; any problem falls back to defaults
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match ron::from_str::<SimulationConfig>(&contents) {
                Ok(config) => {
                    info!("⚙️ Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️ Failed to parse {}: {} (using defaults)", path.display(), e);
                    SimulationConfig::default()
                }
            },
            Err(_) => {
                debug!("No config at {}, using defaults", path.display());
                SimulationConfig::default()
            }
        }
    }
}
