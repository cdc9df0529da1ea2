/// Building construction lifecycle and upkeep
///
/// Scheduling a build reserves materials, finds a placement, then opens a
/// construction zone, a cooperative task and a timed job. Finalization pays
/// the reservation and flips the zone live. Standing buildings deteriorate,
/// wear with use, and can be repaired at a cost that grows as they decay.
use bevy::prelude::*;
use lazy_static::lazy_static;
use serde_json::json;
use std::collections::HashMap;

use crate::errors::SystemResult;
use crate::events::EventName;
use crate::world::types::{
    BuildingCondition, BuildingState, ConstructionJob, EntityId, MaterialCost, Task, Zone,
    ZoneBounds, ZoneKind,
};
use crate::world::{Section, WorldState};

use super::{reservations, tasks, SimContext, Subsystem};

#[derive(Debug, Clone, Copy)]
pub struct BuildingSpec {
    pub cost: MaterialCost,
    /// Construction duration in milliseconds
    pub time_ms: u64,
    pub width: f32,
    pub height: f32,
    pub final_kind: ZoneKind,
}

lazy_static! {
    pub static ref BUILDING_COSTS: HashMap<&'static str, BuildingSpec> = {
        let mut costs = HashMap::new();
        costs.insert(
            "house",
            BuildingSpec {
                cost: MaterialCost::new(50, 20),
                time_ms: 30_000,
                width: 60.0,
                height: 60.0,
                final_kind: ZoneKind::Rest,
            },
        );
        costs.insert(
            "workshop",
            BuildingSpec {
                cost: MaterialCost::new(40, 40),
                time_ms: 45_000,
                width: 80.0,
                height: 60.0,
                final_kind: ZoneKind::Crafting,
            },
        );
        costs.insert(
            "well",
            BuildingSpec {
                cost: MaterialCost::new(10, 30),
                time_ms: 20_000,
                width: 20.0,
                height: 20.0,
                final_kind: ZoneKind::Water,
            },
        );
        costs.insert(
            "farm",
            BuildingSpec {
                cost: MaterialCost::new(30, 10),
                time_ms: 25_000,
                width: 100.0,
                height: 80.0,
                final_kind: ZoneKind::Work,
            },
        );
        costs.insert(
            "storehouse",
            BuildingSpec {
                cost: MaterialCost::new(35, 25),
                time_ms: 35_000,
                width: 70.0,
                height: 70.0,
                final_kind: ZoneKind::Storage,
            },
        );
        costs
    };
}

const STARTING_DURABILITY: f32 = 10.0;
const MAX_DURABILITY: f32 = 100.0;
/// Every Nth recorded usage chips durability
const USAGE_WEAR_EVERY: u64 = 10;
const USAGE_WEAR: f32 = 1.0;

/// Find a placement for a footprint: inside the world, overlapping no other
/// zone, and clear of water around the center
fn find_placement(
    ctx: &mut SimContext<'_>,
    width: f32,
    height: f32,
) -> Option<ZoneBounds> {
    use rand::Rng;
    let attempts = ctx.config.building.placement_attempts;
    let clearance = ctx.config.building.water_clearance;
    let world_w = ctx.state.terrain.width;
    let world_h = ctx.state.terrain.height;
    if width >= world_w || height >= world_h {
        return None;
    }

    for _ in 0..attempts {
        let x = ctx.rng.gen_range(0.0..(world_w - width));
        let y = ctx.rng.gen_range(0.0..(world_h - height));
        let candidate = ZoneBounds::new(x, y, width, height);

        let overlaps = ctx
            .state
            .zones
            .values()
            .any(|z| z.bounds.intersects(&candidate));
        if overlaps {
            continue;
        }
        if ctx.state.terrain.water_within(candidate.center(), clearance) {
            continue;
        }
        return Some(candidate);
    }
    None
}

/// Reserve materials and open a construction site for `label`. Returns the
/// new zone id, or None with the reservation released when no valid
/// placement exists (or no supply covers the cost).
pub fn try_schedule_construction(
    ctx: &mut SimContext<'_>,
    label: &str,
) -> Option<EntityId> {
    let Some(spec) = BUILDING_COSTS.get(label).copied() else {
        debug!("construction for unknown label '{}'", label);
        return None;
    };

    let task_id = ctx.state.ids.next("task");
    if !reservations::reserve(ctx, &task_id, spec.cost) {
        debug!("construction '{}' rejected: insufficient materials", label);
        return None;
    }

    let Some(bounds) = find_placement(ctx, spec.width, spec.height) else {
        reservations::release(ctx, &task_id);
        debug!("construction '{}' rejected: no valid placement", label);
        return None;
    };

    let now = ctx.now();
    let zone_id = ctx.state.ids.next("zone");
    let mut zone = Zone::new(zone_id.clone(), ZoneKind::Work, bounds);
    zone.meta.label = Some(label.to_string());
    zone.meta.under_construction = true;
    zone.meta.durability = Some(STARTING_DURABILITY);
    zone.meta.max_durability = Some(MAX_DURABILITY);
    ctx.state.zones.insert(zone_id.clone(), zone);

    let required_work = spec.time_ms as f32 / 1000.0;
    let task = Task {
        id: task_id.clone(),
        kind: format!("build_{}", label),
        required_work,
        contributions: HashMap::new(),
        cost: spec.cost,
        zone_id: Some(zone_id.clone()),
        bounds: Some(bounds),
        min_workers: 1,
        completed: false,
        cancelled: false,
        created_at: now,
        label: Some(label.to_string()),
    };
    ctx.state.tasks.insert(task_id.clone(), task);
    ctx.bus.emit(
        EventName::TaskCreated,
        json!({ "taskId": &task_id, "kind": format!("build_{}", label) }),
    );

    ctx.state.construction_jobs.push(ConstructionJob {
        zone_id: zone_id.clone(),
        task_id,
        label: label.to_string(),
        completes_at: now + spec.time_ms as f64 / 1000.0,
    });

    ctx.bus.emit(
        EventName::BuildingConstructionStarted,
        json!({
            "zoneId": &zone_id,
            "label": label,
            "wood": spec.cost.wood,
            "stone": spec.cost.stone,
        }),
    );
    ctx.state.mark_dirty(Section::Zones);
    ctx.state.mark_dirty(Section::Tasks);
    Some(zone_id)
}

/// Record a usage tick against a building zone
pub fn record_usage(state: &mut WorldState, zone_id: &EntityId, now: f64) {
    let Some(building) = state.buildings.get_mut(zone_id) else {
        return;
    };
    building.abandoned = false;
    building.last_usage = now;
    building.usage_count += 1;
    if building.usage_count % USAGE_WEAR_EVERY == 0 {
        building.durability = (building.durability - USAGE_WEAR).max(0.0);
        let durability = building.durability;
        if let Some(zone) = state.zones.get_mut(zone_id) {
            zone.meta.durability = Some(durability);
        }
        state.mark_dirty(Section::Zones);
    }
}

/// Repair a building. Standard repairs restore to one point below the
/// current maximum and decay the maximum by one; perfect repairs cost
/// triple and restore to the full (unchanged) maximum.
pub fn repair_building(ctx: &mut SimContext<'_>, zone_id: &EntityId, perfect: bool) -> bool {
    let Some(building) = ctx.state.buildings.get(zone_id) else {
        debug!("repair for unknown building {}", zone_id);
        return false;
    };
    let missing = (building.max_durability - building.durability).max(0.0);
    if missing <= 0.0 {
        return false;
    }

    // Cost rises as durability falls
    let scale = if perfect { 3.0 } else { 1.0 };
    let cost = MaterialCost::new(
        ((missing / 10.0).ceil() * scale) as u32,
        ((missing / 20.0).ceil() * scale) as u32,
    );

    let repair_key = ctx.state.ids.next("task");
    if !reservations::reserve(ctx, &repair_key, cost) {
        debug!("repair of {} rejected: insufficient materials", zone_id);
        return false;
    }
    if !reservations::consume(ctx, &repair_key) {
        reservations::release(ctx, &repair_key);
        return false;
    }

    let building = ctx
        .state
        .buildings
        .get_mut(zone_id)
        .expect("checked above");
    if perfect {
        building.durability = building.max_durability;
    } else {
        building.max_durability = (building.max_durability - 1.0).max(1.0);
        building.durability = building.max_durability;
    }
    let durability = building.durability;
    let max_durability = building.max_durability;

    if let Some(zone) = ctx.state.zones.get_mut(zone_id) {
        zone.meta.durability = Some(durability);
        zone.meta.max_durability = Some(max_durability);
    }
    ctx.bus.emit(
        EventName::BuildingRepaired,
        json!({
            "zoneId": zone_id,
            "durability": durability,
            "maxDurability": max_durability,
            "perfect": perfect,
        }),
    );
    ctx.state.mark_dirty(Section::Zones);
    true
}

/// Tear a zone down, cancelling any in-flight construction
pub fn demolish(ctx: &mut SimContext<'_>, zone_id: &EntityId) -> bool {
    if !ctx.state.zones.contains_key(zone_id) {
        debug!("demolish for unknown zone {}", zone_id);
        return false;
    }

    let jobs: Vec<ConstructionJob> = ctx
        .state
        .construction_jobs
        .iter()
        .filter(|j| &j.zone_id == zone_id)
        .cloned()
        .collect();
    for job in jobs {
        reservations::release(ctx, &job.task_id);
        tasks::cancel_task(ctx, &job.task_id);
    }
    ctx.state
        .construction_jobs
        .retain(|j| &j.zone_id != zone_id);
    ctx.state.buildings.remove(zone_id);
    ctx.state.zones.remove(zone_id);
    ctx.state.mark_dirty(Section::Zones);
    true
}

#[derive(Debug, Default)]
pub struct BuildingSystem;

impl BuildingSystem {
    pub fn new() -> Self {
        Self
    }

    fn finalize_due_jobs(&mut self, ctx: &mut SimContext<'_>) {
        let now = ctx.now();
        let due: Vec<ConstructionJob> = ctx
            .state
            .construction_jobs
            .iter()
            .filter(|j| j.completes_at <= now)
            .cloned()
            .collect();
        if due.is_empty() {
            return;
        }
        ctx.state.construction_jobs.retain(|j| j.completes_at > now);

        for job in due {
            if !ctx.state.zones.contains_key(&job.zone_id) {
                reservations::release(ctx, &job.task_id);
                continue;
            }

            tasks::force_complete(ctx, &job.task_id);
            if !reservations::consume(ctx, &job.task_id) {
                // Supply vanished mid-build; let the claim go rather than
                // hold it forever
                reservations::release(ctx, &job.task_id);
            }

            let final_kind = BUILDING_COSTS
                .get(job.label.as_str())
                .map(|s| s.final_kind)
                .unwrap_or(ZoneKind::Work);
            if let Some(zone) = ctx.state.zones.get_mut(&job.zone_id) {
                zone.meta.under_construction = false;
                zone.kind = if job.label == "house" {
                    ZoneKind::Rest
                } else {
                    final_kind
                };
                zone.meta.durability = Some(MAX_DURABILITY);
                zone.meta.max_durability = Some(MAX_DURABILITY);
                if job.label == "farm" {
                    zone.props.resource_kind = Some(crate::world::types::ResourceKind::Food);
                    zone.props.base_yield = Some(4);
                }
                if job.label == "workshop" {
                    zone.meta.crafting_station = true;
                }
            }

            ctx.state.buildings.insert(
                job.zone_id.clone(),
                BuildingState {
                    zone_id: job.zone_id.clone(),
                    durability: MAX_DURABILITY,
                    max_durability: MAX_DURABILITY,
                    last_maintenance: now,
                    last_usage: now,
                    usage_count: 0,
                    abandoned: false,
                    deterioration_rate: ctx.config.building.normal_deterioration_per_hour,
                    upgraded: false,
                },
            );

            info!("🏠 Constructed '{}' at zone {}", job.label, job.zone_id);
            ctx.bus.emit(
                EventName::BuildingConstructed,
                json!({ "zoneId": job.zone_id, "label": job.label }),
            );
            ctx.state.mark_dirty(Section::Zones);
        }
    }

    fn run_maintenance(&mut self, ctx: &mut SimContext<'_>) {
        let now = ctx.now();
        let cadence = ctx.config.building.maintenance_cadence;
        let abandoned_after = ctx.config.building.abandoned_after;
        let normal_rate = ctx.config.building.normal_deterioration_per_hour;
        let abandoned_rate = ctx.config.building.abandoned_deterioration_per_hour;

        let mut damaged: Vec<(EntityId, f32, BuildingCondition)> = Vec::new();
        for building in ctx.state.buildings.values_mut() {
            // Each building keeps its own maintenance clock
            let interval = now - building.last_maintenance;
            if interval < cadence {
                continue;
            }
            building.abandoned = now - building.last_usage > abandoned_after;
            let rate = if building.abandoned {
                abandoned_rate
            } else {
                normal_rate
            };
            building.deterioration_rate = rate;
            let loss = rate * (interval / 3600.0) as f32;
            let before = building.durability;
            building.durability = (building.durability - loss).max(0.0);
            building.last_maintenance = now;

            if building.durability < before {
                damaged.push((
                    building.zone_id.clone(),
                    building.durability,
                    BuildingCondition::for_durability(building.durability),
                ));
            }
        }

        for (zone_id, durability, condition) in damaged {
            if let Some(zone) = ctx.state.zones.get_mut(&zone_id) {
                zone.meta.durability = Some(durability);
            }
            ctx.bus.emit(
                EventName::BuildingDamaged,
                json!({
                    "zoneId": zone_id,
                    "durability": durability,
                    "condition": condition,
                }),
            );
            ctx.state.mark_dirty(Section::Zones);
        }
    }
}

impl Subsystem for BuildingSystem {
    fn update(&mut self, ctx: &mut SimContext<'_>, _dt: f32) -> SystemResult {
        self.finalize_due_jobs(ctx);
        self.run_maintenance(ctx);
        Ok(())
    }
}
