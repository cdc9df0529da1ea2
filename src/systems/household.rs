/// Households bound to shelter zones
///
/// Every rest zone carries a household whose capacity derives from the zone
/// footprint. Membership is idempotent, the shared inventory is small, and
/// a periodic observer reports crowding and homelessness.
use bevy::prelude::*;
use serde_json::json;
use std::collections::HashMap;

use crate::errors::SystemResult;
use crate::events::EventName;
use crate::world::inventory::Inventory;
use crate::world::state::{Household, HouseholdMember};
use crate::world::types::{EntityId, ResourceKind, ZoneKind};
use crate::world::{Section, WorldState};

use super::{SimContext, Subsystem};

pub const SHARED_INVENTORY_CAPACITY: u32 = 100;
const OBSERVER_CADENCE: f64 = 5.0;
const HIGH_OCCUPANCY: f32 = 0.8;

fn capacity_for_zone(area: f32) -> u32 {
    ((area / 2000.0).floor() as u32).max(2)
}

/// Ensure every rest zone has a household; members and shared inventory are
/// preserved across rebuilds by zone id, and households for demolished
/// zones are dropped.
pub fn rebuild_households(state: &mut WorldState) {
    let rest_zones: Vec<(EntityId, f32)> = state
        .zones_of_kind(ZoneKind::Rest)
        .filter(|z| !z.meta.under_construction)
        .map(|z| (z.id.clone(), z.bounds.area()))
        .collect();

    let mut kept: HashMap<EntityId, Household> = HashMap::new();
    for (zone_id, area) in rest_zones {
        let existing = state
            .households
            .values()
            .find(|h| h.zone_id == zone_id)
            .cloned();
        let mut household = match existing {
            Some(household) => household,
            None => {
                let id = state.ids.next("household");
                Household {
                    id,
                    zone_id: zone_id.clone(),
                    members: Vec::new(),
                    shared: Inventory::new(SHARED_INVENTORY_CAPACITY),
                    capacity: 0,
                }
            }
        };
        household.capacity = capacity_for_zone(area);
        kept.insert(household.id.clone(), household);
    }

    state.households = kept.into_iter().collect();
}

/// Place an agent in a household. Returns the zone id; idempotent for
/// agents that already live somewhere.
pub fn assign_to_house(
    ctx: &mut SimContext<'_>,
    agent_id: &EntityId,
    role: &str,
) -> Option<EntityId> {
    if !ctx.state.agents.contains_key(agent_id) {
        debug!("house assignment for unknown agent {}", agent_id);
        return None;
    }

    if let Some(existing) = ctx
        .state
        .households
        .values()
        .find(|h| h.has_member(agent_id))
    {
        return Some(existing.zone_id.clone());
    }

    let now = ctx.now();
    let free = ctx
        .state
        .households
        .values_mut()
        .find(|h| (h.members.len() as u32) < h.capacity);

    match free {
        Some(household) => {
            household.members.push(HouseholdMember {
                agent_id: agent_id.clone(),
                role: role.to_string(),
                joined_at: now,
            });
            let zone_id = household.zone_id.clone();
            let household_id = household.id.clone();
            ctx.bus.emit(
                EventName::AgentAssigned,
                json!({
                    "agentId": agent_id,
                    "householdId": household_id,
                    "zoneId": &zone_id,
                    "role": role,
                }),
            );
            ctx.state.mark_dirty(Section::Zones);
            Some(zone_id)
        }
        None => {
            ctx.bus.emit(
                EventName::NoFreeHouses,
                json!({ "agentId": agent_id }),
            );
            None
        }
    }
}

/// Deposit into a household's shared inventory; fails cleanly on overflow
pub fn deposit_shared(
    state: &mut WorldState,
    household_id: &EntityId,
    amounts: &HashMap<ResourceKind, u32>,
) -> bool {
    let Some(household) = state.households.get_mut(household_id) else {
        return false;
    };
    let adding: u32 = amounts.values().sum();
    if adding > household.shared.space_left() {
        return false;
    }
    for (&resource, &amount) in amounts {
        household.shared.add(resource, amount);
    }
    state.mark_dirty(Section::Inventory);
    true
}

/// Withdraw from the shared inventory, taking at most what is available
/// per key
pub fn withdraw_shared(
    state: &mut WorldState,
    household_id: &EntityId,
    amounts: &HashMap<ResourceKind, u32>,
) -> HashMap<ResourceKind, u32> {
    let mut taken = HashMap::new();
    let Some(household) = state.households.get_mut(household_id) else {
        return taken;
    };
    for (&resource, &amount) in amounts {
        let got = household.shared.remove(resource, amount);
        if got > 0 {
            taken.insert(resource, got);
        }
    }
    if !taken.is_empty() {
        state.mark_dirty(Section::Inventory);
    }
    taken
}

#[derive(Debug, Default)]
pub struct HouseholdSystem {
    last_observation: f64,
}

impl HouseholdSystem {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Subsystem for HouseholdSystem {
    fn update(&mut self, ctx: &mut SimContext<'_>, _dt: f32) -> SystemResult {
        rebuild_households(ctx.state);

        let now = ctx.now();
        if now - self.last_observation < OBSERVER_CADENCE {
            return Ok(());
        }
        self.last_observation = now;

        let crowded: Vec<(EntityId, f32)> = ctx
            .state
            .households
            .values()
            .filter(|h| h.occupancy() > HIGH_OCCUPANCY)
            .map(|h| (h.id.clone(), h.occupancy()))
            .collect();
        for (household_id, occupancy) in crowded {
            ctx.bus.emit(
                EventName::HighOccupancy,
                json!({ "householdId": household_id, "occupancy": occupancy }),
            );
        }

        let homeless = ctx
            .state
            .alive_agents()
            .filter(|a| {
                !ctx.state
                    .households
                    .values()
                    .any(|h| h.has_member(&a.id))
            })
            .count();
        if homeless > 0 {
            ctx.bus.emit(
                EventName::AgentsHomeless,
                json!({ "count": homeless }),
            );
        }
        Ok(())
    }
}
