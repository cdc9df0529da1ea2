/// Governance polling: settlement demands and role reassignment
///
/// Every poll compares per-capita food and water and housing occupancy to
/// the policy thresholds. Food and water demands are ongoing and only
/// resolve once the metric climbs past a safe threshold strictly above the
/// emergency trigger; housing demands resolve as soon as the action is
/// dispatched.
use bevy::prelude::*;
use serde_json::json;
use std::collections::HashMap;

use crate::errors::SystemResult;
use crate::events::EventName;
use crate::world::types::{EntityId, MaterialCost, ResourceKind, Role};

use super::{reservations, SimContext, Subsystem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DemandKind {
    FoodShortage,
    WaterShortage,
    HousingFull,
}

impl DemandKind {
    fn as_str(&self) -> &'static str {
        match self {
            DemandKind::FoodShortage => "food_shortage",
            DemandKind::WaterShortage => "water_shortage",
            DemandKind::HousingFull => "housing_full",
        }
    }

    fn target_role(&self) -> Role {
        match self {
            DemandKind::FoodShortage => Role::Farmer,
            DemandKind::WaterShortage => Role::Forager,
            DemandKind::HousingFull => Role::Builder,
        }
    }

    /// Ongoing demands resolve on a metric threshold, the rest on dispatch
    fn is_ongoing(&self) -> bool {
        matches!(self, DemandKind::FoodShortage | DemandKind::WaterShortage)
    }
}

#[derive(Debug, Clone)]
struct Demand {
    raised_at: f64,
    actions_taken: u32,
}

/// How well an agent fits a role, from traits and satisfaction with the
/// current role
fn role_score(agent: &crate::world::types::Agent, role: Role) -> f32 {
    let traits = &agent.traits;
    let fit = match role {
        Role::Farmer => traits.diligence * 0.7 + traits.cooperation * 0.3,
        Role::Forager => traits.curiosity * 0.6 + traits.diligence * 0.4,
        Role::Builder => traits.diligence * 0.6 + traits.cooperation * 0.4,
        Role::Crafter => traits.curiosity * 0.5 + traits.diligence * 0.5,
        Role::Guard => traits.aggression * 0.7 + traits.diligence * 0.3,
        Role::Idle => 0.0,
    };
    // Unhappy placements are cheaper to move
    let current_satisfaction = match agent.role {
        Role::Idle => 0.0,
        current if current == role => 1.0,
        _ => 0.5,
    };
    fit - current_satisfaction * 0.4
}

#[derive(Debug, Default)]
pub struct GovernanceSystem {
    last_poll: f64,
    demands: HashMap<DemandKind, Demand>,
}

impl GovernanceSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn per_capita(ctx: &SimContext<'_>, kind: ResourceKind) -> f32 {
        let population = ctx.state.population().max(1) as f32;
        ctx.state.settlement_resource_total(kind) as f32 / population
    }

    fn housing_occupancy(ctx: &SimContext<'_>) -> f32 {
        let capacity: u32 = ctx.state.households.values().map(|h| h.capacity).sum();
        if capacity == 0 {
            return 1.0;
        }
        let members: usize = ctx.state.households.values().map(|h| h.members.len()).sum();
        members as f32 / capacity as f32
    }

    /// Reassign the best-scoring agents to the demand's target role
    fn dispatch_action(&mut self, ctx: &mut SimContext<'_>, kind: DemandKind) {
        let role = kind.target_role();
        let limit = ctx.config.governance.max_reassignments;

        let mut scored: Vec<(EntityId, f32)> = ctx
            .state
            .alive_agents()
            .filter(|a| a.role != role)
            .map(|a| (a.id.clone(), role_score(a, role)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let chosen: Vec<EntityId> = scored
            .into_iter()
            .take(limit)
            .filter(|(_, score)| *score > 0.0)
            .map(|(id, _)| id)
            .collect();

        // A small material budget backs each action
        let action_key = ctx.state.ids.next("task");
        let cost = MaterialCost::new(5, 0);
        let reserved = reservations::reserve(ctx, &action_key, cost);
        if reserved {
            reservations::consume(ctx, &action_key);
        }

        for agent_id in &chosen {
            if let Some(agent) = ctx.state.agents.get_mut(agent_id) {
                agent.role = role;
            }
            ctx.bus.emit(
                EventName::RoleAssigned,
                json!({ "agentId": agent_id, "role": role.as_str() }),
            );
        }

        ctx.bus.emit(
            EventName::GovernanceAction,
            json!({
                "demand": kind.as_str(),
                "role": role.as_str(),
                "reassigned": chosen,
                "funded": reserved,
            }),
        );

        if let Some(demand) = self.demands.get_mut(&kind) {
            demand.actions_taken += 1;
        }
    }

    fn poll(&mut self, ctx: &mut SimContext<'_>) {
        let now = ctx.now();
        let config = ctx.config.governance.clone();

        let food = Self::per_capita(ctx, ResourceKind::Food);
        let water = Self::per_capita(ctx, ResourceKind::Water);
        let occupancy = Self::housing_occupancy(ctx);

        // Raise or resolve each demand kind
        let mut active: Vec<DemandKind> = Vec::new();
        let mut resolved: Vec<DemandKind> = Vec::new();

        for (kind, metric, emergency, safe) in [
            (
                DemandKind::FoodShortage,
                food,
                config.food_emergency_per_capita,
                config.food_safe_per_capita,
            ),
            (
                DemandKind::WaterShortage,
                water,
                config.water_emergency_per_capita,
                config.water_safe_per_capita,
            ),
        ] {
            let open = self.demands.contains_key(&kind);
            if !open && metric < emergency {
                self.demands.insert(
                    kind,
                    Demand {
                        raised_at: now,
                        actions_taken: 0,
                    },
                );
                active.push(kind);
            } else if open && kind.is_ongoing() && metric > safe {
                // Hysteresis: resolve only above the safe threshold
                self.demands.remove(&kind);
                resolved.push(kind);
            } else if open {
                active.push(kind);
            }
        }

        let housing_open = self.demands.contains_key(&DemandKind::HousingFull);
        if !housing_open && occupancy >= config.housing_full_occupancy {
            self.demands.insert(
                DemandKind::HousingFull,
                Demand {
                    raised_at: now,
                    actions_taken: 0,
                },
            );
            active.push(DemandKind::HousingFull);
        }

        ctx.bus.emit(
            EventName::GovernanceUpdate,
            json!({
                "foodPerCapita": food,
                "waterPerCapita": water,
                "housingOccupancy": occupancy,
                "demands": active.iter().map(|d| d.as_str()).collect::<Vec<_>>(),
                "resolved": resolved.iter().map(|d| d.as_str()).collect::<Vec<_>>(),
            }),
        );

        // Act on every unresolved demand
        let open: Vec<DemandKind> = self.demands.keys().copied().collect();
        for kind in open {
            self.dispatch_action(ctx, kind);
            // Non-ongoing demands resolve the moment the action is sent
            if !kind.is_ongoing() {
                self.demands.remove(&kind);
            }
        }
    }
}

impl Subsystem for GovernanceSystem {
    fn update(&mut self, ctx: &mut SimContext<'_>, _dt: f32) -> SystemResult {
        let now = ctx.now();
        if now - self.last_poll < ctx.config.governance.poll_cadence {
            return Ok(());
        }
        self.last_poll = now;
        self.poll(ctx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::testutil::TestBed;
    use crate::world::types::{AgentProfile, Traits};

    fn bed_with_population(count: usize) -> TestBed {
        let mut bed = TestBed::new();
        for _ in 0..count {
            bed.state.spawn_agent(
                AgentProfile {
                    traits: Some(Traits {
                        diligence: 0.9,
                        ..Traits::default()
                    }),
                    ..AgentProfile::default()
                },
                0.0,
            );
        }
        bed
    }

    fn poll(bed: &mut TestBed, system: &mut GovernanceSystem) {
        bed.advance_time(31.0);
        bed.run(system, 1.0);
    }

    #[test]
    fn test_food_shortage_raises_and_reassigns() {
        let mut bed = bed_with_population(4);
        // No food anywhere: per capita 0 < 1.0 emergency
        let mut system = GovernanceSystem::new();
        poll(&mut bed, &mut system);

        let events = bed.flush_events();
        let action = events
            .iter()
            .find(|e| e.name == EventName::GovernanceAction && e.payload["demand"] == "food_shortage")
            .expect("food shortage action");
        assert_eq!(action.payload["role"], "farmer");
        assert!(bed
            .state
            .agents
            .values()
            .any(|a| a.role == Role::Farmer));
    }

    #[test]
    fn test_hysteresis_keeps_demand_between_thresholds() {
        let mut bed = bed_with_population(2);
        let mut system = GovernanceSystem::new();
        // Raise: 0 food
        poll(&mut bed, &mut system);
        assert!(system.demands.contains_key(&DemandKind::FoodShortage));

        // Metric between emergency (1.0) and safe (2.0): still open
        bed.state.add_global_resource(ResourceKind::Food, 3); // 1.5 per capita
        poll(&mut bed, &mut system);
        assert!(system.demands.contains_key(&DemandKind::FoodShortage));

        // Above safe: resolves
        bed.state.add_global_resource(ResourceKind::Food, 10); // 6.5 per capita
        poll(&mut bed, &mut system);
        assert!(!system.demands.contains_key(&DemandKind::FoodShortage));
    }

    #[test]
    fn test_housing_demand_resolves_on_dispatch() {
        let mut bed = bed_with_population(3);
        bed.state.add_global_resource(ResourceKind::Food, 100);
        bed.state.add_global_resource(ResourceKind::Water, 100);
        // Full household: 2 of 2 beds
        use crate::world::state::{Household, HouseholdMember};
        use crate::world::inventory::Inventory;
        let ids: Vec<EntityId> = bed.state.agents.keys().take(2).cloned().collect();
        let household_id = bed.state.ids.next("household");
        bed.state.households.insert(
            household_id.clone(),
            Household {
                id: household_id,
                zone_id: EntityId::from("zone_x"),
                members: ids
                    .iter()
                    .map(|id| HouseholdMember {
                        agent_id: id.clone(),
                        role: "resident".to_string(),
                        joined_at: 0.0,
                    })
                    .collect(),
                shared: Inventory::new(100),
                capacity: 2,
            },
        );

        let mut system = GovernanceSystem::new();
        poll(&mut bed, &mut system);
        assert!(!system.demands.contains_key(&DemandKind::HousingFull));

        let events = bed.flush_events();
        assert!(events
            .iter()
            .any(|e| e.name == EventName::GovernanceAction && e.payload["demand"] == "housing_full"));
    }

    #[test]
    fn test_reassignment_capped() {
        let mut bed = bed_with_population(10);
        let mut system = GovernanceSystem::new();
        poll(&mut bed, &mut system);

        let farmers = bed
            .state
            .agents
            .values()
            .filter(|a| a.role == Role::Farmer)
            .count();
        assert!(farmers <= bed.config.governance.max_reassignments);
    }
}
