/// World resource nodes: gathering and regrowth
///
/// Nodes are harvested by agents (AI gather actions) and by commands; the
/// SLOW cadence slowly regrows depleted nodes toward their maximum.
use bevy::prelude::*;
use serde_json::json;

use crate::errors::SystemResult;
use crate::events::EventName;
use crate::world::types::{EntityId, StatKind};
use crate::world::Section;

use super::{SimContext, Subsystem};

/// Units restored per SLOW fire for a depleted node
const REGROWTH_PER_TICK: u32 = 1;

/// Harvest up to `amount` from a node. With an agent the yield lands in its
/// inventory (bounded by capacity); without one it goes to global supply.
/// Returns the units actually gathered.
pub fn gather_node(
    ctx: &mut SimContext<'_>,
    node_id: &EntityId,
    amount: u32,
    agent_id: Option<&EntityId>,
) -> u32 {
    let Some(node) = ctx.state.world_resources.get_mut(node_id) else {
        debug!("gather on unknown node {}", node_id);
        return 0;
    };
    let resource = node.kind.yields();
    let available = node.amount.min(amount);
    if available == 0 {
        return 0;
    }

    let gathered = match agent_id {
        Some(agent_id) => match ctx.state.inventories.get_mut(agent_id) {
            Some(inventory) => {
                let space = inventory.space_left().min(available);
                if space > 0 {
                    inventory.add(resource, space);
                }
                space
            }
            None => {
                debug!("gather by unknown agent {}", agent_id);
                0
            }
        },
        None => {
            ctx.state.add_global_resource(resource, available);
            available
        }
    };

    if gathered == 0 {
        return 0;
    }

    let node = ctx
        .state
        .world_resources
        .get_mut(node_id)
        .expect("node checked above");
    node.amount -= gathered;
    let remaining = node.amount;
    if let Some(record) = ctx.state.entities.get_mut(node_id) {
        record.set_stat(StatKind::Amount, remaining as f32);
    }

    ctx.bus.emit(
        EventName::ResourceGathered,
        json!({
            "nodeId": node_id,
            "resource": resource.as_str(),
            "amount": gathered,
            "remaining": remaining,
            "agentId": agent_id,
        }),
    );
    ctx.state.mark_dirty(Section::WorldResources);
    ctx.state.mark_dirty(Section::Inventory);
    gathered
}

/// Zero out a node; it regrows on the slow cadence
pub fn deplete_node(ctx: &mut SimContext<'_>, node_id: &EntityId) {
    let Some(node) = ctx.state.world_resources.get_mut(node_id) else {
        debug!("deplete on unknown node {}", node_id);
        return;
    };
    node.amount = 0;
    if let Some(record) = ctx.state.entities.get_mut(node_id) {
        record.set_stat(StatKind::Amount, 0.0);
    }
    ctx.state.mark_dirty(Section::WorldResources);
}

#[derive(Debug, Default)]
pub struct WorldResourceSystem;

impl WorldResourceSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Subsystem for WorldResourceSystem {
    fn update(&mut self, ctx: &mut SimContext<'_>, _dt: f32) -> SystemResult {
        let mut regrown = Vec::new();
        for node in ctx.state.world_resources.values_mut() {
            if node.amount < node.max_amount {
                node.amount = (node.amount + REGROWTH_PER_TICK).min(node.max_amount);
                regrown.push((node.id.clone(), node.amount));
            }
        }
        if !regrown.is_empty() {
            for (id, amount) in regrown {
                if let Some(record) = ctx.state.entities.get_mut(&id) {
                    record.set_stat(StatKind::Amount, amount as f32);
                }
            }
            ctx.state.mark_dirty(Section::WorldResources);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::testutil::TestBed;
    use crate::world::loader::spawn_node;
    use crate::world::types::{AgentProfile, NodeKind, ResourceKind};

    #[test]
    fn test_gather_to_global_supply() {
        let mut bed = TestBed::new();
        let node_id = spawn_node(&mut bed.state, NodeKind::Tree, Vec2::new(10.0, 10.0));

        let mut ctx = bed.ctx();
        let gathered = gather_node(&mut ctx, &node_id, 15, None);
        assert_eq!(gathered, 15);
        assert_eq!(ctx.state.global_resource(ResourceKind::Wood), 15);
        assert_eq!(ctx.state.world_resources[&node_id].amount, 65);
    }

    #[test]
    fn test_gather_into_agent_inventory_bounded() {
        let mut bed = TestBed::new();
        let agent = bed.state.spawn_agent(AgentProfile::default(), 0.0);
        let node_id = spawn_node(&mut bed.state, NodeKind::BerryBush, Vec2::ZERO);

        let mut ctx = bed.ctx();
        // Agent capacity is 50, bush holds 40
        let gathered = gather_node(&mut ctx, &node_id, 100, Some(&agent));
        assert_eq!(gathered, 40);
        assert_eq!(
            ctx.state.inventories[&agent].amount(ResourceKind::Food),
            40
        );
        assert_eq!(ctx.state.world_resources[&node_id].amount, 0);
    }

    #[test]
    fn test_gather_from_empty_node_is_zero() {
        let mut bed = TestBed::new();
        let node_id = spawn_node(&mut bed.state, NodeKind::Rock, Vec2::ZERO);
        {
            let mut ctx = bed.ctx();
            deplete_node(&mut ctx, &node_id);
            assert_eq!(gather_node(&mut ctx, &node_id, 10, None), 0);
        }
        let events = bed.flush_events();
        assert!(!events.iter().any(|e| e.name == EventName::ResourceGathered));
    }

    #[test]
    fn test_regrowth_toward_max() {
        let mut bed = TestBed::new();
        let node_id = spawn_node(&mut bed.state, NodeKind::BerryBush, Vec2::ZERO);
        {
            let mut ctx = bed.ctx();
            deplete_node(&mut ctx, &node_id);
        }

        let mut system = WorldResourceSystem::new();
        for _ in 0..3 {
            bed.run(&mut system, 1.0);
        }
        assert_eq!(bed.state.world_resources[&node_id].amount, 3);
        assert_eq!(
            bed.state.entities[&node_id].stat(StatKind::Amount),
            3.0
        );
    }
}
