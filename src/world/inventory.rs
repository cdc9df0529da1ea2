/// Inventories, stockpiles and the reservation ledger
///
/// Amounts are non-negative integers and the sum of a container's amounts
/// never exceeds its capacity. Multi-key operations validate fully before
/// mutating so a failed call leaves both sides untouched.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use super::types::{EntityId, MaterialCost, ResourceKind};

pub const AGENT_INVENTORY_CAPACITY: u32 = 50;
pub const STOCKPILE_CAPACITY: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("unknown inventory owner {0}")]
    UnknownOwner(EntityId),
    #[error("insufficient {resource:?}: requested {requested}, held {held}")]
    Insufficient {
        resource: ResourceKind,
        requested: u32,
        held: u32,
    },
    #[error("capacity exceeded: adding {adding} to {used}/{capacity}")]
    CapacityExceeded {
        adding: u32,
        used: u32,
        capacity: u32,
    },
}

/// Resource map bounded by a scalar capacity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    slots: HashMap<ResourceKind, u32>,
    pub capacity: u32,
}

impl Inventory {
    pub fn new(capacity: u32) -> Self {
        Self {
            slots: HashMap::new(),
            capacity,
        }
    }

    pub fn amount(&self, resource: ResourceKind) -> u32 {
        self.slots.get(&resource).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.slots.values().sum()
    }

    pub fn space_left(&self) -> u32 {
        self.capacity.saturating_sub(self.total())
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Add `amount`, bounded by capacity. Returns false (and leaves the
    /// inventory untouched) when the full amount does not fit.
    pub fn add(&mut self, resource: ResourceKind, amount: u32) -> bool {
        if amount == 0 {
            return true;
        }
        if amount > self.space_left() {
            return false;
        }
        *self.slots.entry(resource).or_insert(0) += amount;
        true
    }

    /// Remove up to `amount`; returns how much was actually removed
    pub fn remove(&mut self, resource: ResourceKind, amount: u32) -> u32 {
        let held = self.amount(resource);
        let taken = held.min(amount);
        if taken > 0 {
            let remaining = held - taken;
            if remaining == 0 {
                self.slots.remove(&resource);
            } else {
                self.slots.insert(resource, remaining);
            }
        }
        taken
    }

    /// Remove exactly `amount` or fail without mutating
    pub fn remove_exact(&mut self, resource: ResourceKind, amount: u32) -> Result<(), InventoryError> {
        let held = self.amount(resource);
        if held < amount {
            return Err(InventoryError::Insufficient {
                resource,
                requested: amount,
                held,
            });
        }
        self.remove(resource, amount);
        Ok(())
    }

    pub fn slots(&self) -> &HashMap<ResourceKind, u32> {
        &self.slots
    }

    /// Scale one slot down by a fraction, flooring the loss. Returns units lost.
    pub fn spoil(&mut self, resource: ResourceKind, fraction: f32) -> u32 {
        let held = self.amount(resource);
        let loss = (held as f32 * fraction).floor() as u32;
        self.remove(resource, loss)
    }
}

/// Validate-then-apply transfer between two inventories. On any shortfall or
/// capacity overflow neither side is mutated.
pub fn transfer(
    from: &mut Inventory,
    to: &mut Inventory,
    amounts: &HashMap<ResourceKind, u32>,
) -> Result<(), InventoryError> {
    let moving: u32 = amounts.values().sum();
    for (&resource, &amount) in amounts {
        let held = from.amount(resource);
        if held < amount {
            return Err(InventoryError::Insufficient {
                resource,
                requested: amount,
                held,
            });
        }
    }
    if moving > to.space_left() {
        return Err(InventoryError::CapacityExceeded {
            adding: moving,
            used: to.total(),
            capacity: to.capacity,
        });
    }

    for (&resource, &amount) in amounts {
        from.remove(resource, amount);
        let added = to.add(resource, amount);
        debug_assert!(added, "transfer validated but add failed");
    }
    Ok(())
}

// ============================================================================
// STOCKPILES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockpileKind {
    General,
    Food,
    Materials,
}

/// Inventory bound to a zone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stockpile {
    pub id: EntityId,
    pub zone_id: EntityId,
    pub kind: StockpileKind,
    pub inventory: Inventory,
}

impl Stockpile {
    pub fn new(id: EntityId, zone_id: EntityId, kind: StockpileKind) -> Self {
        Self {
            id,
            zone_id,
            kind,
            inventory: Inventory::new(STOCKPILE_CAPACITY),
        }
    }
}

// ============================================================================
// RESERVATIONS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationEntry {
    pub cost: MaterialCost,
    pub created_at: f64,
}

/// Named pending claims on (wood, stone). The ledger itself only stores the
/// intents; supply math against stockpiles and global materials lives in the
/// reservation system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReservationLedger {
    entries: HashMap<EntityId, ReservationEntry>,
    /// Raised by need satisfaction so the next update runs an early sweep
    pub sweep_requested: bool,
}

impl ReservationLedger {
    pub fn get(&self, task_id: &EntityId) -> Option<&ReservationEntry> {
        self.entries.get(task_id)
    }

    pub fn insert(&mut self, task_id: EntityId, cost: MaterialCost, now: f64) {
        self.entries.insert(
            task_id,
            ReservationEntry {
                cost,
                created_at: now,
            },
        );
    }

    pub fn remove(&mut self, task_id: &EntityId) -> Option<ReservationEntry> {
        self.entries.remove(task_id)
    }

    pub fn total_reserved(&self) -> MaterialCost {
        let mut total = MaterialCost::default();
        for entry in self.entries.values() {
            total.wood += entry.cost.wood;
            total.stone += entry.cost.stone;
        }
        total
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries older than `max_age` seconds, returning the dropped ids
    pub fn drop_stale(&mut self, now: f64, max_age: f64) -> Vec<EntityId> {
        let stale: Vec<EntityId> = self
            .entries
            .iter()
            .filter(|(_, e)| now - e.created_at > max_age)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            self.entries.remove(id);
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amounts(pairs: &[(ResourceKind, u32)]) -> HashMap<ResourceKind, u32> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_add_bounded_by_capacity() {
        let mut inv = Inventory::new(10);
        assert!(inv.add(ResourceKind::Wood, 7));
        assert!(!inv.add(ResourceKind::Stone, 4));
        assert_eq!(inv.total(), 7);
        assert!(inv.add(ResourceKind::Stone, 3));
        assert_eq!(inv.space_left(), 0);
    }

    #[test]
    fn test_remove_partial() {
        let mut inv = Inventory::new(50);
        inv.add(ResourceKind::Food, 5);
        assert_eq!(inv.remove(ResourceKind::Food, 8), 5);
        assert_eq!(inv.amount(ResourceKind::Food), 0);
    }

    #[test]
    fn test_transfer_atomic_on_shortfall() {
        let mut from = Inventory::new(50);
        let mut to = Inventory::new(50);
        from.add(ResourceKind::Wood, 5);
        from.add(ResourceKind::Stone, 2);

        let result = transfer(
            &mut from,
            &mut to,
            &amounts(&[(ResourceKind::Wood, 3), (ResourceKind::Stone, 4)]),
        );
        assert!(matches!(
            result,
            Err(InventoryError::Insufficient {
                resource: ResourceKind::Stone,
                ..
            })
        ));
        assert_eq!(from.amount(ResourceKind::Wood), 5);
        assert_eq!(from.amount(ResourceKind::Stone), 2);
        assert_eq!(to.total(), 0);
    }

    #[test]
    fn test_transfer_atomic_on_capacity() {
        let mut from = Inventory::new(50);
        let mut to = Inventory::new(4);
        from.add(ResourceKind::Wood, 10);

        let result = transfer(&mut from, &mut to, &amounts(&[(ResourceKind::Wood, 5)]));
        assert!(matches!(result, Err(InventoryError::CapacityExceeded { .. })));
        assert_eq!(from.amount(ResourceKind::Wood), 10);
        assert_eq!(to.total(), 0);
    }

    #[test]
    fn test_transfer_moves_all_keys() {
        let mut from = Inventory::new(50);
        let mut to = Inventory::new(50);
        from.add(ResourceKind::Wood, 5);
        from.add(ResourceKind::Food, 3);

        transfer(
            &mut from,
            &mut to,
            &amounts(&[(ResourceKind::Wood, 5), (ResourceKind::Food, 2)]),
        )
        .unwrap();
        assert_eq!(from.amount(ResourceKind::Wood), 0);
        assert_eq!(from.amount(ResourceKind::Food), 1);
        assert_eq!(to.amount(ResourceKind::Wood), 5);
        assert_eq!(to.amount(ResourceKind::Food), 2);
    }

    #[test]
    fn test_spoil_floors_loss() {
        let mut inv = Inventory::new(1000);
        inv.add(ResourceKind::Food, 49);
        assert_eq!(inv.spoil(ResourceKind::Food, 0.02), 0);
        inv.add(ResourceKind::Food, 51);
        assert_eq!(inv.spoil(ResourceKind::Food, 0.02), 2);
    }

    #[test]
    fn test_ledger_stale_drop() {
        let mut ledger = ReservationLedger::default();
        ledger.insert(EntityId::from("task_1"), MaterialCost::new(10, 0), 0.0);
        ledger.insert(EntityId::from("task_2"), MaterialCost::new(5, 5), 200.0);

        let dropped = ledger.drop_stale(301.0, 300.0);
        assert_eq!(dropped, vec![EntityId::from("task_1")]);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.total_reserved(), MaterialCost::new(5, 5));
    }
}
