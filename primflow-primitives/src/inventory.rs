//! Inventory checks and allocation.

use crate::keys;
use crate::order::{Order, OrderItem};
use crate::services::InventoryService;
use primflow_core::{ExecutionContext, Primitive, PrimitiveError, PrimitiveResult};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Records per-item availability under `itemsAvailable`. Fails unless every
/// item is available.
pub struct CheckInventory {
    inventory: Arc<dyn InventoryService>,
}

impl CheckInventory {
    pub fn new(inventory: Arc<dyn InventoryService>) -> Self {
        Self { inventory }
    }
}

impl Primitive for CheckInventory {
    fn execute(&self, ctx: &ExecutionContext) -> Result<PrimitiveResult, PrimitiveError> {
        let order = match Order::from_context(ctx) {
            Ok(order) => order,
            Err(failure) => return Ok(failure),
        };
        let items = match order.require_items() {
            Ok(items) => items,
            Err(failure) => return Ok(failure),
        };

        let mut availability = Map::new();
        let mut all_available = true;
        for item in items {
            let available = self.inventory.is_available(&item.id, item.quantity)?;
            availability.insert(item.id.clone(), Value::Bool(available));
            all_available &= available;
        }

        let result = if all_available {
            PrimitiveResult::ok()
        } else {
            PrimitiveResult::failed_with("items out of stock")
        };
        Ok(result
            .with(keys::INVENTORY_CHECKED, true)
            .with(keys::ITEMS_AVAILABLE, availability))
    }
}

/// Reserves stock for every item previously reported available.
///
/// Allocation is all or nothing: if any item cannot be reserved, the
/// reservations already made are released before the failure is reported.
pub struct AllocateInventory {
    inventory: Arc<dyn InventoryService>,
}

impl AllocateInventory {
    pub fn new(inventory: Arc<dyn InventoryService>) -> Self {
        Self { inventory }
    }

    fn release_all(&self, reserved: &[&OrderItem]) {
        for item in reserved {
            if let Err(e) = self.inventory.release(&item.id, item.quantity) {
                tracing::warn!("Failed to release {} x{}: {}", item.id, item.quantity, e);
            }
        }
    }
}

impl Primitive for AllocateInventory {
    fn execute(&self, ctx: &ExecutionContext) -> Result<PrimitiveResult, PrimitiveError> {
        let order = match Order::from_context(ctx) {
            Ok(order) => order,
            Err(failure) => return Ok(failure),
        };

        let available: BTreeMap<String, bool> = match ctx.get_as(keys::ITEMS_AVAILABLE) {
            Ok(Some(map)) => map,
            _ => return Ok(PrimitiveResult::failed_with("inventory check not performed")),
        };

        let items = match order.require_items() {
            Ok(items) => items,
            Err(failure) => return Ok(failure),
        };

        if let Some(item) = items
            .iter()
            .find(|item| !available.get(&item.id).copied().unwrap_or(false))
        {
            tracing::debug!("Item {} was not reported available", item.id);
            return Ok(allocation_failed());
        }

        let mut allocations = Map::new();
        let mut reserved: Vec<&OrderItem> = Vec::new();
        for item in items {
            match self.inventory.allocate(&item.id, item.quantity) {
                Ok(Some(allocation)) => {
                    allocations.insert(item.id.clone(), Value::String(allocation));
                    reserved.push(item);
                }
                Ok(None) => {
                    self.release_all(&reserved);
                    return Ok(allocation_failed());
                }
                Err(e) => {
                    self.release_all(&reserved);
                    return Err(e);
                }
            }
        }

        Ok(PrimitiveResult::ok()
            .with(keys::INVENTORY_ALLOCATED, true)
            .with(keys::ALLOCATIONS, allocations))
    }
}

fn allocation_failed() -> PrimitiveResult {
    PrimitiveResult::failed_with("inventory allocation failed")
        .with(keys::INVENTORY_ALLOCATED, false)
        .with(keys::ALLOCATIONS, Map::new())
}
