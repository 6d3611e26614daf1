//! Edge-triggered low-stock evaluation.
//!
//! Alerts are derived from a before/after pair of ledger values and never
//! stored. An item alerts once when it moves from above its threshold to at or
//! below it; further changes while it stays low are silent.

use tracing::warn;

use crate::entities::inventory_item;
use crate::events::{InventoryEvent, LowStock};

/// True when the item was above its threshold before and is at or below it
/// now. Covers quantity changes and threshold changes alike.
pub fn became_low_stock(
    old_quantity: i32,
    old_threshold: i32,
    new_quantity: i32,
    new_threshold: i32,
) -> bool {
    old_quantity > old_threshold && new_quantity <= new_threshold
}

/// Quantity moved across a fixed threshold.
pub fn crossed_low_stock(old_quantity: i32, new_quantity: i32, threshold: i32) -> bool {
    became_low_stock(old_quantity, threshold, new_quantity, threshold)
}

/// Threshold moved so that an unchanged quantity is now low.
pub fn threshold_crossed(quantity: i32, old_threshold: i32, new_threshold: i32) -> bool {
    became_low_stock(quantity, old_threshold, quantity, new_threshold)
}

/// Returns the `inventory:lowStock` event for `item` if the change from
/// (`old_quantity`, `old_threshold`) to its current values crossed the
/// threshold.
pub fn evaluate(
    old_quantity: i32,
    old_threshold: i32,
    item: &inventory_item::Model,
) -> Option<InventoryEvent> {
    if !became_low_stock(
        old_quantity,
        old_threshold,
        item.quantity,
        item.low_stock_threshold,
    ) {
        return None;
    }

    warn!(
        item_id = %item.id,
        location_id = %item.location_id,
        quantity = item.quantity,
        threshold = item.low_stock_threshold,
        "Inventory item is low on stock"
    );

    Some(InventoryEvent::LowStock(LowStock {
        inventory_item_id: item.id,
        location_id: item.location_id,
        product_id: item.product_id,
        variant_id: item.variant_id,
        quantity: item.quantity,
        threshold: item.low_stock_threshold,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_only_on_the_downward_crossing() {
        assert!(crossed_low_stock(15, 5, 10));
        assert!(crossed_low_stock(11, 10, 10));
        assert!(!crossed_low_stock(5, 4, 10));
        assert!(!crossed_low_stock(10, 9, 10));
        assert!(!crossed_low_stock(20, 11, 10));
        assert!(!crossed_low_stock(5, 15, 10));
    }

    #[test]
    fn raising_the_threshold_can_fire_retroactively() {
        assert!(threshold_crossed(8, 5, 10));
        assert!(threshold_crossed(10, 9, 10));
        assert!(!threshold_crossed(8, 10, 12));
        assert!(!threshold_crossed(20, 5, 10));
        assert!(!threshold_crossed(8, 10, 5));
    }
}
