//! Prometheus counters for the inventory engine.
//!
//! The counters are process-wide. Call [`register`] once with the registry
//! that the hosting process exposes.

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    pub static ref RESERVATIONS: IntCounter = IntCounter::new(
        "inventory_reservations_total",
        "Total number of inventory reservations"
    )
    .expect("metric can be created");
    pub static ref RESERVATION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "inventory_reservation_failures_total",
            "Total number of failed inventory reservations"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
    pub static ref ADJUSTMENTS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "inventory_adjustments_total",
            "Total number of inventory adjustments by type"
        ),
        &["type"]
    )
    .expect("metric can be created");
    pub static ref TRANSFERS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "inventory_transfers_total",
            "Total number of transfer workflow steps by stage"
        ),
        &["stage"]
    )
    .expect("metric can be created");
    pub static ref LOW_STOCK_ALERTS: IntCounter = IntCounter::new(
        "inventory_low_stock_alerts_total",
        "Total number of low stock alerts raised"
    )
    .expect("metric can be created");
    pub static ref CONCURRENT_MODIFICATIONS: IntCounter = IntCounter::new(
        "inventory_concurrent_modifications_total",
        "Total number of optimistic lock conflicts"
    )
    .expect("metric can be created");
}

/// Registers every inventory counter with `registry`.
pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(RESERVATIONS.clone()))?;
    registry.register(Box::new(RESERVATION_FAILURES.clone()))?;
    registry.register(Box::new(ADJUSTMENTS.clone()))?;
    registry.register(Box::new(TRANSFERS.clone()))?;
    registry.register(Box::new(LOW_STOCK_ALERTS.clone()))?;
    registry.register(Box::new(CONCURRENT_MODIFICATIONS.clone()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_counters_once() {
        let registry = Registry::new();
        register(&registry).unwrap();
        ADJUSTMENTS.with_label_values(&["INCREASE"]).inc();

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"inventory_adjustments_total".to_string()));

        // a second registration of the same collectors is refused
        assert!(register(&registry).is_err());
    }
}
