// Inventory engine components
pub mod adjustments;
pub mod alerts;
pub mod ledger;
pub mod reservations;
pub mod transfers;

use std::sync::Arc;

use crate::config::InventorySettings;
use crate::db::DbPool;
use crate::events::{EventPublisher, InventoryEvent};
use crate::metrics;

pub use adjustments::AdjustmentService;
pub use ledger::LedgerService;
pub use reservations::ReservationService;
pub use transfers::TransferService;

/// Publishes events collected by a transaction that has committed.
pub(crate) async fn publish_committed(publisher: &dyn EventPublisher, events: Vec<InventoryEvent>) {
    let low_stock = events
        .iter()
        .filter(|event| matches!(event, InventoryEvent::LowStock(_)))
        .count();
    metrics::LOW_STOCK_ALERTS.inc_by(low_stock as u64);
    publisher.publish_all(events).await;
}

/// All inventory services wired over one connection pool and one publisher.
#[derive(Clone)]
pub struct InventoryServices {
    pub ledger: Arc<LedgerService>,
    pub reservations: Arc<ReservationService>,
    pub adjustments: Arc<AdjustmentService>,
    pub transfers: Arc<TransferService>,
}

impl InventoryServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        publisher: Arc<dyn EventPublisher>,
        settings: InventorySettings,
    ) -> Self {
        Self {
            ledger: Arc::new(LedgerService::new(
                db_pool.clone(),
                publisher.clone(),
                settings.clone(),
            )),
            reservations: Arc::new(ReservationService::new(
                db_pool.clone(),
                publisher.clone(),
                settings.clone(),
            )),
            adjustments: Arc::new(AdjustmentService::new(
                db_pool.clone(),
                publisher.clone(),
                settings.clone(),
            )),
            transfers: Arc::new(TransferService::new(db_pool, publisher, settings)),
        }
    }
}
