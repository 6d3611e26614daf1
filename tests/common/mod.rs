#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use atelier_inventory::{
    config::{AppConfig, DecreasePolicy, InventorySettings, RetryPolicy},
    db,
    entities::{inventory_item, location, StockRef},
    events::{InventoryEvent, RecordingPublisher},
    services::ledger::UpdateStockLevelRequest,
    InventoryServices,
};
use sea_orm::DatabaseConnection;
use tempfile::TempDir;
use uuid::Uuid;

/// Services over a fresh in-memory SQLite database, with every published
/// event captured.
pub struct TestContext {
    pub db: Arc<DatabaseConnection>,
    pub services: InventoryServices,
    pub events: RecordingPublisher,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_settings(test_settings()).await
    }

    pub async fn with_policy(policy: DecreasePolicy) -> Self {
        Self::with_settings(InventorySettings {
            decrease_policy: policy,
            ..test_settings()
        })
        .await
    }

    pub async fn with_settings(settings: InventorySettings) -> Self {
        // A single connection keeps every query on the same in-memory database.
        Self::connect("sqlite::memory:", 1, settings).await
    }

    /// Services over a SQLite file inside `dir`, so that several pooled
    /// connections see the same data and race each other for writes.
    pub async fn file_backed(dir: &TempDir, max_connections: u32, settings: InventorySettings) -> Self {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("inventory.db").display());
        Self::connect(&url, max_connections, settings).await
    }

    async fn connect(url: &str, max_connections: u32, settings: InventorySettings) -> Self {
        let mut cfg = AppConfig::new(url, "test");
        cfg.db_max_connections = max_connections;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let db = Arc::new(pool);
        let events = RecordingPublisher::new();
        let services = InventoryServices::new(db.clone(), Arc::new(events.clone()), settings);

        Self {
            db,
            services,
            events,
        }
    }

    pub async fn location(&self, code: &str) -> location::Model {
        self.services
            .ledger
            .create_location(&format!("{} warehouse", code), code)
            .await
            .expect("create location")
    }

    /// Sets `stock` at `location_id` to `quantity` and clears recorded events.
    pub async fn stock(
        &self,
        stock: StockRef,
        location_id: Uuid,
        quantity: i32,
        threshold: i32,
    ) -> inventory_item::Model {
        let item = self
            .services
            .ledger
            .update_stock_level(UpdateStockLevelRequest {
                stock,
                location_id,
                quantity,
                low_stock_threshold: Some(threshold),
                updated_by: None,
            })
            .await
            .expect("stock item");
        self.events.clear();
        item
    }

    pub async fn item(&self, item_id: Uuid) -> inventory_item::Model {
        self.services
            .ledger
            .get_item(item_id)
            .await
            .expect("load item")
    }

    pub fn low_stock_events(&self) -> Vec<InventoryEvent> {
        self.events.of_type("inventory:lowStock")
    }
}

pub fn test_settings() -> InventorySettings {
    InventorySettings {
        decrease_policy: DecreasePolicy::Clamp,
        default_low_stock_threshold: 10,
        retry: RetryPolicy::new(3, Duration::from_millis(1)),
    }
}

pub fn product() -> StockRef {
    StockRef::Product(Uuid::new_v4())
}

pub fn variant() -> StockRef {
    StockRef::Variant(Uuid::new_v4())
}

/// `available_quantity` must always equal `max(0, quantity - reserved)`.
pub fn assert_consistent(item: &inventory_item::Model) {
    assert!(item.quantity >= 0, "negative quantity: {:?}", item);
    assert!(item.reserved_quantity >= 0, "negative reserved: {:?}", item);
    assert_eq!(
        item.available_quantity,
        (item.quantity - item.reserved_quantity).max(0),
        "available out of sync: {:?}",
        item
    );
}
