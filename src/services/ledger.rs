//! Inventory Ledger
//!
//! Single choke point for `inventory_items` rows. Every quantity change in the
//! crate goes through [`write_item`], which recomputes `available_quantity`
//! and applies the write as a compare-and-swap on `version`.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::config::InventorySettings;
use crate::db::{self, with_retry};
use crate::entities::inventory_adjustment::reference;
use crate::entities::{inventory_item, location, AdjustmentType, StockRef};
use crate::errors::ServiceError;
use crate::events::{EventPublisher, InventoryEvent, StockUpdated};
use crate::services::adjustments::{self, NewAdjustment};
use crate::services::{alerts, publish_committed};

/// `max(0, quantity - reserved_quantity)`.
pub fn available_quantity(quantity: i32, reserved_quantity: i32) -> i32 {
    (quantity - reserved_quantity).max(0)
}

/// Loads an item inside the caller's transaction, taking a row lock where the
/// backend supports it.
pub async fn load_item_for_update<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
) -> Result<inventory_item::Model, ServiceError> {
    let mut query = inventory_item::Entity::find_by_id(item_id);
    if db::supports_row_locks(conn) {
        query = query.lock_exclusive();
    }
    query
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Inventory item", item_id))
}

pub async fn find_item_at<C: ConnectionTrait>(
    conn: &C,
    stock: StockRef,
    location_id: Uuid,
) -> Result<Option<inventory_item::Model>, ServiceError> {
    let mut query = inventory_item::Entity::find().filter(stock.at_location(location_id));
    if db::supports_row_locks(conn) {
        query = query.lock_exclusive();
    }
    Ok(query.one(conn).await?)
}

pub async fn require_location<C: ConnectionTrait>(
    conn: &C,
    location_id: Uuid,
) -> Result<location::Model, ServiceError> {
    location::Entity::find_by_id(location_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Location", location_id))
}

/// Returns the row for `stock` at `location_id`, creating an empty one if
/// none exists yet.
///
/// Two callers racing to create the same row both try to insert; the loser
/// hits the unique index and gets [`ServiceError::ConcurrentModification`],
/// which makes its retry find the winner's row.
pub async fn ensure_item<C: ConnectionTrait>(
    conn: &C,
    stock: StockRef,
    location_id: Uuid,
    default_threshold: i32,
) -> Result<inventory_item::Model, ServiceError> {
    if let Some(item) = find_item_at(conn, stock, location_id).await? {
        return Ok(item);
    }

    require_location(conn, location_id).await?;

    let id = Uuid::new_v4();
    let now = Utc::now();
    let model = inventory_item::ActiveModel {
        id: Set(id),
        product_id: Set(stock.product_id()),
        variant_id: Set(stock.variant_id()),
        stock_key: Set(stock.key()),
        location_id: Set(location_id),
        quantity: Set(0),
        reserved_quantity: Set(0),
        available_quantity: Set(0),
        low_stock_threshold: Set(default_threshold.max(0)),
        average_cost: Set(None),
        last_cost: Set(None),
        version: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    };

    match model.insert(conn).await {
        Ok(item) => {
            info!(item_id = %item.id, %stock, location_id = %location_id, "Created inventory item");
            Ok(item)
        }
        Err(e) if db::is_unique_violation(&e) => Err(ServiceError::ConcurrentModification(id)),
        Err(e) => Err(ServiceError::db_error(e)),
    }
}

/// Persists `next` over `current`.
///
/// Quantities are clamped at zero and `available_quantity` is recomputed from
/// them; whatever `next.available_quantity` holds is ignored. Fails with
/// [`ServiceError::ConcurrentModification`] if the row changed since
/// `current` was read.
pub async fn write_item<C: ConnectionTrait>(
    conn: &C,
    current: &inventory_item::Model,
    next: inventory_item::Model,
) -> Result<inventory_item::Model, ServiceError> {
    let quantity = next.quantity.max(0);
    let reserved_quantity = next.reserved_quantity.max(0);
    let available = available_quantity(quantity, reserved_quantity);
    let version = current.version + 1;
    let now = Utc::now();

    let result = inventory_item::Entity::update_many()
        .col_expr(inventory_item::Column::Quantity, Expr::value(quantity))
        .col_expr(
            inventory_item::Column::ReservedQuantity,
            Expr::value(reserved_quantity),
        )
        .col_expr(inventory_item::Column::AvailableQuantity, Expr::value(available))
        .col_expr(
            inventory_item::Column::LowStockThreshold,
            Expr::value(next.low_stock_threshold),
        )
        .col_expr(inventory_item::Column::AverageCost, Expr::value(next.average_cost))
        .col_expr(inventory_item::Column::LastCost, Expr::value(next.last_cost))
        .col_expr(inventory_item::Column::Version, Expr::value(version))
        .col_expr(inventory_item::Column::UpdatedAt, Expr::value(now))
        .filter(inventory_item::Column::Id.eq(current.id))
        .filter(inventory_item::Column::Version.eq(current.version))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        warn!(item_id = %current.id, version = current.version, "Stale inventory item write");
        return Err(ServiceError::ConcurrentModification(current.id));
    }

    Ok(inventory_item::Model {
        quantity,
        reserved_quantity,
        available_quantity: available,
        version,
        updated_at: now,
        ..next
    })
}

/// Sets on-hand quantity, keeping reservations untouched.
pub async fn set_quantity<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
    new_quantity: i32,
) -> Result<inventory_item::Model, ServiceError> {
    if new_quantity < 0 {
        return Err(ServiceError::ValidationError(
            "quantity must not be negative".to_string(),
        ));
    }
    let current = load_item_for_update(conn, item_id).await?;
    let next = inventory_item::Model {
        quantity: new_quantity,
        ..current.clone()
    };
    write_item(conn, &current, next).await
}

pub(crate) fn updated_event(old_quantity: i32, item: &inventory_item::Model) -> InventoryEvent {
    InventoryEvent::Updated(StockUpdated {
        inventory_item_id: item.id,
        location_id: item.location_id,
        product_id: item.product_id,
        variant_id: item.variant_id,
        old_quantity,
        new_quantity: item.quantity,
        reserved_quantity: item.reserved_quantity,
        available_quantity: item.available_quantity,
    })
}

/// Absolute stock level for one product or variant at one location.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateStockLevelRequest {
    pub stock: StockRef,
    pub location_id: Uuid,
    #[validate(range(min = 0))]
    pub quantity: i32,
    #[validate(range(min = 0))]
    pub low_stock_threshold: Option<i32>,
    pub updated_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkUpdateFailure {
    /// Position of the failed entry in the submitted batch.
    pub index: usize,
    pub error: String,
    pub error_code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkUpdateReport {
    pub succeeded: Vec<inventory_item::Model>,
    pub failed: Vec<BulkUpdateFailure>,
}

/// Read and stock-level operations on the ledger.
#[derive(Clone)]
pub struct LedgerService {
    db_pool: Arc<DatabaseConnection>,
    publisher: Arc<dyn EventPublisher>,
    settings: InventorySettings,
}

impl LedgerService {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        publisher: Arc<dyn EventPublisher>,
        settings: InventorySettings,
    ) -> Self {
        Self {
            db_pool,
            publisher,
            settings,
        }
    }

    #[instrument(skip(self))]
    pub async fn create_location(
        &self,
        name: &str,
        code: &str,
    ) -> Result<location::Model, ServiceError> {
        if name.trim().is_empty() || code.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "location name and code are required".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let existing = location::Entity::find()
            .filter(location::Column::Code.eq(code))
            .one(db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Location code {} already exists",
                code
            )));
        }

        let model = location::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            code: Set(code.to_string()),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        };
        let created = model.insert(db).await.map_err(|e| {
            if db::is_unique_violation(&e) {
                ServiceError::Conflict(format!("Location code {} already exists", code))
            } else {
                ServiceError::db_error(e)
            }
        })?;

        info!(location_id = %created.id, code = %created.code, "Created location");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_location(&self, location_id: Uuid) -> Result<location::Model, ServiceError> {
        require_location(&*self.db_pool, location_id).await
    }

    #[instrument(skip(self))]
    pub async fn get_item(&self, item_id: Uuid) -> Result<inventory_item::Model, ServiceError> {
        inventory_item::Entity::find_by_id(item_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Inventory item", item_id))
    }

    #[instrument(skip(self))]
    pub async fn find_item(
        &self,
        stock: StockRef,
        location_id: Uuid,
    ) -> Result<Option<inventory_item::Model>, ServiceError> {
        Ok(inventory_item::Entity::find()
            .filter(stock.at_location(location_id))
            .one(&*self.db_pool)
            .await?)
    }

    /// Idempotent: returns the existing row or creates one holding zero units.
    #[instrument(skip(self))]
    pub async fn ensure_item(
        &self,
        stock: StockRef,
        location_id: Uuid,
    ) -> Result<inventory_item::Model, ServiceError> {
        let threshold = self.settings.default_low_stock_threshold;
        with_retry(self.settings.retry, "ensure_item", || async move {
            let txn = self.db_pool.begin().await?;
            let item = ensure_item(&txn, stock, location_id, threshold).await?;
            txn.commit().await?;
            Ok::<_, ServiceError>(item)
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn list_items_for_location(
        &self,
        location_id: Uuid,
    ) -> Result<Vec<inventory_item::Model>, ServiceError> {
        Ok(inventory_item::Entity::find()
            .filter(inventory_item::Column::LocationId.eq(location_id))
            .order_by_asc(inventory_item::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?)
    }

    /// Items whose quantity is at or below their threshold.
    #[instrument(skip(self))]
    pub async fn list_low_stock_items(
        &self,
        location_id: Option<Uuid>,
    ) -> Result<Vec<inventory_item::Model>, ServiceError> {
        let mut query = inventory_item::Entity::find().filter(
            Expr::col(inventory_item::Column::Quantity)
                .lte(Expr::col(inventory_item::Column::LowStockThreshold)),
        );
        if let Some(location_id) = location_id {
            query = query.filter(inventory_item::Column::LocationId.eq(location_id));
        }
        Ok(query
            .order_by_asc(inventory_item::Column::Quantity)
            .all(&*self.db_pool)
            .await?)
    }

    /// Sets the absolute on-hand quantity (and optionally the threshold),
    /// recording a SET adjustment.
    #[instrument(skip(self))]
    pub async fn update_stock_level(
        &self,
        request: UpdateStockLevelRequest,
    ) -> Result<inventory_item::Model, ServiceError> {
        request.validate()?;
        let request = &request;

        let (item, events) = with_retry(self.settings.retry, "update_stock_level", || async move {
            let txn = self.db_pool.begin().await?;
            let mut events = Vec::new();
            let item = self.update_stock_level_in(&txn, request, &mut events).await?;
            txn.commit().await?;
            Ok::<_, ServiceError>((item, events))
        })
        .await?;

        publish_committed(&*self.publisher, events).await;
        Ok(item)
    }

    async fn update_stock_level_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        request: &UpdateStockLevelRequest,
        events: &mut Vec<InventoryEvent>,
    ) -> Result<inventory_item::Model, ServiceError> {
        let current = ensure_item(
            conn,
            request.stock,
            request.location_id,
            self.settings.default_low_stock_threshold,
        )
        .await?;

        let next = inventory_item::Model {
            quantity: request.quantity,
            low_stock_threshold: request
                .low_stock_threshold
                .unwrap_or(current.low_stock_threshold),
            ..current.clone()
        };
        let item = write_item(conn, &current, next).await?;

        adjustments::insert_adjustment(
            conn,
            item.id,
            NewAdjustment {
                kind: AdjustmentType::Set,
                previous_quantity: current.quantity,
                new_quantity: item.quantity,
                reason: "Stock level update".to_string(),
                unit_cost: None,
                reference_type: Some(reference::STOCK_LEVEL.to_string()),
                reference_id: None,
                created_by: request.updated_by,
            },
        )
        .await?;

        info!(
            item_id = %item.id,
            location_id = %item.location_id,
            old_quantity = current.quantity,
            new_quantity = item.quantity,
            "Updated stock level"
        );

        events.push(updated_event(current.quantity, &item));
        events.extend(alerts::evaluate(
            current.quantity,
            current.low_stock_threshold,
            &item,
        ));
        Ok(item)
    }

    /// Applies each update in its own transaction and reports per-entry
    /// outcomes; one failure does not stop the rest.
    #[instrument(skip(self, updates), fields(count = updates.len()))]
    pub async fn bulk_update_stock_levels(
        &self,
        updates: Vec<UpdateStockLevelRequest>,
    ) -> BulkUpdateReport {
        let mut report = BulkUpdateReport::default();

        for (index, update) in updates.into_iter().enumerate() {
            match self.update_stock_level(update).await {
                Ok(item) => report.succeeded.push(item),
                Err(e) => {
                    warn!(index, error = %e, "Bulk stock level update entry failed");
                    report.failed.push(BulkUpdateFailure {
                        index,
                        error_code: e.error_code().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Completed bulk stock level update"
        );
        report
    }

    /// Changes the alert threshold and re-evaluates the item against it.
    #[instrument(skip(self))]
    pub async fn update_threshold(
        &self,
        item_id: Uuid,
        threshold: i32,
    ) -> Result<inventory_item::Model, ServiceError> {
        if threshold < 0 {
            return Err(ServiceError::ValidationError(
                "low_stock_threshold must not be negative".to_string(),
            ));
        }

        let (item, events) = with_retry(self.settings.retry, "update_threshold", || async move {
            let txn = self.db_pool.begin().await?;
            let current = load_item_for_update(&txn, item_id).await?;
            let next = inventory_item::Model {
                low_stock_threshold: threshold,
                ..current.clone()
            };
            let item = write_item(&txn, &current, next).await?;
            txn.commit().await?;

            let events: Vec<InventoryEvent> =
                alerts::evaluate(current.quantity, current.low_stock_threshold, &item)
                    .into_iter()
                    .collect();
            Ok::<_, ServiceError>((item, events))
        })
        .await?;

        info!(item_id = %item.id, threshold, "Updated low stock threshold");
        publish_committed(&*self.publisher, events).await;
        Ok(item)
    }
}
