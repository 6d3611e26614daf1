//! Adjustment Engine
//!
//! Applies INCREASE / DECREASE / SET corrections to an item, appends the
//! immutable adjustment row and keeps the weighted-average unit cost.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::config::{DecreasePolicy, InventorySettings};
use crate::db::with_retry;
use crate::entities::inventory_adjustment::reference;
use crate::entities::{inventory_adjustment, inventory_item, AdjustmentType};
use crate::errors::ServiceError;
use crate::events::{EventPublisher, InventoryEvent, StockAdjusted};
use crate::metrics;
use crate::services::{alerts, ledger, publish_committed};

/// Quantity after applying an adjustment, and the signed change that was
/// actually applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantityChange {
    pub new_quantity: i32,
    pub actual_change: i32,
}

/// Computes the effect of an adjustment on `current` on-hand units.
///
/// For [`AdjustmentType::Set`] `quantity_change` is the absolute target. A
/// DECREASE larger than `current` clamps at zero, or fails under
/// [`DecreasePolicy::Reject`].
pub fn apply_change(
    kind: AdjustmentType,
    current: i32,
    quantity_change: i32,
    policy: DecreasePolicy,
) -> Result<QuantityChange, ServiceError> {
    if quantity_change < 0 {
        return Err(ServiceError::ValidationError(
            "quantity_change must not be negative".to_string(),
        ));
    }

    let new_quantity = match kind {
        AdjustmentType::Increase => current.checked_add(quantity_change).ok_or_else(|| {
            ServiceError::ValidationError("resulting quantity is out of range".to_string())
        })?,
        AdjustmentType::Decrease => {
            if quantity_change > current && policy == DecreasePolicy::Reject {
                return Err(ServiceError::BusinessLogic(format!(
                    "Cannot decrease by {}: only {} on hand",
                    quantity_change, current
                )));
            }
            (current - quantity_change).max(0)
        }
        AdjustmentType::Set => quantity_change,
    };

    Ok(QuantityChange {
        new_quantity,
        actual_change: new_quantity - current,
    })
}

/// Largest unit cost that fits the `DECIMAL(19, 4)` cost columns.
pub fn max_unit_cost() -> Decimal {
    Decimal::from_i128_with_scale(9_999_999_999_999_999_999, 4)
}

fn cost_out_of_range() -> ServiceError {
    ServiceError::ValidationError("cost is out of range".to_string())
}

/// Weighted-average unit cost after receiving `added` units at `unit_cost`.
///
/// An item with no recorded cost is treated as if its existing units cost
/// `unit_cost`. Falls back to `unit_cost` when `new_quantity` is zero.
pub fn weighted_average_cost(
    average_cost: Option<Decimal>,
    old_quantity: i32,
    unit_cost: Decimal,
    added: i32,
    new_quantity: i32,
) -> Result<Decimal, ServiceError> {
    if new_quantity <= 0 {
        return Ok(unit_cost);
    }
    let previous = average_cost.unwrap_or(unit_cost);
    previous
        .checked_mul(Decimal::from(old_quantity.max(0)))
        .and_then(|held| {
            unit_cost
                .checked_mul(Decimal::from(added))
                .and_then(|incoming| held.checked_add(incoming))
        })
        .and_then(|total| total.checked_div(Decimal::from(new_quantity)))
        .ok_or_else(cost_out_of_range)
}

/// Fields of an adjustment row about to be appended.
#[derive(Debug, Clone)]
pub struct NewAdjustment {
    pub kind: AdjustmentType,
    pub previous_quantity: i32,
    pub new_quantity: i32,
    pub reason: String,
    pub unit_cost: Option<Decimal>,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
}

impl NewAdjustment {
    pub fn actual_change(&self) -> i32 {
        self.new_quantity - self.previous_quantity
    }
}

/// Appends an adjustment row; `quantity_change` stores the magnitude and
/// `total_cost_impact` the signed cost of the change.
pub async fn insert_adjustment<C: ConnectionTrait>(
    conn: &C,
    inventory_item_id: Uuid,
    adjustment: NewAdjustment,
) -> Result<inventory_adjustment::Model, ServiceError> {
    let actual_change = adjustment.actual_change();
    let total_cost_impact = adjustment
        .unit_cost
        .map(|cost| {
            cost.checked_mul(Decimal::from(actual_change))
                .ok_or_else(cost_out_of_range)
        })
        .transpose()?;

    let model = inventory_adjustment::ActiveModel {
        id: Set(Uuid::new_v4()),
        inventory_item_id: Set(inventory_item_id),
        adjustment_type: Set(adjustment.kind.as_str().to_string()),
        quantity_change: Set(actual_change.abs()),
        previous_quantity: Set(adjustment.previous_quantity),
        new_quantity: Set(adjustment.new_quantity),
        reason: Set(adjustment.reason),
        unit_cost: Set(adjustment.unit_cost),
        total_cost_impact: Set(total_cost_impact),
        reference_type: Set(adjustment.reference_type),
        reference_id: Set(adjustment.reference_id),
        created_by: Set(adjustment.created_by),
        created_at: Set(Utc::now()),
    };

    let saved = model.insert(conn).await?;
    metrics::ADJUSTMENTS
        .with_label_values(&[adjustment.kind.as_str()])
        .inc();
    Ok(saved)
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AdjustInventoryRequest {
    pub inventory_item_id: Uuid,
    pub adjustment_type: AdjustmentType,
    /// Units to add or remove; the absolute target for SET.
    #[validate(range(min = 0))]
    pub quantity_change: i32,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    #[validate(custom = "validate_unit_cost")]
    pub unit_cost: Option<Decimal>,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

fn validate_unit_cost(cost: &Decimal) -> Result<(), ValidationError> {
    if cost.is_sign_negative() || *cost > max_unit_cost() {
        let mut err = ValidationError::new("unit_cost");
        err.message = Some("unit_cost must be between 0 and 999999999999999.9999".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentResult {
    pub adjustment: inventory_adjustment::Model,
    pub item: inventory_item::Model,
}

#[derive(Clone)]
pub struct AdjustmentService {
    db_pool: Arc<DatabaseConnection>,
    publisher: Arc<dyn EventPublisher>,
    settings: InventorySettings,
}

impl AdjustmentService {
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
    pub async fn adjust(
        &self,
        request: AdjustInventoryRequest,
    ) -> Result<AdjustmentResult, ServiceError> {
        request.validate()?;
        let request = &request;
        let policy = self.settings.decrease_policy;

        let (result, events) = with_retry(self.settings.retry, "adjust", || async move {
            let txn = self.db_pool.begin().await?;
            let current = ledger::load_item_for_update(&txn, request.inventory_item_id).await?;

            let change = apply_change(
                request.adjustment_type,
                current.quantity,
                request.quantity_change,
                policy,
            )?;

            let mut next = inventory_item::Model {
                quantity: change.new_quantity,
                ..current.clone()
            };
            if let (AdjustmentType::Increase, Some(unit_cost)) =
                (request.adjustment_type, request.unit_cost)
            {
                next.average_cost = Some(weighted_average_cost(
                    current.average_cost,
                    current.quantity,
                    unit_cost,
                    change.actual_change,
                    change.new_quantity,
                )?);
                next.last_cost = Some(unit_cost);
            }

            let item = ledger::write_item(&txn, &current, next).await?;
            let adjustment = insert_adjustment(
                &txn,
                item.id,
                NewAdjustment {
                    kind: request.adjustment_type,
                    previous_quantity: current.quantity,
                    new_quantity: item.quantity,
                    reason: request.reason.clone(),
                    unit_cost: request.unit_cost,
                    reference_type: request
                        .reference_type
                        .clone()
                        .or_else(|| Some(reference::MANUAL.to_string())),
                    reference_id: request.reference_id,
                    created_by: request.user_id,
                },
            )
            .await?;
            txn.commit().await?;

            let mut events = vec![InventoryEvent::Adjusted(StockAdjusted {
                inventory_item_id: item.id,
                location_id: item.location_id,
                adjustment_id: adjustment.id,
                adjustment_type: request.adjustment_type,
                old_quantity: current.quantity,
                new_quantity: item.quantity,
                delta: change.actual_change,
            })];
            events.extend(alerts::evaluate(
                current.quantity,
                current.low_stock_threshold,
                &item,
            ));

            Ok::<_, ServiceError>((AdjustmentResult { adjustment, item }, events))
        })
        .await
        .map_err(|e| {
            warn!(item_id = %request.inventory_item_id, error = %e, "Inventory adjustment failed");
            e
        })?;

        info!(
            item_id = %result.item.id,
            adjustment_id = %result.adjustment.id,
            adjustment_type = %request.adjustment_type,
            new_quantity = result.item.quantity,
            "Adjusted inventory"
        );

        publish_committed(&*self.publisher, events).await;
        Ok(result)
    }

    /// Adjustment history of an item, oldest first.
    #[instrument(skip(self))]
    pub async fn list_adjustments(
        &self,
        item_id: Uuid,
    ) -> Result<Vec<inventory_adjustment::Model>, ServiceError> {
        Ok(inventory_adjustment::Entity::find()
            .filter(inventory_adjustment::Column::InventoryItemId.eq(item_id))
            .order_by_asc(inventory_adjustment::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?)
    }
}
