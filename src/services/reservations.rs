//! Reservation Manager
//!
//! Soft holds against available stock. A live reservation row always has a
//! positive quantity, and the quantities of an item's live reservations sum
//! to its `reserved_quantity`.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::config::InventorySettings;
use crate::db::{self, with_retry};
use crate::entities::inventory_adjustment::reference;
use crate::entities::{inventory_adjustment, inventory_item, inventory_reservation, AdjustmentType};
use crate::errors::ServiceError;
use crate::events::{
    EventPublisher, InventoryEvent, ReservationFulfilled, ReservationReleased, StockReserved,
};
use crate::metrics;
use crate::services::adjustments::{self, NewAdjustment};
use crate::services::{alerts, ledger, publish_committed};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReserveRequest {
    pub inventory_item_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub reason: String,
    /// Usually the order the stock is held for.
    pub reference_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentResult {
    pub reservation_id: Uuid,
    pub quantity_fulfilled: i32,
    /// Units still held; zero when the reservation was consumed and deleted.
    pub remaining_quantity: i32,
    pub item: inventory_item::Model,
    pub adjustment: inventory_adjustment::Model,
}

impl FulfillmentResult {
    pub fn is_complete(&self) -> bool {
        self.remaining_quantity == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupResult {
    pub released_count: u64,
    pub failed_count: u64,
    pub cleaned_at: DateTime<Utc>,
}

async fn load_reservation_for_update<C: ConnectionTrait>(
    conn: &C,
    reservation_id: Uuid,
) -> Result<inventory_reservation::Model, ServiceError> {
    let mut query = inventory_reservation::Entity::find_by_id(reservation_id);
    if db::supports_row_locks(conn) {
        query = query.lock_exclusive();
    }
    query
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Reservation", reservation_id))
}

/// Places a reservation inside the caller's transaction.
pub async fn reserve_in<C: ConnectionTrait>(
    conn: &C,
    request: &ReserveRequest,
    events: &mut Vec<InventoryEvent>,
) -> Result<inventory_reservation::Model, ServiceError> {
    if request.quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "reservation quantity must be positive".to_string(),
        ));
    }

    let current = ledger::load_item_for_update(conn, request.inventory_item_id).await?;
    if current.available_quantity < request.quantity {
        return Err(ServiceError::InsufficientInventory {
            item_id: current.id,
            available: current.available_quantity,
            requested: request.quantity,
        });
    }

    let next = inventory_item::Model {
        reserved_quantity: current.reserved_quantity + request.quantity,
        ..current.clone()
    };
    let item = ledger::write_item(conn, &current, next).await?;

    let reservation = inventory_reservation::ActiveModel {
        id: Set(Uuid::new_v4()),
        inventory_item_id: Set(item.id),
        quantity: Set(request.quantity),
        reason: Set(request.reason.clone()),
        reference_id: Set(request.reference_id),
        expires_at: Set(request.expires_at),
        created_by: Set(request.created_by),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    events.push(InventoryEvent::Reserved(StockReserved {
        inventory_item_id: item.id,
        location_id: item.location_id,
        reservation_id: reservation.id,
        quantity: reservation.quantity,
        reference_id: reservation.reference_id,
        reserved_quantity: item.reserved_quantity,
        available_quantity: item.available_quantity,
    }));
    Ok(reservation)
}

/// Releases a reservation inside the caller's transaction.
pub async fn release_in<C: ConnectionTrait>(
    conn: &C,
    reservation_id: Uuid,
    events: &mut Vec<InventoryEvent>,
) -> Result<inventory_reservation::Model, ServiceError> {
    let reservation = load_reservation_for_update(conn, reservation_id).await?;
    let current = ledger::load_item_for_update(conn, reservation.inventory_item_id).await?;

    let next = inventory_item::Model {
        reserved_quantity: (current.reserved_quantity - reservation.quantity).max(0),
        ..current.clone()
    };
    let item = ledger::write_item(conn, &current, next).await?;
    reservation.clone().delete(conn).await?;

    events.push(InventoryEvent::ReservationReleased(ReservationReleased {
        inventory_item_id: item.id,
        location_id: item.location_id,
        reservation_id: reservation.id,
        quantity: reservation.quantity,
        reserved_quantity: item.reserved_quantity,
        available_quantity: item.available_quantity,
    }));
    Ok(reservation)
}

/// Consumes `quantity` units of a reservation inside the caller's
/// transaction: both on-hand and reserved units drop, and a DECREASE
/// adjustment tagged as a reservation is recorded.
pub async fn fulfill_in<C: ConnectionTrait>(
    conn: &C,
    reservation_id: Uuid,
    quantity: i32,
    user_id: Option<Uuid>,
    events: &mut Vec<InventoryEvent>,
) -> Result<FulfillmentResult, ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "fulfilled quantity must be positive".to_string(),
        ));
    }

    let reservation = load_reservation_for_update(conn, reservation_id).await?;
    if quantity > reservation.quantity {
        return Err(ServiceError::BusinessLogic(format!(
            "Cannot fulfill {} units of reservation {} holding {}",
            quantity, reservation.id, reservation.quantity
        )));
    }

    let current = ledger::load_item_for_update(conn, reservation.inventory_item_id).await?;
    let next = inventory_item::Model {
        quantity: (current.quantity - quantity).max(0),
        reserved_quantity: (current.reserved_quantity - quantity).max(0),
        ..current.clone()
    };
    let item = ledger::write_item(conn, &current, next).await?;

    let adjustment = adjustments::insert_adjustment(
        conn,
        item.id,
        NewAdjustment {
            kind: AdjustmentType::Decrease,
            previous_quantity: current.quantity,
            new_quantity: item.quantity,
            reason: format!("Fulfilled reservation: {}", reservation.reason),
            unit_cost: None,
            reference_type: Some(reference::RESERVATION.to_string()),
            reference_id: Some(reservation.id),
            created_by: user_id,
        },
    )
    .await?;

    let remaining_quantity = reservation.quantity - quantity;
    if remaining_quantity == 0 {
        reservation.clone().delete(conn).await?;
    } else {
        let mut active: inventory_reservation::ActiveModel = reservation.clone().into();
        active.quantity = Set(remaining_quantity);
        active.update(conn).await?;
    }

    events.push(InventoryEvent::ReservationFulfilled(ReservationFulfilled {
        inventory_item_id: item.id,
        location_id: item.location_id,
        reservation_id: reservation.id,
        adjustment_id: adjustment.id,
        quantity_fulfilled: quantity,
        remaining_quantity,
        old_quantity: current.quantity,
        new_quantity: item.quantity,
    }));
    events.extend(alerts::evaluate(
        current.quantity,
        current.low_stock_threshold,
        &item,
    ));

    Ok(FulfillmentResult {
        reservation_id: reservation.id,
        quantity_fulfilled: quantity,
        remaining_quantity,
        item,
        adjustment,
    })
}

#[derive(Clone)]
pub struct ReservationService {
    db_pool: Arc<DatabaseConnection>,
    publisher: Arc<dyn EventPublisher>,
    settings: InventorySettings,
}

impl ReservationService {
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
    pub async fn reserve(
        &self,
        request: ReserveRequest,
    ) -> Result<inventory_reservation::Model, ServiceError> {
        let outcome = match request.validate() {
            Ok(()) => {
                let request = &request;
                with_retry(self.settings.retry, "reserve", || async move {
                    let txn = self.db_pool.begin().await?;
                    let mut events = Vec::new();
                    let reservation = reserve_in(&txn, request, &mut events).await?;
                    txn.commit().await?;
                    Ok::<_, ServiceError>((reservation, events))
                })
                .await
            }
            Err(e) => Err(ServiceError::from(e)),
        };

        match outcome {
            Ok((reservation, events)) => {
                metrics::RESERVATIONS.inc();
                info!(
                    reservation_id = %reservation.id,
                    item_id = %reservation.inventory_item_id,
                    quantity = reservation.quantity,
                    "Reserved inventory"
                );
                publish_committed(&*self.publisher, events).await;
                Ok(reservation)
            }
            Err(e) => {
                metrics::RESERVATION_FAILURES
                    .with_label_values(&[e.error_code()])
                    .inc();
                warn!(
                    item_id = %request.inventory_item_id,
                    quantity = request.quantity,
                    error = %e,
                    "Reservation rejected"
                );
                Err(e)
            }
        }
    }

    /// Not idempotent: releasing an id twice fails the second time with
    /// [`ServiceError::NotFound`].
    #[instrument(skip(self))]
    pub async fn release(
        &self,
        reservation_id: Uuid,
    ) -> Result<inventory_reservation::Model, ServiceError> {
        let (reservation, events) = with_retry(self.settings.retry, "release", || async move {
            let txn = self.db_pool.begin().await?;
            let mut events = Vec::new();
            let reservation = release_in(&txn, reservation_id, &mut events).await?;
            txn.commit().await?;
            Ok::<_, ServiceError>((reservation, events))
        })
        .await?;

        info!(
            reservation_id = %reservation.id,
            item_id = %reservation.inventory_item_id,
            quantity = reservation.quantity,
            "Released reservation"
        );
        publish_committed(&*self.publisher, events).await;
        Ok(reservation)
    }

    #[instrument(skip(self))]
    pub async fn fulfill(
        &self,
        reservation_id: Uuid,
        quantity: i32,
        user_id: Option<Uuid>,
    ) -> Result<FulfillmentResult, ServiceError> {
        let (result, events) = with_retry(self.settings.retry, "fulfill", || async move {
            let txn = self.db_pool.begin().await?;
            let mut events = Vec::new();
            let result = fulfill_in(&txn, reservation_id, quantity, user_id, &mut events).await?;
            txn.commit().await?;
            Ok::<_, ServiceError>((result, events))
        })
        .await?;

        info!(
            reservation_id = %reservation_id,
            item_id = %result.item.id,
            quantity_fulfilled = quantity,
            remaining = result.remaining_quantity,
            "Fulfilled reservation"
        );
        publish_committed(&*self.publisher, events).await;
        Ok(result)
    }

    /// Releases every reservation whose `expires_at` is at or before now,
    /// each in its own transaction.
    #[instrument(skip(self))]
    pub async fn cleanup_expired(&self) -> Result<CleanupResult, ServiceError> {
        let now = Utc::now();
        let expired: Vec<Uuid> = inventory_reservation::Entity::find()
            .select_only()
            .column(inventory_reservation::Column::Id)
            .filter(inventory_reservation::Column::ExpiresAt.lte(now))
            .order_by_asc(inventory_reservation::Column::ExpiresAt)
            .into_tuple()
            .all(&*self.db_pool)
            .await?;

        let mut released_count = 0u64;
        let mut failed_count = 0u64;

        for reservation_id in expired {
            match self.release(reservation_id).await {
                Ok(_) => released_count += 1,
                // released by someone else between the scan and now
                Err(ServiceError::NotFound(_)) => {}
                Err(e) => {
                    failed_count += 1;
                    warn!(
                        reservation_id = %reservation_id,
                        error = %e,
                        "Failed to release expired reservation"
                    );
                }
            }
        }

        info!(
            released_count,
            failed_count,
            "Completed expired reservation cleanup"
        );

        Ok(CleanupResult {
            released_count,
            failed_count,
            cleaned_at: now,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<inventory_reservation::Model, ServiceError> {
        inventory_reservation::Entity::find_by_id(reservation_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Reservation", reservation_id))
    }

    #[instrument(skip(self))]
    pub async fn list_reservations_for_item(
        &self,
        item_id: Uuid,
    ) -> Result<Vec<inventory_reservation::Model>, ServiceError> {
        Ok(inventory_reservation::Entity::find()
            .filter(inventory_reservation::Column::InventoryItemId.eq(item_id))
            .order_by_asc(inventory_reservation::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn list_reservations_by_reference(
        &self,
        reference_id: Uuid,
    ) -> Result<Vec<inventory_reservation::Model>, ServiceError> {
        Ok(inventory_reservation::Entity::find()
            .filter(inventory_reservation::Column::ReferenceId.eq(reference_id))
            .order_by_asc(inventory_reservation::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?)
    }
}
