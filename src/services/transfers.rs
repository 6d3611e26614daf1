//! Transfer Workflow
//!
//! Moves stock between two locations in three steps:
//!
//! * `create` validates the request and reserves each line at the source
//!   (status `PENDING`);
//! * `ship` marks every line as shipped in full (status `SHIPPED`); the source
//!   reservations stay in place;
//! * `receive` adds stock at the destination and fulfills the matching source
//!   reservation. The transfer becomes `RECEIVED` once every line is received
//!   in full, so a partial receipt can be followed by more batches.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::InventorySettings;
use crate::db::{self, with_retry};
use crate::entities::inventory_adjustment::reference;
use crate::entities::{
    inventory_item, inventory_transfer, inventory_transfer_item, AdjustmentType, StockRef,
    TransferStatus,
};
use crate::errors::ServiceError;
use crate::events::{
    EventPublisher, InventoryEvent, TransferCreated, TransferLine, TransferReceived,
    TransferShipped,
};
use crate::metrics;
use crate::services::adjustments::{self, NewAdjustment};
use crate::services::reservations::{self, ReserveRequest};
use crate::services::{alerts, ledger, publish_committed};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferItemRequest {
    pub stock: StockRef,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransferRequest {
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub items: Vec<TransferItemRequest>,
    pub notes: Option<String>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedItem {
    pub transfer_item_id: Uuid,
    pub quantity_received: i32,
}

/// A transfer with its lines in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferDetails {
    pub transfer: inventory_transfer::Model,
    pub items: Vec<inventory_transfer_item::Model>,
}

impl TransferDetails {
    pub fn status(&self) -> Result<TransferStatus, ServiceError> {
        self.transfer.status()
    }

    pub fn is_fully_received(&self) -> bool {
        self.items.iter().all(|line| line.is_fully_received())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveResult {
    pub transfer: TransferDetails,
    pub fully_received: bool,
}

fn line_stock(line: &inventory_transfer_item::Model) -> Result<StockRef, ServiceError> {
    line.stock_ref().ok_or_else(|| {
        ServiceError::InternalError(format!(
            "Transfer item {} has neither product nor variant",
            line.id
        ))
    })
}

async fn load_transfer_for_update<C: ConnectionTrait>(
    conn: &C,
    transfer_id: Uuid,
) -> Result<inventory_transfer::Model, ServiceError> {
    let mut query = inventory_transfer::Entity::find_by_id(transfer_id);
    if db::supports_row_locks(conn) {
        query = query.lock_exclusive();
    }
    query
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Transfer", transfer_id))
}

async fn load_lines<C: ConnectionTrait>(
    conn: &C,
    transfer_id: Uuid,
) -> Result<Vec<inventory_transfer_item::Model>, ServiceError> {
    Ok(inventory_transfer_item::Entity::find()
        .filter(inventory_transfer_item::Column::TransferId.eq(transfer_id))
        .order_by_asc(inventory_transfer_item::Column::LineNumber)
        .all(conn)
        .await?)
}

/// Versioned status write; fails with `ConcurrentModification` if another
/// caller moved the transfer first.
async fn write_transfer<C: ConnectionTrait>(
    conn: &C,
    current: &inventory_transfer::Model,
    next: inventory_transfer::Model,
) -> Result<inventory_transfer::Model, ServiceError> {
    let version = current.version + 1;
    let now = Utc::now();

    let result = inventory_transfer::Entity::update_many()
        .col_expr(inventory_transfer::Column::Status, Expr::value(next.status.clone()))
        .col_expr(
            inventory_transfer::Column::TrackingNumber,
            Expr::value(next.tracking_number.clone()),
        )
        .col_expr(inventory_transfer::Column::ShippedAt, Expr::value(next.shipped_at))
        .col_expr(inventory_transfer::Column::ReceivedAt, Expr::value(next.received_at))
        .col_expr(inventory_transfer::Column::Version, Expr::value(version))
        .col_expr(inventory_transfer::Column::UpdatedAt, Expr::value(now))
        .filter(inventory_transfer::Column::Id.eq(current.id))
        .filter(inventory_transfer::Column::Version.eq(current.version))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrentModification(current.id));
    }

    Ok(inventory_transfer::Model {
        version,
        updated_at: now,
        ..next
    })
}

/// Fails with `BusinessLogic` unless the transfer may move to `next`.
fn require_transition(
    transfer: &inventory_transfer::Model,
    next: TransferStatus,
    action: &str,
) -> Result<(), ServiceError> {
    let status = transfer.status()?;
    if !status.can_transition_to(next) {
        return Err(ServiceError::BusinessLogic(format!(
            "Cannot {} transfer {} in status {}",
            action, transfer.id, status
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct TransferService {
    db_pool: Arc<DatabaseConnection>,
    publisher: Arc<dyn EventPublisher>,
    settings: InventorySettings,
}

impl TransferService {
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

    /// Creates a `PENDING` transfer and reserves every line at the source.
    /// Nothing is persisted if any line fails.
    #[instrument(skip(self))]
    pub async fn create_transfer(
        &self,
        request: CreateTransferRequest,
    ) -> Result<TransferDetails, ServiceError> {
        let request = &request;
        let (details, events) = with_retry(self.settings.retry, "create_transfer", || async move {
            let txn = self.db_pool.begin().await?;
            let mut events = Vec::new();
            let details = Self::create_in(&txn, request, &mut events).await?;
            txn.commit().await?;
            Ok::<_, ServiceError>((details, events))
        })
        .await
        .map_err(|e| {
            warn!(
                from_location_id = %request.from_location_id,
                to_location_id = %request.to_location_id,
                error = %e,
                "Transfer creation rejected"
            );
            e
        })?;

        metrics::TRANSFERS.with_label_values(&["created"]).inc();
        info!(
            transfer_id = %details.transfer.id,
            from_location_id = %details.transfer.from_location_id,
            to_location_id = %details.transfer.to_location_id,
            lines = details.items.len(),
            "Created transfer"
        );
        publish_committed(&*self.publisher, events).await;
        Ok(details)
    }

    async fn create_in<C: ConnectionTrait>(
        conn: &C,
        request: &CreateTransferRequest,
        events: &mut Vec<InventoryEvent>,
    ) -> Result<TransferDetails, ServiceError> {
        ledger::require_location(conn, request.from_location_id).await?;
        ledger::require_location(conn, request.to_location_id).await?;
        if request.from_location_id == request.to_location_id {
            return Err(ServiceError::Conflict(
                "Source and destination locations must differ".to_string(),
            ));
        }
        if request.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "A transfer needs at least one item".to_string(),
            ));
        }
        if let Some(line) = request.items.iter().find(|line| line.quantity <= 0) {
            return Err(ServiceError::ValidationError(format!(
                "Transfer quantity for {} must be positive",
                line.stock
            )));
        }

        let now = Utc::now();
        let transfer = inventory_transfer::ActiveModel {
            id: Set(Uuid::new_v4()),
            from_location_id: Set(request.from_location_id),
            to_location_id: Set(request.to_location_id),
            status: Set(TransferStatus::Pending.as_str().to_string()),
            tracking_number: Set(None),
            notes: Set(request.notes.clone()),
            created_by: Set(request.user_id),
            shipped_at: Set(None),
            received_at: Set(None),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;

        let mut lines = Vec::with_capacity(request.items.len());
        let mut event_lines = Vec::with_capacity(request.items.len());

        for (index, item) in request.items.iter().enumerate() {
            let source = ledger::find_item_at(conn, item.stock, request.from_location_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "No inventory for {} at location {}",
                        item.stock, request.from_location_id
                    ))
                })?;

            let reservation = reservations::reserve_in(
                conn,
                &ReserveRequest {
                    inventory_item_id: source.id,
                    quantity: item.quantity,
                    reason: format!("Transfer {}", transfer.id),
                    reference_id: Some(transfer.id),
                    expires_at: None,
                    created_by: request.user_id,
                },
                events,
            )
            .await?;

            // line numbers start at 1
            let line = inventory_transfer_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                transfer_id: Set(transfer.id),
                line_number: Set(index as i32 + 1),
                product_id: Set(item.stock.product_id()),
                variant_id: Set(item.stock.variant_id()),
                quantity_requested: Set(item.quantity),
                quantity_shipped: Set(0),
                quantity_received: Set(0),
                reservation_id: Set(reservation.id),
                created_at: Set(now),
            }
            .insert(conn)
            .await?;

            event_lines.push(TransferLine {
                transfer_item_id: line.id,
                inventory_item_id: source.id,
                product_id: line.product_id,
                variant_id: line.variant_id,
                quantity: item.quantity,
            });
            lines.push(line);
        }

        events.push(InventoryEvent::TransferCreated(TransferCreated {
            transfer_id: transfer.id,
            location_id: transfer.from_location_id,
            from_location_id: transfer.from_location_id,
            to_location_id: transfer.to_location_id,
            items: event_lines,
        }));

        Ok(TransferDetails {
            transfer,
            items: lines,
        })
    }

    /// `PENDING -> SHIPPED`. Every line ships its full requested quantity;
    /// stock stays reserved at the source until it is received.
    #[instrument(skip(self))]
    pub async fn ship_transfer(
        &self,
        transfer_id: Uuid,
        tracking_number: Option<String>,
        user_id: Option<Uuid>,
    ) -> Result<TransferDetails, ServiceError> {
        let tracking_number = tracking_number.as_deref();
        let (details, events) = with_retry(self.settings.retry, "ship_transfer", || async move {
            let txn = self.db_pool.begin().await?;
            let mut events = Vec::new();
            let details = Self::ship_in(&txn, transfer_id, tracking_number, &mut events).await?;
            txn.commit().await?;
            Ok::<_, ServiceError>((details, events))
        })
        .await?;

        metrics::TRANSFERS.with_label_values(&["shipped"]).inc();
        info!(
            transfer_id = %transfer_id,
            user_id = ?user_id,
            tracking_number = ?details.transfer.tracking_number,
            "Shipped transfer"
        );
        publish_committed(&*self.publisher, events).await;
        Ok(details)
    }

    async fn ship_in<C: ConnectionTrait>(
        conn: &C,
        transfer_id: Uuid,
        tracking_number: Option<&str>,
        events: &mut Vec<InventoryEvent>,
    ) -> Result<TransferDetails, ServiceError> {
        let current = load_transfer_for_update(conn, transfer_id).await?;
        require_transition(&current, TransferStatus::Shipped, "ship")?;

        let now = Utc::now();
        let next = inventory_transfer::Model {
            status: TransferStatus::Shipped.as_str().to_string(),
            shipped_at: Some(now),
            tracking_number: tracking_number
                .map(str::to_string)
                .or_else(|| current.tracking_number.clone()),
            ..current.clone()
        };
        let transfer = write_transfer(conn, &current, next).await?;

        let mut lines = Vec::new();
        let mut event_lines = Vec::new();
        for line in load_lines(conn, transfer_id).await? {
            let stock = line_stock(&line)?;
            let source = ledger::find_item_at(conn, stock, transfer.from_location_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "No inventory for {} at location {}",
                        stock, transfer.from_location_id
                    ))
                })?;

            let requested = line.quantity_requested;
            let mut active: inventory_transfer_item::ActiveModel = line.into();
            active.quantity_shipped = Set(requested);
            let line = active.update(conn).await?;

            event_lines.push(TransferLine {
                transfer_item_id: line.id,
                inventory_item_id: source.id,
                product_id: line.product_id,
                variant_id: line.variant_id,
                quantity: line.quantity_shipped,
            });
            lines.push(line);
        }

        events.push(InventoryEvent::TransferShipped(TransferShipped {
            transfer_id: transfer.id,
            location_id: transfer.from_location_id,
            from_location_id: transfer.from_location_id,
            to_location_id: transfer.to_location_id,
            tracking_number: transfer.tracking_number.clone(),
            items: event_lines,
        }));

        Ok(TransferDetails {
            transfer,
            items: lines,
        })
    }

    /// Receives a batch of lines at the destination. The transfer moves to
    /// `RECEIVED` only when every line has received its shipped quantity.
    #[instrument(skip(self))]
    pub async fn receive_transfer(
        &self,
        transfer_id: Uuid,
        received: Vec<ReceivedItem>,
        user_id: Option<Uuid>,
    ) -> Result<ReceiveResult, ServiceError> {
        let received = received.as_slice();
        let (result, events) = with_retry(self.settings.retry, "receive_transfer", || async move {
            let txn = self.db_pool.begin().await?;
            let mut events = Vec::new();
            let result = self
                .receive_in(&txn, transfer_id, received, user_id, &mut events)
                .await?;
            txn.commit().await?;
            Ok::<_, ServiceError>((result, events))
        })
        .await
        .map_err(|e| {
            warn!(transfer_id = %transfer_id, error = %e, "Transfer receipt rejected");
            e
        })?;

        let stage = if result.fully_received {
            "received"
        } else {
            "partially_received"
        };
        metrics::TRANSFERS.with_label_values(&[stage]).inc();
        info!(
            transfer_id = %transfer_id,
            fully_received = result.fully_received,
            "Received transfer items"
        );
        publish_committed(&*self.publisher, events).await;
        Ok(result)
    }

    async fn receive_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        transfer_id: Uuid,
        received: &[ReceivedItem],
        user_id: Option<Uuid>,
        events: &mut Vec<InventoryEvent>,
    ) -> Result<ReceiveResult, ServiceError> {
        let current = load_transfer_for_update(conn, transfer_id).await?;
        require_transition(&current, TransferStatus::Received, "receive")?;

        let mut lines: HashMap<Uuid, inventory_transfer_item::Model> = load_lines(conn, transfer_id)
            .await?
            .into_iter()
            .map(|line| (line.id, line))
            .collect();

        let mut event_lines = Vec::new();
        for entry in received {
            let line = lines.get(&entry.transfer_item_id).cloned().ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Transfer item {} not found on transfer {}",
                    entry.transfer_item_id, transfer_id
                ))
            })?;
            if entry.quantity_received < 0 {
                return Err(ServiceError::ValidationError(
                    "quantity_received must not be negative".to_string(),
                ));
            }
            let total_received = line.quantity_received + entry.quantity_received;
            if total_received > line.quantity_shipped {
                return Err(ServiceError::BusinessLogic(format!(
                    "Cannot receive {} units of transfer item {}: shipped {}, already received {}",
                    entry.quantity_received,
                    line.id,
                    line.quantity_shipped,
                    line.quantity_received
                )));
            }
            if entry.quantity_received == 0 {
                continue;
            }

            let mut active: inventory_transfer_item::ActiveModel = line.clone().into();
            active.quantity_received = Set(total_received);
            let updated_line = active.update(conn).await?;

            let stock = line_stock(&updated_line)?;
            let destination = self
                .stock_destination(conn, stock, &current, entry.quantity_received, user_id, events)
                .await?;

            reservations::fulfill_in(
                conn,
                updated_line.reservation_id,
                entry.quantity_received,
                user_id,
                events,
            )
            .await?;

            event_lines.push(TransferLine {
                transfer_item_id: updated_line.id,
                inventory_item_id: destination.id,
                product_id: updated_line.product_id,
                variant_id: updated_line.variant_id,
                quantity: entry.quantity_received,
            });
            lines.insert(updated_line.id, updated_line);
        }

        let fully_received = lines.values().all(|line| line.is_fully_received());
        let next = if fully_received {
            inventory_transfer::Model {
                status: TransferStatus::Received.as_str().to_string(),
                received_at: Some(Utc::now()),
                ..current.clone()
            }
        } else {
            current.clone()
        };
        // bumps the version even for a partial receipt
        let transfer = write_transfer(conn, &current, next).await?;

        let mut items: Vec<inventory_transfer_item::Model> = lines.into_values().collect();
        items.sort_by_key(|line| line.line_number);

        events.push(InventoryEvent::TransferReceived(TransferReceived {
            transfer_id: transfer.id,
            location_id: transfer.to_location_id,
            from_location_id: transfer.from_location_id,
            to_location_id: transfer.to_location_id,
            items: event_lines,
            fully_received,
        }));

        Ok(ReceiveResult {
            transfer: TransferDetails { transfer, items },
            fully_received,
        })
    }

    /// Adds received units to the destination row, creating it if needed.
    async fn stock_destination<C: ConnectionTrait>(
        &self,
        conn: &C,
        stock: StockRef,
        transfer: &inventory_transfer::Model,
        quantity: i32,
        user_id: Option<Uuid>,
        events: &mut Vec<InventoryEvent>,
    ) -> Result<inventory_item::Model, ServiceError> {
        let current = ledger::ensure_item(
            conn,
            stock,
            transfer.to_location_id,
            self.settings.default_low_stock_threshold,
        )
        .await?;
        let next = inventory_item::Model {
            quantity: current.quantity + quantity,
            ..current.clone()
        };
        let item = ledger::write_item(conn, &current, next).await?;

        adjustments::insert_adjustment(
            conn,
            item.id,
            NewAdjustment {
                kind: AdjustmentType::Increase,
                previous_quantity: current.quantity,
                new_quantity: item.quantity,
                reason: format!("Received from transfer {}", transfer.id),
                unit_cost: None,
                reference_type: Some(reference::TRANSFER.to_string()),
                reference_id: Some(transfer.id),
                created_by: user_id,
            },
        )
        .await?;

        events.push(ledger::updated_event(current.quantity, &item));
        events.extend(alerts::evaluate(
            current.quantity,
            current.low_stock_threshold,
            &item,
        ));
        Ok(item)
    }

    #[instrument(skip(self))]
    pub async fn get_transfer(&self, transfer_id: Uuid) -> Result<TransferDetails, ServiceError> {
        let db = &*self.db_pool;
        let transfer = inventory_transfer::Entity::find_by_id(transfer_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Transfer", transfer_id))?;
        let items = load_lines(db, transfer_id).await?;
        Ok(TransferDetails { transfer, items })
    }

    /// Transfers newest first, optionally restricted to one status.
    #[instrument(skip(self))]
    pub async fn list_transfers(
        &self,
        status: Option<TransferStatus>,
        limit: u64,
    ) -> Result<Vec<inventory_transfer::Model>, ServiceError> {
        let mut query = inventory_transfer::Entity::find();
        if let Some(status) = status {
            query = query.filter(inventory_transfer::Column::Status.eq(status.as_str()));
        }
        Ok(query
            .order_by_desc(inventory_transfer::Column::CreatedAt)
            .limit(limit)
            .all(&*self.db_pool)
            .await?)
    }
}
