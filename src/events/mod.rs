//! Domain events emitted by the inventory engine.
//!
//! Services collect events while their transaction is open and hand them to an
//! [`EventPublisher`] only after the commit succeeds. Delivery is
//! at-most-once: a publisher that cannot deliver logs and drops the event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::entities::AdjustmentType;

/// Quantities of a ledger row after a stock change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockUpdated {
    pub inventory_item_id: Uuid,
    pub location_id: Uuid,
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub old_quantity: i32,
    pub new_quantity: i32,
    pub reserved_quantity: i32,
    pub available_quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockReserved {
    pub inventory_item_id: Uuid,
    pub location_id: Uuid,
    pub reservation_id: Uuid,
    pub quantity: i32,
    pub reference_id: Option<Uuid>,
    pub reserved_quantity: i32,
    pub available_quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationReleased {
    pub inventory_item_id: Uuid,
    pub location_id: Uuid,
    pub reservation_id: Uuid,
    pub quantity: i32,
    pub reserved_quantity: i32,
    pub available_quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationFulfilled {
    pub inventory_item_id: Uuid,
    pub location_id: Uuid,
    pub reservation_id: Uuid,
    pub adjustment_id: Uuid,
    pub quantity_fulfilled: i32,
    /// Quantity still held by the reservation; zero once it is deleted.
    pub remaining_quantity: i32,
    pub old_quantity: i32,
    pub new_quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjusted {
    pub inventory_item_id: Uuid,
    pub location_id: Uuid,
    pub adjustment_id: Uuid,
    pub adjustment_type: AdjustmentType,
    pub old_quantity: i32,
    pub new_quantity: i32,
    /// Signed change actually applied.
    pub delta: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LowStock {
    pub inventory_item_id: Uuid,
    pub location_id: Uuid,
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub threshold: i32,
}

/// One transfer line as carried in transfer events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferLine {
    pub transfer_item_id: Uuid,
    pub inventory_item_id: Uuid,
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferCreated {
    pub transfer_id: Uuid,
    pub location_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    /// Source ledger rows with the quantity reserved for each line.
    pub items: Vec<TransferLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferShipped {
    pub transfer_id: Uuid,
    pub location_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub tracking_number: Option<String>,
    pub items: Vec<TransferLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceived {
    pub transfer_id: Uuid,
    pub location_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    /// Destination ledger rows with the quantity received in this batch.
    pub items: Vec<TransferLine>,
    pub fully_received: bool,
}

/// Every event the engine publishes. Serializes as
/// `{"type": "inventory:...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum InventoryEvent {
    #[serde(rename = "inventory:updated")]
    Updated(StockUpdated),
    #[serde(rename = "inventory:reserved")]
    Reserved(StockReserved),
    #[serde(rename = "inventory:reservationReleased")]
    ReservationReleased(ReservationReleased),
    #[serde(rename = "inventory:reservationFulfilled")]
    ReservationFulfilled(ReservationFulfilled),
    #[serde(rename = "inventory:adjusted")]
    Adjusted(StockAdjusted),
    #[serde(rename = "inventory:lowStock")]
    LowStock(LowStock),
    #[serde(rename = "inventory:transferCreated")]
    TransferCreated(TransferCreated),
    #[serde(rename = "inventory:transferShipped")]
    TransferShipped(TransferShipped),
    #[serde(rename = "inventory:transferReceived")]
    TransferReceived(TransferReceived),
}

impl InventoryEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::Updated(_) => "inventory:updated",
            InventoryEvent::Reserved(_) => "inventory:reserved",
            InventoryEvent::ReservationReleased(_) => "inventory:reservationReleased",
            InventoryEvent::ReservationFulfilled(_) => "inventory:reservationFulfilled",
            InventoryEvent::Adjusted(_) => "inventory:adjusted",
            InventoryEvent::LowStock(_) => "inventory:lowStock",
            InventoryEvent::TransferCreated(_) => "inventory:transferCreated",
            InventoryEvent::TransferShipped(_) => "inventory:transferShipped",
            InventoryEvent::TransferReceived(_) => "inventory:transferReceived",
        }
    }

    /// Ledger row the event is about; `None` for transfer events, which
    /// carry one row per line instead.
    pub fn inventory_item_id(&self) -> Option<Uuid> {
        match self {
            InventoryEvent::Updated(e) => Some(e.inventory_item_id),
            InventoryEvent::Reserved(e) => Some(e.inventory_item_id),
            InventoryEvent::ReservationReleased(e) => Some(e.inventory_item_id),
            InventoryEvent::ReservationFulfilled(e) => Some(e.inventory_item_id),
            InventoryEvent::Adjusted(e) => Some(e.inventory_item_id),
            InventoryEvent::LowStock(e) => Some(e.inventory_item_id),
            InventoryEvent::TransferCreated(_)
            | InventoryEvent::TransferShipped(_)
            | InventoryEvent::TransferReceived(_) => None,
        }
    }

    pub fn location_id(&self) -> Uuid {
        match self {
            InventoryEvent::Updated(e) => e.location_id,
            InventoryEvent::Reserved(e) => e.location_id,
            InventoryEvent::ReservationReleased(e) => e.location_id,
            InventoryEvent::ReservationFulfilled(e) => e.location_id,
            InventoryEvent::Adjusted(e) => e.location_id,
            InventoryEvent::LowStock(e) => e.location_id,
            InventoryEvent::TransferCreated(e) => e.location_id,
            InventoryEvent::TransferShipped(e) => e.location_id,
            InventoryEvent::TransferReceived(e) => e.location_id,
        }
    }
}

/// An event stamped with the time it was published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(flatten)]
    pub event: InventoryEvent,
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(event: InventoryEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }
}

/// Sink for committed inventory events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Delivers one envelope. Must not fail the caller; implementations log
    /// delivery problems themselves.
    async fn publish(&self, envelope: EventEnvelope);

    async fn publish_all(&self, events: Vec<InventoryEvent>) {
        for event in events {
            self.publish(EventEnvelope::new(event)).await;
        }
    }
}

/// Publisher backed by a bounded tokio channel, drained by [`process_events`].
#[derive(Clone, Debug)]
pub struct EventSender {
    sender: mpsc::Sender<EventEnvelope>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<EventEnvelope>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the receiving half of its channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EventEnvelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub async fn send(&self, envelope: EventEnvelope) -> Result<(), String> {
        self.sender
            .send(envelope)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

#[async_trait]
impl EventPublisher for EventSender {
    async fn publish(&self, envelope: EventEnvelope) {
        let event_type = envelope.event_type();
        if let Err(e) = self.send(envelope).await {
            warn!(event_type, error = %e, "Dropping inventory event");
        }
    }
}

/// Keeps every published envelope in memory.
#[derive(Clone, Debug, Default)]
pub struct RecordingPublisher {
    events: Arc<Mutex<Vec<EventEnvelope>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn envelopes(&self) -> Vec<EventEnvelope> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events(&self) -> Vec<InventoryEvent> {
        self.envelopes().into_iter().map(|e| e.event).collect()
    }

    /// Events of one type, e.g. `"inventory:lowStock"`.
    pub fn of_type(&self, event_type: &str) -> Vec<InventoryEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn clear(&self) {
        match self.events.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, envelope: EventEnvelope) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(envelope),
            Err(poisoned) => poisoned.into_inner().push(envelope),
        }
    }
}

/// Consumer of envelopes drained from an [`EventSender`] channel.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, envelope: &EventEnvelope) -> Result<(), String>;
}

/// Writes every envelope to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle_event(&self, envelope: &EventEnvelope) -> Result<(), String> {
        let payload = serde_json::to_string(envelope).map_err(|e| e.to_string())?;
        info!(event_type = envelope.event_type(), %payload, "inventory event");
        Ok(())
    }
}

/// Drains `rx` and hands each envelope to every handler in order until the
/// channel closes. A failing handler does not stop the others.
pub async fn process_events(
    mut rx: mpsc::Receiver<EventEnvelope>,
    handlers: Vec<Arc<dyn EventHandler>>,
) {
    info!("Starting event processing loop");

    while let Some(envelope) = rx.recv().await {
        debug!(event_type = envelope.event_type(), "Dispatching event");
        for handler in &handlers {
            if let Err(e) = handler.handle_event(&envelope).await {
                error!(
                    event_type = envelope.event_type(),
                    error = %e,
                    "Event handler failed"
                );
            }
        }
    }

    info!("Event channel closed, stopping event processing loop");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn low_stock() -> InventoryEvent {
        InventoryEvent::LowStock(LowStock {
            inventory_item_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            product_id: Some(Uuid::new_v4()),
            variant_id: None,
            quantity: 5,
            threshold: 10,
        })
    }

    #[test]
    fn envelope_serializes_type_data_and_timestamp() {
        let envelope = EventEnvelope::new(low_stock());
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["type"], "inventory:lowStock");
        assert_eq!(value["data"]["quantity"], 5);
        assert_eq!(value["data"]["threshold"], 10);
        assert!(value["data"]["inventoryItemId"].is_string());
        assert!(value["data"]["locationId"].is_string());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn event_type_matches_serialized_tag() {
        let event = low_stock();
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], event.event_type());
    }

    #[tokio::test]
    async fn recording_publisher_keeps_order() {
        let publisher = RecordingPublisher::new();
        publisher
            .publish_all(vec![low_stock(), low_stock()])
            .await;

        assert_eq!(publisher.events().len(), 2);
        assert_eq!(publisher.of_type("inventory:lowStock").len(), 2);
        assert!(publisher.of_type("inventory:reserved").is_empty());

        publisher.clear();
        assert!(publisher.events().is_empty());
    }

    struct Counting(AtomicUsize);

    #[async_trait]
    impl EventHandler for Counting {
        async fn handle_event(&self, _envelope: &EventEnvelope) -> Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventHandler for Failing {
        async fn handle_event(&self, _envelope: &EventEnvelope) -> Result<(), String> {
            Err("downstream unavailable".into())
        }
    }

    #[tokio::test]
    async fn process_events_fans_out_past_failing_handlers() {
        let (sender, rx) = EventSender::channel(8);
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let failing: Arc<dyn EventHandler> = Arc::new(Failing);
        let counting: Arc<dyn EventHandler> = counter.clone();
        let worker = tokio::spawn(process_events(rx, vec![failing, counting]));

        sender.publish(EventEnvelope::new(low_stock())).await;
        sender.publish(EventEnvelope::new(low_stock())).await;
        drop(sender);
        worker.await.unwrap();

        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn publishing_to_a_closed_channel_does_not_fail() {
        let (sender, rx) = EventSender::channel(1);
        drop(rx);
        sender.publish(EventEnvelope::new(low_stock())).await;
    }
}
