mod common;

use assert_matches::assert_matches;
use atelier_inventory::entities::inventory_adjustment::reference;
use atelier_inventory::entities::{inventory_item, AdjustmentType};
use atelier_inventory::errors::ServiceError;
use atelier_inventory::events::InventoryEvent;
use atelier_inventory::services::ledger::{self, UpdateStockLevelRequest};
use common::{assert_consistent, product, variant, TestContext};
use uuid::Uuid;

#[tokio::test]
async fn ensure_item_is_idempotent() {
    let ctx = TestContext::new().await;
    let loc = ctx.location("MAIN").await;
    let stock = variant();

    let first = ctx.services.ledger.ensure_item(stock, loc.id).await.unwrap();
    let second = ctx.services.ledger.ensure_item(stock, loc.id).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.quantity, 0);
    assert_eq!(first.low_stock_threshold, 10);
    assert_eq!(first.variant_id, stock.variant_id());
    assert_eq!(first.product_id, None);
    assert_consistent(&first);
    assert_eq!(
        ctx.services
            .ledger
            .list_items_for_location(loc.id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn ensure_item_requires_an_existing_location() {
    let ctx = TestContext::new().await;
    let result = ctx.services.ledger.ensure_item(product(), Uuid::new_v4()).await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn same_stock_at_two_locations_gets_two_rows() {
    let ctx = TestContext::new().await;
    let a = ctx.location("A").await;
    let b = ctx.location("B").await;
    let stock = product();

    let at_a = ctx.services.ledger.ensure_item(stock, a.id).await.unwrap();
    let at_b = ctx.services.ledger.ensure_item(stock, b.id).await.unwrap();

    assert_ne!(at_a.id, at_b.id);
    let found = ctx.services.ledger.find_item(stock, b.id).await.unwrap();
    assert_eq!(found.map(|item| item.id), Some(at_b.id));
}

#[tokio::test]
async fn duplicate_location_code_conflicts() {
    let ctx = TestContext::new().await;
    ctx.location("DUP").await;
    let result = ctx.services.ledger.create_location("Other", "DUP").await;
    assert_matches!(result, Err(ServiceError::Conflict(_)));
}

#[tokio::test]
async fn update_stock_level_sets_quantity_and_records_set_adjustment() {
    let ctx = TestContext::new().await;
    let loc = ctx.location("MAIN").await;
    let stock = product();

    let item = ctx
        .services
        .ledger
        .update_stock_level(UpdateStockLevelRequest {
            stock,
            location_id: loc.id,
            quantity: 40,
            low_stock_threshold: Some(5),
            updated_by: None,
        })
        .await
        .unwrap();

    assert_eq!(item.quantity, 40);
    assert_eq!(item.available_quantity, 40);
    assert_eq!(item.low_stock_threshold, 5);
    assert_consistent(&item);

    let history = ctx
        .services
        .adjustments
        .list_adjustments(item.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    let set = &history[0];
    assert_eq!(set.adjustment_type, AdjustmentType::Set.as_str());
    assert_eq!(set.previous_quantity, 0);
    assert_eq!(set.new_quantity, 40);
    assert_eq!(set.quantity_change, 40);
    assert_eq!(set.reference_type.as_deref(), Some(reference::STOCK_LEVEL));

    let updates = ctx.events.of_type("inventory:updated");
    assert_eq!(updates.len(), 1);
    assert_matches!(
        &updates[0],
        InventoryEvent::Updated(e) if e.old_quantity == 0 && e.new_quantity == 40
    );
}

#[tokio::test]
async fn update_stock_level_keeps_reservations() {
    let ctx = TestContext::new().await;
    let loc = ctx.location("MAIN").await;
    let stock = product();
    let item = ctx.stock(stock, loc.id, 20, 0).await;

    ctx.services
        .reservations
        .reserve(atelier_inventory::services::reservations::ReserveRequest {
            inventory_item_id: item.id,
            quantity: 8,
            reason: "order".into(),
            reference_id: None,
            expires_at: None,
            created_by: None,
        })
        .await
        .unwrap();

    let updated = ctx
        .services
        .ledger
        .update_stock_level(UpdateStockLevelRequest {
            stock,
            location_id: loc.id,
            quantity: 5,
            low_stock_threshold: None,
            updated_by: None,
        })
        .await
        .unwrap();

    assert_eq!(updated.quantity, 5);
    assert_eq!(updated.reserved_quantity, 8);
    assert_eq!(updated.available_quantity, 0);
    assert_consistent(&updated);
}

#[tokio::test]
async fn negative_stock_level_is_rejected() {
    let ctx = TestContext::new().await;
    let loc = ctx.location("MAIN").await;

    let result = ctx
        .services
        .ledger
        .update_stock_level(UpdateStockLevelRequest {
            stock: product(),
            location_id: loc.id,
            quantity: -1,
            low_stock_threshold: None,
            updated_by: None,
        })
        .await;

    assert_matches!(result, Err(ServiceError::ValidationError(_)));
    assert!(ctx.events.events().is_empty());
}

#[tokio::test]
async fn bulk_update_reports_each_entry() {
    let ctx = TestContext::new().await;
    let loc = ctx.location("MAIN").await;
    let missing_location = Uuid::new_v4();

    let request = |location_id, quantity| UpdateStockLevelRequest {
        stock: product(),
        location_id,
        quantity,
        low_stock_threshold: Some(0),
        updated_by: None,
    };

    let report = ctx
        .services
        .ledger
        .bulk_update_stock_levels(vec![
            request(loc.id, 3),
            request(missing_location, 7),
            request(loc.id, 9),
        ])
        .await;

    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].index, 1);
    assert_eq!(report.failed[0].error_code, "not_found");
    assert_eq!(
        report
            .succeeded
            .iter()
            .map(|item| item.quantity)
            .collect::<Vec<_>>(),
        vec![3, 9]
    );
}

#[tokio::test]
async fn raising_threshold_above_quantity_alerts_once() {
    let ctx = TestContext::new().await;
    let loc = ctx.location("MAIN").await;
    let item = ctx.stock(product(), loc.id, 12, 5).await;

    let updated = ctx
        .services
        .ledger
        .update_threshold(item.id, 15)
        .await
        .unwrap();
    assert_eq!(updated.low_stock_threshold, 15);
    assert_eq!(ctx.low_stock_events().len(), 1);

    // already low, no second alert
    ctx.services.ledger.update_threshold(item.id, 20).await.unwrap();
    assert_eq!(ctx.low_stock_events().len(), 1);

    let low = ctx
        .services
        .ledger
        .list_low_stock_items(Some(loc.id))
        .await
        .unwrap();
    assert_eq!(low.iter().map(|i| i.id).collect::<Vec<_>>(), vec![item.id]);
}

#[tokio::test]
async fn negative_threshold_is_rejected() {
    let ctx = TestContext::new().await;
    let loc = ctx.location("MAIN").await;
    let item = ctx.stock(product(), loc.id, 12, 5).await;

    let result = ctx.services.ledger.update_threshold(item.id, -1).await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn list_low_stock_filters_by_location() {
    let ctx = TestContext::new().await;
    let a = ctx.location("A").await;
    let b = ctx.location("B").await;

    let low_a = ctx.stock(product(), a.id, 2, 5).await;
    ctx.stock(product(), a.id, 50, 5).await;
    let low_b = ctx.stock(product(), b.id, 5, 5).await;

    let all = ctx.services.ledger.list_low_stock_items(None).await.unwrap();
    let mut ids: Vec<_> = all.iter().map(|i| i.id).collect();
    ids.sort();
    let mut expected = vec![low_a.id, low_b.id];
    expected.sort();
    assert_eq!(ids, expected);

    let only_b = ctx
        .services
        .ledger
        .list_low_stock_items(Some(b.id))
        .await
        .unwrap();
    assert_eq!(only_b.len(), 1);
    assert_eq!(only_b[0].id, low_b.id);
}

#[tokio::test]
async fn stale_write_is_a_concurrent_modification() {
    let ctx = TestContext::new().await;
    let loc = ctx.location("MAIN").await;
    let item = ctx.stock(product(), loc.id, 10, 0).await;

    let first = ledger::write_item(
        &*ctx.db,
        &item,
        inventory_item::Model {
            quantity: 11,
            ..item.clone()
        },
    )
    .await
    .unwrap();
    assert_eq!(first.version, item.version + 1);

    let stale = ledger::write_item(
        &*ctx.db,
        &item,
        inventory_item::Model {
            quantity: 99,
            ..item.clone()
        },
    )
    .await;
    assert_matches!(stale, Err(ServiceError::ConcurrentModification(id)) if id == item.id);
    assert_eq!(ctx.item(item.id).await.quantity, 11);
}

#[tokio::test]
async fn write_item_recomputes_available_and_clamps() {
    let ctx = TestContext::new().await;
    let loc = ctx.location("MAIN").await;
    let item = ctx.stock(product(), loc.id, 10, 0).await;

    let written = ledger::write_item(
        &*ctx.db,
        &item,
        inventory_item::Model {
            quantity: -4,
            reserved_quantity: 3,
            available_quantity: 1_000,
            ..item.clone()
        },
    )
    .await
    .unwrap();

    assert_eq!(written.quantity, 0);
    assert_eq!(written.reserved_quantity, 3);
    assert_eq!(written.available_quantity, 0);
    assert_consistent(&ctx.item(item.id).await);
}

#[tokio::test]
async fn set_quantity_rejects_negative_values() {
    let ctx = TestContext::new().await;
    let loc = ctx.location("MAIN").await;
    let item = ctx.stock(product(), loc.id, 10, 0).await;

    assert_matches!(
        ledger::set_quantity(&*ctx.db, item.id, -5).await,
        Err(ServiceError::ValidationError(_))
    );
    let updated = ledger::set_quantity(&*ctx.db, item.id, 4).await.unwrap();
    assert_eq!(updated.quantity, 4);
    assert_eq!(updated.available_quantity, 4);
}
