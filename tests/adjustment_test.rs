mod common;

use assert_matches::assert_matches;
use atelier_inventory::config::DecreasePolicy;
use atelier_inventory::entities::inventory_adjustment::reference;
use atelier_inventory::entities::AdjustmentType;
use atelier_inventory::errors::ServiceError;
use atelier_inventory::events::InventoryEvent;
use atelier_inventory::services::adjustments::AdjustInventoryRequest;
use common::{assert_consistent, product, TestContext};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

fn adjust(item_id: Uuid, adjustment_type: AdjustmentType, quantity_change: i32) -> AdjustInventoryRequest {
    AdjustInventoryRequest {
        inventory_item_id: item_id,
        adjustment_type,
        quantity_change,
        reason: "cycle count".into(),
        unit_cost: None,
        reference_type: None,
        reference_id: None,
        user_id: None,
    }
}

#[tokio::test]
async fn increase_records_cost_and_weighted_average() {
    let ctx = TestContext::new().await;
    let loc = ctx.location("MAIN").await;
    let item = ctx.stock(product(), loc.id, 0, 0).await;

    let first = ctx
        .services
        .adjustments
        .adjust(AdjustInventoryRequest {
            unit_cost: Some(dec!(2.5)),
            ..adjust(item.id, AdjustmentType::Increase, 10)
        })
        .await
        .unwrap();
    assert_eq!(first.item.quantity, 10);
    assert_eq!(first.item.average_cost, Some(dec!(2.5)));
    assert_eq!(first.item.last_cost, Some(dec!(2.5)));
    assert_eq!(first.adjustment.total_cost_impact, Some(dec!(25)));

    let second = ctx
        .services
        .adjustments
        .adjust(AdjustInventoryRequest {
            unit_cost: Some(dec!(4)),
            ..adjust(item.id, AdjustmentType::Increase, 10)
        })
        .await
        .unwrap();
    assert_eq!(second.item.quantity, 20);
    assert_eq!(second.item.average_cost, Some(dec!(3.25)));
    assert_eq!(second.item.last_cost, Some(dec!(4)));

    let stored = ctx.item(item.id).await;
    assert_eq!(stored.average_cost, Some(dec!(3.25)));
    assert_eq!(stored.last_cost, Some(dec!(4)));
}

#[tokio::test]
async fn adjustment_row_captures_before_and_after() {
    let ctx = TestContext::new().await;
    let loc = ctx.location("MAIN").await;
    let item = ctx.stock(product(), loc.id, 25, 0).await;
    let user = Uuid::new_v4();

    let result = ctx
        .services
        .adjustments
        .adjust(AdjustInventoryRequest {
            user_id: Some(user),
            ..adjust(item.id, AdjustmentType::Decrease, 5)
        })
        .await
        .unwrap();

    let adjustment = &result.adjustment;
    assert_eq!(adjustment.adjustment_type, "DECREASE");
    assert_eq!(adjustment.quantity_change, 5);
    assert_eq!(adjustment.previous_quantity, 25);
    assert_eq!(adjustment.new_quantity, 20);
    assert_eq!(adjustment.reason, "cycle count");
    assert_eq!(adjustment.reference_type.as_deref(), Some(reference::MANUAL));
    assert_eq!(adjustment.created_by, Some(user));

    let adjusted = ctx.events.of_type("inventory:adjusted");
    assert_eq!(adjusted.len(), 1);
    assert_matches!(
        &adjusted[0],
        InventoryEvent::Adjusted(e) if e.delta == -5 && e.adjustment_id == adjustment.id
    );

    let history = ctx
        .services
        .adjustments
        .list_adjustments(item.id)
        .await
        .unwrap();
    // the SET from stocking the item, then the DECREASE
    assert_eq!(history.len(), 2);
    assert!(history.iter().any(|a| a.id == adjustment.id));
}

#[tokio::test]
async fn over_decrease_clamps_to_zero_by_default() {
    let ctx = TestContext::new().await;
    let loc = ctx.location("MAIN").await;
    let item = ctx.stock(product(), loc.id, 3, 0).await;

    let result = ctx
        .services
        .adjustments
        .adjust(adjust(item.id, AdjustmentType::Decrease, 10))
        .await
        .unwrap();

    assert_eq!(result.item.quantity, 0);
    assert_eq!(result.adjustment.quantity_change, 3);
    assert_eq!(result.adjustment.new_quantity, 0);
    assert_consistent(&result.item);
}

#[tokio::test]
async fn over_decrease_is_rejected_under_reject_policy() {
    let ctx = TestContext::with_policy(DecreasePolicy::Reject).await;
    let loc = ctx.location("MAIN").await;
    let item = ctx.stock(product(), loc.id, 3, 0).await;

    let result = ctx
        .services
        .adjustments
        .adjust(adjust(item.id, AdjustmentType::Decrease, 10))
        .await;
    assert_matches!(result, Err(ServiceError::BusinessLogic(_)));

    assert_eq!(ctx.item(item.id).await.quantity, 3);
    assert_eq!(
        ctx.services
            .adjustments
            .list_adjustments(item.id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn set_uses_change_as_target() {
    let ctx = TestContext::new().await;
    let loc = ctx.location("MAIN").await;
    let item = ctx.stock(product(), loc.id, 40, 0).await;

    let result = ctx
        .services
        .adjustments
        .adjust(adjust(item.id, AdjustmentType::Set, 25))
        .await
        .unwrap();

    assert_eq!(result.item.quantity, 25);
    assert_eq!(result.adjustment.quantity_change, 15);
    assert_eq!(result.adjustment.previous_quantity, 40);
    assert_eq!(result.adjustment.new_quantity, 25);
}

#[tokio::test]
async fn increase_then_decrease_restores_quantity() {
    let ctx = TestContext::new().await;
    let loc = ctx.location("MAIN").await;
    let item = ctx.stock(product(), loc.id, 17, 0).await;

    ctx.services
        .adjustments
        .adjust(adjust(item.id, AdjustmentType::Increase, 8))
        .await
        .unwrap();
    let back = ctx
        .services
        .adjustments
        .adjust(adjust(item.id, AdjustmentType::Decrease, 8))
        .await
        .unwrap();

    assert_eq!(back.item.quantity, 17);
    assert_consistent(&back.item);
}

#[tokio::test]
async fn decrease_below_reserved_keeps_available_at_zero() {
    let ctx = TestContext::new().await;
    let loc = ctx.location("MAIN").await;
    let item = ctx.stock(product(), loc.id, 10, 0).await;

    ctx.services
        .reservations
        .reserve(atelier_inventory::services::reservations::ReserveRequest {
            inventory_item_id: item.id,
            quantity: 6,
            reason: "order".into(),
            reference_id: None,
            expires_at: None,
            created_by: None,
        })
        .await
        .unwrap();

    let result = ctx
        .services
        .adjustments
        .adjust(adjust(item.id, AdjustmentType::Decrease, 7))
        .await
        .unwrap();

    assert_eq!(result.item.quantity, 3);
    assert_eq!(result.item.reserved_quantity, 6);
    assert_eq!(result.item.available_quantity, 0);
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let ctx = TestContext::new().await;
    let loc = ctx.location("MAIN").await;
    let item = ctx.stock(product(), loc.id, 10, 0).await;

    assert_matches!(
        ctx.services
            .adjustments
            .adjust(adjust(item.id, AdjustmentType::Increase, -1))
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        ctx.services
            .adjustments
            .adjust(AdjustInventoryRequest {
                reason: String::new(),
                ..adjust(item.id, AdjustmentType::Increase, 1)
            })
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        ctx.services
            .adjustments
            .adjust(adjust(Uuid::new_v4(), AdjustmentType::Increase, 1))
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn unit_cost_outside_column_range_is_rejected() {
    let ctx = TestContext::new().await;
    let loc = ctx.location("MAIN").await;
    let item = ctx.stock(product(), loc.id, 10, 0).await;

    for unit_cost in [Decimal::MAX, dec!(-1)] {
        assert_matches!(
            ctx.services
                .adjustments
                .adjust(AdjustInventoryRequest {
                    unit_cost: Some(unit_cost),
                    ..adjust(item.id, AdjustmentType::Increase, 1_000_000)
                })
                .await,
            Err(ServiceError::ValidationError(_))
        );
    }

    let stored = ctx.item(item.id).await;
    assert_eq!(stored.quantity, 10);
    assert_eq!(stored.average_cost, None);
}
