use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::Condition;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What a ledger row counts: either a whole product or one of its variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum StockRef {
    Product(Uuid),
    Variant(Uuid),
}

impl StockRef {
    pub fn product_id(&self) -> Option<Uuid> {
        match self {
            StockRef::Product(id) => Some(*id),
            StockRef::Variant(_) => None,
        }
    }

    pub fn variant_id(&self) -> Option<Uuid> {
        match self {
            StockRef::Variant(id) => Some(*id),
            StockRef::Product(_) => None,
        }
    }

    /// Value of the `stock_key` column; unique per location.
    pub fn key(&self) -> String {
        match self {
            StockRef::Product(id) => format!("product:{}", id),
            StockRef::Variant(id) => format!("variant:{}", id),
        }
    }

    /// Filter selecting the ledger row for this reference at `location_id`.
    pub fn at_location(&self, location_id: Uuid) -> Condition {
        Condition::all()
            .add(Column::StockKey.eq(self.key()))
            .add(Column::LocationId.eq(location_id))
    }
}

impl fmt::Display for StockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StockRef::Product(id) => write!(f, "product {}", id),
            StockRef::Variant(id) => write!(f, "variant {}", id),
        }
    }
}

/// Stock of one product or variant at one location.
///
/// `available_quantity` is always `max(0, quantity - reserved_quantity)`; it is
/// stored for querying but only ever written by the ledger alongside the two
/// columns it derives from. `version` guards every write.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub stock_key: String,
    pub location_id: Uuid,
    pub quantity: i32,
    pub reserved_quantity: i32,
    pub available_quantity: i32,
    pub low_stock_threshold: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub average_cost: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub last_cost: Option<Decimal>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn stock_ref(&self) -> Option<StockRef> {
        match (self.variant_id, self.product_id) {
            (Some(variant_id), _) => Some(StockRef::Variant(variant_id)),
            (None, Some(product_id)) => Some(StockRef::Product(product_id)),
            (None, None) => None,
        }
    }

    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.low_stock_threshold
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::location::Entity",
        from = "Column::LocationId",
        to = "super::location::Column::Id"
    )]
    Location,
    #[sea_orm(has_many = "super::inventory_reservation::Entity")]
    Reservations,
    #[sea_orm(has_many = "super::inventory_adjustment::Entity")]
    Adjustments,
}

impl Related<super::location::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Location.def()
    }
}

impl Related<super::inventory_reservation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reservations.def()
    }
}

impl Related<super::inventory_adjustment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Adjustments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
