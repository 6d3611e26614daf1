use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ServiceError;

/// How an adjustment's `quantity_change` is applied to on-hand stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentType {
    Increase,
    Decrease,
    /// `quantity_change` is the absolute target quantity.
    Set,
}

impl AdjustmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentType::Increase => "INCREASE",
            AdjustmentType::Decrease => "DECREASE",
            AdjustmentType::Set => "SET",
        }
    }
}

impl FromStr for AdjustmentType {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INCREASE" => Ok(AdjustmentType::Increase),
            "DECREASE" => Ok(AdjustmentType::Decrease),
            "SET" => Ok(AdjustmentType::Set),
            other => Err(ServiceError::BusinessLogic(format!(
                "Invalid adjustment type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for AdjustmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known values for `reference_type`.
pub mod reference {
    pub const RESERVATION: &str = "reservation";
    pub const TRANSFER: &str = "transfer";
    pub const MANUAL: &str = "manual";
    pub const STOCK_LEVEL: &str = "stock_level";
}

/// Append-only record of why and by how much an item's quantity changed.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_adjustments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub inventory_item_id: Uuid,
    pub adjustment_type: String, // AdjustmentType::as_str
    /// Magnitude of the change, never negative.
    pub quantity_change: i32,
    pub previous_quantity: i32,
    pub new_quantity: i32,
    pub reason: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub unit_cost: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub total_cost_impact: Option<Decimal>,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn kind(&self) -> Result<AdjustmentType, ServiceError> {
        self.adjustment_type.parse()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inventory_item::Entity",
        from = "Column::InventoryItemId",
        to = "super::inventory_item::Column::Id"
    )]
    InventoryItem,
}

impl Related<super::inventory_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
