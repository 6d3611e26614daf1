use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::inventory_item::StockRef;

/// One line of a transfer. `line_number` preserves insertion order.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_transfer_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub transfer_id: Uuid,
    pub line_number: i32,
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub quantity_requested: i32,
    pub quantity_shipped: i32,
    pub quantity_received: i32,
    /// Source reservation placed for this line. Gone once the line has been
    /// received in full.
    pub reservation_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn stock_ref(&self) -> Option<StockRef> {
        match (self.variant_id, self.product_id) {
            (Some(variant_id), _) => Some(StockRef::Variant(variant_id)),
            (None, Some(product_id)) => Some(StockRef::Product(product_id)),
            (None, None) => None,
        }
    }

    pub fn is_fully_received(&self) -> bool {
        self.quantity_received == self.quantity_shipped
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inventory_transfer::Entity",
        from = "Column::TransferId",
        to = "super::inventory_transfer::Column::Id"
    )]
    Transfer,
}

impl Related<super::inventory_transfer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transfer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
