use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ServiceError;

/// Transfer lifecycle. Transitions only move forward:
/// `Pending -> Shipped -> Received`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Pending,
    Shipped,
    Received,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Shipped => "SHIPPED",
            TransferStatus::Received => "RECEIVED",
        }
    }

    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        matches!(
            (self, next),
            (TransferStatus::Pending, TransferStatus::Shipped)
                | (TransferStatus::Shipped, TransferStatus::Received)
        )
    }
}

impl FromStr for TransferStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransferStatus::Pending),
            "SHIPPED" => Ok(TransferStatus::Shipped),
            "RECEIVED" => Ok(TransferStatus::Received),
            other => Err(ServiceError::BusinessLogic(format!(
                "Unknown transfer status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_transfers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub status: String, // TransferStatus::as_str
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn status(&self) -> Result<TransferStatus, ServiceError> {
        self.status.parse()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::inventory_transfer_item::Entity")]
    Items,
}

impl Related<super::inventory_transfer_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_only_move_forward() {
        use TransferStatus::*;
        assert!(Pending.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Received));
        assert!(!Pending.can_transition_to(Received));
        assert!(!Shipped.can_transition_to(Pending));
        assert!(!Received.can_transition_to(Shipped));
    }

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in [TransferStatus::Pending, TransferStatus::Shipped, TransferStatus::Received] {
            assert_eq!(status.as_str().parse::<TransferStatus>().unwrap(), status);
        }
        assert!("CANCELLED".parse::<TransferStatus>().is_err());
    }
}
