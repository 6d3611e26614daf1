use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A soft hold on available stock. Rows live only while the hold is open:
/// full release and full fulfillment delete them.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_reservations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub inventory_item_id: Uuid,
    pub quantity: i32,
    pub reason: String,
    pub reference_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
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

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            active_model.created_at = Set(now);

            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
        }

        active_model.updated_at = Set(Some(now));

        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reservation(expires_at: Option<DateTime<Utc>>) -> Model {
        Model {
            id: Uuid::new_v4(),
            inventory_item_id: Uuid::new_v4(),
            quantity: 1,
            reason: "order".into(),
            reference_id: None,
            expires_at,
            created_by: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn expiry_is_inclusive() {
        let now = Utc::now();
        assert!(reservation(Some(now)).is_expired_at(now));
        assert!(reservation(Some(now - Duration::minutes(1))).is_expired_at(now));
        assert!(!reservation(Some(now + Duration::minutes(1))).is_expired_at(now));
        assert!(!reservation(None).is_expired_at(now));
    }
}
