use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One product's stock at one branch, optionally tied to a manufacturing
/// lot and expiry date. `quantity` is mutated only through the inventory
/// ledger and never drops below zero. `version` backs optimistic locking:
/// every quantity update is conditional on the version it read.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_batches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: i32,
    pub unit_cost: Decimal,
    pub selling_price: Decimal,
    /// Soft-deactivation flag; batches referenced by sale lines are never
    /// hard-deleted.
    pub is_active: bool,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Whether the batch can still be sold from on the given date.
    pub fn is_sellable(&self, today: NaiveDate) -> bool {
        self.is_active
            && self.quantity > 0
            && self.expiry_date.map_or(true, |expiry| expiry >= today)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
