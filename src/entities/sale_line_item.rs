use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One line of a sale, pinned to the inventory batch it was sold from.
/// `returned_quantity` is a running watermark maintained by the return
/// processor and never exceeds `quantity`. `is_deleted` marks lines
/// removed by an approved edit request; the row stays for audit.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sale_line_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub sale_id: Uuid,
    pub product_id: Uuid,
    pub batch_id: Uuid,
    pub quantity: i32,
    pub returned_quantity: i32,
    pub unit_price: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Units still eligible for return.
    pub fn returnable_quantity(&self) -> i32 {
        self.quantity - self.returned_quantity
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sale::Entity",
        from = "Column::SaleId",
        to = "super::sale::Column::Id"
    )]
    Sale,
}

impl Related<super::sale::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sale.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
