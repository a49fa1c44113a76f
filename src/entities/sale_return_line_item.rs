use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One returned line, referencing the original sale line it reverses.
/// Damaged goods come back with `restore_to_inventory = false`: the refund
/// is honored but the stock is not resurrected.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sale_return_line_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub sale_return_id: Uuid,
    pub sale_line_item_id: Uuid,
    pub product_id: Uuid,
    pub quantity_returned: i32,
    pub refund_amount: Decimal,
    pub restore_to_inventory: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sale_return::Entity",
        from = "Column::SaleReturnId",
        to = "super::sale_return::Column::Id"
    )]
    SaleReturn,
}

impl Related<super::sale_return::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SaleReturn.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
