use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle of a point-of-sale transaction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    Pending,
    Completed,
    Cancelled,
    Suspended,
    Refunded,
}

/// How much of the sale has come back through the return processor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnStatus {
    None,
    Partial,
    Full,
}

/// One POS transaction. Completed sales are never physically deleted;
/// the only mutations after completion come from the return processor
/// (returned quantities, return status), approved edit requests (line
/// price / soft line removal) and cancellation.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sales")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub sale_number: String,
    pub branch_id: Uuid,
    pub cashier_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub walk_in_name: Option<String>,
    pub walk_in_phone: Option<String>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub status: String,
    pub return_status: String,
    pub is_credit_sale: bool,
    pub notes: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn status_enum(&self) -> Option<SaleStatus> {
        self.status.parse().ok()
    }

    pub fn return_status_enum(&self) -> Option<ReturnStatus> {
        self.return_status.parse().ok()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sale_line_item::Entity")]
    LineItems,
    #[sea_orm(has_many = "super::sale_payment::Entity")]
    Payments,
    #[sea_orm(has_one = "super::credit_account::Entity")]
    CreditAccount,
}

impl Related<super::sale_line_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LineItems.def()
    }
}

impl Related<super::sale_payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl Related<super::credit_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CreditAccount.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
