use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MpesaStatus {
    Pending,
    Completed,
    Cancelled,
    Failed,
}

impl MpesaStatus {
    /// Completed, cancelled and failed transactions never change again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MpesaStatus::Pending)
    }
}

/// One STK-push attempt. Keyed by the gateway's `CheckoutRequestID`;
/// callbacks for unknown keys are acknowledged and dropped.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "mpesa_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub sale_id: Option<Uuid>,
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
    pub phone_number: String,
    pub amount: Decimal,
    pub status: String,
    pub mpesa_receipt_number: Option<String>,
    pub result_code: Option<i32>,
    pub result_desc: Option<String>,
    pub callback_received: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn status_enum(&self) -> Option<MpesaStatus> {
        self.status.parse().ok()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
