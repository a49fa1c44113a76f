use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of inventory movement recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementType {
    Purchase,
    Sale,
    Adjustment,
    TransferIn,
    TransferOut,
    Return,
    ExpiryWriteOff,
    DamageWriteOff,
    InitialStock,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Purchase => "PURCHASE",
            MovementType::Sale => "SALE",
            MovementType::Adjustment => "ADJUSTMENT",
            MovementType::TransferIn => "TRANSFER_IN",
            MovementType::TransferOut => "TRANSFER_OUT",
            MovementType::Return => "RETURN",
            MovementType::ExpiryWriteOff => "EXPIRY_WRITE_OFF",
            MovementType::DamageWriteOff => "DAMAGE_WRITE_OFF",
            MovementType::InitialStock => "INITIAL_STOCK",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PURCHASE" => Some(MovementType::Purchase),
            "SALE" => Some(MovementType::Sale),
            "ADJUSTMENT" => Some(MovementType::Adjustment),
            "TRANSFER_IN" => Some(MovementType::TransferIn),
            "TRANSFER_OUT" => Some(MovementType::TransferOut),
            "RETURN" => Some(MovementType::Return),
            "EXPIRY_WRITE_OFF" => Some(MovementType::ExpiryWriteOff),
            "DAMAGE_WRITE_OFF" => Some(MovementType::DamageWriteOff),
            "INITIAL_STOCK" => Some(MovementType::InitialStock),
            _ => None,
        }
    }

    /// Movements that add stock carry positive deltas; the rest deduct.
    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            MovementType::Purchase
                | MovementType::TransferIn
                | MovementType::Return
                | MovementType::InitialStock
        )
    }
}

/// Immutable record of one inventory mutation.
///
/// Rows are append-only: there is no update or delete path anywhere in the
/// codebase. `quantity_after - quantity_before` always equals
/// `quantity_changed`; the writer rejects anything else before insert.
/// At most one non-duplicate row exists per
/// `(tenant_id, product_id, branch_id, source_reference, source_type)`;
/// retried writes land as `is_duplicate = true` pointing at the original.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_audit_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub transaction_type: String,
    pub quantity_changed: i32,
    pub quantity_before: i32,
    pub quantity_after: i32,
    pub source_reference: String,
    pub source_type: String,
    pub is_duplicate: bool,
    pub duplicate_reference: Option<Uuid>,
    pub performed_by: Uuid,
    pub performed_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn movement_type(&self) -> Option<MovementType> {
        MovementType::from_str(&self.transaction_type)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
