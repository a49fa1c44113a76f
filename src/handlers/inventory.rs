use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::inventory_audit_log::{self, MovementType},
    errors::ServiceError,
    services::{
        audit_log::AuditLogQuery,
        inventory_ledger::{
            AdjustOutcome, AdjustStock, BatchSelector, ReceiveStock, TransferStock, WriteOffStock,
        },
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Deserialize)]
pub struct AdjustStockBody {
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub branch_id: Uuid,
    /// Target a specific batch; omitted means earliest expiry first
    pub batch_id: Option<Uuid>,
    pub delta: i32,
    pub reason: Option<String>,
    pub performed_by: Uuid,
}

pub async fn adjust_stock(
    State(state): State<AppState>,
    Json(body): Json<AdjustStockBody>,
) -> ApiResult<AdjustOutcome> {
    let outcome = state
        .services
        .ledger
        .adjust(AdjustStock {
            tenant_id: body.tenant_id,
            product_id: body.product_id,
            branch_id: body.branch_id,
            batch: body
                .batch_id
                .map_or(BatchSelector::EarliestExpiry, BatchSelector::Batch),
            delta: body.delta,
            movement: MovementType::Adjustment,
            source_reference: crate::services::generate_document_number("ADJ"),
            source_type: "ADJUSTMENT".to_string(),
            performed_by: body.performed_by,
            notes: body.reason,
        })
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[derive(Debug, Deserialize)]
pub struct ReceiveStockBody {
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: i32,
    pub unit_cost: Decimal,
    pub selling_price: Decimal,
    /// True for an opening balance rather than a purchase receipt
    #[serde(default)]
    pub initial_stock: bool,
    pub source_reference: Option<String>,
    pub performed_by: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ReceiveStockResponse {
    pub batch_id: Uuid,
    pub quantity_after: i32,
}

pub async fn receive_stock(
    State(state): State<AppState>,
    Json(body): Json<ReceiveStockBody>,
) -> ApiResult<ReceiveStockResponse> {
    let movement = if body.initial_stock {
        MovementType::InitialStock
    } else {
        MovementType::Purchase
    };

    let (batch_id, outcome) = state
        .services
        .ledger
        .receive_stock(ReceiveStock {
            tenant_id: body.tenant_id,
            product_id: body.product_id,
            branch_id: body.branch_id,
            batch_number: body.batch_number,
            expiry_date: body.expiry_date,
            quantity: body.quantity,
            unit_cost: body.unit_cost,
            selling_price: body.selling_price,
            movement,
            source_reference: body.source_reference,
            performed_by: body.performed_by,
        })
        .await?;

    Ok(Json(ApiResponse::success(ReceiveStockResponse {
        batch_id,
        quantity_after: outcome.quantity_after,
    })))
}

#[derive(Debug, Deserialize)]
pub struct TransferStockBody {
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub from_branch_id: Uuid,
    pub to_branch_id: Uuid,
    pub quantity: i32,
    pub batch_number: Option<String>,
    pub performed_by: Uuid,
}

#[derive(Debug, Serialize)]
pub struct TransferStockResponse {
    pub reference: String,
}

pub async fn transfer_stock(
    State(state): State<AppState>,
    Json(body): Json<TransferStockBody>,
) -> ApiResult<TransferStockResponse> {
    let reference = state
        .services
        .ledger
        .transfer(TransferStock {
            tenant_id: body.tenant_id,
            product_id: body.product_id,
            from_branch_id: body.from_branch_id,
            to_branch_id: body.to_branch_id,
            quantity: body.quantity,
            batch_number: body.batch_number,
            performed_by: body.performed_by,
        })
        .await?;
    Ok(Json(ApiResponse::success(TransferStockResponse {
        reference,
    })))
}

#[derive(Debug, Deserialize)]
pub struct WriteOffBody {
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub batch_id: Uuid,
    pub quantity: i32,
    /// "EXPIRY" or "DAMAGE"
    pub write_off_type: String,
    pub reason: Option<String>,
    pub performed_by: Uuid,
}

pub async fn write_off_stock(
    State(state): State<AppState>,
    Json(body): Json<WriteOffBody>,
) -> ApiResult<AdjustOutcome> {
    let movement = match body.write_off_type.to_ascii_uppercase().as_str() {
        "EXPIRY" => MovementType::ExpiryWriteOff,
        "DAMAGE" => MovementType::DamageWriteOff,
        other => {
            return Err(ServiceError::Validation(format!(
                "unknown write-off type {}",
                other
            )))
        }
    };

    let outcome = state
        .services
        .ledger
        .write_off(WriteOffStock {
            tenant_id: body.tenant_id,
            product_id: body.product_id,
            branch_id: body.branch_id,
            batch_id: body.batch_id,
            quantity: body.quantity,
            movement,
            reason: body.reason,
            performed_by: body.performed_by,
        })
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[derive(Debug, Deserialize)]
pub struct AuditLogListQuery {
    pub tenant_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub transaction_type: Option<String>,
    pub source_reference: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

pub async fn search_audit_log(
    State(state): State<AppState>,
    Query(query): Query<AuditLogListQuery>,
) -> ApiResult<PaginatedResponse<inventory_audit_log::Model>> {
    let transaction_type = match query.transaction_type.as_deref() {
        Some(raw) => Some(MovementType::from_str(raw).ok_or_else(|| {
            ServiceError::Validation(format!("unknown transaction type {}", raw))
        })?),
        None => None,
    };

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let (items, total) = state
        .services
        .ledger
        .audit_log()
        .search(AuditLogQuery {
            tenant_id: query.tenant_id,
            product_id: query.product_id,
            branch_id: query.branch_id,
            transaction_type,
            source_reference: query.source_reference,
            from: query.from,
            to: query.to,
            page,
            limit,
        })
        .await?;

    let total_pages = (total + limit - 1) / limit;
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit,
        total_pages,
    })))
}
