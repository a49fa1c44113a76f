use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::credit_account::{self, CreditStatus},
    entities::credit_payment,
    entities::sale_payment::PaymentMethod,
    errors::ServiceError,
    services::credit::{CreditPaymentRequest, CreditSearchQuery},
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Deserialize)]
pub struct CreditListQuery {
    pub tenant_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub status: Option<CreditStatus>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

pub async fn search_accounts(
    State(state): State<AppState>,
    Query(query): Query<CreditListQuery>,
) -> ApiResult<PaginatedResponse<credit_account::Model>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let (items, total) = state
        .services
        .credit
        .search_accounts(CreditSearchQuery {
            tenant_id: query.tenant_id,
            customer_id: query.customer_id,
            status: query.status,
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

#[derive(Debug, Serialize)]
pub struct CreditAccountDto {
    pub account: credit_account::Model,
    pub payments: Vec<credit_payment::Model>,
}

pub async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<CreditAccountDto> {
    let (account, payments) = state.services.credit.get_account(id).await?;
    Ok(Json(ApiResponse::success(CreditAccountDto {
        account,
        payments,
    })))
}

#[derive(Debug, Deserialize)]
pub struct MakePaymentBody {
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub received_by: Uuid,
}

pub async fn make_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<MakePaymentBody>,
) -> ApiResult<credit_account::Model> {
    let account = state
        .services
        .credit
        .make_payment(CreditPaymentRequest {
            credit_account_id: id,
            amount: body.amount,
            method: body.method,
            reference: body.reference,
            received_by: body.received_by,
        })
        .await?;
    Ok(Json(ApiResponse::success(account)))
}

#[derive(Debug, Deserialize)]
pub struct SetStatusBody {
    /// CLOSED or SUSPENDED
    pub status: String,
}

pub async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SetStatusBody>,
) -> ApiResult<credit_account::Model> {
    let status: CreditStatus = body
        .status
        .parse()
        .map_err(|_| ServiceError::Validation(format!("unknown status {}", body.status)))?;
    let account = state.services.credit.set_administrative_status(id, status).await?;
    Ok(Json(ApiResponse::success(account)))
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub marked_overdue: u64,
}

pub async fn sweep_overdue(State(state): State<AppState>) -> ApiResult<SweepResponse> {
    let marked_overdue = state.services.credit.update_overdue_accounts().await?;
    Ok(Json(ApiResponse::success(SweepResponse { marked_overdue })))
}
