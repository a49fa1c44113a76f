use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::sale::{self, SaleStatus},
    services::sales::{BarcodeScanResult, CreateSaleRequest, SaleDto, SaleSearchQuery},
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

pub async fn create_sale(
    State(state): State<AppState>,
    Json(payload): Json<CreateSaleRequest>,
) -> ApiResult<SaleDto> {
    let dto = state.services.sales.create_sale(payload).await?;
    Ok(Json(ApiResponse::success(dto)))
}

pub async fn get_sale(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SaleDto> {
    let dto = state.services.sales.get_sale(id).await?;
    Ok(Json(ApiResponse::success(dto)))
}

#[derive(Debug, Deserialize)]
pub struct SaleListQuery {
    pub tenant_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub status: Option<SaleStatus>,
    pub sale_number: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

pub async fn search_sales(
    State(state): State<AppState>,
    Query(query): Query<SaleListQuery>,
) -> ApiResult<PaginatedResponse<sale::Model>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let (items, total) = state
        .services
        .sales
        .search_sales(SaleSearchQuery {
            tenant_id: query.tenant_id,
            branch_id: query.branch_id,
            status: query.status,
            sale_number: query.sale_number,
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

pub async fn suspend_sale(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<sale::Model> {
    let updated = state.services.sales.suspend_sale(id).await?;
    Ok(Json(ApiResponse::success(updated)))
}

#[derive(Debug, Deserialize)]
pub struct CancelSaleBody {
    pub performed_by: Uuid,
}

pub async fn cancel_sale(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<CancelSaleBody>,
) -> ApiResult<sale::Model> {
    let updated = state
        .services
        .sales
        .cancel_sale(id, body.performed_by)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

#[derive(Debug, Serialize)]
pub struct CommissionResponse {
    pub sale_id: Uuid,
    pub commission: Decimal,
}

pub async fn sale_commission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<CommissionResponse> {
    let commission = state
        .services
        .sales
        .commission_for_sale(id, state.services.commission.as_ref())
        .await?;
    Ok(Json(ApiResponse::success(CommissionResponse {
        sale_id: id,
        commission,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ScanQuery {
    pub tenant_id: Uuid,
    pub branch_id: Uuid,
}

pub async fn scan_barcode(
    State(state): State<AppState>,
    Path(barcode): Path<String>,
    Query(query): Query<ScanQuery>,
) -> ApiResult<BarcodeScanResult> {
    let result = state
        .services
        .sales
        .scan_barcode(query.tenant_id, &barcode, query.branch_id)
        .await?;
    Ok(Json(ApiResponse::success(result)))
}
