use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::{sale_return, sale_return_line_item},
    services::returns::{CreateReturnRequest, ReturnDto},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateReturnBody {
    pub tenant_id: Uuid,
    #[serde(flatten)]
    pub request: CreateReturnRequest,
}

pub async fn create_return(
    State(state): State<AppState>,
    Json(body): Json<CreateReturnBody>,
) -> ApiResult<ReturnDto> {
    let dto = state
        .services
        .returns
        .create_return(body.tenant_id, body.request)
        .await?;
    Ok(Json(ApiResponse::success(dto)))
}

#[derive(Debug, Serialize)]
pub struct ReturnDetailDto {
    pub sale_return: sale_return::Model,
    pub line_items: Vec<sale_return_line_item::Model>,
}

pub async fn get_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ReturnDetailDto> {
    let (sale_return, line_items) = state.services.returns.get_return(id).await?;
    Ok(Json(ApiResponse::success(ReturnDetailDto {
        sale_return,
        line_items,
    })))
}
