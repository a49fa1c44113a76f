use axum::{extract::State, Json};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    entities::mpesa_transaction,
    services::mpesa::{CallbackAck, InitiateStkPush, StkCallbackPayload},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize)]
pub struct StkPushBody {
    pub tenant_id: Uuid,
    pub sale_id: Option<Uuid>,
    pub phone_number: String,
    pub amount: Decimal,
    pub account_reference: String,
}

pub async fn initiate_stk_push(
    State(state): State<AppState>,
    Json(body): Json<StkPushBody>,
) -> ApiResult<mpesa_transaction::Model> {
    let transaction = state
        .services
        .mpesa
        .initiate_stk_push(InitiateStkPush {
            tenant_id: body.tenant_id,
            sale_id: body.sale_id,
            phone_number: body.phone_number,
            amount: body.amount,
            account_reference: body.account_reference,
        })
        .await?;
    Ok(Json(ApiResponse::success(transaction)))
}

/// Gateway callback endpoint. The response body is the gateway's own ack
/// format, not the API envelope.
pub async fn callback(
    State(state): State<AppState>,
    Json(payload): Json<StkCallbackPayload>,
) -> Result<Json<CallbackAck>, crate::errors::ServiceError> {
    let ack = state.services.mpesa.handle_callback(payload).await?;
    Ok(Json(ack))
}
