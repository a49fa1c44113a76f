use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::MpesaConfig,
    db::DbPool,
    entities::{
        mpesa_transaction::{self, Entity as MpesaTransactionEntity, MpesaStatus},
        sale::{self, Entity as SaleEntity, SaleStatus},
        sale_payment::{self, Entity as SalePaymentEntity, PaymentMethod},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Gateway result codes with defined meanings. Everything else is a
/// failure.
const RESULT_CODE_SUCCESS: i32 = 0;
const RESULT_CODE_CANCELLED_BY_USER: i32 = 1;

/// Metadata item name carrying the receipt on successful payments.
const RECEIPT_ITEM_NAME: &str = "MpesaReceiptNumber";
const AMOUNT_ITEM_NAME: &str = "Amount";

// ---------------------------------------------------------------------------
// Wire types. Field names follow the gateway's JSON exactly.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkCallbackPayload {
    #[serde(rename = "Body")]
    pub body: StkCallbackBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkCallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata")]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item")]
    pub item: Vec<MetadataItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: Option<serde_json::Value>,
}

impl CallbackMetadata {
    fn string_value(&self, name: &str) -> Option<String> {
        self.item
            .iter()
            .find(|item| item.name == name)
            .and_then(|item| item.value.as_ref())
            .map(|value| match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    }
}

/// Response the gateway expects for every handled callback, including
/// unknown transactions. Anything else makes it retry indefinitely.
#[derive(Debug, Serialize, Deserialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: String,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl CallbackAck {
    pub fn accepted(desc: &str) -> Self {
        Self {
            result_code: "0".to_string(),
            result_desc: desc.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OauthTokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct StkPushRequest {
    #[serde(rename = "BusinessShortCode")]
    business_short_code: String,
    #[serde(rename = "Password")]
    password: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "TransactionType")]
    transaction_type: String,
    #[serde(rename = "Amount")]
    amount: String,
    #[serde(rename = "PartyA")]
    party_a: String,
    #[serde(rename = "PartyB")]
    party_b: String,
    #[serde(rename = "PhoneNumber")]
    phone_number: String,
    #[serde(rename = "CallBackURL")]
    callback_url: String,
    #[serde(rename = "AccountReference")]
    account_reference: String,
    #[serde(rename = "TransactionDesc")]
    transaction_desc: String,
}

#[derive(Debug, Deserialize)]
struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
}

/// Input for initiating an STK push.
#[derive(Debug, Clone)]
pub struct InitiateStkPush {
    pub tenant_id: Uuid,
    pub sale_id: Option<Uuid>,
    pub phone_number: String,
    pub amount: Decimal,
    pub account_reference: String,
}

/// Drives the M-Pesa payment state machine.
///
/// The push itself is best-effort against the gateway; a failed push never
/// corrupts the sale path (the sale can complete on another instrument and
/// the push be retried). Status transitions are callback-driven and
/// terminal states never revert.
#[derive(Clone)]
pub struct MpesaService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    http: reqwest::Client,
    config: MpesaConfig,
}

impl MpesaService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, config: MpesaConfig) -> Self {
        Self {
            db,
            event_sender,
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Initiates an STK push and records the PENDING transaction keyed by
    /// the gateway's `CheckoutRequestID`.
    #[instrument(skip(self, req), fields(phone = %req.phone_number, amount = %req.amount))]
    pub async fn initiate_stk_push(
        &self,
        req: InitiateStkPush,
    ) -> Result<mpesa_transaction::Model, ServiceError> {
        if !self.config.enabled {
            return Err(ServiceError::ExternalService(
                "M-Pesa integration is not configured".into(),
            ));
        }
        if req.amount <= Decimal::ZERO {
            return Err(ServiceError::Validation(
                "payment amount must be greater than zero".into(),
            ));
        }

        let token = self.fetch_access_token().await?;
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let password = BASE64.encode(format!(
            "{}{}{}",
            self.config.shortcode, self.config.passkey, timestamp
        ));

        // The gateway bills whole shillings.
        let amount = req.amount.round().to_string();
        let push = StkPushRequest {
            business_short_code: self.config.shortcode.clone(),
            password,
            timestamp,
            transaction_type: "CustomerPayBillOnline".to_string(),
            amount,
            party_a: req.phone_number.clone(),
            party_b: self.config.shortcode.clone(),
            phone_number: req.phone_number.clone(),
            callback_url: self.config.callback_url.clone(),
            account_reference: req.account_reference.clone(),
            transaction_desc: "POS sale payment".to_string(),
        };

        let response = self
            .http
            .post(format!(
                "{}/mpesa/stkpush/v1/processrequest",
                self.config.base_url
            ))
            .bearer_auth(token)
            .json(&push)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalService(format!("STK push failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalService(format!(
                "STK push rejected with status {}",
                response.status()
            )));
        }

        let push_response: StkPushResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalService(format!("unreadable STK push response: {}", e))
        })?;

        let now = Utc::now();
        let model = mpesa_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(req.tenant_id),
            sale_id: Set(req.sale_id),
            checkout_request_id: Set(push_response.checkout_request_id.clone()),
            merchant_request_id: Set(Some(push_response.merchant_request_id)),
            phone_number: Set(req.phone_number),
            amount: Set(req.amount),
            status: Set(MpesaStatus::Pending.to_string()),
            mpesa_receipt_number: Set(None),
            result_code: Set(None),
            result_desc: Set(None),
            callback_received: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let created = model.insert(&*self.db).await.map_err(ServiceError::db_error)?;

        let _ = self
            .event_sender
            .send(Event::MpesaStkInitiated {
                transaction_id: created.id,
                checkout_request_id: created.checkout_request_id.clone(),
            })
            .await;

        Ok(created)
    }

    /// Processes a gateway callback.
    ///
    /// Always returns a benign acknowledgement for handled outcomes, even
    /// "transaction not found" — the remote gateway must never be made to
    /// retry forever. Only inventory-free state is touched here: the
    /// MpesaTransaction itself and, transitively, the sale's payment
    /// reference and payment-pending status.
    #[instrument(skip(self, payload))]
    pub async fn handle_callback(
        &self,
        payload: StkCallbackPayload,
    ) -> Result<CallbackAck, ServiceError> {
        let callback = payload.body.stk_callback;

        let transaction = MpesaTransactionEntity::find()
            .filter(
                mpesa_transaction::Column::CheckoutRequestId
                    .eq(callback.checkout_request_id.clone()),
            )
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let Some(transaction) = transaction else {
            warn!(
                checkout_request_id = %callback.checkout_request_id,
                "callback for unknown transaction acknowledged and ignored"
            );
            return Ok(CallbackAck::accepted("Transaction not found"));
        };

        let status = transaction.status_enum().ok_or_else(|| {
            ServiceError::Internal(format!(
                "m-pesa transaction {} has unknown status",
                transaction.id
            ))
        })?;
        if status.is_terminal() {
            info!(
                checkout_request_id = %callback.checkout_request_id,
                status = %transaction.status,
                "callback for finalized transaction ignored"
            );
            return Ok(CallbackAck::accepted("Already processed"));
        }

        let new_status = match callback.result_code {
            RESULT_CODE_SUCCESS => MpesaStatus::Completed,
            RESULT_CODE_CANCELLED_BY_USER => MpesaStatus::Cancelled,
            _ => MpesaStatus::Failed,
        };

        let receipt = callback
            .callback_metadata
            .as_ref()
            .and_then(|metadata| metadata.string_value(RECEIPT_ITEM_NAME));

        if new_status == MpesaStatus::Completed {
            if let Some(metadata) = &callback.callback_metadata {
                if let Some(amount) = metadata.string_value(AMOUNT_ITEM_NAME) {
                    if amount.parse::<Decimal>().ok() != Some(transaction.amount.normalize()) {
                        warn!(
                            checkout_request_id = %callback.checkout_request_id,
                            expected = %transaction.amount,
                            reported = %amount,
                            "callback amount differs from initiated amount"
                        );
                    }
                }
            }
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let result: Result<(), ServiceError> = async {
            let now = Utc::now();
            let sale_id = transaction.sale_id;
            let mut model: mpesa_transaction::ActiveModel = transaction.into();
            model.status = Set(new_status.to_string());
            model.result_code = Set(Some(callback.result_code));
            model.result_desc = Set(Some(callback.result_desc.clone()));
            model.mpesa_receipt_number = Set(receipt.clone());
            model.callback_received = Set(true);
            model.updated_at = Set(now);
            model.update(&txn).await.map_err(ServiceError::db_error)?;

            if new_status == MpesaStatus::Completed {
                if let (Some(sale_id), Some(receipt)) = (sale_id, receipt.as_ref()) {
                    self.attach_receipt_to_sale(&txn, sale_id, receipt).await?;
                }
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                txn.commit().await.map_err(ServiceError::db_error)?;
                let _ = self
                    .event_sender
                    .send(Event::MpesaCallbackProcessed {
                        checkout_request_id: callback.checkout_request_id,
                        status: new_status.to_string(),
                    })
                    .await;
                Ok(CallbackAck::accepted("Success"))
            }
            Err(e) => {
                txn.rollback().await.ok();
                Err(e)
            }
        }
    }

    /// Stamps the receipt onto the sale's pending M-PESA payment and
    /// completes a sale that was only waiting for this confirmation.
    async fn attach_receipt_to_sale(
        &self,
        txn: &sea_orm::DatabaseTransaction,
        sale_id: Uuid,
        receipt: &str,
    ) -> Result<(), ServiceError> {
        let payment = SalePaymentEntity::find()
            .filter(sale_payment::Column::SaleId.eq(sale_id))
            .filter(sale_payment::Column::Method.eq(PaymentMethod::Mpesa.to_string()))
            .filter(sale_payment::Column::Reference.is_null())
            .order_by_asc(sale_payment::Column::CreatedAt)
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?;

        match payment {
            Some(payment) => {
                let mut model: sale_payment::ActiveModel = payment.into();
                model.reference = Set(Some(receipt.to_string()));
                model.update(txn).await.map_err(ServiceError::db_error)?;
            }
            None => {
                warn!(%sale_id, "no unreferenced M-PESA payment found for receipt");
                return Ok(());
            }
        }

        let sale = SaleEntity::find_by_id(sale_id)
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?;
        if let Some(sale) = sale {
            if sale.status_enum() == Some(SaleStatus::Pending) {
                let version = sale.version;
                let mut model: sale::ActiveModel = sale.into();
                model.status = Set(SaleStatus::Completed.to_string());
                model.updated_at = Set(Utc::now());
                model.version = Set(version + 1);
                model.update(txn).await.map_err(ServiceError::db_error)?;
            }
        }

        Ok(())
    }

    /// Looks a transaction up by the gateway key.
    pub async fn get_by_checkout_request_id(
        &self,
        checkout_request_id: &str,
    ) -> Result<mpesa_transaction::Model, ServiceError> {
        MpesaTransactionEntity::find()
            .filter(mpesa_transaction::Column::CheckoutRequestId.eq(checkout_request_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "m-pesa transaction {} not found",
                    checkout_request_id
                ))
            })
    }

    async fn fetch_access_token(&self) -> Result<String, ServiceError> {
        let response = self
            .http
            .get(format!(
                "{}/oauth/v1/generate?grant_type=client_credentials",
                self.config.base_url
            ))
            .basic_auth(
                &self.config.consumer_key,
                Some(&self.config.consumer_secret),
            )
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalService(format!("M-Pesa auth request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalService(format!(
                "M-Pesa auth rejected with status {}",
                response.status()
            )));
        }

        let token: OauthTokenResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalService(format!("unreadable M-Pesa auth response: {}", e))
        })?;
        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn callback_payload_parses_the_gateway_shape() {
        let body = json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ws_CO_191220191020363925",
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully.",
                    "CallbackMetadata": {
                        "Item": [
                            { "Name": "Amount", "Value": 1.00 },
                            { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
                            { "Name": "PhoneNumber", "Value": 254708374149u64 }
                        ]
                    }
                }
            }
        });

        let payload: StkCallbackPayload = serde_json::from_value(body).unwrap();
        let callback = &payload.body.stk_callback;
        assert_eq!(callback.result_code, 0);
        assert_eq!(
            callback
                .callback_metadata
                .as_ref()
                .unwrap()
                .string_value(RECEIPT_ITEM_NAME)
                .unwrap(),
            "NLJ7RT61SV"
        );
    }

    #[test]
    fn cancelled_callback_parses_without_metadata() {
        let body = json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ws_CO_191220191020363925",
                    "ResultCode": 1032,
                    "ResultDesc": "Request cancelled by user."
                }
            }
        });

        let payload: StkCallbackPayload = serde_json::from_value(body).unwrap();
        assert!(payload.body.stk_callback.callback_metadata.is_none());
    }

    #[test]
    fn ack_serializes_with_gateway_field_names() {
        let ack = CallbackAck::accepted("Success");
        let value = serde_json::to_value(&ack).unwrap();
        assert_eq!(value["ResultCode"], "0");
        assert_eq!(value["ResultDesc"], "Success");
    }
}
