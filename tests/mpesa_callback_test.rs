mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use chrono::Utc;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::TestApp;
use dukapos_api::entities::{
    mpesa_transaction::{self, MpesaStatus},
    sale::SaleStatus,
    sale_payment::PaymentMethod,
};
use dukapos_api::services::sales::{CreateSaleRequest, SaleLineRequest, SalePaymentRequest};

async fn insert_pending_transaction(
    app: &TestApp,
    checkout_request_id: &str,
    sale_id: Option<Uuid>,
) -> mpesa_transaction::Model {
    let now = Utc::now();
    mpesa_transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(app.tenant_id),
        sale_id: Set(sale_id),
        checkout_request_id: Set(checkout_request_id.to_string()),
        merchant_request_id: Set(Some("29115-34620561-1".to_string())),
        phone_number: Set("254708374149".to_string()),
        amount: Set(dec!(350)),
        status: Set(MpesaStatus::Pending.to_string()),
        mpesa_receipt_number: Set(None),
        result_code: Set(None),
        result_desc: Set(None),
        callback_received: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*app.state.db)
    .await
    .expect("failed to insert transaction")
}

fn callback_body(checkout_request_id: &str, result_code: i32, receipt: Option<&str>) -> Value {
    let mut stk = json!({
        "MerchantRequestID": "29115-34620561-1",
        "CheckoutRequestID": checkout_request_id,
        "ResultCode": result_code,
        "ResultDesc": "The service request is processed successfully.",
    });
    if let Some(receipt) = receipt {
        stk["CallbackMetadata"] = json!({
            "Item": [
                { "Name": "Amount", "Value": 350.00 },
                { "Name": "MpesaReceiptNumber", "Value": receipt },
                { "Name": "TransactionDate", "Value": 20240301101530u64 },
                { "Name": "PhoneNumber", "Value": 254708374149u64 }
            ]
        });
    }
    json!({ "Body": { "stkCallback": stk } })
}

async fn post_callback(app: &TestApp, body: &Value) -> (StatusCode, Value) {
    let response = app
        .router()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/mpesa/callback")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap();
    (status, value)
}

#[tokio::test]
async fn successful_callback_completes_the_transaction_with_receipt() {
    let app = TestApp::new().await;
    insert_pending_transaction(&app, "ws_CO_191220191020363925", None).await;

    let (status, ack) = post_callback(
        &app,
        &callback_body("ws_CO_191220191020363925", 0, Some("ABC123")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["ResultCode"], "0");

    let transaction = app
        .state
        .services
        .mpesa
        .get_by_checkout_request_id("ws_CO_191220191020363925")
        .await
        .unwrap();
    assert_eq!(transaction.status_enum(), Some(MpesaStatus::Completed));
    assert_eq!(transaction.mpesa_receipt_number.as_deref(), Some("ABC123"));
    assert!(transaction.callback_received);
    assert_eq!(transaction.result_code, Some(0));
}

#[tokio::test]
async fn unknown_checkout_request_is_acknowledged_benignly() {
    let app = TestApp::new().await;

    let (status, ack) =
        post_callback(&app, &callback_body("ws_CO_never_seen_before", 0, Some("X"))).await;

    // The gateway must not be made to retry: same 200 + ResultCode 0.
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["ResultCode"], "0");
}

#[tokio::test]
async fn user_cancellation_maps_to_cancelled() {
    let app = TestApp::new().await;
    insert_pending_transaction(&app, "ws_CO_cancel_me", None).await;

    let (status, ack) = post_callback(&app, &callback_body("ws_CO_cancel_me", 1, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["ResultCode"], "0");

    let transaction = app
        .state
        .services
        .mpesa
        .get_by_checkout_request_id("ws_CO_cancel_me")
        .await
        .unwrap();
    assert_eq!(transaction.status_enum(), Some(MpesaStatus::Cancelled));
}

#[tokio::test]
async fn other_result_codes_map_to_failed() {
    let app = TestApp::new().await;
    insert_pending_transaction(&app, "ws_CO_timeout", None).await;

    post_callback(&app, &callback_body("ws_CO_timeout", 1037, None)).await;

    let transaction = app
        .state
        .services
        .mpesa
        .get_by_checkout_request_id("ws_CO_timeout")
        .await
        .unwrap();
    assert_eq!(transaction.status_enum(), Some(MpesaStatus::Failed));
    assert_eq!(transaction.result_code, Some(1037));
}

#[tokio::test]
async fn terminal_transactions_never_revert() {
    let app = TestApp::new().await;
    insert_pending_transaction(&app, "ws_CO_done", None).await;

    post_callback(&app, &callback_body("ws_CO_done", 0, Some("RCPT1"))).await;

    // A late contradictory callback is acknowledged but ignored.
    let (status, ack) = post_callback(&app, &callback_body("ws_CO_done", 1, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["ResultCode"], "0");

    let transaction = app
        .state
        .services
        .mpesa
        .get_by_checkout_request_id("ws_CO_done")
        .await
        .unwrap();
    assert_eq!(transaction.status_enum(), Some(MpesaStatus::Completed));
    assert_eq!(transaction.mpesa_receipt_number.as_deref(), Some("RCPT1"));
}

#[tokio::test]
async fn completion_stamps_the_sale_payment_and_completes_a_pending_sale() {
    let app = TestApp::new().await;
    let product = app.create_product("Airtime Voucher", None).await;
    let batch = app.seed_batch(product, 10, dec!(300), dec!(350)).await;

    // An M-Pesa payment without a receipt leaves the sale pending.
    let dto = app
        .state
        .services
        .sales
        .create_sale(CreateSaleRequest {
            tenant_id: app.tenant_id,
            branch_id: app.branch_id,
            cashier_id: app.cashier_id,
            customer_id: None,
            walk_in_name: None,
            walk_in_phone: Some("254708374149".into()),
            line_items: vec![SaleLineRequest {
                product_id: product,
                batch_id: batch,
                quantity: 1,
                unit_price: dec!(350),
                discount_amount: None,
            }],
            payments: vec![SalePaymentRequest {
                method: PaymentMethod::Mpesa,
                amount: dec!(350),
                reference: None,
            }],
            is_credit_sale: false,
            expected_payment_date: None,
            notes: None,
        })
        .await
        .unwrap();
    assert_eq!(dto.sale.status_enum(), Some(SaleStatus::Pending));

    insert_pending_transaction(&app, "ws_CO_sale_payment", Some(dto.sale.id)).await;
    post_callback(
        &app,
        &callback_body("ws_CO_sale_payment", 0, Some("NLJ7RT61SV")),
    )
    .await;

    let reloaded = app.state.services.sales.get_sale(dto.sale.id).await.unwrap();
    assert_eq!(reloaded.sale.status_enum(), Some(SaleStatus::Completed));
    assert_eq!(
        reloaded.payments[0].reference.as_deref(),
        Some("NLJ7RT61SV")
    );
}
