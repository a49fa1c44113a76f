mod common;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::TestApp;
use dukapos_api::{
    entities::{
        inventory_audit_log::MovementType,
        sale::{ReturnStatus, SaleStatus},
        sale_payment::PaymentMethod,
    },
    errors::ServiceError,
    services::{
        audit_log::AuditLogQuery,
        sales::{CreateSaleRequest, SaleLineRequest, SalePaymentRequest},
    },
};

fn cash_sale_request(
    app: &TestApp,
    lines: Vec<SaleLineRequest>,
    payment: Decimal,
) -> CreateSaleRequest {
    CreateSaleRequest {
        tenant_id: app.tenant_id,
        branch_id: app.branch_id,
        cashier_id: app.cashier_id,
        customer_id: None,
        walk_in_name: None,
        walk_in_phone: None,
        line_items: lines,
        payments: vec![SalePaymentRequest {
            method: PaymentMethod::Cash,
            amount: payment,
            reference: None,
        }],
        is_credit_sale: false,
        expected_payment_date: None,
        notes: None,
    }
}

fn line(product_id: Uuid, batch_id: Uuid, quantity: i32, unit_price: Decimal) -> SaleLineRequest {
    SaleLineRequest {
        product_id,
        batch_id,
        quantity,
        unit_price,
        discount_amount: None,
    }
}

#[tokio::test]
async fn cash_sale_deducts_stock_and_audits_each_line() {
    let app = TestApp::new().await;
    let paracetamol = app.create_product("Paracetamol 500mg", None).await;
    let bandage = app.create_product("Crepe Bandage", None).await;
    let batch_a = app.seed_batch(paracetamol, 10, dec!(60), dec!(100)).await;
    let batch_b = app.seed_batch(bandage, 5, dec!(30), dec!(50)).await;

    let dto = app
        .state
        .services
        .sales
        .create_sale(cash_sale_request(
            &app,
            vec![
                line(paracetamol, batch_a, 3, dec!(100)),
                line(bandage, batch_b, 1, dec!(50)),
            ],
            dec!(350),
        ))
        .await
        .expect("sale should succeed");

    assert_eq!(dto.sale.subtotal, dec!(350));
    assert_eq!(dto.sale.total_amount, dec!(350));
    assert_eq!(dto.sale.tax_amount, Decimal::ZERO);
    assert_eq!(dto.sale.status_enum(), Some(SaleStatus::Completed));
    assert_eq!(dto.sale.return_status_enum(), Some(ReturnStatus::None));
    assert_eq!(dto.line_items.len(), 2);
    assert_eq!(dto.payments.len(), 1);
    assert!(dto.credit_account.is_none());

    assert_eq!(app.batch_quantity(batch_a).await, 7);
    assert_eq!(app.batch_quantity(batch_b).await, 4);

    // Exactly one SALE audit entry per line, keyed by the sale number.
    let (entries, total) = app
        .state
        .services
        .ledger
        .audit_log()
        .search(AuditLogQuery {
            tenant_id: Some(app.tenant_id),
            transaction_type: Some(MovementType::Sale),
            source_reference: Some(dto.sale.sale_number.clone()),
            page: 1,
            limit: 50,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 2);
    for entry in &entries {
        assert_eq!(
            entry.quantity_after,
            entry.quantity_before + entry.quantity_changed
        );
        assert!(entry.quantity_changed < 0);
        assert!(!entry.is_duplicate);
    }
}

#[tokio::test]
async fn payments_must_match_the_total_exactly() {
    let app = TestApp::new().await;
    let product = app.create_product("Amoxicillin", None).await;
    let batch = app.seed_batch(product, 10, dec!(5), dec!(12)).await;

    let result = app
        .state
        .services
        .sales
        .create_sale(cash_sale_request(
            &app,
            vec![line(product, batch, 2, dec!(12))],
            dec!(20),
        ))
        .await;

    assert_matches!(result, Err(ServiceError::Validation(_)));
    // Nothing was deducted for the rejected sale.
    assert_eq!(app.batch_quantity(batch).await, 10);
}

#[tokio::test]
async fn insufficient_stock_on_any_line_rejects_the_whole_sale() {
    let app = TestApp::new().await;
    let product_a = app.create_product("Ibuprofen", None).await;
    let product_b = app.create_product("Cough Syrup", None).await;
    let batch_a = app.seed_batch(product_a, 10, dec!(3), dec!(8)).await;
    let batch_b = app.seed_batch(product_b, 2, dec!(50), dec!(90)).await;

    let result = app
        .state
        .services
        .sales
        .create_sale(cash_sale_request(
            &app,
            vec![
                line(product_a, batch_a, 4, dec!(8)),
                line(product_b, batch_b, 3, dec!(90)), // only 2 in stock
            ],
            dec!(302),
        ))
        .await;

    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));
    // The first line's deduction rolled back with the sale.
    assert_eq!(app.batch_quantity(batch_a).await, 10);
    assert_eq!(app.batch_quantity(batch_b).await, 2);
}

#[tokio::test]
async fn cancelling_a_completed_sale_restores_stock() {
    let app = TestApp::new().await;
    let product = app.create_product("Gloves", None).await;
    let batch = app.seed_batch(product, 20, dec!(10), dec!(25)).await;

    let dto = app
        .state
        .services
        .sales
        .create_sale(cash_sale_request(
            &app,
            vec![line(product, batch, 5, dec!(25))],
            dec!(125),
        ))
        .await
        .unwrap();
    assert_eq!(app.batch_quantity(batch).await, 15);

    let cancelled = app
        .state
        .services
        .sales
        .cancel_sale(dto.sale.id, app.cashier_id)
        .await
        .unwrap();
    assert_eq!(cancelled.status_enum(), Some(SaleStatus::Cancelled));
    assert_eq!(app.batch_quantity(batch).await, 20);

    // A cancelled sale cannot be cancelled again.
    let again = app
        .state
        .services
        .sales
        .cancel_sale(dto.sale.id, app.cashier_id)
        .await;
    assert_matches!(again, Err(ServiceError::InvalidState(_)));
}

#[tokio::test]
async fn suspended_sales_cannot_be_suspended_twice() {
    let app = TestApp::new().await;
    let product = app.create_product("Face Masks", None).await;
    let batch = app.seed_batch(product, 10, dec!(2), dec!(5)).await;

    let dto = app
        .state
        .services
        .sales
        .create_sale(cash_sale_request(
            &app,
            vec![line(product, batch, 1, dec!(5))],
            dec!(5),
        ))
        .await
        .unwrap();

    let suspended = app.state.services.sales.suspend_sale(dto.sale.id).await.unwrap();
    assert_eq!(suspended.status_enum(), Some(SaleStatus::Suspended));

    let again = app.state.services.sales.suspend_sale(dto.sale.id).await;
    assert_matches!(again, Err(ServiceError::InvalidState(_)));
}

#[tokio::test]
async fn barcode_scan_lists_sellable_batches_soonest_expiry_first() {
    use chrono::{Duration, Utc};
    use dukapos_api::services::inventory_ledger::ReceiveStock;

    let app = TestApp::new().await;
    let product = app.create_product("Insulin", Some("6001234567890")).await;

    let receive = |batch_number: &str, days: i64, qty: i32| ReceiveStock {
        tenant_id: app.tenant_id,
        product_id: product,
        branch_id: app.branch_id,
        batch_number: Some(batch_number.to_string()),
        expiry_date: Some((Utc::now() + Duration::days(days)).date_naive()),
        quantity: qty,
        unit_cost: dec!(200),
        selling_price: dec!(350),
        movement: MovementType::Purchase,
        source_reference: None,
        performed_by: app.cashier_id,
    };

    app.state.services.ledger.receive_stock(receive("LOT-LATE", 365, 10)).await.unwrap();
    app.state.services.ledger.receive_stock(receive("LOT-SOON", 30, 5)).await.unwrap();
    app.state.services.ledger.receive_stock(receive("LOT-EXPIRED", -10, 3)).await.unwrap();

    let result = app
        .state
        .services
        .sales
        .scan_barcode(app.tenant_id, "6001234567890", app.branch_id)
        .await
        .unwrap();

    assert_eq!(result.product.id, product);
    let numbers: Vec<_> = result
        .batches
        .iter()
        .map(|b| b.batch_number.clone().unwrap())
        .collect();
    assert_eq!(numbers, vec!["LOT-SOON", "LOT-LATE"]);
}

#[tokio::test]
async fn commission_is_a_share_of_sale_profit() {
    let app = TestApp::new().await;
    let product_a = app.create_product("Vitamin C", None).await;
    let product_b = app.create_product("Zinc", None).await;
    let batch_a = app.seed_batch(product_a, 10, dec!(60), dec!(100)).await;
    let batch_b = app.seed_batch(product_b, 5, dec!(30), dec!(50)).await;

    let dto = app
        .state
        .services
        .sales
        .create_sale(cash_sale_request(
            &app,
            vec![
                line(product_a, batch_a, 3, dec!(100)),
                line(product_b, batch_b, 1, dec!(50)),
            ],
            dec!(350),
        ))
        .await
        .unwrap();

    // Profit: 3 x (100 - 60) + 1 x (50 - 30) = 140; 15% share = 21.
    let commission = app
        .state
        .services
        .sales
        .commission_for_sale(dto.sale.id, app.state.services.commission.as_ref())
        .await
        .unwrap();
    assert_eq!(commission, dec!(21.00));
}
