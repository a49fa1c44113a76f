mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::TestApp;
use dukapos_api::{
    entities::{credit_account::CreditStatus, sale_payment::PaymentMethod},
    errors::ServiceError,
    services::{
        credit::CreditPaymentRequest,
        sales::{CreateSaleRequest, SaleLineRequest, SalePaymentRequest},
    },
};
use uuid::Uuid;

async fn credit_sale(
    app: &TestApp,
    total_units: i32,
    unit_price: Decimal,
    upfront: Decimal,
    expected_in_days: i64,
) -> dukapos_api::services::sales::SaleDto {
    let product = app.create_product("Dispensed Stock", None).await;
    let batch = app
        .seed_batch(product, total_units * 2, dec!(1), unit_price)
        .await;

    let payments = if upfront.is_zero() {
        vec![]
    } else {
        vec![SalePaymentRequest {
            method: PaymentMethod::Cash,
            amount: upfront,
            reference: None,
        }]
    };

    app.state
        .services
        .sales
        .create_sale(CreateSaleRequest {
            tenant_id: app.tenant_id,
            branch_id: app.branch_id,
            cashier_id: app.cashier_id,
            customer_id: Some(Uuid::new_v4()),
            walk_in_name: None,
            walk_in_phone: None,
            line_items: vec![SaleLineRequest {
                product_id: product,
                batch_id: batch,
                quantity: total_units,
                unit_price,
                discount_amount: None,
            }],
            payments,
            is_credit_sale: true,
            expected_payment_date: Some(
                (Utc::now() + Duration::days(expected_in_days)).date_naive(),
            ),
            notes: None,
        })
        .await
        .expect("credit sale should succeed")
}

#[tokio::test]
async fn credit_sale_opens_account_with_the_shortfall() {
    let app = TestApp::new().await;
    // Total 1000, 400 upfront.
    let dto = credit_sale(&app, 10, dec!(100), dec!(400), 30).await;

    let account = dto.credit_account.expect("account should be opened");
    assert_eq!(account.total_amount, dec!(1000));
    assert_eq!(account.paid_amount, dec!(400));
    assert_eq!(account.remaining_amount, dec!(600));
    assert_eq!(account.status_enum(), Some(CreditStatus::Active));
    assert_eq!(
        account.paid_amount + account.remaining_amount,
        account.total_amount
    );
}

#[tokio::test]
async fn paying_off_the_balance_closes_the_account() {
    let app = TestApp::new().await;
    let dto = credit_sale(&app, 10, dec!(100), dec!(400), 30).await;
    let account = dto.credit_account.unwrap();

    let updated = app
        .state
        .services
        .credit
        .make_payment(CreditPaymentRequest {
            credit_account_id: account.id,
            amount: dec!(600),
            method: PaymentMethod::Mpesa,
            reference: Some("NLJ7RT61SV".into()),
            received_by: app.cashier_id,
        })
        .await
        .unwrap();

    assert_eq!(updated.status_enum(), Some(CreditStatus::Paid));
    assert_eq!(updated.remaining_amount, Decimal::ZERO);
    assert_eq!(updated.paid_amount, dec!(1000));
    assert!(updated.closed_at.is_some());

    // A settled account takes no further payments.
    let more = app
        .state
        .services
        .credit
        .make_payment(CreditPaymentRequest {
            credit_account_id: account.id,
            amount: dec!(1),
            method: PaymentMethod::Cash,
            reference: None,
            received_by: app.cashier_id,
        })
        .await;
    assert_matches!(more, Err(ServiceError::InvalidState(_)));
}

#[tokio::test]
async fn overpayment_is_rejected_without_mutating_the_account() {
    let app = TestApp::new().await;
    let dto = credit_sale(&app, 10, dec!(100), dec!(400), 30).await;
    let account = dto.credit_account.unwrap();

    let result = app
        .state
        .services
        .credit
        .make_payment(CreditPaymentRequest {
            credit_account_id: account.id,
            amount: dec!(600.01),
            method: PaymentMethod::Cash,
            reference: None,
            received_by: app.cashier_id,
        })
        .await;
    assert_matches!(result, Err(ServiceError::Validation(_)));

    let (reloaded, payments) = app
        .state
        .services
        .credit
        .get_account(account.id)
        .await
        .unwrap();
    assert_eq!(reloaded.paid_amount, dec!(400));
    assert_eq!(reloaded.remaining_amount, dec!(600));
    assert_eq!(reloaded.status_enum(), Some(CreditStatus::Active));
    assert!(payments.is_empty());
}

#[tokio::test]
async fn non_positive_payments_are_rejected() {
    let app = TestApp::new().await;
    let dto = credit_sale(&app, 5, dec!(100), dec!(100), 30).await;
    let account = dto.credit_account.unwrap();

    for amount in [Decimal::ZERO, dec!(-5)] {
        let result = app
            .state
            .services
            .credit
            .make_payment(CreditPaymentRequest {
                credit_account_id: account.id,
                amount,
                method: PaymentMethod::Cash,
                reference: None,
                received_by: app.cashier_id,
            })
            .await;
        assert_matches!(result, Err(ServiceError::Validation(_)));
    }
}

#[tokio::test]
async fn overdue_sweep_flips_only_active_past_due_accounts() {
    let app = TestApp::new().await;

    // Past due and open.
    let overdue = credit_sale(&app, 10, dec!(100), dec!(400), -3).await;
    let overdue_account = overdue.credit_account.unwrap();

    // Past due but fully paid before the sweep.
    let paid = credit_sale(&app, 5, dec!(100), dec!(200), -3).await;
    let paid_account = paid.credit_account.unwrap();
    app.state
        .services
        .credit
        .make_payment(CreditPaymentRequest {
            credit_account_id: paid_account.id,
            amount: dec!(300),
            method: PaymentMethod::Cash,
            reference: None,
            received_by: app.cashier_id,
        })
        .await
        .unwrap();

    // Not yet due.
    let current = credit_sale(&app, 5, dec!(100), dec!(100), 30).await;
    let current_account = current.credit_account.unwrap();

    let flipped = app
        .state
        .services
        .credit
        .update_overdue_accounts()
        .await
        .unwrap();
    assert_eq!(flipped, 1);

    let (overdue_reloaded, _) = app
        .state
        .services
        .credit
        .get_account(overdue_account.id)
        .await
        .unwrap();
    assert_eq!(overdue_reloaded.status_enum(), Some(CreditStatus::Overdue));

    let (paid_reloaded, _) = app
        .state
        .services
        .credit
        .get_account(paid_account.id)
        .await
        .unwrap();
    assert_eq!(paid_reloaded.status_enum(), Some(CreditStatus::Paid));

    let (current_reloaded, _) = app
        .state
        .services
        .credit
        .get_account(current_account.id)
        .await
        .unwrap();
    assert_eq!(current_reloaded.status_enum(), Some(CreditStatus::Active));

    // The sweep is idempotent.
    let second = app
        .state
        .services
        .credit
        .update_overdue_accounts()
        .await
        .unwrap();
    assert_eq!(second, 0);

    // Overdue accounts still accept payments.
    let settled = app
        .state
        .services
        .credit
        .make_payment(CreditPaymentRequest {
            credit_account_id: overdue_account.id,
            amount: dec!(600),
            method: PaymentMethod::Cash,
            reference: None,
            received_by: app.cashier_id,
        })
        .await
        .unwrap();
    assert_eq!(settled.status_enum(), Some(CreditStatus::Paid));
}
