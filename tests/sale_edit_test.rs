mod common;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::TestApp;
use dukapos_api::{
    entities::{
        sale_edit_request::{EditRequestStatus, EditRequestType},
        sale_payment::PaymentMethod,
    },
    errors::ServiceError,
    services::{
        sale_edits::{CreateEditRequest, DecideEditRequest},
        sales::{CreateSaleRequest, SaleDto, SaleLineRequest, SalePaymentRequest},
    },
};

/// Two-line sale: 3 x 100 and 1 x 50, paid 350 cash.
async fn two_line_sale(app: &TestApp) -> (SaleDto, Uuid, Uuid) {
    let product_a = app.create_product("Syringes", None).await;
    let product_b = app.create_product("Plasters", None).await;
    let batch_a = app.seed_batch(product_a, 10, dec!(60), dec!(100)).await;
    let batch_b = app.seed_batch(product_b, 10, dec!(20), dec!(50)).await;

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
            walk_in_phone: None,
            line_items: vec![
                SaleLineRequest {
                    product_id: product_a,
                    batch_id: batch_a,
                    quantity: 3,
                    unit_price: dec!(100),
                    discount_amount: None,
                },
                SaleLineRequest {
                    product_id: product_b,
                    batch_id: batch_b,
                    quantity: 1,
                    unit_price: dec!(50),
                    discount_amount: None,
                },
            ],
            payments: vec![SalePaymentRequest {
                method: PaymentMethod::Cash,
                amount: dec!(350),
                reference: None,
            }],
            is_credit_sale: false,
            expected_payment_date: None,
            notes: None,
        })
        .await
        .unwrap();
    (dto, batch_a, batch_b)
}

#[tokio::test]
async fn approved_price_change_recomputes_the_sale_totals() {
    let app = TestApp::new().await;
    let (dto, _, _) = two_line_sale(&app).await;
    let maker = Uuid::new_v4();
    let checker = Uuid::new_v4();

    let request = app
        .state
        .services
        .sale_edits
        .create_request(
            app.tenant_id,
            CreateEditRequest {
                sale_id: dto.sale.id,
                sale_line_item_id: dto.line_items[0].id,
                request_type: EditRequestType::PriceChange,
                new_unit_price: Some(dec!(90)),
                reason: Some("price match".into()),
                requested_by: maker,
            },
        )
        .await
        .unwrap();
    assert_eq!(request.status_enum(), Some(EditRequestStatus::Pending));

    // The sale is untouched until the checker approves.
    let before = app.state.services.sales.get_sale(dto.sale.id).await.unwrap();
    assert_eq!(before.sale.total_amount, dec!(350));

    let decided = app
        .state
        .services
        .sale_edits
        .decide(
            request.id,
            DecideEditRequest {
                approve: true,
                decided_by: checker,
                rejection_reason: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(decided.status_enum(), Some(EditRequestStatus::Approved));
    assert_eq!(decided.approved_by, Some(checker));

    let after = app.state.services.sales.get_sale(dto.sale.id).await.unwrap();
    let edited_line = after
        .line_items
        .iter()
        .find(|l| l.id == dto.line_items[0].id)
        .unwrap();
    assert_eq!(edited_line.unit_price, dec!(90));
    // 3 x 90 + 1 x 50
    assert_eq!(after.sale.subtotal, dec!(320));
    assert_eq!(after.sale.total_amount, dec!(320));
}

#[tokio::test]
async fn rejection_leaves_the_sale_untouched() {
    let app = TestApp::new().await;
    let (dto, _, _) = two_line_sale(&app).await;

    let request = app
        .state
        .services
        .sale_edits
        .create_request(
            app.tenant_id,
            CreateEditRequest {
                sale_id: dto.sale.id,
                sale_line_item_id: dto.line_items[0].id,
                request_type: EditRequestType::PriceChange,
                new_unit_price: Some(dec!(1)),
                reason: None,
                requested_by: Uuid::new_v4(),
            },
        )
        .await
        .unwrap();

    let decided = app
        .state
        .services
        .sale_edits
        .decide(
            request.id,
            DecideEditRequest {
                approve: false,
                decided_by: Uuid::new_v4(),
                rejection_reason: Some("price too low".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(decided.status_enum(), Some(EditRequestStatus::Rejected));
    assert_eq!(decided.rejection_reason.as_deref(), Some("price too low"));

    let after = app.state.services.sales.get_sale(dto.sale.id).await.unwrap();
    let line = after
        .line_items
        .iter()
        .find(|l| l.id == dto.line_items[0].id)
        .unwrap();
    assert_eq!(line.unit_price, dec!(100));
    assert_eq!(after.sale.total_amount, dec!(350));
}

#[tokio::test]
async fn a_decided_request_cannot_be_redecided() {
    let app = TestApp::new().await;
    let (dto, _, _) = two_line_sale(&app).await;

    let request = app
        .state
        .services
        .sale_edits
        .create_request(
            app.tenant_id,
            CreateEditRequest {
                sale_id: dto.sale.id,
                sale_line_item_id: dto.line_items[0].id,
                request_type: EditRequestType::PriceChange,
                new_unit_price: Some(dec!(95)),
                reason: None,
                requested_by: Uuid::new_v4(),
            },
        )
        .await
        .unwrap();

    app.state
        .services
        .sale_edits
        .decide(
            request.id,
            DecideEditRequest {
                approve: false,
                decided_by: Uuid::new_v4(),
                rejection_reason: Some("no".into()),
            },
        )
        .await
        .unwrap();

    let second = app
        .state
        .services
        .sale_edits
        .decide(
            request.id,
            DecideEditRequest {
                approve: true,
                decided_by: Uuid::new_v4(),
                rejection_reason: None,
            },
        )
        .await;
    assert_matches!(second, Err(ServiceError::InvalidState(_)));
}

#[tokio::test]
async fn the_maker_cannot_check_their_own_request() {
    let app = TestApp::new().await;
    let (dto, _, _) = two_line_sale(&app).await;
    let maker = Uuid::new_v4();

    let request = app
        .state
        .services
        .sale_edits
        .create_request(
            app.tenant_id,
            CreateEditRequest {
                sale_id: dto.sale.id,
                sale_line_item_id: dto.line_items[0].id,
                request_type: EditRequestType::PriceChange,
                new_unit_price: Some(dec!(80)),
                reason: None,
                requested_by: maker,
            },
        )
        .await
        .unwrap();

    let result = app
        .state
        .services
        .sale_edits
        .decide(
            request.id,
            DecideEditRequest {
                approve: true,
                decided_by: maker,
                rejection_reason: None,
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::Validation(_)));
}

#[tokio::test]
async fn approved_line_delete_soft_removes_and_restocks() {
    let app = TestApp::new().await;
    let (dto, batch_a, _) = two_line_sale(&app).await;
    assert_eq!(app.batch_quantity(batch_a).await, 7);

    let request = app
        .state
        .services
        .sale_edits
        .create_request(
            app.tenant_id,
            CreateEditRequest {
                sale_id: dto.sale.id,
                sale_line_item_id: dto.line_items[0].id,
                request_type: EditRequestType::LineDelete,
                new_unit_price: None,
                reason: Some("rung up in error".into()),
                requested_by: Uuid::new_v4(),
            },
        )
        .await
        .unwrap();

    app.state
        .services
        .sale_edits
        .decide(
            request.id,
            DecideEditRequest {
                approve: true,
                decided_by: Uuid::new_v4(),
                rejection_reason: None,
            },
        )
        .await
        .unwrap();

    let after = app.state.services.sales.get_sale(dto.sale.id).await.unwrap();
    let deleted_line = after
        .line_items
        .iter()
        .find(|l| l.id == dto.line_items[0].id)
        .unwrap();
    assert!(deleted_line.is_deleted);
    // Only the 50-shilling line is left.
    assert_eq!(after.sale.subtotal, dec!(50));
    assert_eq!(after.sale.total_amount, dec!(50));
    // The deleted line's units went back on the shelf.
    assert_eq!(app.batch_quantity(batch_a).await, 10);
}

#[tokio::test]
async fn the_last_live_line_cannot_be_deleted() {
    let app = TestApp::new().await;
    let product = app.create_product("Single Item", None).await;
    let batch = app.seed_batch(product, 5, dec!(10), dec!(30)).await;

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
            walk_in_phone: None,
            line_items: vec![SaleLineRequest {
                product_id: product,
                batch_id: batch,
                quantity: 1,
                unit_price: dec!(30),
                discount_amount: None,
            }],
            payments: vec![SalePaymentRequest {
                method: PaymentMethod::Cash,
                amount: dec!(30),
                reference: None,
            }],
            is_credit_sale: false,
            expected_payment_date: None,
            notes: None,
        })
        .await
        .unwrap();

    let result = app
        .state
        .services
        .sale_edits
        .create_request(
            app.tenant_id,
            CreateEditRequest {
                sale_id: dto.sale.id,
                sale_line_item_id: dto.line_items[0].id,
                request_type: EditRequestType::LineDelete,
                new_unit_price: None,
                reason: None,
                requested_by: Uuid::new_v4(),
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::Validation(_)));
}

#[tokio::test]
async fn price_changes_require_a_positive_price() {
    let app = TestApp::new().await;
    let (dto, _, _) = two_line_sale(&app).await;

    let result = app
        .state
        .services
        .sale_edits
        .create_request(
            app.tenant_id,
            CreateEditRequest {
                sale_id: dto.sale.id,
                sale_line_item_id: dto.line_items[0].id,
                request_type: EditRequestType::PriceChange,
                new_unit_price: Some(Decimal::ZERO),
                reason: None,
                requested_by: Uuid::new_v4(),
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::Validation(_)));
}
