mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::TestApp;
use dukapos_api::{
    entities::inventory_audit_log::MovementType,
    errors::ServiceError,
    services::{
        audit_log::AuditLogQuery,
        inventory_ledger::{AdjustStock, BatchSelector, TransferStock, WriteOffStock},
    },
};

fn adjustment(
    app: &TestApp,
    product_id: Uuid,
    batch_id: Uuid,
    delta: i32,
    reference: &str,
) -> AdjustStock {
    AdjustStock {
        tenant_id: app.tenant_id,
        product_id,
        branch_id: app.branch_id,
        batch: BatchSelector::Batch(batch_id),
        delta,
        movement: MovementType::Adjustment,
        source_reference: reference.to_string(),
        source_type: "ADJUSTMENT".to_string(),
        performed_by: app.cashier_id,
        notes: None,
    }
}

#[tokio::test]
async fn receiving_stock_creates_the_batch_and_an_audit_entry() {
    let app = TestApp::new().await;
    let product = app.create_product("Saline Drip", None).await;
    let batch = app.seed_batch(product, 25, dec!(100), dec!(180)).await;

    assert_eq!(app.batch_quantity(batch).await, 25);

    let (entries, total) = app
        .state
        .services
        .ledger
        .audit_log()
        .search(AuditLogQuery {
            tenant_id: Some(app.tenant_id),
            product_id: Some(product),
            page: 1,
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1);
    let entry = &entries[0];
    assert_eq!(entry.transaction_type, "INITIAL_STOCK");
    assert_eq!(entry.quantity_before, 0);
    assert_eq!(entry.quantity_changed, 25);
    assert_eq!(entry.quantity_after, 25);
}

#[tokio::test]
async fn deductions_below_zero_are_rejected() {
    let app = TestApp::new().await;
    let product = app.create_product("Test Strips", None).await;
    let batch = app.seed_batch(product, 5, dec!(10), dec!(20)).await;

    let result = app
        .state
        .services
        .ledger
        .adjust(adjustment(&app, product, batch, -6, "ADJ-NEG-1"))
        .await;

    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));
    assert_eq!(app.batch_quantity(batch).await, 5);
}

#[tokio::test]
async fn retried_mutations_are_suppressed_as_duplicates() {
    let app = TestApp::new().await;
    let product = app.create_product("Antiseptic", None).await;
    let batch = app.seed_batch(product, 10, dec!(15), dec!(35)).await;

    let first = app
        .state
        .services
        .ledger
        .adjust(adjustment(&app, product, batch, -2, "ADJ-RETRY"))
        .await
        .unwrap();
    assert!(!first.duplicate);
    assert_eq!(app.batch_quantity(batch).await, 8);

    // Same idempotency key again: stock untouched, attempt recorded.
    let second = app
        .state
        .services
        .ledger
        .adjust(adjustment(&app, product, batch, -2, "ADJ-RETRY"))
        .await
        .unwrap();
    assert!(second.duplicate);
    assert_eq!(app.batch_quantity(batch).await, 8);

    let (entries, _) = app
        .state
        .services
        .ledger
        .audit_log()
        .search(AuditLogQuery {
            tenant_id: Some(app.tenant_id),
            product_id: Some(product),
            source_reference: Some("ADJ-RETRY".to_string()),
            page: 1,
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);

    let originals: Vec<_> = entries.iter().filter(|e| !e.is_duplicate).collect();
    let duplicates: Vec<_> = entries.iter().filter(|e| e.is_duplicate).collect();
    assert_eq!(originals.len(), 1);
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].duplicate_reference, Some(originals[0].id));
}

#[tokio::test]
async fn transfer_moves_stock_between_branches_atomically() {
    let app = TestApp::new().await;
    let product = app.create_product("Infusion Set", None).await;
    let source = app.seed_batch(product, 12, dec!(40), dec!(70)).await;
    let other_branch = Uuid::new_v4();

    app.state
        .services
        .ledger
        .transfer(TransferStock {
            tenant_id: app.tenant_id,
            product_id: product,
            from_branch_id: app.branch_id,
            to_branch_id: other_branch,
            quantity: 5,
            batch_number: None,
            performed_by: app.cashier_id,
        })
        .await
        .unwrap();

    assert_eq!(app.batch_quantity(source).await, 7);

    let (entries, _) = app
        .state
        .services
        .ledger
        .audit_log()
        .search(AuditLogQuery {
            tenant_id: Some(app.tenant_id),
            product_id: Some(product),
            page: 1,
            limit: 20,
            ..Default::default()
        })
        .await
        .unwrap();

    let out = entries
        .iter()
        .find(|e| e.transaction_type == "TRANSFER_OUT")
        .expect("missing TRANSFER_OUT entry");
    let incoming = entries
        .iter()
        .find(|e| e.transaction_type == "TRANSFER_IN")
        .expect("missing TRANSFER_IN entry");
    assert_eq!(out.quantity_changed, -5);
    assert_eq!(incoming.quantity_changed, 5);
    assert_eq!(out.source_reference, incoming.source_reference);
    assert_eq!(incoming.branch_id, other_branch);
}

#[tokio::test]
async fn failed_transfer_leaves_no_half_movement() {
    let app = TestApp::new().await;
    let product = app.create_product("Catheter", None).await;
    let source = app.seed_batch(product, 3, dec!(25), dec!(60)).await;
    let other_branch = Uuid::new_v4();

    let result = app
        .state
        .services
        .ledger
        .transfer(TransferStock {
            tenant_id: app.tenant_id,
            product_id: product,
            from_branch_id: app.branch_id,
            to_branch_id: other_branch,
            quantity: 10, // more than on hand
            batch_number: None,
            performed_by: app.cashier_id,
        })
        .await;
    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));

    assert_eq!(app.batch_quantity(source).await, 3);

    let (entries, _) = app
        .state
        .services
        .ledger
        .audit_log()
        .search(AuditLogQuery {
            tenant_id: Some(app.tenant_id),
            product_id: Some(product),
            page: 1,
            limit: 20,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(entries
        .iter()
        .all(|e| e.transaction_type != "TRANSFER_OUT" && e.transaction_type != "TRANSFER_IN"));
}

#[tokio::test]
async fn write_offs_deduct_and_label_the_movement() {
    let app = TestApp::new().await;
    let product = app.create_product("Expired Syrup", None).await;
    let batch = app.seed_batch(product, 8, dec!(50), dec!(95)).await;

    let outcome = app
        .state
        .services
        .ledger
        .write_off(WriteOffStock {
            tenant_id: app.tenant_id,
            product_id: product,
            branch_id: app.branch_id,
            batch_id: batch,
            quantity: 3,
            movement: MovementType::ExpiryWriteOff,
            reason: Some("past shelf life".into()),
            performed_by: app.cashier_id,
        })
        .await
        .unwrap();

    assert_eq!(outcome.quantity_after, 5);
    assert_eq!(app.batch_quantity(batch).await, 5);

    let (entries, _) = app
        .state
        .services
        .ledger
        .audit_log()
        .search(AuditLogQuery {
            tenant_id: Some(app.tenant_id),
            product_id: Some(product),
            transaction_type: Some(MovementType::ExpiryWriteOff),
            page: 1,
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].quantity_changed, -3);
}

#[tokio::test]
async fn every_audit_entry_satisfies_the_quantity_identity() {
    let app = TestApp::new().await;
    let product = app.create_product("Multivitamin", None).await;
    let batch = app.seed_batch(product, 50, dec!(5), dec!(12)).await;

    for (delta, reference) in [(-10, "ADJ-A"), (5, "ADJ-B"), (-7, "ADJ-C")] {
        app.state
            .services
            .ledger
            .adjust(adjustment(&app, product, batch, delta, reference))
            .await
            .unwrap();
    }

    let (entries, _) = app
        .state
        .services
        .ledger
        .audit_log()
        .search(AuditLogQuery {
            tenant_id: Some(app.tenant_id),
            product_id: Some(product),
            page: 1,
            limit: 50,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(entries.len(), 4); // initial stock + three adjustments
    for entry in &entries {
        assert_ne!(entry.quantity_changed, 0);
        assert_eq!(
            entry.quantity_after,
            entry.quantity_before + entry.quantity_changed
        );
    }
    assert_eq!(app.batch_quantity(batch).await, 38);
}

#[tokio::test]
async fn zero_delta_adjustments_are_rejected() {
    let app = TestApp::new().await;
    let product = app.create_product("Gauze", None).await;
    let batch = app.seed_batch(product, 4, dec!(8), dec!(15)).await;

    let result = app
        .state
        .services
        .ledger
        .adjust(adjustment(&app, product, batch, 0, "ADJ-ZERO"))
        .await;
    assert_matches!(result, Err(ServiceError::Validation(_)));
}
