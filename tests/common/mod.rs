#![allow(dead_code)] // not every test binary uses every helper

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use dukapos_api::{
    config::AppConfig,
    db,
    entities::{inventory_audit_log::MovementType, inventory_batch, product},
    events::{self, EventSender},
    handlers::AppServices,
    services::inventory_ledger::ReceiveStock,
    AppState,
};

/// Test harness backed by an in-memory SQLite database.
///
/// The pool is pinned to a single connection: every connection to
/// `sqlite::memory:` would otherwise see its own empty database.
pub struct TestApp {
    pub state: AppState,
    pub tenant_id: Uuid,
    pub branch_id: Uuid,
    pub cashier_id: Uuid,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        // Most scenarios want untaxed round numbers; tests that exercise
        // VAT write a tenant settings row instead.
        cfg.default_vat_rate = Decimal::ZERO;
        cfg.default_tax_inclusive = false;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let db = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db.clone(), Arc::new(event_sender.clone()), &cfg);
        let state = AppState {
            db,
            config: cfg,
            event_sender,
            services,
        };

        Self {
            state,
            tenant_id: Uuid::new_v4(),
            branch_id: Uuid::new_v4(),
            cashier_id: Uuid::new_v4(),
            _event_task: event_task,
        }
    }

    pub fn router(&self) -> axum::Router {
        dukapos_api::app_router(self.state.clone())
    }

    /// Inserts a catalog product.
    pub async fn create_product(&self, name: &str, barcode: Option<&str>) -> Uuid {
        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(self.tenant_id),
            name: Set(name.to_string()),
            barcode: Set(barcode.map(str::to_string)),
            unit: Set(Some("piece".to_string())),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };
        model
            .insert(&*self.state.db)
            .await
            .expect("failed to insert product")
            .id
    }

    /// Books opening stock in through the ledger and returns the batch id.
    pub async fn seed_batch(
        &self,
        product_id: Uuid,
        quantity: i32,
        unit_cost: Decimal,
        selling_price: Decimal,
    ) -> Uuid {
        self.seed_batch_at(product_id, self.branch_id, quantity, unit_cost, selling_price)
            .await
    }

    pub async fn seed_batch_at(
        &self,
        product_id: Uuid,
        branch_id: Uuid,
        quantity: i32,
        unit_cost: Decimal,
        selling_price: Decimal,
    ) -> Uuid {
        let (batch_id, _) = self
            .state
            .services
            .ledger
            .receive_stock(ReceiveStock {
                tenant_id: self.tenant_id,
                product_id,
                branch_id,
                batch_number: None,
                expiry_date: None,
                quantity,
                unit_cost,
                selling_price,
                movement: MovementType::InitialStock,
                source_reference: None,
                performed_by: self.cashier_id,
            })
            .await
            .expect("failed to seed batch");
        batch_id
    }

    /// Current on-hand quantity of a batch.
    pub async fn batch_quantity(&self, batch_id: Uuid) -> i32 {
        inventory_batch::Entity::find_by_id(batch_id)
            .one(&*self.state.db)
            .await
            .expect("failed to load batch")
            .expect("batch not found")
            .quantity
    }
}
