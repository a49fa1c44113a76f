use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        commission::{CommissionPolicy, ProfitShare},
        credit::CreditAccountService,
        inventory_ledger::InventoryLedger,
        mpesa::MpesaService,
        returns::ReturnService,
        sale_edits::SaleEditService,
        sales::SaleService,
        tax::{TaxMode, TaxSettings},
    },
};

pub mod credit;
pub mod inventory;
pub mod mpesa;
pub mod returns;
pub mod sale_edits;
pub mod sales;

// Re-export AppState so handler modules can import it from one place.
pub use crate::AppState;

/// Services layer wired once at startup and shared by all handlers.
#[derive(Clone)]
pub struct AppServices {
    pub ledger: InventoryLedger,
    pub sales: SaleService,
    pub credit: CreditAccountService,
    pub returns: ReturnService,
    pub sale_edits: SaleEditService,
    pub mpesa: MpesaService,
    pub commission: Arc<dyn CommissionPolicy>,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, cfg: &AppConfig) -> Self {
        let default_tax = TaxSettings::new(
            if cfg.default_tax_inclusive {
                TaxMode::Inclusive
            } else {
                TaxMode::Exclusive
            },
            cfg.default_vat_rate,
        );

        let ledger = InventoryLedger::new(db.clone(), event_sender.clone());
        let credit = CreditAccountService::new(db.clone(), event_sender.clone());
        let sales = SaleService::new(
            db.clone(),
            event_sender.clone(),
            ledger.clone(),
            credit.clone(),
            default_tax,
        );
        let returns = ReturnService::new(db.clone(), event_sender.clone(), ledger.clone());
        let sale_edits = SaleEditService::new(
            db.clone(),
            event_sender.clone(),
            ledger.clone(),
            default_tax,
        );
        let mpesa = MpesaService::new(db.clone(), event_sender.clone(), cfg.mpesa.clone());
        let commission: Arc<dyn CommissionPolicy> =
            Arc::new(ProfitShare::new(cfg.commission_rate));

        Self {
            ledger,
            sales,
            credit,
            returns,
            sale_edits,
            mpesa,
            commission,
        }
    }
}

/// Assembles the versioned API router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Sales
        .route("/sales", post(sales::create_sale).get(sales::search_sales))
        .route("/sales/:id", get(sales::get_sale))
        .route("/sales/:id/suspend", post(sales::suspend_sale))
        .route("/sales/:id/cancel", post(sales::cancel_sale))
        .route("/sales/:id/commission", get(sales::sale_commission))
        .route("/sales/scan/:barcode", get(sales::scan_barcode))
        // Returns
        .route("/returns", post(returns::create_return))
        .route("/returns/:id", get(returns::get_return))
        // Credit accounts
        .route("/credit-accounts", get(credit::search_accounts))
        .route("/credit-accounts/:id", get(credit::get_account))
        .route("/credit-accounts/:id/payments", post(credit::make_payment))
        .route("/credit-accounts/:id/status", post(credit::set_status))
        .route(
            "/credit-accounts/sweep-overdue",
            post(credit::sweep_overdue),
        )
        // Sale edit workflow
        .route(
            "/sale-edits",
            post(sale_edits::create_request).get(sale_edits::list_pending),
        )
        .route("/sale-edits/:id", get(sale_edits::get_request))
        .route("/sale-edits/:id/decision", post(sale_edits::decide))
        // Inventory
        .route("/inventory/adjust", post(inventory::adjust_stock))
        .route("/inventory/receive", post(inventory::receive_stock))
        .route("/inventory/transfer", post(inventory::transfer_stock))
        .route("/inventory/write-off", post(inventory::write_off_stock))
        .route("/inventory/audit-log", get(inventory::search_audit_log))
        // M-Pesa
        .route("/mpesa/stk-push", post(mpesa::initiate_stk_push))
        .route("/mpesa/callback", post(mpesa::callback))
}
