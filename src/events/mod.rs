use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Domain events emitted after a unit of work commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Sale events
    SaleCompleted {
        sale_id: Uuid,
        sale_number: String,
        total_amount: Decimal,
        is_credit_sale: bool,
    },
    SaleSuspended(Uuid),
    SaleCancelled {
        sale_id: Uuid,
        stock_reversed: bool,
    },

    // Inventory events
    InventoryAdjusted {
        product_id: Uuid,
        branch_id: Uuid,
        batch_id: Uuid,
        quantity_before: i32,
        quantity_after: i32,
        transaction_type: String,
        source_reference: String,
    },
    InventoryTransferred {
        product_id: Uuid,
        from_branch_id: Uuid,
        to_branch_id: Uuid,
        quantity: i32,
    },
    DuplicateAuditAttempt {
        product_id: Uuid,
        branch_id: Uuid,
        source_reference: String,
        source_type: String,
    },

    // Credit events
    CreditAccountOpened {
        credit_account_id: Uuid,
        sale_id: Uuid,
        remaining_amount: Decimal,
    },
    CreditPaymentReceived {
        credit_account_id: Uuid,
        amount: Decimal,
        remaining_amount: Decimal,
    },
    CreditAccountPaidOff(Uuid),
    CreditAccountsMarkedOverdue(u64),

    // Return events
    ReturnProcessed {
        return_id: Uuid,
        sale_id: Uuid,
        refund_amount: Decimal,
    },

    // Sale edit events
    SaleEditRequested {
        request_id: Uuid,
        sale_id: Uuid,
    },
    SaleEditDecided {
        request_id: Uuid,
        sale_id: Uuid,
        approved: bool,
    },

    // M-Pesa events
    MpesaStkInitiated {
        transaction_id: Uuid,
        checkout_request_id: String,
    },
    MpesaCallbackProcessed {
        checkout_request_id: String,
        status: String,
    },

    // Generic event for custom messages
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

/// Quantity at or below which a low-stock warning fires.
const LOW_STOCK_THRESHOLD: i32 = 10;

/// Consumes events and dispatches side effects (alerting, logging).
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::InventoryAdjusted {
                product_id,
                branch_id,
                quantity_after,
                ref transaction_type,
                ..
            } => {
                if quantity_after <= LOW_STOCK_THRESHOLD {
                    warn!(
                        %product_id,
                        %branch_id,
                        quantity_after,
                        transaction_type,
                        "low stock level after adjustment"
                    );
                }
            }
            Event::DuplicateAuditAttempt {
                product_id,
                ref source_reference,
                ref source_type,
                ..
            } => {
                warn!(
                    %product_id,
                    source_reference,
                    source_type,
                    "suppressed duplicate inventory mutation"
                );
            }
            Event::SaleCompleted {
                sale_id,
                ref sale_number,
                total_amount,
                is_credit_sale,
            } => {
                info!(%sale_id, sale_number, %total_amount, is_credit_sale, "sale completed");
            }
            Event::CreditAccountsMarkedOverdue(count) if count > 0 => {
                warn!(count, "credit accounts transitioned to overdue");
            }
            Event::MpesaCallbackProcessed {
                ref checkout_request_id,
                ref status,
            } => {
                info!(checkout_request_id, status, "m-pesa callback processed");
            }
            other => {
                info!(event = ?other, "event received");
            }
        }
    }

    warn!("event processing loop has ended");
}
