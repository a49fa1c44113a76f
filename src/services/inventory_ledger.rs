use chrono::{NaiveDate, Utc};
use sea_orm::sea_query::{Expr, NullOrdering};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, Order, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::inventory_audit_log::MovementType,
    entities::inventory_batch::{self, Entity as BatchEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::audit_log::{AuditKey, AuditLogWriter, NewAuditEntry},
};

/// Attempts before an optimistic-lock conflict is surfaced to the caller.
const MAX_LOCK_RETRIES: u32 = 3;

/// How the target batch of an adjustment is chosen.
#[derive(Debug, Clone)]
pub enum BatchSelector {
    /// Address one batch directly.
    Batch(Uuid),
    /// First-expire-first-out: the active batch with the soonest expiry
    /// date (undated batches last) that can absorb the delta.
    EarliestExpiry,
}

/// One quantity mutation plus its audit identity.
#[derive(Debug, Clone)]
pub struct AdjustStock {
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub batch: BatchSelector,
    /// Signed quantity change; never zero
    pub delta: i32,
    pub movement: MovementType,
    pub source_reference: String,
    pub source_type: String,
    pub performed_by: Uuid,
    pub notes: Option<String>,
}

/// Result of an adjustment.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AdjustOutcome {
    pub batch_id: Option<Uuid>,
    pub quantity_before: i32,
    pub quantity_after: i32,
    /// True when the mutation was suppressed as a retried write
    pub duplicate: bool,
}

/// New stock entering the system, from a purchase receipt or an opening
/// balance.
#[derive(Debug, Clone)]
pub struct ReceiveStock {
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: i32,
    pub unit_cost: rust_decimal::Decimal,
    pub selling_price: rust_decimal::Decimal,
    /// PURCHASE or INITIAL_STOCK
    pub movement: MovementType,
    pub source_reference: Option<String>,
    pub performed_by: Uuid,
}

/// Stock moving between branches as one logical unit of work.
#[derive(Debug, Clone)]
pub struct TransferStock {
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub from_branch_id: Uuid,
    pub to_branch_id: Uuid,
    pub quantity: i32,
    pub batch_number: Option<String>,
    pub performed_by: Uuid,
}

/// Expired or damaged stock leaving the system.
#[derive(Debug, Clone)]
pub struct WriteOffStock {
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub batch_id: Uuid,
    pub quantity: i32,
    /// EXPIRY_WRITE_OFF or DAMAGE_WRITE_OFF
    pub movement: MovementType,
    pub reason: Option<String>,
    pub performed_by: Uuid,
}

/// Owner of every batch quantity mutation.
///
/// The in-transaction primitive is [`InventoryLedger::apply`]: callers that
/// need several mutations (or a mutation plus their own rows) in one unit
/// of work pass their transaction in, and either everything commits or
/// nothing does. Each successful mutation appends exactly one audit entry;
/// retried writes are detected by the audit idempotency key and suppressed.
#[derive(Clone)]
pub struct InventoryLedger {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    audit: AuditLogWriter,
}

impl InventoryLedger {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        let audit = AuditLogWriter::new(db.clone());
        Self {
            db,
            event_sender,
            audit,
        }
    }

    pub fn audit_log(&self) -> &AuditLogWriter {
        &self.audit
    }

    /// Applies one adjustment inside the caller's unit of work.
    ///
    /// Quantity updates are conditional on the batch `version` read; a
    /// concurrent writer causes a re-read and retry, and after
    /// `MAX_LOCK_RETRIES` lost races the operation fails with `Conflict`
    /// rather than risk a lost update.
    pub async fn apply<C: ConnectionTrait>(
        &self,
        conn: &C,
        req: AdjustStock,
    ) -> Result<AdjustOutcome, ServiceError> {
        if req.delta == 0 {
            return Err(ServiceError::Validation(
                "adjustment delta cannot be zero".into(),
            ));
        }

        let key = AuditKey {
            tenant_id: req.tenant_id,
            product_id: req.product_id,
            branch_id: req.branch_id,
            source_reference: req.source_reference.clone(),
            source_type: req.source_type.clone(),
        };

        // Retried write: record the attempt, leave stock untouched.
        if let Some(original) = self.audit.find_original(conn, &key).await? {
            warn!(
                product_id = %req.product_id,
                source_reference = %req.source_reference,
                source_type = %req.source_type,
                "duplicate inventory mutation suppressed"
            );
            self.audit
                .record_duplicate(conn, &original, req.performed_by)
                .await?;
            return Ok(AdjustOutcome {
                batch_id: original.batch_id,
                quantity_before: original.quantity_before,
                quantity_after: original.quantity_after,
                duplicate: true,
            });
        }

        let mut attempts = 0;
        loop {
            let batch = self.select_batch(conn, &req).await?;
            let new_quantity = batch.quantity + req.delta;
            if new_quantity < 0 {
                return Err(ServiceError::InsufficientStock(format!(
                    "product {} has {} units at branch {}, cannot deduct {}",
                    req.product_id,
                    batch.quantity,
                    req.branch_id,
                    req.delta.abs()
                )));
            }

            let updated = BatchEntity::update_many()
                .col_expr(inventory_batch::Column::Quantity, Expr::value(new_quantity))
                .col_expr(
                    inventory_batch::Column::Version,
                    Expr::value(batch.version + 1),
                )
                .col_expr(inventory_batch::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(inventory_batch::Column::Id.eq(batch.id))
                .filter(inventory_batch::Column::Version.eq(batch.version))
                .exec(conn)
                .await
                .map_err(ServiceError::db_error)?;

            if updated.rows_affected == 0 {
                attempts += 1;
                if attempts >= MAX_LOCK_RETRIES {
                    return Err(ServiceError::Conflict(format!(
                        "batch {} was modified concurrently",
                        batch.id
                    )));
                }
                continue;
            }

            self.audit
                .record(
                    conn,
                    NewAuditEntry {
                        tenant_id: req.tenant_id,
                        product_id: req.product_id,
                        branch_id: req.branch_id,
                        batch_id: Some(batch.id),
                        movement: req.movement,
                        quantity_changed: req.delta,
                        quantity_before: batch.quantity,
                        quantity_after: new_quantity,
                        source_reference: req.source_reference.clone(),
                        source_type: req.source_type.clone(),
                        performed_by: req.performed_by,
                        notes: req.notes.clone(),
                    },
                )
                .await?;

            return Ok(AdjustOutcome {
                batch_id: Some(batch.id),
                quantity_before: batch.quantity,
                quantity_after: new_quantity,
                duplicate: false,
            });
        }
    }

    /// Stand-alone adjustment in its own transaction, e.g. a stock count
    /// correction.
    #[instrument(skip(self, req), fields(product_id = %req.product_id, delta = req.delta))]
    pub async fn adjust(&self, req: AdjustStock) -> Result<AdjustOutcome, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let outcome = self.apply(&txn, req.clone()).await;
        match outcome {
            Ok(outcome) => {
                txn.commit().await.map_err(ServiceError::db_error)?;
                self.emit_adjusted(&req, &outcome).await;
                Ok(outcome)
            }
            Err(e) => {
                txn.rollback().await.ok();
                Err(e)
            }
        }
    }

    /// Books new stock in, creating the batch when it does not exist yet.
    #[instrument(skip(self, req), fields(product_id = %req.product_id, quantity = req.quantity))]
    pub async fn receive_stock(
        &self,
        req: ReceiveStock,
    ) -> Result<(Uuid, AdjustOutcome), ServiceError> {
        if req.quantity < 1 {
            return Err(ServiceError::Validation(
                "received quantity must be at least 1".into(),
            ));
        }
        if !matches!(
            req.movement,
            MovementType::Purchase | MovementType::InitialStock
        ) {
            return Err(ServiceError::Validation(
                "stock receipt must be PURCHASE or INITIAL_STOCK".into(),
            ));
        }

        let source_reference = req
            .source_reference
            .clone()
            .unwrap_or_else(|| super::generate_document_number("GRN"));

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let batch_id = match self
            .find_batch_by_number(&txn, req.tenant_id, req.product_id, req.branch_id, &req.batch_number)
            .await?
        {
            Some(batch) => batch.id,
            None => {
                let now = Utc::now();
                let model = inventory_batch::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    tenant_id: Set(req.tenant_id),
                    product_id: Set(req.product_id),
                    branch_id: Set(req.branch_id),
                    batch_number: Set(req.batch_number.clone()),
                    expiry_date: Set(req.expiry_date),
                    quantity: Set(0),
                    unit_cost: Set(req.unit_cost),
                    selling_price: Set(req.selling_price),
                    is_active: Set(true),
                    version: Set(1),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                let created = model.insert(&txn).await.map_err(ServiceError::db_error)?;
                created.id
            }
        };

        let adjust = AdjustStock {
            tenant_id: req.tenant_id,
            product_id: req.product_id,
            branch_id: req.branch_id,
            batch: BatchSelector::Batch(batch_id),
            delta: req.quantity,
            movement: req.movement,
            source_reference,
            source_type: req.movement.as_str().to_string(),
            performed_by: req.performed_by,
            notes: None,
        };

        match self.apply(&txn, adjust.clone()).await {
            Ok(outcome) => {
                txn.commit().await.map_err(ServiceError::db_error)?;
                self.emit_adjusted(&adjust, &outcome).await;
                Ok((batch_id, outcome))
            }
            Err(e) => {
                txn.rollback().await.ok();
                Err(e)
            }
        }
    }

    /// Moves stock between branches: TRANSFER_OUT on the source batch and
    /// TRANSFER_IN at the destination, both in one transaction.
    #[instrument(skip(self, req), fields(product_id = %req.product_id, quantity = req.quantity))]
    pub async fn transfer(&self, req: TransferStock) -> Result<String, ServiceError> {
        if req.quantity < 1 {
            return Err(ServiceError::Validation(
                "transfer quantity must be at least 1".into(),
            ));
        }
        if req.from_branch_id == req.to_branch_id {
            return Err(ServiceError::Validation(
                "cannot transfer to the same branch".into(),
            ));
        }

        let reference = super::generate_document_number("TRF");
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let result = self.transfer_in_txn(&txn, &req, &reference).await;
        match result {
            Ok(()) => {
                txn.commit().await.map_err(ServiceError::db_error)?;
                let _ = self
                    .event_sender
                    .send(Event::InventoryTransferred {
                        product_id: req.product_id,
                        from_branch_id: req.from_branch_id,
                        to_branch_id: req.to_branch_id,
                        quantity: req.quantity,
                    })
                    .await;
                Ok(reference)
            }
            Err(e) => {
                txn.rollback().await.ok();
                Err(e)
            }
        }
    }

    async fn transfer_in_txn<C: ConnectionTrait>(
        &self,
        txn: &C,
        req: &TransferStock,
        reference: &str,
    ) -> Result<(), ServiceError> {
        // Deduct from the source first so an insufficient balance aborts
        // before anything is created at the destination.
        let source_selector = match &req.batch_number {
            Some(number) => {
                let batch = self
                    .find_batch_by_number(
                        txn,
                        req.tenant_id,
                        req.product_id,
                        req.from_branch_id,
                        &Some(number.clone()),
                    )
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!(
                            "batch {} of product {} not found at source branch",
                            number, req.product_id
                        ))
                    })?;
                BatchSelector::Batch(batch.id)
            }
            None => BatchSelector::EarliestExpiry,
        };

        let out = self
            .apply(
                txn,
                AdjustStock {
                    tenant_id: req.tenant_id,
                    product_id: req.product_id,
                    branch_id: req.from_branch_id,
                    batch: source_selector,
                    delta: -req.quantity,
                    movement: MovementType::TransferOut,
                    source_reference: reference.to_string(),
                    source_type: "TRANSFER".to_string(),
                    performed_by: req.performed_by,
                    notes: None,
                },
            )
            .await?;

        // Carry cost, price and expiry over from the source batch.
        let source_batch_id = out.batch_id.ok_or_else(|| {
            ServiceError::Internal("transfer deduction produced no batch".into())
        })?;
        let source_batch = BatchEntity::find_by_id(source_batch_id)
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound("source batch disappeared".into()))?;

        let destination = self
            .find_batch_by_number(
                txn,
                req.tenant_id,
                req.product_id,
                req.to_branch_id,
                &source_batch.batch_number,
            )
            .await?;

        let destination_id = match destination {
            Some(batch) => batch.id,
            None => {
                let now = Utc::now();
                let model = inventory_batch::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    tenant_id: Set(req.tenant_id),
                    product_id: Set(req.product_id),
                    branch_id: Set(req.to_branch_id),
                    batch_number: Set(source_batch.batch_number.clone()),
                    expiry_date: Set(source_batch.expiry_date),
                    quantity: Set(0),
                    unit_cost: Set(source_batch.unit_cost),
                    selling_price: Set(source_batch.selling_price),
                    is_active: Set(true),
                    version: Set(1),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                model.insert(txn).await.map_err(ServiceError::db_error)?.id
            }
        };

        self.apply(
            txn,
            AdjustStock {
                tenant_id: req.tenant_id,
                product_id: req.product_id,
                branch_id: req.to_branch_id,
                batch: BatchSelector::Batch(destination_id),
                delta: req.quantity,
                movement: MovementType::TransferIn,
                source_reference: reference.to_string(),
                source_type: "TRANSFER".to_string(),
                performed_by: req.performed_by,
                notes: None,
            },
        )
        .await?;

        Ok(())
    }

    /// Removes expired or damaged stock.
    #[instrument(skip(self, req), fields(batch_id = %req.batch_id, quantity = req.quantity))]
    pub async fn write_off(&self, req: WriteOffStock) -> Result<AdjustOutcome, ServiceError> {
        if req.quantity < 1 {
            return Err(ServiceError::Validation(
                "write-off quantity must be at least 1".into(),
            ));
        }
        if !matches!(
            req.movement,
            MovementType::ExpiryWriteOff | MovementType::DamageWriteOff
        ) {
            return Err(ServiceError::Validation(
                "write-off must be EXPIRY_WRITE_OFF or DAMAGE_WRITE_OFF".into(),
            ));
        }

        let adjust = AdjustStock {
            tenant_id: req.tenant_id,
            product_id: req.product_id,
            branch_id: req.branch_id,
            batch: BatchSelector::Batch(req.batch_id),
            delta: -req.quantity,
            movement: req.movement,
            source_reference: super::generate_document_number("WO"),
            source_type: "WRITE_OFF".to_string(),
            performed_by: req.performed_by,
            notes: req.reason,
        };
        self.adjust(adjust).await
    }

    async fn select_batch<C: ConnectionTrait>(
        &self,
        conn: &C,
        req: &AdjustStock,
    ) -> Result<inventory_batch::Model, ServiceError> {
        match &req.batch {
            BatchSelector::Batch(batch_id) => {
                let batch = BatchEntity::find_by_id(*batch_id)
                    .one(conn)
                    .await
                    .map_err(ServiceError::db_error)?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("inventory batch {} not found", batch_id))
                    })?;

                if batch.tenant_id != req.tenant_id
                    || batch.product_id != req.product_id
                    || batch.branch_id != req.branch_id
                {
                    return Err(ServiceError::NotFound(format!(
                        "inventory batch {} does not match product/branch",
                        batch_id
                    )));
                }
                if !batch.is_active {
                    return Err(ServiceError::Validation(format!(
                        "inventory batch {} is inactive",
                        batch_id
                    )));
                }
                Ok(batch)
            }
            BatchSelector::EarliestExpiry => {
                let mut finder = BatchEntity::find()
                    .filter(inventory_batch::Column::TenantId.eq(req.tenant_id))
                    .filter(inventory_batch::Column::ProductId.eq(req.product_id))
                    .filter(inventory_batch::Column::BranchId.eq(req.branch_id))
                    .filter(inventory_batch::Column::IsActive.eq(true));

                if req.delta < 0 {
                    finder = finder.filter(inventory_batch::Column::Quantity.gte(-req.delta));
                }

                finder
                    .order_by_with_nulls(
                        inventory_batch::Column::ExpiryDate,
                        Order::Asc,
                        NullOrdering::Last,
                    )
                    .one(conn)
                    .await
                    .map_err(ServiceError::db_error)?
                    .ok_or_else(|| {
                        if req.delta < 0 {
                            ServiceError::InsufficientStock(format!(
                                "no batch of product {} at branch {} can supply {} units",
                                req.product_id,
                                req.branch_id,
                                -req.delta
                            ))
                        } else {
                            ServiceError::NotFound(format!(
                                "no active batch of product {} at branch {}",
                                req.product_id, req.branch_id
                            ))
                        }
                    })
            }
        }
    }

    async fn find_batch_by_number<C: ConnectionTrait>(
        &self,
        conn: &C,
        tenant_id: Uuid,
        product_id: Uuid,
        branch_id: Uuid,
        batch_number: &Option<String>,
    ) -> Result<Option<inventory_batch::Model>, ServiceError> {
        let mut finder = BatchEntity::find()
            .filter(inventory_batch::Column::TenantId.eq(tenant_id))
            .filter(inventory_batch::Column::ProductId.eq(product_id))
            .filter(inventory_batch::Column::BranchId.eq(branch_id))
            .filter(inventory_batch::Column::IsActive.eq(true));

        finder = match batch_number {
            Some(number) => finder.filter(inventory_batch::Column::BatchNumber.eq(number.clone())),
            None => finder.filter(inventory_batch::Column::BatchNumber.is_null()),
        };

        finder.one(conn).await.map_err(ServiceError::db_error)
    }

    async fn emit_adjusted(&self, req: &AdjustStock, outcome: &AdjustOutcome) {
        if outcome.duplicate {
            let _ = self
                .event_sender
                .send(Event::DuplicateAuditAttempt {
                    product_id: req.product_id,
                    branch_id: req.branch_id,
                    source_reference: req.source_reference.clone(),
                    source_type: req.source_type.clone(),
                })
                .await;
            return;
        }

        if let Some(batch_id) = outcome.batch_id {
            info!(
                product_id = %req.product_id,
                batch_id = %batch_id,
                quantity_after = outcome.quantity_after,
                "inventory adjusted"
            );
            let _ = self
                .event_sender
                .send(Event::InventoryAdjusted {
                    product_id: req.product_id,
                    branch_id: req.branch_id,
                    batch_id,
                    quantity_before: outcome.quantity_before,
                    quantity_after: outcome.quantity_after,
                    transaction_type: req.movement.as_str().to_string(),
                    source_reference: req.source_reference.clone(),
                })
                .await;
        }
    }
}
