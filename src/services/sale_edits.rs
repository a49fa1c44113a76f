use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        inventory_audit_log::MovementType,
        sale::{self, Entity as SaleEntity, SaleStatus},
        sale_edit_request::{self, EditRequestStatus, EditRequestType, Entity as EditRequestEntity},
        sale_line_item::{self, Entity as SaleLineItemEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        inventory_ledger::{AdjustStock, BatchSelector, InventoryLedger},
        tax::{self, TaxSettings},
    },
};

#[derive(Debug, Deserialize)]
pub struct CreateEditRequest {
    pub sale_id: Uuid,
    pub sale_line_item_id: Uuid,
    pub request_type: EditRequestType,
    /// Required for PRICE_CHANGE
    #[serde(default)]
    pub new_unit_price: Option<Decimal>,
    #[serde(default)]
    pub reason: Option<String>,
    pub requested_by: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct DecideEditRequest {
    pub approve: bool,
    pub decided_by: Uuid,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

/// Maker-checker workflow over post-completion sale amendments.
///
/// The state machine is PENDING → APPROVED | REJECTED and nothing else;
/// every decision goes through [`SaleEditService::decide`], which is the
/// single place the transition table is checked. A rejected request leaves
/// the sale untouched; a decided request can never be re-decided.
#[derive(Clone)]
pub struct SaleEditService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    ledger: InventoryLedger,
    default_tax: TaxSettings,
}

impl SaleEditService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        ledger: InventoryLedger,
        default_tax: TaxSettings,
    ) -> Self {
        Self {
            db,
            event_sender,
            ledger,
            default_tax,
        }
    }

    /// Maker side: files an amendment against a completed sale.
    #[instrument(skip(self, request), fields(sale_id = %request.sale_id))]
    pub async fn create_request(
        &self,
        tenant_id: Uuid,
        request: CreateEditRequest,
    ) -> Result<sale_edit_request::Model, ServiceError> {
        let sale = SaleEntity::find_by_id(request.sale_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("sale {} not found", request.sale_id)))?;

        if sale.tenant_id != tenant_id {
            return Err(ServiceError::NotFound(format!(
                "sale {} not found",
                request.sale_id
            )));
        }
        if sale.status_enum() != Some(SaleStatus::Completed) {
            return Err(ServiceError::InvalidState(format!(
                "sale {} is {} and cannot be amended",
                sale.sale_number, sale.status
            )));
        }

        let line = SaleLineItemEntity::find_by_id(request.sale_line_item_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "sale line {} not found",
                    request.sale_line_item_id
                ))
            })?;
        if line.sale_id != sale.id || line.is_deleted {
            return Err(ServiceError::Validation(format!(
                "line {} is not a live line of sale {}",
                request.sale_line_item_id, sale.sale_number
            )));
        }

        match request.request_type {
            EditRequestType::PriceChange => {
                let price = request.new_unit_price.ok_or_else(|| {
                    ServiceError::Validation("price change requires a new unit price".into())
                })?;
                if price <= Decimal::ZERO {
                    return Err(ServiceError::Validation(
                        "new unit price must be greater than zero".into(),
                    ));
                }
            }
            EditRequestType::LineDelete => {
                let live_lines = SaleLineItemEntity::find()
                    .filter(sale_line_item::Column::SaleId.eq(sale.id))
                    .filter(sale_line_item::Column::IsDeleted.eq(false))
                    .count(&*self.db)
                    .await
                    .map_err(ServiceError::db_error)?;
                if live_lines <= 1 {
                    return Err(ServiceError::Validation(
                        "cannot remove the last line of a sale; cancel the sale instead".into(),
                    ));
                }
            }
        }

        let now = Utc::now();
        let model = sale_edit_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            sale_id: Set(sale.id),
            sale_line_item_id: Set(line.id),
            request_type: Set(request.request_type.to_string()),
            new_unit_price: Set(request.new_unit_price),
            reason: Set(request.reason.clone()),
            status: Set(EditRequestStatus::Pending.to_string()),
            requested_by: Set(request.requested_by),
            approved_by: Set(None),
            rejection_reason: Set(None),
            decided_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let created = model.insert(&*self.db).await.map_err(ServiceError::db_error)?;

        let _ = self
            .event_sender
            .send(Event::SaleEditRequested {
                request_id: created.id,
                sale_id: sale.id,
            })
            .await;

        Ok(created)
    }

    /// Checker side: approves or rejects a pending request. Approval
    /// applies the amendment and re-derives the sale totals in the same
    /// transaction; rejection records the reason and changes nothing else.
    #[instrument(skip(self, decision), fields(request_id = %request_id))]
    pub async fn decide(
        &self,
        request_id: Uuid,
        decision: DecideEditRequest,
    ) -> Result<sale_edit_request::Model, ServiceError> {
        let request = EditRequestEntity::find_by_id(request_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("edit request {} not found", request_id))
            })?;

        let status = request.status_enum().ok_or_else(|| {
            ServiceError::Internal(format!("edit request {} has unknown status", request.id))
        })?;
        if status.is_terminal() {
            return Err(ServiceError::InvalidState(format!(
                "edit request {} is already {}",
                request.id, request.status
            )));
        }
        if decision.decided_by == request.requested_by {
            return Err(ServiceError::Validation(
                "an edit request cannot be decided by its requester".into(),
            ));
        }

        if !decision.approve {
            let now = Utc::now();
            let mut model: sale_edit_request::ActiveModel = request.clone().into();
            model.status = Set(EditRequestStatus::Rejected.to_string());
            model.approved_by = Set(Some(decision.decided_by));
            model.rejection_reason = Set(decision.rejection_reason.clone());
            model.decided_at = Set(Some(now));
            model.updated_at = Set(now);
            let updated = model.update(&*self.db).await.map_err(ServiceError::db_error)?;

            let _ = self
                .event_sender
                .send(Event::SaleEditDecided {
                    request_id,
                    sale_id: updated.sale_id,
                    approved: false,
                })
                .await;
            return Ok(updated);
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let result = self.approve_in_txn(&txn, &request, &decision).await;

        match result {
            Ok(updated) => {
                txn.commit().await.map_err(ServiceError::db_error)?;
                info!(%request_id, sale_id = %updated.sale_id, "edit request approved");
                let _ = self
                    .event_sender
                    .send(Event::SaleEditDecided {
                        request_id,
                        sale_id: updated.sale_id,
                        approved: true,
                    })
                    .await;
                Ok(updated)
            }
            Err(e) => {
                txn.rollback().await.ok();
                Err(e)
            }
        }
    }

    async fn approve_in_txn<C: ConnectionTrait>(
        &self,
        txn: &C,
        request: &sale_edit_request::Model,
        decision: &DecideEditRequest,
    ) -> Result<sale_edit_request::Model, ServiceError> {
        let sale = SaleEntity::find_by_id(request.sale_id)
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("sale {} not found", request.sale_id)))?;

        let line = SaleLineItemEntity::find_by_id(request.sale_line_item_id)
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "sale line {} not found",
                    request.sale_line_item_id
                ))
            })?;
        if line.is_deleted {
            return Err(ServiceError::InvalidState(format!(
                "line {} was already removed from the sale",
                line.id
            )));
        }

        let settings =
            super::tenant_tax_settings(txn, request.tenant_id, self.default_tax).await?;
        let request_type = request.request_type_enum().ok_or_else(|| {
            ServiceError::Internal(format!("edit request {} has unknown type", request.id))
        })?;
        let now = Utc::now();

        match request_type {
            EditRequestType::PriceChange => {
                let new_price = request.new_unit_price.ok_or_else(|| {
                    ServiceError::Internal(format!(
                        "price change request {} carries no price",
                        request.id
                    ))
                })?;

                let amounts =
                    tax::price_line(line.quantity, new_price, line.discount_amount, &settings)?;
                let mut line_model: sale_line_item::ActiveModel = line.clone().into();
                line_model.unit_price = Set(new_price);
                line_model.tax_amount = Set(amounts.tax);
                line_model.line_total = Set(amounts.total);
                line_model.updated_at = Set(now);
                line_model.update(txn).await.map_err(ServiceError::db_error)?;
            }
            EditRequestType::LineDelete => {
                let mut line_model: sale_line_item::ActiveModel = line.clone().into();
                line_model.is_deleted = Set(true);
                line_model.updated_at = Set(now);
                line_model.update(txn).await.map_err(ServiceError::db_error)?;

                // The removed line's unsold units go back on the shelf; an
                // approved deletion means they never left as a sale.
                let remaining = line.quantity - line.returned_quantity;
                if remaining > 0 {
                    self.ledger
                        .apply(
                            txn,
                            AdjustStock {
                                tenant_id: request.tenant_id,
                                product_id: line.product_id,
                                branch_id: sale.branch_id,
                                batch: BatchSelector::Batch(line.batch_id),
                                delta: remaining,
                                movement: MovementType::Adjustment,
                                source_reference: request.id.to_string(),
                                source_type: "SALE_EDIT".to_string(),
                                performed_by: decision.decided_by,
                                notes: request.reason.clone(),
                            },
                        )
                        .await?;
                }
            }
        }

        self.recompute_sale_totals(txn, &sale, &settings).await?;

        let mut model: sale_edit_request::ActiveModel = request.clone().into();
        model.status = Set(EditRequestStatus::Approved.to_string());
        model.approved_by = Set(Some(decision.decided_by));
        model.decided_at = Set(Some(now));
        model.updated_at = Set(now);
        model.update(txn).await.map_err(ServiceError::db_error)
    }

    /// Re-derives subtotal, tax, discount and total from the live lines.
    async fn recompute_sale_totals<C: ConnectionTrait>(
        &self,
        txn: &C,
        sale: &sale::Model,
        settings: &TaxSettings,
    ) -> Result<(), ServiceError> {
        let lines = SaleLineItemEntity::find()
            .filter(sale_line_item::Column::SaleId.eq(sale.id))
            .filter(sale_line_item::Column::IsDeleted.eq(false))
            .all(txn)
            .await
            .map_err(ServiceError::db_error)?;

        let mut amounts = Vec::with_capacity(lines.len());
        for line in &lines {
            amounts.push(tax::price_line(
                line.quantity,
                line.unit_price,
                line.discount_amount,
                settings,
            )?);
        }
        let totals = tax::sale_totals(&amounts, settings);

        let mut model: sale::ActiveModel = sale.clone().into();
        model.subtotal = Set(totals.subtotal);
        model.tax_amount = Set(totals.tax_amount);
        model.discount_amount = Set(totals.discount_amount);
        model.total_amount = Set(totals.total_amount);
        model.updated_at = Set(Utc::now());
        model.version = Set(sale.version + 1);
        model.update(txn).await.map_err(ServiceError::db_error)?;

        Ok(())
    }

    pub async fn get_request(
        &self,
        request_id: Uuid,
    ) -> Result<sale_edit_request::Model, ServiceError> {
        EditRequestEntity::find_by_id(request_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("edit request {} not found", request_id))
            })
    }

    /// Pending requests for a tenant, oldest first (the approval queue).
    pub async fn list_pending(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<sale_edit_request::Model>, ServiceError> {
        EditRequestEntity::find()
            .filter(sale_edit_request::Column::TenantId.eq(tenant_id))
            .filter(sale_edit_request::Column::Status.eq(EditRequestStatus::Pending.to_string()))
            .order_by_asc(sale_edit_request::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }
}
