use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{
        inventory_audit_log::MovementType,
        sale::{self, Entity as SaleEntity, ReturnStatus, SaleStatus},
        sale_line_item::{self, Entity as SaleLineItemEntity},
        sale_return::{self, Entity as SaleReturnEntity, SaleReturnStatus},
        sale_return_line_item,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        inventory_ledger::{AdjustStock, BatchSelector, InventoryLedger},
        tax,
    },
};

#[derive(Debug, Deserialize, Serialize)]
pub struct ReturnLineRequest {
    pub sale_line_item_id: Uuid,
    pub quantity_returned: i32,
    /// False for damaged goods: refund without resurrecting stock
    #[serde(default = "default_restore")]
    pub restore_to_inventory: bool,
}

fn default_restore() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReturnRequest {
    pub original_sale_id: Uuid,
    #[validate(length(min = 1, message = "return reason is required"))]
    pub return_reason: String,
    pub processed_by: Uuid,
    #[validate(length(min = 1, message = "return requires at least one line"))]
    pub lines: Vec<ReturnLineRequest>,
}

#[derive(Debug, Serialize)]
pub struct ReturnDto {
    pub sale_return: sale_return::Model,
    pub line_items: Vec<sale_return_line_item::Model>,
    /// Parent sale return status after this return
    pub sale_return_status: ReturnStatus,
}

/// Reverses part or all of a completed sale.
///
/// The returnable quantity on each line is a running watermark
/// (`quantity - returned_quantity`), not a one-shot check: several partial
/// returns may arrive over time, and the one that would push the
/// cumulative count past the original quantity is the one that fails.
#[derive(Clone)]
pub struct ReturnService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    ledger: InventoryLedger,
}

impl ReturnService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, ledger: InventoryLedger) -> Self {
        Self {
            db,
            event_sender,
            ledger,
        }
    }

    #[instrument(skip(self, request), fields(sale_id = %request.original_sale_id))]
    pub async fn create_return(
        &self,
        tenant_id: Uuid,
        request: CreateReturnRequest,
    ) -> Result<ReturnDto, ServiceError> {
        request.validate()?;
        for line in &request.lines {
            if line.quantity_returned < 1 {
                return Err(ServiceError::Validation(
                    "returned quantity must be at least 1".into(),
                ));
            }
        }

        let return_id = Uuid::new_v4();
        let return_number = super::generate_document_number("RTN");

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let result = self
            .create_return_in_txn(&txn, tenant_id, &request, return_id, &return_number)
            .await;

        match result {
            Ok(dto) => {
                txn.commit().await.map_err(ServiceError::db_error)?;
                let _ = self
                    .event_sender
                    .send(Event::ReturnProcessed {
                        return_id,
                        sale_id: request.original_sale_id,
                        refund_amount: dto.sale_return.total_refund_amount,
                    })
                    .await;
                info!(
                    %return_id,
                    return_number,
                    refund = %dto.sale_return.total_refund_amount,
                    "return processed"
                );
                Ok(dto)
            }
            Err(e) => {
                txn.rollback().await.ok();
                Err(e)
            }
        }
    }

    async fn create_return_in_txn<C: ConnectionTrait>(
        &self,
        txn: &C,
        tenant_id: Uuid,
        request: &CreateReturnRequest,
        return_id: Uuid,
        return_number: &str,
    ) -> Result<ReturnDto, ServiceError> {
        let sale = SaleEntity::find_by_id(request.original_sale_id)
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("sale {} not found", request.original_sale_id))
            })?;

        if sale.tenant_id != tenant_id {
            return Err(ServiceError::NotFound(format!(
                "sale {} not found",
                request.original_sale_id
            )));
        }
        if sale.status_enum() != Some(SaleStatus::Completed) {
            return Err(ServiceError::InvalidState(format!(
                "sale {} is {} and cannot accept returns",
                sale.sale_number, sale.status
            )));
        }

        let now = Utc::now();
        let mut total_refund = Decimal::ZERO;
        let mut return_lines = Vec::with_capacity(request.lines.len());
        let mut restore_occurrences: HashMap<Uuid, usize> = HashMap::new();

        for line_req in &request.lines {
            // Reloaded inside the transaction each time so duplicate line
            // references within one request still hit the watermark.
            let line = SaleLineItemEntity::find_by_id(line_req.sale_line_item_id)
                .one(txn)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "sale line {} not found",
                        line_req.sale_line_item_id
                    ))
                })?;

            if line.sale_id != sale.id {
                return Err(ServiceError::Validation(format!(
                    "line {} does not belong to sale {}",
                    line.id, sale.sale_number
                )));
            }
            if line.is_deleted {
                return Err(ServiceError::Validation(format!(
                    "line {} was removed from the sale and cannot be returned",
                    line.id
                )));
            }

            let returnable = line.returnable_quantity();
            if line_req.quantity_returned > returnable {
                return Err(ServiceError::Validation(format!(
                    "cannot return {} units of line {}: only {} returnable",
                    line_req.quantity_returned, line.id, returnable
                )));
            }

            let refund = tax::round_money(
                line.unit_price * Decimal::from(line_req.quantity_returned),
            );
            total_refund += refund;

            if line_req.restore_to_inventory {
                let occurrence = restore_occurrences.entry(line.product_id).or_insert(0);
                *occurrence += 1;
                let source_reference = if *occurrence > 1 {
                    format!("{}#L{}", return_number, occurrence)
                } else {
                    return_number.to_string()
                };

                self.ledger
                    .apply(
                        txn,
                        AdjustStock {
                            tenant_id,
                            product_id: line.product_id,
                            branch_id: sale.branch_id,
                            batch: BatchSelector::Batch(line.batch_id),
                            delta: line_req.quantity_returned,
                            movement: MovementType::Return,
                            source_reference,
                            source_type: "RETURN".to_string(),
                            performed_by: request.processed_by,
                            notes: Some(request.return_reason.clone()),
                        },
                    )
                    .await?;
            }

            let new_returned = line.returned_quantity + line_req.quantity_returned;
            let mut line_model: sale_line_item::ActiveModel = line.clone().into();
            line_model.returned_quantity = Set(new_returned);
            line_model.updated_at = Set(now);
            line_model.update(txn).await.map_err(ServiceError::db_error)?;

            let return_line = sale_return_line_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(tenant_id),
                sale_return_id: Set(return_id),
                sale_line_item_id: Set(line.id),
                product_id: Set(line.product_id),
                quantity_returned: Set(line_req.quantity_returned),
                refund_amount: Set(refund),
                restore_to_inventory: Set(line_req.restore_to_inventory),
                created_at: Set(now),
            };
            return_lines.push(
                return_line
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)?,
            );
        }

        let return_model = sale_return::ActiveModel {
            id: Set(return_id),
            tenant_id: Set(tenant_id),
            return_number: Set(return_number.to_string()),
            original_sale_id: Set(sale.id),
            branch_id: Set(sale.branch_id),
            return_reason: Set(request.return_reason.clone()),
            total_refund_amount: Set(total_refund),
            status: Set(SaleReturnStatus::Processed.to_string()),
            processed_by: Set(request.processed_by),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let sale_return = return_model
            .insert(txn)
            .await
            .map_err(ServiceError::db_error)?;

        let new_status = self.recompute_return_status(txn, &sale).await?;

        Ok(ReturnDto {
            sale_return,
            line_items: return_lines,
            sale_return_status: new_status,
        })
    }

    /// Re-derives the parent sale's return status from its live lines.
    async fn recompute_return_status<C: ConnectionTrait>(
        &self,
        txn: &C,
        sale: &sale::Model,
    ) -> Result<ReturnStatus, ServiceError> {
        let lines = SaleLineItemEntity::find()
            .filter(sale_line_item::Column::SaleId.eq(sale.id))
            .filter(sale_line_item::Column::IsDeleted.eq(false))
            .all(txn)
            .await
            .map_err(ServiceError::db_error)?;

        let any_returned = lines.iter().any(|l| l.returned_quantity > 0);
        let all_returned = !lines.is_empty()
            && lines.iter().all(|l| l.returned_quantity == l.quantity);

        let status = if all_returned {
            ReturnStatus::Full
        } else if any_returned {
            ReturnStatus::Partial
        } else {
            ReturnStatus::None
        };

        let mut model: sale::ActiveModel = sale.clone().into();
        model.return_status = Set(status.to_string());
        model.updated_at = Set(Utc::now());
        model.version = Set(sale.version + 1);
        model.update(txn).await.map_err(ServiceError::db_error)?;

        Ok(status)
    }

    /// Loads a return with its lines.
    pub async fn get_return(
        &self,
        return_id: Uuid,
    ) -> Result<(sale_return::Model, Vec<sale_return_line_item::Model>), ServiceError> {
        let sale_return = SaleReturnEntity::find_by_id(return_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("return {} not found", return_id)))?;

        let lines = sale_return_line_item::Entity::find()
            .filter(sale_return_line_item::Column::SaleReturnId.eq(return_id))
            .order_by_asc(sale_return_line_item::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((sale_return, lines))
    }

    /// Lists returns against one sale, newest first.
    pub async fn list_returns_for_sale(
        &self,
        sale_id: Uuid,
    ) -> Result<Vec<sale_return::Model>, ServiceError> {
        SaleReturnEntity::find()
            .filter(sale_return::Column::OriginalSaleId.eq(sale_id))
            .order_by_desc(sale_return::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }
}
