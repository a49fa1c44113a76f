use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::NullOrdering;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{
        credit_account,
        inventory_audit_log::MovementType,
        inventory_batch::{self, Entity as BatchEntity},
        product::{self, Entity as ProductEntity},
        sale::{self, Entity as SaleEntity, ReturnStatus, SaleStatus},
        sale_line_item::{self, Entity as SaleLineItemEntity},
        sale_payment::{self, Entity as SalePaymentEntity, PaymentMethod},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        commission::CommissionPolicy,
        credit::{CreditAccountService, OpenCreditAccount},
        inventory_ledger::{AdjustStock, BatchSelector, InventoryLedger},
        tax::{self, TaxSettings},
    },
};

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct SaleLineRequest {
    pub product_id: Uuid,
    pub batch_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct SalePaymentRequest {
    pub method: PaymentMethod,
    pub amount: Decimal,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSaleRequest {
    pub tenant_id: Uuid,
    pub branch_id: Uuid,
    pub cashier_id: Uuid,
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub walk_in_name: Option<String>,
    #[serde(default)]
    pub walk_in_phone: Option<String>,
    #[validate(length(min = 1, message = "sale requires at least one line item"))]
    pub line_items: Vec<SaleLineRequest>,
    #[serde(default)]
    pub payments: Vec<SalePaymentRequest>,
    #[serde(default)]
    pub is_credit_sale: bool,
    /// Required for credit sales
    #[serde(default)]
    pub expected_payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Fully hydrated view of a sale.
#[derive(Debug, Serialize)]
pub struct SaleDto {
    pub sale: sale::Model,
    pub line_items: Vec<sale_line_item::Model>,
    pub payments: Vec<sale_payment::Model>,
    pub credit_account: Option<credit_account::Model>,
}

#[derive(Debug, Clone, Default)]
pub struct SaleSearchQuery {
    pub tenant_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub status: Option<SaleStatus>,
    pub sale_number: Option<String>,
    pub page: u64,
    pub limit: u64,
}

/// A sellable batch offered to the cashier after a barcode scan.
#[derive(Debug, Serialize)]
pub struct BarcodeScanResult {
    pub product: product::Model,
    /// Soonest-expiring first, so the cashier sells oldest stock
    pub batches: Vec<inventory_batch::Model>,
}

/// Processes point-of-sale transactions.
///
/// `create_sale` is the hot path: validation, pricing, per-line stock
/// deduction through the ledger and persistence all happen in one
/// transaction, so a failure on any line leaves no partial deduction
/// behind.
#[derive(Clone)]
pub struct SaleService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    ledger: InventoryLedger,
    credit: CreditAccountService,
    default_tax: TaxSettings,
}

impl SaleService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        ledger: InventoryLedger,
        credit: CreditAccountService,
        default_tax: TaxSettings,
    ) -> Self {
        Self {
            db,
            event_sender,
            ledger,
            credit,
            default_tax,
        }
    }

    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id, branch_id = %request.branch_id))]
    pub async fn create_sale(&self, request: CreateSaleRequest) -> Result<SaleDto, ServiceError> {
        request.validate()?;
        self.validate_payments(&request)?;

        let settings = self.tax_settings_for(request.tenant_id).await?;

        // Price every line up front; any bad line rejects the sale before
        // stock is touched.
        let mut line_amounts = Vec::with_capacity(request.line_items.len());
        for line in &request.line_items {
            let amounts = tax::price_line(
                line.quantity,
                line.unit_price,
                line.discount_amount.unwrap_or(Decimal::ZERO),
                &settings,
            )?;
            line_amounts.push(amounts);
        }
        let totals = tax::sale_totals(&line_amounts, &settings);

        let paid: Decimal = request.payments.iter().map(|p| p.amount).sum();
        let paid = tax::round_money(paid);
        let shortfall = if request.is_credit_sale {
            if paid > totals.total_amount {
                return Err(ServiceError::Validation(format!(
                    "payments {} exceed sale total {}",
                    paid, totals.total_amount
                )));
            }
            totals.total_amount - paid
        } else {
            if paid != totals.total_amount {
                return Err(ServiceError::Validation(format!(
                    "payments {} do not match sale total {}",
                    paid, totals.total_amount
                )));
            }
            Decimal::ZERO
        };

        let sale_id = Uuid::new_v4();
        let sale_number = super::generate_document_number("SAL");
        let now = Utc::now();

        // An M-Pesa payment without a receipt is still in flight; the sale
        // stays PENDING until the gateway callback confirms it.
        let awaiting_mpesa = request.payments.iter().any(|p| {
            matches!(p.method, PaymentMethod::Mpesa) && p.reference.is_none()
        });
        let status = if awaiting_mpesa {
            SaleStatus::Pending
        } else {
            SaleStatus::Completed
        };

        let source_refs = line_source_references(&sale_number, &request.line_items);

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let result = self
            .create_sale_in_txn(
                &txn,
                &request,
                &line_amounts,
                &totals,
                sale_id,
                &sale_number,
                status,
                shortfall,
                &source_refs,
                now,
            )
            .await;

        match result {
            Ok(dto) => {
                txn.commit().await.map_err(ServiceError::db_error)?;

                let _ = self
                    .event_sender
                    .send(Event::SaleCompleted {
                        sale_id,
                        sale_number: sale_number.clone(),
                        total_amount: totals.total_amount,
                        is_credit_sale: request.is_credit_sale,
                    })
                    .await;
                if let Some(account) = &dto.credit_account {
                    let _ = self
                        .event_sender
                        .send(Event::CreditAccountOpened {
                            credit_account_id: account.id,
                            sale_id,
                            remaining_amount: account.remaining_amount,
                        })
                        .await;
                }

                info!(%sale_id, sale_number, total = %totals.total_amount, "sale persisted");
                Ok(dto)
            }
            Err(e) => {
                txn.rollback().await.ok();
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_sale_in_txn<C: ConnectionTrait>(
        &self,
        txn: &C,
        request: &CreateSaleRequest,
        line_amounts: &[tax::LineAmounts],
        totals: &tax::SaleTotals,
        sale_id: Uuid,
        sale_number: &str,
        status: SaleStatus,
        shortfall: Decimal,
        source_refs: &[String],
        now: chrono::DateTime<Utc>,
    ) -> Result<SaleDto, ServiceError> {
        // Deduct stock line by line. The first insufficient batch aborts
        // the whole transaction, so there is never a partial deduction.
        for (idx, line) in request.line_items.iter().enumerate() {
            self.ledger
                .apply(
                    txn,
                    AdjustStock {
                        tenant_id: request.tenant_id,
                        product_id: line.product_id,
                        branch_id: request.branch_id,
                        batch: BatchSelector::Batch(line.batch_id),
                        delta: -line.quantity,
                        movement: MovementType::Sale,
                        source_reference: source_refs[idx].clone(),
                        source_type: "SALE".to_string(),
                        performed_by: request.cashier_id,
                        notes: None,
                    },
                )
                .await?;
        }

        let sale_model = sale::ActiveModel {
            id: Set(sale_id),
            tenant_id: Set(request.tenant_id),
            sale_number: Set(sale_number.to_string()),
            branch_id: Set(request.branch_id),
            cashier_id: Set(request.cashier_id),
            customer_id: Set(request.customer_id),
            walk_in_name: Set(request.walk_in_name.clone()),
            walk_in_phone: Set(request.walk_in_phone.clone()),
            subtotal: Set(totals.subtotal),
            tax_amount: Set(totals.tax_amount),
            discount_amount: Set(totals.discount_amount),
            total_amount: Set(totals.total_amount),
            status: Set(status.to_string()),
            return_status: Set(ReturnStatus::None.to_string()),
            is_credit_sale: Set(request.is_credit_sale),
            notes: Set(request.notes.clone()),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let sale = sale_model.insert(txn).await.map_err(ServiceError::db_error)?;

        let mut line_items = Vec::with_capacity(request.line_items.len());
        for (line, amounts) in request.line_items.iter().zip(line_amounts) {
            let model = sale_line_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(request.tenant_id),
                sale_id: Set(sale_id),
                product_id: Set(line.product_id),
                batch_id: Set(line.batch_id),
                quantity: Set(line.quantity),
                returned_quantity: Set(0),
                unit_price: Set(line.unit_price),
                discount_amount: Set(amounts.discount),
                tax_amount: Set(amounts.tax),
                line_total: Set(amounts.total),
                is_deleted: Set(false),
                created_at: Set(now),
                updated_at: Set(now),
            };
            line_items.push(model.insert(txn).await.map_err(ServiceError::db_error)?);
        }

        let mut payments = Vec::with_capacity(request.payments.len());
        for payment in &request.payments {
            let model = sale_payment::ActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(request.tenant_id),
                sale_id: Set(sale_id),
                method: Set(payment.method.to_string()),
                amount: Set(payment.amount),
                reference: Set(payment.reference.clone()),
                created_at: Set(now),
            };
            payments.push(model.insert(txn).await.map_err(ServiceError::db_error)?);
        }

        let credit_account = if request.is_credit_sale && shortfall > Decimal::ZERO {
            let customer_id = request.customer_id.ok_or_else(|| {
                ServiceError::Validation("credit sale requires an account customer".into())
            })?;
            let expected_payment_date = request.expected_payment_date.ok_or_else(|| {
                ServiceError::Validation("credit sale requires an expected payment date".into())
            })?;
            let account = self
                .credit
                .open_in_txn(
                    txn,
                    OpenCreditAccount {
                        tenant_id: request.tenant_id,
                        sale_id,
                        customer_id,
                        total_amount: totals.total_amount,
                        paid_amount: totals.total_amount - shortfall,
                        expected_payment_date,
                    },
                )
                .await?;
            Some(account)
        } else {
            None
        };

        Ok(SaleDto {
            sale,
            line_items,
            payments,
            credit_account,
        })
    }

    /// Loads a sale with its lines, payments and credit account.
    #[instrument(skip(self))]
    pub async fn get_sale(&self, sale_id: Uuid) -> Result<SaleDto, ServiceError> {
        let sale = SaleEntity::find_by_id(sale_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("sale {} not found", sale_id)))?;

        self.hydrate(sale).await
    }

    pub async fn get_sale_by_number(
        &self,
        tenant_id: Uuid,
        sale_number: &str,
    ) -> Result<SaleDto, ServiceError> {
        let sale = SaleEntity::find()
            .filter(sale::Column::TenantId.eq(tenant_id))
            .filter(sale::Column::SaleNumber.eq(sale_number))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("sale {} not found", sale_number)))?;

        self.hydrate(sale).await
    }

    async fn hydrate(&self, sale: sale::Model) -> Result<SaleDto, ServiceError> {
        let line_items = SaleLineItemEntity::find()
            .filter(sale_line_item::Column::SaleId.eq(sale.id))
            .order_by_asc(sale_line_item::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let payments = SalePaymentEntity::find()
            .filter(sale_payment::Column::SaleId.eq(sale.id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let credit_account = credit_account::Entity::find()
            .filter(credit_account::Column::SaleId.eq(sale.id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(SaleDto {
            sale,
            line_items,
            payments,
            credit_account,
        })
    }

    /// Paginated search over sales, newest first.
    #[instrument(skip(self, query))]
    pub async fn search_sales(
        &self,
        query: SaleSearchQuery,
    ) -> Result<(Vec<sale::Model>, u64), ServiceError> {
        let mut finder = SaleEntity::find();
        if let Some(tenant_id) = query.tenant_id {
            finder = finder.filter(sale::Column::TenantId.eq(tenant_id));
        }
        if let Some(branch_id) = query.branch_id {
            finder = finder.filter(sale::Column::BranchId.eq(branch_id));
        }
        if let Some(status) = query.status {
            finder = finder.filter(sale::Column::Status.eq(status.to_string()));
        }
        if let Some(ref sale_number) = query.sale_number {
            finder = finder.filter(sale::Column::SaleNumber.eq(sale_number.clone()));
        }

        let limit = query.limit.clamp(1, 100);
        let page = query.page.max(1);
        let paginator = finder
            .order_by_desc(sale::Column::CreatedAt)
            .paginate(&*self.db, limit);

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let sales = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((sales, total))
    }

    /// Puts a sale on hold. Stock stays deducted; the sale can later be
    /// cancelled (which reverses stock) or left suspended.
    #[instrument(skip(self))]
    pub async fn suspend_sale(&self, sale_id: Uuid) -> Result<sale::Model, ServiceError> {
        let sale = self.load_sale(sale_id).await?;
        let status = current_status(&sale)?;
        if !matches!(status, SaleStatus::Pending | SaleStatus::Completed) {
            return Err(ServiceError::InvalidState(format!(
                "cannot suspend a sale in status {}",
                sale.status
            )));
        }

        let mut model: sale::ActiveModel = sale.into();
        model.status = Set(SaleStatus::Suspended.to_string());
        model.updated_at = Set(Utc::now());
        model.version = Set(model.version.unwrap() + 1);
        let updated = model.update(&*self.db).await.map_err(ServiceError::db_error)?;

        let _ = self.event_sender.send(Event::SaleSuspended(sale_id)).await;
        Ok(updated)
    }

    /// Cancels a sale. Stock already deducted walks back in through the
    /// ledger as compensating RETURN adjustments; cancellation is never a
    /// silent status flip once goods have moved.
    #[instrument(skip(self))]
    pub async fn cancel_sale(
        &self,
        sale_id: Uuid,
        performed_by: Uuid,
    ) -> Result<sale::Model, ServiceError> {
        let sale = self.load_sale(sale_id).await?;
        let status = current_status(&sale)?;
        if !matches!(status, SaleStatus::Pending | SaleStatus::Completed) {
            return Err(ServiceError::InvalidState(format!(
                "cannot cancel a sale in status {}",
                sale.status
            )));
        }

        let lines = SaleLineItemEntity::find()
            .filter(sale_line_item::Column::SaleId.eq(sale_id))
            .filter(sale_line_item::Column::IsDeleted.eq(false))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let result: Result<sale::Model, ServiceError> = async {
            let mut stock_reversed = false;
            for (idx, line) in lines.iter().enumerate() {
                let remaining = line.quantity - line.returned_quantity;
                if remaining <= 0 {
                    continue;
                }
                self.ledger
                    .apply(
                        &txn,
                        AdjustStock {
                            tenant_id: sale.tenant_id,
                            product_id: line.product_id,
                            branch_id: sale.branch_id,
                            batch: BatchSelector::Batch(line.batch_id),
                            delta: remaining,
                            movement: MovementType::Return,
                            source_reference: format!("{}#C{}", sale.sale_number, idx + 1),
                            source_type: "SALE_CANCEL".to_string(),
                            performed_by,
                            notes: None,
                        },
                    )
                    .await?;
                stock_reversed = true;
            }

            let mut model: sale::ActiveModel = sale.clone().into();
            model.status = Set(SaleStatus::Cancelled.to_string());
            model.updated_at = Set(Utc::now());
            model.version = Set(sale.version + 1);
            let updated = model.update(&txn).await.map_err(ServiceError::db_error)?;

            if stock_reversed {
                info!(%sale_id, "cancelled sale, stock restored");
            }
            Ok(updated)
        }
        .await;

        match result {
            Ok(updated) => {
                txn.commit().await.map_err(ServiceError::db_error)?;
                let _ = self
                    .event_sender
                    .send(Event::SaleCancelled {
                        sale_id,
                        stock_reversed: true,
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

    /// Looks a product up by barcode and lists its sellable batches at the
    /// branch, soonest expiry first.
    #[instrument(skip(self))]
    pub async fn scan_barcode(
        &self,
        tenant_id: Uuid,
        barcode: &str,
        branch_id: Uuid,
    ) -> Result<BarcodeScanResult, ServiceError> {
        let product = ProductEntity::find()
            .filter(product::Column::TenantId.eq(tenant_id))
            .filter(product::Column::Barcode.eq(barcode))
            .filter(product::Column::IsActive.eq(true))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("no product with barcode {}", barcode))
            })?;

        let today = Utc::now().date_naive();
        let batches = BatchEntity::find()
            .filter(inventory_batch::Column::TenantId.eq(tenant_id))
            .filter(inventory_batch::Column::ProductId.eq(product.id))
            .filter(inventory_batch::Column::BranchId.eq(branch_id))
            .filter(inventory_batch::Column::IsActive.eq(true))
            .filter(inventory_batch::Column::Quantity.gt(0))
            .order_by_with_nulls(
                inventory_batch::Column::ExpiryDate,
                Order::Asc,
                NullOrdering::Last,
            )
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .filter(|batch| batch.expiry_date.map_or(true, |expiry| expiry >= today))
            .collect();

        Ok(BarcodeScanResult { product, batches })
    }

    /// Cashier commission for one sale under the given policy. Profit is
    /// the margin over batch cost for units that stayed sold.
    pub async fn commission_for_sale(
        &self,
        sale_id: Uuid,
        policy: &dyn CommissionPolicy,
    ) -> Result<Decimal, ServiceError> {
        let lines = SaleLineItemEntity::find()
            .filter(sale_line_item::Column::SaleId.eq(sale_id))
            .filter(sale_line_item::Column::IsDeleted.eq(false))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut profit = Decimal::ZERO;
        for line in &lines {
            let batch = BatchEntity::find_by_id(line.batch_id)
                .one(&*self.db)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("batch {} not found", line.batch_id))
                })?;
            let net_quantity = Decimal::from(line.quantity - line.returned_quantity);
            profit += net_quantity * (line.unit_price - batch.unit_cost);
        }

        Ok(tax::round_money(policy.commission(profit)))
    }

    async fn tax_settings_for(&self, tenant_id: Uuid) -> Result<TaxSettings, ServiceError> {
        super::tenant_tax_settings(&*self.db, tenant_id, self.default_tax).await
    }

    fn validate_payments(&self, request: &CreateSaleRequest) -> Result<(), ServiceError> {
        if !request.is_credit_sale && request.payments.is_empty() {
            return Err(ServiceError::Validation(
                "a cash sale requires at least one payment".into(),
            ));
        }
        for payment in &request.payments {
            if payment.amount <= Decimal::ZERO {
                return Err(ServiceError::Validation(
                    "payment amounts must be greater than zero".into(),
                ));
            }
        }
        if request.is_credit_sale {
            if request.customer_id.is_none() {
                return Err(ServiceError::Validation(
                    "credit sale requires an account customer".into(),
                ));
            }
            if request.expected_payment_date.is_none() {
                return Err(ServiceError::Validation(
                    "credit sale requires an expected payment date".into(),
                ));
            }
        }
        Ok(())
    }

    async fn load_sale(&self, sale_id: Uuid) -> Result<sale::Model, ServiceError> {
        SaleEntity::find_by_id(sale_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("sale {} not found", sale_id)))
    }
}

fn current_status(sale: &sale::Model) -> Result<SaleStatus, ServiceError> {
    sale.status_enum().ok_or_else(|| {
        warn!(sale_id = %sale.id, status = %sale.status, "sale has unknown status");
        ServiceError::Internal(format!("sale {} has unknown status", sale.id))
    })
}

/// Audit source references for the deduction of each line. The reference
/// is the sale number; when the same product appears on several lines
/// (two batches of one drug, say) later lines get an ordinal suffix so
/// each deduction keeps its own idempotency key.
fn line_source_references(sale_number: &str, lines: &[SaleLineRequest]) -> Vec<String> {
    let mut product_counts: HashMap<Uuid, usize> = HashMap::new();
    for line in lines {
        *product_counts.entry(line.product_id).or_insert(0) += 1;
    }

    let mut seen: HashMap<Uuid, usize> = HashMap::new();
    lines
        .iter()
        .map(|line| {
            let occurrence = seen.entry(line.product_id).or_insert(0);
            *occurrence += 1;
            if product_counts[&line.product_id] > 1 && *occurrence > 1 {
                format!("{}#L{}", sale_number, occurrence)
            } else {
                sale_number.to_string()
            }
        })
        .collect()
}
