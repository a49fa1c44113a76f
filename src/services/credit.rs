use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::credit_account::{self, CreditStatus, Entity as CreditAccountEntity},
    entities::credit_payment::{self, Entity as CreditPaymentEntity},
    entities::sale_payment::PaymentMethod,
    errors::ServiceError,
    events::{Event, EventSender},
    services::tax,
};

/// Input for opening a credit account against a sale.
#[derive(Debug, Clone)]
pub struct OpenCreditAccount {
    pub tenant_id: Uuid,
    pub sale_id: Uuid,
    pub customer_id: Uuid,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub expected_payment_date: NaiveDate,
}

/// Input for one installment against an account.
#[derive(Debug, Clone)]
pub struct CreditPaymentRequest {
    pub credit_account_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub received_by: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct CreditSearchQuery {
    pub tenant_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub status: Option<CreditStatus>,
    pub page: u64,
    pub limit: u64,
}

/// Tracks amounts owed on credit sales.
///
/// The balance identity `paid + remaining == total` is maintained on every
/// mutation; overpayments are rejected outright rather than clamped so the
/// operator reconciles the discrepancy instead of the system hiding it.
#[derive(Clone)]
pub struct CreditAccountService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CreditAccountService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Opens an account inside the caller's transaction (the sale
    /// processor's unit of work).
    pub async fn open_in_txn<C: ConnectionTrait>(
        &self,
        conn: &C,
        req: OpenCreditAccount,
    ) -> Result<credit_account::Model, ServiceError> {
        if req.total_amount <= Decimal::ZERO {
            return Err(ServiceError::Validation(
                "credit total must be greater than zero".into(),
            ));
        }
        if req.paid_amount < Decimal::ZERO {
            return Err(ServiceError::Validation(
                "paid amount cannot be negative".into(),
            ));
        }
        if req.paid_amount > req.total_amount {
            return Err(ServiceError::Validation(format!(
                "paid amount {} exceeds credit total {}",
                req.paid_amount, req.total_amount
            )));
        }

        let now = Utc::now();
        let model = credit_account::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(req.tenant_id),
            credit_number: Set(super::generate_document_number("CRD")),
            sale_id: Set(req.sale_id),
            customer_id: Set(req.customer_id),
            total_amount: Set(req.total_amount),
            paid_amount: Set(req.paid_amount),
            remaining_amount: Set(req.total_amount - req.paid_amount),
            expected_payment_date: Set(req.expected_payment_date),
            status: Set(CreditStatus::Active.to_string()),
            closed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        model.insert(conn).await.map_err(ServiceError::db_error)
    }

    /// Opens a stand-alone account in its own transaction.
    #[instrument(skip(self, req), fields(sale_id = %req.sale_id))]
    pub async fn open_account(
        &self,
        req: OpenCreditAccount,
    ) -> Result<credit_account::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let account = self.open_in_txn(&txn, req).await;
        match account {
            Ok(account) => {
                txn.commit().await.map_err(ServiceError::db_error)?;
                let _ = self
                    .event_sender
                    .send(Event::CreditAccountOpened {
                        credit_account_id: account.id,
                        sale_id: account.sale_id,
                        remaining_amount: account.remaining_amount,
                    })
                    .await;
                Ok(account)
            }
            Err(e) => {
                txn.rollback().await.ok();
                Err(e)
            }
        }
    }

    /// Applies one installment. Overpayment is a validation failure and
    /// leaves the account untouched; hitting zero remaining flips the
    /// account to PAID and stamps `closed_at`.
    #[instrument(skip(self, req), fields(credit_account_id = %req.credit_account_id, amount = %req.amount))]
    pub async fn make_payment(
        &self,
        req: CreditPaymentRequest,
    ) -> Result<credit_account::Model, ServiceError> {
        if req.amount <= Decimal::ZERO {
            return Err(ServiceError::Validation(
                "payment amount must be greater than zero".into(),
            ));
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let result: Result<credit_account::Model, ServiceError> = async {
            let account = CreditAccountEntity::find_by_id(req.credit_account_id)
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "credit account {} not found",
                        req.credit_account_id
                    ))
                })?;

            let status = account.status_enum().ok_or_else(|| {
                ServiceError::Internal(format!(
                    "credit account {} has unknown status",
                    account.id
                ))
            })?;
            if !status.accepts_payments() {
                return Err(ServiceError::InvalidState(format!(
                    "credit account {} is {} and does not accept payments",
                    account.credit_number, account.status
                )));
            }

            let amount = tax::round_money(req.amount);
            if amount > account.remaining_amount {
                return Err(ServiceError::Validation(format!(
                    "payment {} exceeds remaining balance {}",
                    amount, account.remaining_amount
                )));
            }

            let now = Utc::now();
            let payment = credit_payment::ActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(account.tenant_id),
                credit_account_id: Set(account.id),
                amount: Set(amount),
                method: Set(req.method.to_string()),
                reference: Set(req.reference.clone()),
                received_by: Set(req.received_by),
                payment_date: Set(now),
                created_at: Set(now),
            };
            payment.insert(&txn).await.map_err(ServiceError::db_error)?;

            let new_paid = account.paid_amount + amount;
            let new_remaining = account.remaining_amount - amount;
            let paid_off = new_remaining.is_zero();

            let mut model: credit_account::ActiveModel = account.into();
            model.paid_amount = Set(new_paid);
            model.remaining_amount = Set(new_remaining);
            model.updated_at = Set(now);
            if paid_off {
                model.status = Set(CreditStatus::Paid.to_string());
                model.closed_at = Set(Some(now));
            }

            model.update(&txn).await.map_err(ServiceError::db_error)
        }
        .await;

        match result {
            Ok(account) => {
                txn.commit().await.map_err(ServiceError::db_error)?;
                let _ = self
                    .event_sender
                    .send(Event::CreditPaymentReceived {
                        credit_account_id: account.id,
                        amount: req.amount,
                        remaining_amount: account.remaining_amount,
                    })
                    .await;
                if account.remaining_amount.is_zero() {
                    info!(credit_account_id = %account.id, "credit account paid off");
                    let _ = self
                        .event_sender
                        .send(Event::CreditAccountPaidOff(account.id))
                        .await;
                }
                Ok(account)
            }
            Err(e) => {
                txn.rollback().await.ok();
                Err(e)
            }
        }
    }

    /// Periodic sweep: every ACTIVE account past its expected payment date
    /// becomes OVERDUE. Idempotent; rows already OVERDUE/PAID/CLOSED are
    /// untouched.
    #[instrument(skip(self))]
    pub async fn update_overdue_accounts(&self) -> Result<u64, ServiceError> {
        let today = Utc::now().date_naive();

        let result = CreditAccountEntity::update_many()
            .col_expr(
                credit_account::Column::Status,
                Expr::value(CreditStatus::Overdue.to_string()),
            )
            .col_expr(credit_account::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(credit_account::Column::Status.eq(CreditStatus::Active.to_string()))
            .filter(credit_account::Column::ExpectedPaymentDate.lt(today))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected > 0 {
            info!(count = result.rows_affected, "accounts marked overdue");
            let _ = self
                .event_sender
                .send(Event::CreditAccountsMarkedOverdue(result.rows_affected))
                .await;
        }

        Ok(result.rows_affected)
    }

    /// Administrative transition to CLOSED or SUSPENDED.
    #[instrument(skip(self))]
    pub async fn set_administrative_status(
        &self,
        credit_account_id: Uuid,
        status: CreditStatus,
    ) -> Result<credit_account::Model, ServiceError> {
        if !matches!(status, CreditStatus::Closed | CreditStatus::Suspended) {
            return Err(ServiceError::Validation(
                "administrative status must be CLOSED or SUSPENDED".into(),
            ));
        }

        let account = CreditAccountEntity::find_by_id(credit_account_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("credit account {} not found", credit_account_id))
            })?;

        let current = account.status_enum().ok_or_else(|| {
            ServiceError::Internal(format!("credit account {} has unknown status", account.id))
        })?;
        if matches!(current, CreditStatus::Paid | CreditStatus::Closed) {
            return Err(ServiceError::InvalidState(format!(
                "credit account {} is already {}",
                account.credit_number, account.status
            )));
        }

        let now = Utc::now();
        let mut model: credit_account::ActiveModel = account.into();
        model.status = Set(status.to_string());
        model.updated_at = Set(now);
        if matches!(status, CreditStatus::Closed) {
            model.closed_at = Set(Some(now));
        }

        model.update(&*self.db).await.map_err(ServiceError::db_error)
    }

    /// Loads an account with its payment history.
    pub async fn get_account(
        &self,
        credit_account_id: Uuid,
    ) -> Result<(credit_account::Model, Vec<credit_payment::Model>), ServiceError> {
        let account = CreditAccountEntity::find_by_id(credit_account_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("credit account {} not found", credit_account_id))
            })?;

        let payments = CreditPaymentEntity::find()
            .filter(credit_payment::Column::CreditAccountId.eq(credit_account_id))
            .order_by_asc(credit_payment::Column::PaymentDate)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((account, payments))
    }

    /// Paginated account listing.
    #[instrument(skip(self, query))]
    pub async fn search_accounts(
        &self,
        query: CreditSearchQuery,
    ) -> Result<(Vec<credit_account::Model>, u64), ServiceError> {
        let mut finder = CreditAccountEntity::find();
        if let Some(tenant_id) = query.tenant_id {
            finder = finder.filter(credit_account::Column::TenantId.eq(tenant_id));
        }
        if let Some(customer_id) = query.customer_id {
            finder = finder.filter(credit_account::Column::CustomerId.eq(customer_id));
        }
        if let Some(status) = query.status {
            finder = finder.filter(credit_account::Column::Status.eq(status.to_string()));
        }

        let limit = query.limit.clamp(1, 100);
        let page = query.page.max(1);
        let paginator = finder
            .order_by_desc(credit_account::Column::CreatedAt)
            .paginate(&*self.db, limit);

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let accounts = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((accounts, total))
    }
}
