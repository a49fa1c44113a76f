use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{error, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::inventory_audit_log::{self, Entity as AuditEntity, MovementType},
    errors::ServiceError,
};

/// Idempotency key for an inventory mutation. At most one non-duplicate
/// audit row may exist per key.
#[derive(Debug, Clone)]
pub struct AuditKey {
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub source_reference: String,
    pub source_type: String,
}

/// Input for one audit entry.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub movement: MovementType,
    pub quantity_changed: i32,
    pub quantity_before: i32,
    pub quantity_after: i32,
    pub source_reference: String,
    pub source_type: String,
    pub performed_by: Uuid,
    pub notes: Option<String>,
}

/// Filters for reconciliation queries over the audit log.
#[derive(Debug, Clone, Default)]
pub struct AuditLogQuery {
    pub tenant_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub transaction_type: Option<MovementType>,
    pub source_reference: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: u64,
    pub limit: u64,
}

/// Append-only writer for the inventory audit trail.
///
/// There is deliberately no update or delete anywhere on this type: once a
/// row is in, it stays. Consistency breaches are rejected before insert,
/// never corrected after the fact.
#[derive(Clone)]
pub struct AuditLogWriter {
    db: Arc<DbPool>,
}

impl AuditLogWriter {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Appends one entry inside the caller's unit of work after checking
    /// the quantity invariant. A violated invariant is a fault, not an
    /// input error: it is logged loudly and the operation aborts.
    pub async fn record<C: ConnectionTrait>(
        &self,
        conn: &C,
        entry: NewAuditEntry,
    ) -> Result<inventory_audit_log::Model, ServiceError> {
        Self::validate(&entry)?;

        let now = Utc::now();
        let model = inventory_audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(entry.tenant_id),
            product_id: Set(entry.product_id),
            branch_id: Set(entry.branch_id),
            batch_id: Set(entry.batch_id),
            transaction_type: Set(entry.movement.as_str().to_string()),
            quantity_changed: Set(entry.quantity_changed),
            quantity_before: Set(entry.quantity_before),
            quantity_after: Set(entry.quantity_after),
            source_reference: Set(entry.source_reference),
            source_type: Set(entry.source_type),
            is_duplicate: Set(false),
            duplicate_reference: Set(None),
            performed_by: Set(entry.performed_by),
            performed_at: Set(now),
            notes: Set(entry.notes),
            created_at: Set(now),
        };

        model.insert(conn).await.map_err(ServiceError::db_error)
    }

    /// Appends a duplicate marker for a suppressed retry, mirroring the
    /// quantities of the original entry it references.
    pub async fn record_duplicate<C: ConnectionTrait>(
        &self,
        conn: &C,
        original: &inventory_audit_log::Model,
        performed_by: Uuid,
    ) -> Result<inventory_audit_log::Model, ServiceError> {
        let now = Utc::now();
        let model = inventory_audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(original.tenant_id),
            product_id: Set(original.product_id),
            branch_id: Set(original.branch_id),
            batch_id: Set(original.batch_id),
            transaction_type: Set(original.transaction_type.clone()),
            quantity_changed: Set(original.quantity_changed),
            quantity_before: Set(original.quantity_before),
            quantity_after: Set(original.quantity_after),
            source_reference: Set(original.source_reference.clone()),
            source_type: Set(original.source_type.clone()),
            is_duplicate: Set(true),
            duplicate_reference: Set(Some(original.id)),
            performed_by: Set(performed_by),
            performed_at: Set(now),
            notes: Set(None),
            created_at: Set(now),
        };

        model.insert(conn).await.map_err(ServiceError::db_error)
    }

    /// Looks up the original (non-duplicate) entry for an idempotency key.
    pub async fn find_original<C: ConnectionTrait>(
        &self,
        conn: &C,
        key: &AuditKey,
    ) -> Result<Option<inventory_audit_log::Model>, ServiceError> {
        AuditEntity::find()
            .filter(inventory_audit_log::Column::TenantId.eq(key.tenant_id))
            .filter(inventory_audit_log::Column::ProductId.eq(key.product_id))
            .filter(inventory_audit_log::Column::BranchId.eq(key.branch_id))
            .filter(inventory_audit_log::Column::SourceReference.eq(key.source_reference.clone()))
            .filter(inventory_audit_log::Column::SourceType.eq(key.source_type.clone()))
            .filter(inventory_audit_log::Column::IsDuplicate.eq(false))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Filtered, paginated read over the audit trail, newest first.
    #[instrument(skip(self, query))]
    pub async fn search(
        &self,
        query: AuditLogQuery,
    ) -> Result<(Vec<inventory_audit_log::Model>, u64), ServiceError> {
        let mut finder = AuditEntity::find();

        if let Some(tenant_id) = query.tenant_id {
            finder = finder.filter(inventory_audit_log::Column::TenantId.eq(tenant_id));
        }
        if let Some(product_id) = query.product_id {
            finder = finder.filter(inventory_audit_log::Column::ProductId.eq(product_id));
        }
        if let Some(branch_id) = query.branch_id {
            finder = finder.filter(inventory_audit_log::Column::BranchId.eq(branch_id));
        }
        if let Some(movement) = query.transaction_type {
            finder = finder
                .filter(inventory_audit_log::Column::TransactionType.eq(movement.as_str()));
        }
        if let Some(ref source_reference) = query.source_reference {
            finder = finder
                .filter(inventory_audit_log::Column::SourceReference.eq(source_reference.clone()));
        }
        if let Some(from) = query.from {
            finder = finder.filter(inventory_audit_log::Column::PerformedAt.gte(from));
        }
        if let Some(to) = query.to {
            finder = finder.filter(inventory_audit_log::Column::PerformedAt.lte(to));
        }

        let limit = query.limit.clamp(1, 100);
        let page = query.page.max(1);

        let paginator = finder
            .order_by_desc(inventory_audit_log::Column::PerformedAt)
            .paginate(&*self.db, limit);

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let entries = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((entries, total))
    }

    fn validate(entry: &NewAuditEntry) -> Result<(), ServiceError> {
        if entry.quantity_changed == 0 {
            error!(
                product_id = %entry.product_id,
                source_reference = %entry.source_reference,
                "rejected audit entry with zero quantity change"
            );
            return Err(ServiceError::InvariantViolation(
                "audit entry must change quantity".into(),
            ));
        }

        if entry.quantity_after != entry.quantity_before + entry.quantity_changed {
            error!(
                product_id = %entry.product_id,
                quantity_before = entry.quantity_before,
                quantity_changed = entry.quantity_changed,
                quantity_after = entry.quantity_after,
                source_reference = %entry.source_reference,
                "rejected audit entry with inconsistent quantities"
            );
            return Err(ServiceError::InvariantViolation(format!(
                "quantity_after {} != quantity_before {} + quantity_changed {}",
                entry.quantity_after, entry.quantity_before, entry.quantity_changed
            )));
        }

        Ok(())
    }
}
