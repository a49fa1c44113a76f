use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_catalog_tables::Migration),
            Box::new(m20240301_000002_create_inventory_tables::Migration),
            Box::new(m20240301_000003_create_sales_tables::Migration),
            Box::new(m20240301_000004_create_credit_tables::Migration),
            Box::new(m20240301_000005_create_returns_tables::Migration),
            Box::new(m20240301_000006_create_sale_edit_requests_table::Migration),
            Box::new(m20240301_000007_create_mpesa_transactions_table::Migration),
        ]
    }
}

mod m20240301_000001_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::TenantId).uuid().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Barcode).string().null())
                        .col(ColumnDef::new(Products::Unit).string().null())
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Products::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Products::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_products_tenant_barcode")
                        .table(Products::Table)
                        .col(Products::TenantId)
                        .col(Products::Barcode)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(TenantSettings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TenantSettings::TenantId)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TenantSettings::VatRate).decimal().not_null())
                        .col(
                            ColumnDef::new(TenantSettings::TaxInclusive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(TenantSettings::Currency)
                                .string()
                                .not_null()
                                .default("KES"),
                        )
                        .col(
                            ColumnDef::new(TenantSettings::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TenantSettings::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TenantSettings::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        TenantId,
        Name,
        Barcode,
        Unit,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum TenantSettings {
        Table,
        TenantId,
        VatRate,
        TaxInclusive,
        Currency,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_inventory_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_inventory_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryBatches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryBatches::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryBatches::TenantId).uuid().not_null())
                        .col(
                            ColumnDef::new(InventoryBatches::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryBatches::BranchId).uuid().not_null())
                        .col(ColumnDef::new(InventoryBatches::BatchNumber).string().null())
                        .col(ColumnDef::new(InventoryBatches::ExpiryDate).date().null())
                        .col(
                            ColumnDef::new(InventoryBatches::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryBatches::UnitCost)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryBatches::SellingPrice)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryBatches::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(InventoryBatches::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(InventoryBatches::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryBatches::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_batches_product")
                                .from(InventoryBatches::Table, InventoryBatches::ProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_inventory_batches_product_branch")
                        .table(InventoryBatches::Table)
                        .col(InventoryBatches::TenantId)
                        .col(InventoryBatches::ProductId)
                        .col(InventoryBatches::BranchId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InventoryAuditLog::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryAuditLog::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryAuditLog::TenantId).uuid().not_null())
                        .col(
                            ColumnDef::new(InventoryAuditLog::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryAuditLog::BranchId).uuid().not_null())
                        .col(ColumnDef::new(InventoryAuditLog::BatchId).uuid().null())
                        .col(
                            ColumnDef::new(InventoryAuditLog::TransactionType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAuditLog::QuantityChanged)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAuditLog::QuantityBefore)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAuditLog::QuantityAfter)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAuditLog::SourceReference)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAuditLog::SourceType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAuditLog::IsDuplicate)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(InventoryAuditLog::DuplicateReference)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAuditLog::PerformedBy)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAuditLog::PerformedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryAuditLog::Notes).string().null())
                        .col(
                            ColumnDef::new(InventoryAuditLog::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_inventory_audit_product_branch")
                        .table(InventoryAuditLog::Table)
                        .col(InventoryAuditLog::TenantId)
                        .col(InventoryAuditLog::ProductId)
                        .col(InventoryAuditLog::BranchId)
                        .to_owned(),
                )
                .await?;

            // Partial unique index backing duplicate suppression: at most one
            // non-duplicate entry per idempotency key. Raw SQL because the
            // builder has no partial-index support across both backends.
            manager
                .get_connection()
                .execute_unprepared(
                    "CREATE UNIQUE INDEX IF NOT EXISTS idx_inventory_audit_source_key \
                     ON inventory_audit_log \
                     (tenant_id, product_id, branch_id, source_reference, source_type) \
                     WHERE NOT is_duplicate",
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryAuditLog::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(InventoryBatches::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InventoryBatches {
        Table,
        Id,
        TenantId,
        ProductId,
        BranchId,
        BatchNumber,
        ExpiryDate,
        Quantity,
        UnitCost,
        SellingPrice,
        IsActive,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum InventoryAuditLog {
        Table,
        Id,
        TenantId,
        ProductId,
        BranchId,
        BatchId,
        TransactionType,
        QuantityChanged,
        QuantityBefore,
        QuantityAfter,
        SourceReference,
        SourceType,
        IsDuplicate,
        DuplicateReference,
        PerformedBy,
        PerformedAt,
        Notes,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
    }
}

mod m20240301_000003_create_sales_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_sales_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Sales::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Sales::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Sales::TenantId).uuid().not_null())
                        .col(ColumnDef::new(Sales::SaleNumber).string().not_null())
                        .col(ColumnDef::new(Sales::BranchId).uuid().not_null())
                        .col(ColumnDef::new(Sales::CashierId).uuid().not_null())
                        .col(ColumnDef::new(Sales::CustomerId).uuid().null())
                        .col(ColumnDef::new(Sales::WalkInName).string().null())
                        .col(ColumnDef::new(Sales::WalkInPhone).string().null())
                        .col(ColumnDef::new(Sales::Subtotal).decimal().not_null())
                        .col(ColumnDef::new(Sales::TaxAmount).decimal().not_null())
                        .col(ColumnDef::new(Sales::DiscountAmount).decimal().not_null())
                        .col(ColumnDef::new(Sales::TotalAmount).decimal().not_null())
                        .col(ColumnDef::new(Sales::Status).string().not_null())
                        .col(ColumnDef::new(Sales::ReturnStatus).string().not_null())
                        .col(
                            ColumnDef::new(Sales::IsCreditSale)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Sales::Notes).string().null())
                        .col(
                            ColumnDef::new(Sales::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(Sales::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Sales::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_sales_tenant_number")
                        .table(Sales::Table)
                        .col(Sales::TenantId)
                        .col(Sales::SaleNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SaleLineItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SaleLineItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SaleLineItems::TenantId).uuid().not_null())
                        .col(ColumnDef::new(SaleLineItems::SaleId).uuid().not_null())
                        .col(ColumnDef::new(SaleLineItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(SaleLineItems::BatchId).uuid().not_null())
                        .col(ColumnDef::new(SaleLineItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(SaleLineItems::ReturnedQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(SaleLineItems::UnitPrice).decimal().not_null())
                        .col(
                            ColumnDef::new(SaleLineItems::DiscountAmount)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SaleLineItems::TaxAmount).decimal().not_null())
                        .col(ColumnDef::new(SaleLineItems::LineTotal).decimal().not_null())
                        .col(
                            ColumnDef::new(SaleLineItems::IsDeleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(SaleLineItems::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SaleLineItems::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sale_line_items_sale")
                                .from(SaleLineItems::Table, SaleLineItems::SaleId)
                                .to(Sales::Table, Sales::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_sale_line_items_sale")
                        .table(SaleLineItems::Table)
                        .col(SaleLineItems::SaleId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SalePayments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalePayments::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalePayments::TenantId).uuid().not_null())
                        .col(ColumnDef::new(SalePayments::SaleId).uuid().not_null())
                        .col(ColumnDef::new(SalePayments::Method).string().not_null())
                        .col(ColumnDef::new(SalePayments::Amount).decimal().not_null())
                        .col(ColumnDef::new(SalePayments::Reference).string().null())
                        .col(
                            ColumnDef::new(SalePayments::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sale_payments_sale")
                                .from(SalePayments::Table, SalePayments::SaleId)
                                .to(Sales::Table, Sales::Id),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SalePayments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SaleLineItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Sales::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Sales {
        Table,
        Id,
        TenantId,
        SaleNumber,
        BranchId,
        CashierId,
        CustomerId,
        WalkInName,
        WalkInPhone,
        Subtotal,
        TaxAmount,
        DiscountAmount,
        TotalAmount,
        Status,
        ReturnStatus,
        IsCreditSale,
        Notes,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum SaleLineItems {
        Table,
        Id,
        TenantId,
        SaleId,
        ProductId,
        BatchId,
        Quantity,
        ReturnedQuantity,
        UnitPrice,
        DiscountAmount,
        TaxAmount,
        LineTotal,
        IsDeleted,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum SalePayments {
        Table,
        Id,
        TenantId,
        SaleId,
        Method,
        Amount,
        Reference,
        CreatedAt,
    }
}

mod m20240301_000004_create_credit_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_credit_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CreditAccounts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CreditAccounts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CreditAccounts::TenantId).uuid().not_null())
                        .col(
                            ColumnDef::new(CreditAccounts::CreditNumber)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CreditAccounts::SaleId).uuid().not_null())
                        .col(ColumnDef::new(CreditAccounts::CustomerId).uuid().not_null())
                        .col(
                            ColumnDef::new(CreditAccounts::TotalAmount)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CreditAccounts::PaidAmount)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CreditAccounts::RemainingAmount)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CreditAccounts::ExpectedPaymentDate)
                                .date()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CreditAccounts::Status).string().not_null())
                        .col(ColumnDef::new(CreditAccounts::ClosedAt).timestamp().null())
                        .col(
                            ColumnDef::new(CreditAccounts::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CreditAccounts::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_credit_accounts_sale")
                                .from(CreditAccounts::Table, CreditAccounts::SaleId)
                                .to(Sales::Table, Sales::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_credit_accounts_tenant_number")
                        .table(CreditAccounts::Table)
                        .col(CreditAccounts::TenantId)
                        .col(CreditAccounts::CreditNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CreditPayments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CreditPayments::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CreditPayments::TenantId).uuid().not_null())
                        .col(
                            ColumnDef::new(CreditPayments::CreditAccountId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CreditPayments::Amount).decimal().not_null())
                        .col(ColumnDef::new(CreditPayments::Method).string().not_null())
                        .col(ColumnDef::new(CreditPayments::Reference).string().null())
                        .col(ColumnDef::new(CreditPayments::ReceivedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(CreditPayments::PaymentDate)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CreditPayments::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_credit_payments_account")
                                .from(CreditPayments::Table, CreditPayments::CreditAccountId)
                                .to(CreditAccounts::Table, CreditAccounts::Id),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CreditPayments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CreditAccounts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CreditAccounts {
        Table,
        Id,
        TenantId,
        CreditNumber,
        SaleId,
        CustomerId,
        TotalAmount,
        PaidAmount,
        RemainingAmount,
        ExpectedPaymentDate,
        Status,
        ClosedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum CreditPayments {
        Table,
        Id,
        TenantId,
        CreditAccountId,
        Amount,
        Method,
        Reference,
        ReceivedBy,
        PaymentDate,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Sales {
        Table,
        Id,
    }
}

mod m20240301_000005_create_returns_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_returns_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SaleReturns::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SaleReturns::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SaleReturns::TenantId).uuid().not_null())
                        .col(
                            ColumnDef::new(SaleReturns::ReturnNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SaleReturns::OriginalSaleId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SaleReturns::BranchId).uuid().not_null())
                        .col(
                            ColumnDef::new(SaleReturns::ReturnReason)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SaleReturns::TotalRefundAmount)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SaleReturns::Status).string().not_null())
                        .col(ColumnDef::new(SaleReturns::ProcessedBy).uuid().not_null())
                        .col(ColumnDef::new(SaleReturns::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(SaleReturns::UpdatedAt).timestamp().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sale_returns_sale")
                                .from(SaleReturns::Table, SaleReturns::OriginalSaleId)
                                .to(Sales::Table, Sales::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_sale_returns_tenant_number")
                        .table(SaleReturns::Table)
                        .col(SaleReturns::TenantId)
                        .col(SaleReturns::ReturnNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SaleReturnLineItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SaleReturnLineItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SaleReturnLineItems::TenantId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SaleReturnLineItems::SaleReturnId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SaleReturnLineItems::SaleLineItemId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SaleReturnLineItems::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SaleReturnLineItems::QuantityReturned)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SaleReturnLineItems::RefundAmount)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SaleReturnLineItems::RestoreToInventory)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(SaleReturnLineItems::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sale_return_line_items_return")
                                .from(
                                    SaleReturnLineItems::Table,
                                    SaleReturnLineItems::SaleReturnId,
                                )
                                .to(SaleReturns::Table, SaleReturns::Id),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SaleReturnLineItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SaleReturns::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SaleReturns {
        Table,
        Id,
        TenantId,
        ReturnNumber,
        OriginalSaleId,
        BranchId,
        ReturnReason,
        TotalRefundAmount,
        Status,
        ProcessedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum SaleReturnLineItems {
        Table,
        Id,
        TenantId,
        SaleReturnId,
        SaleLineItemId,
        ProductId,
        QuantityReturned,
        RefundAmount,
        RestoreToInventory,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Sales {
        Table,
        Id,
    }
}

mod m20240301_000006_create_sale_edit_requests_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000006_create_sale_edit_requests_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SaleEditRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SaleEditRequests::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SaleEditRequests::TenantId).uuid().not_null())
                        .col(ColumnDef::new(SaleEditRequests::SaleId).uuid().not_null())
                        .col(
                            ColumnDef::new(SaleEditRequests::SaleLineItemId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SaleEditRequests::RequestType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SaleEditRequests::NewUnitPrice)
                                .decimal()
                                .null(),
                        )
                        .col(ColumnDef::new(SaleEditRequests::Reason).string().null())
                        .col(ColumnDef::new(SaleEditRequests::Status).string().not_null())
                        .col(
                            ColumnDef::new(SaleEditRequests::RequestedBy)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SaleEditRequests::ApprovedBy).uuid().null())
                        .col(
                            ColumnDef::new(SaleEditRequests::RejectionReason)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(SaleEditRequests::DecidedAt).timestamp().null())
                        .col(
                            ColumnDef::new(SaleEditRequests::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SaleEditRequests::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sale_edit_requests_sale")
                                .from(SaleEditRequests::Table, SaleEditRequests::SaleId)
                                .to(Sales::Table, Sales::Id),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SaleEditRequests::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SaleEditRequests {
        Table,
        Id,
        TenantId,
        SaleId,
        SaleLineItemId,
        RequestType,
        NewUnitPrice,
        Reason,
        Status,
        RequestedBy,
        ApprovedBy,
        RejectionReason,
        DecidedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Sales {
        Table,
        Id,
    }
}

mod m20240301_000007_create_mpesa_transactions_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000007_create_mpesa_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(MpesaTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MpesaTransactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MpesaTransactions::TenantId).uuid().not_null())
                        .col(ColumnDef::new(MpesaTransactions::SaleId).uuid().null())
                        .col(
                            ColumnDef::new(MpesaTransactions::CheckoutRequestId)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MpesaTransactions::MerchantRequestId)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(MpesaTransactions::PhoneNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MpesaTransactions::Amount)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MpesaTransactions::Status).string().not_null())
                        .col(
                            ColumnDef::new(MpesaTransactions::MpesaReceiptNumber)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(MpesaTransactions::ResultCode)
                                .integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(MpesaTransactions::ResultDesc)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(MpesaTransactions::CallbackReceived)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(MpesaTransactions::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MpesaTransactions::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_mpesa_transactions_checkout_id")
                        .table(MpesaTransactions::Table)
                        .col(MpesaTransactions::CheckoutRequestId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(MpesaTransactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum MpesaTransactions {
        Table,
        Id,
        TenantId,
        SaleId,
        CheckoutRequestId,
        MerchantRequestId,
        PhoneNumber,
        Amount,
        Status,
        MpesaReceiptNumber,
        ResultCode,
        ResultDesc,
        CallbackReceived,
        CreatedAt,
        UpdatedAt,
    }
}
