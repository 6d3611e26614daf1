use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_locations_table::Migration),
            Box::new(m20250301_000002_create_inventory_items_table::Migration),
            Box::new(m20250301_000003_create_inventory_adjustments_table::Migration),
            Box::new(m20250301_000004_create_inventory_reservations_table::Migration),
            Box::new(m20250301_000005_create_inventory_transfers_tables::Migration),
        ]
    }
}

mod m20250301_000001_create_locations_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000001_create_locations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Locations::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Locations::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Locations::Name).string().not_null())
                        .col(ColumnDef::new(Locations::Code).string().not_null().unique_key())
                        .col(
                            ColumnDef::new(Locations::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Locations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Locations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Locations {
        Table,
        Id,
        Name,
        Code,
        IsActive,
        CreatedAt,
    }
}

mod m20250301_000002_create_inventory_items_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000002_create_inventory_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryItems::ProductId).uuid().null())
                        .col(ColumnDef::new(InventoryItems::VariantId).uuid().null())
                        .col(ColumnDef::new(InventoryItems::StockKey).string().not_null())
                        .col(ColumnDef::new(InventoryItems::LocationId).uuid().not_null())
                        .col(
                            ColumnDef::new(InventoryItems::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::ReservedQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::AvailableQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::LowStockThreshold)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::AverageCost)
                                .decimal_len(19, 4)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::LastCost)
                                .decimal_len(19, 4)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::Version)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ux_inventory_items_stock_key_location")
                        .table(InventoryItems::Table)
                        .col(InventoryItems::StockKey)
                        .col(InventoryItems::LocationId)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ix_inventory_items_location")
                        .table(InventoryItems::Table)
                        .col(InventoryItems::LocationId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InventoryItems {
        Table,
        Id,
        ProductId,
        VariantId,
        StockKey,
        LocationId,
        Quantity,
        ReservedQuantity,
        AvailableQuantity,
        LowStockThreshold,
        AverageCost,
        LastCost,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250301_000003_create_inventory_adjustments_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000003_create_inventory_adjustments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryAdjustments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryAdjustments::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAdjustments::InventoryItemId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAdjustments::AdjustmentType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAdjustments::QuantityChange)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAdjustments::PreviousQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAdjustments::NewQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryAdjustments::Reason).string().not_null())
                        .col(
                            ColumnDef::new(InventoryAdjustments::UnitCost)
                                .decimal_len(19, 4)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAdjustments::TotalCostImpact)
                                .decimal_len(19, 4)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAdjustments::ReferenceType)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(InventoryAdjustments::ReferenceId).uuid().null())
                        .col(ColumnDef::new(InventoryAdjustments::CreatedBy).uuid().null())
                        .col(
                            ColumnDef::new(InventoryAdjustments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ix_inventory_adjustments_item")
                        .table(InventoryAdjustments::Table)
                        .col(InventoryAdjustments::InventoryItemId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryAdjustments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InventoryAdjustments {
        Table,
        Id,
        InventoryItemId,
        AdjustmentType,
        QuantityChange,
        PreviousQuantity,
        NewQuantity,
        Reason,
        UnitCost,
        TotalCostImpact,
        ReferenceType,
        ReferenceId,
        CreatedBy,
        CreatedAt,
    }
}

mod m20250301_000004_create_inventory_reservations_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000004_create_inventory_reservations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryReservations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryReservations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryReservations::InventoryItemId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryReservations::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryReservations::Reason).string().not_null())
                        .col(ColumnDef::new(InventoryReservations::ReferenceId).uuid().null())
                        .col(
                            ColumnDef::new(InventoryReservations::ExpiresAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(InventoryReservations::CreatedBy).uuid().null())
                        .col(
                            ColumnDef::new(InventoryReservations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryReservations::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ix_inventory_reservations_item")
                        .table(InventoryReservations::Table)
                        .col(InventoryReservations::InventoryItemId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ix_inventory_reservations_expires_at")
                        .table(InventoryReservations::Table)
                        .col(InventoryReservations::ExpiresAt)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryReservations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InventoryReservations {
        Table,
        Id,
        InventoryItemId,
        Quantity,
        Reason,
        ReferenceId,
        ExpiresAt,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250301_000005_create_inventory_transfers_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000005_create_inventory_transfers_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryTransfers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryTransfers::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransfers::FromLocationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransfers::ToLocationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryTransfers::Status).string().not_null())
                        .col(
                            ColumnDef::new(InventoryTransfers::TrackingNumber)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(InventoryTransfers::Notes).text().null())
                        .col(ColumnDef::new(InventoryTransfers::CreatedBy).uuid().null())
                        .col(
                            ColumnDef::new(InventoryTransfers::ShippedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransfers::ReceivedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransfers::Version)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryTransfers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransfers::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InventoryTransferItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryTransferItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransferItems::TransferId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransferItems::LineNumber)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryTransferItems::ProductId).uuid().null())
                        .col(ColumnDef::new(InventoryTransferItems::VariantId).uuid().null())
                        .col(
                            ColumnDef::new(InventoryTransferItems::QuantityRequested)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransferItems::QuantityShipped)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryTransferItems::QuantityReceived)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryTransferItems::ReservationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransferItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_transfer_items_transfer")
                                .from(InventoryTransferItems::Table, InventoryTransferItems::TransferId)
                                .to(InventoryTransfers::Table, InventoryTransfers::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ix_inventory_transfer_items_transfer")
                        .table(InventoryTransferItems::Table)
                        .col(InventoryTransferItems::TransferId)
                        .col(InventoryTransferItems::LineNumber)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryTransferItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(InventoryTransfers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InventoryTransfers {
        Table,
        Id,
        FromLocationId,
        ToLocationId,
        Status,
        TrackingNumber,
        Notes,
        CreatedBy,
        ShippedAt,
        ReceivedAt,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum InventoryTransferItems {
        Table,
        Id,
        TransferId,
        LineNumber,
        ProductId,
        VariantId,
        QuantityRequested,
        QuantityShipped,
        QuantityReceived,
        ReservationId,
        CreatedAt,
    }
}
