//! Migration to create the sync_checkpoints table.
//!
//! One row per entity type holding the cursor high-water mark and the outcome
//! of the most recent run. The cursor only ever moves forward.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncCheckpoints::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncCheckpoints::EntityType)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SyncCheckpoints::LastCursor)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SyncCheckpoints::ItemsSynced)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncCheckpoints::ErrorCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncCheckpoints::Status)
                            .text()
                            .not_null()
                            .default("success"),
                    )
                    .col(
                        ColumnDef::new(SyncCheckpoints::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncCheckpoints::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncCheckpoints {
    Table,
    EntityType,
    LastCursor,
    ItemsSynced,
    ErrorCount,
    Status,
    UpdatedAt,
}
