//! Migration to create the calls table.
//!
//! Calls are the primary conversation entity replicated from the warehouse,
//! keyed by the external call identifier so re-synced windows merge in place.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Calls::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Calls::ExternalId)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Calls::Title).text().null())
                    .col(
                        ColumnDef::new(Calls::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Calls::DurationSeconds).integer().null())
                    .col(ColumnDef::new(Calls::Direction).text().null())
                    .col(ColumnDef::new(Calls::PrimaryUserId).text().null())
                    .col(
                        ColumnDef::new(Calls::SourceModifiedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Calls::Raw).json_binary().null())
                    .col(
                        ColumnDef::new(Calls::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Incremental re-reads filter on the source modification timestamp
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_calls_source_modified_at ON calls (source_modified_at)"
                    .to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_calls_source_modified_at").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Calls::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Calls {
    Table,
    ExternalId,
    Title,
    StartedAt,
    DurationSeconds,
    Direction,
    PrimaryUserId,
    SourceModifiedAt,
    Raw,
    SyncedAt,
}
