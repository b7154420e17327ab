//! Migration to create the opportunities table.
//!
//! Account and owner names are denormalized from warehouse joins; either may
//! be null when the join found no match.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Opportunities::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Opportunities::ExternalId)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Opportunities::Name).text().null())
                    .col(ColumnDef::new(Opportunities::Stage).text().null())
                    .col(ColumnDef::new(Opportunities::Amount).double().null())
                    .col(
                        ColumnDef::new(Opportunities::CloseDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Opportunities::AccountName).text().null())
                    .col(ColumnDef::new(Opportunities::OwnerName).text().null())
                    .col(
                        ColumnDef::new(Opportunities::SourceModifiedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Opportunities::Raw).json_binary().null())
                    .col(
                        ColumnDef::new(Opportunities::SyncedAt)
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
            .drop_table(Table::drop().table(Opportunities::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Opportunities {
    Table,
    ExternalId,
    Name,
    Stage,
    Amount,
    CloseDate,
    AccountName,
    OwnerName,
    SourceModifiedAt,
    Raw,
    SyncedAt,
}
