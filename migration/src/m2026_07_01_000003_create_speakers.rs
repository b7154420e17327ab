//! Migration to create the speakers table.
//!
//! Speakers are the per-call participants. `display_name` is resolved from the
//! warehouse users table at read time and stays null when no match exists.

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
                    .table(Speakers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Speakers::ExternalId)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Speakers::CallExternalId).text().not_null())
                    .col(ColumnDef::new(Speakers::DisplayName).text().null())
                    .col(ColumnDef::new(Speakers::EmailAddress).text().null())
                    .col(ColumnDef::new(Speakers::Affiliation).text().null())
                    .col(
                        ColumnDef::new(Speakers::SourceModifiedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Speakers::Raw).json_binary().null())
                    .col(
                        ColumnDef::new(Speakers::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_speakers_call_external_id ON speakers (call_external_id)"
                    .to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_speakers_call_external_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Speakers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Speakers {
    Table,
    ExternalId,
    CallExternalId,
    DisplayName,
    EmailAddress,
    Affiliation,
    SourceModifiedAt,
    Raw,
    SyncedAt,
}
