//! Migration to create the emails table.
//!
//! Recipients are stored as a JSON array (empty when the source had no
//! recipient rows). The full body lives in `raw`; `body_snippet` is truncated.

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
                    .table(Emails::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Emails::ExternalId)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Emails::OpportunityExternalId).text().null())
                    .col(ColumnDef::new(Emails::Sender).text().null())
                    .col(
                        ColumnDef::new(Emails::Recipients)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Emails::Subject).text().null())
                    .col(ColumnDef::new(Emails::BodySnippet).text().null())
                    .col(
                        ColumnDef::new(Emails::SentAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Emails::SourceModifiedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Emails::Raw).json_binary().null())
                    .col(
                        ColumnDef::new(Emails::SyncedAt)
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
                "CREATE INDEX IF NOT EXISTS idx_emails_opportunity_external_id ON emails (opportunity_external_id)"
                    .to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_emails_opportunity_external_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Emails::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Emails {
    Table,
    ExternalId,
    OpportunityExternalId,
    Sender,
    Recipients,
    Subject,
    BodySnippet,
    SentAt,
    SourceModifiedAt,
    Raw,
    SyncedAt,
}
