//! Migration to create the transcripts table.
//!
//! One transcript per call; the structured sentence payload is stored whole in
//! `content` with a short `text_snippet` for list views.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Transcripts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transcripts::CallExternalId)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transcripts::Language).text().null())
                    .col(ColumnDef::new(Transcripts::Content).json_binary().null())
                    .col(ColumnDef::new(Transcripts::TextSnippet).text().null())
                    .col(
                        ColumnDef::new(Transcripts::SourceModifiedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transcripts::SyncedAt)
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
            .drop_table(Table::drop().table(Transcripts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Transcripts {
    Table,
    CallExternalId,
    Language,
    Content,
    TextSnippet,
    SourceModifiedAt,
    SyncedAt,
}
