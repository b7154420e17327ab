//! Migration to create the dead_letters table.
//!
//! Append-only store for records that failed mapping or per-row writes, kept
//! apart from the entity tables so a bad record never blocks its batch.

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
                    .table(DeadLetters::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeadLetters::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeadLetters::EntityType).text().not_null())
                    .col(ColumnDef::new(DeadLetters::NaturalKey).text().null())
                    .col(ColumnDef::new(DeadLetters::Reason).text().not_null())
                    .col(ColumnDef::new(DeadLetters::Payload).json_binary().null())
                    .col(
                        ColumnDef::new(DeadLetters::OccurredAt)
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
                "CREATE INDEX IF NOT EXISTS idx_dead_letters_entity_occurred ON dead_letters (entity_type, occurred_at)"
                    .to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_dead_letters_entity_occurred")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(DeadLetters::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DeadLetters {
    Table,
    Id,
    EntityType,
    NaturalKey,
    Reason,
    Payload,
    OccurredAt,
}
