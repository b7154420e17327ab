//! Migration to create the call_opportunities junction table.
//!
//! Many-to-many links between calls and opportunities, keyed by the pair of
//! natural keys so repeated syncs insert-if-absent.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CallOpportunities::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CallOpportunities::CallExternalId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CallOpportunities::OpportunityExternalId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CallOpportunities::LinkedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(CallOpportunities::CallExternalId)
                            .col(CallOpportunities::OpportunityExternalId),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CallOpportunities::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CallOpportunities {
    Table,
    CallExternalId,
    OpportunityExternalId,
    LinkedAt,
}
