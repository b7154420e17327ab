//! Opportunities reader.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::prelude::DateTimeUtc;
use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult, Statement};
use tracing::warn;

use super::{EntityKind, SourceReader, SourceRecord};
use crate::error::{SyncError, classify_db_err};

/// Raw opportunity row, with account and owner names resolved via left joins.
///
/// `amount` is cast to text in the query so the warehouse's numeric
/// representation (decimal or string-typed export columns) survives the wire;
/// the mapper parses it.
#[derive(Debug, Clone, Default, serde::Serialize, FromQueryResult)]
pub struct OpportunityRow {
    pub id: Option<String>,
    pub name: Option<String>,
    pub stage: Option<String>,
    pub amount: Option<String>,
    pub close_date: Option<DateTimeUtc>,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    pub owner_id: Option<String>,
    pub owner_name: Option<String>,
    pub modified_at: Option<DateTimeUtc>,
}

pub struct OpportunitiesReader {
    db: Arc<DatabaseConnection>,
    query: String,
}

impl OpportunitiesReader {
    pub fn new(db: Arc<DatabaseConnection>, schema: &str) -> Self {
        let query = format!(
            "SELECT o.id, o.name, o.stage, CAST(o.amount AS TEXT) AS amount, \
             o.close_date, o.account_id, a.name AS account_name, \
             o.owner_id, u.name AS owner_name, o.modified_at \
             FROM {schema}.opportunities o \
             LEFT JOIN {schema}.accounts a ON a.id = o.account_id \
             LEFT JOIN {schema}.users u ON u.id = o.owner_id \
             WHERE o.modified_at >= $1 \
             ORDER BY o.modified_at ASC, o.id ASC \
             LIMIT $2"
        );
        Self { db, query }
    }
}

#[async_trait]
impl SourceReader for OpportunitiesReader {
    fn entity(&self) -> EntityKind {
        EntityKind::Opportunities
    }

    async fn read(
        &self,
        since: DateTimeUtc,
        limit: u64,
    ) -> Result<Vec<SourceRecord>, SyncError> {
        let stmt = Statement::from_sql_and_values(
            self.db.get_database_backend(),
            &self.query,
            [since.into(), (limit as i64).into()],
        );
        let rows = OpportunityRow::find_by_statement(stmt)
            .all(self.db.as_ref())
            .await
            .map_err(|err| classify_db_err(&err))?;

        for row in &rows {
            if row.account_id.is_some() && row.account_name.is_none() {
                warn!(
                    opportunity_id = ?row.id,
                    account_id = ?row.account_id,
                    "opportunity references an account with no matching accounts row"
                );
            }
            if row.owner_id.is_some() && row.owner_name.is_none() {
                warn!(
                    opportunity_id = ?row.id,
                    owner_id = ?row.owner_id,
                    "opportunity references an owner with no matching users row"
                );
            }
        }

        Ok(rows.into_iter().map(SourceRecord::Opportunity).collect())
    }
}
