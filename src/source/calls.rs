//! Calls reader.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::prelude::DateTimeUtc;
use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult, Statement};
use serde_json::Value as JsonValue;

use super::{EntityKind, SourceReader, SourceRecord};
use crate::error::{SyncError, classify_db_err};

/// Raw call row from the warehouse.
///
/// `context` carries the CRM association objects the call was linked to;
/// the mapper extracts opportunity links from it.
#[derive(Debug, Clone, Default, serde::Serialize, FromQueryResult)]
pub struct CallRow {
    pub id: Option<String>,
    pub title: Option<String>,
    pub started_at: Option<DateTimeUtc>,
    pub duration_seconds: Option<i32>,
    pub direction: Option<String>,
    pub primary_user_id: Option<String>,
    pub context: Option<JsonValue>,
    pub modified_at: Option<DateTimeUtc>,
}

pub struct CallsReader {
    db: Arc<DatabaseConnection>,
    query: String,
}

impl CallsReader {
    pub fn new(db: Arc<DatabaseConnection>, schema: &str) -> Self {
        let query = format!(
            "SELECT id, title, started_at, duration_seconds, direction, \
             primary_user_id, context, modified_at \
             FROM {schema}.calls \
             WHERE modified_at >= $1 \
             ORDER BY modified_at ASC, id ASC \
             LIMIT $2"
        );
        Self { db, query }
    }
}

#[async_trait]
impl SourceReader for CallsReader {
    fn entity(&self) -> EntityKind {
        EntityKind::Calls
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
        let rows = CallRow::find_by_statement(stmt)
            .all(self.db.as_ref())
            .await
            .map_err(|err| classify_db_err(&err))?;
        Ok(rows.into_iter().map(SourceRecord::Call).collect())
    }
}
