//! Transcripts reader.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::prelude::DateTimeUtc;
use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult, Statement};
use serde_json::Value as JsonValue;

use super::{EntityKind, SourceReader, SourceRecord};
use crate::error::{SyncError, classify_db_err};

/// Raw transcript row from the warehouse. One transcript per call;
/// `sentences` is the structured sentence-level content.
#[derive(Debug, Clone, Default, serde::Serialize, FromQueryResult)]
pub struct TranscriptRow {
    pub call_id: Option<String>,
    pub language: Option<String>,
    pub sentences: Option<JsonValue>,
    pub modified_at: Option<DateTimeUtc>,
}

pub struct TranscriptsReader {
    db: Arc<DatabaseConnection>,
    query: String,
}

impl TranscriptsReader {
    pub fn new(db: Arc<DatabaseConnection>, schema: &str) -> Self {
        let query = format!(
            "SELECT call_id, language, sentences, modified_at \
             FROM {schema}.transcripts \
             WHERE modified_at >= $1 \
             ORDER BY modified_at ASC, call_id ASC \
             LIMIT $2"
        );
        Self { db, query }
    }
}

#[async_trait]
impl SourceReader for TranscriptsReader {
    fn entity(&self) -> EntityKind {
        EntityKind::Transcripts
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
        let rows = TranscriptRow::find_by_statement(stmt)
            .all(self.db.as_ref())
            .await
            .map_err(|err| classify_db_err(&err))?;
        Ok(rows.into_iter().map(SourceRecord::Transcript).collect())
    }
}
