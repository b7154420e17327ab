//! Speakers reader.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::prelude::DateTimeUtc;
use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult, Statement};
use tracing::warn;

use super::{EntityKind, SourceReader, SourceRecord};
use crate::error::{SyncError, classify_db_err};

/// Raw speaker row from the warehouse, with the display name resolved via a
/// left join on the users dimension.
#[derive(Debug, Clone, Default, serde::Serialize, FromQueryResult)]
pub struct SpeakerRow {
    pub id: Option<String>,
    pub call_id: Option<String>,
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub email_address: Option<String>,
    pub affiliation: Option<String>,
    pub modified_at: Option<DateTimeUtc>,
}

pub struct SpeakersReader {
    db: Arc<DatabaseConnection>,
    query: String,
}

impl SpeakersReader {
    pub fn new(db: Arc<DatabaseConnection>, schema: &str) -> Self {
        let query = format!(
            "SELECT s.id, s.call_id, s.user_id, u.name AS display_name, \
             s.email_address, s.affiliation, s.modified_at \
             FROM {schema}.call_speakers s \
             LEFT JOIN {schema}.users u ON u.id = s.user_id \
             WHERE s.modified_at >= $1 \
             ORDER BY s.modified_at ASC, s.id ASC \
             LIMIT $2"
        );
        Self { db, query }
    }
}

#[async_trait]
impl SourceReader for SpeakersReader {
    fn entity(&self) -> EntityKind {
        EntityKind::Speakers
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
        let rows = SpeakerRow::find_by_statement(stmt)
            .all(self.db.as_ref())
            .await
            .map_err(|err| classify_db_err(&err))?;

        for row in &rows {
            if row.user_id.is_some() && row.display_name.is_none() {
                warn!(
                    speaker_id = ?row.id,
                    user_id = ?row.user_id,
                    "speaker references a user with no matching users row"
                );
            }
        }

        Ok(rows.into_iter().map(SourceRecord::Speaker).collect())
    }
}
