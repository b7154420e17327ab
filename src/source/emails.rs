//! Emails reader.
//!
//! Emails are stored normalized in the warehouse: one row per message plus a
//! recipient table. The reader fetches the message window first, then collects
//! recipients for that window in a second query and folds them in. A message
//! with no recipient rows yields an empty recipient list, not an error.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::prelude::DateTimeUtc;
use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult, Statement, Value};
use serde_json::Value as JsonValue;

use super::{EntityKind, SourceReader, SourceRecord};
use crate::error::{SyncError, classify_db_err};

/// Assembled email record: the message row plus its recipient addresses.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EmailRow {
    pub id: Option<String>,
    pub sender: Option<String>,
    pub recipients: Vec<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub sent_at: Option<DateTimeUtc>,
    pub context: Option<JsonValue>,
    pub modified_at: Option<DateTimeUtc>,
}

#[derive(Debug, FromQueryResult)]
struct MessageRow {
    id: Option<String>,
    sender: Option<String>,
    subject: Option<String>,
    body: Option<String>,
    sent_at: Option<DateTimeUtc>,
    context: Option<JsonValue>,
    modified_at: Option<DateTimeUtc>,
}

#[derive(Debug, FromQueryResult)]
struct RecipientRow {
    email_id: String,
    recipient: String,
}

pub struct EmailsReader {
    db: Arc<DatabaseConnection>,
    schema: String,
    query: String,
}

impl EmailsReader {
    pub fn new(db: Arc<DatabaseConnection>, schema: &str) -> Self {
        let query = format!(
            "SELECT id, sender, subject, body, sent_at, context, modified_at \
             FROM {schema}.emails \
             WHERE modified_at >= $1 \
             ORDER BY modified_at ASC, id ASC \
             LIMIT $2"
        );
        Self {
            db,
            schema: schema.to_string(),
            query,
        }
    }

    async fn recipients_for(
        &self,
        email_ids: &[String],
    ) -> Result<HashMap<String, Vec<String>>, SyncError> {
        if email_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = (1..=email_ids.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT email_id, recipient FROM {}.email_recipients \
             WHERE email_id IN ({placeholders}) \
             ORDER BY email_id ASC, recipient ASC",
            self.schema
        );
        let values: Vec<Value> = email_ids.iter().map(|id| id.clone().into()).collect();
        let stmt = Statement::from_sql_and_values(self.db.get_database_backend(), sql, values);

        let rows = RecipientRow::find_by_statement(stmt)
            .all(self.db.as_ref())
            .await
            .map_err(|err| classify_db_err(&err))?;

        let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            grouped.entry(row.email_id).or_default().push(row.recipient);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl SourceReader for EmailsReader {
    fn entity(&self) -> EntityKind {
        EntityKind::Emails
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
        let messages = MessageRow::find_by_statement(stmt)
            .all(self.db.as_ref())
            .await
            .map_err(|err| classify_db_err(&err))?;

        let ids: Vec<String> = messages.iter().filter_map(|m| m.id.clone()).collect();
        let mut recipients = self.recipients_for(&ids).await?;

        let records = messages
            .into_iter()
            .map(|m| {
                let recipients = m
                    .id
                    .as_deref()
                    .and_then(|id| recipients.remove(id))
                    .unwrap_or_default();
                SourceRecord::Email(EmailRow {
                    id: m.id,
                    sender: m.sender,
                    recipients,
                    subject: m.subject,
                    body: m.body,
                    sent_at: m.sent_at,
                    context: m.context,
                    modified_at: m.modified_at,
                })
            })
            .collect();
        Ok(records)
    }
}
