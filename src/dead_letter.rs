//! Dead-letter sink.
//!
//! Append-only record of every row the pipeline skipped: mapping validation
//! failures and permanently rejected writes. Recording a dead letter never
//! fails the sync; a sink error is logged and swallowed so one broken record
//! cannot take down the batch that skipped it.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::ActiveValue::Set;
use sea_orm::{DatabaseConnection, EntityTrait};
use serde_json::Value as JsonValue;
use tracing::{error, warn};
use uuid::Uuid;

use crate::models::dead_letter;
use crate::source::EntityKind;

#[derive(Clone)]
pub struct DeadLetterSink {
    db: Arc<DatabaseConnection>,
}

impl DeadLetterSink {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Record one skipped record. Best-effort: failures to persist the entry
    /// are logged, never propagated.
    pub async fn record(
        &self,
        entity: EntityKind,
        natural_key: Option<&str>,
        reason: &str,
        payload: Option<JsonValue>,
    ) {
        warn!(
            entity = %entity,
            natural_key = natural_key.unwrap_or("<none>"),
            reason,
            "dead-lettering record"
        );
        counter!("revsync_dead_letters_total", "entity" => entity.as_str()).increment(1);

        let entry = dead_letter::ActiveModel {
            id: Set(Uuid::new_v4()),
            entity_type: Set(entity.as_str().to_string()),
            natural_key: Set(natural_key.map(str::to_string)),
            reason: Set(reason.to_string()),
            payload: Set(payload),
            occurred_at: Set(Utc::now()),
        };

        if let Err(err) = dead_letter::Entity::insert(entry).exec(self.db.as_ref()).await {
            error!(
                entity = %entity,
                natural_key = natural_key.unwrap_or("<none>"),
                error = %err,
                "failed to persist dead-letter entry"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::Migrator;
    use sea_orm::{Database, PaginatorTrait, QueryOrder};
    use sea_orm_migration::MigratorTrait;
    use serde_json::json;

    use crate::models::DeadLetter;

    #[tokio::test]
    async fn records_entry_with_payload() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let db = Arc::new(db);
        let sink = DeadLetterSink::new(db.clone());

        sink.record(
            EntityKind::Opportunities,
            Some("opp-1"),
            "record is missing its modification timestamp",
            Some(json!({"id": "opp-1"})),
        )
        .await;
        sink.record(EntityKind::Calls, None, "record is missing its natural key", None)
            .await;

        assert_eq!(DeadLetter::find().count(db.as_ref()).await.unwrap(), 2);
        let entries = DeadLetter::find()
            .order_by_asc(dead_letter::Column::EntityType)
            .all(db.as_ref())
            .await
            .unwrap();
        assert_eq!(entries[0].entity_type, "calls");
        assert_eq!(entries[0].natural_key, None);
        assert_eq!(entries[1].natural_key.as_deref(), Some("opp-1"));
        assert!(entries[1].payload.is_some());
    }
}
