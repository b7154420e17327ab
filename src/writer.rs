//! Idempotent upsert writer for the destination store.
//!
//! Batches are written with `INSERT .. ON CONFLICT DO UPDATE` keyed on the
//! natural key, so re-writing a window the reader already delivered merges
//! instead of duplicating. A failing batch falls back to per-row writes:
//! permanently rejected rows are reported back for dead-lettering while the
//! rest of the batch still lands; a transient error aborts the attempt so the
//! retry layer can re-drive it.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{SyncError, classify_db_err};
use crate::mapper::MappedRecord;
use crate::models::{call, call_opportunity, email, opportunity, speaker, transcript};

/// A row the writer could not persist even in isolation.
#[derive(Debug, Clone)]
pub struct WriteFailure {
    pub natural_key: String,
    pub reason: String,
    pub payload: Option<JsonValue>,
}

/// Outcome of one batch write.
#[derive(Debug, Default)]
pub struct WriteReport {
    /// Rows durably upserted.
    pub written: u64,
    /// Rows rejected with a non-retryable error.
    pub failures: Vec<WriteFailure>,
}

#[derive(Clone)]
pub struct UpsertWriter {
    db: Arc<DatabaseConnection>,
}

impl UpsertWriter {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Upsert one mapped batch. The batch may mix entity shapes, though in
    /// practice each sync unit writes a single entity plus junction rows.
    pub async fn write(&self, records: Vec<MappedRecord>) -> Result<WriteReport, SyncError> {
        let mut calls = Vec::new();
        let mut transcripts = Vec::new();
        let mut speakers = Vec::new();
        let mut emails = Vec::new();
        let mut opportunities = Vec::new();
        let mut links = Vec::new();

        for record in records {
            match record {
                MappedRecord::Call { call, opportunity_ids } => {
                    for opportunity_id in opportunity_ids {
                        links.push((call.external_id.clone(), opportunity_id));
                    }
                    calls.push((
                        call.external_id.clone(),
                        call.raw.clone(),
                        call.into_active_model(),
                    ));
                }
                MappedRecord::Transcript(t) => transcripts.push((
                    t.call_external_id.clone(),
                    t.content.clone(),
                    t.into_active_model(),
                )),
                MappedRecord::Speaker(s) => speakers.push((
                    s.external_id.clone(),
                    s.raw.clone(),
                    s.into_active_model(),
                )),
                MappedRecord::Email(e) => emails.push((
                    e.external_id.clone(),
                    e.raw.clone(),
                    e.into_active_model(),
                )),
                MappedRecord::Opportunity(o) => opportunities.push((
                    o.external_id.clone(),
                    o.raw.clone(),
                    o.into_active_model(),
                )),
            }
        }

        let mut report = WriteReport::default();
        self.upsert_group(calls, call_conflict(), &mut report).await?;
        self.upsert_group(transcripts, transcript_conflict(), &mut report)
            .await?;
        self.upsert_group(speakers, speaker_conflict(), &mut report)
            .await?;
        self.upsert_group(emails, email_conflict(), &mut report).await?;
        self.upsert_group(opportunities, opportunity_conflict(), &mut report)
            .await?;
        self.link_opportunities(links, &mut report).await?;
        Ok(report)
    }

    /// Try the whole group in one statement; on failure, isolate per row.
    async fn upsert_group<A>(
        &self,
        rows: Vec<(String, Option<JsonValue>, A)>,
        on_conflict: OnConflict,
        report: &mut WriteReport,
    ) -> Result<(), SyncError>
    where
        A: ActiveModelTrait + Clone + Send,
        <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
    {
        if rows.is_empty() {
            return Ok(());
        }

        let models: Vec<A> = rows.iter().map(|(_, _, model)| model.clone()).collect();
        let batch = <A::Entity as EntityTrait>::insert_many(models)
            .on_conflict(on_conflict.clone())
            .exec_without_returning(self.db.as_ref())
            .await;

        let batch_err = match batch {
            Ok(_) => {
                report.written += rows.len() as u64;
                return Ok(());
            }
            Err(err) => err,
        };
        debug!(error = %batch_err, rows = rows.len(), "batch upsert failed, isolating rows");

        for (natural_key, payload, model) in rows {
            let result = <A::Entity as EntityTrait>::insert(model)
                .on_conflict(on_conflict.clone())
                .exec_without_returning(self.db.as_ref())
                .await;
            match result {
                Ok(_) => report.written += 1,
                Err(err) => {
                    let classified = classify_db_err(&err);
                    if classified.is_retryable() {
                        return Err(classified);
                    }
                    report.failures.push(WriteFailure {
                        natural_key,
                        reason: classified.to_string(),
                        payload,
                    });
                }
            }
        }
        Ok(())
    }

    /// Insert-if-absent junction rows linking calls to opportunities.
    async fn link_opportunities(
        &self,
        links: Vec<(String, String)>,
        report: &mut WriteReport,
    ) -> Result<(), SyncError> {
        for (call_id, opportunity_id) in links {
            let active = call_opportunity::ActiveModel {
                call_external_id: Set(call_id.clone()),
                opportunity_external_id: Set(opportunity_id.clone()),
                linked_at: Set(Utc::now()),
            };
            let result = call_opportunity::Entity::insert(active)
                .on_conflict(
                    OnConflict::columns([
                        call_opportunity::Column::CallExternalId,
                        call_opportunity::Column::OpportunityExternalId,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(self.db.as_ref())
                .await;
            if let Err(err) = result {
                let classified = classify_db_err(&err);
                if classified.is_retryable() {
                    return Err(classified);
                }
                report.failures.push(WriteFailure {
                    natural_key: format!("{call_id}:{opportunity_id}"),
                    reason: classified.to_string(),
                    payload: None,
                });
            }
        }
        Ok(())
    }
}

fn call_conflict() -> OnConflict {
    OnConflict::column(call::Column::ExternalId)
        .update_columns([
            call::Column::Title,
            call::Column::StartedAt,
            call::Column::DurationSeconds,
            call::Column::Direction,
            call::Column::PrimaryUserId,
            call::Column::SourceModifiedAt,
            call::Column::Raw,
            call::Column::SyncedAt,
        ])
        .to_owned()
}

fn transcript_conflict() -> OnConflict {
    OnConflict::column(transcript::Column::CallExternalId)
        .update_columns([
            transcript::Column::Language,
            transcript::Column::Content,
            transcript::Column::TextSnippet,
            transcript::Column::SourceModifiedAt,
            transcript::Column::SyncedAt,
        ])
        .to_owned()
}

fn speaker_conflict() -> OnConflict {
    OnConflict::column(speaker::Column::ExternalId)
        .update_columns([
            speaker::Column::CallExternalId,
            speaker::Column::DisplayName,
            speaker::Column::EmailAddress,
            speaker::Column::Affiliation,
            speaker::Column::SourceModifiedAt,
            speaker::Column::Raw,
            speaker::Column::SyncedAt,
        ])
        .to_owned()
}

fn email_conflict() -> OnConflict {
    OnConflict::column(email::Column::ExternalId)
        .update_columns([
            email::Column::OpportunityExternalId,
            email::Column::Sender,
            email::Column::Recipients,
            email::Column::Subject,
            email::Column::BodySnippet,
            email::Column::SentAt,
            email::Column::SourceModifiedAt,
            email::Column::Raw,
            email::Column::SyncedAt,
        ])
        .to_owned()
}

fn opportunity_conflict() -> OnConflict {
    OnConflict::column(opportunity::Column::ExternalId)
        .update_columns([
            opportunity::Column::Name,
            opportunity::Column::Stage,
            opportunity::Column::Amount,
            opportunity::Column::CloseDate,
            opportunity::Column::AccountName,
            opportunity::Column::OwnerName,
            opportunity::Column::SourceModifiedAt,
            opportunity::Column::Raw,
            opportunity::Column::SyncedAt,
        ])
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use migration::Migrator;
    use sea_orm::prelude::DateTimeUtc;
    use sea_orm::{Database, EntityTrait, PaginatorTrait};
    use sea_orm_migration::MigratorTrait;
    use serde_json::json;

    use crate::models::{Call, CallOpportunity, Opportunity};

    async fn test_writer() -> (UpsertWriter, Arc<DatabaseConnection>) {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let db = Arc::new(db);
        (UpsertWriter::new(db.clone()), db)
    }

    fn ts(hour: u32) -> DateTimeUtc {
        Utc.with_ymd_and_hms(2026, 7, 1, hour, 0, 0).unwrap()
    }

    fn sample_call(title: &str, modified: DateTimeUtc) -> MappedRecord {
        MappedRecord::Call {
            call: call::Model {
                external_id: "call-1".to_string(),
                title: Some(title.to_string()),
                started_at: None,
                duration_seconds: Some(1800),
                direction: Some("outbound".to_string()),
                primary_user_id: None,
                source_modified_at: modified,
                raw: Some(json!({"id": "call-1"})),
                synced_at: Utc::now(),
            },
            opportunity_ids: vec!["opp-1".to_string()],
        }
    }

    #[tokio::test]
    async fn rewrite_merges_instead_of_duplicating() {
        let (writer, db) = test_writer().await;

        let first = writer.write(vec![sample_call("v1", ts(9))]).await.unwrap();
        assert_eq!(first.written, 1);
        assert!(first.failures.is_empty());

        let second = writer.write(vec![sample_call("v2", ts(10))]).await.unwrap();
        assert_eq!(second.written, 1);

        assert_eq!(Call::find().count(db.as_ref()).await.unwrap(), 1);
        let stored = Call::find_by_id("call-1")
            .one(db.as_ref())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.title.as_deref(), Some("v2"));
        assert_eq!(stored.source_modified_at, ts(10));
    }

    #[tokio::test]
    async fn junction_rows_are_insert_if_absent() {
        let (writer, db) = test_writer().await;

        writer.write(vec![sample_call("v1", ts(9))]).await.unwrap();
        writer.write(vec![sample_call("v1", ts(9))]).await.unwrap();

        assert_eq!(
            CallOpportunity::find().count(db.as_ref()).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let (writer, _db) = test_writer().await;
        let report = writer.write(Vec::new()).await.unwrap();
        assert_eq!(report.written, 0);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn mixed_entities_land_in_their_tables() {
        let (writer, db) = test_writer().await;

        let records = vec![
            sample_call("v1", ts(9)),
            MappedRecord::Opportunity(opportunity::Model {
                external_id: "opp-1".to_string(),
                name: Some("Renewal".to_string()),
                stage: Some("negotiation".to_string()),
                amount: Some(12000.0),
                close_date: None,
                account_name: Some("Acme".to_string()),
                owner_name: None,
                source_modified_at: ts(9),
                raw: None,
                synced_at: Utc::now(),
            }),
        ];
        let report = writer.write(records).await.unwrap();
        assert_eq!(report.written, 2);
        assert_eq!(Opportunity::find().count(db.as_ref()).await.unwrap(), 1);
    }
}
