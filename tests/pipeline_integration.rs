//! End-to-end pipeline tests over an in-memory destination.
//!
//! Readers are faked so every source condition (updates, invalid records,
//! transient failures) can be scripted; the destination is a real SQLite
//! database with the full migration set applied, so upsert/merge, checkpoint
//! and dead-letter behavior are exercised against actual SQL.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use migration::Migrator;
use sea_orm::prelude::DateTimeUtc;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, EntityTrait, PaginatorTrait};
use sea_orm_migration::MigratorTrait;
use serde_json::json;

use revsync::config::{AppConfig, RetryPolicyConfig};
use revsync::error::SyncError;
use revsync::models::{Call, DeadLetter, Email, Opportunity, SyncCheckpoint, SyncRun};
use revsync::orchestrator::{Orchestrator, RunStatus};
use revsync::source::{
    CallRow, EmailRow, EntityKind, OpportunityRow, SourceReader, SourceRecord,
};
use revsync::unit::UnitState;

fn ts(day: u32, hour: u32) -> DateTimeUtc {
    Utc.with_ymd_and_hms(2026, 7, day, hour, 0, 0).unwrap()
}

fn modified_of(record: &SourceRecord) -> Option<DateTimeUtc> {
    match record {
        SourceRecord::Call(row) => row.modified_at,
        SourceRecord::Transcript(row) => row.modified_at,
        SourceRecord::Speaker(row) => row.modified_at,
        SourceRecord::Email(row) => row.modified_at,
        SourceRecord::Opportunity(row) => row.modified_at,
    }
}

/// Scripted reader: serves a fixed dataset through the same cursor contract
/// as the warehouse readers, optionally failing the first N reads.
struct FakeReader {
    entity: EntityKind,
    records: Vec<SourceRecord>,
    fail_reads: AtomicU32,
}

impl FakeReader {
    fn new(entity: EntityKind, records: Vec<SourceRecord>) -> Self {
        Self {
            entity,
            records,
            fail_reads: AtomicU32::new(0),
        }
    }

    fn failing_first(self, reads: u32) -> Self {
        self.fail_reads.store(reads, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl SourceReader for FakeReader {
    fn entity(&self) -> EntityKind {
        self.entity
    }

    async fn read(
        &self,
        since: DateTimeUtc,
        limit: u64,
    ) -> Result<Vec<SourceRecord>, SyncError> {
        let remaining = self.fail_reads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_reads.store(remaining - 1, Ordering::SeqCst);
            return Err(SyncError::transient("scripted read failure"));
        }

        let mut window: Vec<SourceRecord> = self
            .records
            .iter()
            .filter(|r| modified_of(r).is_none_or(|m| m >= since))
            .cloned()
            .collect();
        window.sort_by_key(|r| modified_of(r));
        window.truncate(limit as usize);
        Ok(window)
    }
}

async fn memory_db() -> Arc<DatabaseConnection> {
    // One pooled connection so every task sees the same in-memory database.
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1);
    let db = Database::connect(options).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    Arc::new(db)
}

fn test_config() -> AppConfig {
    AppConfig {
        retry: RetryPolicyConfig {
            max_attempts: 3,
            base_seconds: 0,
            max_seconds: 1,
            jitter_factor: 0.0,
        },
        ..AppConfig::default()
    }
}

fn call(id: &str, title: &str, modified: DateTimeUtc) -> SourceRecord {
    SourceRecord::Call(CallRow {
        id: Some(id.to_string()),
        title: Some(title.to_string()),
        direction: Some("outbound".to_string()),
        context: Some(json!([
            {"objectType": "Opportunity", "objectId": "opp-1"},
        ])),
        modified_at: Some(modified),
        ..CallRow::default()
    })
}

fn opportunity(id: Option<&str>, modified: Option<DateTimeUtc>) -> SourceRecord {
    SourceRecord::Opportunity(OpportunityRow {
        id: id.map(str::to_string),
        name: id.map(|i| format!("deal {i}")),
        stage: Some("negotiation".to_string()),
        amount: Some("12,500.00".to_string()),
        modified_at: modified,
        ..OpportunityRow::default()
    })
}

#[tokio::test]
async fn first_run_backfills_and_sets_checkpoint() {
    let db = memory_db().await;
    let reader: Arc<dyn SourceReader> = Arc::new(FakeReader::new(
        EntityKind::Calls,
        vec![
            call("call-1", "kickoff", ts(1, 9)),
            call("call-2", "pricing", ts(1, 10)),
            call("call-3", "closing", ts(1, 11)),
        ],
    ));
    let orchestrator = Orchestrator::new(db.clone(), vec![reader], test_config());

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.status, RunStatus::Succeeded);
    assert_eq!(Call::find().count(db.as_ref()).await.unwrap(), 3);

    let checkpoint = SyncCheckpoint::find_by_id("calls")
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.last_cursor, ts(1, 11));
    assert_eq!(checkpoint.status, "success");

    let lock = SyncRun::find_by_id("pipeline")
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lock.status, "succeeded");
    assert!(lock.summary.is_some());
}

#[tokio::test]
async fn rerun_without_new_data_is_idempotent() {
    let db = memory_db().await;
    let records = vec![
        call("call-1", "kickoff", ts(1, 9)),
        call("call-2", "pricing", ts(1, 10)),
    ];
    let reader: Arc<dyn SourceReader> = Arc::new(FakeReader::new(EntityKind::Calls, records.clone()));
    let orchestrator = Orchestrator::new(db.clone(), vec![reader], test_config());
    orchestrator.run().await.unwrap();

    let reader: Arc<dyn SourceReader> = Arc::new(FakeReader::new(EntityKind::Calls, records));
    let orchestrator = Orchestrator::new(db.clone(), vec![reader], test_config());
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.status, RunStatus::Succeeded);
    assert_eq!(Call::find().count(db.as_ref()).await.unwrap(), 2);
    let checkpoint = SyncCheckpoint::find_by_id("calls")
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.last_cursor, ts(1, 10));
}

#[tokio::test]
async fn records_tied_at_the_cursor_are_not_skipped() {
    let db = memory_db().await;
    let tied = ts(1, 9);
    let reader: Arc<dyn SourceReader> = Arc::new(FakeReader::new(
        EntityKind::Calls,
        vec![
            call("call-1", "kickoff", tied),
            call("call-2", "pricing", tied),
        ],
    ));
    Orchestrator::new(db.clone(), vec![reader], test_config())
        .run()
        .await
        .unwrap();

    let checkpoint = SyncCheckpoint::find_by_id("calls")
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.last_cursor, tied);

    // A third record lands late in the source with the same timestamp the
    // cursor already points at. The inclusive lower bound must pick it up.
    let reader: Arc<dyn SourceReader> = Arc::new(FakeReader::new(
        EntityKind::Calls,
        vec![
            call("call-1", "kickoff", tied),
            call("call-2", "pricing", tied),
            call("call-3", "closing", tied),
        ],
    ));
    let summary = Orchestrator::new(db.clone(), vec![reader], test_config())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Succeeded);
    assert_eq!(Call::find().count(db.as_ref()).await.unwrap(), 3);
    assert!(
        Call::find_by_id("call-3")
            .one(db.as_ref())
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn updated_source_record_merges_into_existing_row() {
    let db = memory_db().await;
    let reader: Arc<dyn SourceReader> = Arc::new(FakeReader::new(
        EntityKind::Calls,
        vec![call("call-1", "kickoff", ts(1, 9))],
    ));
    Orchestrator::new(db.clone(), vec![reader], test_config())
        .run()
        .await
        .unwrap();

    // Same natural key, newer modification: must update in place.
    let reader: Arc<dyn SourceReader> = Arc::new(FakeReader::new(
        EntityKind::Calls,
        vec![call("call-1", "kickoff (renamed)", ts(2, 8))],
    ));
    Orchestrator::new(db.clone(), vec![reader], test_config())
        .run()
        .await
        .unwrap();

    assert_eq!(Call::find().count(db.as_ref()).await.unwrap(), 1);
    let stored = Call::find_by_id("call-1")
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.title.as_deref(), Some("kickoff (renamed)"));
    assert_eq!(stored.source_modified_at, ts(2, 8));

    let checkpoint = SyncCheckpoint::find_by_id("calls")
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.last_cursor, ts(2, 8));
}

#[tokio::test]
async fn invalid_records_are_dead_lettered_and_rest_commit() {
    let db = memory_db().await;
    let reader: Arc<dyn SourceReader> = Arc::new(FakeReader::new(
        EntityKind::Opportunities,
        vec![
            opportunity(Some("opp-1"), Some(ts(1, 9))),
            opportunity(None, Some(ts(1, 10))),
            opportunity(Some("opp-3"), None),
            opportunity(Some("opp-4"), Some(ts(1, 11))),
        ],
    ));
    let orchestrator = Orchestrator::new(db.clone(), vec![reader], test_config());

    let summary = orchestrator.run().await.unwrap();

    // The unit still commits: dead letters surface on the checkpoint and in
    // the dead-letter table, not as a run failure.
    assert_eq!(summary.status, RunStatus::Succeeded);
    let unit = &summary.units[0];
    assert_eq!(unit.state, UnitState::Committed);
    assert_eq!(unit.dead_lettered, 2);
    assert_eq!(Opportunity::find().count(db.as_ref()).await.unwrap(), 2);
    assert_eq!(DeadLetter::find().count(db.as_ref()).await.unwrap(), 2);

    let entries = DeadLetter::find().all(db.as_ref()).await.unwrap();
    assert!(entries.iter().all(|e| e.entity_type == "opportunities"));
    assert!(entries.iter().all(|e| e.payload.is_some()));
    assert!(entries.iter().any(|e| e.natural_key.is_none()));
    assert!(
        entries
            .iter()
            .any(|e| e.natural_key.as_deref() == Some("opp-3"))
    );

    // The amount string with thousands separators was coerced.
    let stored = Opportunity::find_by_id("opp-1")
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.amount, Some(12500.0));

    let checkpoint = SyncCheckpoint::find_by_id("opportunities")
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.status, "partial");
    assert_eq!(checkpoint.last_cursor, ts(1, 11));
}

#[tokio::test]
async fn transient_read_failures_are_retried_without_duplicates() {
    let db = memory_db().await;
    let reader: Arc<dyn SourceReader> = Arc::new(
        FakeReader::new(
            EntityKind::Calls,
            vec![
                call("call-1", "kickoff", ts(1, 9)),
                call("call-2", "pricing", ts(1, 10)),
            ],
        )
        .failing_first(2),
    );
    let orchestrator = Orchestrator::new(db.clone(), vec![reader], test_config());

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.status, RunStatus::Succeeded);
    assert_eq!(Call::find().count(db.as_ref()).await.unwrap(), 2);
    assert_eq!(DeadLetter::find().count(db.as_ref()).await.unwrap(), 0);
}

#[tokio::test]
async fn exhausted_retries_fail_one_unit_but_not_the_run() {
    let db = memory_db().await;
    let broken: Arc<dyn SourceReader> = Arc::new(
        FakeReader::new(EntityKind::Calls, vec![call("call-1", "kickoff", ts(1, 9))])
            .failing_first(100),
    );
    let healthy: Arc<dyn SourceReader> = Arc::new(FakeReader::new(
        EntityKind::Opportunities,
        vec![opportunity(Some("opp-1"), Some(ts(1, 9)))],
    ));
    let orchestrator = Orchestrator::new(db.clone(), vec![broken, healthy], test_config());

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.status, RunStatus::PartiallySucceeded);
    let calls_unit = summary
        .units
        .iter()
        .find(|u| u.entity == EntityKind::Calls)
        .unwrap();
    assert_eq!(calls_unit.state, UnitState::Failed);
    assert!(calls_unit.error.is_some());

    assert_eq!(Call::find().count(db.as_ref()).await.unwrap(), 0);
    assert_eq!(Opportunity::find().count(db.as_ref()).await.unwrap(), 1);

    // The failed unit's checkpoint records the failure without moving.
    let checkpoint = SyncCheckpoint::find_by_id("calls")
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.status, "failed");
    assert_eq!(checkpoint.last_cursor, chrono::DateTime::UNIX_EPOCH);

    // The sibling unit is untouched by the failure: its checkpoint advanced.
    let checkpoint = SyncCheckpoint::find_by_id("opportunities")
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.status, "success");
    assert_eq!(checkpoint.last_cursor, ts(1, 9));
}

#[tokio::test]
async fn email_without_recipients_lands_with_empty_array() {
    let db = memory_db().await;
    let reader: Arc<dyn SourceReader> = Arc::new(FakeReader::new(
        EntityKind::Emails,
        vec![SourceRecord::Email(EmailRow {
            id: Some("em-1".to_string()),
            sender: Some("rep@example.com".to_string()),
            subject: Some("Renewal terms".to_string()),
            modified_at: Some(ts(1, 9)),
            ..EmailRow::default()
        })],
    ));
    let orchestrator = Orchestrator::new(db.clone(), vec![reader], test_config());

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.status, RunStatus::Succeeded);
    let stored = Email::find_by_id("em-1")
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.recipients, json!([]));
    assert_eq!(stored.opportunity_external_id, None);
}

#[tokio::test]
async fn concurrent_entities_all_land_under_one_run() {
    let db = memory_db().await;
    let readers: Vec<Arc<dyn SourceReader>> = vec![
        Arc::new(FakeReader::new(
            EntityKind::Calls,
            vec![call("call-1", "kickoff", ts(1, 9))],
        )),
        Arc::new(FakeReader::new(
            EntityKind::Emails,
            vec![SourceRecord::Email(EmailRow {
                id: Some("em-1".to_string()),
                recipients: vec!["buyer@example.com".to_string()],
                modified_at: Some(ts(1, 9)),
                ..EmailRow::default()
            })],
        )),
        Arc::new(FakeReader::new(
            EntityKind::Opportunities,
            vec![opportunity(Some("opp-1"), Some(ts(1, 9)))],
        )),
    ];
    let orchestrator = Orchestrator::new(db.clone(), readers, test_config());

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.status, RunStatus::Succeeded);
    assert_eq!(summary.units.len(), 3);
    assert_eq!(Call::find().count(db.as_ref()).await.unwrap(), 1);
    assert_eq!(Email::find().count(db.as_ref()).await.unwrap(), 1);
    assert_eq!(Opportunity::find().count(db.as_ref()).await.unwrap(), 1);
}

#[tokio::test]
async fn held_run_lock_rejects_a_second_invocation() {
    let db = memory_db().await;
    let reader: Arc<dyn SourceReader> = Arc::new(FakeReader::new(
        EntityKind::Calls,
        vec![call("call-1", "kickoff", ts(1, 9))],
    ));
    let orchestrator = Orchestrator::new(db.clone(), vec![reader], test_config());

    // Simulate a live concurrent run by claiming the lock out of band.
    use revsync::models::sync_run;
    use sea_orm::ActiveValue::Set;
    let held = sync_run::ActiveModel {
        id: Set("pipeline".to_string()),
        status: Set("running".to_string()),
        locked_at: Set(Some(Utc::now())),
        started_at: Set(Some(Utc::now())),
        finished_at: Set(None),
        summary: Set(None),
        updated_at: Set(Utc::now()),
    };
    SyncRun::insert(held).exec(db.as_ref()).await.unwrap();

    let err = orchestrator.run().await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(Call::find().count(db.as_ref()).await.unwrap(), 0);
}

#[tokio::test]
async fn stale_run_lock_is_reclaimed_after_ttl() {
    let db = memory_db().await;
    let reader: Arc<dyn SourceReader> = Arc::new(FakeReader::new(
        EntityKind::Calls,
        vec![call("call-1", "kickoff", ts(1, 9))],
    ));
    let orchestrator = Orchestrator::new(db.clone(), vec![reader], test_config());

    // An abandoned lock, older than the TTL.
    use revsync::models::sync_run;
    use sea_orm::ActiveValue::Set;
    let stale = sync_run::ActiveModel {
        id: Set("pipeline".to_string()),
        status: Set("running".to_string()),
        locked_at: Set(Some(Utc::now() - chrono::Duration::hours(3))),
        started_at: Set(Some(Utc::now() - chrono::Duration::hours(3))),
        finished_at: Set(None),
        summary: Set(None),
        updated_at: Set(Utc::now()),
    };
    SyncRun::insert(stale).exec(db.as_ref()).await.unwrap();

    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.status, RunStatus::Succeeded);
    assert_eq!(Call::find().count(db.as_ref()).await.unwrap(), 1);
}
