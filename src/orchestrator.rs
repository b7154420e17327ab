//! Run orchestration: lock, fan out sync units, aggregate.
//!
//! A run claims the single `sync_runs` lock row before touching any entity.
//! Claiming is one atomic conditional UPDATE, so two invocations racing for
//! the lock cannot both win; a `running` lock older than the TTL is treated
//! as abandoned and reclaimed. Units then run concurrently under a semaphore
//! and the run result is the aggregate of their reports.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use metrics::counter;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::checkpoint::CheckpointStore;
use crate::config::AppConfig;
use crate::dead_letter::DeadLetterSink;
use crate::error::{SyncError, classify_db_err};
use crate::models::{SyncRun, sync_run};
use crate::retry::RetryController;
use crate::source::{EntityKind, SourceReader};
use crate::unit::{SyncUnit, UnitReport, UnitState};
use crate::writer::UpsertWriter;

/// Identifier of the single lock row all invocations contend on.
const RUN_LOCK_ID: &str = "pipeline";

/// Terminal outcome of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    PartiallySucceeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::PartiallySucceeded => "partially_succeeded",
            RunStatus::Failed => "failed",
        }
    }
}

/// Aggregate result of one run, persisted on the lock row as JSON.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub units: Vec<UnitReport>,
}

impl RunSummary {
    pub fn is_full_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

pub struct Orchestrator {
    dest: Arc<DatabaseConnection>,
    readers: Vec<Arc<dyn SourceReader>>,
    config: AppConfig,
}

impl Orchestrator {
    pub fn new(
        dest: Arc<DatabaseConnection>,
        readers: Vec<Arc<dyn SourceReader>>,
        config: AppConfig,
    ) -> Self {
        Self {
            dest,
            readers,
            config,
        }
    }

    /// Execute one full run. Fails without touching any entity when another
    /// invocation holds the run lock.
    #[tracing::instrument(skip_all)]
    pub async fn run(&self) -> Result<RunSummary, SyncError> {
        let run_id = Uuid::new_v4();
        self.claim_lock().await?;
        info!(%run_id, units = self.readers.len(), "run lock claimed, starting sync run");

        let cancel = CancellationToken::new();
        let deadline = self.spawn_deadline(cancel.clone());

        let checkpoints = CheckpointStore::new(self.dest.clone());
        let writer = UpsertWriter::new(self.dest.clone());
        let sink = DeadLetterSink::new(self.dest.clone());
        let retry = RetryController::new(self.config.retry.clone());

        let semaphore = Arc::new(Semaphore::new(self.config.pipeline.max_parallel_units));
        let mut handles: Vec<(EntityKind, JoinHandle<UnitReport>)> = Vec::new();
        for reader in &self.readers {
            let entity = reader.entity();
            let unit = SyncUnit::new(
                reader.clone(),
                checkpoints.clone(),
                writer.clone(),
                sink.clone(),
                retry.clone(),
                self.config.pipeline.batch_size,
                cancel.clone(),
            );
            let semaphore = semaphore.clone();
            let handle = tokio::spawn(async move {
                // The semaphore is never closed while units are in flight.
                let _permit = semaphore.acquire_owned().await.ok();
                unit.run().await
            });
            handles.push((entity, handle));
        }

        let mut units = Vec::with_capacity(handles.len());
        for (entity, handle) in handles {
            match handle.await {
                Ok(report) => units.push(report),
                Err(join_err) => {
                    error!(entity = %entity, error = %join_err, "sync unit task aborted");
                    units.push(UnitReport {
                        entity,
                        state: UnitState::Failed,
                        rows_read: 0,
                        rows_written: 0,
                        dead_lettered: 0,
                        final_cursor: chrono::DateTime::UNIX_EPOCH,
                        duration_ms: 0,
                        error: Some(join_err.to_string()),
                    });
                }
            }
        }
        deadline.abort();

        let summary = RunSummary {
            run_id,
            status: aggregate_status(&units),
            units,
        };
        self.release_lock(&summary).await;

        counter!("revsync_runs_total", "status" => summary.status.as_str()).increment(1);
        info!(
            %run_id,
            status = summary.status.as_str(),
            rows_written = summary.units.iter().map(|u| u.rows_written).sum::<u64>(),
            dead_lettered = summary.units.iter().map(|u| u.dead_lettered).sum::<u64>(),
            "sync run finished"
        );
        Ok(summary)
    }

    /// Claim the run lock with a single conditional UPDATE.
    async fn claim_lock(&self) -> Result<(), SyncError> {
        let now = Utc::now();

        // Make sure the lock row exists; racing inserts collapse on the key.
        let seed = sync_run::ActiveModel {
            id: Set(RUN_LOCK_ID.to_string()),
            status: Set("idle".to_string()),
            locked_at: Set(None),
            started_at: Set(None),
            finished_at: Set(None),
            summary: Set(None),
            updated_at: Set(now),
        };
        SyncRun::insert(seed)
            .on_conflict(
                OnConflict::column(sync_run::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.dest.as_ref())
            .await
            .map_err(|err| classify_db_err(&err))?;

        let stale_before = now - ChronoDuration::seconds(self.config.pipeline.lock_ttl_seconds as i64);
        let claimed = SyncRun::update_many()
            .col_expr(sync_run::Column::Status, Expr::value("running"))
            .col_expr(sync_run::Column::LockedAt, Expr::value(now))
            .col_expr(sync_run::Column::StartedAt, Expr::value(now))
            .col_expr(sync_run::Column::UpdatedAt, Expr::value(now))
            .filter(sync_run::Column::Id.eq(RUN_LOCK_ID))
            .filter(
                Condition::any()
                    .add(sync_run::Column::Status.ne("running"))
                    .add(sync_run::Column::LockedAt.is_null())
                    .add(sync_run::Column::LockedAt.lt(stale_before)),
            )
            .exec(self.dest.as_ref())
            .await
            .map_err(|err| classify_db_err(&err))?;

        if claimed.rows_affected == 1 {
            Ok(())
        } else {
            Err(SyncError::permanent(
                "another invocation holds the run lock",
            ))
        }
    }

    /// Write the terminal status and summary back to the lock row.
    /// Best effort: a failure here leaves a stale `running` lock that the
    /// TTL reclaim absorbs on the next invocation.
    async fn release_lock(&self, summary: &RunSummary) {
        let now = Utc::now();
        let summary_json = serde_json::to_value(summary).unwrap_or(serde_json::Value::Null);
        let result = SyncRun::update_many()
            .col_expr(
                sync_run::Column::Status,
                Expr::value(summary.status.as_str()),
            )
            .col_expr(sync_run::Column::FinishedAt, Expr::value(now))
            .col_expr(sync_run::Column::Summary, Expr::value(summary_json))
            .col_expr(sync_run::Column::UpdatedAt, Expr::value(now))
            .filter(sync_run::Column::Id.eq(RUN_LOCK_ID))
            .exec(self.dest.as_ref())
            .await;
        if let Err(err) = result {
            error!(error = %err, "failed to release run lock");
        }
    }

    fn spawn_deadline(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let budget = std::time::Duration::from_secs(self.config.pipeline.max_run_seconds);
        tokio::spawn(async move {
            tokio::time::sleep(budget).await;
            warn!(
                budget_seconds = budget.as_secs(),
                "run exceeded its time budget, cancelling remaining units"
            );
            cancel.cancel();
        })
    }
}

/// Fold unit outcomes into the run status: every unit committed is a
/// success (dead-lettered records are reported on the checkpoint, not
/// here), failure everywhere is a failure, anything in between is partial.
fn aggregate_status(units: &[UnitReport]) -> RunStatus {
    if units.iter().all(|u| u.is_committed()) {
        RunStatus::Succeeded
    } else if !units.is_empty() && units.iter().all(|u| u.is_terminal_failure()) {
        RunStatus::Failed
    } else {
        RunStatus::PartiallySucceeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(state: UnitState, dead_lettered: u64) -> UnitReport {
        UnitReport {
            entity: EntityKind::Calls,
            state,
            rows_read: 10,
            rows_written: 10 - dead_lettered,
            dead_lettered,
            final_cursor: chrono::DateTime::UNIX_EPOCH,
            duration_ms: 5,
            error: None,
        }
    }

    #[test]
    fn all_committed_units_mean_success() {
        let units = vec![report(UnitState::Committed, 0), report(UnitState::Committed, 0)];
        assert_eq!(aggregate_status(&units), RunStatus::Succeeded);
    }

    #[test]
    fn committed_units_with_dead_letters_still_succeed() {
        let units = vec![report(UnitState::Committed, 0), report(UnitState::Committed, 2)];
        assert_eq!(aggregate_status(&units), RunStatus::Succeeded);
    }

    #[test]
    fn fully_dead_lettered_unit_downgrades_to_partial() {
        let units = vec![
            report(UnitState::Committed, 0),
            report(UnitState::DeadLettered, 10),
        ];
        assert_eq!(aggregate_status(&units), RunStatus::PartiallySucceeded);
    }

    #[test]
    fn one_failed_unit_is_partial_when_others_land() {
        let units = vec![report(UnitState::Committed, 0), report(UnitState::Failed, 0)];
        assert_eq!(aggregate_status(&units), RunStatus::PartiallySucceeded);
    }

    #[test]
    fn all_failed_units_fail_the_run() {
        let units = vec![report(UnitState::Failed, 0), report(UnitState::Failed, 0)];
        assert_eq!(aggregate_status(&units), RunStatus::Failed);
    }

    #[test]
    fn empty_unit_set_counts_as_success() {
        assert_eq!(aggregate_status(&[]), RunStatus::Succeeded);
    }
}
