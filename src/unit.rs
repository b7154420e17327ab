//! Per-entity sync unit.
//!
//! One unit drives one entity type through its batch loop: read a
//! cursor-bounded window, map it, dead-letter validation failures, upsert the
//! rest, and advance the checkpoint. The checkpoint moves after every durably
//! written batch, so a unit interrupted mid-run resumes from its last
//! committed batch instead of its starting cursor.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use sea_orm::prelude::DateTimeUtc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointStore, SyncStatus};
use crate::dead_letter::DeadLetterSink;
use crate::mapper::{MappedRecord, map_record};
use crate::retry::RetryController;
use crate::source::{EntityKind, SourceReader};
use crate::writer::UpsertWriter;

/// Lifecycle of one sync unit within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Pending,
    Reading,
    Mapping,
    Writing,
    /// All batches landed; some records may still have been dead-lettered.
    Committed,
    /// Every record the reader produced was dead-lettered.
    DeadLettered,
    Failed,
}

/// Outcome of one sync unit.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UnitReport {
    pub entity: EntityKind,
    pub state: UnitState,
    pub rows_read: u64,
    pub rows_written: u64,
    pub dead_lettered: u64,
    pub final_cursor: DateTimeUtc,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl UnitReport {
    /// A committed unit counts toward run success even when individual
    /// records were dead-lettered; those surface on the checkpoint status
    /// and in the dead-letter table, not as a unit failure.
    pub fn is_committed(&self) -> bool {
        self.state == UnitState::Committed
    }

    pub fn is_terminal_failure(&self) -> bool {
        self.state == UnitState::Failed
    }
}

pub struct SyncUnit {
    reader: Arc<dyn SourceReader>,
    checkpoints: CheckpointStore,
    writer: UpsertWriter,
    sink: DeadLetterSink,
    retry: RetryController,
    batch_size: u64,
    cancel: CancellationToken,
}

impl SyncUnit {
    pub fn new(
        reader: Arc<dyn SourceReader>,
        checkpoints: CheckpointStore,
        writer: UpsertWriter,
        sink: DeadLetterSink,
        retry: RetryController,
        batch_size: u64,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reader,
            checkpoints,
            writer,
            sink,
            retry,
            batch_size,
            cancel,
        }
    }

    /// Run the unit to completion. Never panics the run: every failure path
    /// folds into the returned report.
    #[tracing::instrument(skip_all, fields(entity = %self.reader.entity()))]
    pub async fn run(self) -> UnitReport {
        let entity = self.reader.entity();
        let started = Instant::now();

        let mut report = UnitReport {
            entity,
            state: UnitState::Pending,
            rows_read: 0,
            rows_written: 0,
            dead_lettered: 0,
            final_cursor: DateTimeUtc::UNIX_EPOCH,
            duration_ms: 0,
            error: None,
        };

        match self.drive(entity, &mut report).await {
            Ok(()) => {}
            Err(message) => {
                report.state = UnitState::Failed;
                report.error = Some(message);
                // Best effort: record the failure on the checkpoint without
                // moving the cursor. The clamp makes this safe to repeat.
                if let Err(err) = self
                    .checkpoints
                    .set(
                        entity,
                        report.final_cursor,
                        report.rows_written as i64,
                        report.dead_lettered as i32,
                        SyncStatus::Failed,
                    )
                    .await
                {
                    warn!(entity = %entity, error = %err, "failed to record checkpoint failure status");
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        histogram!("revsync_unit_duration_seconds", "entity" => entity.as_str())
            .record(started.elapsed().as_secs_f64());
        info!(
            entity = %entity,
            state = ?report.state,
            rows_read = report.rows_read,
            rows_written = report.rows_written,
            dead_lettered = report.dead_lettered,
            final_cursor = %report.final_cursor,
            duration_ms = report.duration_ms,
            error = report.error.as_deref().unwrap_or(""),
            "sync unit finished"
        );
        report
    }

    async fn drive(&self, entity: EntityKind, report: &mut UnitReport) -> Result<(), String> {
        let mut cursor = self
            .checkpoints
            .get(entity)
            .await
            .map_err(|err| format!("loading checkpoint: {err}"))?
            .last_cursor;
        report.final_cursor = cursor;

        loop {
            if self.cancel.is_cancelled() {
                return Err("run cancelled before the unit finished".to_string());
            }

            report.state = UnitState::Reading;
            let batch = self
                .retry
                .run(entity, "read", || self.reader.read(cursor, self.batch_size))
                .await
                .map_err(|err| format!("reading source: {err}"))?;
            if batch.is_empty() {
                break;
            }
            let batch_len = batch.len() as u64;
            report.rows_read += batch_len;
            counter!("revsync_rows_read_total", "entity" => entity.as_str())
                .increment(batch_len);

            report.state = UnitState::Mapping;
            let mut mapped: Vec<MappedRecord> = Vec::with_capacity(batch.len());
            let mut batch_high_water: Option<DateTimeUtc> = None;
            for record in &batch {
                // Track the raw high-water mark too, so a batch that is
                // entirely dead-lettered can still move past itself.
                if let Some(ts) = record_modified_at(record) {
                    batch_high_water = Some(batch_high_water.map_or(ts, |hw| hw.max(ts)));
                }
                match map_record(record) {
                    Ok(mapped_record) => mapped.push(mapped_record),
                    Err(err) => {
                        report.dead_lettered += 1;
                        self.sink
                            .record(
                                entity,
                                err.natural_key(),
                                &err.to_string(),
                                Some(record.payload_json()),
                            )
                            .await;
                    }
                }
            }

            report.state = UnitState::Writing;
            let write_report = self
                .retry
                .run(entity, "write", || self.writer.write(mapped.clone()))
                .await
                .map_err(|err| format!("writing destination: {err}"))?;
            report.rows_written += write_report.written;
            counter!("revsync_rows_written_total", "entity" => entity.as_str())
                .increment(write_report.written);
            for failure in write_report.failures {
                report.dead_lettered += 1;
                self.sink
                    .record(
                        entity,
                        Some(&failure.natural_key),
                        &failure.reason,
                        failure.payload,
                    )
                    .await;
            }

            let running_status = if report.dead_lettered > 0 {
                SyncStatus::Partial
            } else {
                SyncStatus::Success
            };
            if let Some(high_water) = batch_high_water {
                if high_water > cursor {
                    cursor = self
                        .checkpoints
                        .set(
                            entity,
                            high_water,
                            report.rows_written as i64,
                            report.dead_lettered as i32,
                            running_status,
                        )
                        .await
                        .map_err(|err| format!("advancing checkpoint: {err}"))?;
                    report.final_cursor = cursor;
                } else if batch_len >= self.batch_size {
                    // A full window of boundary ties cannot make progress.
                    warn!(
                        entity = %entity,
                        cursor = %cursor,
                        batch = batch_len,
                        "cursor stalled on a full batch of boundary ties, stopping unit"
                    );
                    break;
                }
            } else if batch_len >= self.batch_size {
                // A full window without a single usable timestamp cannot
                // advance the cursor either.
                warn!(
                    entity = %entity,
                    cursor = %cursor,
                    batch = batch_len,
                    "cursor stalled on a full batch without modification timestamps, stopping unit"
                );
                break;
            }

            if batch_len < self.batch_size {
                break;
            }
        }

        let final_status = if report.dead_lettered > 0 {
            SyncStatus::Partial
        } else {
            SyncStatus::Success
        };
        self.checkpoints
            .set(
                entity,
                cursor,
                report.rows_written as i64,
                report.dead_lettered as i32,
                final_status,
            )
            .await
            .map_err(|err| format!("finalizing checkpoint: {err}"))?;
        report.final_cursor = cursor;

        report.state = if report.rows_read > 0
            && report.rows_written == 0
            && report.dead_lettered >= report.rows_read
        {
            UnitState::DeadLettered
        } else {
            UnitState::Committed
        };
        Ok(())
    }
}

fn record_modified_at(record: &crate::source::SourceRecord) -> Option<DateTimeUtc> {
    use crate::source::SourceRecord;
    match record {
        SourceRecord::Call(row) => row.modified_at,
        SourceRecord::Transcript(row) => row.modified_at,
        SourceRecord::Speaker(row) => row.modified_at,
        SourceRecord::Email(row) => row.modified_at,
        SourceRecord::Opportunity(row) => row.modified_at,
    }
}
