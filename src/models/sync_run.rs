//! SyncRun entity model
//!
//! A single well-known row (`id = "pipeline"`) serves as the run-level
//! concurrency lock and records the last run summary.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeUtc;
use serde_json::Value as JsonValue;

/// Run lock and last-run summary row
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_runs")]
pub struct Model {
    /// Lock identifier; the pipeline uses the single row "pipeline"
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Run state (idle, running, succeeded, partially_succeeded, failed)
    pub status: String,

    /// Timestamp the lock was taken; a running lock older than the TTL is
    /// considered abandoned and may be reclaimed
    pub locked_at: Option<DateTimeUtc>,

    /// Timestamp the current or last run started
    pub started_at: Option<DateTimeUtc>,

    /// Timestamp the last run finished
    pub finished_at: Option<DateTimeUtc>,

    /// Structured per-entity summary of the last run
    #[sea_orm(column_type = "JsonBinary")]
    pub summary: Option<JsonValue>,

    /// Timestamp when the row was last updated
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
