//! SyncCheckpoint entity model
//!
//! One row per entity type holding the cursor high-water mark and the outcome
//! of the most recent run.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeUtc;

/// Per-entity sync checkpoint
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_checkpoints")]
pub struct Model {
    /// Entity type identifier (calls, transcripts, speakers, emails, opportunities)
    #[sea_orm(primary_key, auto_increment = false)]
    pub entity_type: String,

    /// High-water mark of successfully synced source modification timestamps.
    /// Monotonically non-decreasing; only advanced after the corresponding
    /// batch is durably written.
    pub last_cursor: DateTimeUtc,

    /// Items written during the most recent run
    pub items_synced: i64,

    /// Errors (dead-lettered plus isolated row failures) during the most
    /// recent run
    pub error_count: i32,

    /// Outcome of the most recent run (success, partial, failed)
    pub status: String,

    /// Timestamp when the checkpoint was last written
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
