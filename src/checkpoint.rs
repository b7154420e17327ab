//! Per-entity sync checkpoint store.
//!
//! Each entity type owns one row in `sync_checkpoints` holding the cursor
//! high-water mark and the outcome of its most recent run. The cursor is
//! monotonically non-decreasing: a write that would move it backwards keeps
//! the stored value and logs a warning instead.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::prelude::DateTimeUtc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait};
use tracing::warn;

use crate::error::{SyncError, classify_db_err};
use crate::models::{SyncCheckpoint, sync_checkpoint};
use crate::source::EntityKind;

/// Outcome of an entity's most recent run, as recorded on its checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Success,
    Partial,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Partial => "partial",
            SyncStatus::Failed => "failed",
        }
    }
}

#[derive(Clone)]
pub struct CheckpointStore {
    db: Arc<DatabaseConnection>,
}

impl CheckpointStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Load the checkpoint for an entity. An entity that has never synced
    /// gets a synthetic checkpoint at the Unix epoch, so its first run is a
    /// full backfill.
    pub async fn get(&self, entity: EntityKind) -> Result<sync_checkpoint::Model, SyncError> {
        let found = SyncCheckpoint::find_by_id(entity.as_str())
            .one(self.db.as_ref())
            .await
            .map_err(|err| classify_db_err(&err))?;

        Ok(found.unwrap_or_else(|| sync_checkpoint::Model {
            entity_type: entity.as_str().to_string(),
            last_cursor: DateTime::<Utc>::UNIX_EPOCH,
            items_synced: 0,
            error_count: 0,
            status: SyncStatus::Success.as_str().to_string(),
            updated_at: Utc::now(),
        }))
    }

    /// Persist the checkpoint for an entity, clamping the cursor so it never
    /// moves backwards. Returns the cursor actually stored.
    pub async fn set(
        &self,
        entity: EntityKind,
        cursor: DateTimeUtc,
        items_synced: i64,
        error_count: i32,
        status: SyncStatus,
    ) -> Result<DateTimeUtc, SyncError> {
        let current = self.get(entity).await?;
        let effective = if cursor < current.last_cursor {
            warn!(
                entity = %entity,
                requested = %cursor,
                stored = %current.last_cursor,
                "refusing to move checkpoint cursor backwards"
            );
            current.last_cursor
        } else {
            cursor
        };

        let active = sync_checkpoint::ActiveModel {
            entity_type: Set(entity.as_str().to_string()),
            last_cursor: Set(effective),
            items_synced: Set(items_synced),
            error_count: Set(error_count),
            status: Set(status.as_str().to_string()),
            updated_at: Set(Utc::now()),
        };

        SyncCheckpoint::insert(active)
            .on_conflict(
                OnConflict::column(sync_checkpoint::Column::EntityType)
                    .update_columns([
                        sync_checkpoint::Column::LastCursor,
                        sync_checkpoint::Column::ItemsSynced,
                        sync_checkpoint::Column::ErrorCount,
                        sync_checkpoint::Column::Status,
                        sync_checkpoint::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(self.db.as_ref())
            .await
            .map_err(|err| classify_db_err(&err))?;

        Ok(effective)
    }
}
