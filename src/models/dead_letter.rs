//! DeadLetter entity model
//!
//! Append-only store for records that failed mapping validation or isolated
//! per-row writes.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeUtc;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Dead-lettered record with its failure reason
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "dead_letters")]
pub struct Model {
    /// Unique identifier for the dead-letter entry (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Entity type the record belonged to
    pub entity_type: String,

    /// Natural key of the offending record, when it carried one
    pub natural_key: Option<String>,

    /// Human-readable failure reason
    pub reason: String,

    /// Raw record payload for later inspection or reprocessing
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Option<JsonValue>,

    /// Timestamp when the failure occurred
    pub occurred_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
