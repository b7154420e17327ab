//! Call entity model
//!
//! This module contains the SeaORM entity model for the calls table, the
//! primary conversation entity replicated from the warehouse.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeUtc;
use serde_json::Value as JsonValue;

/// Call entity keyed by the external call identifier
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "calls")]
pub struct Model {
    /// Natural key: the call identifier assigned by the source system
    #[sea_orm(primary_key, auto_increment = false)]
    pub external_id: String,

    /// Call title as recorded at capture time
    pub title: Option<String>,

    /// Timestamp when the call started
    pub started_at: Option<DateTimeUtc>,

    /// Call duration in seconds
    pub duration_seconds: Option<i32>,

    /// Call direction (inbound, outbound, conference)
    pub direction: Option<String>,

    /// Identifier of the call's primary internal participant
    pub primary_user_id: Option<String>,

    /// Modification timestamp in the source system; drives the sync cursor
    pub source_modified_at: DateTimeUtc,

    /// Catch-all structured payload preserving the raw source record
    #[sea_orm(column_type = "JsonBinary")]
    pub raw: Option<JsonValue>,

    /// Timestamp when this row was last written by the pipeline
    pub synced_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
