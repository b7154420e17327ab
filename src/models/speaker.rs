//! Speaker entity model
//!
//! Per-call participants with an identity resolved from the warehouse users
//! table where a match exists.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeUtc;
use serde_json::Value as JsonValue;

/// Speaker entity keyed by the external participant identifier
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "speakers")]
pub struct Model {
    /// Natural key: the participant identifier assigned by the source system
    #[sea_orm(primary_key, auto_increment = false)]
    pub external_id: String,

    /// External identifier of the call this speaker participated in
    pub call_external_id: String,

    /// Resolved display name; null when the users join found no match
    pub display_name: Option<String>,

    /// Email address of the participant where known
    pub email_address: Option<String>,

    /// Whether the participant is internal or external to the organization
    pub affiliation: Option<String>,

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
