//! Transcript entity model
//!
//! One transcript per call; the structured sentence payload is stored whole.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeUtc;
use serde_json::Value as JsonValue;

/// Transcript entity keyed by the owning call's external identifier
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transcripts")]
pub struct Model {
    /// Natural key: the external identifier of the call this transcript belongs to
    #[sea_orm(primary_key, auto_increment = false)]
    pub call_external_id: String,

    /// Detected language code
    pub language: Option<String>,

    /// Full structured transcript (speaker turns and sentences)
    #[sea_orm(column_type = "JsonBinary")]
    pub content: Option<JsonValue>,

    /// Truncated plain-text preview of the transcript
    pub text_snippet: Option<String>,

    /// Modification timestamp in the source system; drives the sync cursor
    pub source_modified_at: DateTimeUtc,

    /// Timestamp when this row was last written by the pipeline
    pub synced_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
