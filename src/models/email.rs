//! Email entity model
//!
//! Replicated emails with recipients aggregated into a JSON array and the
//! full body preserved in the raw payload.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeUtc;
use serde_json::Value as JsonValue;

/// Email entity keyed by the external message identifier
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "emails")]
pub struct Model {
    /// Natural key: the message identifier assigned by the source system
    #[sea_orm(primary_key, auto_increment = false)]
    pub external_id: String,

    /// External identifier of the linked opportunity; null when the CRM
    /// context carried no linkage
    pub opportunity_external_id: Option<String>,

    /// Sender address
    pub sender: Option<String>,

    /// Recipient addresses as a JSON array; empty array when the source had
    /// no recipient rows, never null
    #[sea_orm(column_type = "JsonBinary")]
    pub recipients: JsonValue,

    /// Subject line
    pub subject: Option<String>,

    /// First 500 characters of the body
    pub body_snippet: Option<String>,

    /// Timestamp when the email was sent
    pub sent_at: Option<DateTimeUtc>,

    /// Modification timestamp in the source system; drives the sync cursor
    pub source_modified_at: DateTimeUtc,

    /// Catch-all structured payload preserving the full body and metadata
    #[sea_orm(column_type = "JsonBinary")]
    pub raw: Option<JsonValue>,

    /// Timestamp when this row was last written by the pipeline
    pub synced_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
