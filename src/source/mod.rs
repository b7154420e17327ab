//! Source readers for the analytical warehouse.
//!
//! One reader per entity type. Each reader issues a single cursor-bounded
//! query per batch, filtered to records modified at or after the cursor
//! (inclusive, so boundary ties are re-read and absorbed by upsert rather
//! than skipped) and ordered ascending by modification timestamp.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use sea_orm::prelude::DateTimeUtc;
use serde_json::Value as JsonValue;

use crate::error::SyncError;

pub mod calls;
pub mod emails;
pub mod opportunities;
pub mod speakers;
pub mod transcripts;

pub use calls::{CallRow, CallsReader};
pub use emails::{EmailRow, EmailsReader};
pub use opportunities::{OpportunitiesReader, OpportunityRow};
pub use speakers::{SpeakerRow, SpeakersReader};
pub use transcripts::{TranscriptRow, TranscriptsReader};

/// The entity types the pipeline replicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Calls,
    Transcripts,
    Speakers,
    Emails,
    Opportunities,
}

impl EntityKind {
    /// All entity types, in no significant order (units run independently).
    pub fn all() -> [EntityKind; 5] {
        [
            EntityKind::Calls,
            EntityKind::Transcripts,
            EntityKind::Speakers,
            EntityKind::Emails,
            EntityKind::Opportunities,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Calls => "calls",
            EntityKind::Transcripts => "transcripts",
            EntityKind::Speakers => "speakers",
            EntityKind::Emails => "emails",
            EntityKind::Opportunities => "opportunities",
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calls" => Ok(EntityKind::Calls),
            "transcripts" => Ok(EntityKind::Transcripts),
            "speakers" => Ok(EntityKind::Speakers),
            "emails" => Ok(EntityKind::Emails),
            "opportunities" => Ok(EntityKind::Opportunities),
            other => Err(format!("unknown entity type: {other}")),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw source record, one shape per entity type.
///
/// Transient: exists only within a single sync unit's in-flight batch.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum SourceRecord {
    Call(CallRow),
    Transcript(TranscriptRow),
    Speaker(SpeakerRow),
    Email(EmailRow),
    Opportunity(OpportunityRow),
}

impl SourceRecord {
    pub fn entity(&self) -> EntityKind {
        match self {
            SourceRecord::Call(_) => EntityKind::Calls,
            SourceRecord::Transcript(_) => EntityKind::Transcripts,
            SourceRecord::Speaker(_) => EntityKind::Speakers,
            SourceRecord::Email(_) => EntityKind::Emails,
            SourceRecord::Opportunity(_) => EntityKind::Opportunities,
        }
    }

    /// Natural key of the record, when the source row carried one.
    pub fn natural_key(&self) -> Option<String> {
        match self {
            SourceRecord::Call(row) => row.id.clone(),
            SourceRecord::Transcript(row) => row.call_id.clone(),
            SourceRecord::Speaker(row) => row.id.clone(),
            SourceRecord::Email(row) => row.id.clone(),
            SourceRecord::Opportunity(row) => row.id.clone(),
        }
    }

    /// JSON rendering of the raw record for dead-letter payloads.
    pub fn payload_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

/// Cursor-bounded reader against the source warehouse.
///
/// `read` is restartable: re-invoking with the same cursor yields the same
/// window (modulo source-side modifications), which the upsert writer absorbs.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Entity type this reader produces.
    fn entity(&self) -> EntityKind;

    /// Read up to `limit` records modified at or after `since`, ordered
    /// ascending by modification timestamp.
    async fn read(
        &self,
        since: DateTimeUtc,
        limit: u64,
    ) -> Result<Vec<SourceRecord>, SyncError>;
}

/// Build the full set of warehouse-backed readers over a shared source pool.
pub fn warehouse_readers(
    source: Arc<DatabaseConnection>,
    schema: &str,
) -> Vec<Arc<dyn SourceReader>> {
    vec![
        Arc::new(CallsReader::new(source.clone(), schema)),
        Arc::new(TranscriptsReader::new(source.clone(), schema)),
        Arc::new(SpeakersReader::new(source.clone(), schema)),
        Arc::new(EmailsReader::new(source.clone(), schema)),
        Arc::new(OpportunitiesReader::new(source, schema)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_round_trips_through_str() {
        for kind in EntityKind::all() {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("widgets".parse::<EntityKind>().is_err());
    }

    #[test]
    fn source_record_exposes_natural_key() {
        let record = SourceRecord::Call(CallRow {
            id: Some("call-1".to_string()),
            ..CallRow::default()
        });
        assert_eq!(record.natural_key(), Some("call-1".to_string()));
        assert_eq!(record.entity(), EntityKind::Calls);
    }
}
