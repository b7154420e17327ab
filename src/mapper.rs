//! Record mapping from raw warehouse rows to destination models.
//!
//! Mapping is pure and per-record. A record missing its natural key or its
//! modification timestamp fails validation and is routed to the dead-letter
//! sink by the caller; malformed optional fields degrade to null (with the
//! raw payload preserved) rather than rejecting the record.

use chrono::Utc;
use sea_orm::prelude::DateTimeUtc;
use serde_json::Value as JsonValue;

use crate::error::MapError;
use crate::models::{call, email, opportunity, speaker, transcript};
use crate::source::SourceRecord;

/// Maximum characters kept in text preview columns.
const SNIPPET_MAX_CHARS: usize = 500;

/// Destination-shaped record produced by the mapper.
#[derive(Debug, Clone)]
pub enum MappedRecord {
    Call {
        call: call::Model,
        /// Opportunity natural keys extracted from the call's CRM context.
        opportunity_ids: Vec<String>,
    },
    Transcript(transcript::Model),
    Speaker(speaker::Model),
    Email(email::Model),
    Opportunity(opportunity::Model),
}

impl MappedRecord {
    pub fn natural_key(&self) -> &str {
        match self {
            MappedRecord::Call { call, .. } => &call.external_id,
            MappedRecord::Transcript(t) => &t.call_external_id,
            MappedRecord::Speaker(s) => &s.external_id,
            MappedRecord::Email(e) => &e.external_id,
            MappedRecord::Opportunity(o) => &o.external_id,
        }
    }

    pub fn modified_at(&self) -> DateTimeUtc {
        match self {
            MappedRecord::Call { call, .. } => call.source_modified_at,
            MappedRecord::Transcript(t) => t.source_modified_at,
            MappedRecord::Speaker(s) => s.source_modified_at,
            MappedRecord::Email(e) => e.source_modified_at,
            MappedRecord::Opportunity(o) => o.source_modified_at,
        }
    }
}

/// Map one raw source record into its destination shape.
pub fn map_record(record: &SourceRecord) -> Result<MappedRecord, MapError> {
    match record {
        SourceRecord::Call(row) => {
            let external_id = require_key(row.id.clone())?;
            let source_modified_at = require_timestamp(&external_id, row.modified_at)?;
            let opportunity_ids = extract_opportunity_ids(row.context.as_ref());
            Ok(MappedRecord::Call {
                call: call::Model {
                    external_id,
                    title: row.title.clone(),
                    started_at: row.started_at,
                    duration_seconds: row.duration_seconds,
                    direction: row.direction.clone(),
                    primary_user_id: row.primary_user_id.clone(),
                    source_modified_at,
                    raw: Some(record.payload_json()),
                    synced_at: Utc::now(),
                },
                opportunity_ids,
            })
        }
        SourceRecord::Transcript(row) => {
            let call_external_id = require_key(row.call_id.clone())?;
            let source_modified_at = require_timestamp(&call_external_id, row.modified_at)?;
            Ok(MappedRecord::Transcript(transcript::Model {
                call_external_id,
                language: row.language.clone(),
                text_snippet: transcript_snippet(row.sentences.as_ref()),
                content: row.sentences.clone(),
                source_modified_at,
                synced_at: Utc::now(),
            }))
        }
        SourceRecord::Speaker(row) => {
            let external_id = require_key(row.id.clone())?;
            let source_modified_at = require_timestamp(&external_id, row.modified_at)?;
            let call_external_id =
                row.call_id
                    .clone()
                    .ok_or_else(|| MapError::InvalidField {
                        natural_key: external_id.clone(),
                        reason: "speaker has no call identifier".to_string(),
                    })?;
            Ok(MappedRecord::Speaker(speaker::Model {
                external_id,
                call_external_id,
                display_name: row.display_name.clone(),
                email_address: row.email_address.clone(),
                affiliation: row.affiliation.clone(),
                source_modified_at,
                raw: Some(record.payload_json()),
                synced_at: Utc::now(),
            }))
        }
        SourceRecord::Email(row) => {
            let external_id = require_key(row.id.clone())?;
            let source_modified_at = require_timestamp(&external_id, row.modified_at)?;
            let opportunity_external_id = extract_opportunity_ids(row.context.as_ref())
                .into_iter()
                .next();
            Ok(MappedRecord::Email(email::Model {
                external_id,
                opportunity_external_id,
                sender: row.sender.clone(),
                recipients: JsonValue::Array(
                    row.recipients
                        .iter()
                        .map(|r| JsonValue::String(r.clone()))
                        .collect(),
                ),
                subject: row.subject.clone(),
                body_snippet: row.body.as_deref().map(truncate_snippet),
                sent_at: row.sent_at,
                source_modified_at,
                raw: Some(record.payload_json()),
                synced_at: Utc::now(),
            }))
        }
        SourceRecord::Opportunity(row) => {
            let external_id = require_key(row.id.clone())?;
            let source_modified_at = require_timestamp(&external_id, row.modified_at)?;
            Ok(MappedRecord::Opportunity(opportunity::Model {
                external_id,
                name: row.name.clone(),
                stage: row.stage.clone(),
                amount: coerce_amount(row.amount.as_deref()),
                close_date: row.close_date,
                account_name: row.account_name.clone(),
                owner_name: row.owner_name.clone(),
                source_modified_at,
                raw: Some(record.payload_json()),
                synced_at: Utc::now(),
            }))
        }
    }
}

fn require_key(id: Option<String>) -> Result<String, MapError> {
    match id {
        Some(id) if !id.trim().is_empty() => Ok(id),
        _ => Err(MapError::MissingNaturalKey),
    }
}

fn require_timestamp(
    natural_key: &str,
    modified_at: Option<DateTimeUtc>,
) -> Result<DateTimeUtc, MapError> {
    modified_at.ok_or_else(|| MapError::MissingTimestamp {
        natural_key: natural_key.to_string(),
    })
}

/// Truncate on a character boundary to the snippet budget.
fn truncate_snippet(text: &str) -> String {
    text.chars().take(SNIPPET_MAX_CHARS).collect()
}

/// Build a plain-text preview by joining sentence texts from the structured
/// transcript payload. An unrecognized shape yields no snippet; the payload
/// is still stored whole.
fn transcript_snippet(sentences: Option<&JsonValue>) -> Option<String> {
    let items = sentences?.as_array()?;
    let mut joined = String::new();
    for item in items {
        let Some(text) = item.get("text").and_then(JsonValue::as_str) else {
            continue;
        };
        if !joined.is_empty() {
            joined.push(' ');
        }
        joined.push_str(text);
        if joined.chars().count() >= SNIPPET_MAX_CHARS {
            break;
        }
    }
    if joined.is_empty() {
        None
    } else {
        Some(truncate_snippet(&joined))
    }
}

/// Parse the text-cast deal amount. An unparseable value degrades to null;
/// the original survives in the raw payload.
fn coerce_amount(amount: Option<&str>) -> Option<f64> {
    let raw = amount?.trim();
    if raw.is_empty() {
        return None;
    }
    raw.replace(',', "").parse::<f64>().ok()
}

/// Pull opportunity identifiers out of a CRM context payload: an array of
/// association objects with `objectType` and `objectId` fields.
fn extract_opportunity_ids(context: Option<&JsonValue>) -> Vec<String> {
    let Some(items) = context.and_then(JsonValue::as_array) else {
        if let Some(other) = context {
            if !other.is_null() {
                // Unexpected shape: keep the record, note the skip. The
                // payload still lands whole in the raw column.
                tracing::warn!("CRM context metadata is not an array, skipping link extraction");
            }
        }
        return Vec::new();
    };
    items
        .iter()
        .filter(|item| {
            item.get("objectType")
                .and_then(JsonValue::as_str)
                .is_some_and(|t| t.eq_ignore_ascii_case("opportunity"))
        })
        .filter_map(|item| item.get("objectId").and_then(JsonValue::as_str))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    use crate::source::{CallRow, EmailRow, OpportunityRow, TranscriptRow};

    fn ts() -> DateTimeUtc {
        Utc.with_ymd_and_hms(2026, 7, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn call_maps_with_opportunity_links() {
        let record = SourceRecord::Call(CallRow {
            id: Some("call-1".to_string()),
            title: Some("Renewal discussion".to_string()),
            modified_at: Some(ts()),
            context: Some(json!([
                {"objectType": "Opportunity", "objectId": "opp-9"},
                {"objectType": "Account", "objectId": "acct-3"},
            ])),
            ..CallRow::default()
        });

        let MappedRecord::Call { call, opportunity_ids } = map_record(&record).unwrap() else {
            panic!("expected a call");
        };
        assert_eq!(call.external_id, "call-1");
        assert_eq!(call.source_modified_at, ts());
        assert_eq!(opportunity_ids, vec!["opp-9".to_string()]);
    }

    #[test]
    fn missing_natural_key_is_rejected() {
        let record = SourceRecord::Call(CallRow {
            id: None,
            modified_at: Some(ts()),
            ..CallRow::default()
        });
        assert!(matches!(
            map_record(&record),
            Err(MapError::MissingNaturalKey)
        ));
    }

    #[test]
    fn missing_timestamp_is_rejected_with_key() {
        let record = SourceRecord::Opportunity(OpportunityRow {
            id: Some("opp-1".to_string()),
            ..OpportunityRow::default()
        });
        let err = map_record(&record).unwrap_err();
        assert_eq!(err.natural_key(), Some("opp-1"));
    }

    #[test]
    fn email_recipients_become_json_array() {
        let record = SourceRecord::Email(EmailRow {
            id: Some("em-1".to_string()),
            recipients: vec!["a@example.com".to_string(), "b@example.com".to_string()],
            modified_at: Some(ts()),
            ..EmailRow::default()
        });
        let MappedRecord::Email(email) = map_record(&record).unwrap() else {
            panic!("expected an email");
        };
        assert_eq!(email.recipients, json!(["a@example.com", "b@example.com"]));
    }

    #[test]
    fn email_without_recipients_gets_empty_array() {
        let record = SourceRecord::Email(EmailRow {
            id: Some("em-2".to_string()),
            modified_at: Some(ts()),
            ..EmailRow::default()
        });
        let MappedRecord::Email(email) = map_record(&record).unwrap() else {
            panic!("expected an email");
        };
        assert_eq!(email.recipients, json!([]));
        assert_eq!(email.opportunity_external_id, None);
    }

    #[test]
    fn amount_coercion_handles_strings_and_garbage() {
        assert_eq!(coerce_amount(Some("1234.5")), Some(1234.5));
        assert_eq!(coerce_amount(Some("12,000")), Some(12000.0));
        assert_eq!(coerce_amount(Some("n/a")), None);
        assert_eq!(coerce_amount(Some("")), None);
        assert_eq!(coerce_amount(None), None);
    }

    #[test]
    fn body_snippet_is_truncated() {
        let body = "x".repeat(1200);
        let record = SourceRecord::Email(EmailRow {
            id: Some("em-3".to_string()),
            body: Some(body),
            modified_at: Some(ts()),
            ..EmailRow::default()
        });
        let MappedRecord::Email(email) = map_record(&record).unwrap() else {
            panic!("expected an email");
        };
        assert_eq!(email.body_snippet.unwrap().chars().count(), 500);
    }

    #[test]
    fn transcript_snippet_joins_sentence_texts() {
        let record = SourceRecord::Transcript(TranscriptRow {
            call_id: Some("call-1".to_string()),
            sentences: Some(json!([
                {"speaker": "s1", "text": "Hello there."},
                {"speaker": "s2", "text": "Hi, thanks for joining."},
            ])),
            modified_at: Some(ts()),
            ..TranscriptRow::default()
        });
        let MappedRecord::Transcript(t) = map_record(&record).unwrap() else {
            panic!("expected a transcript");
        };
        assert_eq!(
            t.text_snippet.as_deref(),
            Some("Hello there. Hi, thanks for joining.")
        );
    }
}
