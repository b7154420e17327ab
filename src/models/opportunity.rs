//! Opportunity entity model
//!
//! CRM opportunities with account and owner names denormalized from warehouse
//! joins at read time.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeUtc;
use serde_json::Value as JsonValue;

/// Opportunity entity keyed by the external CRM identifier
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "opportunities")]
pub struct Model {
    /// Natural key: the opportunity identifier assigned by the CRM
    #[sea_orm(primary_key, auto_increment = false)]
    pub external_id: String,

    /// Opportunity name
    pub name: Option<String>,

    /// Current pipeline stage
    pub stage: Option<String>,

    /// Deal amount; coerced from the source's numeric-or-string representation
    pub amount: Option<f64>,

    /// Expected close date
    pub close_date: Option<DateTimeUtc>,

    /// Resolved account name; null when the accounts join found no match
    pub account_name: Option<String>,

    /// Resolved owner name; null when the users join found no match
    pub owner_name: Option<String>,

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
