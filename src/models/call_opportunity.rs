//! Call-to-opportunity junction entity model
//!
//! Association rows keyed by the pair of natural keys, written insert-if-absent.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeUtc;

/// Junction row linking a call to an opportunity
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "call_opportunities")]
pub struct Model {
    /// External identifier of the linked call
    #[sea_orm(primary_key, auto_increment = false)]
    pub call_external_id: String,

    /// External identifier of the linked opportunity
    #[sea_orm(primary_key, auto_increment = false)]
    pub opportunity_external_id: String,

    /// Timestamp when the link was first replicated
    pub linked_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
