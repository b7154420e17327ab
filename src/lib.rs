//! revsync: incremental replication of conversation and CRM entities from the
//! analytics warehouse into the operational relational store.
//!
//! The pipeline runs as a single invocation: it claims the run lock, fans out
//! one sync unit per entity type, and advances per-entity cursors as batches
//! land. All writes are idempotent upserts keyed on the source's natural
//! identifiers, so overlapping windows and re-runs merge instead of
//! duplicating.

pub mod checkpoint;
pub mod config;
pub mod db;
pub mod dead_letter;
pub mod error;
pub mod logging;
pub mod mapper;
pub mod models;
pub mod orchestrator;
pub mod retry;
pub mod source;
pub mod unit;
pub mod writer;
