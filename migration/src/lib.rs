//! Database migrations for the revsync destination store.
//!
//! This module contains all destination-schema migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_07_01_000001_create_calls;
mod m2026_07_01_000002_create_transcripts;
mod m2026_07_01_000003_create_speakers;
mod m2026_07_01_000004_create_emails;
mod m2026_07_01_000005_create_opportunities;
mod m2026_07_01_000006_create_call_opportunities;
mod m2026_07_01_000007_create_sync_checkpoints;
mod m2026_07_01_000008_create_dead_letters;
mod m2026_07_01_000009_create_sync_runs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_07_01_000001_create_calls::Migration),
            Box::new(m2026_07_01_000002_create_transcripts::Migration),
            Box::new(m2026_07_01_000003_create_speakers::Migration),
            Box::new(m2026_07_01_000004_create_emails::Migration),
            Box::new(m2026_07_01_000005_create_opportunities::Migration),
            Box::new(m2026_07_01_000006_create_call_opportunities::Migration),
            Box::new(m2026_07_01_000007_create_sync_checkpoints::Migration),
            Box::new(m2026_07_01_000008_create_dead_letters::Migration),
            Box::new(m2026_07_01_000009_create_sync_runs::Migration),
        ]
    }
}
