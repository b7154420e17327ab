//! # Data Models
//!
//! SeaORM entity models for the destination (operational store) tables the
//! pipeline replicates into, plus the pipeline's own bookkeeping tables.

pub mod call;
pub mod call_opportunity;
pub mod dead_letter;
pub mod email;
pub mod opportunity;
pub mod speaker;
pub mod sync_checkpoint;
pub mod sync_run;
pub mod transcript;

pub use call::Entity as Call;
pub use call_opportunity::Entity as CallOpportunity;
pub use dead_letter::Entity as DeadLetter;
pub use email::Entity as Email;
pub use opportunity::Entity as Opportunity;
pub use speaker::Entity as Speaker;
pub use sync_checkpoint::Entity as SyncCheckpoint;
pub use sync_run::Entity as SyncRun;
pub use transcript::Entity as Transcript;
