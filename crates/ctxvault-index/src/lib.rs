// SQLite session store
// Raw lines are stored verbatim; classification columns are derived on insert

mod db;
mod error;
mod queries;
mod records;
mod schema;

// Public API
pub use db::Database;
pub use error::{Error, Result};
pub use records::{
    AppendBatch, AppendOutcome, CheckpointOutcome, EntryRecord, LockRecord, ReapOutcome,
    RegistrationRecord, SessionMeta, StoreStats, SummaryRecord,
};
pub use schema::SCHEMA_VERSION;
