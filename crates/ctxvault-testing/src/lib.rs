//! Testing infrastructure for ctxvault integration tests.
//!
//! - `TestWorld`: isolated data dir and session roots on a temp dir
//! - `fixtures`: fluent builder for session logs
//! - `assertions`: compaction and store invariants as `Result`-returning checks

pub mod assertions;
pub mod fixtures;
pub mod world;

pub use fixtures::LogBuilder;
pub use world::TestWorld;
