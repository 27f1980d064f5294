pub mod entries;
pub mod locks;
pub mod meta;
pub mod registry;
pub mod stats;
pub mod summaries;
