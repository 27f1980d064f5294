pub mod error;
mod parser;
pub mod record;
mod schema;

pub use error::{Error, Result};
pub use parser::{parse_log, parse_record, read_log_file, serialize_records};
pub use record::{Record, RecordKind};
