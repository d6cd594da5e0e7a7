//! Data models for nsrecall.

mod record;
mod search;

pub use record::{Payload, RESERVED_PAYLOAD_FIELDS, RecordId, ScoredRecord};
pub use search::{SearchResult, SearchStrategy, StatsSnapshot};
