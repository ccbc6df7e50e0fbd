//! Palaver Storage crate - per-user JSON persistence.
//!
//! Holds the versioned topic-history record, the backends that load and save
//! it (atomic JSON files, or memory for tests), the adapter for legacy
//! unversioned history files, and the flat-file user registry.

pub mod backend;
pub mod migrations;
pub mod record;
pub mod users;

pub use backend::{JsonFileBackend, MemoryBackend, TopicBackend};
pub use migrations::decode_record;
pub use record::{Exchange, TopicEntry, TopicRecord, DEFAULT_TOPIC, RECORD_VERSION};
pub use users::{ChatType, User, UserRegistry};
