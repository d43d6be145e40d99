//! Browser-style persisted caching for slow-changing lookups.
//!
//! - [`KeyValueStore`]: string key/value persistence (SQLite, memory, no-op)
//! - [`TtlCache`]: per-key expiry window in front of a refresh closure
//! - [`reset_on_version_change`]: wipes the store when the app version changes

mod layer;
mod storage;
mod version;

pub use layer::TtlCache;
pub use storage::{KeyValueStore, MemoryStore, NoopStore, SqliteStore};
pub use version::reset_on_version_change;
