//! Engagement wizard domain: lookups, typed records and fetch definitions.

pub mod lookups;
pub mod source;
pub mod types;

pub use lookups::LookupResource;
pub use source::{EngagementSource, ResourceSource};
