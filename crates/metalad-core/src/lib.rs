//! Storage, aggregation, and retrieval of versioned dataset metadata.
//!
//! A realm holds a metadata graph: a [`model::TreeVersionList`] snapshotting
//! whole-collection dataset trees by root version, and a [`model::UUIDSet`]
//! indexing every dataset instance's version history by its UUID. Both are
//! backed by an opaque, content-addressed [`backend::Backend`]. Extractors
//! populate the graph through [`pipeline::run`]; [`aggregate::aggregate`]
//! merges a sub-collection's graph into a parent's under an intra-parent
//! path.

pub extern crate uuid;

pub mod aggregate;
pub mod backend;
pub mod containment;
pub mod content_store;
pub mod error;
pub mod extractor;
pub mod model;
pub mod pipeline;
pub mod realm;
pub mod types;

pub use error::{Error, Result};
pub use types::{BlobId, Format, Path, RealmId, Timestamp, Version};
