//! The metadata graph: the data model stored in a realm.
//!
//! ```text
//! TreeVersionList  (root version -> DatasetTree)
//!   DatasetTree    (mount path -> MetadataRootRecord)
//!     MetadataRootRecord (dataset uuid/version, dataset Metadata, FileTree)
//!       FileTree   (file path -> Metadata)
//! UUIDSet          (dataset uuid -> VersionList)
//!   VersionList    (dataset version -> timestamp, mount path, MetadataRootRecord)
//! ```
//!
//! Every edge in this graph is a [`Connector`], so loading a
//! [`TreeVersionList`] does not pull in every [`DatasetTree`] it has ever
//! recorded, only the ids; a node is fetched from its [`crate::backend::Backend`]
//! the first time something asks for it.

mod connector;
mod dataset_tree;
mod file_tree;
mod metadata;
mod mrr;
mod tree_version_list;
mod uuid_set;
mod version_list;

pub use connector::{Connector, StoredNode};
pub use dataset_tree::DatasetTree;
pub use file_tree::FileTree;
pub use metadata::{ExtractorRun, Metadata};
pub use mrr::MetadataRootRecord;
pub use tree_version_list::{DatasetTreeEntry, TreeVersionList};
pub use uuid_set::UUIDSet;
pub use version_list::{VersionEntry, VersionList};
