//! The root record anchoring one dataset instance's metadata.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::connector::Connector;
use super::file_tree::FileTree;
use super::metadata::Metadata;
use crate::backend::Backend;
use crate::error::Result;
use crate::types::{RealmId, Version};

/// Identifies a dataset instance (by [`Uuid`]) at a specific version, and
/// anchors the two kinds of metadata that can be attached to it: dataset-
/// level [`Metadata`] and a [`FileTree`] of per-file metadata.
///
/// Either connector is `None` until an extraction populates it; a dataset
/// that has never had file-level extraction run against it carries no
/// `file_tree` at all, rather than an empty one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataRootRecord {
    pub dataset_uuid: Uuid,
    pub dataset_version: Version,
    pub metadata: Option<Connector<Metadata>>,
    pub file_tree: Option<Connector<FileTree>>,
}

impl MetadataRootRecord {
    pub fn new(dataset_uuid: Uuid, dataset_version: Version) -> Self {
        MetadataRootRecord {
            dataset_uuid,
            dataset_version,
            metadata: None,
            file_tree: None,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut Connector<Metadata> {
        self.metadata.get_or_insert_with(|| Connector::new(Metadata::new()))
    }

    pub fn file_tree_mut(&mut self) -> &mut Connector<FileTree> {
        self.file_tree.get_or_insert_with(|| Connector::new(FileTree::new()))
    }

    /// Writes back whichever sub-objects are currently loaded and evicts
    /// them, leaving only their ids. Must run before `self`'s own
    /// connector is saved, so that blob only ever holds ids, never an
    /// inlined copy of a child's content (see [`super::connector::Connector`]).
    pub fn persist(&mut self, backend: &dyn Backend, realm: &RealmId) -> Result<()> {
        if let Some(metadata) = self.metadata.as_mut() {
            metadata.save(backend, realm)?;
            metadata.evict();
        }
        if let Some(file_tree) = self.file_tree.as_mut() {
            file_tree.get_mut(backend, realm)?.persist(backend, realm)?;
            file_tree.save(backend, realm)?;
            file_tree.evict();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_has_no_metadata_until_touched() {
        let mut mrr = MetadataRootRecord::new(Uuid::nil(), Version::from("v1"));
        assert!(mrr.metadata.is_none());
        mrr.metadata_mut();
        assert!(mrr.metadata.is_some());
    }
}
