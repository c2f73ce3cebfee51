//! A single dataset instance's history across versions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::connector::Connector;
use super::mrr::MetadataRootRecord;
use crate::backend::Backend;
use crate::error::Result;
use crate::types::{Path, RealmId, Timestamp, Version};

/// What is known about a dataset instance at one of its versions: when the
/// version was recorded, where the instance was mounted within its
/// enclosing collection at that time, and its [`MetadataRootRecord`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VersionEntry {
    pub timestamp: Timestamp,
    pub path: Path,
    pub mrr: Connector<MetadataRootRecord>,
}

/// Every version of one dataset instance this realm has ever recorded,
/// keyed by [`Version`].
///
/// A `VersionList` belongs to exactly one dataset instance; collections
/// of them are indexed by instance identity in [`super::uuid_set::UUIDSet`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VersionList {
    entries: BTreeMap<Version, VersionEntry>,
}

impl VersionList {
    pub fn new() -> Self {
        VersionList::default()
    }

    pub fn get(&self, version: &Version) -> Option<&VersionEntry> {
        self.entries.get(version)
    }

    pub fn get_mut(&mut self, version: &Version) -> Option<&mut VersionEntry> {
        self.entries.get_mut(version)
    }

    pub fn upsert(&mut self, version: Version, entry: VersionEntry) {
        self.entries.insert(version, entry);
    }

    pub fn versions(&self) -> impl Iterator<Item = &Version> {
        self.entries.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Version, &VersionEntry)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The version, if any, whose recorded mount point is `path`.
    pub fn version_at_path(&self, path: &Path) -> Option<&Version> {
        self.entries
            .iter()
            .find(|(_, entry)| &entry.path == path)
            .map(|(version, _)| version)
    }

    /// Writes back every loaded [`MetadataRootRecord`], cascading into its
    /// own sub-objects first, then evicts it.
    pub fn persist(&mut self, backend: &dyn Backend, realm: &RealmId) -> Result<()> {
        for (_, entry) in self.entries.iter_mut() {
            entry.mrr.get_mut(backend, realm)?.persist(backend, realm)?;
            entry.mrr.save(backend, realm)?;
            entry.mrr.evict();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetadataRootRecord;
    use uuid::Uuid;

    #[test]
    fn upsert_then_lookup_by_path() {
        let mut list = VersionList::new();
        list.upsert(
            Version::from("v1"),
            VersionEntry {
                timestamp: Timestamp(1),
                path: Path::from("sub"),
                mrr: Connector::new(MetadataRootRecord::new(Uuid::nil(), Version::from("v1"))),
            },
        );
        assert_eq!(list.version_at_path(&Path::from("sub")), Some(&Version::from("v1")));
        assert!(list.version_at_path(&Path::from("other")).is_none());
    }
}
