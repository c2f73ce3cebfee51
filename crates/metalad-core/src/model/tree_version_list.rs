//! The top-level index of whole-collection snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::connector::Connector;
use super::dataset_tree::DatasetTree;
use crate::backend::Backend;
use crate::error::Result;
use crate::types::{RealmId, Timestamp, Version};

/// A root version's snapshot, paired with when that version was recorded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetTreeEntry {
    pub timestamp: Timestamp,
    pub tree: Connector<DatasetTree>,
}

/// Maps each root version a realm has ever seen to the [`DatasetTree`]
/// snapshot of the whole collection at that version.
///
/// This, together with [`super::uuid_set::UUIDSet`], is one of a realm's
/// two named roots; it answers "what did the collection look like at root
/// version V", while the `UUIDSet` answers "what has dataset instance U
/// looked like across all the versions it has appeared at".
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TreeVersionList {
    entries: BTreeMap<Version, DatasetTreeEntry>,
}

impl TreeVersionList {
    pub fn new() -> Self {
        TreeVersionList::default()
    }

    pub fn get(&self, version: &Version) -> Option<&DatasetTreeEntry> {
        self.entries.get(version)
    }

    pub fn get_mut(&mut self, version: &Version) -> Option<&mut DatasetTreeEntry> {
        self.entries.get_mut(version)
    }

    /// Returns the entry for `version`, creating an empty tree stamped with
    /// `timestamp` if this is the first time this version has been seen.
    pub fn get_or_insert(&mut self, version: Version, timestamp: Timestamp) -> &mut DatasetTreeEntry {
        self.entries.entry(version).or_insert_with(|| DatasetTreeEntry {
            timestamp,
            tree: Connector::new(DatasetTree::new()),
        })
    }

    pub fn insert(&mut self, version: Version, timestamp: Timestamp, tree: Connector<DatasetTree>) {
        self.entries.insert(version, DatasetTreeEntry { timestamp, tree });
    }

    pub fn versions(&self) -> impl Iterator<Item = &Version> {
        self.entries.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Version, &DatasetTreeEntry)> {
        self.entries.iter()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = (&Version, &mut DatasetTreeEntry)> {
        self.entries.iter_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes back every loaded [`DatasetTree`], cascading into its own
    /// entries first, then evicts it.
    pub fn persist(&mut self, backend: &dyn Backend, realm: &RealmId) -> Result<()> {
        for (_, entry) in self.entries.iter_mut() {
            entry.tree.get_mut(backend, realm)?.persist(backend, realm)?;
            entry.tree.save(backend, realm)?;
            entry.tree.evict();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_insert_creates_empty_tree_once() {
        let mut tvl = TreeVersionList::new();
        tvl.get_or_insert(Version::from("v1"), Timestamp(100));
        assert_eq!(tvl.versions().count(), 1);
        tvl.get_or_insert(Version::from("v1"), Timestamp(200));
        assert_eq!(tvl.versions().count(), 1);
        assert_eq!(tvl.get(&Version::from("v1")).unwrap().timestamp, Timestamp(100));
    }
}
