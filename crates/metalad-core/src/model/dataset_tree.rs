//! A whole-collection snapshot at one root version.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::connector::Connector;
use super::mrr::MetadataRootRecord;
use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{Path, RealmId};

/// Maps every mount point within a collection, at a single root version,
/// to the [`MetadataRootRecord`] of the dataset instance mounted there.
///
/// Flat like [`super::file_tree::FileTree`]: a dataset nested three levels
/// deep is one entry keyed by its full path, and [`DatasetTree::subtree`]
/// answers "everything at or under this mount point" by prefix match
/// rather than by descending a hierarchy.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DatasetTree {
    entries: BTreeMap<Path, Connector<MetadataRootRecord>>,
}

impl DatasetTree {
    pub fn new() -> Self {
        DatasetTree::default()
    }

    pub fn get(&self, path: &Path) -> Option<&Connector<MetadataRootRecord>> {
        self.entries.get(path)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut Connector<MetadataRootRecord>> {
        self.entries.get_mut(path)
    }

    pub fn insert(&mut self, path: Path, mrr: Connector<MetadataRootRecord>) {
        self.entries.insert(path, mrr);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Inserts `mrr` at `path`, enforcing invariant 4: a path that already
    /// carries a record is rejected. Callers that mean to replace a mounted
    /// subtree must call [`DatasetTree::delete_subtree`] first.
    pub fn add(&mut self, path: Path, mrr: Connector<MetadataRootRecord>) -> Result<()> {
        if self.entries.contains_key(&path) {
            return Err(Error::PathAlreadyExists(path));
        }
        self.entries.insert(path, mrr);
        Ok(())
    }

    /// Removes every entry at or nested under `prefix`.
    pub fn delete_subtree(&mut self, prefix: &Path) {
        let doomed: Vec<Path> = self.subtree(prefix).map(|(p, _)| p.clone()).collect();
        for path in doomed {
            self.entries.remove(&path);
        }
    }

    /// Merges `other`'s entries into `self`, rewriting each of `other`'s
    /// keys onto `prefix`. Does not itself enforce invariant 4 — the caller
    /// is responsible for having cleared `prefix` first, matching the
    /// reference model's `add_subtree`.
    pub fn add_subtree(&mut self, other: DatasetTree, prefix: &Path) {
        for (path, conn) in other.entries {
            self.entries.insert(prefix.join(&path), conn);
        }
    }

    pub fn remove(&mut self, path: &Path) -> Option<Connector<MetadataRootRecord>> {
        self.entries.remove(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn subtree<'a>(
        &'a self,
        prefix: &'a Path,
    ) -> impl Iterator<Item = (&'a Path, &'a Connector<MetadataRootRecord>)> {
        self.entries
            .iter()
            .filter(move |(path, _)| path.starts_with(prefix))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Connector<MetadataRootRecord>)> {
        self.entries.iter()
    }

    /// Writes back every loaded [`MetadataRootRecord`], cascading into its
    /// own sub-objects first, then evicts it.
    pub fn persist(&mut self, backend: &dyn Backend, realm: &RealmId) -> Result<()> {
        for (_, conn) in self.entries.iter_mut() {
            conn.get_mut(backend, realm)?.persist(backend, realm)?;
            conn.save(backend, realm)?;
            conn.evict();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetadataRootRecord;
    use crate::types::Version;
    use uuid::Uuid;

    #[test]
    fn insert_and_subtree() {
        let mut tree = DatasetTree::new();
        tree.insert(
            Path::from("sub"),
            Connector::new(MetadataRootRecord::new(Uuid::nil(), Version::from("v1"))),
        );
        tree.insert(
            Path::from("sub/nested"),
            Connector::new(MetadataRootRecord::new(Uuid::nil(), Version::from("v1"))),
        );
        assert_eq!(tree.subtree(&Path::from("sub")).count(), 2);
        assert_eq!(tree.subtree(&Path::from("other")).count(), 0);
    }
}
