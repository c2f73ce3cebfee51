//! A single dataset's per-path metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::connector::Connector;
use super::metadata::Metadata;
use crate::backend::Backend;
use crate::error::Result;
use crate::types::{Path, RealmId};

/// Maps every path a dataset has recorded metadata for to that path's
/// [`Metadata`] log.
///
/// Flat rather than nested: a file at `a/b/c` is one entry keyed by the
/// full path `"a/b/c"`, not three levels of directory nodes. "Subtree"
/// queries ([`FileTree::subtree`]) are therefore a prefix match over the
/// key set rather than a walk down a hierarchy, which keeps aggregation's
/// path-rewriting a matter of rekeying rather than re-parenting nodes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileTree {
    entries: BTreeMap<Path, Connector<Metadata>>,
}

impl FileTree {
    pub fn new() -> Self {
        FileTree::default()
    }

    pub fn get(&self, path: &Path) -> Option<&Connector<Metadata>> {
        self.entries.get(path)
    }

    pub fn get_or_insert(&mut self, path: Path) -> &mut Connector<Metadata> {
        self.entries
            .entry(path)
            .or_insert_with(|| Connector::new(Metadata::new()))
    }

    pub fn insert(&mut self, path: Path, metadata: Connector<Metadata>) {
        self.entries.insert(path, metadata);
    }

    pub fn remove(&mut self, path: &Path) -> Option<Connector<Metadata>> {
        self.entries.remove(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Every entry whose path is `prefix` itself or nested under it.
    pub fn subtree<'a>(
        &'a self,
        prefix: &'a Path,
    ) -> impl Iterator<Item = (&'a Path, &'a Connector<Metadata>)> {
        self.entries
            .iter()
            .filter(move |(path, _)| path.starts_with(prefix))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Connector<Metadata>)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Path, &mut Connector<Metadata>)> {
        self.entries.iter_mut()
    }

    /// Writes back every loaded [`Metadata`] entry and evicts it.
    pub fn persist(&mut self, backend: &dyn Backend, realm: &RealmId) -> Result<()> {
        for (_, metadata) in self.entries.iter_mut() {
            metadata.save(backend, realm)?;
            metadata.evict();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtree_matches_exact_and_nested_paths() {
        let mut tree = FileTree::new();
        tree.get_or_insert(Path::from("sub"));
        tree.get_or_insert(Path::from("sub/a"));
        tree.get_or_insert(Path::from("subother"));
        tree.get_or_insert(Path::from("other"));

        let matched: Vec<_> = tree.subtree(&Path::from("sub")).map(|(p, _)| p.to_string()).collect();
        assert_eq!(matched, vec!["sub".to_string(), "sub/a".to_string()]);
    }
}
