//! The top-level index of dataset instance histories.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::connector::Connector;
use super::version_list::VersionList;
use crate::backend::Backend;
use crate::error::Result;
use crate::types::RealmId;

/// Maps every dataset instance this realm has ever recorded, by its
/// [`Uuid`], to that instance's [`VersionList`].
///
/// Together with [`super::tree_version_list::TreeVersionList`] this forms
/// a realm's metadata graph: the tree version list answers "what versions
/// exist and what did the collection look like at each", the UUID set
/// answers "what has this particular dataset instance looked like, across
/// every path and root version it has ever been recorded under".
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UUIDSet {
    entries: BTreeMap<Uuid, Connector<VersionList>>,
}

impl UUIDSet {
    pub fn new() -> Self {
        UUIDSet::default()
    }

    pub fn get(&self, uuid: &Uuid) -> Option<&Connector<VersionList>> {
        self.entries.get(uuid)
    }

    pub fn get_mut(&mut self, uuid: &Uuid) -> Option<&mut Connector<VersionList>> {
        self.entries.get_mut(uuid)
    }

    pub fn get_or_insert(&mut self, uuid: Uuid) -> &mut Connector<VersionList> {
        self.entries
            .entry(uuid)
            .or_insert_with(|| Connector::new(VersionList::new()))
    }

    pub fn insert(&mut self, uuid: Uuid, list: Connector<VersionList>) {
        self.entries.insert(uuid, list);
    }

    pub fn uuids(&self) -> impl Iterator<Item = &Uuid> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Uuid, &Connector<VersionList>)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes back every loaded [`VersionList`], cascading into its own
    /// entries first, then evicts it.
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

    #[test]
    fn get_or_insert_is_idempotent() {
        let mut set = UUIDSet::new();
        let uuid = Uuid::nil();
        set.get_or_insert(uuid);
        set.get_or_insert(uuid);
        assert_eq!(set.uuids().count(), 1);
    }
}
