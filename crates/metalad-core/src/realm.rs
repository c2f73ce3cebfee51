//! Loading and saving a realm's two named roots.
//!
//! Both [`crate::pipeline::run`] and [`crate::aggregate::aggregate`] need to
//! resolve a realm's [`TreeVersionList`] and [`UUIDSet`] the same way, and
//! save them back the same way (cascade through loaded descendants, write
//! the root itself, point the named ref at it). Factored out here so
//! neither module has to repeat the `get_root`/`StoredNode`/`set_root`
//! dance.

use crate::backend::{Backend, ROOT_TREE_VERSION_LIST, ROOT_UUID_SET};
use crate::error::Result;
use crate::model::{StoredNode, TreeVersionList, UUIDSet};
use crate::types::{BlobId, RealmId};

pub fn load_tree_version_list(backend: &dyn Backend, realm: &RealmId) -> Result<TreeVersionList> {
    match backend.get_root(realm, ROOT_TREE_VERSION_LIST)? {
        Some(id) => TreeVersionList::load_from(backend, realm, &id),
        None => Ok(TreeVersionList::new()),
    }
}

pub fn load_uuid_set(backend: &dyn Backend, realm: &RealmId) -> Result<UUIDSet> {
    match backend.get_root(realm, ROOT_UUID_SET)? {
        Some(id) => UUIDSet::load_from(backend, realm, &id),
        None => Ok(UUIDSet::new()),
    }
}

/// Cascades the write-back through every loaded descendant, saves the root
/// itself, and repoints the realm's named ref at it.
pub fn save_tree_version_list(backend: &dyn Backend, realm: &RealmId, tvl: &mut TreeVersionList) -> Result<BlobId> {
    tvl.persist(backend, realm)?;
    let id = tvl.save_to(backend, realm)?;
    backend.set_root(realm, ROOT_TREE_VERSION_LIST, &id)?;
    Ok(id)
}

pub fn save_uuid_set(backend: &dyn Backend, realm: &RealmId, uuid_set: &mut UUIDSet) -> Result<BlobId> {
    uuid_set.persist(backend, realm)?;
    let id = uuid_set.save_to(backend, realm)?;
    backend.set_root(realm, ROOT_UUID_SET, &id)?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    #[test]
    fn loading_an_untouched_realm_yields_empty_roots() {
        let backend = MemoryBackend::new();
        let realm = RealmId::from("r1");
        assert!(load_tree_version_list(&backend, &realm).unwrap().is_empty());
        assert!(load_uuid_set(&backend, &realm).unwrap().is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let backend = MemoryBackend::new();
        let realm = RealmId::from("r1");

        let mut tvl = TreeVersionList::new();
        tvl.get_or_insert(crate::types::Version::from("v1"), crate::types::Timestamp(1));
        save_tree_version_list(&backend, &realm, &mut tvl).unwrap();

        let reloaded = load_tree_version_list(&backend, &realm).unwrap();
        assert_eq!(reloaded.versions().count(), 1);
    }
}
