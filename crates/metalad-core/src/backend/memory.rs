//! An in-memory [`Backend`], used by the test suite and by callers that
//! want a scratch realm without touching disk.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::types::{BlobId, RealmId};

use super::Backend;

#[derive(Default)]
struct RealmState {
    objects: HashMap<BlobId, Vec<u8>>,
    roots: HashMap<String, BlobId>,
    locked: bool,
}

/// A [`Backend`] whose state lives entirely in process memory.
#[derive(Default)]
pub struct MemoryBackend {
    realms: Mutex<HashMap<RealmId, RealmState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn put(&self, realm: &RealmId, bytes: &[u8]) -> Result<BlobId> {
        let id = BlobId::of(bytes);
        let mut realms = self.realms.lock().unwrap();
        let state = realms.entry(realm.clone()).or_default();
        state.objects.entry(id.clone()).or_insert_with(|| bytes.to_vec());
        Ok(id)
    }

    fn get(&self, realm: &RealmId, id: &BlobId) -> Result<Vec<u8>> {
        let realms = self.realms.lock().unwrap();
        realms
            .get(realm)
            .and_then(|state| state.objects.get(id))
            .cloned()
            .ok_or_else(|| crate::error::blob_not_found(realm, id))
    }

    fn get_root(&self, realm: &RealmId, name: &str) -> Result<Option<BlobId>> {
        let realms = self.realms.lock().unwrap();
        Ok(realms.get(realm).and_then(|state| state.roots.get(name).cloned()))
    }

    fn set_root(&self, realm: &RealmId, name: &str, id: &BlobId) -> Result<()> {
        let mut realms = self.realms.lock().unwrap();
        let state = realms.entry(realm.clone()).or_default();
        state.roots.insert(name.to_string(), id.clone());
        Ok(())
    }

    fn lock(&self, realm: &RealmId) -> Result<()> {
        let mut realms = self.realms.lock().unwrap();
        let state = realms.entry(realm.clone()).or_default();
        if state.locked {
            return Err(Error::LockError {
                realm: realm.clone(),
                message: "already locked".to_string(),
            });
        }
        state.locked = true;
        Ok(())
    }

    fn unlock(&self, realm: &RealmId) -> Result<()> {
        let mut realms = self.realms.lock().unwrap();
        if let Some(state) = realms.get_mut(realm) {
            state.locked = false;
        }
        Ok(())
    }

    /// Nothing to flush: everything this backend holds already lives in
    /// process memory, not in an OS write-back cache.
    fn flush(&self, _realm: &RealmId) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_dedupes_identical_content() {
        let backend = MemoryBackend::new();
        let realm = RealmId::from("r1");
        let a = backend.put(&realm, b"x").unwrap();
        let b = backend.put(&realm, b"x").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn double_lock_fails() {
        let backend = MemoryBackend::new();
        let realm = RealmId::from("r1");
        backend.lock(&realm).unwrap();
        assert!(backend.lock(&realm).is_err());
        backend.unlock(&realm).unwrap();
        backend.lock(&realm).unwrap();
    }
}
