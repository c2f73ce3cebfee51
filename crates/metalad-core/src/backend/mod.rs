//! Storage backends: where the bytes that make up a realm's metadata graph
//! actually live.
//!
//! A [`Backend`] is a content-addressed blob store plus a small set of
//! named roots (one per realm, by convention `"tree_version_list"` and
//! `"uuid_set"`) and a per-realm advisory lock. The graph model in
//! [`crate::model`] only ever talks to a `Backend`, never to a filesystem
//! or database directly, so alternate storage (in-memory for tests, or a
//! networked store) is a matter of implementing this trait.

#[cfg(feature = "backend-filesystem")]
pub mod filesystem;
pub mod memory;

#[cfg(feature = "backend-filesystem")]
pub use filesystem::FilesystemBackend;
pub use memory::MemoryBackend;

use crate::error::Result;
use crate::types::{BlobId, RealmId};

/// Name of the root pointing at a realm's [`crate::model::TreeVersionList`].
pub const ROOT_TREE_VERSION_LIST: &str = "tree_version_list";

/// Name of the root pointing at a realm's [`crate::model::UUIDSet`].
pub const ROOT_UUID_SET: &str = "uuid_set";

/// Storage for the blobs and named roots that make up one or more realms.
///
/// Implementations must make [`Backend::put`] deterministic: storing the
/// same bytes twice, whether in the same realm or a different one served
/// by the same backend, must yield the same [`BlobId`]. This is what lets
/// [`crate::aggregate`] skip re-copying content shared between realms.
pub trait Backend: Send + Sync {
    /// Stores `bytes` under its content-derived id, if not already present.
    fn put(&self, realm: &RealmId, bytes: &[u8]) -> Result<BlobId>;

    /// Retrieves previously stored bytes by id.
    fn get(&self, realm: &RealmId, id: &BlobId) -> Result<Vec<u8>>;

    /// Reads a named root, or `None` if it has never been set.
    fn get_root(&self, realm: &RealmId, name: &str) -> Result<Option<BlobId>>;

    /// Points a named root at `id`, replacing whatever it pointed at before.
    fn set_root(&self, realm: &RealmId, name: &str, id: &BlobId) -> Result<()>;

    /// Acquires the realm's advisory lock, blocking until it is free.
    ///
    /// Callers should prefer [`Backend::lock_realm`], which releases the
    /// lock automatically; this method exists for backends and tests that
    /// need finer control.
    fn lock(&self, realm: &RealmId) -> Result<()>;

    /// Releases a lock previously acquired with [`Backend::lock`].
    fn unlock(&self, realm: &RealmId) -> Result<()>;

    /// Durably persists everything written to `realm` so far. Callers must
    /// flush after saving a realm's roots and before releasing its lock
    /// (`spec.md` §5: "save on roots precedes flush; flush precedes
    /// unlock").
    fn flush(&self, realm: &RealmId) -> Result<()>;

    /// Acquires the realm's lock and returns a guard that releases it on
    /// drop, so every exit path (including an early `?` return or a panic
    /// during unwind) releases the lock exactly once.
    fn lock_realm<'a>(&'a self, realm: &RealmId) -> Result<RealmLock<'a>>
    where
        Self: Sized,
    {
        self.lock(realm)?;
        Ok(RealmLock {
            backend: self,
            realm: realm.clone(),
            released: false,
        })
    }
}

/// RAII guard for a realm's advisory lock.
///
/// Holding one of these is the only way [`crate::pipeline`] and
/// [`crate::aggregate`] touch a realm's roots; the lock is released when
/// the guard drops, whether that happens at the end of a successful
/// operation or partway through an error return.
pub struct RealmLock<'a> {
    backend: &'a dyn Backend,
    realm: RealmId,
    released: bool,
}

impl<'a> RealmLock<'a> {
    pub fn realm(&self) -> &RealmId {
        &self.realm
    }

    /// Releases the lock early and reports any error from doing so,
    /// instead of swallowing it in `Drop`.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.backend.unlock(&self.realm)
    }
}

impl<'a> Drop for RealmLock<'a> {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.backend.unlock(&self.realm);
        }
    }
}

/// Equivalent to [`Backend::lock_realm`], callable through a trait object.
///
/// `lock_realm` takes `Self: Sized` so it can return `Self`-free `RealmLock`
/// values without boxing, but that bound makes it uncallable on `&dyn
/// Backend` — which is how [`crate::pipeline`] and [`crate::aggregate`] hold
/// their backends, since either may run against a `FilesystemBackend` or a
/// `MemoryBackend` chosen at the call site.
pub fn lock_realm<'a>(backend: &'a dyn Backend, realm: &RealmId) -> Result<RealmLock<'a>> {
    backend.lock(realm)?;
    Ok(RealmLock {
        backend,
        realm: realm.clone(),
        released: false,
    })
}
