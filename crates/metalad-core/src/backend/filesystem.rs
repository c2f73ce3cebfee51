//! A [`Backend`] that stores each realm as a directory tree on disk.
//!
//! Layout, under a realm's root directory:
//!
//! ```text
//! objects/<sha1>        content-addressed blobs
//! refs/<name>           named roots, each file holding one blob id
//! .lock                 advisory lock, held via exclusive file creation
//! ```
//!
//! This mirrors the reference store's flat, no-database layout: a realm is
//! just a directory, portable and inspectable with ordinary tools.

use std::fs;
use std::path::{Path as FsPath, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::types::{BlobId, RealmId};

use super::Backend;

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);
const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Filesystem-backed [`Backend`]. `root` is the directory under which each
/// realm gets its own subdirectory, named after [`RealmId`].
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FilesystemBackend { root: root.into() }
    }

    fn realm_dir(&self, realm: &RealmId) -> PathBuf {
        self.root.join(&realm.0)
    }

    fn objects_dir(&self, realm: &RealmId) -> PathBuf {
        self.realm_dir(realm).join("objects")
    }

    fn refs_dir(&self, realm: &RealmId) -> PathBuf {
        self.realm_dir(realm).join("refs")
    }

    fn lock_path(&self, realm: &RealmId) -> PathBuf {
        self.realm_dir(realm).join(".lock")
    }

    fn ensure_dirs(&self, realm: &RealmId) -> Result<()> {
        fs::create_dir_all(self.objects_dir(realm))?;
        fs::create_dir_all(self.refs_dir(realm))?;
        Ok(())
    }

    fn object_path(objects_dir: &FsPath, id: &BlobId) -> PathBuf {
        objects_dir.join(id.as_str())
    }
}

impl Backend for FilesystemBackend {
    fn put(&self, realm: &RealmId, bytes: &[u8]) -> Result<BlobId> {
        self.ensure_dirs(realm)?;
        let id = BlobId::of(bytes);
        let path = Self::object_path(&self.objects_dir(realm), &id);
        if !path.exists() {
            // Write to a temp file first so a crash mid-write never leaves
            // a blob readable under its final, content-derived name.
            let tmp = path.with_extension("tmp");
            fs::write(&tmp, bytes)?;
            fs::rename(&tmp, &path)?;
        }
        Ok(id)
    }

    fn get(&self, realm: &RealmId, id: &BlobId) -> Result<Vec<u8>> {
        let path = Self::object_path(&self.objects_dir(realm), id);
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                crate::error::blob_not_found(realm, id)
            } else {
                Error::from(e)
            }
        })
    }

    fn get_root(&self, realm: &RealmId, name: &str) -> Result<Option<BlobId>> {
        let path = self.refs_dir(realm).join(name);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(BlobId::from(contents.trim()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn set_root(&self, realm: &RealmId, name: &str, id: &BlobId) -> Result<()> {
        self.ensure_dirs(realm)?;
        let path = self.refs_dir(realm).join(name);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, id.as_str())?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn lock(&self, realm: &RealmId) -> Result<()> {
        self.ensure_dirs(realm)?;
        let path = self.lock_path(realm);
        let start = Instant::now();
        loop {
            match fs::OpenOptions::new().create_new(true).write(true).open(&path) {
                Ok(_) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if start.elapsed() > LOCK_TIMEOUT {
                        return Err(Error::LockError {
                            realm: realm.clone(),
                            message: "timed out waiting for lock".to_string(),
                        });
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(Error::from(e)),
            }
        }
    }

    fn unlock(&self, realm: &RealmId) -> Result<()> {
        let path = self.lock_path(realm);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::LockError {
                realm: realm.clone(),
                message: e.to_string(),
            }),
        }
    }

    /// Syncs `objects/` and `refs/` so renamed-in blobs and roots survive a
    /// crash, matching `spec.md` §5's "save on roots precedes flush; flush
    /// precedes unlock".
    fn flush(&self, realm: &RealmId) -> Result<()> {
        fs::File::open(self.objects_dir(realm))?.sync_all()?;
        fs::File::open(self.refs_dir(realm))?.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_is_content_addressed_and_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let realm = RealmId::from("r1");

        let id1 = backend.put(&realm, b"hello").unwrap();
        let id2 = backend.put(&realm, b"hello").unwrap();
        assert_eq!(id1, id2);
        assert_eq!(backend.get(&realm, &id1).unwrap(), b"hello");
    }

    #[test]
    fn roots_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let realm = RealmId::from("r1");

        assert!(backend.get_root(&realm, "tree_version_list").unwrap().is_none());
        let id = backend.put(&realm, b"payload").unwrap();
        backend.set_root(&realm, "tree_version_list", &id).unwrap();
        assert_eq!(
            backend.get_root(&realm, "tree_version_list").unwrap(),
            Some(id)
        );
    }

    #[test]
    fn lock_then_unlock_allows_relock() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let realm = RealmId::from("r1");

        backend.lock(&realm).unwrap();
        backend.unlock(&realm).unwrap();
        backend.lock(&realm).unwrap();
        backend.unlock(&realm).unwrap();
    }

    #[test]
    fn flush_succeeds_after_put_and_set_root() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let realm = RealmId::from("r1");

        let id = backend.put(&realm, b"payload").unwrap();
        backend.set_root(&realm, "tree_version_list", &id).unwrap();
        backend.flush(&realm).unwrap();
    }

    #[test]
    fn realm_lock_releases_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let realm = RealmId::from("r1");

        {
            let _guard = backend.lock_realm(&realm).unwrap();
            assert!(backend.lock_path(&realm).exists());
        }
        assert!(!backend.lock_path(&realm).exists());
    }
}
