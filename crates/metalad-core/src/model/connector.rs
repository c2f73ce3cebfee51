//! Lazy loading and saving of graph nodes.
//!
//! The metadata graph is a tree of nodes connected by [`BlobId`]s rather
//! than by in-memory references, so an operation that only touches one
//! corner of a large graph (say, one dataset's [`crate::model::VersionList`]
//! inside a collection's [`crate::model::UUIDSet`]) never has to pull the
//! whole graph into memory first. [`Connector`] is the pointer type that
//! makes this possible: it starts out knowing only a node's id, loads the
//! node on first access, and knows when it has been mutated and needs to
//! be written back.

use std::mem;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::error::Result;
use crate::types::{BlobId, RealmId};

/// A node type that can be persisted to and loaded from a [`Backend`] as a
/// single opaque blob.
///
/// Blanket-implemented for every `Serialize + DeserializeOwned` type using
/// JSON, so model types never need their own hand-written (de)serialization
/// glue; adding a field to a node is enough to change its wire shape.
pub trait StoredNode: Sized {
    fn load_from(backend: &dyn Backend, realm: &RealmId, id: &BlobId) -> Result<Self>;
    fn save_to(&self, backend: &dyn Backend, realm: &RealmId) -> Result<BlobId>;
}

impl<T> StoredNode for T
where
    T: Serialize + DeserializeOwned,
{
    fn load_from(backend: &dyn Backend, realm: &RealmId, id: &BlobId) -> Result<Self> {
        let bytes = backend.get(realm, id)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn save_to(&self, backend: &dyn Backend, realm: &RealmId) -> Result<BlobId> {
        let bytes = serde_json::to_vec(self)?;
        backend.put(realm, &bytes)
    }
}

/// A reference to a graph node that may or may not currently be loaded.
///
/// * `Unloaded(id)` — only the id is known; nothing has been fetched yet.
/// * `Loaded(value)` — a value is in hand, but has no known id because it
///   is new or has been mutated since it was last saved.
/// * `Both(id, value)` — the value is in hand and is known to match what
///   is stored under `id`; saving is a no-op.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "T: Serialize + DeserializeOwned")]
pub enum Connector<T> {
    Unloaded(BlobId),
    Loaded(T),
    Both(BlobId, T),
}

impl<T> Connector<T> {
    pub fn new(value: T) -> Self {
        Connector::Loaded(value)
    }

    pub fn from_id(id: BlobId) -> Self {
        Connector::Unloaded(id)
    }

    /// The node's id, if known. `None` for a value that has been created
    /// or mutated but not yet saved.
    pub fn id(&self) -> Option<&BlobId> {
        match self {
            Connector::Unloaded(id) | Connector::Both(id, _) => Some(id),
            Connector::Loaded(_) => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        !matches!(self, Connector::Unloaded(_))
    }
}

impl<T: StoredNode> Connector<T> {
    /// Returns a shared reference to the value, loading it first if needed.
    pub fn get(&mut self, backend: &dyn Backend, realm: &RealmId) -> Result<&T> {
        if let Connector::Unloaded(id) = self {
            let value = T::load_from(backend, realm, id)?;
            *self = Connector::Both(id.clone(), value);
        }
        match self {
            Connector::Loaded(v) | Connector::Both(_, v) => Ok(v),
            Connector::Unloaded(_) => unreachable!("just loaded"),
        }
    }

    /// Returns a mutable reference, loading first if needed and marking
    /// the node dirty so the next [`Connector::save`] rewrites it even if
    /// the caller's mutation happens to be a no-op.
    pub fn get_mut(&mut self, backend: &dyn Backend, realm: &RealmId) -> Result<&mut T> {
        let placeholder = Connector::Unloaded(BlobId::from(""));
        let taken = mem::replace(self, placeholder);
        let value = match taken {
            Connector::Loaded(v) | Connector::Both(_, v) => v,
            Connector::Unloaded(id) => T::load_from(backend, realm, &id)?,
        };
        *self = Connector::Loaded(value);
        match self {
            Connector::Loaded(v) => Ok(v),
            _ => unreachable!("just set to Loaded"),
        }
    }

    /// Persists the value if it is dirty, returning its id either way.
    pub fn save(&mut self, backend: &dyn Backend, realm: &RealmId) -> Result<BlobId> {
        match self {
            Connector::Both(id, _) | Connector::Unloaded(id) => Ok(id.clone()),
            Connector::Loaded(_) => {
                let placeholder = Connector::Unloaded(BlobId::from(""));
                let taken = mem::replace(self, placeholder);
                if let Connector::Loaded(value) = taken {
                    let id = value.save_to(backend, realm)?;
                    *self = Connector::Both(id.clone(), value);
                    Ok(id)
                } else {
                    unreachable!("matched Loaded above")
                }
            }
        }
    }

    /// Drops the in-memory value, keeping only its id, so a large subtree
    /// that has just been saved can be released without another save.
    pub fn evict(&mut self) {
        if let Connector::Both(id, _) = self {
            *self = Connector::Unloaded(id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    #[test]
    fn load_then_save_round_trips() {
        let backend = MemoryBackend::new();
        let realm = RealmId::from("r1");

        let mut connector: Connector<String> = Connector::new("hello".to_string());
        let id = connector.save(&backend, &realm).unwrap();
        connector.evict();
        assert!(matches!(connector, Connector::Unloaded(_)));

        let value = connector.get(&backend, &realm).unwrap();
        assert_eq!(value, "hello");
        assert_eq!(connector.id(), Some(&id));
    }

    #[test]
    fn get_mut_dirties_node() {
        let backend = MemoryBackend::new();
        let realm = RealmId::from("r1");

        let mut connector: Connector<String> = Connector::new("a".to_string());
        let id_before = connector.save(&backend, &realm).unwrap();
        connector.get_mut(&backend, &realm).unwrap().push('b');
        let id_after = connector.save(&backend, &realm).unwrap();
        assert_ne!(id_before, id_after);
        assert_eq!(connector.get(&backend, &realm).unwrap(), "ab");
    }
}
