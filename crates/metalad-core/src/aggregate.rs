//! The aggregation engine: merging a source realm's metadata graph into a
//! destination realm under an intra-destination path.
//!
//! Grounded on `original_source/aggregate.py`'s `perform_aggregation` /
//! `copy_uuid_set` / `copy_tree_version_list`.

use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::backend::{self, Backend, ROOT_TREE_VERSION_LIST, ROOT_UUID_SET};
use crate::error::{Error, Result};
use crate::model::{Connector, DatasetTree, FileTree, Metadata, MetadataRootRecord, TreeVersionList, UUIDSet, VersionEntry, VersionList};
use crate::realm;
use crate::types::{BlobId, Path, RealmId, Timestamp, Version};

/// One sub-collection to merge into the destination graph.
pub struct AggregateItem<'a> {
    pub source_backend: &'a dyn Backend,
    pub source_realm: RealmId,
    /// Intra-destination path this sub-collection is mounted at.
    pub destination_path: Path,
    /// Maps a source root version to the destination root versions whose
    /// tree at `destination_path` already materially contains it — the
    /// caller's job, since resolving this means asking a
    /// [`crate::containment::ContainmentProbe`] questions about how the two
    /// realms' *underlying version-control backing* (not this graph) relate,
    /// which only the caller can turn into filesystem paths for the probe
    /// to walk.
    pub destination_versions_for: &'a dyn Fn(&Version) -> Result<Vec<Version>>,
}

/// What happened to one [`AggregateItem`].
#[derive(Clone, Debug)]
pub enum AggregateItemResult {
    Ok,
    /// The source realm had no recorded metadata graph at all; the item was
    /// skipped and aggregation continued with the rest.
    MissingSource { message: String },
    /// No destination root version's tree at `destination_path` already
    /// contained one or more of the source's root versions. Per
    /// `SPEC_FULL.md` §4.F, aggregation does not synthesize a new
    /// destination root version for these; the UUID-set half of the merge
    /// still completed, only the tree-version-list half is incomplete for
    /// the listed versions.
    DetachedMetadata { versions: Vec<Version> },
}

fn now() -> Timestamp {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    Timestamp(secs as i64)
}

/// Parses the external CLI surface's flat `(path, realm)` pair list
/// (`spec.md` §6), rejecting an odd-length list with `InvalidArgument`
/// before any mutation happens (scenario S6).
pub fn parse_item_pairs(flat: &[String]) -> Result<Vec<(Path, RealmId)>> {
    if flat.len() % 2 != 0 {
        return Err(Error::InvalidArgument(
            "(path, realm) list must have an even number of elements".to_string(),
        ));
    }
    Ok(flat
        .chunks(2)
        .map(|pair| (Path::from(pair[0].as_str()), RealmId::from(pair[1].as_str())))
        .collect())
}

/// Merges every item into the destination realm's graph, locking the
/// destination for the whole call and releasing it on every exit path.
/// Sources are read without locking, per `spec.md` §4.F's lock discipline.
pub fn aggregate(
    destination_backend: &dyn Backend,
    destination_realm: &RealmId,
    items: &[AggregateItem],
) -> Result<Vec<AggregateItemResult>> {
    let _lock = backend::lock_realm(destination_backend, destination_realm)?;

    let mut dest_tvl = realm::load_tree_version_list(destination_backend, destination_realm)?;
    let mut dest_uuid_set = realm::load_uuid_set(destination_backend, destination_realm)?;
    let timestamp = now();

    let mut results = Vec::with_capacity(items.len());

    for item in items {
        let tvl_root = item.source_backend.get_root(&item.source_realm, ROOT_TREE_VERSION_LIST)?;
        let uuid_root = item.source_backend.get_root(&item.source_realm, ROOT_UUID_SET)?;
        if tvl_root.is_none() && uuid_root.is_none() {
            results.push(AggregateItemResult::MissingSource {
                message: format!("no metadata graph found in realm {}", item.source_realm),
            });
            continue;
        }

        let mut source_tvl = realm::load_tree_version_list(item.source_backend, &item.source_realm)?;
        let mut source_uuid_set = realm::load_uuid_set(item.source_backend, &item.source_realm)?;

        copy_uuid_set(
            item.source_backend,
            &item.source_realm,
            &mut source_uuid_set,
            destination_backend,
            destination_realm,
            &mut dest_uuid_set,
            &item.destination_path,
        )?;

        let detached = copy_tree_version_list(
            item.source_backend,
            &item.source_realm,
            &mut source_tvl,
            destination_backend,
            destination_realm,
            &mut dest_tvl,
            &item.destination_path,
            item.destination_versions_for,
            timestamp,
        )?;

        results.push(if detached.is_empty() {
            AggregateItemResult::Ok
        } else {
            AggregateItemResult::DetachedMetadata { versions: detached }
        });
    }

    realm::save_tree_version_list(destination_backend, destination_realm, &mut dest_tvl)?;
    realm::save_uuid_set(destination_backend, destination_realm, &mut dest_uuid_set)?;
    destination_backend.flush(destination_realm)?;

    Ok(results)
}

/// `copy_uuid_set`: for every UUID in the source, either adopt a
/// path-rewritten deep copy of its whole `VersionList` (if absent from the
/// destination) or merge version-by-version (if already present),
/// preserving invariant 2 (a `(uuid, version)` entry always resolves to an
/// MRR whose own `(uuid, version)` matches).
fn copy_uuid_set(
    src_backend: &dyn Backend,
    src_realm: &RealmId,
    source_uuid_set: &mut UUIDSet,
    dst_backend: &dyn Backend,
    dst_realm: &RealmId,
    dest_uuid_set: &mut UUIDSet,
    destination_path: &Path,
) -> Result<()> {
    let uuids: Vec<Uuid> = source_uuid_set.uuids().copied().collect();

    for uuid in uuids {
        let already_present = dest_uuid_set.get(&uuid).is_some();
        let src_vl_conn = source_uuid_set.get_mut(&uuid).expect("uuid from uuids()");

        if !already_present {
            let src_vl = src_vl_conn.get_mut(src_backend, src_realm)?;
            let new_vl = deepcopy_version_list(src_backend, src_realm, src_vl, dst_backend, dst_realm, destination_path)?;
            dest_uuid_set.insert(uuid, Connector::new(new_vl));
        } else {
            let src_vl = src_vl_conn.get_mut(src_backend, src_realm)?;
            let versions: Vec<Version> = src_vl.versions().cloned().collect();
            let dest_vl = dest_uuid_set
                .get_mut(&uuid)
                .expect("checked present above")
                .get_mut(dst_backend, dst_realm)?;

            for version in versions {
                let entry = src_vl.get_mut(&version).expect("version from versions()");
                let new_mrr = deepcopy_mrr(src_backend, src_realm, &mut entry.mrr, dst_backend, dst_realm)?;
                let new_path = destination_path.join(&entry.path);
                dest_vl.upsert(
                    version,
                    VersionEntry {
                        timestamp: entry.timestamp,
                        path: new_path,
                        mrr: Connector::new(new_mrr),
                    },
                );
            }
        }

        src_vl_conn.evict();
    }

    Ok(())
}

/// `copy_tree_version_list`: for every source root version, ask the caller
/// which destination root versions already materially contain it at
/// `destination_path`; for each, replace any colliding subtree and insert a
/// deep copy of the source's tree. Root versions with no match are reported
/// back as detached rather than synthesizing a destination root version.
fn copy_tree_version_list(
    src_backend: &dyn Backend,
    src_realm: &RealmId,
    source_tvl: &mut TreeVersionList,
    dst_backend: &dyn Backend,
    dst_realm: &RealmId,
    dest_tvl: &mut TreeVersionList,
    destination_path: &Path,
    destination_versions_for: &dyn Fn(&Version) -> Result<Vec<Version>>,
    timestamp: Timestamp,
) -> Result<Vec<Version>> {
    let mut detached = Vec::new();
    let source_versions: Vec<Version> = source_tvl.versions().cloned().collect();

    for source_pd_version in source_versions {
        let destination_roots = destination_versions_for(&source_pd_version)?;
        if destination_roots.is_empty() {
            detached.push(source_pd_version);
            continue;
        }

        let entry = source_tvl.get_mut(&source_pd_version).expect("version from versions()");
        let source_tree = entry.tree.get_mut(src_backend, src_realm)?;

        for root_pd_version in &destination_roots {
            let dest_entry = dest_tvl.get_or_insert(root_pd_version.clone(), timestamp);
            let dest_tree = dest_entry.tree.get_mut(dst_backend, dst_realm)?;

            if dest_tree.subtree(destination_path).next().is_some() {
                tracing::warn!(
                    path = %destination_path,
                    root_version = %root_pd_version,
                    "replacing existing subtree during aggregation"
                );
                dest_tree.delete_subtree(destination_path);
            }

            let copied_subtree = deepcopy_dataset_tree(src_backend, src_realm, source_tree, dst_backend, dst_realm)?;
            dest_tree.add_subtree(copied_subtree, destination_path);
            dest_entry.timestamp = timestamp;
        }

        entry.tree.evict();
    }

    Ok(detached)
}

fn deepcopy_dataset_tree(
    src_backend: &dyn Backend,
    src_realm: &RealmId,
    source_tree: &mut DatasetTree,
    dst_backend: &dyn Backend,
    dst_realm: &RealmId,
) -> Result<DatasetTree> {
    let mut copy = DatasetTree::new();
    let paths: Vec<Path> = source_tree.paths().cloned().collect();
    for path in paths {
        let mrr_conn = source_tree.get_mut(&path).expect("path from paths()");
        let new_mrr = deepcopy_mrr(src_backend, src_realm, mrr_conn, dst_backend, dst_realm)?;
        copy.insert(path, Connector::new(new_mrr));
    }
    Ok(copy)
}

fn deepcopy_version_list(
    src_backend: &dyn Backend,
    src_realm: &RealmId,
    version_list: &mut VersionList,
    dst_backend: &dyn Backend,
    dst_realm: &RealmId,
    path_prefix: &Path,
) -> Result<VersionList> {
    let mut copy = VersionList::new();
    let versions: Vec<Version> = version_list.versions().cloned().collect();
    for version in versions {
        let entry = version_list.get_mut(&version).expect("version from versions()");
        let new_mrr = deepcopy_mrr(src_backend, src_realm, &mut entry.mrr, dst_backend, dst_realm)?;
        let new_path = path_prefix.join(&entry.path);
        copy.upsert(
            version,
            VersionEntry {
                timestamp: entry.timestamp,
                path: new_path,
                mrr: Connector::new(new_mrr),
            },
        );
    }
    Ok(copy)
}

fn deepcopy_mrr(
    src_backend: &dyn Backend,
    src_realm: &RealmId,
    mrr_conn: &mut Connector<MetadataRootRecord>,
    dst_backend: &dyn Backend,
    dst_realm: &RealmId,
) -> Result<MetadataRootRecord> {
    let mrr = mrr_conn.get_mut(src_backend, src_realm)?;
    let mut copy = MetadataRootRecord::new(mrr.dataset_uuid, mrr.dataset_version.clone());

    if let Some(metadata_conn) = mrr.metadata.as_mut() {
        let metadata = metadata_conn.get_mut(src_backend, src_realm)?;
        let new_metadata = deepcopy_metadata(src_backend, src_realm, metadata, dst_backend, dst_realm)?;
        copy.metadata = Some(Connector::new(new_metadata));
        metadata_conn.evict();
    }
    if let Some(file_tree_conn) = mrr.file_tree.as_mut() {
        let file_tree = file_tree_conn.get_mut(src_backend, src_realm)?;
        let new_file_tree = deepcopy_file_tree(src_backend, src_realm, file_tree, dst_backend, dst_realm)?;
        copy.file_tree = Some(Connector::new(new_file_tree));
        file_tree_conn.evict();
    }

    mrr_conn.evict();
    Ok(copy)
}

fn deepcopy_file_tree(
    src_backend: &dyn Backend,
    src_realm: &RealmId,
    file_tree: &mut FileTree,
    dst_backend: &dyn Backend,
    dst_realm: &RealmId,
) -> Result<FileTree> {
    let mut copy = FileTree::new();
    let paths: Vec<Path> = file_tree.paths().cloned().collect();
    for path in paths {
        let conn = file_tree.get_mut(&path).expect("path from paths()");
        let metadata = conn.get_mut(src_backend, src_realm)?;
        let new_metadata = deepcopy_metadata(src_backend, src_realm, metadata, dst_backend, dst_realm)?;
        copy.insert(path, Connector::new(new_metadata));
        conn.evict();
    }
    Ok(copy)
}

fn deepcopy_metadata(
    src_backend: &dyn Backend,
    src_realm: &RealmId,
    metadata: &Metadata,
    dst_backend: &dyn Backend,
    dst_realm: &RealmId,
) -> Result<Metadata> {
    let mut copy = Metadata::new();
    for run in metadata.runs() {
        let mut new_run = run.clone();
        new_run.payload = deepcopy_payload(src_backend, src_realm, &run.payload, dst_backend, dst_realm)?;
        copy.append(new_run);
    }
    Ok(copy)
}

/// Rewrites a `{"type": "blob", "location": <id>}` payload by copying the
/// referenced bytes into the destination realm and pointing at the
/// (likely identical, since content-addressed) id there. Any other shape
/// of payload — an `IMMEDIATE` extractor's structured value — carries no
/// blob reference and is copied verbatim.
fn deepcopy_payload(
    src_backend: &dyn Backend,
    src_realm: &RealmId,
    payload: &serde_json::Value,
    dst_backend: &dyn Backend,
    dst_realm: &RealmId,
) -> Result<serde_json::Value> {
    if let Some(location) = payload
        .as_object()
        .filter(|obj| obj.get("type").and_then(|t| t.as_str()) == Some("blob"))
        .and_then(|obj| obj.get("location"))
        .and_then(|l| l.as_str())
    {
        let bytes = src_backend.get(src_realm, &BlobId::from(location))?;
        let new_id = dst_backend.put(dst_realm, &bytes)?;
        return Ok(serde_json::json!({"type": "blob", "location": new_id.as_str()}));
    }
    Ok(payload.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn uuid(n: u8) -> Uuid {
        Uuid::from_bytes([n; 16])
    }

    fn seed_source_with_uuid_only(backend: &dyn Backend, realm: &RealmId, id: Uuid, version: &Version) {
        let mut uuid_set = UUIDSet::new();
        let mut vl = VersionList::new();
        vl.upsert(
            version.clone(),
            VersionEntry {
                timestamp: Timestamp(1),
                path: Path::root(),
                mrr: Connector::new(MetadataRootRecord::new(id, version.clone())),
            },
        );
        uuid_set.insert(id, Connector::new(vl));
        realm::save_uuid_set(backend, realm, &mut uuid_set).unwrap();
        realm::save_tree_version_list(backend, realm, &mut TreeVersionList::new()).unwrap();
    }

    #[test]
    fn s4_path_rewriting_on_fresh_destination_uuid() {
        let backend = MemoryBackend::new();
        let source_realm = RealmId::from("source");
        let dest_realm = RealmId::from("dest");
        let u = uuid(2);
        let source_version = Version::from("vS");

        seed_source_with_uuid_only(&backend, &source_realm, u, &source_version);

        let always_empty = |_: &Version| -> Result<Vec<Version>> { Ok(Vec::new()) };
        let item = AggregateItem {
            source_backend: &backend,
            source_realm: source_realm.clone(),
            destination_path: Path::from("sub1/sub2"),
            destination_versions_for: &always_empty,
        };

        let results = aggregate(&backend, &dest_realm, &[item]).unwrap();
        assert_eq!(results.len(), 1);
        // The source's TreeVersionList is empty in this fixture, so the
        // tree-merge half trivially has nothing to report as detached;
        // this scenario is only exercising the UUID-set half of the merge.
        assert!(matches!(results[0], AggregateItemResult::Ok));

        let mut dest_uuid_set = realm::load_uuid_set(&backend, &dest_realm).unwrap();
        let vl = dest_uuid_set.get_mut(&u).unwrap().get_mut(&backend, &dest_realm).unwrap();
        let entry = vl.get(&source_version).unwrap();
        assert_eq!(entry.path, Path::from("sub1/sub2"));
    }

    #[test]
    fn s6_odd_length_pair_list_rejected() {
        let flat = vec!["a".to_string(), "realm-a".to_string(), "b".to_string()];
        let err = parse_item_pairs(&flat).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn missing_source_graph_is_reported_and_skipped() {
        let backend = MemoryBackend::new();
        let dest_realm = RealmId::from("dest");
        let source_realm = RealmId::from("empty-source");

        let always_empty = |_: &Version| -> Result<Vec<Version>> { Ok(Vec::new()) };
        let item = AggregateItem {
            source_backend: &backend,
            source_realm: source_realm.clone(),
            destination_path: Path::root(),
            destination_versions_for: &always_empty,
        };

        let results = aggregate(&backend, &dest_realm, &[item]).unwrap();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], AggregateItemResult::MissingSource { .. }));
    }

    #[test]
    fn aggregation_is_idempotent() {
        let backend = MemoryBackend::new();
        let source_realm = RealmId::from("source");
        let dest_realm = RealmId::from("dest");
        let u = uuid(3);
        let source_version = Version::from("vS");
        seed_source_with_uuid_only(&backend, &source_realm, u, &source_version);

        let always_empty = |_: &Version| -> Result<Vec<Version>> { Ok(Vec::new()) };
        for _ in 0..2 {
            let item = AggregateItem {
                source_backend: &backend,
                source_realm: source_realm.clone(),
                destination_path: Path::from("sub"),
                destination_versions_for: &always_empty,
            };
            aggregate(&backend, &dest_realm, &[item]).unwrap();
        }

        let mut dest_uuid_set = realm::load_uuid_set(&backend, &dest_realm).unwrap();
        let vl = dest_uuid_set.get_mut(&u).unwrap().get_mut(&backend, &dest_realm).unwrap();
        assert_eq!(vl.versions().count(), 1);
    }
}
