//! The extraction pipeline: run one extractor and graft its result onto the
//! metadata graph.
//!
//! Step-for-step against `spec.md` §4.E, grounded on
//! `original_source/extract.py`'s `add_dataset_metadata_source` /
//! `add_file_metadata_source` / `get_top_nodes_and_mrr`.

use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::backend::{self, Backend};
use crate::error::{Error, Result};
use crate::extractor::{Extractor, ExtractorLookup, OutputCategory};
use crate::model::{Connector, ExtractorRun, MetadataRootRecord, VersionEntry};
use crate::realm;
use crate::types::{Format, Path, RealmId, Timestamp, Version};

/// Everything a single extraction invocation needs to know.
pub struct ExtractionParams<'a> {
    pub realm: RealmId,
    pub extractor_name: String,
    pub source_uuid: Uuid,
    pub source_version: Version,
    /// Where this dataset instance is mounted in the destination graph.
    pub dataset_tree_path: Path,
    /// `Some` for a file-level extraction; `None` for dataset-level,
    /// matching `spec.md` §6's "absent or equals the source dataset root".
    pub file_tree_path: Option<Path>,
    pub root_version: Version,
    pub agent_name: String,
    pub agent_email: String,
    pub lookup: &'a ExtractorLookup<'a>,
}

pub struct RunOutcome {
    pub extraction_success: bool,
}

fn now() -> Timestamp {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    Timestamp(secs as i64)
}

/// Runs `params.extractor_name` and appends its result to the graph,
/// creating whatever path to it is missing.
///
/// Acquires the realm's lock for the duration of the call; the lock is
/// released on every exit path, including an early `?` return, because it
/// is held through a [`backend::RealmLock`] guard.
pub fn run(backend: &dyn Backend, params: &ExtractionParams) -> Result<RunOutcome> {
    let _lock = backend::lock_realm(backend, &params.realm)?;

    let extractor = (params.lookup)(&params.extractor_name)
        .ok_or_else(|| Error::not_found(format!("extractor {}", params.extractor_name)))?;

    if extractor.output_category() == OutputCategory::Directory {
        return Err(Error::NotImplemented("DIRECTORY output category".to_string()));
    }

    let mut tvl = realm::load_tree_version_list(backend, &params.realm)?;
    let mut uuid_set = realm::load_uuid_set(backend, &params.realm)?;

    let timestamp = now();
    let mut mrr_snapshot: Option<MetadataRootRecord> = None;

    {
        let tvl_entry = tvl.get_or_insert(params.root_version.clone(), timestamp);
        let tree = tvl_entry.tree.get_mut(backend, &params.realm)?;

        if !tree.contains(&params.dataset_tree_path) {
            tree.add(
                params.dataset_tree_path.clone(),
                Connector::new(MetadataRootRecord::new(params.source_uuid, params.source_version.clone())),
            )?;
        }
        let mrr_conn = tree.get_mut(&params.dataset_tree_path).expect("just ensured present");
        let mrr = mrr_conn.get_mut(backend, &params.realm)?;

        if extract_and_record(backend, &params.realm, extractor.as_ref(), mrr, params, timestamp)? {
            mrr_snapshot = Some(mrr.clone());
        }
    }

    let extraction_success = mrr_snapshot.is_some();
    if let Some(mrr_clone) = mrr_snapshot {
        // Invariant 2: the UUIDSet entry must reach the *same* MRR as the
        // DatasetTree entry. Rather than share an in-memory reference (the
        // two live behind independent Connectors in independent parents),
        // a clone is written into both places and content-addressing does
        // the rest: identical bytes converge on the same BlobId once both
        // sides are saved.
        let version_list_conn = uuid_set.get_or_insert(params.source_uuid);
        let version_list = version_list_conn.get_mut(backend, &params.realm)?;
        version_list.upsert(
            params.source_version.clone(),
            VersionEntry {
                timestamp,
                path: params.dataset_tree_path.clone(),
                mrr: Connector::new(mrr_clone),
            },
        );
    }

    realm::save_tree_version_list(backend, &params.realm, &mut tvl)?;
    realm::save_uuid_set(backend, &params.realm, &mut uuid_set)?;
    backend.flush(&params.realm)?;

    Ok(RunOutcome { extraction_success })
}

/// Steps 7-8: obtain the right `Metadata` target (dataset- or file-level),
/// invoke the extractor, and append its run. Returns `false` without
/// mutating anything further if the extractor itself reports failure.
fn extract_and_record(
    backend: &dyn Backend,
    realm: &RealmId,
    extractor: &dyn Extractor,
    mrr: &mut MetadataRootRecord,
    params: &ExtractionParams,
    timestamp: Timestamp,
) -> Result<bool> {
    let category = extractor.output_category();
    let mut sink_bytes: Vec<u8> = Vec::new();
    let result = match category {
        OutputCategory::File => extractor.extract(&params.source_version, Some(&mut sink_bytes))?,
        OutputCategory::Immediate => extractor.extract(&params.source_version, None)?,
        OutputCategory::Directory => unreachable!("rejected by caller before this point"),
    };

    if !result.extraction_success {
        return Ok(false);
    }

    let payload = match category {
        OutputCategory::File => {
            let blob_id = backend.put(realm, &sink_bytes)?;
            serde_json::json!({"type": "blob", "location": blob_id.as_str()})
        }
        OutputCategory::Immediate => result.immediate_data.clone().unwrap_or(serde_json::Value::Null),
        OutputCategory::Directory => unreachable!(),
    };

    let run = ExtractorRun {
        extractor_name: params.extractor_name.clone(),
        extractor_version: result.extractor_version.clone(),
        format: Format::from(params.extractor_name.as_str()),
        parameter: result.extraction_parameter.clone(),
        timestamp,
        agent_name: params.agent_name.clone(),
        agent_email: params.agent_email.clone(),
        dataset_version: params.source_version.clone(),
        payload,
    };

    match &params.file_tree_path {
        Some(file_path) => {
            let file_tree = mrr.file_tree_mut().get_mut(backend, realm)?;
            file_tree.get_or_insert(file_path.clone()).get_mut(backend, realm)?.append(run);
        }
        None => {
            mrr.metadata_mut().get_mut(backend, realm)?.append(run);
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::backend::MemoryBackend;
    use crate::extractor::{ExtractionSink, ExtractorKind, ExtractorResult};

    struct ImmediateCore;
    impl Extractor for ImmediateCore {
        fn kind(&self) -> ExtractorKind {
            ExtractorKind::DatasetMetadataExtractor
        }
        fn output_category(&self) -> OutputCategory {
            OutputCategory::Immediate
        }
        fn extract(&self, version: &Version, _sink: Option<&mut dyn ExtractionSink>) -> Result<ExtractorResult> {
            Ok(ExtractorResult {
                extractor_version: "1".to_string(),
                extraction_parameter: serde_json::Value::Null,
                extraction_success: true,
                result_dict: serde_json::Value::Null,
                immediate_data: Some(serde_json::json!({"id": "uuid1", "refcommit": version.0})),
            })
        }
    }

    struct FileDumper;
    impl Extractor for FileDumper {
        fn kind(&self) -> ExtractorKind {
            ExtractorKind::FileMetadataExtractor
        }
        fn output_category(&self) -> OutputCategory {
            OutputCategory::File
        }
        fn extract(&self, _version: &Version, sink: Option<&mut dyn ExtractionSink>) -> Result<ExtractorResult> {
            sink.unwrap().write_all(b"{\"x\":1}").unwrap();
            Ok(ExtractorResult {
                extractor_version: "1".to_string(),
                extraction_parameter: serde_json::Value::Null,
                extraction_success: true,
                result_dict: serde_json::Value::Null,
                immediate_data: None,
            })
        }
    }

    fn params<'a>(lookup: &'a ExtractorLookup<'a>, uuid: Uuid, file_tree_path: Option<Path>) -> ExtractionParams<'a> {
        ExtractionParams {
            realm: RealmId::from("r1"),
            extractor_name: "core".to_string(),
            source_uuid: uuid,
            source_version: Version::from("v1"),
            dataset_tree_path: Path::root(),
            file_tree_path,
            root_version: Version::from("v1"),
            agent_name: "tester".to_string(),
            agent_email: "tester@example.org".to_string(),
            lookup,
        }
    }

    #[test]
    fn s1_single_dataset_level_extraction() {
        let backend = MemoryBackend::new();
        let uuid = Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap();
        let lookup: &ExtractorLookup = &|name| {
            if name == "core" {
                Some(Box::new(ImmediateCore) as Box<dyn Extractor>)
            } else {
                None
            }
        };

        let outcome = run(&backend, &params(lookup, uuid, None)).unwrap();
        assert!(outcome.extraction_success);

        let mut tvl = realm::load_tree_version_list(&backend, &RealmId::from("r1")).unwrap();
        assert_eq!(tvl.versions().count(), 1);
        let entry = tvl.get_mut(&Version::from("v1")).unwrap();
        let tree = entry.tree.get_mut(&backend, &RealmId::from("r1")).unwrap();
        let mrr_conn = tree.get_mut(&Path::root()).unwrap();
        let mrr = mrr_conn.get_mut(&backend, &RealmId::from("r1")).unwrap();
        assert_eq!(mrr.dataset_uuid, uuid);
        let metadata = mrr.metadata_mut().get_mut(&backend, &RealmId::from("r1")).unwrap();
        assert_eq!(metadata.runs().len(), 1);

        let mut uuid_set = realm::load_uuid_set(&backend, &RealmId::from("r1")).unwrap();
        let version_list = uuid_set
            .get_mut(&uuid)
            .unwrap()
            .get_mut(&backend, &RealmId::from("r1"))
            .unwrap();
        assert_eq!(version_list.versions().count(), 1);
        let entry = version_list.get(&Version::from("v1")).unwrap();
        assert_eq!(entry.path, Path::root());
    }

    #[test]
    fn s2_file_level_extraction_records_blob_payload() {
        let backend = MemoryBackend::new();
        let uuid = Uuid::parse_str("22222222-2222-2222-2222-222222222222").unwrap();
        let lookup: &ExtractorLookup = &|name| {
            if name == "core" {
                Some(Box::new(FileDumper) as Box<dyn Extractor>)
            } else {
                None
            }
        };

        let outcome = run(&backend, &params(lookup, uuid, Some(Path::from("a/b.txt")))).unwrap();
        assert!(outcome.extraction_success);

        let mut tvl = realm::load_tree_version_list(&backend, &RealmId::from("r1")).unwrap();
        let entry = tvl.get_mut(&Version::from("v1")).unwrap();
        let tree = entry.tree.get_mut(&backend, &RealmId::from("r1")).unwrap();
        let mrr_conn = tree.get_mut(&Path::root()).unwrap();
        let mrr = mrr_conn.get_mut(&backend, &RealmId::from("r1")).unwrap();
        let file_tree = mrr.file_tree_mut().get_mut(&backend, &RealmId::from("r1")).unwrap();
        let metadata_conn = file_tree.get_or_insert(Path::from("a/b.txt"));
        let metadata = metadata_conn.get_mut(&backend, &RealmId::from("r1")).unwrap();
        let run_record = &metadata.runs()[0];
        let location = run_record.payload.get("location").unwrap().as_str().unwrap();
        assert_eq!(
            backend.get(&RealmId::from("r1"), &crate::types::BlobId::from(location)).unwrap(),
            b"{\"x\":1}"
        );
    }
}
