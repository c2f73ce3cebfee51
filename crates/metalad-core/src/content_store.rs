//! Append-only blob file plus a JSON sidecar index, keyed by `(path, format)`.
//!
//! A cheaper alternative to routing every small extraction result through
//! the opaque [`crate::backend::Backend`]: one `content` file holds bytes
//! back to back, `index.json` records where each `(path, format)` pair's
//! bytes start and how long they run.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Format, Path};

const INDEX_VERSION: &str = "SimpleFileIndex-0.1";
const INDEX_FILE: &str = "index.json";
const CONTENT_FILE: &str = "content";
const ITERATOR_CHUNK: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct Region {
    offset: u64,
    size: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Index {
    version: String,
    paths: BTreeMap<Path, BTreeMap<Format, Region>>,
    dataset_paths: BTreeMap<Path, serde_json::Value>,
    deleted_regions: Vec<Region>,
}

impl Index {
    fn empty() -> Self {
        Index {
            version: INDEX_VERSION.to_string(),
            paths: BTreeMap::new(),
            dataset_paths: BTreeMap::new(),
            deleted_regions: Vec::new(),
        }
    }
}

/// A directory holding one `content` file and its `index.json` sidecar.
///
/// Mirrors the reference store's on-disk shape exactly (see
/// `original_source/metadata_store/simplefile_index.py` and
/// `filestorage_backend.py`): nothing here is a database, just an append log
/// and a JSON map of where things landed in it.
pub struct ContentStore {
    dir: PathBuf,
    index: Index,
    dirty: bool,
}

impl ContentStore {
    /// Opens `dir`, creating it and an empty index if nothing exists yet.
    ///
    /// A missing index is not an error: the reference implementation treats
    /// it as a fresh, empty store and logs a warning, which this mirrors via
    /// `tracing::warn!` rather than `LOGGER.warning`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let index_path = dir.join(INDEX_FILE);
        let index = match fs::read(&index_path) {
            Ok(bytes) => {
                let index: Index = serde_json::from_slice(&bytes)?;
                if index.version != INDEX_VERSION {
                    return Err(Error::VersionMismatch {
                        expected: INDEX_VERSION.to_string(),
                        found: index.version,
                    });
                }
                index
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %index_path.display(), "no index found at path, synthesizing an empty one");
                Index::empty()
            }
            Err(e) => return Err(Error::from(e)),
        };
        Ok(ContentStore { dir, index, dirty: false })
    }

    fn content_path(&self) -> PathBuf {
        self.dir.join(CONTENT_FILE)
    }

    fn content_len(&self) -> Result<u64> {
        match fs::metadata(self.content_path()) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(Error::from(e)),
        }
    }

    /// Registers `path` as known, with no formats yet. Fails if `path` is
    /// already indexed, either as a plain path or as a dataset root.
    pub fn add_path(&mut self, path: Path) -> Result<()> {
        if self.index.paths.contains_key(&path) || self.index.dataset_paths.contains_key(&path) {
            return Err(Error::PathAlreadyExists(path));
        }
        self.index.paths.insert(path, BTreeMap::new());
        self.dirty = true;
        Ok(())
    }

    /// Marks `path` as a dataset root, attaching `meta` as its recorded
    /// dataset-level metadata-about-metadata.
    pub fn set_dataset_entry(&mut self, path: Path, meta: serde_json::Value) -> Result<()> {
        self.index.dataset_paths.insert(path, meta);
        self.dirty = true;
        Ok(())
    }

    /// Appends `bytes` to the content file and records where they landed.
    /// Fails with `MetadataAlreadyExists` if `(path, format)` is already
    /// indexed.
    pub fn add_metadata_to_path(&mut self, path: &Path, format: Format, bytes: &[u8]) -> Result<()> {
        if let Some(formats) = self.index.paths.get(path) {
            if formats.contains_key(&format) {
                return Err(Error::MetadataAlreadyExists {
                    path: path.clone(),
                    format: format.0,
                });
            }
        }
        let offset = self.content_len()?;
        let mut file = fs::OpenOptions::new().create(true).append(true).open(self.content_path())?;
        file.write_all(bytes)?;
        let region = Region { offset, size: bytes.len() as u64 };
        self.index.paths.entry(path.clone()).or_default().insert(format, region);
        self.dirty = true;
        Ok(())
    }

    /// Equivalent to a delete followed by an add at the same `(path, format)`.
    pub fn replace_metadata_at_path(&mut self, path: &Path, format: Format, bytes: &[u8]) -> Result<()> {
        let _ = self.delete_metadata_from_path(path, &format, false);
        self.add_metadata_to_path(path, format, bytes)
    }

    /// Moves `(path, format)`'s region into `deleted_regions`. If `path`'s
    /// format map becomes empty and `auto_delete_path` is set, the path
    /// itself is dropped from the index.
    pub fn delete_metadata_from_path(&mut self, path: &Path, format: &Format, auto_delete_path: bool) -> Result<()> {
        let formats = self
            .index
            .paths
            .get_mut(path)
            .ok_or_else(|| Error::not_found(format!("path {}", path)))?;
        let region = formats
            .remove(format)
            .ok_or_else(|| Error::not_found(format!("format {} at path {}", format, path)))?;
        self.index.deleted_regions.push(region);
        if formats.is_empty() && auto_delete_path {
            self.index.paths.remove(path);
        }
        self.dirty = true;
        Ok(())
    }

    pub fn get_metadata(&self, path: &Path, format: &Format) -> Result<Vec<u8>> {
        let region = self.region(path, format)?;
        let mut file = fs::File::open(self.content_path())?;
        file.seek(SeekFrom::Start(region.offset))?;
        let mut buf = vec![0u8; region.size as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// A lazy byte reader over `(path, format)`'s region, for callers that
    /// don't want the whole blob in memory at once.
    pub fn metadata_iterator(&self, path: &Path, format: &Format) -> Result<MetadataIterator> {
        let region = self.region(path, format)?;
        let mut file = fs::File::open(self.content_path())?;
        file.seek(SeekFrom::Start(region.offset))?;
        Ok(MetadataIterator {
            file,
            remaining: region.size,
        })
    }

    fn region(&self, path: &Path, format: &Format) -> Result<Region> {
        self.index
            .paths
            .get(path)
            .and_then(|formats| formats.get(format))
            .copied()
            .ok_or_else(|| Error::not_found(format!("format {} at path {}", format, path)))
    }

    /// Every indexed path, optionally filtered by a regex against its
    /// string form, alongside whether it is a dataset root.
    pub fn get_paths(&self, pattern: Option<&str>) -> Result<Vec<(Path, bool)>> {
        let re = pattern
            .map(Regex::new)
            .transpose()
            .map_err(|e| Error::InvalidArgument(e.to_string()))?;
        let matches = |p: &Path| re.as_ref().map_or(true, |r| r.is_match(p.as_str()));

        let mut result: Vec<(Path, bool)> = self
            .index
            .paths
            .keys()
            .filter(|p| matches(p))
            .map(|p| (p.clone(), self.index.dataset_paths.contains_key(p)))
            .collect();
        for path in self.index.dataset_paths.keys() {
            if !self.index.paths.contains_key(path) && matches(path) {
                result.push((path.clone(), true));
            }
        }
        Ok(result)
    }

    pub fn len(&self) -> usize {
        self.index.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.paths.is_empty()
    }

    pub fn deleted_region_count(&self) -> usize {
        self.index.deleted_regions.len()
    }

    /// Writes the index back to disk, if anything has changed since the
    /// last flush.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let bytes = serde_json::to_vec_pretty(&self.index)?;
        let path = self.dir.join(INDEX_FILE);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        self.dirty = false;
        Ok(())
    }

    /// Creates a new store at `out_dir` whose content file is the
    /// concatenation `left || right`, with every path from `left` rekeyed
    /// under `left_prefix` and every path from `right` rekeyed under
    /// `right_prefix` (right's offsets shifted past left's content length).
    ///
    /// The returned store is dirty and must be [`ContentStore::flush`]ed by
    /// the caller.
    pub fn join(
        out_dir: impl Into<PathBuf>,
        left_prefix: &Path,
        left: &ContentStore,
        right_prefix: &Path,
        right: &ContentStore,
    ) -> Result<ContentStore> {
        let out_dir = out_dir.into();
        if left.dir == right.dir {
            return Err(Error::InvalidArgument("join requires two distinct stores".to_string()));
        }
        if left_prefix == right_prefix {
            return Err(Error::InvalidArgument("join requires distinct prefixes".to_string()));
        }
        if out_dir == left.dir || out_dir == right.dir {
            return Err(Error::InvalidArgument(
                "join output directory must differ from both inputs".to_string(),
            ));
        }
        fs::create_dir_all(&out_dir)?;

        let left_bytes = fs::read(left.content_path()).unwrap_or_default();
        let right_bytes = fs::read(right.content_path()).unwrap_or_default();
        let shift = left_bytes.len() as u64;

        let mut content = left_bytes;
        content.extend_from_slice(&right_bytes);
        fs::write(out_dir.join(CONTENT_FILE), &content)?;

        let mut index = Index::empty();
        for (path, formats) in &left.index.paths {
            index.paths.insert(left_prefix.join(path), formats.clone());
        }
        for (path, meta) in &left.index.dataset_paths {
            index.dataset_paths.insert(left_prefix.join(path), meta.clone());
        }
        index.deleted_regions.extend(left.index.deleted_regions.iter().copied());

        for (path, formats) in &right.index.paths {
            let shifted: BTreeMap<Format, Region> = formats
                .iter()
                .map(|(f, r)| {
                    (
                        f.clone(),
                        Region {
                            offset: r.offset + shift,
                            size: r.size,
                        },
                    )
                })
                .collect();
            index.paths.insert(right_prefix.join(path), shifted);
        }
        for (path, meta) in &right.index.dataset_paths {
            index.dataset_paths.insert(right_prefix.join(path), meta.clone());
        }
        index.deleted_regions.extend(right.index.deleted_regions.iter().map(|r| Region {
            offset: r.offset + shift,
            size: r.size,
        }));

        Ok(ContentStore {
            dir: out_dir,
            index,
            dirty: true,
        })
    }
}

/// A lazy, chunked byte reader returned by [`ContentStore::metadata_iterator`].
pub struct MetadataIterator {
    file: fs::File,
    remaining: u64,
}

impl Iterator for MetadataIterator {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let to_read = std::cmp::min(ITERATOR_CHUNK as u64, self.remaining) as usize;
        let mut buf = vec![0u8; to_read];
        match self.file.read_exact(&mut buf) {
            Ok(()) => {
                self.remaining -= to_read as u64;
                Some(Ok(buf))
            }
            Err(e) => Some(Err(Error::from(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = ContentStore::open(dir.path()).unwrap();
            store.add_metadata_to_path(&Path::from("a"), Format::from("fmt1"), b"hello").unwrap();
            store.add_metadata_to_path(&Path::from("b"), Format::from("fmt1"), b"world").unwrap();
            store.flush().unwrap();
        }

        let store = ContentStore::open(dir.path()).unwrap();
        assert_eq!(store.get_metadata(&Path::from("a"), &Format::from("fmt1")).unwrap(), b"hello");
        assert_eq!(store.get_metadata(&Path::from("b"), &Format::from("fmt1")).unwrap(), b"world");
        let mut paths: Vec<_> = store.get_paths(None).unwrap();
        paths.sort();
        assert_eq!(paths, vec![(Path::from("a"), false), (Path::from("b"), false)]);
    }

    #[test]
    fn unrecognized_index_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(INDEX_FILE), br#"{"version":"SimpleFileIndex-9.9","paths":{},"dataset_paths":{},"deleted_regions":[]}"#).unwrap();
        let err = ContentStore::open(dir.path()).unwrap_err();
        assert!(matches!(err, Error::VersionMismatch { .. }));
    }

    #[test]
    fn duplicate_metadata_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ContentStore::open(dir.path()).unwrap();
        store.add_metadata_to_path(&Path::from("a"), Format::from("fmt1"), b"x").unwrap();
        let err = store.add_metadata_to_path(&Path::from("a"), Format::from("fmt1"), b"y").unwrap_err();
        assert!(matches!(err, Error::MetadataAlreadyExists { .. }));
    }

    #[test]
    fn delete_then_readd_and_auto_delete_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ContentStore::open(dir.path()).unwrap();
        store.add_metadata_to_path(&Path::from("a"), Format::from("fmt1"), b"x").unwrap();

        store.delete_metadata_from_path(&Path::from("a"), &Format::from("fmt1"), true).unwrap();
        assert_eq!(store.deleted_region_count(), 1);
        assert!(store.get_metadata(&Path::from("a"), &Format::from("fmt1")).is_err());
        assert!(store.is_empty());

        store.add_metadata_to_path(&Path::from("a"), Format::from("fmt1"), b"z").unwrap();
        assert_eq!(store.get_metadata(&Path::from("a"), &Format::from("fmt1")).unwrap(), b"z");
    }

    #[test]
    fn join_rekeys_and_preserves_bytes() {
        let left_dir = tempfile::tempdir().unwrap();
        let right_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();

        let mut left = ContentStore::open(left_dir.path()).unwrap();
        left.set_dataset_entry(Path::root(), serde_json::json!({"id": "left-ds"})).unwrap();
        left.add_metadata_to_path(&Path::from("e0"), Format::from("ng_file"), b"left #0").unwrap();
        left.flush().unwrap();

        let mut right = ContentStore::open(right_dir.path()).unwrap();
        right.set_dataset_entry(Path::root(), serde_json::json!({"id": "right-ds"})).unwrap();
        right.add_metadata_to_path(&Path::from("e0"), Format::from("ng_file"), b"right #0").unwrap();
        right.flush().unwrap();

        let mut joined = ContentStore::join(out_dir.path(), &Path::from("left"), &left, &Path::from("right"), &right).unwrap();
        joined.flush().unwrap();

        assert_eq!(joined.get_metadata(&Path::from("left/e0"), &Format::from("ng_file")).unwrap(), b"left #0");
        assert_eq!(joined.get_metadata(&Path::from("right/e0"), &Format::from("ng_file")).unwrap(), b"right #0");
        assert_eq!(joined.len(), 2);
    }
}
