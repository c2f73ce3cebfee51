//! The version-containment probe: given a sub-collection version at a known
//! path under a parent, find parent versions whose tree materially
//! references it.
//!
//! Grounded on `original_source/aggregate.py`'s
//! `get_root_version_for_subset_version` / `find_version_containing`.

use std::path::{Path as FsPath, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};
use crate::types::Version;

/// Asks a version-control backend which version of a directory's tree
/// references a given object.
pub trait ContainmentProbe {
    /// Returns the version of `dir`'s tree containing `object_id`, or `None`
    /// if no such version is found.
    fn find_version_containing(&self, dir: &FsPath, object_id: &str) -> Result<Option<Version>>;

    /// Whether `dir` itself is a repository root for this probe's VCS (has
    /// its marker directory, e.g. `.git`), as opposed to a plain directory
    /// nested inside one.
    fn is_repository_root(&self, dir: &FsPath) -> bool;

    /// Walks from `sub_path`'s parent up to `parent_root` (inclusive),
    /// asking at each VCS-marked directory which version references the
    /// version found at the previous (more nested) step. Directories
    /// without the VCS marker are skipped, matching the reference
    /// implementation's handling of plain (non-repository) nesting.
    ///
    /// Returns a single-element list with the version found at the
    /// outermost step, or an empty list if any step along the way finds
    /// nothing.
    fn containing_versions(&self, parent_root: &FsPath, sub_path: &FsPath, sub_version: &Version) -> Result<Vec<Version>> {
        if !sub_path.starts_with(parent_root) {
            return Err(Error::InvalidArgument(format!(
                "{} is not nested under {}",
                sub_path.display(),
                parent_root.display()
            )));
        }

        let mut current_version = sub_version.clone();
        let mut dir = sub_path.parent().map(PathBuf::from).unwrap_or_else(|| sub_path.to_path_buf());

        loop {
            if self.is_repository_root(&dir) {
                match self.find_version_containing(&dir, &current_version.0)? {
                    Some(version) => current_version = version,
                    None => return Ok(Vec::new()),
                }
            }

            if dir == parent_root {
                break;
            }
            match dir.parent() {
                Some(parent) if parent.starts_with(parent_root) || parent == parent_root => {
                    dir = parent.to_path_buf();
                }
                _ => break,
            }
        }

        Ok(vec![current_version])
    }
}

/// A [`ContainmentProbe`] backed by shelling out to `git`.
///
/// Matches the reference implementation's `subprocess.run` call precisely:
/// same arguments, same parsing of stdout (the first abbreviated-or-not
/// commit hash line, trimmed).
pub struct GitContainmentProbe;

impl ContainmentProbe for GitContainmentProbe {
    fn find_version_containing(&self, dir: &FsPath, object_id: &str) -> Result<Option<Version>> {
        let output = Command::new("git")
            .arg("log")
            .arg(format!("--find-object={}", object_id))
            .arg("--pretty=tformat:%h")
            .arg("--no-abbrev")
            .current_dir(dir)
            .output()
            .map_err(|e| Error::backend(format!("failed to run git: {}", e)))?;

        if !output.status.success() {
            return Ok(None);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.lines().next() {
            Some(line) if !line.trim().is_empty() => Ok(Some(Version::from(line.trim()))),
            _ => Ok(None),
        }
    }

    fn is_repository_root(&self, dir: &FsPath) -> bool {
        dir.join(".git").exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// A probe that answers from a fixed table instead of shelling out,
    /// so the walk logic can be tested without a real git repository.
    struct FakeProbe {
        roots: Vec<PathBuf>,
        answers: Mutex<HashMap<(PathBuf, String), Option<Version>>>,
    }

    impl ContainmentProbe for FakeProbe {
        fn find_version_containing(&self, dir: &FsPath, object_id: &str) -> Result<Option<Version>> {
            Ok(self
                .answers
                .lock()
                .unwrap()
                .get(&(dir.to_path_buf(), object_id.to_string()))
                .cloned()
                .flatten())
        }

        fn is_repository_root(&self, dir: &FsPath) -> bool {
            self.roots.iter().any(|r| r == dir)
        }
    }

    #[test]
    fn walk_resolves_through_one_repository_boundary() {
        let parent_root = PathBuf::from("/parent");
        let sub_path = PathBuf::from("/parent/sub1/sub2");

        let mut answers = HashMap::new();
        answers.insert((parent_root.clone(), "vS".to_string()), Some(Version::from("vR")));

        let probe = FakeProbe {
            roots: vec![parent_root.clone()],
            answers: Mutex::new(answers),
        };

        let result = probe
            .containing_versions(&parent_root, &sub_path, &Version::from("vS"))
            .unwrap();
        assert_eq!(result, vec![Version::from("vR")]);
    }

    #[test]
    fn missing_answer_yields_empty_result() {
        let parent_root = PathBuf::from("/parent");
        let sub_path = PathBuf::from("/parent/sub1/sub2");

        let probe = FakeProbe {
            roots: vec![parent_root.clone()],
            answers: Mutex::new(HashMap::new()),
        };

        let result = probe
            .containing_versions(&parent_root, &sub_path, &Version::from("vS"))
            .unwrap();
        assert!(result.is_empty());
    }
}
