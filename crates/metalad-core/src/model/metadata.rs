//! Extraction results attached to a path.

use serde::{Deserialize, Serialize};

use crate::types::{Format, Timestamp, Version};

/// One extractor invocation's recorded output.
///
/// `payload` is the extractor's result document, stored verbatim: for an
/// `IMMEDIATE`-category extractor this is its structured result dict; for a
/// `FILE`-category extractor the pipeline replaces the large written
/// content with a small `{"type": "blob", "location": <id>}` pointer at the
/// blob it stored separately (see [`crate::extractor::OutputCategory`]).
/// Either way the field is a plain JSON value, matching how the reference
/// implementation records a `metadata_source` dict regardless of where the
/// bytes it points at actually live.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractorRun {
    pub extractor_name: String,
    pub extractor_version: String,
    pub format: Format,
    pub parameter: serde_json::Value,
    pub timestamp: Timestamp,
    pub agent_name: String,
    pub agent_email: String,
    /// Version of the dataset the extractor ran against, which may differ
    /// from the version a destination graph later files this run under
    /// once aggregation rewrites paths.
    pub dataset_version: Version,
    pub payload: serde_json::Value,
}

/// An append-only log of extraction results for one path.
///
/// Runs are never removed or rewritten in place; a re-extraction with the
/// same format simply appends another entry, and [`Metadata::latest`]
/// resolves which one is current.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Metadata {
    runs: Vec<ExtractorRun>,
}

impl Metadata {
    pub fn new() -> Self {
        Metadata::default()
    }

    pub fn runs(&self) -> &[ExtractorRun] {
        &self.runs
    }

    pub fn append(&mut self, run: ExtractorRun) {
        self.runs.push(run);
    }

    /// The most recently appended run for `format`, if any.
    pub fn latest(&self, format: &Format) -> Option<&ExtractorRun> {
        self.runs.iter().rev().find(|run| &run.format == format)
    }

    pub fn formats(&self) -> impl Iterator<Item = &Format> {
        let mut seen = std::collections::BTreeSet::new();
        self.runs.iter().filter_map(move |run| {
            if seen.insert(run.format.clone()) {
                Some(&run.format)
            } else {
                None
            }
        })
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
