//! The extractor plugin protocol: what an extractor is, and how the
//! pipeline looks one up by name.
//!
//! Grounded on `original_source/extract.py`'s `MetadataExtractorBase` split
//! into dataset- and file-level extractors, and `extractors/core_dataset.py`
//! for a concrete shape of `extract()`'s result.

use crate::error::Result;
use crate::types::Version;

/// Whether an extractor runs once per dataset, or once per file within one.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExtractorKind {
    DatasetMetadataExtractor,
    FileMetadataExtractor,
}

/// How an extractor's output is meant to be stored.
///
/// `Directory` is reserved: accepted as a value but not yet handled by
/// [`crate::pipeline`], which returns [`crate::Error::NotImplemented`] if an
/// extractor declares it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputCategory {
    Immediate,
    File,
    Directory,
}

/// What an extractor invocation produced.
#[derive(Clone, Debug)]
pub struct ExtractorResult {
    pub extractor_version: String,
    pub extraction_parameter: serde_json::Value,
    pub extraction_success: bool,
    pub result_dict: serde_json::Value,
    /// Populated only for [`OutputCategory::Immediate`] extractors.
    pub immediate_data: Option<serde_json::Value>,
}

/// A place for a [`OutputCategory::File`] extractor to write its output, so
/// the pipeline can hash exactly the bytes it wrote into the backend
/// without the extractor needing to know anything about blob storage.
pub trait ExtractionSink: std::io::Write {}
impl<T: std::io::Write> ExtractionSink for T {}

/// An extractor implementation.
pub trait Extractor {
    fn kind(&self) -> ExtractorKind;
    fn output_category(&self) -> OutputCategory;

    /// Whether file content must be locally available before [`Extractor::extract`]
    /// is called. Meaningless for dataset-level extractors.
    fn is_content_required(&self) -> bool {
        false
    }

    /// Runs the extractor. `sink` is `Some` only when
    /// [`Extractor::output_category`] is [`OutputCategory::File`]; the
    /// extractor writes its payload there instead of returning it inline.
    fn extract(&self, dataset_version: &Version, sink: Option<&mut dyn ExtractionSink>) -> Result<ExtractorResult>;
}

/// A lookup function from extractor name to a constructed [`Extractor`].
///
/// The core takes this as a plain closure rather than owning a global
/// registry (see `SPEC_FULL.md` §9 / `spec.md` §9): discovery is an external
/// concern, plugin crates register themselves with whatever mechanism the
/// embedding application prefers.
pub type ExtractorLookup<'a> = dyn Fn(&str) -> Option<Box<dyn Extractor>> + 'a;

/// A convenience registry for callers who want "last registration wins,
/// with a warning on override" — the policy `original_source/extract.py`'s
/// `get_extractor_class` applies to `iter_entry_points` results.
///
/// Not required by [`crate::pipeline::run`], which takes an
/// [`ExtractorLookup`] closure directly; this exists for callers who'd
/// rather not write their own.
#[derive(Default)]
pub struct Registry {
    factories: std::collections::HashMap<String, Box<dyn Fn() -> Box<dyn Extractor>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Registers `factory` under `name`. If `name` was already registered,
    /// the new registration wins and a warning is emitted, matching the
    /// reference implementation's override-detection behavior.
    pub fn register(&mut self, name: impl Into<String>, factory: impl Fn() -> Box<dyn Extractor> + 'static) {
        let name = name.into();
        if self.factories.contains_key(&name) {
            tracing::warn!(extractor = %name, "overriding previously registered extractor");
        }
        self.factories.insert(name, Box::new(factory));
    }

    pub fn get(&self, name: &str) -> Option<Box<dyn Extractor>> {
        self.factories.get(name).map(|factory| factory())
    }

    /// Borrows this registry as an [`ExtractorLookup`] closure.
    pub fn as_lookup(&self) -> impl Fn(&str) -> Option<Box<dyn Extractor>> + '_ {
        move |name| self.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Immediate;
    impl Extractor for Immediate {
        fn kind(&self) -> ExtractorKind {
            ExtractorKind::DatasetMetadataExtractor
        }
        fn output_category(&self) -> OutputCategory {
            OutputCategory::Immediate
        }
        fn extract(&self, _version: &Version, _sink: Option<&mut dyn ExtractionSink>) -> Result<ExtractorResult> {
            Ok(ExtractorResult {
                extractor_version: "1".to_string(),
                extraction_parameter: serde_json::Value::Null,
                extraction_success: true,
                result_dict: serde_json::Value::Null,
                immediate_data: Some(serde_json::json!({"ok": true})),
            })
        }
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = Registry::new();
        registry.register("core", || Box::new(Immediate));
        registry.register("core", || Box::new(Immediate));
        let extractor = registry.get("core").unwrap();
        assert_eq!(extractor.output_category(), OutputCategory::Immediate);
        assert!(registry.get("missing").is_none());
    }
}
