use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use prettytable::{Table, cell, row};
use uuid::Uuid;

use metalad_core::aggregate::{self, AggregateItem, AggregateItemResult};
use metalad_core::backend::FilesystemBackend;
use metalad_core::containment::{ContainmentProbe, GitContainmentProbe};
use metalad_core::extractor::Registry;
use metalad_core::pipeline::{self, ExtractionParams};
use metalad_core::realm;
use metalad_core::{Path, RealmId, Result, Version};

#[derive(Parser, Debug)]
#[command(name = "meta", about = "Versioned dataset metadata: extraction and aggregation")]
struct Cli {
    /// Root directory holding one subdirectory per realm.
    #[arg(short = 's', long, global = true, default_value = ".metalad")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an extractor and record its result in a realm's metadata graph.
    Extract(ExtractArgs),
    /// Merge a sub-collection's metadata graph into a parent realm.
    Aggregate(AggregateArgs),
    /// List the dataset versions recorded in a realm's UUID set.
    List(ListArgs),
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Name the extractor is registered under.
    extractor_name: String,
    /// Realm the source dataset's metadata graph lives in.
    #[arg(long)]
    source_dataset: String,
    /// Realm to write results into, if different from `source_dataset`.
    #[arg(long)]
    destination_dataset: Option<String>,
    /// Path within the dataset tree; absent or equal to the root means a
    /// dataset-level extraction rather than file-level.
    #[arg(long)]
    path: Option<String>,
    #[arg(long)]
    uuid: Uuid,
    #[arg(long)]
    version: String,
    /// Root version to key the destination's tree-version-list entry under;
    /// defaults to `version` when the extraction targets its own realm.
    #[arg(long)]
    root_version: Option<String>,
    #[arg(long, default_value = "meta")]
    agent_name: String,
    #[arg(long, default_value = "")]
    agent_email: String,
}

#[derive(Args, Debug)]
struct AggregateArgs {
    /// Realm the sub-collections are merged into.
    destination: String,
    /// Flattened `(sub_path, sub_realm)` pairs.
    items: Vec<String>,
    /// Version-containment probe kind. `"git"` is the only value currently
    /// implemented.
    #[arg(long, default_value = "git")]
    backend: String,
    /// Reserved: recursive aggregation through nested sub-collections is not
    /// yet implemented.
    #[arg(long)]
    recursive: bool,
}

#[derive(Args, Debug)]
struct ListArgs {
    realm: String,
}

/// Plugin discovery is an external concern (`SPEC_FULL.md` §9): this CLI
/// ships no concrete extractor implementations, so `meta extract` only
/// succeeds against extractors a wrapping application registers here before
/// running. Kept as the `Registry` convenience type so adding one is a
/// single `register` call.
fn build_registry() -> Registry {
    Registry::new()
}

fn structured_result(action: &str, backend: &str, realm: &str, status: &str, message: &str) {
    println!(
        "{}",
        serde_json::json!({
            "action": action,
            "backend": backend,
            "realm": realm,
            "status": status,
            "message": message,
        })
    );
}

fn run_extract(store: &PathBuf, args: ExtractArgs) -> Result<()> {
    let backend = FilesystemBackend::new(store.clone());
    let registry = build_registry();
    let lookup_impl = registry.as_lookup();
    let lookup: &metalad_core::extractor::ExtractorLookup = &lookup_impl;

    let source_realm = RealmId::from(args.source_dataset.as_str());
    let destination_realm = args
        .destination_dataset
        .as_deref()
        .map(RealmId::from)
        .unwrap_or_else(|| source_realm.clone());

    // Per spec.md §6: when destination differs from source, the dataset's
    // mount point in the destination graph is the relative path from
    // destination to source; a bare CLI invocation has no notion of that
    // relationship beyond realm identity, so it defaults to the root and a
    // wrapping caller with real path knowledge is expected to aggregate
    // separately if it needs a different mount point.
    let dataset_tree_path = Path::root();
    let file_tree_path = args.path.as_deref().map(Path::from).filter(|p| !p.is_root());

    let version = Version::from(args.version.as_str());
    let root_version = args.root_version.map(Version::from).unwrap_or_else(|| version.clone());

    let params = ExtractionParams {
        realm: destination_realm.clone(),
        extractor_name: args.extractor_name.clone(),
        source_uuid: args.uuid,
        source_version: version,
        dataset_tree_path,
        file_tree_path,
        root_version,
        agent_name: args.agent_name,
        agent_email: args.agent_email,
        lookup,
    };

    match pipeline::run(&backend, &params) {
        Ok(outcome) if outcome.extraction_success => {
            structured_result("extract", "filesystem", &destination_realm.0, "ok", &args.extractor_name);
            Ok(())
        }
        Ok(_) => {
            structured_result(
                "extract",
                "filesystem",
                &destination_realm.0,
                "error",
                "extractor reported failure",
            );
            Ok(())
        }
        Err(e) => {
            structured_result("extract", "filesystem", &destination_realm.0, "error", &e.to_string());
            Err(e)
        }
    }
}

fn run_aggregate(store: &PathBuf, args: AggregateArgs) -> Result<()> {
    if args.recursive {
        return Err(metalad_core::Error::NotImplemented("recursive aggregation".to_string()));
    }
    if args.backend != "git" {
        return Err(metalad_core::Error::NotImplemented(format!("containment probe backend {}", args.backend)));
    }

    let backend = FilesystemBackend::new(store.clone());
    let destination_realm = RealmId::from(args.destination.as_str());
    let pairs = aggregate::parse_item_pairs(&args.items)?;

    // The probe's closure is built per item below, since it needs to close
    // over that item's own (path, realm) pair.
    let mut closures: Vec<Box<dyn Fn(&Version) -> Result<Vec<Version>>>> = Vec::with_capacity(pairs.len());
    for (sub_path, sub_realm) in &pairs {
        let destination_dir = store.join(&destination_realm.0).join(sub_path.as_str());
        let sub_dir = store.join(&sub_realm.0);
        closures.push(Box::new(move |version: &Version| {
            GitContainmentProbe.containing_versions(&destination_dir, &sub_dir, version)
        }));
    }

    let items: Vec<AggregateItem> = pairs
        .iter()
        .zip(closures.iter())
        .map(|((path, realm), closure)| AggregateItem {
            source_backend: &backend,
            source_realm: realm.clone(),
            destination_path: path.clone(),
            destination_versions_for: closure.as_ref(),
        })
        .collect();

    let results = aggregate::aggregate(&backend, &destination_realm, &items)?;

    for ((_, sub_realm), result) in pairs.iter().zip(results.iter()) {
        match result {
            AggregateItemResult::Ok => {
                structured_result("aggregate", "git", &sub_realm.0, "ok", "");
            }
            AggregateItemResult::MissingSource { message } => {
                structured_result("aggregate", "git", &sub_realm.0, "error", message);
            }
            AggregateItemResult::DetachedMetadata { versions } => {
                let message = format!(
                    "no destination root version contains: {}",
                    versions.iter().map(|v| v.0.clone()).collect::<Vec<_>>().join(", ")
                );
                structured_result("aggregate", "git", &sub_realm.0, "ok", &message);
            }
        }
    }

    Ok(())
}

fn run_list(store: &PathBuf, args: ListArgs) -> Result<()> {
    let backend = FilesystemBackend::new(store.clone());
    let realm = RealmId::from(args.realm.as_str());
    let mut uuid_set = realm::load_uuid_set(&backend, &realm)?;

    let mut table = Table::new();
    table.add_row(row!["uuid", "version", "path"]);

    for uuid in uuid_set.uuids().copied().collect::<Vec<_>>() {
        let version_list = uuid_set.get_mut(&uuid).expect("uuid from uuids()").get_mut(&backend, &realm)?;
        for version in version_list.versions().cloned().collect::<Vec<_>>() {
            let entry = version_list.get(&version).expect("version from versions()");
            table.add_row(row![uuid, version, entry.path]);
        }
    }

    table.printstd();
    Ok(())
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Extract(args) => run_extract(&cli.store, args),
        Command::Aggregate(args) => run_aggregate(&cli.store, args),
        Command::List(args) => run_list(&cli.store, args),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
