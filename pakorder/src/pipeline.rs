//! Concurrent metadata extraction over every package file.
//!
//! The pipeline fans one inspection task out per package file across a
//! bounded worker pool, reusing cached records where they exist, and joins
//! every dispatched task before returning (fan-out/fan-in, no partial
//! results). Task completion order is unrelated to host priority; all
//! ordering is imposed later by the settings synthesizer.
//!
//! Per-file failures never cross the task boundary as panics or errors:
//! each task yields an explicit [`TaskOutcome`] whose record degrades to
//! the empty record under any failure, tagged with the reason.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::classify::classify;
use crate::host::ModEntry;
use crate::inspector::PakInspector;
use crate::meta::{parse_meta_lsx, PakRecord};

/// Upper cap on concurrent extraction workers, matching the external
/// tool's tolerable process fan-out.
pub const DEFAULT_WORKER_CAP: usize = 4;

/// File name of the module descriptor inside an extracted package.
const DESCRIPTOR_FILE: &str = "meta.lsx";

/// Why one task degraded to an empty or unclassified record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    /// The external tool failed to extract the package.
    ExtractionFailed(String),

    /// The extracted tree holds no module descriptor. Not an error; the
    /// empty record is cached as final.
    DescriptorMissing,

    /// The descriptor exists but could not be read or parsed.
    DescriptorParseError(String),

    /// The archive listing was unavailable; the record keeps its
    /// attributes but classifies as non-overriding.
    ListingUnavailable(String),
}

/// Result of processing one package file.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// Owning mod name.
    pub mod_name: String,

    /// Package file name within the mod.
    pub file_name: String,

    /// The record now held in the cache for this file.
    pub record: PakRecord,

    /// Failure tag when the task degraded, `None` on a clean run.
    pub failure: Option<TaskFailure>,

    /// Whether the record was reused from the cache without dispatching.
    pub cache_hit: bool,
}

/// Aggregated result of one pipeline run.
#[derive(Debug, Default)]
pub struct PipelineRun {
    /// One outcome per package file, cache hits first, then dispatched
    /// tasks in dispatch order.
    pub outcomes: Vec<TaskOutcome>,
}

impl PipelineRun {
    /// Collect the surviving records keyed by mod name and file name.
    pub fn records(&self) -> BTreeMap<String, BTreeMap<String, PakRecord>> {
        let mut records: BTreeMap<String, BTreeMap<String, PakRecord>> = BTreeMap::new();
        for outcome in &self.outcomes {
            records
                .entry(outcome.mod_name.clone())
                .or_default()
                .insert(outcome.file_name.clone(), outcome.record.clone());
        }
        records
    }

    /// Number of cache hits in this run.
    pub fn cache_hits(&self) -> usize {
        self.outcomes.iter().filter(|o| o.cache_hit).count()
    }
}

/// Long-lived extraction pipeline with a fixed-size worker pool.
pub struct ExtractionPipeline {
    inspector: Arc<dyn PakInspector>,
    cache: Arc<CacheStore>,
    semaphore: Arc<Semaphore>,
}

impl ExtractionPipeline {
    /// Create a pipeline sized to `min(available_parallelism, cap)`.
    pub fn new(inspector: Arc<dyn PakInspector>, cache: Arc<CacheStore>) -> Self {
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(DEFAULT_WORKER_CAP);
        Self::with_workers(inspector, cache, workers)
    }

    /// Create a pipeline with an explicit worker count.
    pub fn with_workers(
        inspector: Arc<dyn PakInspector>,
        cache: Arc<CacheStore>,
        workers: usize,
    ) -> Self {
        Self {
            inspector,
            cache,
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Process every package file of every active mod.
    ///
    /// Mods are iterated in host-priority order; files already cached are
    /// reused without dispatching. The call returns only once every
    /// dispatched task has completed.
    pub async fn run(&self, mods: &[ModEntry]) -> PipelineRun {
        let mut outcomes = Vec::new();
        let mut handles = Vec::new();

        for entry in mods {
            if !entry.state.active {
                continue;
            }

            for pak in entry.pak_files() {
                let Some(file_name) = pak
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(str::to_string)
                else {
                    continue;
                };

                if let Some(record) = self.cache.get(&entry.name, &file_name) {
                    debug!(mod_name = %entry.name, file = %file_name, "cache hit");
                    outcomes.push(TaskOutcome {
                        mod_name: entry.name.clone(),
                        file_name,
                        record,
                        failure: None,
                        cache_hit: true,
                    });
                    continue;
                }

                handles.push((
                    entry.name.clone(),
                    file_name.clone(),
                    self.dispatch(entry.name.clone(), file_name, pak),
                ));
            }
        }

        for (mod_name, file_name, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    // A panicked task still yields an explicit outcome so
                    // the fan-in barrier holds for its siblings.
                    warn!(mod_name = %mod_name, file = %file_name, error = %e,
                        "extraction task aborted");
                    outcomes.push(TaskOutcome {
                        mod_name,
                        file_name,
                        record: PakRecord::empty(),
                        failure: Some(TaskFailure::ExtractionFailed(e.to_string())),
                        cache_hit: false,
                    });
                }
            }
        }

        PipelineRun { outcomes }
    }

    fn dispatch(
        &self,
        mod_name: String,
        file_name: String,
        pak: PathBuf,
    ) -> tokio::task::JoinHandle<TaskOutcome> {
        let inspector = Arc::clone(&self.inspector);
        let cache = Arc::clone(&self.cache);
        let semaphore = Arc::clone(&self.semaphore);

        tokio::spawn(async move {
            // The semaphore lives as long as the pipeline and is never
            // closed.
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("extraction semaphore closed");

            let result = tokio::task::spawn_blocking(move || {
                let (record, failure) = process_pak(inspector.as_ref(), &pak);

                if let Some(failure) = &failure {
                    debug!(mod_name = %mod_name, file = %file_name, ?failure,
                        "task degraded");
                }
                if let Err(e) = cache.put(&mod_name, &file_name, record.clone()) {
                    warn!(mod_name = %mod_name, file = %file_name, error = %e,
                        "failed to persist record");
                }

                TaskOutcome {
                    mod_name,
                    file_name,
                    record,
                    failure,
                    cache_hit: false,
                }
            })
            .await;

            match result {
                Ok(outcome) => outcome,
                // Unreachable unless the blocking closure panicked; the
                // identifying fields moved into it, so the caller fills
                // them back in via the handle bookkeeping.
                Err(e) => std::panic::resume_unwind(e.into_panic()),
            }
        })
    }
}

/// Extract, parse, and classify one package file.
///
/// The scratch directory is unique per invocation and removed on every
/// exit path when the guard drops.
fn process_pak(inspector: &dyn PakInspector, pak: &Path) -> (PakRecord, Option<TaskFailure>) {
    let scratch = match tempfile::Builder::new().prefix("pakorder-").tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            return (
                PakRecord::empty(),
                Some(TaskFailure::ExtractionFailed(e.to_string())),
            )
        }
    };
    let dest = scratch.path().join("extracted");

    if let Err(e) = inspector.extract(pak, &dest) {
        return (
            PakRecord::empty(),
            Some(TaskFailure::ExtractionFailed(e.to_string())),
        );
    }

    let Some(descriptor_path) = find_descriptor(&dest) else {
        return (PakRecord::empty(), Some(TaskFailure::DescriptorMissing));
    };

    let xml = match fs::read_to_string(&descriptor_path) {
        Ok(xml) => xml,
        Err(e) => {
            return (
                PakRecord::empty(),
                Some(TaskFailure::DescriptorParseError(e.to_string())),
            )
        }
    };
    let descriptor = match parse_meta_lsx(&xml) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            return (
                PakRecord::empty(),
                Some(TaskFailure::DescriptorParseError(e.to_string())),
            )
        }
    };

    let (listing, listing_failure) = match inspector.list(pak) {
        Ok(listing) => (listing, None),
        Err(e) => (Vec::new(), Some(TaskFailure::ListingUnavailable(e.to_string()))),
    };

    let classification = classify(descriptor.folder(), &listing);
    let record = PakRecord {
        override_builtin: classification.override_builtin,
        load_order: classification.load_order,
        attributes: descriptor.attributes,
    };

    (record, listing_failure)
}

/// Locate the first module descriptor in an extracted tree, files before
/// subdirectories, both in sorted order.
fn find_descriptor(dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;

    let mut files = Vec::new();
    let mut dirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        } else {
            files.push(path);
        }
    }
    files.sort();
    dirs.sort();

    files
        .into_iter()
        .find(|path| path.file_name().is_some_and(|name| name == DESCRIPTOR_FILE))
        .or_else(|| dirs.iter().find_map(|dir| find_descriptor(dir)))
}
