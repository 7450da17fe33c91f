//! End-to-end settings generation for one profile.
//!
//! The generator owns the long-lived pipeline and runs the whole flow:
//! tool precondition check, cache pruning, concurrent extraction, document
//! synthesis, atomic write. Per-file failures never abort a run; a run
//! that can synthesize some valid document (the built-in module at
//! minimum) always completes and writes output.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::host::{ModEntry, Profile};
use crate::inspector::{InspectorError, PakInspector};
use crate::pipeline::{ExtractionPipeline, TaskOutcome};
use crate::settings;

/// Errors that abort a generation run.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// The inspection tool is unusable; no package can be processed.
    #[error(transparent)]
    Tool(#[from] InspectorError),

    /// The output document could not be synthesized or written.
    #[error(transparent)]
    Settings(#[from] settings::SettingsError),
}

/// Result of one successful generation run.
#[derive(Debug)]
pub struct GeneratedSettings {
    /// Where the document was written.
    pub path: PathBuf,

    /// The document content, byte-for-byte as written.
    pub document: String,

    /// Per-file outcomes from the extraction pipeline.
    pub outcomes: Vec<TaskOutcome>,
}

impl GeneratedSettings {
    /// Number of files whose task degraded to an empty or unclassified
    /// record.
    pub fn degraded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.failure.is_some()).count()
    }
}

/// Orchestrates metadata aggregation and settings synthesis for a profile.
pub struct SettingsGenerator {
    inspector: Arc<dyn PakInspector>,
    cache: Arc<CacheStore>,
    pipeline: ExtractionPipeline,
    profile: Profile,
}

impl SettingsGenerator {
    /// Create a generator for the given profile.
    pub fn new(inspector: Arc<dyn PakInspector>, profile: Profile) -> Self {
        let cache = Arc::new(CacheStore::new(profile.cache_path()));
        let pipeline = ExtractionPipeline::new(Arc::clone(&inspector), Arc::clone(&cache));
        Self {
            inspector,
            cache,
            pipeline,
            profile,
        }
    }

    /// Create a generator with an explicit worker count.
    pub fn with_workers(inspector: Arc<dyn PakInspector>, profile: Profile, workers: usize) -> Self {
        let cache = Arc::new(CacheStore::new(profile.cache_path()));
        let pipeline =
            ExtractionPipeline::with_workers(Arc::clone(&inspector), Arc::clone(&cache), workers);
        Self {
            inspector,
            cache,
            pipeline,
            profile,
        }
    }

    /// The cache store backing this generator.
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Run the full pipeline for the host's mod list.
    ///
    /// `mods` must be ordered by display priority, highest first, and
    /// contain every installed mod (active or not) so pruning sees the
    /// complete install state.
    pub async fn run(&self, mods: &[ModEntry]) -> Result<GeneratedSettings, GeneratorError> {
        self.inspector.check_tool()?;

        self.prune(mods);

        let run = self.pipeline.run(mods).await;
        info!(
            files = run.outcomes.len(),
            cache_hits = run.cache_hits(),
            "extraction complete"
        );

        let document = settings::synthesize(mods, &run.records())?;
        let path = self.profile.settings_path();
        settings::write_atomic(&path, &document)?;
        info!(path = %path.display(), "settings document written");

        Ok(GeneratedSettings {
            path,
            document,
            outcomes: run.outcomes,
        })
    }

    /// Restore the cache invariants against the current install state.
    /// Pruning failures are non-fatal; the run proceeds regardless.
    fn prune(&self, mods: &[ModEntry]) {
        let installed: BTreeSet<String> = mods.iter().map(|m| m.name.clone()).collect();
        let files_by_mod: BTreeMap<String, BTreeSet<String>> = mods
            .iter()
            .map(|m| {
                let files = m
                    .pak_files()
                    .into_iter()
                    .filter_map(|pak| {
                        pak.file_name()
                            .and_then(|name| name.to_str())
                            .map(str::to_string)
                    })
                    .collect();
                (m.name.clone(), files)
            })
            .collect();

        if let Err(e) = self.cache.prune_stale(&installed, &files_by_mod) {
            warn!(error = %e, "cache pruning failed, continuing without it");
        }
    }
}
