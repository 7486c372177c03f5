//! End-to-end `generate` pipeline:
//! repository → endpoints → enrichment → collection.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};
use url::Url;

use noirmap_collection::{Collection, WrittenCollection, write_collection};
use noirmap_discovery::{EndpointSource, discover};
use noirmap_repository::{AcquireOptions, RepoRef, acquire};
use noirmap_shared::{EnrichmentResult, MapperError, Result, RunId, RunWarning};

use crate::assembler::{AssemblyOptions, assemble};
use crate::cancel::CancelToken;
use crate::enrichment::{EnrichmentOutcome, Enricher, apply_enrichment, enrich_all};

// ---------------------------------------------------------------------------
// Stages and errors
// ---------------------------------------------------------------------------

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Acquiring,
    Discovering,
    Enriching,
    Assembling,
    Writing,
    Done,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquiring => "acquiring",
            Self::Discovering => "discovering",
            Self::Enriching => "enriching",
            Self::Assembling => "assembling",
            Self::Writing => "writing",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fatal run failure, tagged with the stage it happened in.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: PipelineStage,
    #[source]
    pub source: MapperError,
}

impl PipelineError {
    pub fn new(stage: PipelineStage, source: MapperError) -> Self {
        Self { stage, source }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.source, MapperError::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// Configuration and results
// ---------------------------------------------------------------------------

/// Inputs of one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub repo: RepoRef,
    pub revision: Option<String>,
    pub acquire: AcquireOptions,
    pub assembly: AssemblyOptions,
}

impl PipelineConfig {
    /// Config with defaults; the collection is named after the repository.
    ///
    /// Fails when `base_url` is not an absolute http(s) URL.
    pub fn new(repo: RepoRef, base_url: &str) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| MapperError::config(format!("invalid base URL {base_url:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(MapperError::config(format!(
                "base URL must use http or https, got {base_url:?}"
            )));
        }

        let name = repo.display_name();
        Ok(Self {
            repo,
            revision: None,
            acquire: AcquireOptions::default(),
            assembly: AssemblyOptions::new(name, base_url.trim_end_matches('/')),
        })
    }
}

/// Successful run output.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub collection: Collection,
    /// Non-fatal issues, in the order they arose.
    pub warnings: Vec<RunWarning>,
    /// Endpoints found by discovery, before collection de-duplication.
    pub endpoint_count: usize,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn stage(&self, stage: PipelineStage);
    /// Called once discovery has produced the endpoint set.
    fn endpoints_discovered(&self, count: usize);
    /// Called as each endpoint's enrichment finishes.
    fn endpoint_enriched(&self, label: &str, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, outcome: &RunOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _stage: PipelineStage) {}
    fn endpoints_discovered(&self, _count: usize) {}
    fn endpoint_enriched(&self, _label: &str, _current: usize, _total: usize) {}
    fn done(&self, _outcome: &RunOutcome) {}
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Run the full pipeline and return the collection.
///
/// 1. Acquire the repository (clone remotes into a temp dir)
/// 2. Discover endpoints with `source`
/// 3. Enrich them (skipped when `enricher` is `None`)
/// 4. Assemble the collection
///
/// Acquisition and discovery failures are fatal. Enrichment and assembly
/// problems only add warnings.
pub async fn run(
    config: &PipelineConfig,
    source: &dyn EndpointSource,
    enricher: Option<Arc<Enricher>>,
    cancel: &CancelToken,
    progress: &dyn ProgressReporter,
) -> std::result::Result<RunOutcome, PipelineError> {
    let outcome = execute(config, source, enricher, cancel, progress).await?;
    progress.stage(PipelineStage::Done);
    progress.done(&outcome);
    Ok(outcome)
}

/// [`run`], then write the collection atomically to `out`.
pub async fn run_to_file(
    config: &PipelineConfig,
    source: &dyn EndpointSource,
    enricher: Option<Arc<Enricher>>,
    cancel: &CancelToken,
    progress: &dyn ProgressReporter,
    out: &Path,
) -> std::result::Result<(RunOutcome, WrittenCollection), PipelineError> {
    let outcome = execute(config, source, enricher, cancel, progress).await?;

    progress.stage(PipelineStage::Writing);
    let written = write_collection(&outcome.collection, out)
        .map_err(|e| PipelineError::new(PipelineStage::Writing, e))?;

    progress.stage(PipelineStage::Done);
    progress.done(&outcome);
    Ok((outcome, written))
}

#[instrument(skip_all, fields(repo = %config.repo))]
async fn execute(
    config: &PipelineConfig,
    source: &dyn EndpointSource,
    enricher: Option<Arc<Enricher>>,
    cancel: &CancelToken,
    progress: &dyn ProgressReporter,
) -> std::result::Result<RunOutcome, PipelineError> {
    let start = Instant::now();
    let run_id = RunId::new();
    info!(%run_id, repo = %config.repo, "starting run");

    // --- Acquire ---
    progress.stage(PipelineStage::Acquiring);
    let working = guarded(
        cancel,
        PipelineStage::Acquiring,
        acquire(&config.repo, config.revision.as_deref(), &config.acquire),
    )
    .await?;

    // --- Discover ---
    progress.stage(PipelineStage::Discovering);
    let discovery = guarded(
        cancel,
        PipelineStage::Discovering,
        discover(source, working.path()),
    )
    .await?;
    let mut warnings = discovery.warnings;
    let endpoints = discovery.endpoints;
    progress.endpoints_discovered(endpoints.len());

    // --- Enrich ---
    progress.stage(PipelineStage::Enriching);
    let outcomes: Vec<EnrichmentOutcome> = match enricher {
        Some(enricher) => {
            enrich_all(
                enricher,
                &endpoints,
                Some(working.path().to_path_buf()),
                cancel,
                progress,
            )
            .await
        }
        None => {
            info!("enrichment skipped");
            endpoints.iter().map(|_| EnrichmentOutcome::skipped()).collect()
        }
    };

    let pairs: Vec<_> = endpoints
        .into_iter()
        .zip(outcomes)
        .map(|(mut endpoint, outcome)| {
            apply_enrichment(&mut endpoint, &outcome.result);
            warnings.extend(outcome.warning);
            (endpoint, outcome.result)
        })
        .collect::<Vec<(_, EnrichmentResult)>>();

    // --- Assemble ---
    progress.stage(PipelineStage::Assembling);
    let assembly = assemble(&pairs, &config.assembly);
    warnings.extend(assembly.warnings);
    drop(working);

    if !warnings.is_empty() {
        warn!(count = warnings.len(), "run finished with warnings");
    }
    info!(
        %run_id,
        endpoints = pairs.len(),
        requests = assembly.collection.request_count(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "run complete"
    );

    Ok(RunOutcome {
        run_id,
        collection: assembly.collection,
        warnings,
        endpoint_count: pairs.len(),
        elapsed: start.elapsed(),
    })
}

/// Await `fut`, failing the stage when it errors or the run is cancelled.
async fn guarded<T>(
    cancel: &CancelToken,
    stage: PipelineStage,
    fut: impl Future<Output = Result<T>>,
) -> std::result::Result<T, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::new(stage, MapperError::Cancelled)),
        result = fut => result.map_err(|e| PipelineError::new(stage, e)),
    }
}
