//! Core pipeline orchestration and domain logic for noirmap.
//!
//! This crate ties together repository acquisition, endpoint discovery,
//! LLM enrichment, and collection assembly into the `generate` workflow.

pub mod assembler;
pub mod cache;
pub mod cancel;
pub mod enrichment;
pub mod inference;
pub mod pipeline;
pub mod prompt;
pub mod rate_limit;

pub use assembler::{Assembly, AssemblyOptions, assemble, build_item};
pub use cancel::{CancelHandle, CancelToken};
pub use enrichment::{EnrichmentOutcome, Enricher, apply_enrichment, enrich_all, fingerprint};
pub use inference::{CompletionRequest, GroqClient, InferenceBackend, InferenceError};
pub use pipeline::{
    PipelineConfig, PipelineError, PipelineStage, ProgressReporter, RunOutcome, SilentProgress,
    run, run_to_file,
};
