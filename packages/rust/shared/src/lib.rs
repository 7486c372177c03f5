//! Shared types, error model, and configuration for noirmap.
//!
//! This crate is the foundation depended on by all other noirmap crates.
//! It provides:
//! - [`MapperError`]: the unified error type
//! - Domain types ([`Endpoint`], [`Param`], [`EnrichmentResult`], [`RunWarning`])
//! - Configuration ([`AppConfig`], [`EnrichmentConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CollectionConfig, EnrichmentConfig, InferenceConfig, ScannerConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_api_key,
    validate_api_key,
};
pub use error::{MapperError, Result};
pub use types::{
    AuthScheme, Confidence, DegradationReason, Endpoint, EndpointId, EnrichmentResult, HttpMethod,
    Param, ParamLocation, ParamType, RunId, RunWarning, SourceLocation,
};
