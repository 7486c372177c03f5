//! Endpoint discovery.
//!
//! An [`EndpointSource`] (OWASP Noir by default) scans a working copy and
//! reports raw route records. [`build_endpoints`] normalizes those records into
//! de-duplicated [`Endpoint`]s with canonical `{param}` path templates.

mod noir;
mod normalize;
mod snippet;

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use noirmap_shared::{
    Endpoint, EndpointId, HttpMethod, Param, ParamLocation, Result, RunWarning, SourceLocation,
};
use tracing::{info, instrument, warn};

pub use noir::{NoirScanner, location_for_kind, parse_noir_output};
pub use normalize::{anonymized_key, canonical_segment, normalize_path};
pub use snippet::{DEFAULT_SNIPPET_CHARS, MAX_SNIPPET_FILE_SIZE, read_snippet};

// ---------------------------------------------------------------------------
// Source capability
// ---------------------------------------------------------------------------

/// Something that can produce raw route records from a directory.
#[async_trait]
pub trait EndpointSource: Send + Sync {
    /// Scan `root` and return every route record found, in report order.
    async fn scan(&self, root: &Path) -> Result<Vec<RawRoute>>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// A route exactly as the scanner reported it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRoute {
    pub method: String,
    /// Path or absolute URL, in the source framework's syntax.
    pub url: String,
    pub params: Vec<RawParam>,
    pub sources: Vec<SourceLocation>,
    /// The full scanner record.
    pub raw: serde_json::Value,
}

/// A parameter declared by the scanner, already mapped to a location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawParam {
    pub name: String,
    pub location: ParamLocation,
}

/// Outcome of a discovery pass.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// De-duplicated endpoints in first-seen order.
    pub endpoints: Vec<Endpoint>,
    /// Records that could not become endpoints.
    pub warnings: Vec<RunWarning>,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Scan `root` with `source` and build the endpoint set.
#[instrument(skip_all, fields(source = source.name(), root = %root.display()))]
pub async fn discover(source: &dyn EndpointSource, root: &Path) -> Result<Discovery> {
    let routes = source.scan(root).await?;
    let discovery = build_endpoints(routes);

    info!(
        endpoints = discovery.endpoints.len(),
        skipped = discovery.warnings.len(),
        "discovery complete"
    );
    Ok(discovery)
}

/// Normalize and de-duplicate raw routes.
///
/// Routes sharing an [`EndpointId`] collapse into the first one seen; later
/// duplicates only contribute parameters and source locations it lacks.
/// Path parameters present in the template but not declared are added.
pub fn build_endpoints(routes: impl IntoIterator<Item = RawRoute>) -> Discovery {
    let mut endpoints: Vec<Endpoint> = Vec::new();
    let mut index: HashMap<EndpointId, usize> = HashMap::new();
    let mut warnings = Vec::new();

    for route in routes {
        let endpoint = match endpoint_from_route(route) {
            Ok(endpoint) => endpoint,
            Err(detail) => {
                warn!(%detail, "skipping scanner record");
                warnings.push(RunWarning::RecordSkipped { detail });
                continue;
            }
        };

        match index.get(&endpoint.id()) {
            Some(&pos) => {
                let existing = &mut endpoints[pos];
                existing.merge_params(endpoint.params);
                for source in endpoint.sources {
                    if !existing.sources.contains(&source) {
                        existing.sources.push(source);
                    }
                }
            }
            None => {
                index.insert(endpoint.id(), endpoints.len());
                endpoints.push(endpoint);
            }
        }
    }

    Discovery {
        endpoints,
        warnings,
    }
}

fn endpoint_from_route(route: RawRoute) -> std::result::Result<Endpoint, String> {
    let method: HttpMethod = route
        .method
        .parse()
        .map_err(|e| format!("{e} (url {:?})", route.url))?;

    let path = normalize_path(&route.url)
        .ok_or_else(|| format!("{method} record has an empty url"))?;

    let mut endpoint = Endpoint::new(method, path);
    endpoint.raw = route.raw;

    for source in route.sources {
        if !endpoint.sources.contains(&source) {
            endpoint.sources.push(source);
        }
    }

    let declared = route.params.into_iter().map(|p| {
        let name = match p.location {
            ParamLocation::Path => canonical_segment(&p.name)
                .trim_start_matches('{')
                .trim_end_matches('}')
                .to_string(),
            _ => p.name,
        };
        Param::new(name, p.location)
    });
    endpoint.merge_params(declared);

    let implied: Vec<Param> = endpoint
        .path_param_names()
        .into_iter()
        .map(|name| Param::new(name, ParamLocation::Path))
        .collect();
    endpoint.merge_params(implied);

    Ok(endpoint)
}
