//! Core domain types: discovered endpoints, enrichment results, run warnings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// HttpMethod
// ---------------------------------------------------------------------------

/// Standard HTTP verbs a scanner may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Trace,
    Connect,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "TRACE" => Ok(Self::Trace),
            "CONNECT" => Ok(Self::Connect),
            other => Err(format!("unsupported HTTP method: {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Where a parameter travels in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Body,
}

impl ParamLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Body => "body",
        }
    }
}

/// Value type of a parameter. `Unknown` until the enricher fills it in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    Unknown,
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

/// A declared request parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub location: ParamLocation,
    #[serde(default, rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Param {
    /// A parameter with unknown type, as reported by a scanner.
    pub fn new(name: impl Into<String>, location: ParamLocation) -> Self {
        Self {
            name: name.into(),
            location,
            param_type: ParamType::Unknown,
            required: matches!(location, ParamLocation::Path),
            description: None,
        }
    }

    /// Two parameters are the same slot when name and location match.
    pub fn same_slot(&self, other: &Param) -> bool {
        self.location == other.location && self.name == other.name
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Authentication requirement of an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    #[default]
    Unknown,
    None,
    Bearer,
    Basic,
    #[serde(rename = "apikey")]
    ApiKey,
}

impl AuthScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::None => "none",
            Self::Bearer => "bearer",
            Self::Basic => "basic",
            Self::ApiKey => "apikey",
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// Where in the scanned repository an endpoint was declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// File path as reported by the scanner.
    pub file: String,
    /// 1-based line number, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{line}", self.file),
            None => f.write_str(&self.file),
        }
    }
}

/// Identity of an endpoint: method plus case-folded normalized path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId {
    pub method: HttpMethod,
    pub path_key: String,
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path_key)
    }
}

/// One discovered HTTP route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub method: HttpMethod,
    /// Normalized path template using `{param}` for path parameters.
    pub path: String,
    /// Declaration sites, first occurrence first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceLocation>,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub auth: AuthScheme,
    /// Opaque scanner record, kept for enrichment prompts.
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl Endpoint {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            sources: Vec::new(),
            params: Vec::new(),
            auth: AuthScheme::Unknown,
            raw: serde_json::Value::Null,
        }
    }

    /// Identity used for de-duplication.
    pub fn id(&self) -> EndpointId {
        EndpointId {
            method: self.method,
            path_key: self.path.to_lowercase(),
        }
    }

    /// Human-readable label, e.g. `GET /users/{id}`.
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// Append parameters whose (name, location) slot is not yet declared.
    pub fn merge_params(&mut self, params: impl IntoIterator<Item = Param>) {
        for param in params {
            if !self.params.iter().any(|p| p.same_slot(&param)) {
                self.params.push(param);
            }
        }
    }

    /// Names of the `{param}` placeholders in the path template, in order.
    pub fn path_param_names(&self) -> Vec<&str> {
        self.path
            .split('/')
            .filter_map(|seg| seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// EnrichmentResult
// ---------------------------------------------------------------------------

/// How much the model's answer can be trusted.
///
/// Ordered: `None < Partial < Full`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Default result, the model gave no usable answer.
    #[default]
    None,
    /// Well-formed only after the stricter retry prompt.
    Partial,
    /// Well-formed on the first answer.
    Full,
}

/// The model's answer for one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    /// Parameters with inferred types.
    #[serde(default)]
    pub params: Vec<Param>,
    /// Example request body, when the endpoint takes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_body: Option<serde_json::Value>,
    #[serde(default)]
    pub auth: AuthScheme,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub confidence: Confidence,
}

impl EnrichmentResult {
    /// The result used when enrichment is skipped or exhausted.
    pub fn fallback() -> Self {
        Self::default()
    }

    pub fn is_fallback(&self) -> bool {
        self.confidence == Confidence::None
    }
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Why an endpoint received the default enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationReason {
    Timeout,
    InvalidOutput,
    QuotaExceeded,
    Transport,
    ClientError,
    Cancelled,
    MissingCredential,
}

impl DegradationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::InvalidOutput => "invalid_output",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Transport => "transport",
            Self::ClientError => "client_error",
            Self::Cancelled => "cancelled",
            Self::MissingCredential => "missing_credential",
        }
    }
}

/// A non-fatal issue accumulated during a run and reported with the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunWarning {
    /// The endpoint was kept with default enrichment values.
    EnrichmentDegraded {
        endpoint: String,
        reason: DegradationReason,
        detail: String,
    },
    /// A scanner record could not be turned into an endpoint.
    RecordSkipped { detail: String },
    /// The endpoint could not be represented in the collection.
    ItemOmitted { endpoint: String, detail: String },
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnrichmentDegraded {
                endpoint,
                reason,
                detail,
            } => write!(
                f,
                "{endpoint}: default enrichment used ({}): {detail}",
                reason.as_str()
            ),
            Self::RecordSkipped { detail } => write!(f, "scanner record skipped: {detail}"),
            Self::ItemOmitted { endpoint, detail } => {
                write!(f, "{endpoint}: omitted from collection: {detail}")
            }
        }
    }
}
