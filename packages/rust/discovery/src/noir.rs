//! OWASP Noir adapter.
//!
//! Runs `noir -b <dir> -f json -T` and turns its JSON report into
//! [`RawRoute`]s. Noir has emitted endpoints under different keys over time
//! (`endpoints`, nested `data`/`results`, bare arrays), so the report is walked
//! recursively and every object carrying both `method` and `url` is taken as a
//! route record.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use noirmap_shared::{MapperError, ParamLocation, Result, SourceLocation};
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::{EndpointSource, RawParam, RawRoute};

/// Default time budget for a single scan.
const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(600);

// ---------------------------------------------------------------------------
// NoirScanner
// ---------------------------------------------------------------------------

/// Endpoint source backed by the `noir` executable.
#[derive(Debug, Clone)]
pub struct NoirScanner {
    /// Executable name or path.
    pub binary: String,
    /// Passed as `-u`, so Noir can report absolute URLs.
    pub base_url: Option<String>,
    /// Appended after the built-in arguments.
    pub extra_args: Vec<String>,
    pub timeout: Duration,
}

impl Default for NoirScanner {
    fn default() -> Self {
        Self {
            binary: "noir".into(),
            base_url: None,
            extra_args: Vec::new(),
            timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }
}

impl NoirScanner {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Command-line arguments for scanning `root`.
    pub fn args(&self, root: &Path) -> Vec<String> {
        let mut args = vec!["-b".to_string(), root.display().to_string()];
        if let Some(base_url) = &self.base_url {
            args.push("-u".into());
            args.push(base_url.clone());
        }
        args.extend(["-f".to_string(), "json".to_string(), "-T".to_string()]);
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

#[async_trait]
impl EndpointSource for NoirScanner {
    #[instrument(skip_all, fields(binary = %self.binary, root = %root.display()))]
    async fn scan(&self, root: &Path) -> Result<Vec<RawRoute>> {
        let args = self.args(root);
        info!(args = ?args, "running endpoint scanner");

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MapperError::discovery(format!(
                        "scanner binary {:?} not found in PATH; install OWASP Noir or set NOIR_BIN",
                        self.binary
                    ))
                } else {
                    MapperError::discovery(format!("failed to start {}: {e}", self.binary))
                }
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                MapperError::discovery(format!(
                    "{} timed out after {}s",
                    self.binary,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| MapperError::discovery(format!("{} failed: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MapperError::discovery(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let routes = parse_noir_output(&stdout)?;
        info!(routes = routes.len(), "scanner finished");
        Ok(routes)
    }

    fn name(&self) -> &str {
        "noir"
    }
}

// ---------------------------------------------------------------------------
// Report parsing
// ---------------------------------------------------------------------------

/// Parse a Noir JSON report into raw route records.
///
/// Blank output is an empty report. Some Noir builds print a banner before
/// the JSON body; when the whole text does not parse, parsing is retried from
/// the first line that opens a JSON value.
pub fn parse_noir_output(stdout: &str) -> Result<Vec<RawRoute>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let document: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(first_err) => {
            let start = trimmed
                .lines()
                .position(|line| {
                    let line = line.trim_start();
                    line.starts_with('{') || line.starts_with('[')
                })
                .filter(|&idx| idx > 0)
                .ok_or_else(|| invalid_json(&first_err))?;
            let body = trimmed.lines().skip(start).collect::<Vec<_>>().join("\n");
            serde_json::from_str(&body).map_err(|e| invalid_json(&e))?
        }
    };

    let mut records = Vec::new();
    collect_records(&document, &mut records);

    if records.is_empty() {
        let keys: Vec<&str> = document
            .as_object()
            .map(|map| map.keys().map(String::as_str).collect())
            .unwrap_or_default();
        warn!(top_level_keys = ?keys, "scanner report contained no endpoints");
    }

    Ok(records.into_iter().map(route_from_record).collect())
}

fn invalid_json(err: &serde_json::Error) -> MapperError {
    MapperError::discovery(format!("scanner output is not valid JSON: {err}"))
}

/// Depth-first walk collecting route-shaped objects, in document order.
fn collect_records<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            if map.contains_key("method") && map.contains_key("url") {
                out.push(value);
                return;
            }
            for child in map.values() {
                collect_records(child, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_records(item, out);
            }
        }
        _ => {}
    }
}

/// Convert one route-shaped object. Non-string `method`/`url` values become
/// empty strings and are rejected later by endpoint building.
fn route_from_record(record: &Value) -> RawRoute {
    let text = |key: &str| {
        record
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let params = record
        .get("params")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(param_from_record).collect())
        .unwrap_or_default();

    RawRoute {
        method: text("method"),
        url: text("url"),
        params,
        sources: sources_from_record(record),
        raw: record.clone(),
    }
}

fn param_from_record(value: &Value) -> Option<RawParam> {
    let name = value.get("name").and_then(Value::as_str)?.trim();
    if name.is_empty() {
        return None;
    }
    let kind = value
        .get("param_type")
        .or_else(|| value.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("query");

    match location_for_kind(kind) {
        Some(location) => Some(RawParam {
            name: name.to_string(),
            location,
        }),
        None => {
            debug!(name, kind, "skipping parameter of unknown kind");
            None
        }
    }
}

/// Map a Noir parameter kind to where the parameter travels.
pub fn location_for_kind(kind: &str) -> Option<ParamLocation> {
    match kind.to_ascii_lowercase().as_str() {
        "path" => Some(ParamLocation::Path),
        "query" => Some(ParamLocation::Query),
        "header" | "cookie" => Some(ParamLocation::Header),
        "json" | "form" | "body" => Some(ParamLocation::Body),
        _ => None,
    }
}

fn sources_from_record(record: &Value) -> Vec<SourceLocation> {
    let Some(code_paths) = record
        .pointer("/details/code_paths")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    code_paths
        .iter()
        .filter_map(|entry| {
            let file = entry.get("path").and_then(Value::as_str)?;
            let line = entry
                .get("line")
                .and_then(Value::as_u64)
                .and_then(|l| u32::try_from(l).ok());
            Some(SourceLocation {
                file: file.to_string(),
                line,
            })
        })
        .collect()
}
