//! Postman collection assembler.
//!
//! Turns enriched endpoints into a Postman v2.1 [`Collection`]: one folder
//! per first path segment, one request per endpoint, and a variable table
//! covering every placeholder the requests reference.

use std::collections::HashMap;

use tracing::{debug, info, instrument, warn};

use noirmap_collection::{
    Body, Collection, Folder, Header, Info, Item, QueryParam, Request, RequestUrl, Variable,
};
use noirmap_discovery::anonymized_key;
use noirmap_shared::{
    AuthScheme, Endpoint, EnrichmentResult, HttpMethod, MapperError, ParamLocation, Result,
    RunWarning,
};

/// Folder holding endpoints mounted at `/`.
const ROOT_FOLDER: &str = "root";

const BASE_URL_VAR: &str = "baseUrl";
const AUTH_TOKEN_VAR: &str = "authToken";

/// Settings for collection assembly.
#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    pub collection_name: String,
    /// Value of the `baseUrl` variable.
    pub base_url: String,
    /// Value of the `authToken` variable. Also enables the bearer header on
    /// endpoints whose auth requirement is unknown.
    pub default_auth_token: Option<String>,
    /// Methods that carry an example body.
    pub body_methods: Vec<HttpMethod>,
    pub description: Option<String>,
}

impl AssemblyOptions {
    pub fn new(collection_name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            collection_name: collection_name.into(),
            base_url: base_url.into(),
            default_auth_token: None,
            body_methods: vec![HttpMethod::Post, HttpMethod::Put, HttpMethod::Patch],
            description: None,
        }
    }
}

/// An assembled collection plus items that had to be left out.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub collection: Collection,
    pub warnings: Vec<RunWarning>,
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Build the collection from `(endpoint, enrichment)` pairs in discovery order.
///
/// Endpoints equal up to path-parameter naming collapse into one item; the
/// higher-confidence enrichment wins and ties keep the first seen. Items the
/// format cannot represent are omitted with a warning.
#[instrument(skip_all, fields(name = %opts.collection_name, endpoints = pairs.len()))]
pub fn assemble(pairs: &[(Endpoint, EnrichmentResult)], opts: &AssemblyOptions) -> Assembly {
    let mut warnings = Vec::new();

    let mut kept: Vec<&(Endpoint, EnrichmentResult)> = Vec::new();
    let mut seen: HashMap<(HttpMethod, String), usize> = HashMap::new();
    for pair in pairs {
        let key = (pair.0.method, anonymized_key(&pair.0.path));
        match seen.get(&key) {
            Some(&idx) => {
                if pair.1.confidence > kept[idx].1.confidence {
                    debug!(endpoint = %pair.0.label(), "replacing duplicate with higher confidence");
                    kept[idx] = pair;
                }
            }
            None => {
                seen.insert(key, kept.len());
                kept.push(pair);
            }
        }
    }

    let mut folders: Vec<Folder> = Vec::new();
    for (endpoint, result) in kept {
        let item = match build_item(endpoint, result, opts) {
            Ok(item) => item,
            Err(e) => {
                warn!(endpoint = %endpoint.label(), error = %e, "omitting item");
                warnings.push(RunWarning::ItemOmitted {
                    endpoint: endpoint.label(),
                    detail: e.to_string(),
                });
                continue;
            }
        };

        let name = folder_name(&endpoint.path);
        match folders.iter_mut().find(|f| f.name == name) {
            Some(folder) => folder.item.push(item),
            None => folders.push(Folder {
                name,
                item: vec![item],
            }),
        }
    }

    let mut collection = Collection {
        info: Info {
            description: opts.description.clone(),
            ..Info::new(&opts.collection_name)
        },
        item: folders,
        variable: Vec::new(),
    };
    collection.variable = variable_table(&collection, opts);

    info!(
        folders = collection.item.len(),
        requests = collection.request_count(),
        omitted = warnings.len(),
        "collection assembled"
    );

    Assembly {
        collection,
        warnings,
    }
}

/// Build one request item.
///
/// Fails with an assembly error for methods Postman cannot represent.
pub fn build_item(
    endpoint: &Endpoint,
    result: &EnrichmentResult,
    opts: &AssemblyOptions,
) -> Result<Item> {
    if matches!(endpoint.method, HttpMethod::Trace | HttpMethod::Connect) {
        return Err(MapperError::assembly(format!(
            "{} requests are not supported by the collection format",
            endpoint.method
        )));
    }

    let mut header = Vec::new();
    if let Some(auth) = auth_header(endpoint.auth, opts.default_auth_token.is_some()) {
        header.push(auth);
    }
    for param in endpoint
        .params
        .iter()
        .filter(|p| p.location == ParamLocation::Header)
    {
        if header.iter().any(|h| h.key.eq_ignore_ascii_case(&param.name)) {
            continue;
        }
        header.push(Header {
            description: param.description.clone(),
            ..Header::new(&param.name, "")
        });
    }

    let body = match &result.example_body {
        Some(example) if opts.body_methods.contains(&endpoint.method) => {
            if !header
                .iter()
                .any(|h| h.key.eq_ignore_ascii_case("content-type"))
            {
                header.push(Header::new("Content-Type", "application/json"));
            }
            Some(Body::json(example))
        }
        _ => None,
    };

    let name = result
        .summary
        .clone()
        .unwrap_or_else(|| endpoint.label());

    Ok(Item {
        name,
        request: Request {
            method: endpoint.method.as_str().to_string(),
            header,
            body,
            url: request_url(endpoint),
            description: result.description.clone(),
        },
        response: Vec::new(),
    })
}

/// Header for an auth scheme. `Unknown` uses the bearer token only when a
/// default token is configured.
fn auth_header(auth: AuthScheme, has_default_token: bool) -> Option<Header> {
    match auth {
        AuthScheme::Bearer => Some(Header::new("Authorization", "Bearer {{authToken}}")),
        AuthScheme::Basic => Some(Header::new("Authorization", "Basic {{basicAuth}}")),
        AuthScheme::ApiKey => Some(Header::new("X-API-Key", "{{apiKey}}")),
        AuthScheme::Unknown if has_default_token => {
            Some(Header::new("Authorization", "Bearer {{authToken}}"))
        }
        AuthScheme::Unknown | AuthScheme::None => None,
    }
}

fn request_url(endpoint: &Endpoint) -> RequestUrl {
    let path: Vec<String> = endpoint
        .path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|seg| match seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => format!(":{name}"),
            None => seg.to_string(),
        })
        .collect();

    let variable = endpoint
        .path_param_names()
        .into_iter()
        .map(|name| {
            let description = endpoint
                .params
                .iter()
                .find(|p| p.location == ParamLocation::Path && p.name == name)
                .and_then(|p| p.description.clone());
            Variable {
                description,
                ..Variable::new(name, "")
            }
        })
        .collect();

    let query: Vec<QueryParam> = endpoint
        .params
        .iter()
        .filter(|p| p.location == ParamLocation::Query)
        .map(|p| QueryParam {
            key: p.name.clone(),
            value: String::new(),
            disabled: !p.required,
            description: p.description.clone(),
        })
        .collect();

    let mut raw = format!("{{{{{BASE_URL_VAR}}}}}/{}", path.join("/"));
    let enabled: Vec<String> = query
        .iter()
        .filter(|q| !q.disabled)
        .map(|q| format!("{}=", q.key))
        .collect();
    if !enabled.is_empty() {
        raw.push('?');
        raw.push_str(&enabled.join("&"));
    }

    RequestUrl {
        raw,
        host: vec![format!("{{{{{BASE_URL_VAR}}}}}")],
        path,
        query,
        variable,
    }
}

/// Folder for a path: its first segment, or `root` for `/`.
///
/// Lowercased to match the case-insensitive dedup key.
fn folder_name(path: &str) -> String {
    match path.split('/').find(|s| !s.is_empty()) {
        Some(seg) => seg
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(seg)
            .to_lowercase(),
        None => ROOT_FOLDER.to_string(),
    }
}

/// `baseUrl`, `authToken`, then every other referenced placeholder.
fn variable_table(collection: &Collection, opts: &AssemblyOptions) -> Vec<Variable> {
    let mut vars = vec![
        Variable::new(BASE_URL_VAR, &opts.base_url),
        Variable::new(
            AUTH_TOKEN_VAR,
            opts.default_auth_token.clone().unwrap_or_default(),
        ),
    ];
    for name in collection.referenced_placeholders() {
        if !vars.iter().any(|v| v.key == name) {
            vars.push(Variable::new(name, ""));
        }
    }
    vars
}
