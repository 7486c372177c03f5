//! Enrichment prompts and answer parsing.

use serde::Deserialize;
use serde_json::{Value, json};

use noirmap_shared::{AuthScheme, Endpoint, EnrichmentResult, Param, ParamLocation, ParamType};

/// System message for every enrichment request.
pub const SYSTEM_PROMPT: &str = "You are an API analyst. Given one HTTP endpoint found by a \
static scanner, infer its parameters with their types, an example JSON request body when \
the endpoint accepts one, the authentication scheme, and a short summary. Respond ONLY with \
JSON matching the provided schema.";

/// Appended to the user message on the stricter second attempt.
const STRICT_SUFFIX: &str = "Your previous answer was not valid. Reply with a single JSON \
object and nothing else: no markdown, no commentary. Keys: parameters, requestBody, auth, \
summary, description. auth must be one of none, bearer, basic, apikey, unknown.";

/// Longest scanner record embedded in a prompt.
const MAX_RAW_CHARS: usize = 4_000;

// ---------------------------------------------------------------------------
// Prompt construction
// ---------------------------------------------------------------------------

/// Full prompt: endpoint facts, scanner record, and an optional source excerpt.
pub fn build_prompt(endpoint: &Endpoint, snippet: Option<&str>) -> String {
    let mut payload = endpoint_facts(endpoint);
    payload["scannerRecord"] = Value::String(truncate(&endpoint.raw.to_string(), MAX_RAW_CHARS));
    if let Some(snippet) = snippet {
        payload["sourceSnippet"] = Value::String(snippet.to_string());
    }
    serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
}

/// Shorter prompt for the retry after a malformed answer.
pub fn strict_prompt(endpoint: &Endpoint) -> String {
    format!("{}\n\n{STRICT_SUFFIX}", endpoint_facts(endpoint))
}

fn endpoint_facts(endpoint: &Endpoint) -> Value {
    let params: Vec<Value> = endpoint
        .params
        .iter()
        .map(|p| json!({ "name": p.name, "in": p.location.as_str() }))
        .collect();
    let sources: Vec<String> = endpoint.sources.iter().map(ToString::to_string).collect();

    json!({
        "method": endpoint.method.as_str(),
        "path": endpoint.path,
        "declaredParameters": params,
        "sources": sources,
    })
}

/// JSON schema of the expected answer.
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["parameters", "requestBody", "auth", "summary", "description"],
        "properties": {
            "parameters": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["name", "in", "type", "required", "description"],
                    "properties": {
                        "name": { "type": "string" },
                        "in": { "type": "string", "enum": ["path", "query", "header", "body"] },
                        "type": {
                            "type": "string",
                            "enum": ["string", "integer", "number", "boolean", "array", "object"]
                        },
                        "required": { "type": "boolean" },
                        "description": { "type": "string" }
                    }
                }
            },
            "requestBody": { "type": ["object", "array", "null"], "additionalProperties": true },
            "auth": { "type": "string", "enum": ["none", "bearer", "basic", "apikey", "unknown"] },
            "summary": { "type": "string" },
            "description": { "type": "string" }
        }
    })
}

// ---------------------------------------------------------------------------
// Answer parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelAnswer {
    #[serde(default)]
    parameters: Vec<ModelParam>,
    #[serde(default)]
    request_body: Option<Value>,
    #[serde(default)]
    auth: AuthScheme,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelParam {
    name: String,
    #[serde(rename = "in")]
    location: ParamLocation,
    #[serde(default, rename = "type")]
    param_type: Option<String>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Parse and validate a model answer. Confidence is left at its default.
///
/// Tolerates `<think>` blocks and markdown fences around the JSON. Rejects
/// unknown auth values or locations, empty parameter names, and bodies that
/// are not an object or array.
pub fn parse_answer(text: &str) -> Result<EnrichmentResult, String> {
    let json_text = extract_json(text);
    let answer: ModelAnswer =
        serde_json::from_str(json_text).map_err(|e| format!("answer does not match schema: {e}"))?;

    let mut params = Vec::with_capacity(answer.parameters.len());
    for p in answer.parameters {
        let name = p.name.trim();
        if name.is_empty() {
            return Err("parameter with empty name".into());
        }
        params.push(Param {
            name: name.to_string(),
            location: p.location,
            param_type: p
                .param_type
                .as_deref()
                .map(param_type_from_str)
                .unwrap_or_default(),
            required: p.required || p.location == ParamLocation::Path,
            description: non_empty(p.description),
        });
    }

    let example_body = match answer.request_body {
        None | Some(Value::Null) => None,
        Some(body @ (Value::Object(_) | Value::Array(_))) => Some(body),
        Some(other) => {
            return Err(format!(
                "requestBody must be an object or array, got {}",
                kind_of(&other)
            ));
        }
    };

    Ok(EnrichmentResult {
        params,
        example_body,
        auth: answer.auth,
        summary: non_empty(answer.summary),
        description: non_empty(answer.description),
        ..EnrichmentResult::default()
    })
}

/// Map a free-form type name onto [`ParamType`].
fn param_type_from_str(value: &str) -> ParamType {
    match value.trim().to_ascii_lowercase().as_str() {
        "string" | "str" | "uuid" | "date" | "datetime" | "email" => ParamType::String,
        "integer" | "int" | "long" => ParamType::Integer,
        "number" | "float" | "double" | "decimal" => ParamType::Number,
        "boolean" | "bool" => ParamType::Boolean,
        "array" | "list" => ParamType::Array,
        "object" | "map" => ParamType::Object,
        _ => ParamType::Unknown,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Strip reasoning blocks and code fences, returning the JSON candidate.
fn extract_json(text: &str) -> &str {
    let text = match text.rfind("</think>") {
        Some(idx) => &text[idx + "</think>".len()..],
        None => text,
    };
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return trimmed;
    }
    for fence in ["```json", "```"] {
        if let Some(start) = trimmed.find(fence) {
            let after = &trimmed[start + fence.len()..];
            if let Some(end) = after.find("```") {
                return after[..end].trim();
            }
        }
    }
    trimmed
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noirmap_shared::{HttpMethod, SourceLocation};

    fn endpoint() -> Endpoint {
        let mut ep = Endpoint::new(HttpMethod::Post, "/orders/{id}/items");
        ep.params.push(Param::new("id", ParamLocation::Path));
        ep.sources.push(SourceLocation {
            file: "app/orders.py".into(),
            line: Some(42),
        });
        ep.raw = json!({"method": "POST", "url": "/orders/<int:id>/items"});
        ep
    }

    #[test]
    fn prompt_includes_endpoint_facts() {
        let prompt = build_prompt(&endpoint(), Some("@app.post(...)"));
        assert!(prompt.contains("\"method\": \"POST\""));
        assert!(prompt.contains("/orders/{id}/items"));
        assert!(prompt.contains("app/orders.py:42"));
        assert!(prompt.contains("sourceSnippet"));
        assert!(prompt.contains("scannerRecord"));
    }

    #[test]
    fn strict_prompt_is_shorter() {
        let ep = endpoint();
        let strict = strict_prompt(&ep);
        assert!(strict.contains("previous answer was not valid"));
        assert!(!strict.contains("scannerRecord"));
    }

    #[test]
    fn schema_requires_every_field() {
        let schema = response_schema();
        assert_eq!(schema["required"].as_array().unwrap().len(), 5);
        assert_eq!(schema["properties"]["auth"]["enum"][3], "apikey");
    }

    #[test]
    fn parses_well_formed_answer() {
        let text = r#"{
            "parameters": [
                {"name": "id", "in": "path", "type": "integer", "required": true, "description": "Order id"},
                {"name": "dryRun", "in": "query", "type": "bool", "required": false, "description": ""}
            ],
            "requestBody": {"sku": "ABC-1", "qty": 2},
            "auth": "bearer",
            "summary": "Add item to order",
            "description": " "
        }"#;
        let result = parse_answer(text).unwrap();
        assert_eq!(result.params.len(), 2);
        assert_eq!(result.params[0].param_type, ParamType::Integer);
        assert_eq!(result.params[1].param_type, ParamType::Boolean);
        assert!(result.params[1].description.is_none());
        assert_eq!(result.auth, AuthScheme::Bearer);
        assert_eq!(result.summary.as_deref(), Some("Add item to order"));
        assert!(result.description.is_none());
        assert_eq!(result.example_body.unwrap()["qty"], 2);
    }

    #[test]
    fn tolerates_fences_and_think_blocks() {
        let text = "<think>hmm</think>\n```json\n{\"parameters\":[],\"requestBody\":null,\"auth\":\"none\",\"summary\":\"Ping\",\"description\":\"\"}\n```";
        let result = parse_answer(text).unwrap();
        assert_eq!(result.auth, AuthScheme::None);
        assert!(result.example_body.is_none());
    }

    #[test]
    fn rejects_invalid_answers() {
        assert!(parse_answer("Sure! Here is the endpoint.").is_err());
        assert!(parse_answer(r#"{"auth": "oauth2"}"#).is_err());
        assert!(parse_answer(r#"{"parameters": [{"name": "x", "in": "cookie"}]}"#).is_err());
        assert!(parse_answer(r#"{"parameters": [{"name": " ", "in": "query"}]}"#).is_err());
        let err = parse_answer(r#"{"requestBody": "text"}"#).unwrap_err();
        assert!(err.contains("object or array"));
    }

    #[test]
    fn truncates_long_records() {
        let long = "x".repeat(10);
        assert_eq!(truncate(&long, 4), "xxxx...");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
