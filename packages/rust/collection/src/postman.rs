//! Postman Collection v2.1 document model.
//!
//! Only the subset of the format noirmap emits is modeled. Optional fields
//! are skipped when empty so the output stays close to what Postman exports.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Schema URL identifying Postman Collection v2.1.
pub const SCHEMA_URL: &str = "https://schema.getpostman.com/json/collection/v2.1.0/collection.json";

/// `{{name}}` variable references inside any string of the collection.
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("placeholder regex"));

// ---------------------------------------------------------------------------
// Document types
// ---------------------------------------------------------------------------

/// A complete collection document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub info: Info,
    /// Top-level folders, one per resource group.
    pub item: Vec<Folder>,
    #[serde(default)]
    pub variable: Vec<Variable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub name: String,
    pub schema: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Info {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: SCHEMA_URL.to_string(),
            description: None,
        }
    }
}

/// A folder grouping requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub name: String,
    pub item: Vec<Item>,
}

/// A single saved request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub request: Request,
    /// Saved example responses; always empty in generated output.
    #[serde(default)]
    pub response: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default)]
    pub header: Vec<Header>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Body>,
    pub url: RequestUrl,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            disabled: false,
            description: None,
        }
    }
}

/// Raw request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub mode: String,
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<BodyOptions>,
}

impl Body {
    /// A pretty-printed JSON body.
    pub fn json(value: &serde_json::Value) -> Self {
        let raw = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        Self {
            mode: "raw".into(),
            raw,
            options: Some(BodyOptions {
                raw: RawOptions {
                    language: "json".into(),
                },
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyOptions {
    pub raw: RawOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOptions {
    pub language: String,
}

/// Structured request URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestUrl {
    pub raw: String,
    pub host: Vec<String>,
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query: Vec<QueryParam>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variable: Vec<Variable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParam {
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A key/value variable, used both collection-wide and for `:param` URL slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Variable {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            description: None,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

impl Collection {
    /// Total number of requests across all folders.
    pub fn request_count(&self) -> usize {
        self.item.iter().map(|f| f.item.len()).sum()
    }

    /// Iterate over every request item, folder order first.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.item.iter().flat_map(|f| f.item.iter())
    }

    /// Names of every `{{placeholder}}` referenced by a request, in order of
    /// first appearance.
    pub fn referenced_placeholders(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for item in self.items() {
            let req = &item.request;
            let texts = std::iter::once(req.url.raw.as_str())
                .chain(req.url.host.iter().map(String::as_str))
                .chain(req.header.iter().map(|h| h.value.as_str()))
                .chain(req.body.iter().map(|b| b.raw.as_str()));
            for text in texts {
                for name in placeholders(text) {
                    if !seen.contains(&name) {
                        seen.push(name);
                    }
                }
            }
        }
        seen
    }
}

/// Extract `{{name}}` placeholder names from a string.
pub fn placeholders(text: &str) -> Vec<String> {
    PLACEHOLDER_RE
        .captures_iter(text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(raw: &str, headers: Vec<Header>) -> Item {
        Item {
            name: raw.into(),
            request: Request {
                method: "GET".into(),
                header: headers,
                body: None,
                url: RequestUrl {
                    raw: raw.into(),
                    host: vec!["{{baseUrl}}".into()],
                    path: Vec::new(),
                    query: Vec::new(),
                    variable: Vec::new(),
                },
                description: None,
            },
            response: Vec::new(),
        }
    }

    #[test]
    fn extracts_placeholders() {
        assert_eq!(
            placeholders("{{baseUrl}}/a?x={{ token }}&y={{}}"),
            vec!["baseUrl", "token"]
        );
        assert!(placeholders("no refs {here}").is_empty());
    }

    #[test]
    fn referenced_placeholders_are_ordered_and_unique() {
        let collection = Collection {
            info: Info::new("t"),
            item: vec![Folder {
                name: "users".into(),
                item: vec![
                    item(
                        "{{baseUrl}}/users",
                        vec![Header::new("Authorization", "Bearer {{authToken}}")],
                    ),
                    item(
                        "{{baseUrl}}/users/:id",
                        vec![Header::new("X-API-Key", "{{apiKey}}")],
                    ),
                ],
            }],
            variable: Vec::new(),
        };
        assert_eq!(
            collection.referenced_placeholders(),
            vec!["baseUrl", "authToken", "apiKey"]
        );
        assert_eq!(collection.request_count(), 2);
    }

    #[test]
    fn optional_fields_are_omitted() {
        let value = serde_json::to_value(item("{{baseUrl}}/", Vec::new())).unwrap();
        let url = &value["request"]["url"];
        assert!(url.get("query").is_none());
        assert!(url.get("variable").is_none());
        assert!(value["request"].get("body").is_none());
        assert_eq!(value["response"], serde_json::json!([]));
    }

    #[test]
    fn json_body_declares_language() {
        let body = Body::json(&serde_json::json!({"name": "a"}));
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["mode"], "raw");
        assert_eq!(value["options"]["raw"]["language"], "json");
        assert!(body.raw.contains("\"name\": \"a\""));
    }

    #[test]
    fn info_uses_v21_schema() {
        let info = Info::new("Shop");
        assert_eq!(info.schema, SCHEMA_URL);
        assert!(info.schema.contains("v2.1.0"));
    }
}
