//! Path template normalization.
//!
//! Scanners report routes in the syntax of the framework they came from
//! (`/users/:id`, `/users/<int:id>`, `/users/[id]`, `/users/{id:[0-9]+}`).
//! Everything is rewritten to a single canonical form: a leading slash, no
//! trailing slash, no empty segments, and `{name}` for path parameters.

use std::sync::LazyLock;

use regex::Regex;

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// Express / Rails style: `:id`, `:id?`, `:id(\d+)`.
static COLON_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^:([A-Za-z_][A-Za-z0-9_]*)(?:\(.*\))?\??$").expect("colon param regex")
});

/// Flask / Django style: `<id>`, `<int:id>`, `<path:rest>`.
static ANGLE_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<(?:[^:<>]+:)?([A-Za-z_][A-Za-z0-9_]*)>$").expect("angle param regex")
});

/// OpenAPI / Spring / Gorilla style: `{id}`, `{id:[0-9]+}`, `{id?}`, `${id}`.
static BRACE_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$?\{([A-Za-z_][A-Za-z0-9_]*)(?:[:?].*)?\}$").expect("brace param regex")
});

/// Next.js style: `[id]`, `[...slug]`, `[[...slug]]`.
static BRACKET_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[{1,2}(?:\.\.\.)?([A-Za-z_][A-Za-z0-9_]*)\]{1,2}$").expect("bracket param regex")
});

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Normalize a scanner-reported URL or path into a canonical path template.
///
/// Returns `None` when nothing path-like remains (empty input).
pub fn normalize_path(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let path = strip_query(strip_origin(trimmed));

    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(canonical_segment)
        .collect();

    if segments.is_empty() {
        Some("/".to_string())
    } else {
        Some(format!("/{}", segments.join("/")))
    }
}

/// Rewrite a single path segment, converting parameter syntax to `{name}`.
pub fn canonical_segment(segment: &str) -> String {
    for re in [
        &*COLON_PARAM_RE,
        &*ANGLE_PARAM_RE,
        &*BRACE_PARAM_RE,
        &*BRACKET_PARAM_RE,
    ] {
        if let Some(caps) = re.captures(segment) {
            return format!("{{{}}}", &caps[1]);
        }
    }
    segment.to_string()
}

/// Identity key with every parameter name erased, e.g. `/users/{}/posts`.
///
/// Two templates that only differ in parameter naming map to the same key.
pub fn anonymized_key(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if seg.starts_with('{') && seg.ends_with('}') {
                "{}".to_string()
            } else {
                seg.to_lowercase()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Drop `scheme://host[:port]` when the scanner reported an absolute URL.
fn strip_origin(value: &str) -> &str {
    let Some(scheme_end) = value.find("://") else {
        return value;
    };
    let after_scheme = &value[scheme_end + 3..];
    match after_scheme.find('/') {
        Some(idx) => &after_scheme[idx..],
        None => "/",
    }
}

/// Cut the query string and fragment.
///
/// A `?` inside `{...}`, `<...>`, `[...]` or `(...)` is part of the template,
/// and so is a `?` closing a `:name` segment (Express optional parameter).
fn strip_query(path: &str) -> &str {
    let mut depth = 0usize;
    let mut segment_start = 0;
    for (i, c) in path.char_indices() {
        match c {
            '{' | '(' | '<' | '[' => depth += 1,
            '}' | ')' | '>' | ']' => depth = depth.saturating_sub(1),
            '/' if depth == 0 => segment_start = i + 1,
            '#' if depth == 0 => return &path[..i],
            '?' if depth == 0 => {
                let segment = &path[segment_start..i];
                let rest = &path[i + 1..];
                let optional_param = segment.len() > 1
                    && segment.starts_with(':')
                    && (rest.is_empty() || rest.starts_with('/'));
                if !optional_param {
                    return &path[..i];
                }
            }
            _ => {}
        }
    }
    path
}
