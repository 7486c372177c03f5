//! Bounded source excerpts around an endpoint's declaration site.

use std::path::{Path, PathBuf};

use noirmap_shared::SourceLocation;
use tracing::debug;

/// Files larger than this are never read.
pub const MAX_SNIPPET_FILE_SIZE: u64 = 512 * 1024;

/// Default character budget for a snippet.
pub const DEFAULT_SNIPPET_CHARS: usize = 8_000;

/// Read up to `context_lines` lines either side of `location.line` from the
/// file it names, capped at `max_chars` characters.
///
/// Relative paths resolve against `root`; paths escaping `root` are refused.
/// Returns `None` when the file is missing, too large, or unreadable.
pub fn read_snippet(
    root: &Path,
    location: &SourceLocation,
    context_lines: usize,
    max_chars: usize,
) -> Option<String> {
    let path = resolve_within(root, &location.file)?;

    let meta = std::fs::metadata(&path).ok()?;
    if !meta.is_file() || meta.len() > MAX_SNIPPET_FILE_SIZE {
        debug!(path = %path.display(), size = meta.len(), "skipping snippet source");
        return None;
    }

    let bytes = std::fs::read(&path).ok()?;
    let content = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return None;
    }

    let (start, end) = match location.line {
        Some(line) if line > 0 => {
            let idx = (line as usize - 1).min(lines.len() - 1);
            (
                idx.saturating_sub(context_lines),
                (idx + context_lines + 1).min(lines.len()),
            )
        }
        _ => (0, lines.len()),
    };

    let excerpt = lines[start..end].join("\n");
    Some(truncate_chars(&excerpt, max_chars))
}

/// Resolve `file` against `root`, returning `None` if it lands outside.
fn resolve_within(root: &Path, file: &str) -> Option<PathBuf> {
    let root = root.canonicalize().ok()?;
    let candidate = Path::new(file);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    let resolved = joined.canonicalize().ok()?;
    resolved.starts_with(&root).then_some(resolved)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
