//! Writing and reading collection files.

use std::io::Write;
use std::path::{Path, PathBuf};

use noirmap_shared::{MapperError, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::postman::{Collection, SCHEMA_URL};

/// Metadata about a written collection file.
#[derive(Debug, Clone)]
pub struct WrittenCollection {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: usize,
}

/// Write `collection` to `path` as pretty-printed JSON.
///
/// The document goes to a hidden temp file next to the target first and is
/// then renamed over it, so readers never observe a half-written file.
/// Parent directories are created as needed.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn write_collection(collection: &Collection, path: &Path) -> Result<WrittenCollection> {
    let content = serde_json::to_string_pretty(collection)
        .map_err(|e| MapperError::validation(format!("failed to serialize collection: {e}")))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| MapperError::io(&dir, e))?;

    let filename = path
        .file_name()
        .ok_or_else(|| MapperError::validation(format!("not a file path: {}", path.display())))?
        .to_string_lossy();
    let prefix = format!(".{filename}.");

    // Unique temp name per writer; dropped (and deleted) on any failure.
    let mut temp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(|e| MapperError::io(&dir, e))?;
    temp.write_all(content.as_bytes())
        .map_err(|e| MapperError::io(temp.path(), e))?;
    debug!(temp = %temp.path().display(), "temp file written");
    temp.persist(path)
        .map_err(|e| MapperError::io(path, e.error))?;

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let sha256 = format!("{:x}", hasher.finalize());

    info!(
        requests = collection.request_count(),
        size = content.len(),
        "collection written"
    );

    Ok(WrittenCollection {
        path: path.to_path_buf(),
        sha256,
        size_bytes: content.len(),
    })
}

/// Read a collection file back from disk.
pub fn read_collection(path: &Path) -> Result<Collection> {
    let content = std::fs::read_to_string(path).map_err(|e| MapperError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| MapperError::validation(format!("invalid collection {}: {e}", path.display())))
}

/// Check structural invariants of a collection document.
///
/// The schema must be v2.1, folder names unique, and every referenced
/// `{{placeholder}}` declared in the variable table.
pub fn validate_collection(collection: &Collection) -> Result<()> {
    if collection.info.schema != SCHEMA_URL {
        return Err(MapperError::validation(format!(
            "unsupported schema: {}",
            collection.info.schema
        )));
    }

    let mut names: Vec<&str> = Vec::with_capacity(collection.item.len());
    for folder in &collection.item {
        if names.contains(&folder.name.as_str()) {
            return Err(MapperError::validation(format!(
                "duplicate folder: {}",
                folder.name
            )));
        }
        names.push(&folder.name);
    }

    for name in collection.referenced_placeholders() {
        if !collection.variable.iter().any(|v| v.key == name) {
            return Err(MapperError::validation(format!(
                "placeholder {{{{{name}}}}} has no variable"
            )));
        }
    }

    debug!(folders = collection.item.len(), "collection valid");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postman::{Folder, Header, Info, Item, Request, RequestUrl, Variable};

    fn sample() -> Collection {
        Collection {
            info: Info::new("Sample"),
            item: vec![Folder {
                name: "health".into(),
                item: vec![Item {
                    name: "GET /health".into(),
                    request: Request {
                        method: "GET".into(),
                        header: vec![Header::new("Authorization", "Bearer {{authToken}}")],
                        body: None,
                        url: RequestUrl {
                            raw: "{{baseUrl}}/health".into(),
                            host: vec!["{{baseUrl}}".into()],
                            path: vec!["health".into()],
                            query: Vec::new(),
                            variable: Vec::new(),
                        },
                        description: None,
                    },
                    response: Vec::new(),
                }],
            }],
            variable: vec![
                Variable::new("baseUrl", "http://localhost"),
                Variable::new("authToken", ""),
            ],
        }
    }

    #[test]
    fn writes_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.postman_collection.json");

        let written = write_collection(&sample(), &path).unwrap();
        assert_eq!(written.path, path);
        assert_eq!(written.sha256.len(), 64);

        let back = read_collection(&path).unwrap();
        assert_eq!(back, sample());

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn concurrent_writers_to_same_target_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.postman_collection.json");

        std::thread::scope(|scope| {
            for n in 0..8 {
                let path = &path;
                scope.spawn(move || {
                    let mut collection = sample();
                    collection.info.name = format!("writer {n}");
                    for _ in 0..20 {
                        write_collection(&collection, path).unwrap();
                    }
                });
            }
        });

        let back = read_collection(&path).unwrap();
        assert!(back.info.name.starts_with("writer "));
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        std::fs::write(&path, "old").unwrap();
        write_collection(&sample(), &path).unwrap();
        assert!(read_collection(&path).is_ok());
    }

    #[test]
    fn unwritable_target_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let err = write_collection(&sample(), &blocker.join("c.json")).unwrap_err();
        assert!(matches!(err, MapperError::Io { .. }));
    }

    #[test]
    fn validation_catches_undeclared_placeholder() {
        let mut collection = sample();
        assert!(validate_collection(&collection).is_ok());

        collection.variable.retain(|v| v.key != "authToken");
        let err = validate_collection(&collection).unwrap_err();
        assert!(err.to_string().contains("authToken"));
    }

    #[test]
    fn validation_rejects_duplicate_folders() {
        let mut collection = sample();
        let folder = collection.item[0].clone();
        collection.item.push(folder);
        assert!(validate_collection(&collection).is_err());
    }
}
