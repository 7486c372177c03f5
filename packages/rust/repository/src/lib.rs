//! Repository acquisition: turn a URL or local path into a working directory.
//!
//! Remote repositories are shallow-cloned into a temporary directory owned by
//! the returned [`WorkingCopy`]; the directory is removed when the copy is
//! dropped, whichever way the run ends. Local paths are used in place.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use noirmap_shared::{MapperError, Result};
use regex::Regex;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Default timeout for `git clone`.
const DEFAULT_CLONE_TIMEOUT_SECS: u64 = 300;

/// Prefix of temporary clone directories.
const TEMP_PREFIX: &str = "noirmap-repo-";

/// Matches scp-like git remotes: `git@github.com:org/repo.git`.
static SCP_LIKE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._-]+@[A-Za-z0-9.-]+:[^/].*$").expect("scp-like regex")
});

/// Matches abbreviated or full commit hashes.
static COMMIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{7,40}$").expect("commit regex"));

// ---------------------------------------------------------------------------
// RepoRef
// ---------------------------------------------------------------------------

/// A repository reference as given by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoRef {
    /// An existing directory on the local filesystem.
    Local(PathBuf),
    /// A remote git URL to clone.
    Remote(String),
}

impl RepoRef {
    /// Classify a reference string.
    ///
    /// Existing directories win over URL detection so that a local folder
    /// named `something.git` is still used in place.
    pub fn parse(reference: &str) -> Result<Self> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(MapperError::acquisition("repository reference is empty"));
        }

        let path = Path::new(trimmed);
        if path.is_dir() {
            let resolved = path
                .canonicalize()
                .map_err(|e| MapperError::io(path, e))?;
            return Ok(Self::Local(resolved));
        }
        if path.exists() {
            return Err(MapperError::acquisition(format!(
                "repository path '{trimmed}' is not a directory"
            )));
        }

        if is_git_url(trimmed) {
            return Ok(Self::Remote(trimmed.to_string()));
        }

        Err(MapperError::acquisition(format!(
            "repository path '{trimmed}' does not exist and is not a git URL"
        )))
    }

    /// Short name used to title the collection (last path segment, no `.git`).
    pub fn display_name(&self) -> String {
        let raw = match self {
            Self::Local(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            Self::Remote(url) => url
                .trim_end_matches('/')
                .rsplit(|c| c == '/' || c == ':')
                .next()
                .unwrap_or_default()
                .to_string(),
        };
        let name = raw.trim_end_matches(".git");
        if name.is_empty() {
            "repository".to_string()
        } else {
            name.to_string()
        }
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => f.write_str(url),
        }
    }
}

/// Whether a reference string looks like a git remote.
pub fn is_git_url(value: &str) -> bool {
    if let Ok(url) = Url::parse(value) {
        if matches!(url.scheme(), "http" | "https" | "ssh" | "git") {
            return true;
        }
    }
    SCP_LIKE_RE.is_match(value) || value.ends_with(".git")
}

// ---------------------------------------------------------------------------
// WorkingCopy
// ---------------------------------------------------------------------------

/// A local directory holding the repository contents for one run.
///
/// When backed by a temporary clone, the directory is deleted on drop.
#[derive(Debug)]
pub struct WorkingCopy {
    path: PathBuf,
    temp: Option<TempDir>,
}

impl WorkingCopy {
    fn in_place(path: PathBuf) -> Self {
        Self { path, temp: None }
    }

    fn temporary(temp: TempDir, path: PathBuf) -> Self {
        Self {
            path,
            temp: Some(temp),
        }
    }

    /// Root of the repository contents.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the directory is removed when this copy is dropped.
    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }
}

impl Drop for WorkingCopy {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            let dir = temp.path().to_path_buf();
            match temp.close() {
                Ok(()) => debug!(path = %dir.display(), "removed temporary working copy"),
                Err(e) => warn!(path = %dir.display(), error = %e, "failed to remove working copy"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Acquisition
// ---------------------------------------------------------------------------

/// Options for repository acquisition.
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    /// `git` executable.
    pub git_binary: String,
    /// Upper bound on the clone duration.
    pub clone_timeout: Duration,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            git_binary: "git".into(),
            clone_timeout: Duration::from_secs(DEFAULT_CLONE_TIMEOUT_SECS),
        }
    }
}

/// Produce a working copy for `reference`, checked out at `revision` when given.
#[instrument(skip_all, fields(repo = %reference, revision = revision.unwrap_or("HEAD")))]
pub async fn acquire(
    reference: &RepoRef,
    revision: Option<&str>,
    opts: &AcquireOptions,
) -> Result<WorkingCopy> {
    match reference {
        RepoRef::Local(path) => {
            if let Some(rev) = revision {
                return Err(MapperError::acquisition(format!(
                    "revision '{rev}' is not supported for local path {}",
                    path.display()
                )));
            }
            info!(path = %path.display(), "using local repository");
            Ok(WorkingCopy::in_place(path.clone()))
        }
        RepoRef::Remote(url) => clone_remote(url, revision, opts).await,
    }
}

async fn clone_remote(url: &str, revision: Option<&str>, opts: &AcquireOptions) -> Result<WorkingCopy> {
    let temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempdir()
        .map_err(|e| MapperError::io(std::env::temp_dir(), e))?;
    let target = temp.path().join("repo");

    info!(%url, target = %target.display(), "cloning repository");

    // Commit hashes cannot be fetched with --branch, so they need full history.
    let by_commit = revision.is_some_and(|r| COMMIT_RE.is_match(r));

    let mut args: Vec<String> = vec!["clone".into()];
    if !by_commit {
        args.extend(["--depth".into(), "1".into()]);
        if let Some(rev) = revision {
            args.extend(["--branch".into(), rev.to_string()]);
        }
    }
    args.push("--".into());
    args.push(url.to_string());
    args.push(target.to_string_lossy().to_string());

    run_git(&opts.git_binary, &args, None, opts.clone_timeout)
        .await
        .map_err(|msg| MapperError::acquisition(format!("failed to clone {url}: {msg}")))?;

    if let Some(rev) = revision.filter(|_| by_commit) {
        let checkout = vec!["checkout".to_string(), "--detach".into(), rev.to_string()];
        run_git(&opts.git_binary, &checkout, Some(&target), opts.clone_timeout)
            .await
            .map_err(|msg| {
                MapperError::acquisition(format!("unsupported revision '{rev}': {msg}"))
            })?;
    }

    Ok(WorkingCopy::temporary(temp, target))
}

/// Run a git command, returning trimmed stderr as the error message.
async fn run_git(
    git: &str,
    args: &[String],
    cwd: Option<&Path>,
    timeout: Duration,
) -> std::result::Result<(), String> {
    let mut cmd = Command::new(git);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .env("GIT_TERMINAL_PROMPT", "0")
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    debug!(git, ?args, "running git");

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(format!("failed to run `{git}`: {e}")),
        Err(_) => return Err(format!("timed out after {}s", timeout.as_secs())),
    };

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!(
            "exit status {}: {}",
            output.status.code().unwrap_or(-1),
            stderr.trim()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_url_detection() {
        assert!(is_git_url("https://github.com/org/repo"));
        assert!(is_git_url("ssh://git@host/org/repo"));
        assert!(is_git_url("git@github.com:org/repo.git"));
        assert!(is_git_url("some/relative/repo.git"));
        assert!(!is_git_url("./does-not-exist"));
        assert!(!is_git_url("ftp://example.com/repo"));
    }

    #[test]
    fn parse_local_directory() {
        let dir = tempfile::tempdir().unwrap();
        let parsed = RepoRef::parse(dir.path().to_str().unwrap()).unwrap();
        match parsed {
            RepoRef::Local(p) => assert_eq!(p, dir.path().canonicalize().unwrap()),
            other => panic!("expected Local, got {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_missing_non_url() {
        let err = RepoRef::parse("/definitely/not/here/noirmap").unwrap_err();
        assert!(matches!(err, MapperError::Acquisition { .. }));
        assert!(err.to_string().contains("not a git URL"));
    }

    #[test]
    fn parse_rejects_files_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(RepoRef::parse(file.to_str().unwrap()).is_err());
        assert!(RepoRef::parse("  ").is_err());
    }

    #[test]
    fn display_names() {
        let remote = RepoRef::Remote("https://github.com/acme/shop-api.git".into());
        assert_eq!(remote.display_name(), "shop-api");
        let scp = RepoRef::Remote("git@github.com:acme/billing.git".into());
        assert_eq!(scp.display_name(), "billing");
        let local = RepoRef::Local(PathBuf::from("/src/orders"));
        assert_eq!(local.display_name(), "orders");
    }

    #[tokio::test]
    async fn acquire_local_uses_path_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let reference = RepoRef::parse(dir.path().to_str().unwrap()).unwrap();
        let copy = acquire(&reference, None, &AcquireOptions::default())
            .await
            .unwrap();
        assert!(!copy.is_temporary());
        let path = copy.path().to_path_buf();
        drop(copy);
        assert!(path.exists(), "local repositories must never be deleted");
    }

    #[tokio::test]
    async fn acquire_local_rejects_revision() {
        let dir = tempfile::tempdir().unwrap();
        let reference = RepoRef::parse(dir.path().to_str().unwrap()).unwrap();
        let err = acquire(&reference, Some("main"), &AcquireOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[tokio::test]
    async fn failed_clone_is_acquisition_error() {
        let reference = RepoRef::Remote("https://example.invalid/acme/repo.git".into());
        let opts = AcquireOptions {
            git_binary: "noirmap-git-binary-that-does-not-exist".into(),
            clone_timeout: Duration::from_secs(5),
        };
        let err = acquire(&reference, None, &opts).await.unwrap_err();
        assert!(matches!(err, MapperError::Acquisition { .. }));
        assert!(err.to_string().contains("failed to clone"));
    }

    #[test]
    fn temporary_copy_removed_on_drop() {
        let temp = tempfile::Builder::new().prefix(TEMP_PREFIX).tempdir().unwrap();
        let root = temp.path().to_path_buf();
        std::fs::write(root.join("README.md"), "hi").unwrap();
        let copy = WorkingCopy::temporary(temp, root.clone());
        assert!(copy.is_temporary());
        drop(copy);
        assert!(!root.exists());
    }
}
