//! Source host capability (read-only).

use async_trait::async_trait;

use repolens_core::error::{Error, Result};
use repolens_core::models::{Branch, Commit, Repository, RepositoryStatistics};

/// Hard ceiling on a single blob read. Larger files are truncated by
/// adapters rather than rejected, so analysis can still see their heads.
pub const MAX_BLOB_BYTES: usize = 1 << 20;

/// Maximum tree recursion depth an adapter may request from its backend.
pub const MAX_TREE_DEPTH: usize = 10;

/// Opaque credential handed through to the host. Never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential").field("token", &"***").finish()
    }
}

/// One file in the repository tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub size: u64,
}

/// Read-only access to a hosted repository.
///
/// Implementations are pluggable (remote API, local clone, in-memory
/// fixture) and must be rate-limit aware: a throttled backend surfaces
/// [`Error::RateLimited`] with a `retry_after` hint that the orchestrator
/// honors.
#[async_trait]
pub trait SourceHost: Send + Sync {
    async fn validate_access(&self, url: &str, credential: Option<&Credential>) -> Result<bool>;

    /// Resolve a URL into normalized repository metadata.
    async fn connect_repository(
        &self,
        url: &str,
        credential: Option<&Credential>,
    ) -> Result<Repository>;

    async fn list_branches(
        &self,
        repo: &Repository,
        credential: Option<&Credential>,
    ) -> Result<Vec<Branch>>;

    async fn list_commits(
        &self,
        repo: &Repository,
        branch: &str,
        limit: usize,
        credential: Option<&Credential>,
    ) -> Result<Vec<Commit>>;

    /// Full recursive file listing of one branch.
    async fn list_tree(
        &self,
        repo: &Repository,
        branch: &str,
        credential: Option<&Credential>,
    ) -> Result<Vec<TreeEntry>>;

    /// Read one blob, truncated to [`MAX_BLOB_BYTES`].
    async fn read_file(
        &self,
        repo: &Repository,
        branch: &str,
        path: &str,
        credential: Option<&Credential>,
    ) -> Result<Vec<u8>>;

    /// Line/file statistics for a branch. The default derives them from
    /// `list_tree` + `read_file`; adapters with a cheaper backend query may
    /// override.
    async fn analyze_structure(
        &self,
        repo: &Repository,
        branch: &str,
        credential: Option<&Credential>,
    ) -> Result<RepositoryStatistics> {
        let tree = self.list_tree(repo, branch, credential).await?;
        let mut files = Vec::with_capacity(tree.len());
        for entry in &tree {
            let line_count = match crate::languages::language_for_path(&entry.path) {
                Some(_) => {
                    let bytes = self.read_file(repo, branch, &entry.path, credential).await?;
                    String::from_utf8_lossy(&bytes).lines().count()
                }
                None => 0,
            };
            files.push((entry.path.clone(), line_count));
        }
        Ok(crate::languages::breakdown(&files))
    }
}

/// Map a blob that exceeds the read bound into a truncated read.
pub fn bound_blob(mut bytes: Vec<u8>) -> Vec<u8> {
    if bytes.len() > MAX_BLOB_BYTES {
        bytes.truncate(MAX_BLOB_BYTES);
    }
    bytes
}

/// Helper for adapters: map an HTTP-shaped status into the error taxonomy.
pub fn status_error(status: u16, context: &str) -> Error {
    match status {
        401 | 403 => Error::SourceAuth(format!("{context}: status {status}")),
        404 => Error::SourceNotFound(context.to_string()),
        429 => Error::RateLimited { retry_after: None },
        500..=599 => Error::SourceUnavailable(format!("{context}: status {status}")),
        _ => Error::permanent(format!("{context}: unexpected status {status}")),
    }
}
