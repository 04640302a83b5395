//! In-memory source host used by integration tests and as the reference
//! semantics for adapter implementers.
//!
//! Supports scripted fault injection: queued faults fail the next host
//! calls in order, which is how the retry/backoff matrix is exercised
//! without a network.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use repolens_core::error::{Error, Result};
use repolens_core::models::{Branch, Commit, Repository, RepositoryStatistics};

use crate::host::{bound_blob, Credential, SourceHost, TreeEntry};

/// One scripted failure, applied to the next host call.
#[derive(Debug, Clone)]
pub enum Fault {
    Unavailable,
    AuthRejected,
    NotFound,
    RateLimited(Duration),
}

impl Fault {
    fn into_error(self) -> Error {
        match self {
            Fault::Unavailable => Error::SourceUnavailable("scripted outage".into()),
            Fault::AuthRejected => Error::SourceAuth("scripted auth rejection".into()),
            Fault::NotFound => Error::SourceNotFound("scripted not-found".into()),
            Fault::RateLimited(retry_after) => Error::RateLimited {
                retry_after: Some(retry_after),
            },
        }
    }
}

#[derive(Debug, Clone)]
struct FixtureRepo {
    owner: String,
    name: String,
    url: String,
    default_branch: String,
    is_private: bool,
    files: BTreeMap<String, String>,
    commits: Vec<Commit>,
    required_token: Option<String>,
}

/// Builder for one hosted repository fixture.
#[derive(Debug, Clone)]
pub struct RepoFixture {
    inner: FixtureRepo,
}

impl RepoFixture {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        let owner = owner.into();
        let name = name.into();
        let url = format!("https://host.example/{owner}/{name}");
        Self {
            inner: FixtureRepo {
                owner,
                name,
                url,
                default_branch: "main".to_string(),
                is_private: false,
                files: BTreeMap::new(),
                commits: Vec::new(),
                required_token: None,
            },
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.inner.url = url.into();
        self
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.inner.files.insert(path.into(), content.into());
        self
    }

    pub fn with_commit(
        mut self,
        hash: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let hash = hash.into();
        let repo_id = format!("{}/{}", self.inner.owner, self.inner.name);
        self.inner
            .commits
            .push(Commit::new(hash, message, "fixture", timestamp, repo_id));
        self
    }

    /// Mark the repository private, requiring the given token.
    pub fn with_required_token(mut self, token: impl Into<String>) -> Self {
        self.inner.is_private = true;
        self.inner.required_token = Some(token.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }
}

/// In-memory [`SourceHost`].
pub struct FixtureHost {
    repos: Mutex<BTreeMap<String, FixtureRepo>>,
    faults: Mutex<VecDeque<Fault>>,
}

impl FixtureHost {
    pub fn new() -> Self {
        Self {
            repos: Mutex::new(BTreeMap::new()),
            faults: Mutex::new(VecDeque::new()),
        }
    }

    pub fn add_repository(&self, fixture: RepoFixture) {
        let mut repos = self.repos.lock();
        repos.insert(fixture.inner.url.clone(), fixture.inner);
    }

    /// Queue a fault for the next host call.
    pub fn inject_fault(&self, fault: Fault) {
        self.faults.lock().push_back(fault);
    }

    /// Queue `n` copies of the same fault.
    pub fn inject_faults(&self, fault: Fault, n: usize) {
        let mut faults = self.faults.lock();
        for _ in 0..n {
            faults.push_back(fault.clone());
        }
    }

    /// Mutate a file in place (simulates a push; pair with `add_commit`).
    pub fn update_file(&self, url: &str, path: &str, content: impl Into<String>) {
        if let Some(repo) = self.repos.lock().get_mut(url) {
            repo.files.insert(path.to_string(), content.into());
        }
    }

    /// Remove a file (simulates a deleting push).
    pub fn remove_file(&self, url: &str, path: &str) {
        if let Some(repo) = self.repos.lock().get_mut(url) {
            repo.files.remove(path);
        }
    }

    pub fn add_commit(&self, url: &str, hash: &str, message: &str, timestamp: DateTime<Utc>) {
        if let Some(repo) = self.repos.lock().get_mut(url) {
            let repo_id = format!("{}/{}", repo.owner, repo.name);
            repo.commits
                .push(Commit::new(hash, message, "fixture", timestamp, repo_id));
        }
    }

    fn take_fault(&self) -> Result<()> {
        if let Some(fault) = self.faults.lock().pop_front() {
            return Err(fault.into_error());
        }
        Ok(())
    }

    fn lookup(&self, url: &str) -> Result<FixtureRepo> {
        self.repos
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::SourceNotFound(url.to_string()))
    }

    fn lookup_by_id(&self, repository_id: &str) -> Result<FixtureRepo> {
        self.repos
            .lock()
            .values()
            .find(|r| format!("{}/{}", r.owner, r.name) == repository_id)
            .cloned()
            .ok_or_else(|| Error::SourceNotFound(repository_id.to_string()))
    }

    fn check_auth(repo: &FixtureRepo, credential: Option<&Credential>) -> Result<()> {
        if let Some(required) = &repo.required_token {
            match credential {
                Some(c) if &c.token == required => Ok(()),
                _ => Err(Error::SourceAuth(format!(
                    "credential required for {}/{}",
                    repo.owner, repo.name
                ))),
            }
        } else {
            Ok(())
        }
    }
}

impl Default for FixtureHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceHost for FixtureHost {
    async fn validate_access(&self, url: &str, credential: Option<&Credential>) -> Result<bool> {
        self.take_fault()?;
        match self.lookup(url) {
            Ok(repo) => Ok(Self::check_auth(&repo, credential).is_ok()),
            Err(Error::SourceNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn connect_repository(
        &self,
        url: &str,
        credential: Option<&Credential>,
    ) -> Result<Repository> {
        self.take_fault()?;
        let fixture = self.lookup(url)?;
        Self::check_auth(&fixture, credential)?;

        let mut repo = Repository::connect(&fixture.owner, &fixture.name, &fixture.url)?;
        repo.default_branch = fixture.default_branch.clone();
        repo.is_private = fixture.is_private;
        repo.last_pushed_at = fixture.commits.last().map(|c| c.timestamp);
        Ok(repo)
    }

    async fn list_branches(
        &self,
        repo: &Repository,
        credential: Option<&Credential>,
    ) -> Result<Vec<Branch>> {
        self.take_fault()?;
        let fixture = self.lookup_by_id(&repo.id)?;
        Self::check_auth(&fixture, credential)?;

        Ok(vec![Branch {
            name: fixture.default_branch.clone(),
            is_default: true,
            repository_id: repo.id.clone(),
            created_at: repo.created_at,
            last_commit: fixture.commits.last().cloned(),
        }])
    }

    async fn list_commits(
        &self,
        repo: &Repository,
        _branch: &str,
        limit: usize,
        credential: Option<&Credential>,
    ) -> Result<Vec<Commit>> {
        self.take_fault()?;
        let fixture = self.lookup_by_id(&repo.id)?;
        Self::check_auth(&fixture, credential)?;

        // newest first
        let mut commits = fixture.commits.clone();
        commits.reverse();
        commits.truncate(limit);
        Ok(commits)
    }

    async fn list_tree(
        &self,
        repo: &Repository,
        _branch: &str,
        credential: Option<&Credential>,
    ) -> Result<Vec<TreeEntry>> {
        self.take_fault()?;
        let fixture = self.lookup_by_id(&repo.id)?;
        Self::check_auth(&fixture, credential)?;

        Ok(fixture
            .files
            .iter()
            .map(|(path, content)| TreeEntry {
                path: path.clone(),
                size: content.len() as u64,
            })
            .collect())
    }

    async fn read_file(
        &self,
        repo: &Repository,
        _branch: &str,
        path: &str,
        credential: Option<&Credential>,
    ) -> Result<Vec<u8>> {
        self.take_fault()?;
        let fixture = self.lookup_by_id(&repo.id)?;
        Self::check_auth(&fixture, credential)?;

        fixture
            .files
            .get(path)
            .map(|content| bound_blob(content.clone().into_bytes()))
            .ok_or_else(|| Error::SourceNotFound(format!("{}:{path}", repo.id)))
    }

    async fn analyze_structure(
        &self,
        repo: &Repository,
        _branch: &str,
        credential: Option<&Credential>,
    ) -> Result<RepositoryStatistics> {
        self.take_fault()?;
        let fixture = self.lookup_by_id(&repo.id)?;
        Self::check_auth(&fixture, credential)?;

        let files: Vec<(String, usize)> = fixture
            .files
            .iter()
            .map(|(path, content)| (path.clone(), content.lines().count()))
            .collect();
        Ok(crate::languages::breakdown(&files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_with_repo() -> (FixtureHost, String) {
        let host = FixtureHost::new();
        let fixture = RepoFixture::new("acme", "svc")
            .with_file("src/main.go", "package main\n\nfunc main() {}\n")
            .with_file("README.md", "# svc\n")
            .with_commit("c1", "init", Utc::now());
        let url = fixture.url().to_string();
        host.add_repository(fixture);
        (host, url)
    }

    #[tokio::test]
    async fn test_connect_normalizes() {
        let (host, url) = host_with_repo();
        let repo = host.connect_repository(&url, None).await.unwrap();
        assert_eq!(repo.full_name, "acme/svc");
        assert_eq!(repo.clone_url, "https://host.example/acme/svc.git");
        assert!(repo.last_pushed_at.is_some());
    }

    #[tokio::test]
    async fn test_unknown_repo_not_found() {
        let (host, _) = host_with_repo();
        let err = host
            .connect_repository("https://host.example/no/such", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_private_repo_requires_token() {
        let host = FixtureHost::new();
        let fixture = RepoFixture::new("acme", "secret").with_required_token("t0k");
        let url = fixture.url().to_string();
        host.add_repository(fixture);

        assert!(matches!(
            host.connect_repository(&url, None).await.unwrap_err(),
            Error::SourceAuth(_)
        ));
        assert!(host
            .connect_repository(&url, Some(&Credential::new("t0k")))
            .await
            .is_ok());
        assert!(!host.validate_access(&url, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_fault_queue_applies_in_order() {
        let (host, url) = host_with_repo();
        host.inject_fault(Fault::Unavailable);
        host.inject_fault(Fault::RateLimited(Duration::from_secs(3)));

        assert!(matches!(
            host.connect_repository(&url, None).await.unwrap_err(),
            Error::SourceUnavailable(_)
        ));
        let err = host.connect_repository(&url, None).await.unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        // queue drained
        assert!(host.connect_repository(&url, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_structure_analysis() {
        let (host, url) = host_with_repo();
        let repo = host.connect_repository(&url, None).await.unwrap();
        let stats = host.analyze_structure(&repo, "main", None).await.unwrap();
        assert_eq!(stats.file_count, 2);
        assert!(stats.language_breakdown.contains_key("go"));
        assert!(stats.percentages_consistent());
    }

    #[tokio::test]
    async fn test_commits_newest_first_limited() {
        let host = FixtureHost::new();
        let t0 = Utc::now();
        let fixture = RepoFixture::new("a", "b")
            .with_commit("c1", "first", t0)
            .with_commit("c2", "second", t0 + chrono::Duration::minutes(1));
        let url = fixture.url().to_string();
        host.add_repository(fixture);

        let repo = host.connect_repository(&url, None).await.unwrap();
        let commits = host.list_commits(&repo, "main", 1, None).await.unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].hash, "c2");
    }
}
