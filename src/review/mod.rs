//! Review requests (pull requests) for landing a release branch.
//!
//! The sync engine talks to review tooling only through [`ReviewService`].
//! A backend is chosen once at startup by [`detect`]: the `gh` CLI when it is
//! installed and authenticated, the REST API when a token and a GitHub remote
//! are available, and nothing otherwise.

mod gh_cli;
mod rest_api;

pub use gh_cli::{GhCapabilities, GhCli};
pub use rest_api::RestApi;

use crate::error::Result;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

/// Lifecycle state of a review request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Open and mergeable in principle
    Open,
    /// Already merged
    Merged,
    /// Closed without merging
    Closed,
}

impl RequestState {
    /// Parse the state strings used by the CLI (`OPEN`) and the API (`open`)
    pub fn parse(state: &str, merged: bool) -> Self {
        if merged {
            return Self::Merged;
        }
        match state.trim().to_ascii_lowercase().as_str() {
            "open" => Self::Open,
            "merged" => Self::Merged,
            _ => Self::Closed,
        }
    }
}

/// A review request from a source branch into a target branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRequest {
    /// Request number
    pub number: u64,
    /// Source (head) branch
    pub source: String,
    /// Target (base) branch
    pub target: String,
    /// Current state
    pub state: RequestState,
    /// Web URL, when known
    pub url: Option<String>,
}

/// Result of asking a backend to merge a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeDisposition {
    /// The request is merged on the remote
    Merged,
    /// The backend declined for policy reasons (protection rules, pending checks)
    Deferred {
        /// What the backend said
        reason: String,
    },
}

/// Review tooling seam
pub trait ReviewService {
    /// Short backend name for logs and reports
    fn name(&self) -> &'static str;

    /// Find an open request from `source` into `target`
    fn find_open(
        &self,
        source: &str,
        target: &str,
    ) -> impl Future<Output = Result<Option<ReviewRequest>>>;

    /// Open a request from `source` into `target`
    fn create(
        &self,
        source: &str,
        target: &str,
        title: &str,
        body: &str,
    ) -> impl Future<Output = Result<ReviewRequest>>;

    /// Merge a request (merge commit, source branch kept)
    fn merge(&self, request: &ReviewRequest) -> impl Future<Output = Result<MergeDisposition>>;
}

/// The backend selected at startup
#[derive(Debug)]
pub enum ReviewBackend {
    /// The `gh` command-line tool
    Cli(GhCli),
    /// The GitHub REST API
    Api(RestApi),
}

impl ReviewService for ReviewBackend {
    fn name(&self) -> &'static str {
        match self {
            ReviewBackend::Cli(cli) => cli.name(),
            ReviewBackend::Api(api) => api.name(),
        }
    }

    async fn find_open(&self, source: &str, target: &str) -> Result<Option<ReviewRequest>> {
        match self {
            ReviewBackend::Cli(cli) => cli.find_open(source, target).await,
            ReviewBackend::Api(api) => api.find_open(source, target).await,
        }
    }

    async fn create(
        &self,
        source: &str,
        target: &str,
        title: &str,
        body: &str,
    ) -> Result<ReviewRequest> {
        match self {
            ReviewBackend::Cli(cli) => cli.create(source, target, title, body).await,
            ReviewBackend::Api(api) => api.create(source, target, title, body).await,
        }
    }

    async fn merge(&self, request: &ReviewRequest) -> Result<MergeDisposition> {
        match self {
            ReviewBackend::Cli(cli) => cli.merge(request).await,
            ReviewBackend::Api(api) => api.merge(request).await,
        }
    }
}

/// Owner and name of a GitHub repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubRepo {
    /// Owner (user or organization)
    pub owner: String,
    /// Repository name
    pub name: String,
}

impl GitHubRepo {
    /// `owner/name`
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Extract owner/name from a GitHub remote URL (SCP-like, ssh:// or https://)
pub fn parse_github_url(url: &str) -> Option<GitHubRepo> {
    let url = url.trim();

    // SCP-like: git@github.com:owner/repo.git
    let path = if url.contains('@') && url.contains(':') && !url.contains("://") {
        let (host, path) = url.split_once(':')?;
        if !host.ends_with("github.com") {
            return None;
        }
        path
    } else {
        let start = url.find("github.com/")?;
        &url[start + "github.com/".len()..]
    };

    let mut parts = path.trim_end_matches('/').trim_end_matches(".git").split('/');
    let owner = parts.next().filter(|s| !s.is_empty())?;
    let name = parts.next().filter(|s| !s.is_empty())?;

    Some(GitHubRepo {
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

/// Resolve an API token: explicit value (flag or `GH_TOKEN`), then
/// `GITHUB_TOKEN`, then the credential stored by `gh`.
pub async fn resolve_token(explicit: Option<&str>, timeout: Duration) -> Option<String> {
    if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }

    if let Some(token) = std::env::var("GITHUB_TOKEN")
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
    {
        return Some(token);
    }

    let gh = which::which("gh").ok()?;
    let child = tokio::process::Command::new(gh)
        .args(["auth", "token"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .ok()?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) if output.status.success() => {
            let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
            (!token.is_empty()).then_some(token)
        }
        _ => None,
    }
}

/// Pick the review backend for this run, or `None` for offline landing
pub async fn detect(
    remote_url: Option<&str>,
    token: Option<&str>,
    timeout: Duration,
) -> Option<ReviewBackend> {
    let Some(repo) = remote_url.and_then(parse_github_url) else {
        log::info!("Remote is not a GitHub repository; review requests disabled");
        return None;
    };

    match GhCli::probe(&repo, token, timeout).await {
        Ok(Some(cli)) => {
            log::info!("Using gh CLI for review requests ({:?})", cli.capabilities());
            return Some(ReviewBackend::Cli(cli));
        }
        Ok(None) => log::debug!("gh CLI not usable"),
        Err(e) => log::warn!("gh CLI probe failed: {}", e),
    }

    let token = token?;
    match RestApi::new(&RestApi::base_url_from_env(), repo, token, timeout) {
        Ok(api) => {
            log::info!("Using GitHub REST API for review requests");
            Some(ReviewBackend::Api(api))
        }
        Err(e) => {
            log::warn!("REST API client unavailable: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_github_url_forms() {
        let expected = Some(GitHubRepo {
            owner: "acme".to_string(),
            name: "editor".to_string(),
        });
        assert_eq!(parse_github_url("git@github.com:acme/editor.git"), expected);
        assert_eq!(parse_github_url("https://github.com/acme/editor"), expected);
        assert_eq!(parse_github_url("https://github.com/acme/editor.git/"), expected);
        assert_eq!(parse_github_url("ssh://git@github.com/acme/editor.git"), expected);
        assert_eq!(
            parse_github_url("https://github.com/acme/editor").unwrap().slug(),
            "acme/editor"
        );
    }

    #[test]
    fn test_parse_github_url_rejects_others() {
        assert_eq!(parse_github_url("git@gitlab.com:acme/editor.git"), None);
        assert_eq!(parse_github_url("/srv/git/editor.git"), None);
        assert_eq!(parse_github_url("https://github.com/acme"), None);
    }

    #[test]
    fn test_request_state_parse() {
        assert_eq!(RequestState::parse("OPEN", false), RequestState::Open);
        assert_eq!(RequestState::parse("open", false), RequestState::Open);
        assert_eq!(RequestState::parse("MERGED", false), RequestState::Merged);
        assert_eq!(RequestState::parse("closed", true), RequestState::Merged);
        assert_eq!(RequestState::parse("closed", false), RequestState::Closed);
    }

    #[tokio::test]
    async fn test_explicit_token_wins() {
        let token = resolve_token(Some("  ghp_explicit \n"), Duration::from_secs(5)).await;
        assert_eq!(token.as_deref(), Some("ghp_explicit"));
    }
}
