//! Review backend using the GitHub REST API.

use super::{GitHubRepo, MergeDisposition, RequestState, ReviewRequest, ReviewService};
use crate::error::{Result, ReviewError};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Public GitHub API root
pub const DEFAULT_API_URL: &str = "https://api.github.com/";

#[derive(Debug, Deserialize)]
struct PullResponse {
    number: u64,
    #[serde(default)]
    html_url: Option<String>,
    state: String,
    #[serde(default)]
    merged_at: Option<String>,
    head: RefResponse,
    base: RefResponse,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Debug, Serialize)]
struct CreatePull<'a> {
    title: &'a str,
    head: &'a str,
    base: &'a str,
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct MergePull<'a> {
    merge_method: &'a str,
}

#[derive(Debug, Deserialize)]
struct MergeResponse {
    #[serde(default)]
    merged: bool,
    #[serde(default)]
    message: Option<String>,
}

impl From<PullResponse> for ReviewRequest {
    fn from(pull: PullResponse) -> Self {
        Self {
            number: pull.number,
            state: RequestState::parse(&pull.state, pull.merged_at.is_some()),
            source: pull.head.name,
            target: pull.base.name,
            url: pull.html_url,
        }
    }
}

/// How a merge call was answered
#[derive(Debug, Clone, PartialEq, Eq)]
enum MergeVerdict {
    Merged,
    /// Accepted without `merged: true`; the request state decides
    CheckState,
    Rejected(String),
}

/// Classify the answer to `PUT /pulls/{n}/merge`
fn interpret_merge(status: u16, body: &str) -> Result<MergeVerdict> {
    let parsed: Option<MergeResponse> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|r| r.message.clone())
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        200..=299 if parsed.as_ref().is_some_and(|r| r.merged) => Ok(MergeVerdict::Merged),
        200..=299 => Ok(MergeVerdict::CheckState),
        405 | 409 | 422 => Ok(MergeVerdict::Rejected(message)),
        _ => Err(ReviewError::Http {
            status,
            body: message,
        }
        .into()),
    }
}

/// REST-backed review service
#[derive(Debug, Clone)]
pub struct RestApi {
    client: Client,
    base: Url,
    repo: GitHubRepo,
    token: String,
}

impl RestApi {
    /// Client for `repo` at the API root `base_url`
    pub fn new(base_url: &str, repo: GitHubRepo, token: &str, timeout: Duration) -> Result<Self> {
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base).map_err(|e| ReviewError::Unavailable {
            reason: format!("invalid API URL '{}': {}", base_url, e),
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("release-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ReviewError::from)?;

        Ok(Self {
            client,
            base,
            repo,
            token: token.to_string(),
        })
    }

    /// API root from `GITHUB_API_URL`, or the public API
    pub fn base_url_from_env() -> String {
        std::env::var("GITHUB_API_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(&format!("repos/{}/{}/{}", self.repo.owner, self.repo.name, path))
            .map_err(|e| {
                ReviewError::UnexpectedResponse {
                    reason: format!("cannot build API URL for '{}': {}", path, e),
                }
                .into()
            })
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        log::debug!("{} {}", method, url);
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn read(response: reqwest::Response) -> Result<(StatusCode, String)> {
        let status = response.status();
        let body = response.text().await.map_err(ReviewError::from)?;
        Ok((status, body))
    }

    fn expect_success(status: StatusCode, body: String) -> Result<String> {
        if status.is_success() {
            Ok(body)
        } else {
            Err(ReviewError::Http {
                status: status.as_u16(),
                body,
            }
            .into())
        }
    }

    async fn fetch_request(&self, number: u64) -> Result<ReviewRequest> {
        let url = self.endpoint(&format!("pulls/{}", number))?;
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(ReviewError::from)?;
        let (status, body) = Self::read(response).await?;
        let body = Self::expect_success(status, body)?;
        let pull: PullResponse = serde_json::from_str(&body)?;
        Ok(pull.into())
    }
}

impl ReviewService for RestApi {
    fn name(&self) -> &'static str {
        "rest-api"
    }

    async fn find_open(&self, source: &str, target: &str) -> Result<Option<ReviewRequest>> {
        let mut url = self.endpoint("pulls")?;
        url.query_pairs_mut()
            .append_pair("state", "open")
            .append_pair("head", &format!("{}:{}", self.repo.owner, source))
            .append_pair("base", target);

        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(ReviewError::from)?;
        let (status, body) = Self::read(response).await?;
        let body = Self::expect_success(status, body)?;
        let pulls: Vec<PullResponse> = serde_json::from_str(&body)?;

        Ok(pulls
            .into_iter()
            .map(ReviewRequest::from)
            .find(|request| request.source == source && request.target == target))
    }

    async fn create(
        &self,
        source: &str,
        target: &str,
        title: &str,
        body: &str,
    ) -> Result<ReviewRequest> {
        let url = self.endpoint("pulls")?;
        let response = self
            .request(Method::POST, url)
            .json(&CreatePull {
                title,
                head: source,
                base: target,
                body,
            })
            .send()
            .await
            .map_err(ReviewError::from)?;
        let (status, text) = Self::read(response).await?;

        if status == StatusCode::UNPROCESSABLE_ENTITY && text.contains("already exists") {
            log::info!("Review request for {} already exists, resuming it", source);
            if let Some(existing) = self.find_open(source, target).await? {
                return Ok(existing);
            }
        }

        let text = Self::expect_success(status, text)?;
        let pull: PullResponse = serde_json::from_str(&text)?;
        Ok(pull.into())
    }

    async fn merge(&self, request: &ReviewRequest) -> Result<MergeDisposition> {
        let url = self.endpoint(&format!("pulls/{}/merge", request.number))?;
        let response = self
            .request(Method::PUT, url)
            .json(&MergePull {
                merge_method: "merge",
            })
            .send()
            .await
            .map_err(ReviewError::from)?;
        let (status, body) = Self::read(response).await?;

        match interpret_merge(status.as_u16(), &body)? {
            MergeVerdict::Merged => Ok(MergeDisposition::Merged),
            MergeVerdict::Rejected(reason) => Ok(MergeDisposition::Deferred { reason }),
            MergeVerdict::CheckState => {
                let current = self.fetch_request(request.number).await?;
                if current.state == RequestState::Merged {
                    Ok(MergeDisposition::Merged)
                } else {
                    Ok(MergeDisposition::Deferred {
                        reason: format!("merge accepted but request is {:?}", current.state),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> GitHubRepo {
        GitHubRepo {
            owner: "acme".to_string(),
            name: "editor".to_string(),
        }
    }

    #[test]
    fn test_interpret_merge() {
        assert_eq!(
            interpret_merge(200, r#"{"sha":"abc","merged":true,"message":"Pull Request successfully merged"}"#)
                .unwrap(),
            MergeVerdict::Merged
        );
        assert_eq!(
            interpret_merge(200, r#"{"merged":false}"#).unwrap(),
            MergeVerdict::CheckState
        );
        assert_eq!(
            interpret_merge(405, r#"{"message":"Required status check \"ci\" is expected."}"#)
                .unwrap(),
            MergeVerdict::Rejected("Required status check \"ci\" is expected.".to_string())
        );
        assert_eq!(
            interpret_merge(409, "Head branch was modified").unwrap(),
            MergeVerdict::Rejected("Head branch was modified".to_string())
        );

        let err = interpret_merge(502, "Bad Gateway").unwrap_err();
        assert!(err.is_recoverable());
        assert!(!interpret_merge(401, r#"{"message":"Bad credentials"}"#)
            .unwrap_err()
            .is_recoverable());
    }

    #[test]
    fn test_endpoints() {
        let api = RestApi::new("https://ghe.example.com/api/v3", repo(), "t", Duration::from_secs(5))
            .unwrap();
        assert_eq!(
            api.endpoint("pulls/7/merge").unwrap().as_str(),
            "https://ghe.example.com/api/v3/repos/acme/editor/pulls/7/merge"
        );

        let api = RestApi::new(DEFAULT_API_URL, repo(), "t", Duration::from_secs(5)).unwrap();
        assert_eq!(
            api.endpoint("pulls").unwrap().as_str(),
            "https://api.github.com/repos/acme/editor/pulls"
        );
    }

    #[test]
    fn test_pull_response_conversion() {
        let json = r#"{
            "number": 9,
            "html_url": "https://github.com/acme/editor/pull/9",
            "state": "closed",
            "merged_at": "2026-01-02T03:04:05Z",
            "head": {"ref": "release/v1.3.0"},
            "base": {"ref": "main"}
        }"#;
        let pull: PullResponse = serde_json::from_str(json).unwrap();
        let request = ReviewRequest::from(pull);
        assert_eq!(request.state, RequestState::Merged);
        assert_eq!(request.source, "release/v1.3.0");
        assert_eq!(request.target, "main");
    }
}
