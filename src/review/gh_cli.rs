//! Review backend driving the `gh` command-line tool.
//!
//! Modern `gh` releases offer `--json` output and `--auto` merging; older ones
//! only print tab-separated text and ask for confirmation on merge. The
//! capabilities are probed once from `--help` output.

use super::{GitHubRepo, MergeDisposition, RequestState, ReviewRequest, ReviewService};
use crate::error::{Result, ReviewError};
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

static PULL_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/pull/(\d+)").expect("valid regex"));

static LEGACY_LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#?(\d+)\t[^\t]*\t([^\t]+)").expect("valid regex")
});

static LEGACY_STATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^state:\s*(\w+)").expect("valid regex"));

/// Fragments of `gh pr merge` errors that mean "not allowed right now"
const POLICY_REJECTIONS: &[&str] = &[
    "protected branch",
    "approving review",
    "review is required",
    "required status check",
    "not mergeable",
    "merge commits are not allowed",
    "auto-merge is not allowed",
    "base branch policy",
];

/// Affordances of the installed `gh`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GhCapabilities {
    /// `gh pr list/view --json`
    pub json_output: bool,
    /// `gh pr merge --auto`
    pub auto_merge: bool,
}

impl GhCapabilities {
    /// Derive capabilities from `gh pr list --help` and `gh pr merge --help`
    pub fn from_help(list_help: &str, merge_help: &str) -> Self {
        Self {
            json_output: list_help.contains("--json"),
            auto_merge: merge_help.contains("--auto"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhPullRequest {
    number: u64,
    #[serde(default)]
    url: Option<String>,
    head_ref_name: String,
    base_ref_name: String,
    state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhPullState {
    state: String,
    #[serde(default)]
    merged_at: Option<String>,
}

struct GhOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// `gh`-backed review service
#[derive(Debug, Clone)]
pub struct GhCli {
    program: PathBuf,
    repo: GitHubRepo,
    token: Option<String>,
    capabilities: GhCapabilities,
    timeout: Duration,
}

impl GhCli {
    /// Locate `gh`, check it is authenticated, and probe its capabilities.
    /// Returns `None` when `gh` is missing or not logged in.
    pub async fn probe(
        repo: &GitHubRepo,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Option<Self>> {
        let Ok(program) = which::which("gh") else {
            return Ok(None);
        };

        let mut cli = Self {
            program,
            repo: repo.clone(),
            token: token.map(str::to_string),
            capabilities: GhCapabilities::default(),
            timeout,
        };

        let status = cli.exec(&["auth", "status"], None).await?;
        if !status.success {
            log::debug!("gh is not authenticated: {}", status.stderr);
            return Ok(None);
        }

        let list_help = cli.exec(&["pr", "list", "--help"], None).await?;
        let merge_help = cli.exec(&["pr", "merge", "--help"], None).await?;
        cli.capabilities = GhCapabilities::from_help(
            &format!("{}{}", list_help.stdout, list_help.stderr),
            &format!("{}{}", merge_help.stdout, merge_help.stderr),
        );

        Ok(Some(cli))
    }

    /// Probed capabilities
    pub fn capabilities(&self) -> GhCapabilities {
        self.capabilities
    }

    async fn exec(&self, args: &[&str], stdin: Option<&str>) -> Result<GhOutput> {
        let command_line = format!("gh {}", args.join(" "));
        log::debug!("Running: {}", command_line);

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(args)
            .env("GH_PROMPT_DISABLED", "1")
            .env("NO_COLOR", "1")
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(token) = &self.token {
            cmd.env("GH_TOKEN", token);
        }

        let mut child = cmd.spawn().map_err(|e| ReviewError::CommandFailed {
            command: command_line.clone(),
            reason: e.to_string(),
        })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
            drop(pipe);
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ReviewError::CommandFailed {
                command: command_line.clone(),
                reason: format!("timed out after {}s", self.timeout.as_secs()),
            })??;

        Ok(GhOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.exec(args, None).await?;
        if !output.success {
            return Err(ReviewError::CommandFailed {
                command: format!("gh {}", args.join(" ")),
                reason: output.stderr,
            }
            .into());
        }
        Ok(output.stdout)
    }

    async fn request_state(&self, number: u64) -> Result<RequestState> {
        let repo = self.repo.slug();
        let number = number.to_string();

        if self.capabilities.json_output {
            let json = self
                .run(&["pr", "view", &number, "--repo", &repo, "--json", "state,mergedAt"])
                .await?;
            let view: GhPullState = serde_json::from_str(&json)?;
            return Ok(RequestState::parse(&view.state, view.merged_at.is_some()));
        }

        let text = self.run(&["pr", "view", &number, "--repo", &repo]).await?;
        parse_legacy_state(&text).ok_or_else(|| {
            ReviewError::UnexpectedResponse {
                reason: format!("no state in `gh pr view {}` output", number),
            }
            .into()
        })
    }
}

impl ReviewService for GhCli {
    fn name(&self) -> &'static str {
        "gh"
    }

    async fn find_open(&self, source: &str, target: &str) -> Result<Option<ReviewRequest>> {
        let repo = self.repo.slug();

        if self.capabilities.json_output {
            let json = self
                .run(&[
                    "pr",
                    "list",
                    "--repo",
                    &repo,
                    "--state",
                    "open",
                    "--head",
                    source,
                    "--base",
                    target,
                    "--json",
                    "number,url,headRefName,baseRefName,state",
                ])
                .await?;
            let requests: Vec<GhPullRequest> = serde_json::from_str(&json)?;
            return Ok(requests
                .into_iter()
                .find(|pr| pr.head_ref_name == source && pr.base_ref_name == target)
                .map(|pr| ReviewRequest {
                    number: pr.number,
                    source: pr.head_ref_name,
                    target: pr.base_ref_name,
                    state: RequestState::parse(&pr.state, false),
                    url: pr.url,
                }));
        }

        let text = self
            .run(&["pr", "list", "--repo", &repo, "--state", "open", "--base", target])
            .await?;
        Ok(parse_legacy_list(&text, source).map(|number| ReviewRequest {
            number,
            source: source.to_string(),
            target: target.to_string(),
            state: RequestState::Open,
            url: None,
        }))
    }

    async fn create(
        &self,
        source: &str,
        target: &str,
        title: &str,
        body: &str,
    ) -> Result<ReviewRequest> {
        let repo = self.repo.slug();
        let output = self
            .exec(
                &[
                    "pr", "create", "--repo", &repo, "--head", source, "--base", target,
                    "--title", title, "--body", body,
                ],
                None,
            )
            .await?;

        if !output.success {
            if output.stderr.contains("already exists") {
                log::info!("Review request for {} already exists, resuming it", source);
                if let Some(existing) = self.find_open(source, target).await? {
                    return Ok(existing);
                }
            }
            return Err(ReviewError::CommandFailed {
                command: "gh pr create".to_string(),
                reason: output.stderr,
            }
            .into());
        }

        let url = output
            .stdout
            .lines()
            .rev()
            .find(|line| line.contains("/pull/"))
            .map(str::to_string);
        let number = url.as_deref().and_then(pull_number_from_url).ok_or_else(|| {
            ReviewError::UnexpectedResponse {
                reason: format!("no pull request URL in `gh pr create` output: {}", output.stdout),
            }
        })?;

        Ok(ReviewRequest {
            number,
            source: source.to_string(),
            target: target.to_string(),
            state: RequestState::Open,
            url,
        })
    }

    async fn merge(&self, request: &ReviewRequest) -> Result<MergeDisposition> {
        let repo = self.repo.slug();
        let number = request.number.to_string();
        let mut args = vec!["pr", "merge", number.as_str(), "--repo", repo.as_str(), "--merge"];

        // Legacy gh asks whether to delete the branch; the release branch stays.
        let stdin = if self.capabilities.json_output {
            None
        } else {
            Some("n\n")
        };
        if self.capabilities.auto_merge {
            args.push("--auto");
        }

        let output = self.exec(&args, stdin).await?;
        if !output.success {
            if is_policy_rejection(&output.stderr) {
                return Ok(MergeDisposition::Deferred {
                    reason: output.stderr,
                });
            }
            return Err(ReviewError::CommandFailed {
                command: format!("gh {}", args.join(" ")),
                reason: output.stderr,
            }
            .into());
        }

        match self.request_state(request.number).await? {
            RequestState::Merged => Ok(MergeDisposition::Merged),
            state if self.capabilities.auto_merge => Ok(MergeDisposition::Deferred {
                reason: format!("auto-merge enabled, request still {:?}", state),
            }),
            state => Ok(MergeDisposition::Deferred {
                reason: format!("merge reported success but request is {:?}", state),
            }),
        }
    }
}

/// Number of a pull request from its web URL
pub(crate) fn pull_number_from_url(url: &str) -> Option<u64> {
    PULL_NUMBER_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Find the request whose head is `source` in legacy `gh pr list` text output
fn parse_legacy_list(output: &str, source: &str) -> Option<u64> {
    output.lines().find_map(|line| {
        let caps = LEGACY_LIST_RE.captures(line)?;
        let head = caps.get(2)?.as_str().trim();
        // Cross-repository heads are shown as `owner:branch`
        let head = head.rsplit_once(':').map_or(head, |(_, branch)| branch);
        if head == source {
            caps.get(1)?.as_str().parse().ok()
        } else {
            None
        }
    })
}

fn parse_legacy_state(output: &str) -> Option<RequestState> {
    LEGACY_STATE_RE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| RequestState::parse(m.as_str(), false))
}

/// Whether a merge failure is a repository policy decision rather than an error
pub(crate) fn is_policy_rejection(stderr: &str) -> bool {
    let lowered = stderr.to_ascii_lowercase();
    POLICY_REJECTIONS.iter().any(|fragment| lowered.contains(fragment))
}
