//! Message templates for commits, tags and review requests.

use crate::version::ReleaseVersion;

/// Templates rendered with `{version}`, `{release}` and `{integration}`
#[derive(Debug, Clone)]
pub struct MessageTemplates {
    /// Version bump commit
    pub bump_commit: String,
    /// Annotated tag message
    pub tag: String,
    /// Merge of integration into the release branch
    pub merge_forward: String,
    /// Merge of the release branch into integration
    pub landing: String,
    /// Review request title
    pub review_title: String,
    /// Review request body
    pub review_body: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            bump_commit: "chore(release): v{version}".to_string(),
            tag: "Release v{version}".to_string(),
            merge_forward: "Merge {integration} into {release}".to_string(),
            landing: "Merge {release} into {integration}".to_string(),
            review_title: "Release v{version}".to_string(),
            review_body: "Lands `{release}` on `{integration}`.\n\nOpened by release-sync."
                .to_string(),
        }
    }
}

/// Values substituted into templates
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    /// Target version
    pub version: &'a ReleaseVersion,
    /// Release branch name
    pub release: &'a str,
    /// Integration branch name
    pub integration: &'a str,
}

impl MessageTemplates {
    /// Substitute placeholders in `template`
    pub fn render(template: &str, ctx: TemplateContext<'_>) -> String {
        template
            .replace("{version}", ctx.version.as_str())
            .replace("{release}", ctx.release)
            .replace("{integration}", ctx.integration)
    }
}
