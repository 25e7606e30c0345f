//! Version handling for release synchronization.
//!
//! This module parses the caller-supplied target version, discovers the
//! version being replaced, and rewrites version strings across the tree.

mod rewriter;

pub use rewriter::{RewriteResult, VersionRewriter};

use crate::error::{Result, VersionError};
use std::fmt;

/// A release version: semantic components plus the exact string form used
/// for textual rewriting, tag names and branch names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseVersion {
    version: semver::Version,
    text: String,
}

impl ReleaseVersion {
    /// Parse a version, accepting an optional leading `v`
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let stripped = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        if stripped.is_empty() {
            return Err(VersionError::InvalidVersion {
                version: input.to_string(),
                reason: "version is empty".to_string(),
            }
            .into());
        }

        let version =
            semver::Version::parse(stripped).map_err(|source| VersionError::ParseFailed {
                version: input.to_string(),
                source,
            })?;

        Ok(Self {
            text: version.to_string(),
            version,
        })
    }

    /// Exact string form (`1.3.0`)
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Parsed semantic version
    pub fn semver(&self) -> &semver::Version {
        &self.version
    }

    /// `(major, minor, patch)` components
    pub fn components(&self) -> (u64, u64, u64) {
        (self.version.major, self.version.minor, self.version.patch)
    }

    /// Tag name for this version (`v1.3.0`)
    pub fn tag_name(&self) -> String {
        format!("v{}", self.text)
    }

    /// Release branch name for this version (`release/v1.3.0`)
    pub fn release_branch(&self) -> String {
        format!("{}{}", crate::RELEASE_BRANCH_PREFIX, self.tag_name())
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Decide which version string is being replaced.
///
/// The latest version tag wins; the marker file is the fallback. Candidates
/// that do not parse as versions are ignored so unrelated text is never
/// rewritten.
pub fn discover_old_version(
    latest_tag: Option<&str>,
    marker_contents: Option<&str>,
) -> Option<ReleaseVersion> {
    if let Some(tag) = latest_tag {
        match ReleaseVersion::parse(tag) {
            Ok(version) => return Some(version),
            Err(e) => log::warn!("Ignoring tag '{}': {}", tag, e),
        }
    }

    let marker = marker_contents.map(str::trim).filter(|s| !s.is_empty())?;
    match ReleaseVersion::parse(marker) {
        Ok(version) => Some(version),
        Err(e) => {
            log::warn!("Ignoring version marker contents '{}': {}", marker, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_leading_v() {
        let version = ReleaseVersion::parse("v1.3.0").unwrap();
        assert_eq!(version.as_str(), "1.3.0");
        assert_eq!(version.components(), (1, 3, 0));
        assert_eq!(version.tag_name(), "v1.3.0");
        assert_eq!(version.release_branch(), "release/v1.3.0");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ReleaseVersion::parse("").is_err());
        assert!(ReleaseVersion::parse("v").is_err());
        assert!(ReleaseVersion::parse("1.3").is_err());
        assert!(ReleaseVersion::parse("latest").is_err());
    }

    #[test]
    fn test_discover_prefers_tag() {
        let old = discover_old_version(Some("v1.2.0"), Some("1.1.0\n")).unwrap();
        assert_eq!(old.as_str(), "1.2.0");
    }

    #[test]
    fn test_discover_falls_back_to_marker() {
        let old = discover_old_version(None, Some("1.1.0\n")).unwrap();
        assert_eq!(old.as_str(), "1.1.0");

        let old = discover_old_version(Some("nightly"), Some("1.1.0")).unwrap();
        assert_eq!(old.as_str(), "1.1.0");
    }

    #[test]
    fn test_discover_nothing() {
        assert!(discover_old_version(None, None).is_none());
        assert!(discover_old_version(None, Some("   \n")).is_none());
        assert!(discover_old_version(None, Some("unknown")).is_none());
    }
}
