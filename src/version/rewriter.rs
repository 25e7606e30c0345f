//! Textual version rewriting across a work tree.
//!
//! Renames version-stamped files, substitutes the old version string in
//! tracked text files, and writes the version marker. The caller commits the
//! result only once the rewrite has completed.
//!
//! A file is version-stamped when its path relative to the root contains the
//! old version, in any component. Symlinks are moved as links; their targets
//! are never rewritten.

use crate::error::{Result, VersionError};
use std::fs;
use std::path::{Path, PathBuf};

/// Number of leading bytes inspected when deciding whether a file is text
const BINARY_SNIFF_LEN: usize = 8000;

/// Result of a rewrite pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteResult {
    /// Files moved, as (old path, new path) relative to the tree root
    pub renamed: Vec<(PathBuf, PathBuf)>,
    /// Files whose contents changed, relative to the tree root
    pub modified: Vec<PathBuf>,
    /// Version marker path, relative to the tree root
    pub marker: PathBuf,
    /// Whether the marker contents changed
    pub marker_changed: bool,
}

impl RewriteResult {
    /// True when nothing on disk changed
    pub fn is_noop(&self) -> bool {
        self.renamed.is_empty() && self.modified.is_empty() && !self.marker_changed
    }

    /// Every path whose index entry may need updating, both sides of renames included
    pub fn touched_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .renamed
            .iter()
            .flat_map(|(from, to)| [from.clone(), to.clone()])
            .chain(self.modified.iter().cloned())
            .collect();
        if self.marker_changed {
            paths.push(self.marker.clone());
        }
        paths.sort();
        paths.dedup();
        paths
    }
}

/// Rewrites version strings below a work-tree root
#[derive(Debug)]
pub struct VersionRewriter<'a> {
    root: &'a Path,
    marker_file: &'a Path,
}

impl<'a> VersionRewriter<'a> {
    /// Create a rewriter for `root`, with the marker at `marker_file` (relative)
    pub fn new(root: &'a Path, marker_file: &'a Path) -> Self {
        Self { root, marker_file }
    }

    /// Rewrite `old` to `new` in the given tracked paths.
    ///
    /// With no old version (or `old == new`) only the marker is written.
    pub fn rewrite(&self, tracked: &[PathBuf], old: Option<&str>, new: &str) -> Result<RewriteResult> {
        let mut result = RewriteResult {
            marker: self.marker_file.to_path_buf(),
            ..RewriteResult::default()
        };

        if let Some(old) = old.filter(|old| !old.is_empty() && *old != new) {
            let current_paths = self.rename_stamped_files(tracked, old, new, &mut result)?;
            self.substitute_contents(&current_paths, old, new, &mut result)?;
        }

        result.marker_changed = self.write_marker(new)?;
        Ok(result)
    }

    /// Move every file whose relative path carries `old`. Returns the tracked
    /// list with renamed entries replaced by their new paths.
    fn rename_stamped_files(
        &self,
        tracked: &[PathBuf],
        old: &str,
        new: &str,
        result: &mut RewriteResult,
    ) -> Result<Vec<PathBuf>> {
        let mut current = Vec::with_capacity(tracked.len());

        for path in tracked {
            if !path.to_string_lossy().contains(old) {
                current.push(path.clone());
                continue;
            }

            let renamed = PathBuf::from(path.to_string_lossy().replace(old, new));
            let source = self.root.join(path);
            let target = self.root.join(&renamed);

            if fs::symlink_metadata(&source).is_err() {
                log::debug!("Skipping vanished file {}", path.display());
                continue;
            }
            if fs::symlink_metadata(&target).is_ok() {
                log::warn!(
                    "Not renaming {} because {} already exists",
                    path.display(),
                    renamed.display()
                );
                current.push(path.clone());
                continue;
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| VersionError::RewriteFailed {
                    path: renamed.clone(),
                    reason: format!("Failed to create parent directory: {}", e),
                })?;
            }
            fs::rename(&source, &target).map_err(|e| VersionError::RewriteFailed {
                path: path.clone(),
                reason: format!("Failed to rename to {}: {}", renamed.display(), e),
            })?;

            log::debug!("Renamed {} -> {}", path.display(), renamed.display());
            result.renamed.push((path.clone(), renamed.clone()));
            current.push(renamed);
        }

        Ok(current)
    }

    fn substitute_contents(
        &self,
        paths: &[PathBuf],
        old: &str,
        new: &str,
        result: &mut RewriteResult,
    ) -> Result<()> {
        for path in paths {
            let full = self.root.join(path);
            match fs::symlink_metadata(&full) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    log::debug!("Skipping symlink {}", path.display());
                    continue;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    log::debug!("Skipping vanished file {}", path.display());
                    continue;
                }
                _ => {}
            }

            let bytes = match fs::read(&full) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    log::debug!("Skipping vanished file {}", path.display());
                    continue;
                }
                Err(e) if full.is_dir() => {
                    // Submodules are listed as tracked paths.
                    log::debug!("Skipping directory {}: {}", path.display(), e);
                    continue;
                }
                Err(e) => {
                    return Err(VersionError::RewriteFailed {
                        path: path.clone(),
                        reason: format!("Failed to read: {}", e),
                    }
                    .into());
                }
            };

            let Some(text) = as_text(&bytes) else {
                continue;
            };
            if !text.contains(old) {
                continue;
            }

            fs::write(&full, text.replace(old, new)).map_err(|e| VersionError::RewriteFailed {
                path: path.clone(),
                reason: format!("Failed to write: {}", e),
            })?;
            result.modified.push(path.clone());
        }

        Ok(())
    }

    fn write_marker(&self, new: &str) -> Result<bool> {
        let full = self.root.join(self.marker_file);
        let existing = fs::read_to_string(&full).ok();
        if existing.as_deref().map(str::trim) == Some(new) {
            return Ok(false);
        }

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, format!("{}\n", new)).map_err(|e| VersionError::RewriteFailed {
            path: self.marker_file.to_path_buf(),
            reason: format!("Failed to write version marker: {}", e),
        })?;
        Ok(true)
    }
}

/// Interpret bytes as text: valid UTF-8 with no NUL in the sniffed prefix
fn as_text(bytes: &[u8]) -> Option<&str> {
    let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
    if sniff.contains(&0) {
        return None;
    }
    std::str::from_utf8(bytes).ok()
}
