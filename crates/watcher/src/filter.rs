use std::path::{Component, Path};

/// Directory names whose contents never trigger a review.
pub const DEFAULT_IGNORED_DIRS: &[&str] = &["node_modules", "bin", "obj"];

/// Editor swap/backup and temp-file suffixes.
pub const TEMP_FILE_SUFFIXES: &[&str] = &[".tmp", "~", ".swp", ".swo"];

const VCS_METADATA_DIRS: &[&str] = &[".git"];

/// Why a path was dropped before the relevance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseKind {
    VcsMetadata,
    TempFile,
    Dotfile,
    IgnoredDir,
}

/// Cheap, synchronous path filter applied to every filesystem event.
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    ignored_dirs: Vec<String>,
}

impl Default for ChangeFilter {
    fn default() -> Self {
        Self {
            ignored_dirs: DEFAULT_IGNORED_DIRS
                .iter()
                .map(|dir| (*dir).to_string())
                .collect(),
        }
    }
}

impl ChangeFilter {
    /// Default rules plus extra directory names (matched per component,
    /// case-insensitively).
    #[must_use]
    pub fn with_extra_dirs<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self::default();
        for dir in extra {
            let dir = dir.as_ref().trim().trim_matches(['/', '\\']).to_lowercase();
            if !dir.is_empty() && !filter.ignored_dirs.contains(&dir) {
                filter.ignored_dirs.push(dir);
            }
        }
        filter
    }

    /// Classifies `path` (absolute, under `root`). Only components below the
    /// root are inspected, so a root inside a dot-directory still works.
    #[must_use]
    pub fn classify(&self, root: &Path, path: &Path) -> Option<NoiseKind> {
        let relative = path.strip_prefix(root).unwrap_or(path);

        let mut dotfile = false;
        for component in relative.components() {
            let Component::Normal(name) = component else {
                continue;
            };
            let name = name.to_string_lossy();
            if VCS_METADATA_DIRS
                .iter()
                .any(|vcs| name.eq_ignore_ascii_case(vcs))
            {
                return Some(NoiseKind::VcsMetadata);
            }
            if self
                .ignored_dirs
                .iter()
                .any(|ignored| name.eq_ignore_ascii_case(ignored))
            {
                return Some(NoiseKind::IgnoredDir);
            }
            if name.starts_with('.') {
                dotfile = true;
            }
        }

        if let Some(name) = relative.file_name() {
            let lowered = name.to_string_lossy().to_lowercase();
            if TEMP_FILE_SUFFIXES
                .iter()
                .any(|suffix| lowered.ends_with(suffix))
            {
                return Some(NoiseKind::TempFile);
            }
        }

        dotfile.then_some(NoiseKind::Dotfile)
    }

    #[must_use]
    pub fn is_noise(&self, root: &Path, path: &Path) -> bool {
        self.classify(root, path).is_some()
    }
}

/// Repository-relative path with `/` separators, the form `git ls-files`
/// prints. `None` for paths outside `root`.
#[must_use]
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/").replace('\\', "/"))
}
