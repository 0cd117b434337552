use crate::{Result, VcsAdapter, VcsError};
use async_trait::async_trait;
use log::debug;
use std::collections::{BTreeSet, HashSet};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::process::Command;

pub const STAGED_HEADER: &str = "# Staged Changes:";
pub const UNSTAGED_HEADER: &str = "# Unstaged Changes:";

/// [`VcsAdapter`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("git"),
        }
    }

    /// Use a specific git binary instead of the one on `PATH`.
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run<I, S>(&self, root: &Path, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<S> = args.into_iter().collect();
        let output = Command::new(&self.program)
            .arg("-C")
            .arg(root)
            .args(&args)
            // Read-only queries must not contend with the user's own git commands.
            .env("GIT_OPTIONAL_LOCKS", "0")
            .kill_on_drop(true)
            .output()
            .await?;

        // git diff may exit with 1 when differences exist; that is not a failure.
        let code = output.status.code();
        if !matches!(code, Some(0 | 1)) {
            let command = args
                .iter()
                .map(|arg| arg.as_ref().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(" ");
            return Err(VcsError::CommandFailed {
                command,
                code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn name_list(&self, root: &Path, args: &[&str]) -> Result<Vec<String>> {
        let raw = self.run(root, args).await?;
        Ok(split_nul_list(&raw))
    }
}

fn split_nul_list(raw: &str) -> Vec<String> {
    raw.split(['\0', '\n'])
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Joins the staged and unstaged sections, each under its header.
/// Both empty yields an empty string.
#[must_use]
pub(crate) fn combine_sections(staged: &str, unstaged: &str) -> String {
    let mut combined = String::new();
    if !staged.trim().is_empty() {
        combined.push_str(STAGED_HEADER);
        combined.push('\n');
        combined.push_str(staged);
        combined.push_str("\n\n");
    }
    if !unstaged.trim().is_empty() {
        combined.push_str(UNSTAGED_HEADER);
        combined.push('\n');
        combined.push_str(unstaged);
    }
    combined
}

#[async_trait]
impl VcsAdapter for GitCli {
    fn is_repository(&self, path: &Path) -> bool {
        if path.as_os_str().is_empty() || !path.is_dir() {
            return false;
        }
        // `.git` is a file for worktrees and submodules.
        path.join(".git").exists()
    }

    async fn diff(&self, root: &Path) -> Result<String> {
        let staged = self.run(root, ["diff", "--cached", "--no-color"]).await?;
        let unstaged = self.run(root, ["diff", "--no-color"]).await?;

        let mut combined = combine_sections(&staged, &unstaged);
        if combined.trim().is_empty() {
            // Repositories without a HEAD commit make this fail; nothing to show then.
            match self.run(root, ["diff", "HEAD", "--no-color", "--"]).await {
                Ok(fallback) => combined = fallback,
                Err(err) => debug!("fallback diff against HEAD unavailable: {err}"),
            }
        }

        Ok(combined.trim().to_string())
    }

    async fn tracked_files(&self, root: &Path) -> Result<HashSet<String>> {
        Ok(self
            .name_list(root, &["ls-files", "-z"])
            .await?
            .into_iter()
            .collect())
    }

    async fn modified_tracked_files(&self, root: &Path) -> Result<BTreeSet<String>> {
        let mut files: BTreeSet<String> = self
            .name_list(root, &["diff", "--name-only", "-z"])
            .await?
            .into_iter()
            .collect();
        files.extend(
            self.name_list(root, &["diff", "--name-only", "-z", "--cached"])
                .await?,
        );
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn combine_sections_empty_when_both_empty() {
        assert_eq!(combine_sections("", "  \n"), "");
    }

    #[test]
    fn combine_sections_labels_each_part() {
        let combined = combine_sections("staged-diff", "unstaged-diff");
        assert_eq!(
            combined,
            "# Staged Changes:\nstaged-diff\n\n# Unstaged Changes:\nunstaged-diff"
        );
        assert_eq!(
            combine_sections("", "only-unstaged"),
            "# Unstaged Changes:\nonly-unstaged"
        );
    }

    #[test]
    fn nul_lists_skip_blank_entries() {
        assert_eq!(
            split_nul_list("src/lib.rs\0README.md\0\0"),
            vec!["src/lib.rs".to_string(), "README.md".to_string()]
        );
    }

    #[test]
    fn non_directories_are_not_repositories() {
        let git = GitCli::new();
        assert!(!git.is_repository(Path::new("")));
        assert!(!git.is_repository(Path::new("/definitely/not/here")));
    }
}
