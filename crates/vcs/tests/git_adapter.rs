use diffwatch_vcs::{GitCli, VcsAdapter, STAGED_HEADER, UNSTAGED_HEADER};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success())
}

fn run_git(root: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(root)
        .args([
            "-c",
            "user.name=diffwatch",
            "-c",
            "user.email=diffwatch@example.invalid",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .status()
        .expect("spawn git");
    assert!(status.success(), "git {args:?} failed");
}

fn committed_repo() -> TempDir {
    let temp = TempDir::new().expect("tempdir");
    run_git(temp.path(), &["init", "-q"]);
    std::fs::create_dir_all(temp.path().join("src")).expect("mkdir");
    std::fs::write(temp.path().join("src/lib.rs"), "fn noop() {}\n").expect("write");
    std::fs::write(temp.path().join("README.md"), "hello\n").expect("write");
    run_git(temp.path(), &["add", "."]);
    run_git(temp.path(), &["commit", "-q", "-m", "init"]);
    temp
}

#[tokio::test]
async fn clean_repository_has_no_changes() {
    if !git_available() {
        eprintln!("skipping git adapter tests: git not installed");
        return;
    }
    let repo = committed_repo();
    let git = GitCli::new();

    assert!(git.is_repository(repo.path()));
    assert!(!git.has_tracked_changes(repo.path()).await.expect("status"));
    assert_eq!(git.diff(repo.path()).await.expect("diff"), "");

    let tracked = git.tracked_files(repo.path()).await.expect("ls-files");
    assert!(tracked.contains("src/lib.rs"));
    assert!(tracked.contains("README.md"));
}

#[tokio::test]
async fn unstaged_and_staged_edits_get_separate_sections() {
    if !git_available() {
        eprintln!("skipping git adapter tests: git not installed");
        return;
    }
    let repo = committed_repo();
    let git = GitCli::new();

    std::fs::write(repo.path().join("src/lib.rs"), "fn changed() {}\n").expect("write");
    let diff = git.diff(repo.path()).await.expect("diff");
    assert!(diff.starts_with(UNSTAGED_HEADER), "diff was: {diff}");
    assert!(diff.contains("+fn changed() {}"));

    run_git(repo.path(), &["add", "src/lib.rs"]);
    std::fs::write(repo.path().join("README.md"), "hello again\n").expect("write");
    let diff = git.diff(repo.path()).await.expect("diff");
    assert!(diff.starts_with(STAGED_HEADER), "diff was: {diff}");
    assert!(diff.contains(UNSTAGED_HEADER));

    let modified: Vec<String> = git
        .modified_tracked_files(repo.path())
        .await
        .expect("modified")
        .into_iter()
        .collect();
    assert_eq!(
        modified,
        vec!["README.md".to_string(), "src/lib.rs".to_string()]
    );
    assert!(git.has_tracked_changes(repo.path()).await.expect("status"));
}

#[tokio::test]
async fn untracked_files_do_not_count_as_changes() {
    if !git_available() {
        eprintln!("skipping git adapter tests: git not installed");
        return;
    }
    let repo = committed_repo();
    let git = GitCli::new();

    std::fs::write(repo.path().join("scratch.txt"), "notes\n").expect("write");
    assert!(!git.has_tracked_changes(repo.path()).await.expect("status"));
    assert!(!git
        .tracked_files(repo.path())
        .await
        .expect("ls-files")
        .contains("scratch.txt"));
}

#[tokio::test]
async fn plain_directory_is_not_a_repository() {
    let temp = TempDir::new().expect("tempdir");
    assert!(!GitCli::new().is_repository(temp.path()));
}

#[tokio::test]
async fn missing_git_binary_is_a_spawn_error() {
    let temp = TempDir::new().expect("tempdir");
    let git = GitCli::with_program("/nonexistent/git-binary");
    let err = git.diff(temp.path()).await.expect_err("spawn must fail");
    assert!(err.to_string().contains("failed to spawn git"), "{err}");
}
