use anyhow::Result;
use diffwatch_protocol::{ReviewResult, ReviewStatus};
use diffwatch_watcher::{AbortReason, CycleOutcome};
use serde::Serialize;
use std::path::PathBuf;

/// Output of `diffwatch status`.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub root: PathBuf,
    pub is_repository: bool,
    pub modified_files: Vec<String>,
    pub diff_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Serialize)]
struct AbortedLine {
    status: &'static str,
    reason: &'static str,
}

pub const fn abort_reason_str(reason: AbortReason) -> &'static str {
    match reason {
        AbortReason::NoRootConfigured => "no_root_configured",
        AbortReason::NoTrackedChanges => "no_tracked_changes",
        AbortReason::EmptyDiff => "empty_diff",
    }
}

pub fn print_json_line<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

pub fn print_result(result: &ReviewResult, json: bool) -> Result<()> {
    if json {
        return print_json_line(result);
    }
    println!("{}", render_result(result));
    Ok(())
}

pub fn print_outcome(outcome: &CycleOutcome, json: bool) -> Result<()> {
    match outcome {
        CycleOutcome::Emitted(result) => print_result(result, json),
        CycleOutcome::Aborted(reason) => {
            if json {
                print_json_line(&AbortedLine {
                    status: "aborted",
                    reason: abort_reason_str(*reason),
                })
            } else {
                println!("Nothing to review ({})", describe_abort(*reason));
                Ok(())
            }
        }
    }
}

pub fn print_status(report: &StatusReport, json: bool) -> Result<()> {
    if json {
        return print_json_line(report);
    }
    println!("Repository: {}", report.root.display());
    if !report.is_repository {
        println!("  not a git repository");
        return Ok(());
    }
    if report.modified_files.is_empty() {
        println!("  no tracked changes");
    } else {
        println!("  modified tracked files ({}):", report.modified_files.len());
        for file in &report.modified_files {
            println!("    {file}");
        }
    }
    println!("  diff size: {} bytes", report.diff_bytes);
    if let Some(fingerprint) = &report.fingerprint {
        println!("  fingerprint: {fingerprint}");
    }
    Ok(())
}

const fn describe_abort(reason: AbortReason) -> &'static str {
    match reason {
        AbortReason::NoRootConfigured => "no repository configured",
        AbortReason::NoTrackedChanges => "no tracked changes",
        AbortReason::EmptyDiff => "diff is empty",
    }
}

pub fn render_result(result: &ReviewResult) -> String {
    let mut out = String::new();
    let status = match result.status {
        ReviewStatus::Completed => "review completed",
        ReviewStatus::Failed => "review failed",
        ReviewStatus::Duplicate => "duplicate diff",
    };
    out.push_str(&format!("=== {status} in {} ms", result.duration_ms));
    if let Some(provider) = result.provider {
        out.push_str(&format!(" ({provider})"));
    }
    out.push_str(" ===\n");

    if !result.modified_files.is_empty() {
        out.push_str(&format!("files: {}\n", result.modified_files.join(", ")));
    }
    if let Some(metrics) = &result.metrics {
        out.push_str(&format!(
            "tokens: {} in / {} out, {:.1} tok/s, total {:.2}s\n",
            metrics.prompt_eval_count,
            metrics.eval_count,
            metrics.output_tokens_per_sec(),
            metrics.total_duration_secs()
        ));
    }
    match result.status {
        ReviewStatus::Completed => out.push_str(result.review.trim_end()),
        ReviewStatus::Failed | ReviewStatus::Duplicate => {
            out.push_str(result.error_message.as_deref().unwrap_or("unknown error"));
        }
    }
    out
}
