//! `diffwatch` command-line front end.

mod config;
mod render;

pub use config::{
    apply_env_overrides, apply_setting, migrate_legacy, ConfigStore, API_KEY_ENV, CONFIG_ENV,
    SETTABLE_KEYS,
};
pub use render::{render_result, StatusReport};

use anyhow::{bail, Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use diffwatch_backend::build_backend;
use diffwatch_protocol::{AppConfig, ReviewStatus};
use diffwatch_vcs::{GitCli, VcsAdapter};
use diffwatch_watcher::{
    fingerprint, CycleOutcome, ReviewCache, ReviewOrchestrator, ReviewWatcher, WatchConfig,
};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "diffwatch")]
#[command(about = "Watch a git working tree and review every new diff with an LLM", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file (overrides DIFFWATCH_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a repository and print a review after each burst of edits
    Watch(RepoArgs),

    /// Review the current diff once, right now
    Review(RepoArgs),

    /// Show tracked changes, diff size and fingerprint
    Status(RepoArgs),

    /// Inspect or edit the settings file
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Args)]
struct RepoArgs {
    /// Repository root (defaults to the configured repository_path)
    path: Option<PathBuf>,

    /// Print JSON lines instead of text (implies --quiet)
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective settings as JSON
    Show,
    /// Print the settings file location
    Path,
    /// Change one setting
    Set { key: String, value: String },
    /// Restore defaults
    Reset,
    /// Print the JSON schema of the settings file
    Schema,
}

pub async fn main_entry() -> Result<()> {
    let mut cli = Cli::parse();

    let json_output = match &cli.command {
        Commands::Watch(args) | Commands::Review(args) | Commands::Status(args) => args.json,
        Commands::Config { .. } => false,
    };
    if json_output {
        cli.quiet = true;
    }
    init_logging(cli.verbose, cli.quiet);

    let store = ConfigStore::resolve(cli.config.as_deref())?;
    match cli.command {
        Commands::Watch(args) => run_watch(&store, args).await,
        Commands::Review(args) => run_review(&store, args).await,
        Commands::Status(args) => run_status(&store, args).await,
        Commands::Config { action } => run_config(&store, action),
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // reqwest/hyper are chatty at debug.
    builder.filter_module("hyper", log::LevelFilter::Warn);
    builder.filter_module("reqwest", log::LevelFilter::Warn);
    builder.target(env_logger::Target::Stderr).init();
}

fn load_config(store: &ConfigStore) -> Result<AppConfig> {
    let mut config = store
        .load()
        .with_context(|| format!("Failed to load config {}", store.path().display()))?;
    apply_env_overrides(&mut config);
    Ok(config)
}

fn resolve_root(arg: Option<PathBuf>, config: &AppConfig) -> Result<PathBuf> {
    match arg.or_else(|| config.repository_root().map(Path::to_path_buf)) {
        Some(root) => Ok(root),
        None => bail!(
            "No repository configured; pass PATH or run `diffwatch config set repository_path <dir>`"
        ),
    }
}

async fn run_watch(store: &ConfigStore, args: RepoArgs) -> Result<()> {
    let config = load_config(store)?;
    let root = resolve_root(args.path, &config)?;
    let backend = build_backend(&config).context("Invalid backend configuration")?;

    let service = ReviewWatcher::new(
        Arc::new(GitCli::new()),
        backend,
        WatchConfig::from_app_config(&config),
    );
    let mut reviews = service.subscribe();
    service
        .start_watching(&root)
        .with_context(|| format!("Cannot watch {}", root.display()))?;
    info!(
        "Using {} model {} at {}; press Ctrl-C to stop",
        config.provider,
        config.model(),
        config.endpoint()
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(err) = res {
                    warn!("Cannot listen for Ctrl-C: {err}");
                }
                break;
            }
            msg = reviews.recv() => match msg {
                Ok(result) => render::print_result(&result, args.json)?,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Output fell behind; {skipped} review(s) not shown");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    service.stop_watching();
    Ok(())
}

async fn run_review(store: &ConfigStore, args: RepoArgs) -> Result<()> {
    let config = load_config(store)?;
    let root = resolve_root(args.path, &config)?;
    let adapter = Arc::new(GitCli::new());
    if !adapter.is_repository(&root) {
        bail!("Not a git repository: {}", root.display());
    }
    let backend = build_backend(&config).context("Invalid backend configuration")?;

    let orchestrator = ReviewOrchestrator::new(
        Some(root),
        adapter,
        backend,
        ReviewCache::new(
            Duration::from_secs(config.cache_ttl_secs),
            config.cache_capacity,
        ),
    )
    .with_prompt(config.effective_prompt());

    let outcome = orchestrator.run_cycle().await;
    render::print_outcome(&outcome, args.json)?;
    if let CycleOutcome::Emitted(result) = &outcome {
        if result.status == ReviewStatus::Failed {
            bail!(
                "Review failed: {}",
                result.error_message.as_deref().unwrap_or("unknown error")
            );
        }
    }
    Ok(())
}

async fn run_status(store: &ConfigStore, args: RepoArgs) -> Result<()> {
    let config = load_config(store)?;
    let root = resolve_root(args.path, &config)?;
    let adapter = GitCli::new();

    let mut report = StatusReport {
        is_repository: adapter.is_repository(&root),
        root,
        modified_files: Vec::new(),
        diff_bytes: 0,
        fingerprint: None,
    };
    if report.is_repository {
        report.modified_files = adapter
            .modified_tracked_files(&report.root)
            .await
            .context("Failed to list modified files")?
            .into_iter()
            .collect();
        let diff = adapter
            .diff(&report.root)
            .await
            .context("Failed to get git diff")?;
        report.diff_bytes = diff.len();
        if !diff.trim().is_empty() {
            report.fingerprint = Some(fingerprint(&diff));
        }
    }
    render::print_status(&report, args.json)
}

fn run_config(store: &ConfigStore, action: ConfigCommand) -> Result<()> {
    match action {
        ConfigCommand::Show => {
            let mut config = store.load()?;
            if !config.openai_api_key.is_empty() {
                config.openai_api_key = "********".to_string();
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommand::Path => println!("{}", store.path().display()),
        ConfigCommand::Set { key, value } => {
            store.set(&key, &value)?;
            info!("Updated {key} in {}", store.path().display());
        }
        ConfigCommand::Reset => {
            store.reset()?;
            info!("Restored defaults in {}", store.path().display());
        }
        ConfigCommand::Schema => {
            let schema = schemars::schema_for!(AppConfig);
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }
    Ok(())
}
