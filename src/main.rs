use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use git_backup::config::DEFAULT_CONFIG_FILE;
use git_backup::{Config, GitClient, SyncEngine, SyncOptions};

/// Exit status when the configuration defines no job
const EXIT_NO_SOURCES: u8 = 111;
/// Exit status when repositories failed under `--fail-at-end`
const EXIT_SYNC_FAILED: u8 = 100;
/// Exit status for unreadable or invalid configuration
const EXIT_CONFIG: u8 = 1;

#[derive(Parser)]
#[command(name = "git-backup")]
#[command(about = "Back up every GitHub and GitLab repository you can access")]
#[command(version)]
struct Cli {
    /// Configuration file [default: git-backup.yml, then the XDG config location]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root directory of the backup
    #[arg(short, long, default_value = "backup")]
    backup_path: String,

    /// Keep going after a repository fails and report the failure at the end
    #[arg(long)]
    fail_at_end: bool,

    /// Create fresh clones as bare repositories
    #[arg(long)]
    bare_clone: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    info!("Starting git-backup v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let sources = match config.sources() {
        Ok(sources) => sources,
        Err(e) => {
            error!("{}", e);
            return exit_code(e.exit_code());
        }
    };

    if sources.is_empty() {
        error!("No sources configured");
        return ExitCode::from(EXIT_NO_SOURCES);
    }

    let backup_root = match expand_backup_path(&cli.backup_path) {
        Ok(path) => path,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    info!("Backing up into {}", backup_root.display());

    let engine = SyncEngine::new(
        GitClient::new(),
        SyncOptions {
            backup_root,
            bare: cli.bare_clone,
            fail_at_end: cli.fail_at_end,
        },
    );

    match engine.run(&sources).await {
        Ok(summary) if summary.is_success() => ExitCode::SUCCESS,
        Ok(summary) => {
            error!("{} repositories failed to sync", summary.failed);
            ExitCode::from(EXIT_SYNC_FAILED)
        }
        Err(e) => {
            error!("{}", e);
            exit_code(e.exit_code())
        }
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Load configuration from the given path, the working directory or the XDG location
fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return Config::load(path);
    }

    let local = Path::new(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return Config::load(local);
    }

    let fallback = Config::default_config_path()?;
    if fallback.exists() {
        return Config::load(&fallback);
    }

    // Report the primary location in the error.
    Config::load(local)
}

fn expand_backup_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw)?;
    Ok(path_clean::clean(&*expanded))
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(EXIT_CONFIG))
}
