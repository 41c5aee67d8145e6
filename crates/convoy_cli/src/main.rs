//! Convoy CLI - command-line interface for the bulk migration engine.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "convoy")]
#[command(version)]
#[command(about = "Bulk repository migration between hosting providers")]
#[command(
    long_about = "Convoy migrates many source-control repositories from one hosting \
provider to another in concurrency-bounded batches, driving each repository \
through a clone/push/verify pipeline and reporting live per-repository and \
aggregate progress. Individual failures never abort the rest of the batch."
)]
#[command(after_long_help = r#"EXAMPLES
    Migrate every repository in a manifest:
        $ convoy run migrations.txt

    Overwrite targets that already exist:
        $ convoy run migrations.txt --force

    Inspect the batch plan without transferring anything:
        $ convoy plan migrations.txt

    Emit the terminal snapshot as JSON (for archival):
        $ convoy run migrations.txt --json > result.json

    Generate shell completions:
        $ convoy completions bash > ~/.local/share/bash-completion/completions/convoy

MANIFEST FORMAT
    One migration per line: source remote, then target remote, separated by
    whitespace or `->`. Blank lines and lines starting with # are skipped.

        https://old.example.com/org/app.git -> https://new.example.com/org/app.git
        git@old.example.com:org/lib.git     git@new.example.com:org/lib.git

CONFIGURATION
    Convoy reads configuration from:
      1. ~/.config/convoy/config.toml (or $XDG_CONFIG_HOME/convoy/config.toml)
      2. ./convoy.toml
      3. Environment variables (CONVOY_* prefix, `__` between section and key)

ENVIRONMENT VARIABLES
    CONVOY_MIGRATE__BATCH_SIZE              Repositories per batch (default 10)
    CONVOY_MIGRATE__MAX_CONCURRENT_BATCHES  Concurrent batches (default 5)
    CONVOY_MIGRATE__PER_BATCH_CONCURRENCY   Concurrent repos per batch (default 4)
    CONVOY_MIGRATE__RETRIES                 Transient retries per operation (default 3)
    CONVOY_MIGRATE__TIMEOUT_SECS            Per-operation timeout (default 300)
    CONVOY_MIGRATE__WORK_ROOT               Workspace root (default: system temp)
    CONVOY_GIT__BINARY                      git binary to shell out to
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a bulk migration from a manifest
    Run {
        /// Manifest file listing `source target` pairs
        manifest: PathBuf,
        #[command(flatten)]
        args: RunArgs,
    },
    /// Print the batch plan for a manifest without transferring anything
    Plan {
        /// Manifest file listing `source target` pairs
        manifest: PathBuf,
        /// Repositories per batch (default from config or 10)
        #[arg(short, long)]
        batch_size: Option<usize>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

/// Options for the `run` command.
#[derive(Debug, Clone, clap::Args)]
pub(crate) struct RunArgs {
    /// Repositories per batch (default from config or 10)
    #[arg(short, long)]
    pub(crate) batch_size: Option<usize>,

    /// Maximum batches running concurrently (default from config or 5)
    #[arg(long)]
    pub(crate) max_concurrent_batches: Option<usize>,

    /// Maximum repositories migrating concurrently within one batch
    /// (default from config or 4)
    #[arg(long)]
    pub(crate) per_batch_concurrency: Option<usize>,

    /// Transient retries per transfer operation (default from config or 3)
    #[arg(long)]
    pub(crate) retries: Option<usize>,

    /// Per-operation timeout in seconds (default from config or 300)
    #[arg(long)]
    pub(crate) timeout_secs: Option<u64>,

    /// Force-overwrite refs on targets that already exist
    #[arg(short, long)]
    pub(crate) force: bool,

    /// Print the terminal snapshot as JSON instead of a summary table
    #[arg(long)]
    pub(crate) json: bool,

    /// Root directory for migration workspaces
    #[arg(long)]
    pub(crate) work_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::from(2);
        }
    };

    let result = match cli.command {
        Commands::Run { manifest, args } => commands::run::handle_run(&manifest, args, config).await,
        Commands::Plan {
            manifest,
            batch_size,
        } => commands::plan::handle_plan(&manifest, batch_size, &config),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "convoy", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}
