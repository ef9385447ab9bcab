//! git-fleximod CLI entry point

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use fleximod::cli::commands::{checkout, status, test, update};
use fleximod::cli::{Output, SyncContext, SyncOptions};
use fleximod::core::manifest_paths::DEFAULT_MANIFEST_NAME;
use fleximod::git::probe::DEFAULT_SHORT_ID_LEN;
use fleximod::git::{find_git, GitProbe, ShellGit};
use fleximod::telemetry::{init_telemetry, TelemetryConfig};
use fleximod::util::RetryOptions;

#[derive(Parser)]
#[command(name = "git-fleximod")]
#[command(author, version, about = "Keep git submodules at the revisions .gitmodules pins them to", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Superproject root (default: nearest ancestor holding the manifest)
    #[arg(short = 'C', long, global = true, env = "FLEXIMOD_PATH")]
    path: Option<PathBuf>,

    /// Manifest file name
    #[arg(short = 'g', long, global = true, default_value = DEFAULT_MANIFEST_NAME, env = "FLEXIMOD_GITMODULES")]
    gitmodules: String,

    /// Submodules to leave alone
    #[arg(short = 'x', long, global = true, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Discard local modifications in submodules
    #[arg(short, long, global = true)]
    force: bool,

    /// Include optional submodules
    #[arg(short, long, global = true)]
    optional: bool,

    /// Submodules to process concurrently
    #[arg(short, long, global = true, default_value_t = 1, env = "FLEXIMOD_JOBS")]
    jobs: usize,

    /// Seconds before a clone, fetch or ls-remote is abandoned
    #[arg(long, global = true, default_value_t = 300, env = "FLEXIMOD_TIMEOUT")]
    timeout: u64,

    /// Retries for network operations that fail transiently
    #[arg(long, global = true, default_value_t = 2, env = "FLEXIMOD_RETRIES")]
    retries: u32,

    /// More output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Debug logging with source locations
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone required submodules that are missing
    Checkout {
        /// Submodules to act on (default: all)
        components: Vec<String>,
        /// Show the plan without changing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Report each submodule against its fxtag
    Status {
        /// Submodules to report on (default: all)
        components: Vec<String>,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Clone missing submodules and move existing ones to their fxtag
    Update {
        /// Submodules to act on (default: all)
        components: Vec<String>,
        /// Show the plan without changing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Status plus consistency checks; fails when anything is off
    Test {
        /// Submodules to check (default: all)
        components: Vec<String>,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let telemetry = TelemetryConfig::for_verbosity(cli.global.verbose, cli.global.debug);
    if let Err(e) = init_telemetry(&telemetry) {
        eprintln!("warning: logging disabled: {e}");
    }

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            Output::error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the command succeeded.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let global = cli.global;
    let (components, command) = match cli.command {
        Commands::Checkout {
            components,
            dry_run,
        } => (components, CommandKind::Checkout { dry_run }),
        Commands::Status { components, json } => (components, CommandKind::Status { json }),
        Commands::Update {
            components,
            dry_run,
        } => (components, CommandKind::Update { dry_run }),
        Commands::Test { components } => (components, CommandKind::Test),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "git-fleximod", &mut std::io::stdout());
            return Ok(true);
        }
    };

    find_git()?;

    let options = SyncOptions {
        components,
        exclude: global.exclude,
        force: global.force,
        optional: global.optional,
        jobs: global.jobs.max(1),
        retry: RetryOptions::with_retries(global.retries),
        ..SyncOptions::default()
    };

    let git = Arc::new(ShellGit::new(
        Duration::from_secs(global.timeout),
        options.retry.clone(),
    ));
    let probe = Arc::new(GitProbe::new(DEFAULT_SHORT_ID_LEN));

    let start = match global.path {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let ctx = SyncContext::open(&start, &global.gitmodules, options, git, probe).await?;

    match command {
        CommandKind::Checkout { dry_run } => {
            Ok(checkout::run_checkout(&ctx, dry_run).await?.is_success())
        }
        CommandKind::Update { dry_run } => Ok(update::run_update(&ctx, dry_run).await?.is_success()),
        CommandKind::Status { json } => {
            status::run_status(&ctx, json).await?;
            Ok(true)
        }
        CommandKind::Test => Ok(test::run_test(&ctx).await? == 0),
    }
}

/// A command with its component list split off
enum CommandKind {
    Checkout { dry_run: bool },
    Status { json: bool },
    Update { dry_run: bool },
    Test,
}
