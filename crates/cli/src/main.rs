//! ruleidguard command-line tool.
//!
//! Compares the rule files changed on the current branch with the target
//! branch and exits non-zero when a rule identifier is duplicated within a
//! file or already owned by a different file in the target branch.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use ruleidguard_core::config::{EnvVars, GuardConfig, GuardOptions, Settings};
use ruleidguard_core::git::GitCli;
use ruleidguard_core::guard::{Guard, RunOutcome};
use ruleidguard_core::report::Reporter;

/// Exit status for a duplicate, a conflict, or a fatal error.
const EXIT_FAILED: u8 = 1;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Check changed XML rule files for rule ID conflicts with the target branch.
#[derive(Parser, Debug)]
#[command(name = "ruleidguard", version, about)]
struct Cli {
    /// Check every rule file when git reports no changed rule files
    /// (same as setting FORCE_CHECK_ALL_RULES).
    #[arg(long)]
    force: bool,

    /// Repository root.
    #[arg(short = 'C', long, default_value = ".")]
    repo: PathBuf,

    /// Settings file (default: ruleidguard.toml in the repository root, if present).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Compare against this ref instead of the one derived from CI variables.
    #[arg(long)]
    target: Option<String>,

    /// Print environment and git debug information, and debug logs.
    #[arg(short, long)]
    verbose: bool,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match run(cli) {
        Ok(outcome) => ExitCode::from(exit_status(&outcome)),
        Err(e) => {
            Reporter::stdout().error(&format!("{e:#}"));
            ExitCode::from(EXIT_FAILED)
        }
    }
}

fn run(cli: Cli) -> Result<RunOutcome> {
    if !cli.repo.is_dir() {
        bail!("repository root {} is not a directory", cli.repo.display());
    }

    let settings = Settings::discover(&cli.repo, cli.config.as_deref())
        .context("failed to load settings")?;
    let config = GuardConfig::resolve(&settings, EnvVars::from_process(), options_from(cli));
    debug!(?config, "resolved configuration");

    let git = GitCli::new(&config.repo_root);
    git.ensure_available()
        .context("no usable git backend")?;

    let mut reporter = Reporter::stdout();
    Ok(Guard::new(&git, &config).run(&mut reporter))
}

fn options_from(cli: Cli) -> GuardOptions {
    GuardOptions {
        repo_root: cli.repo,
        force: cli.force,
        target: cli.target,
        verbose: cli.verbose,
    }
}

fn exit_status(outcome: &RunOutcome) -> u8 {
    if outcome.is_success() {
        0
    } else {
        EXIT_FAILED
    }
}
