//! Orgpulse CLI - commit activity for GitHub organizations.

mod commands;
mod config;
mod progress;
mod shutdown;

use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

use crate::commands::cache::CacheAction;
use crate::commands::sync::SyncArgs;

#[derive(Parser)]
#[command(name = "orgpulse")]
#[command(version)]
#[command(about = "Commit activity for GitHub organizations")]
#[command(
    long_about = "Orgpulse lists every repository of a GitHub organization, collects the \
commits on each branch, and reports per-author activity. Upstream listings are cached on \
disk and runs are incremental: each run only counts commits newer than the last one."
)]
#[command(after_long_help = r#"EXAMPLES
    Sync an organization (last 30 days on the first run):
        $ orgpulse sync rust-lang

    Limit the run to a few repositories and a date range:
        $ orgpulse sync acme --repo api --repo web --since 2024-01-01 --until 2024-02-01

    Only count organization members, as JSON:
        $ orgpulse sync acme --members-only --output json

    Inspect or clear the cache:
        $ orgpulse cache status
        $ orgpulse cache clear commits

CONFIGURATION
    Orgpulse reads configuration from:
      1. ~/.config/orgpulse/config.toml (or $XDG_CONFIG_HOME/orgpulse/config.toml)
      2. ./orgpulse.toml
      3. Environment variables (ORGPULSE_ prefix, e.g. ORGPULSE_GITHUB__TOKEN)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    ORGPULSE_GITHUB__TOKEN    GitHub personal access token (GITHUB_TOKEN also works)
    ORGPULSE_GITHUB__API_URL  API root for GitHub Enterprise
    ORGPULSE_CACHE__PATH      Cache snapshot (default: ~/.local/state/orgpulse/cache.json)
    RUST_LOG                  Log filter (default: info)
"#)]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize an organization and report contributor activity
    Sync(SyncArgs),
    /// Inspect and maintain the cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Progress bars own the terminal; logs only go out when stderr is not a TTY
    // or when RUST_LOG asks for them.
    let env_filter = EnvFilter::try_from_default_env().ok();
    if env_filter.is_some() || !Term::stderr().is_term() {
        tracing_subscriber::fmt()
            .with_env_filter(
                env_filter.unwrap_or_else(|| EnvFilter::new("orgpulse=info,orgpulse_cli=info")),
            )
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = config::Config::load();
    let cli = Cli::parse();

    match cli.command {
        Commands::Sync(args) => commands::sync::handle_sync(args, &config).await?,
        Commands::Cache { action } => commands::cache::handle_cache(action, &config).await?,
        Commands::Completions { shell } => commands::meta::handle_completions(shell)?,
    }

    Ok(())
}
