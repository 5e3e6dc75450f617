//! `orgpulse sync` - synchronize one organization and print contributor stats.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use console::style;
use orgpulse::cache::{CacheConfig, CacheStore};
use orgpulse::github::GitHubClient;
use orgpulse::platform::{DateWindow, RateLimitRegistry};
use orgpulse::stats::AuthorStats;
use orgpulse::sync::{SyncOrchestrator, SyncOutcome, SyncRequest, WatermarkStore};
use orgpulse::AuthorIdentity;

use crate::commands::OutputFormat;
use crate::config::Config;
use crate::progress::ProgressReporter;
use crate::shutdown::{flush_all, setup_shutdown_handler};

/// Arguments for `orgpulse sync`.
#[derive(Debug, clap::Args)]
pub(crate) struct SyncArgs {
    /// Organization login
    pub org: String,

    /// Only count commits after this date (YYYY-MM-DD or RFC 3339)
    #[arg(short, long, value_parser = parse_date)]
    pub since: Option<DateTime<Utc>>,

    /// Only count commits before this date (YYYY-MM-DD or RFC 3339)
    #[arg(short, long, value_parser = parse_date)]
    pub until: Option<DateTime<Utc>>,

    /// Restrict the run to these repositories (name or org/name); repeatable
    #[arg(short, long = "repo")]
    pub repos: Vec<String>,

    /// Only report organization members
    #[arg(short, long)]
    pub members_only: bool,

    /// Repositories per batch (default from config or 5)
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// GitHub token (overrides config and environment)
    #[arg(short, long)]
    pub token: Option<String>,

    /// Keep the cache in memory for this run only
    #[arg(long)]
    pub no_cache: bool,

    /// Number of authors to show in the table
    #[arg(long, default_value_t = 20)]
    pub top: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

/// Parse `YYYY-MM-DD` (midnight UTC) or an RFC 3339 timestamp.
pub(crate) fn parse_date(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| format!("invalid date '{value}'"));
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| format!("invalid date '{value}', expected YYYY-MM-DD or RFC 3339"))
}

pub(crate) async fn handle_sync(
    args: SyncArgs,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    if let (Some(since), Some(until)) = (args.since, args.until)
        && since > until
    {
        return Err("--since must not be after --until".into());
    }

    let cache_config = if args.no_cache {
        CacheConfig {
            path: None,
            ..config.cache_config()
        }
    } else {
        config.cache_config()
    };
    let cache = CacheStore::open(cache_config).await;
    let watermarks = match config.watermark_path() {
        Some(path) if !args.no_cache => WatermarkStore::open(path).await,
        _ => WatermarkStore::in_memory(),
    };
    setup_shutdown_handler(cache.clone(), watermarks.clone());
    let flush_task = cache.spawn_flush_task();

    let client = GitHubClient::new(
        &config.github.api_url,
        RateLimitRegistry::new(config.github.requests_per_second),
    )?;

    let mut options = config.sync_options();
    if let Some(batch_size) = args.batch_size {
        options.batch_size = batch_size.max(1);
    }
    options.members_only |= args.members_only;

    let token = args.token.or_else(|| config.github_token());
    if token.is_none() {
        tracing::warn!("No GitHub token configured; unauthenticated requests are limited to 60 per hour");
    }

    let request = SyncRequest::new(&args.org)
        .with_credential(token)
        .with_window(DateWindow::new(args.since, args.until))
        .with_repo_filter(args.repos);

    let orchestrator = SyncOrchestrator::new(client, cache.clone(), watermarks.clone(), options);
    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();

    let result = orchestrator.synchronize(request, Some(&callback)).await;
    reporter.finish();

    flush_task.abort();
    flush_all(&cache, &watermarks).await;

    let outcome = result.map_err(|e| e.user_message())?;
    match args.output {
        OutputFormat::Table => print_summary(&outcome, args.top),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
    }
    Ok(())
}

/// One row of the contributor table.
#[derive(Debug, Clone, tabled::Tabled)]
pub(crate) struct AuthorRow {
    #[tabled(rename = "Author")]
    pub author: String,
    #[tabled(rename = "Commits")]
    pub commits: usize,
    #[tabled(rename = "Repositories")]
    pub repositories: usize,
    #[tabled(rename = "Branches")]
    pub branches: usize,
    #[tabled(rename = "Active Days")]
    pub active_days: usize,
}

impl AuthorRow {
    pub(crate) fn new(author: &AuthorIdentity, stats: &AuthorStats) -> Self {
        let mut days = std::collections::BTreeSet::new();
        let mut branches = 0;
        for repo_stats in stats.repositories.values() {
            days.extend(repo_stats.by_date.keys());
            branches += repo_stats.branches.len();
        }
        Self {
            author: author.to_string(),
            commits: stats.total_commits,
            repositories: stats.repositories.len(),
            branches,
            active_days: days.len(),
        }
    }
}

fn print_summary(outcome: &SyncOutcome, top: usize) {
    const SHORT: &str = "%Y-%m-%d %H:%M";
    let window = match (outcome.since, outcome.until) {
        (Some(since), Some(until)) => {
            format!("{} to {}", since.format(SHORT), until.format(SHORT))
        }
        (Some(since), None) => format!("since {}", since.format(SHORT)),
        (None, Some(until)) => format!("until {}", until.format(SHORT)),
        (None, None) => "all time".to_string(),
    };

    println!(
        "{} {}: {} new commits across {} repositories ({})",
        style("✓").green().bold(),
        style(&outcome.org).cyan(),
        outcome.commits.len(),
        outcome.repositories_synced,
        window,
    );

    for failure in &outcome.failed_repositories {
        println!(
            "{} {}: {}",
            style("⚠").yellow(),
            failure.repository,
            failure.error
        );
    }

    if outcome.user_stats.is_empty() {
        println!("No new commits.");
        return;
    }

    let rows: Vec<AuthorRow> = outcome
        .user_stats
        .ranked()
        .into_iter()
        .take(top)
        .map(|(author, stats)| AuthorRow::new(author, stats))
        .collect();
    let mut table = tabled::Table::new(rows);
    table.with(tabled::settings::Style::rounded());
    println!("{}", table);

    let hidden = outcome.user_stats.authors.len().saturating_sub(top);
    if hidden > 0 {
        println!("... and {} more authors (use --top or --output json)", hidden);
    }
    if let Some(watermark) = outcome.watermark {
        println!(
            "Next run continues after {}",
            watermark.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::TimeZone;
    use orgpulse::stats::RepoStats;

    use super::*;

    #[test]
    fn parse_date_accepts_plain_dates() {
        assert_eq!(
            parse_date("2024-03-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn parse_date_accepts_rfc3339_with_offset() {
        assert_eq!(
            parse_date("2024-03-01T12:00:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn parse_date_rejects_garbage() {
        assert!(parse_date("yesterday").is_err());
        assert!(parse_date("2024-13-01").is_err());
    }

    #[test]
    fn author_row_counts_days_across_repositories() {
        let repo = |date: &str, branches: &[&str]| RepoStats {
            commits: 1,
            branches: branches.iter().map(|b| b.to_string()).collect::<BTreeSet<_>>(),
            by_date: BTreeMap::from([(date.to_string(), 1)]),
        };
        let stats = AuthorStats {
            total_commits: 3,
            repositories: BTreeMap::from([
                ("acme/api".to_string(), repo("2024-03-01", &["main", "dev"])),
                ("acme/web".to_string(), repo("2024-03-01", &["main"])),
            ]),
        };

        let row = AuthorRow::new(
            &AuthorIdentity::Known {
                login: "ada".to_string(),
            },
            &stats,
        );
        assert_eq!(row.author, "ada");
        assert_eq!(row.commits, 3);
        assert_eq!(row.repositories, 2);
        assert_eq!(row.branches, 3);
        assert_eq!(row.active_days, 1);
    }
}
