//! `orgpulse cache` - inspect and maintain the on-disk cache.

use clap::{Subcommand, ValueEnum};
use console::style;
use orgpulse::cache::{CacheCategory, CacheStore, CacheStoreStatus};

use crate::commands::OutputFormat;
use crate::config::Config;

/// Cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Show entry counts and sizes per category
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Drop expired entries
    Evict,
    /// Remove cached entries
    Clear {
        /// Only clear this category
        category: Option<CategoryArg>,
    },
}

/// Cache category as accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum CategoryArg {
    Repositories,
    Branches,
    Commits,
    Employees,
}

impl From<CategoryArg> for CacheCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Repositories => CacheCategory::Repositories,
            CategoryArg::Branches => CacheCategory::Branches,
            CategoryArg::Commits => CacheCategory::Commits,
            CategoryArg::Employees => CacheCategory::Employees,
        }
    }
}

pub(crate) async fn handle_cache(
    action: CacheAction,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let cache_config = config.cache_config();
    if cache_config.path.is_none() {
        return Err("Could not determine the cache location; set cache.path in the config".into());
    }
    let cache = CacheStore::open(cache_config).await;

    match action {
        CacheAction::Status { output } => print_status(&cache.status(), output)?,
        CacheAction::Evict => {
            let evicted = cache.evict_expired();
            cache.flush().await?;
            println!(
                "{} Evicted {} expired entries",
                style("✓").green().bold(),
                evicted
            );
        }
        CacheAction::Clear { category } => {
            let (removed, what) = match category {
                Some(category) => {
                    let category = CacheCategory::from(category);
                    (cache.clear_category(category), category.to_string())
                }
                None => (cache.clear(), "all categories".to_string()),
            };
            cache.flush().await?;
            println!(
                "{} Removed {} entries ({})",
                style("✓").green().bold(),
                removed,
                style(what).cyan()
            );
        }
    }
    Ok(())
}

/// Cache status row for display.
#[derive(Debug, Clone, tabled::Tabled)]
struct CategoryRow {
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Entries")]
    items: usize,
    #[tabled(rename = "Size")]
    size: String,
}

fn print_status(
    status: &CacheStoreStatus,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        OutputFormat::Table => {
            let rows: Vec<CategoryRow> = status
                .categories
                .iter()
                .map(|c| CategoryRow {
                    category: c.category.to_string(),
                    items: c.items,
                    size: format_bytes(c.bytes),
                })
                .collect();
            let mut table = tabled::Table::new(rows);
            table.with(tabled::settings::Style::rounded());
            println!("{}", table);

            let location = status
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "memory".to_string());
            println!(
                "{} of {} used, stored at {}",
                format_bytes(status.total_bytes),
                format_bytes(status.max_bytes),
                location
            );
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(status)?),
    }
    Ok(())
}

/// Format a byte count with a binary unit.
fn format_bytes(bytes: usize) -> String {
    const KIB: usize = 1024;
    const MIB: usize = KIB * 1024;
    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}
