pub(crate) mod cache;
pub(crate) mod meta;
pub(crate) mod sync;

use clap::ValueEnum;

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}
