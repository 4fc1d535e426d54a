use crate::types::LogLevel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reportkit")]
#[command(about = "Render declarative tabular reports over a SQLite workspace", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Workspace directory holding reportkit.toml and the database
    /// (defaults to $REPORTKIT_PATH, then the XDG data dir)
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    #[arg(long, default_value = "warn", global = true)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List configured reports
    List,

    /// Render a report
    Render {
        /// Report name, as listed by `reportkit list`
        report: String,

        #[arg(long, default_value = "html")]
        format: String,

        /// Filter as key=value; repeatable. Keys come from the report's
        /// list_filter, plus `_extras_<name>` passthrough values
        #[arg(long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,

        /// Comma-separated ordering, e.g. `-integer1,char`
        #[arg(long)]
        order_by: Option<String>,

        /// `group,order`, e.g. `is_staff,username`
        #[arg(long)]
        group_by: Option<String>,

        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Manage cached report rows
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Subcommand)]
pub enum CacheCommand {
    /// Invalidate every cached result
    Flush,

    /// Restart the generation counter of one collection
    Reset {
        /// Collection id, e.g. `auth.User`
        collection: String,
    },
}
