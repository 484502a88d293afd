//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// reposter: multi-tenant community wall curation and reposting
#[derive(Parser, Debug)]
#[command(name = "reposter")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one publish cycle per selected (tenant, theme)
    Run(RunArgs),

    /// Inspect tenant configuration
    Tenants(TenantsArgs),

    /// Inspect stored dedup history
    History(HistoryArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Validate configuration and show status
    Doctor(DoctorArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Tenant to run; without --theme every theme of the tenant runs
    #[arg(long, conflicts_with = "all")]
    pub tenant: Option<String>,

    /// Theme to run (requires --tenant)
    #[arg(long, requires = "tenant")]
    pub theme: Option<String>,

    /// Run every configured (tenant, theme) pair
    #[arg(long)]
    pub all: bool,

    /// Run in dry-run mode (no actual publishing)
    #[arg(long)]
    pub dry_run: bool,

    /// Write rendered posts to outbox file for review instead of publishing
    #[arg(long)]
    pub require_approval: bool,

    /// Path to outbox file (used with --require-approval)
    #[arg(long)]
    pub outbox: Option<PathBuf>,

    /// Override tenants directory
    #[arg(long)]
    pub tenants_dir: Option<PathBuf>,

    /// Output outcomes as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct TenantsArgs {
    #[command(subcommand)]
    pub command: TenantsCommands,
}

#[derive(Subcommand, Debug)]
pub enum TenantsCommands {
    /// List configured (tenant, theme) pairs
    List {
        /// Override tenants directory
        #[arg(long)]
        tenants_dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate every tenant file
    Validate {
        /// Override tenants directory
        #[arg(long)]
        tenants_dir: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    #[command(subcommand)]
    pub command: HistoryCommands,
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommands {
    /// Print the stored working set of a (tenant, theme)
    Show {
        #[arg(long)]
        tenant: String,

        #[arg(long)]
        theme: String,

        /// History limit applied on load (defaults to the theme's configured limit)
        #[arg(long)]
        limit: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Init {
        /// Path to write config file
        #[arg(long, default_value = "./config.toml")]
        path: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
