//! Configuration loading and management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub wall: WallConfig,

    /// Account name -> environment variable holding its access token
    #[serde(default)]
    pub accounts: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_tenants_dir")]
    pub tenants_dir: PathBuf,

    #[serde(default)]
    pub state_backend: StateBackend,

    #[serde(default = "default_state_db_path")]
    pub state_db_path: PathBuf,

    /// Root of the JSON-file store
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_true")]
    pub dry_run: bool,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Terms rejected for every tenant
    #[serde(default)]
    pub global_blacklist: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    #[default]
    Sqlite,
    Json,
    Memory,
}

impl StateBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateBackend::Sqlite => "sqlite",
            StateBackend::Json => "json",
            StateBackend::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallConfig {
    #[serde(default = "default_wall_base_url")]
    pub base_url: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Hard limit of the platform, applied on top of per-theme limits
    #[serde(default = "default_wall_max_chars")]
    pub max_chars: usize,
}

// Default value functions
fn default_tenants_dir() -> PathBuf {
    PathBuf::from("./tenants")
}

fn default_state_db_path() -> PathBuf {
    PathBuf::from("./state.sqlite")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./state")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent() -> usize {
    4
}

fn default_wall_base_url() -> String {
    "https://api.vk.com".to_string()
}

fn default_api_version() -> String {
    reposter_adapters::wall::DEFAULT_API_VERSION.to_string()
}

fn default_wall_max_chars() -> usize {
    4096
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            tenants_dir: default_tenants_dir(),
            state_backend: StateBackend::default(),
            state_db_path: default_state_db_path(),
            state_dir: default_state_dir(),
            log_level: default_log_level(),
            dry_run: default_true(),
            max_concurrent: default_max_concurrent(),
            global_blacklist: vec![],
        }
    }
}

impl Default for WallConfig {
    fn default() -> Self {
        Self {
            base_url: default_wall_base_url(),
            api_version: default_api_version(),
            max_chars: default_wall_max_chars(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Try default config path if none specified
        let default_path = PathBuf::from("./config.toml");
        let path = config_path.unwrap_or(&default_path);

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else if config_path.is_some() {
            // User specified a path that doesn't exist
            anyhow::bail!("Config file not found: {}", path.display());
        }

        // Add environment variable overrides
        builder = builder.add_source(
            config::Environment::with_prefix("REPOSTER")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("general.global_blacklist")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Generate example configuration as TOML string
    pub fn example_toml() -> String {
        r#"# reposter configuration

[general]
tenants_dir = "./tenants"
state_backend = "sqlite"  # sqlite, json, memory
state_db_path = "./state.sqlite"
state_dir = "./state"
log_level = "info"
dry_run = true
max_concurrent = 4
global_blacklist = []

[wall]
base_url = "https://api.vk.com"
api_version = "5.131"
max_chars = 4096

# Account name -> environment variable holding its access token.
# Tenants refer to accounts by name in read_accounts / write_account.
[accounts]
reader = "REPOSTER_READER_TOKEN"
writer = "REPOSTER_WRITER_TOKEN"
"#
        .to_string()
    }
}
