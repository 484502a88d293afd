//! Subcommand implementations and the wiring they share

pub mod config;
pub mod doctor;
pub mod history;
pub mod run;
pub mod tenants;

use anyhow::{Context, Result};
use reposter_adapters::{
    state::{InMemoryWorkingSetStore, JsonWorkingSetStore, SqliteWorkingSetStore},
    tenants::FsTenantRepo,
    wall::AccountTokens,
};
use reposter_domain::WorkingSetStore;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{AppConfig, StateBackend};

/// Open the configured working set store
pub(crate) async fn open_store(config: &AppConfig) -> Result<Arc<dyn WorkingSetStore>> {
    let store: Arc<dyn WorkingSetStore> = match config.general.state_backend {
        StateBackend::Sqlite => Arc::new(
            SqliteWorkingSetStore::new(&config.general.state_db_path)
                .await
                .context("Failed to initialize SQLite working set store")?,
        ),
        StateBackend::Json => Arc::new(JsonWorkingSetStore::new(&config.general.state_dir)),
        StateBackend::Memory => Arc::new(InMemoryWorkingSetStore::new()),
    };
    Ok(store)
}

/// Open the tenants directory, honouring a command-line override
pub(crate) fn open_tenants(config: &AppConfig, dir: Option<&Path>) -> Result<FsTenantRepo> {
    let dir: PathBuf = dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.general.tenants_dir.clone());
    FsTenantRepo::new(&dir, config.general.global_blacklist.clone())
        .with_context(|| format!("Failed to open tenants directory: {}", dir.display()))
}

/// Read every configured account token from its environment variable.
///
/// Accounts whose variable is unset are skipped; cycles using them fail
/// with a credential error.
pub(crate) fn load_account_tokens(config: &AppConfig) -> AccountTokens {
    let mut tokens = AccountTokens::new();
    for (account, env_var) in &config.accounts {
        match load_token(env_var) {
            Some(token) => tokens.insert(account.clone(), token),
            None => {
                tracing::warn!(account = %account, env_var = %env_var, "Account token not set");
            }
        }
    }
    tokens
}

pub(crate) fn load_token(env_var: &str) -> Option<SecretString> {
    if env_var.trim().is_empty() {
        return None;
    }
    match std::env::var(env_var) {
        Ok(value) if !value.trim().is_empty() => Some(SecretString::new(value.into())),
        _ => None,
    }
}
