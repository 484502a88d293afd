//! Tenants command - list and validate tenant configuration

use anyhow::{Context, Result};
use reposter_domain::TenantConfigSource;
use std::path::PathBuf;

use crate::args::{TenantsArgs, TenantsCommands};
use crate::commands::open_tenants;
use crate::config::AppConfig;

pub async fn execute(args: TenantsArgs, config_path: Option<PathBuf>) -> Result<()> {
    match args.command {
        TenantsCommands::List { tenants_dir, json } => {
            list_tenants(tenants_dir, json, config_path).await
        }
        TenantsCommands::Validate { tenants_dir } => {
            validate_tenants(tenants_dir, config_path).await
        }
    }
}

async fn list_tenants(
    tenants_dir: Option<PathBuf>,
    json: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref()).unwrap_or_default();
    let repo = open_tenants(&config, tenants_dir.as_deref())?;

    let keys = repo.list().await.context("Failed to list tenants")?;

    if json {
        let mut entries = Vec::new();
        for key in &keys {
            let theme = repo
                .load(&key.tenant, &key.theme)
                .await
                .with_context(|| format!("Failed to load {}", key))?;
            entries.push(serde_json::json!({
                "tenant": theme.tenant,
                "theme": theme.theme,
                "destination": theme.destination,
                "sources": theme.sources.iter().map(|g| g.id).collect::<Vec<_>>(),
                "sampling": theme.sampling,
                "age_class": theme.age_class,
                "history_limit": theme.history_limit,
            }));
        }
        let output = serde_json::json!({
            "count": keys.len(),
            "themes": entries,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Tenant themes ({} found)", keys.len());
        println!("======================");
        println!();

        for key in &keys {
            println!("{}", key);
        }
    }

    Ok(())
}

async fn validate_tenants(
    tenants_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref()).unwrap_or_default();
    let repo = open_tenants(&config, tenants_dir.as_deref())?;

    println!("Validating tenants in: {}", repo.dir().display());

    match repo.validate_all().await {
        Ok(themes) => {
            println!("✓ Validation passed ({} themes)", themes.len());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Validation failed: {}", e);
            std::process::exit(1);
        }
    }
}
