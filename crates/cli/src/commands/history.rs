//! History command - inspect stored working sets

use anyhow::{Context, Result};
use reposter_domain::TenantConfigSource;
use std::path::PathBuf;

use crate::args::{HistoryArgs, HistoryCommands};
use crate::commands::{open_store, open_tenants};
use crate::config::AppConfig;

pub async fn execute(args: HistoryArgs, config_path: Option<PathBuf>) -> Result<()> {
    match args.command {
        HistoryCommands::Show {
            tenant,
            theme,
            limit,
            json,
        } => show_history(&tenant, &theme, limit, json, config_path).await,
    }
}

async fn show_history(
    tenant: &str,
    theme: &str,
    limit: Option<usize>,
    json: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    let limit = match limit {
        Some(limit) => limit,
        None => {
            let repo = open_tenants(&config, None)?;
            repo.load(tenant, theme)
                .await
                .with_context(|| format!("Failed to load {}/{}", tenant, theme))?
                .history_limit
        }
    };

    let store = open_store(&config).await?;
    let working_set = store
        .load(tenant, theme, limit)
        .await
        .context("Failed to load working set")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&working_set)?);
        return Ok(());
    }

    println!("History for {}/{}", working_set.tenant, working_set.theme);
    println!("======================");
    println!("Version: {}", working_set.version);
    match working_set.updated_at {
        Some(at) => println!("Updated: {}", at),
        None => println!("Updated: never"),
    }
    println!(
        "Fingerprints ({}/{}):",
        working_set.fingerprints.len(),
        working_set.history_limit
    );
    for fingerprint in working_set.fingerprints.iter().rev() {
        println!("  {}", fingerprint);
    }
    println!(
        "Image hashes ({}/{}):",
        working_set.image_hashes.len(),
        working_set.history_limit
    );
    for hash in working_set.image_hashes.iter().rev() {
        println!("  {}", hash);
    }

    Ok(())
}
