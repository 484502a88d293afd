//! Run command - one publish cycle per selected (tenant, theme)

use anyhow::{Context, Result, bail};
use futures::stream::{self, StreamExt};
use reposter_adapters::{
    images::HttpImageFetcher,
    outbox::{OutboxPublisher, OutboxWriter},
    tenants::FsTenantRepo,
    wall::{WallPublisher, WallSource},
};
use reposter_domain::{
    DestinationWriter, RandomChooser, SystemClock, TenantConfigSource, TenantThemeKey,
    WorkingSetStore,
    usecases::{CycleConfig, CycleOutcome, CycleRunner, CycleStage},
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::args::RunArgs;
use crate::commands::{load_account_tokens, open_store, open_tenants};
use crate::config::AppConfig;

type Runner = CycleRunner<
    WallSource,
    dyn DestinationWriter,
    dyn WorkingSetStore,
    HttpImageFetcher,
    FsTenantRepo,
    SystemClock,
    RandomChooser,
>;

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    let require_approval = args.require_approval;
    let outbox_path = if require_approval {
        Some(args.outbox.clone().unwrap_or_else(default_outbox_path))
    } else {
        None
    };

    if args.outbox.is_some() && !require_approval {
        tracing::warn!("--outbox is ignored without --require-approval");
    }

    let mut dry_run = args.dry_run || config.general.dry_run;
    if require_approval && dry_run {
        tracing::info!("--require-approval overrides dry-run");
        dry_run = false;
    }

    let tenants = Arc::new(open_tenants(&config, args.tenants_dir.as_deref())?);
    let targets = select_targets(&args, tenants.as_ref()).await?;

    tracing::info!(
        dry_run = dry_run,
        require_approval = require_approval,
        outbox = ?outbox_path,
        targets = targets.len(),
        "Starting reposter run"
    );

    // Build dependencies
    let store = open_store(&config).await?;
    let tokens = load_account_tokens(&config);
    let source = Arc::new(WallSource::with_base_url(
        tokens.clone(),
        config.wall.base_url.clone(),
        config.wall.api_version.clone(),
    ));

    let writer: Arc<dyn DestinationWriter> = match outbox_path {
        Some(path) => {
            let writer = OutboxWriter::open(path.clone())
                .await
                .context("Failed to initialize outbox writer")?;
            tracing::info!(outbox = %path.display(), "Writing approvals to outbox");
            Arc::new(OutboxPublisher::new(writer, "wall"))
        }
        None if dry_run => Arc::new(WallPublisher::disabled()),
        None => Arc::new(WallPublisher::with_base_url(
            tokens,
            config.wall.base_url.clone(),
            config.wall.api_version.clone(),
            config.wall.max_chars,
            true,
        )),
    };

    let runner: Runner = CycleRunner::new(
        source,
        writer,
        store,
        Arc::new(HttpImageFetcher::new()),
        tenants,
        Arc::new(SystemClock),
        Arc::new(RandomChooser),
        CycleConfig { dry_run },
    );

    // Keys are unique, so no two cycles for the same pair run at once
    let max_concurrent = config.general.max_concurrent.max(1);
    let runner = &runner;
    let mut results: Vec<(TenantThemeKey, CycleOutcome)> = stream::iter(targets)
        .map(|key| async move {
            let outcome = runner.run_cycle(&key.tenant, &key.theme).await;
            (key, outcome)
        })
        .buffer_unordered(max_concurrent)
        .collect()
        .await;
    results.sort_by(|a, b| a.0.cmp(&b.0));

    let reports: Vec<RunReport> = results
        .iter()
        .map(|(key, outcome)| RunReport::new(key, outcome))
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            print_report(report);
        }
    }

    let failed = reports.iter().filter(|r| r.status == "failed").count();
    tracing::info!(
        cycles = reports.len(),
        failed = failed,
        "reposter run completed"
    );
    Ok(())
}

/// Resolve the command-line selection to concrete (tenant, theme) pairs
async fn select_targets(
    args: &RunArgs,
    tenants: &FsTenantRepo,
) -> Result<Vec<TenantThemeKey>> {
    match (&args.tenant, &args.theme) {
        (Some(tenant), Some(theme)) => Ok(vec![TenantThemeKey::new(tenant, theme)]),
        (Some(tenant), None) => {
            let keys: Vec<_> = tenants
                .list()
                .await
                .context("Failed to list tenants")?
                .into_iter()
                .filter(|key| &key.tenant == tenant)
                .collect();
            if keys.is_empty() {
                bail!("No themes configured for tenant '{}'", tenant);
            }
            Ok(keys)
        }
        (None, _) if args.all => tenants.list().await.context("Failed to list tenants"),
        (None, _) => bail!("Specify --tenant [--theme] or --all"),
    }
}

#[derive(Debug, Serialize)]
struct RunReport {
    tenant: String,
    theme: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    post_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination_post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fetched: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejected: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<CycleStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl RunReport {
    fn new(key: &TenantThemeKey, outcome: &CycleOutcome) -> Self {
        let mut report = Self {
            tenant: key.tenant.clone(),
            theme: key.theme.clone(),
            status: outcome.status(),
            post_key: None,
            fingerprint: None,
            destination_post_id: None,
            destination_url: None,
            text: None,
            fetched: None,
            rejected: None,
            stage: None,
            error: None,
        };

        match outcome {
            CycleOutcome::Published {
                post_key,
                text,
                destination_post_id,
                destination_url,
                fingerprint,
            } => {
                report.post_key = Some(post_key.clone());
                report.text = Some(text.clone());
                report.destination_post_id = Some(destination_post_id.clone());
                report.destination_url = destination_url.clone();
                report.fingerprint = Some(fingerprint.to_string());
            }
            CycleOutcome::DryRun {
                post_key,
                text,
                fingerprint,
            } => {
                report.post_key = Some(post_key.clone());
                report.text = Some(text.clone());
                report.fingerprint = Some(fingerprint.to_string());
            }
            CycleOutcome::NoEligibleCandidate { fetched, rejected } => {
                report.fetched = Some(*fetched);
                report.rejected = Some(*rejected);
            }
            CycleOutcome::Failed { stage, error } => {
                report.stage = Some(*stage);
                report.error = Some(error.to_string());
            }
        }

        report
    }
}

fn print_report(report: &RunReport) {
    let symbol = match report.status {
        "published" | "dry_run" => "✓",
        "no_eligible_candidate" => "-",
        _ => "✗",
    };
    println!(
        "{} {}/{}: {}",
        symbol, report.tenant, report.theme, report.status
    );

    if let Some(ref post_key) = report.post_key {
        println!("  Source: {}", post_key);
    }
    if let Some(ref url) = report.destination_url {
        println!("  Published: {}", url);
    } else if let Some(ref id) = report.destination_post_id {
        println!("  Published: {}", id);
    }
    if let (Some(fetched), Some(rejected)) = (report.fetched, report.rejected) {
        println!("  Fetched: {}, rejected: {}", fetched, rejected);
    }
    if let (Some(stage), Some(error)) = (report.stage, report.error.as_ref()) {
        println!("  Failed at {}: {}", stage, error);
    }
    if report.status == "dry_run" {
        if let Some(ref text) = report.text {
            println!();
            for line in text.lines() {
                println!("  | {}", line);
            }
            println!();
        }
    }
}

fn default_outbox_path() -> PathBuf {
    PathBuf::from("./outbox.jsonl")
}
