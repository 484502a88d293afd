//! Doctor command - validate configuration and show status

use anyhow::Result;
use reposter_domain::TenantThemeConfig;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::args::DoctorArgs;
use crate::commands::{load_token, open_store, open_tenants};
use crate::config::{AppConfig, StateBackend};

#[derive(Debug, Serialize)]
struct DoctorReport {
    config: CheckResult,
    tenants: CheckResult,
    state: CheckResult,
    accounts: CheckResult,
    overall: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    status: String,
    message: String,
    details: Option<serde_json::Value>,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            status: "warn".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    fn is_error(&self) -> bool {
        self.status == "error"
    }
}

pub async fn execute(args: DoctorArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut report = DoctorReport {
        config: CheckResult::error("Not checked"),
        tenants: CheckResult::error("Not checked"),
        state: CheckResult::error("Not checked"),
        accounts: CheckResult::error("Not checked"),
        overall: "error".to_string(),
    };

    // Check config
    let config = match AppConfig::load(config_path.as_deref()) {
        Ok(c) => {
            report.config = CheckResult::ok("Configuration loaded successfully");
            Some(c)
        }
        Err(e) => {
            report.config = CheckResult::error(format!("Failed to load config: {}", e));
            None
        }
    };

    if let Some(ref config) = config {
        let (tenants, themes) = check_tenants(config).await;
        report.tenants = tenants;
        report.state = check_state(config).await;
        report.accounts = check_accounts(config, &themes);
    }

    // Determine overall status
    let checks = [
        &report.config,
        &report.tenants,
        &report.state,
        &report.accounts,
    ];

    let has_error = checks.iter().any(|c| c.is_error());
    let all_ok = checks.iter().all(|c| c.is_ok());

    report.overall = if has_error {
        "error".to_string()
    } else if all_ok {
        "ok".to_string()
    } else {
        "warn".to_string()
    };

    // Output report
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.overall == "error" {
        std::process::exit(1);
    }

    Ok(())
}

async fn check_tenants(config: &AppConfig) -> (CheckResult, Vec<TenantThemeConfig>) {
    let repo = match open_tenants(config, None) {
        Ok(r) => r,
        Err(e) => return (CheckResult::error(format!("{:#}", e)), vec![]),
    };

    match repo.validate_all().await {
        Ok(themes) if themes.is_empty() => (
            CheckResult::warn(format!(
                "No tenants configured in {}",
                repo.dir().display()
            )),
            themes,
        ),
        Ok(themes) => {
            let keys: Vec<String> = themes.iter().map(|t| t.key().to_string()).collect();
            (
                CheckResult::ok(format!("{} themes loaded", themes.len()))
                    .with_details(serde_json::json!({ "themes": keys })),
                themes,
            )
        }
        Err(e) => (CheckResult::error(format!("Validation failed: {}", e)), vec![]),
    }
}

async fn check_state(config: &AppConfig) -> CheckResult {
    let backend = config.general.state_backend;
    match open_store(config).await {
        Ok(_) => match backend {
            StateBackend::Memory => {
                CheckResult::warn("Backend: memory (history is lost between runs)")
            }
            StateBackend::Sqlite => CheckResult::ok(format!(
                "Backend: sqlite, path: {}",
                config.general.state_db_path.display()
            )),
            StateBackend::Json => CheckResult::ok(format!(
                "Backend: json, dir: {}",
                config.general.state_dir.display()
            )),
        },
        Err(e) => CheckResult::error(format!("Backend: {}, {:#}", backend.as_str(), e)),
    }
}

fn check_accounts(config: &AppConfig, themes: &[TenantThemeConfig]) -> CheckResult {
    let referenced: BTreeSet<&str> = themes
        .iter()
        .flat_map(|t| {
            t.read_accounts
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(t.write_account.as_str()))
        })
        .collect();

    if referenced.is_empty() {
        return CheckResult::warn("No accounts referenced by tenants");
    }

    let mut unmapped = Vec::new();
    let mut unset = Vec::new();
    for account in &referenced {
        match config.accounts.get(*account) {
            None => unmapped.push(account.to_string()),
            Some(env_var) if load_token(env_var).is_none() => {
                unset.push(format!("{} ({})", account, env_var))
            }
            Some(_) => {}
        }
    }

    let details = serde_json::json!({
        "referenced": referenced,
        "unmapped": unmapped,
        "unset": unset,
    });

    if !unmapped.is_empty() {
        CheckResult::error(format!(
            "Accounts without a token env var in [accounts]: {}",
            unmapped.join(", ")
        ))
        .with_details(details)
    } else if !unset.is_empty() {
        CheckResult::warn(format!("Token env vars not set: {}", unset.join(", ")))
            .with_details(details)
    } else {
        CheckResult::ok(format!("{} accounts, all tokens set", referenced.len()))
            .with_details(details)
    }
}

fn print_report(report: &DoctorReport) {
    println!("reposter Doctor Report");
    println!("======================");
    println!();

    print_check("Config", &report.config);
    print_check("Tenants", &report.tenants);
    print_check("State", &report.state);
    print_check("Accounts", &report.accounts);

    println!();
    let symbol = match report.overall.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} Overall: {}", symbol, report.overall.to_uppercase());

    if report.overall == "ok" {
        println!();
        println!("Ready to run! Try: reposter run --all --dry-run");
    }
}

fn print_check(name: &str, result: &CheckResult) {
    let symbol = match result.status.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} {}: {}", symbol, name, result.message);
}
