//! Doctor command - validate configuration and show status

use anyhow::Result;
use recipe_writer_adapters::bibliographic::AlmaBibSource;
use serde::Serialize;
use std::path::PathBuf;

use crate::args::DoctorArgs;
use crate::config::AppConfig;

#[derive(Debug, Serialize)]
struct DoctorReport {
    namespace: CheckResult,
    config: CheckResult,
    base_dir: CheckResult,
    bibliographic: CheckResult,
    storage: CheckResult,
    catalog: CheckResult,
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
        namespace: check_namespace(),
        config: CheckResult::error("Not checked"),
        base_dir: CheckResult::error("Not checked"),
        bibliographic: CheckResult::error("Not checked"),
        storage: CheckResult::error("Not checked"),
        catalog: CheckResult::error("Not checked"),
        overall: "error".to_string(),
    };

    let config = match AppConfig::load(config_path.as_deref()) {
        Ok(c) => {
            report.config = CheckResult::ok("Configuration loaded successfully");
            Some(c)
        }
        Err(e) => {
            report.config = CheckResult::error(format!("Failed to load config: {:#}", e));
            None
        }
    };

    if let Some(ref config) = config {
        report.base_dir = check_base_dir(config);
        report.bibliographic = check_bibliographic(config);
        report.storage = check_storage(config);
        report.catalog = check_catalog(config);
    }

    let checks = [
        &report.namespace,
        &report.config,
        &report.base_dir,
        &report.bibliographic,
        &report.storage,
        &report.catalog,
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

fn check_namespace() -> CheckResult {
    match recipe_writer_domain::verify_namespace() {
        Ok(()) => CheckResult::ok(format!(
            "Namespace {}",
            recipe_writer_domain::REPOSITORY_NAMESPACE
        )),
        Err(e) => CheckResult::error(e.to_string()),
    }
}

fn check_base_dir(config: &AppConfig) -> CheckResult {
    let base_dir = &config.general.base_dir;
    if !base_dir.is_dir() {
        return CheckResult::error(format!(
            "Base directory does not exist: {}",
            base_dir.display()
        ));
    }

    let tasks = base_dir.join("oulib_tasks");
    if tasks.is_dir() {
        CheckResult::ok(format!("Base directory: {}", base_dir.display()))
    } else {
        CheckResult::warn(format!(
            "Base directory has no oulib_tasks area yet: {}",
            base_dir.display()
        ))
    }
}

fn check_bibliographic(config: &AppConfig) -> CheckResult {
    let source = match AlmaBibSource::with_base_url(
        &config.bibliographic.api_key_path,
        &config.bibliographic.base_url,
    ) {
        Ok(source) => source,
        Err(e) => return CheckResult::error(format!("Failed to create client: {}", e)),
    };

    // Key problems only drop bibliographic metadata, never fail a run
    match source.api_key() {
        Ok(_) => CheckResult::ok(format!(
            "API key: {} (readable), URL: {}",
            source.api_key_path().display(),
            config.bibliographic.base_url
        )),
        Err(e) => CheckResult::warn(e.to_string()),
    }
}

fn check_storage(config: &AppConfig) -> CheckResult {
    let storage = &config.storage;
    if !storage.enabled {
        return CheckResult::warn("Object storage disabled, uploads are only recorded");
    }

    let details = serde_json::json!({
        "bucket": storage.bucket,
        "destination": storage.destination,
        "region": storage.region,
        "endpoint": storage.endpoint,
    });

    let missing: Vec<&str> = [&storage.access_key_env, &storage.secret_key_env]
        .into_iter()
        .filter(|var| !env_is_set(var))
        .map(String::as_str)
        .collect();

    if missing.is_empty() {
        CheckResult::ok(format!("Bucket: {} (credentials set)", storage.bucket)).with_details(details)
    } else {
        CheckResult::warn(format!(
            "Bucket: {}, credentials not set: {}",
            storage.bucket,
            missing.join(", ")
        ))
        .with_details(details)
    }
}

fn check_catalog(config: &AppConfig) -> CheckResult {
    if !config.catalog.enabled {
        return CheckResult::ok("Catalog sync disabled");
    }

    let env_var = &config.catalog.token_env;
    if env_var.is_empty() {
        return CheckResult::error("No catalog token env var configured");
    }

    let url = config.catalog_base_url();
    if env_is_set(env_var) {
        CheckResult::ok(format!("Token: {} (set), URL: {}", env_var, url))
    } else {
        CheckResult::warn(format!("Token: {} (not set), URL: {}", env_var, url))
    }
}

fn env_is_set(var: &str) -> bool {
    matches!(std::env::var(var), Ok(value) if !value.trim().is_empty())
}

fn print_report(report: &DoctorReport) {
    println!("recipe-writer Doctor Report");
    println!("===========================");
    println!();

    print_check("Namespace", &report.namespace);
    print_check("Config", &report.config);
    print_check("Base Directory", &report.base_dir);
    print_check("Bibliographic", &report.bibliographic);
    print_check("Storage", &report.storage);
    print_check("Catalog", &report.catalog);

    println!();
    let symbol = match report.overall.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} Overall: {}", symbol, report.overall.to_uppercase());

    if report.overall == "ok" {
        println!();
        println!("Ready to run! Try: recipe-writer process --task-id <id> --bags <name> --dry-run");
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
