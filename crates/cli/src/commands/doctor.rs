use moldquote_core::config::{AppConfig, LoadOptions, SinkKind};
use moldquote_db::{connect_with_settings, migrations};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_webhook_signature(&config));
            checks.push(check_pricing_table(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()));
            for name in ["webhook_signature", "pricing_table", "database_connectivity"] {
                checks.push(DoctorCheck::new(
                    name,
                    CheckStatus::Skipped,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_webhook_signature(config: &AppConfig) -> DoctorCheck {
    match config.line.channel_secret {
        Some(_) => DoctorCheck::new(
            "webhook_signature",
            CheckStatus::Pass,
            "channel secret set, callbacks will be verified",
        ),
        None => DoctorCheck::new(
            "webhook_signature",
            CheckStatus::Warn,
            "line.channel_secret is unset, callbacks are accepted unsigned",
        ),
    }
}

fn check_pricing_table(config: &AppConfig) -> DoctorCheck {
    match config.pricing.catalog() {
        Ok(catalog) => DoctorCheck::new(
            "pricing_table",
            CheckStatus::Pass,
            format!(
                "{} materials ({}) at {} g/cm³",
                catalog.len(),
                catalog.names().join(", "),
                config.pricing.density_g_per_cm3
            ),
        ),
        Err(error) => DoctorCheck::new("pricing_table", CheckStatus::Fail, error.to_string()),
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    if config.sink.kind != SinkKind::Sqlite {
        return vec![DoctorCheck::new(
            "database_connectivity",
            CheckStatus::Skipped,
            format!("sink.kind is {}, local ledger not used", config.sink.kind.as_str()),
        )];
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck::new(
                "database_connectivity",
                CheckStatus::Fail,
                format!("failed to initialize async runtime: {error}"),
            )];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return vec![DoctorCheck::new(
                    "database_connectivity",
                    CheckStatus::Fail,
                    format!("failed to connect to database: {error}"),
                )];
            }
        };

        let connectivity = DoctorCheck::new(
            "database_connectivity",
            CheckStatus::Pass,
            format!("connected using `{}`", config.database.url),
        );
        let schema = match migrations::pending_count(&pool).await {
            Ok(0) => DoctorCheck::new("migrations", CheckStatus::Pass, "schema up to date"),
            Ok(pending) => DoctorCheck::new(
                "migrations",
                CheckStatus::Warn,
                format!("{pending} pending, applied automatically when the server starts"),
            ),
            Err(error) => DoctorCheck::new("migrations", CheckStatus::Fail, error.to_string()),
        };
        pool.close().await;

        vec![connectivity, schema]
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
