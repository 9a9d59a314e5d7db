use serde::Serialize;
use vitrine_agent::assembly::load_catalog;
use vitrine_core::config::{AppConfig, LlmProvider, LoadOptions};
use vitrine_db::open_pool;

use crate::commands::block_on_runtime;

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

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_catalog(&config));
            checks.push(check_llm(&config));
            checks.push(check_payment(&config));
            checks.push(check_database_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["catalog_datasets", "llm_provider", "payment_gateway", "database_connectivity"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    // Warnings describe degraded but working deployments.
    let failed = checks.iter().any(|check| matches!(check.status, CheckStatus::Fail | CheckStatus::Skipped));
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_catalog(config: &AppConfig) -> DoctorCheck {
    match load_catalog(&config.catalog) {
        Ok((catalog, histories)) if !catalog.is_empty() => DoctorCheck {
            name: "catalog_datasets",
            status: CheckStatus::Pass,
            details: format!(
                "{} products and {} purchase histories loaded",
                catalog.len(),
                histories.entries().len()
            ),
        },
        Ok(_) => DoctorCheck {
            name: "catalog_datasets",
            status: CheckStatus::Fail,
            details: "catalog contains no products".to_string(),
        },
        Err(error) => {
            DoctorCheck { name: "catalog_datasets", status: CheckStatus::Fail, details: error.to_string() }
        }
    }
}

fn check_llm(config: &AppConfig) -> DoctorCheck {
    match config.llm.provider {
        LlmProvider::Offline => DoctorCheck {
            name: "llm_provider",
            status: CheckStatus::Warn,
            details: "offline provider: keyword planner and matcher in use".to_string(),
        },
        provider => DoctorCheck {
            name: "llm_provider",
            status: CheckStatus::Pass,
            details: format!(
                "{provider:?} at {} using model `{}`",
                config.llm.effective_base_url().unwrap_or_default(),
                config.llm.model
            ),
        },
    }
}

fn check_payment(config: &AppConfig) -> DoctorCheck {
    if config.payment.is_configured() {
        DoctorCheck {
            name: "payment_gateway",
            status: CheckStatus::Pass,
            details: format!("access token present for {}", config.payment.base_url),
        }
    } else {
        DoctorCheck {
            name: "payment_gateway",
            status: CheckStatus::Warn,
            details: "no access token: finalize_order will report payments as unavailable".to_string(),
        }
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match block_on_runtime("doctor") {
        Ok(runtime) => runtime,
        Err(failure) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: failure.output,
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;

        pool.close().await;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

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

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
