//! `midmile check`, `midmile report` and `midmile config`.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use midmile_recon::{
    export_payment_and_dispute, export_report, reconcile_with, CheckConfig, ReconciliationResult,
    ReportKind, Severity,
};

use crate::exit_codes::{risk_exit_code, EXIT_ERROR, EXIT_EXPORT, EXIT_INVALID_CONFIG};
use crate::CliError;

/// The three documents for one tour, plus an optional config file.
#[derive(Args)]
pub struct Inputs {
    /// SOP document (text, `Key: value` lines)
    pub sop: PathBuf,

    /// Rate card CSV
    pub rate_card: PathBuf,

    /// Settlement report CSV
    pub settlement: PathBuf,

    /// TOML file with tolerances, risk weights and column aliases
    #[arg(long, env = "MIDMILE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a check config without running
    #[command(after_help = "\
Examples:
  midmile config validate check.toml")]
    Validate {
        /// Path to the TOML config file
        file: PathBuf,
    },
}

pub(crate) fn load_config(path: Option<&Path>) -> Result<CheckConfig, CliError> {
    let Some(path) = path else {
        return Ok(CheckConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| {
        CliError::new(EXIT_INVALID_CONFIG, format!("cannot read config {}: {e}", path.display()))
    })?;
    Ok(CheckConfig::from_toml(&text)?)
}

fn run(inputs: &Inputs) -> Result<ReconciliationResult, CliError> {
    let config = load_config(inputs.config.as_deref())?;
    Ok(reconcile_with(&config, &inputs.sop, &inputs.rate_card, &inputs.settlement)?)
}

// ============================================================================
// check
// ============================================================================

pub fn cmd_check(inputs: Inputs, json_output: bool, output_file: Option<PathBuf>) -> Result<(), CliError> {
    let result = run(&inputs)?;

    if json_output || output_file.is_some() {
        let json_str = serde_json::to_string_pretty(&result)
            .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))?;

        if let Some(ref path) = output_file {
            std::fs::write(path, &json_str)
                .map_err(|e| CliError::new(EXIT_EXPORT, format!("cannot write output: {e}")))?;
            eprintln!("wrote {}", path.display());
        }
        if json_output {
            println!("{json_str}");
        }
    }

    print_summary(&result);

    match result.risk_assessment.severity {
        Severity::Low => Ok(()),
        tier => Err(CliError::silent(risk_exit_code(tier))),
    }
}

fn money(v: Option<f64>) -> String {
    v.map(|n| format!("{n:.2}")).unwrap_or_else(|| "n/a".into())
}

/// Human summary to stderr
fn print_summary(result: &ReconciliationResult) {
    let risk = &result.risk_assessment;
    let pay = &result.payment_accuracy;

    eprintln!(
        "tour {} (matched by {}): risk {:.2}/10 ({}), {} issue(s)",
        result.data_summary.tour_id.as_deref().unwrap_or("<no id>"),
        result.data_summary.match_method,
        risk.overall_risk_score,
        risk.severity,
        risk.risk_factors.len(),
    );
    eprintln!(
        "payment: expected {}, paid {:.2}, variance {}, accuracy {}",
        money(pay.expected_payment),
        pay.actual_payment,
        money(pay.variance),
        pay.accuracy_percentage
            .map(|a| format!("{a:.1}%"))
            .unwrap_or_else(|| "n/a".into()),
    );
    for issue in &risk.risk_factors {
        eprintln!("  [{}] {}: {}", issue.severity, issue.kind, issue.description);
    }
    for rec in &result.recommendations {
        eprintln!("recommendation: {rec}");
    }
}

// ============================================================================
// report
// ============================================================================

pub fn cmd_report(kind: &str, inputs: Inputs, out: PathBuf) -> Result<(), CliError> {
    let normalized = kind.trim().to_ascii_lowercase().replace('_', "-");
    let single = if normalized == "payment-and-dispute" {
        None
    } else {
        Some(ReportKind::parse(&normalized).ok_or_else(|| {
            CliError::args(format!("unknown report kind: \"{kind}\""))
                .with_hint("expected tour, payment, dispute or payment-and-dispute")
        })?)
    };

    let result = run(&inputs)?;

    let written = match single {
        Some(kind) => vec![export_report(&result, kind, &out)?],
        None => {
            std::fs::create_dir_all(&out).map_err(|e| {
                CliError::new(EXIT_EXPORT, format!("cannot create {}: {e}", out.display()))
            })?;
            export_payment_and_dispute(&result, &out)?
        }
    };

    for summary in &written {
        eprintln!(
            "wrote {} report: {} ({} sheet(s), {} row(s))",
            summary.kind,
            summary.path.display(),
            summary.sheets,
            summary.rows,
        );
    }
    Ok(())
}

// ============================================================================
// config
// ============================================================================

pub fn cmd_config(cmd: ConfigCommands) -> Result<(), CliError> {
    match cmd {
        ConfigCommands::Validate { file } => {
            let config = load_config(Some(&file))?;
            eprintln!(
                "valid: numeric tolerance {}%, payment tolerance {}%, tiers low < {} <= medium <= {} < high",
                config.tolerance.numeric_pct,
                config.tolerance.payment_pct,
                config.risk.medium_from,
                config.risk.high_above,
            );
            Ok(())
        }
    }
}
