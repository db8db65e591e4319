//! `midmile analyze` and `midmile sop`: look at one document on its own, or
//! price an SOP before any settlement arrives.

use std::path::PathBuf;

use clap::Subcommand;
use midmile_recon::analysis::{analyze_rate_card, analyze_settlement, Discrepancy};
use midmile_recon::model::SopFactors;
use midmile_recon::sources::{load_rate_card, load_settlement, parse_sop};
use midmile_recon::{evaluate_sop, ParseError, ReconError, SopEvaluation};
use serde::Serialize;

use crate::check::load_config;
use crate::exit_codes::EXIT_ERROR;
use crate::CliError;

#[derive(Subcommand)]
pub enum AnalyzeCommands {
    /// Rule counts, rate ranges and duplicate rules in a rate card
    RateCard {
        file: PathBuf,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Totals, vendors and discrepancies in a settlement report
    Settlement {
        file: PathBuf,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,
    },
}

fn parse_err(err: ParseError) -> CliError {
    ReconError::from(err).into()
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let json_str = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))?;
    println!("{json_str}");
    Ok(())
}

pub fn cmd_analyze(cmd: AnalyzeCommands, config: Option<PathBuf>) -> Result<(), CliError> {
    let columns = load_config(config.as_deref())?.columns;
    match cmd {
        AnalyzeCommands::RateCard { file, json } => {
            let records = load_rate_card(&file, &columns.rate_card).map_err(parse_err)?;
            let analysis = analyze_rate_card(&records);
            if json {
                return print_json(&analysis);
            }
            eprintln!(
                "{} rule(s), {} vehicle type(s), {} duplicate rule key(s)",
                analysis.total_records,
                analysis.vehicle_distribution.len(),
                analysis.duplicate_rules.len(),
            );
            for (vehicle, stats) in &analysis.rate_by_vehicle {
                eprintln!(
                    "  {vehicle}: {} rule(s), rate {:.2}..{:.2} (mean {:.2})",
                    stats.count, stats.min, stats.max, stats.mean
                );
            }
            for rec in &analysis.recommendations {
                eprintln!("recommendation: {rec}");
            }
            Ok(())
        }
        AnalyzeCommands::Settlement { file, json } => {
            let records = load_settlement(&file, &columns.settlement).map_err(parse_err)?;
            let analysis = analyze_settlement(&records);
            if json {
                return print_json(&analysis);
            }
            eprintln!(
                "{} transaction(s), {} vendor(s), {} discrepancy(ies)",
                analysis.total_transactions,
                analysis.by_vendor.len(),
                analysis.discrepancies.len(),
            );
            for (currency, t) in &analysis.by_currency {
                eprintln!(
                    "  {currency}: {} paid, total {:.2}, mean {:.2}, range {:.2}..{:.2}",
                    t.transactions, t.total, t.mean, t.min, t.max
                );
            }
            for d in &analysis.discrepancies {
                match d {
                    Discrepancy::DuplicateTourId { tour_id, rows } => {
                        eprintln!("  duplicate tour id {tour_id} on rows {rows:?}")
                    }
                    Discrepancy::NonPositiveAmount { row, amount } => {
                        eprintln!("  row {row}: non-positive amount '{amount}'")
                    }
                    Discrepancy::MissingTourId { row } => eprintln!("  row {row}: no tour id"),
                }
            }
            for rec in &analysis.recommendations {
                eprintln!("recommendation: {rec}");
            }
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct SopReport<'a> {
    factors: &'a SopFactors,
    evaluation: &'a SopEvaluation,
}

pub fn cmd_sop(
    file: PathBuf,
    rate_card: Option<PathBuf>,
    config: Option<PathBuf>,
    json: bool,
) -> Result<(), CliError> {
    let factors = parse_sop(&file).map_err(parse_err)?;

    let Some(rate_card) = rate_card else {
        if json {
            return print_json(&factors);
        }
        print_factors(&factors);
        return Ok(());
    };

    let columns = load_config(config.as_deref())?.columns;
    let rules = load_rate_card(&rate_card, &columns.rate_card).map_err(parse_err)?;
    let evaluation = evaluate_sop(&factors, &rules);
    if json {
        return print_json(&SopReport { factors: &factors, evaluation: &evaluation });
    }

    print_factors(&factors);
    match (evaluation.expected_payment, evaluation.rate_rule_row) {
        (Some(amount), Some(row)) => eprintln!(
            "expected payment: {amount:.2}{} (rate card row {row})",
            evaluation.currency.as_deref().map(|c| format!(" {c}")).unwrap_or_default(),
        ),
        _ => eprintln!("expected payment: n/a"),
    }
    for flag in &evaluation.dispute_flags {
        eprintln!("  [{}] {}: {}", flag.severity, flag.kind, flag.description);
    }
    eprintln!(
        "decision: {}",
        if evaluation.is_payable() { "payable" } else { "hold for review" }
    );
    Ok(())
}

fn print_factors(factors: &SopFactors) {
    for (name, value) in &factors.factors {
        println!("{name}: {value}");
    }
}
