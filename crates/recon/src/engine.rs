use std::path::Path;

use log::info;

use crate::config::CheckConfig;
use crate::consistency::{check_consistency, compare_fields};
use crate::error::ReconError;
use crate::matcher::{normalize_with, AttributeScorer, MatchScorer};
use crate::model::{
    DataSummary, RateCardRecord, ReconciliationResult, ResultMeta, SettlementRecord, SopFactors,
};
use crate::payment::evaluate_payment;
use crate::recommend::recommend;
use crate::risk::score_risk;
use crate::sources::{load_rate_card, load_settlement, parse_sop};

/// Reconcile three documents on disk with the default configuration.
pub fn reconcile(
    sop_path: &Path,
    rate_card_path: &Path,
    settlement_path: &Path,
) -> Result<ReconciliationResult, ReconError> {
    reconcile_with(&CheckConfig::default(), sop_path, rate_card_path, settlement_path)
}

/// Load the three documents and reconcile them. A document that cannot be
/// read or parsed fails the whole run with an error naming it.
pub fn reconcile_with(
    config: &CheckConfig,
    sop_path: &Path,
    rate_card_path: &Path,
    settlement_path: &Path,
) -> Result<ReconciliationResult, ReconError> {
    let sop = parse_sop(sop_path)?;
    let rate_card = load_rate_card(rate_card_path, &config.columns.rate_card)?;
    let settlements = load_settlement(settlement_path, &config.columns.settlement)?;
    reconcile_records(config, &sop, &rate_card, &settlements)
}

/// Reconcile pre-loaded records.
pub fn reconcile_records(
    config: &CheckConfig,
    sop: &SopFactors,
    rate_card: &[RateCardRecord],
    settlements: &[SettlementRecord],
) -> Result<ReconciliationResult, ReconError> {
    reconcile_records_with(config, sop, rate_card, settlements, &AttributeScorer)
}

/// As [`reconcile_records`], with a caller-supplied settlement scorer.
pub fn reconcile_records_with(
    config: &CheckConfig,
    sop: &SopFactors,
    rate_card: &[RateCardRecord],
    settlements: &[SettlementRecord],
    scorer: &dyn MatchScorer,
) -> Result<ReconciliationResult, ReconError> {
    config.validate()?;

    let tour = normalize_with(sop, rate_card, settlements, scorer)?;
    let tolerance = config.tolerance.numeric_pct;

    let field_comparisons = compare_fields(&tour, tolerance);
    let mut consistency_checks = tour.issues.clone();
    consistency_checks.extend(check_consistency(&tour, tolerance));

    let payment_accuracy = evaluate_payment(&tour, config);

    let mut risk_factors = consistency_checks.clone();
    risk_factors.extend(payment_accuracy.issues.iter().cloned());
    let risk_assessment =
        score_risk(&risk_factors, payment_accuracy.accuracy_percentage, &config.risk);

    let (recommendations, insights) = recommend(&payment_accuracy, &risk_assessment);

    info!(
        "reconciled tour {}: {} issue(s), risk {:.2} ({})",
        tour.sop.tour_id().as_deref().unwrap_or("<no id>"),
        risk_assessment.risk_factors.len(),
        risk_assessment.overall_risk_score,
        risk_assessment.severity,
    );

    Ok(ReconciliationResult {
        meta: ResultMeta {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            numeric_tolerance_pct: config.tolerance.numeric_pct,
            payment_tolerance_pct: config.tolerance.payment_pct,
        },
        data_summary: DataSummary {
            sop_factors: tour.sop.clone(),
            rate_card_records: rate_card.len(),
            settlement_records: settlements.len(),
            tour_id: tour.sop.tour_id(),
            match_method: tour.match_method,
            matched_rate_rule: tour.rate_rule.clone(),
            matched_settlements: tour.settlements.clone(),
        },
        field_comparisons,
        consistency_checks,
        payment_accuracy,
        risk_assessment,
        recommendations,
        insights,
    })
}
