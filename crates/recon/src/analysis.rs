//! Standalone profiling of a rate card or settlement report.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{round_cents, RateCardRecord, SettlementRecord};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl RateStats {
    fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Self { count: values.len(), min, max, mean: round_cents(mean) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateCardAnalysis {
    pub total_records: usize,
    pub vehicle_distribution: BTreeMap<String, usize>,
    pub rate_by_vehicle: BTreeMap<String, RateStats>,
    pub basis_distribution: BTreeMap<String, usize>,
    /// Rule keys declared on more than one row, with the rows.
    pub duplicate_rules: BTreeMap<String, Vec<usize>>,
    pub recommendations: Vec<String>,
}

pub fn analyze_rate_card(records: &[RateCardRecord]) -> RateCardAnalysis {
    let mut vehicle_distribution = BTreeMap::new();
    let mut rates: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut basis_distribution = BTreeMap::new();
    let mut rows_by_key: BTreeMap<String, Vec<usize>> = BTreeMap::new();

    for r in records {
        let vehicle = r.vehicle_type.trim().to_string();
        *vehicle_distribution.entry(vehicle.clone()).or_insert(0) += 1;
        rates.entry(vehicle).or_default().push(r.rate);
        *basis_distribution.entry(r.basis.to_string()).or_insert(0) += 1;
        rows_by_key.entry(r.rule_key()).or_default().push(r.row);
    }

    let duplicate_rules: BTreeMap<_, _> =
        rows_by_key.into_iter().filter(|(_, rows)| rows.len() > 1).collect();
    let rate_by_vehicle: BTreeMap<_, _> =
        rates.into_iter().map(|(v, values)| (v, RateStats::from_values(&values))).collect();

    let mut recommendations = Vec::new();
    if records.is_empty() {
        recommendations.push("Rate card has no rules; no payment can be verified.".to_string());
    }
    if !duplicate_rules.is_empty() {
        recommendations.push(format!(
            "Resolve {} duplicated rule(s) so each vehicle and condition has one rate.",
            duplicate_rules.len()
        ));
    }
    if records.iter().any(|r| r.rate <= 0.0) {
        recommendations.push("Review rules with a zero or negative rate.".to_string());
    }
    if basis_distribution.len() > 1 {
        recommendations.push("Rate card mixes pricing bases; confirm each vehicle type is priced consistently.".to_string());
    }
    for (vehicle, stats) in &rate_by_vehicle {
        if stats.count > 1 && stats.min > 0.0 && stats.max > 2.0 * stats.min {
            recommendations.push(format!(
                "Rates for {vehicle} range from {:.2} to {:.2}; check the conditions that separate them.",
                stats.min, stats.max
            ));
        }
    }

    RateCardAnalysis {
        total_records: records.len(),
        vehicle_distribution,
        rate_by_vehicle,
        basis_distribution,
        duplicate_rules,
        recommendations,
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrencyTotals {
    pub transactions: usize,
    pub total: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VendorTotals {
    pub transactions: usize,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    DuplicateTourId { tour_id: String, rows: Vec<usize> },
    NonPositiveAmount { row: usize, amount: String },
    MissingTourId { row: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementAnalysis {
    pub total_transactions: usize,
    /// Keyed by currency; rows without one are grouped under `"unspecified"`.
    pub by_currency: BTreeMap<String, CurrencyTotals>,
    pub by_vendor: BTreeMap<String, VendorTotals>,
    pub discrepancies: Vec<Discrepancy>,
    pub recommendations: Vec<String>,
}

pub fn analyze_settlement(records: &[SettlementRecord]) -> SettlementAnalysis {
    let mut amounts: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut by_vendor: BTreeMap<String, VendorTotals> = BTreeMap::new();
    let mut rows_by_tour: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    let mut discrepancies = Vec::new();

    for s in records {
        let currency = s
            .currency
            .as_deref()
            .map(|c| c.trim().to_ascii_uppercase())
            .unwrap_or_else(|| "unspecified".into());
        amounts.entry(currency).or_default().push(s.amount);

        if let Some(vendor) = s.vendor.as_deref().filter(|v| !v.trim().is_empty()) {
            let entry = by_vendor.entry(vendor.trim().to_string()).or_default();
            entry.transactions += 1;
            entry.total = round_cents(entry.total + s.amount);
        }

        match s.tour_id.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(id) => rows_by_tour.entry(id.to_ascii_uppercase()).or_default().push(s.row),
            None => discrepancies.push(Discrepancy::MissingTourId { row: s.row }),
        }
        if s.amount <= 0.0 {
            discrepancies.push(Discrepancy::NonPositiveAmount { row: s.row, amount: s.amount_raw.clone() });
        }
    }

    for (tour_id, rows) in rows_by_tour {
        if rows.len() > 1 {
            discrepancies.push(Discrepancy::DuplicateTourId { tour_id, rows });
        }
    }

    let by_currency: BTreeMap<_, _> = amounts
        .into_iter()
        .map(|(currency, values)| {
            let stats = RateStats::from_values(&values);
            let total = round_cents(values.iter().sum());
            (
                currency,
                CurrencyTotals {
                    transactions: stats.count,
                    total,
                    mean: stats.mean,
                    min: stats.min,
                    max: stats.max,
                },
            )
        })
        .collect();

    let count = |pred: fn(&Discrepancy) -> bool| discrepancies.iter().filter(|d| pred(d)).count();
    let duplicates = count(|d| matches!(d, Discrepancy::DuplicateTourId { .. }));
    let non_positive = count(|d| matches!(d, Discrepancy::NonPositiveAmount { .. }));
    let missing = count(|d| matches!(d, Discrepancy::MissingTourId { .. }));

    let mut recommendations = Vec::new();
    if duplicates > 0 {
        recommendations.push(format!("Investigate {duplicates} tour id(s) paid more than once."));
    }
    if non_positive > 0 {
        recommendations.push(format!("Review {non_positive} zero or negative payment(s)."));
    }
    if missing > 0 {
        recommendations.push(format!(
            "Add tour ids to {missing} settlement row(s) so they can be matched to an SOP."
        ));
    }
    if by_currency.len() > 1 {
        recommendations.push("Settlement report mixes currencies; totals are reported per currency.".to_string());
    }

    SettlementAnalysis {
        total_transactions: records.len(),
        by_currency,
        by_vendor,
        discrepancies,
        recommendations,
    }
}
