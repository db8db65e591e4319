//! Expected vs actual payment for a normalized tour.

use serde::Serialize;

use crate::config::CheckConfig;
use crate::matcher::match_rate_rule;
use crate::model::{
    factor, round_cents, Issue, IssueKind, MatchMethod, NormalizedTour, PaymentAccuracy,
    RateBasis, RateCardRecord, Severity, SopFactors,
};

/// Guards the accuracy denominator when both payments are zero.
const EPSILON: f64 = 1e-9;

/// `100 × (1 − |actual − expected| / max(expected, actual, ε))`, clamped to [0, 100].
/// Both zero is a perfect match. Reported to two decimals.
pub fn accuracy_percentage(expected: f64, actual: f64) -> f64 {
    let denominator = expected.abs().max(actual.abs()).max(EPSILON);
    let pct = 100.0 * (1.0 - (actual - expected).abs() / denominator);
    if pct.is_nan() {
        return 0.0;
    }
    round_cents(pct.clamp(0.0, 100.0))
}

/// Apply the matched rule's basis to the SOP factors.
/// `Err` carries the issue explaining why the expectation is indeterminate.
fn expected_payment(tour: &NormalizedTour) -> Result<(f64, RateBasis), Issue> {
    let Some(rule) = &tour.rate_rule else {
        let vehicle = tour.sop.vehicle_type();
        let description = match &vehicle {
            Some(v) => format!("No rate card rule applies to vehicle type {v}; expected payment is indeterminate"),
            None => "SOP declares no vehicle type; expected payment is indeterminate".into(),
        };
        return Err(Issue::new(IssueKind::NoRateRule, factor::VEHICLE_TYPE, Severity::Medium, description)
            .values(vehicle, None));
    };

    let amount = match rule.basis {
        RateBasis::PerKm => {
            let Some(distance) = tour.sop.distance() else {
                return Err(Issue::new(
                    IssueKind::MissingDistance,
                    factor::DISTANCE,
                    Severity::Medium,
                    format!(
                        "Rate card row {} prices per km but the SOP declares no distance",
                        rule.row
                    ),
                ));
            };
            rule.rate * distance
        }
        RateBasis::PerTrip => rule.rate * tour.sop.number(factor::TRIPS).unwrap_or(1.0),
        RateBasis::Flat => rule.rate,
    };
    Ok((round_cents(amount), rule.basis))
}

/// Compute expected/actual/variance/accuracy and any payment issue.
pub fn evaluate_payment(tour: &NormalizedTour, config: &CheckConfig) -> PaymentAccuracy {
    let actual = round_cents(tour.settlements.iter().map(|s| s.amount).sum());
    let currency = tour
        .primary_settlement()
        .and_then(|s| s.currency.clone())
        .or_else(|| tour.rate_rule.as_ref().and_then(|r| r.currency.clone()));

    let (expected, basis) = match expected_payment(tour) {
        Ok((e, b)) => (e, b),
        Err(issue) => {
            return PaymentAccuracy {
                expected_payment: None,
                actual_payment: actual,
                variance: None,
                accuracy_percentage: None,
                rate_basis: tour.rate_rule.as_ref().map(|r| r.basis),
                currency,
                issues: vec![issue],
            };
        }
    };

    let variance = round_cents(actual - expected);
    let accuracy = accuracy_percentage(expected, actual);
    let mut issues = Vec::new();

    let denominator = expected.abs().max(actual.abs());
    let beyond_tolerance = variance.abs() > config.tolerance.payment_pct / 100.0 * denominator;
    if !tour.is_unmatched() && beyond_tolerance {
        let severity = if accuracy < config.risk.high_variance_accuracy {
            Severity::High
        } else {
            Severity::Medium
        };
        let direction = if variance < 0.0 { "Underpayment" } else { "Overpayment" };
        issues.push(
            Issue::new(
                IssueKind::PaymentVariance,
                "payment",
                severity,
                format!(
                    "{direction} of {:.2}: expected {expected:.2}, settlement paid {actual:.2} ({accuracy:.1}% accurate)",
                    variance.abs()
                ),
            )
            .values(Some(format!("{expected:.2}")), Some(format!("{actual:.2}"))),
        );
    }

    PaymentAccuracy {
        expected_payment: Some(expected),
        actual_payment: actual,
        variance: Some(variance),
        accuracy_percentage: Some(accuracy),
        rate_basis: Some(basis),
        currency,
        issues,
    }
}

// ---------------------------------------------------------------------------
// SOP-only evaluation
// ---------------------------------------------------------------------------

/// Payment decision for an SOP priced against the rate card, before any
/// settlement exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SopEvaluation {
    pub tour_id: Option<String>,
    pub vehicle_type: Option<String>,
    /// Rate card row the expectation is priced from.
    pub rate_rule_row: Option<usize>,
    pub rate_basis: Option<RateBasis>,
    pub rate: Option<f64>,
    pub currency: Option<String>,
    pub expected_payment: Option<f64>,
    /// Problems that would make any settlement for this tour disputable.
    pub dispute_flags: Vec<Issue>,
}

impl SopEvaluation {
    pub fn is_payable(&self) -> bool {
        self.expected_payment.is_some() && self.dispute_flags.is_empty()
    }
}

/// Price an SOP against the rate card alone and flag what would block payment.
pub fn evaluate_sop(sop: &SopFactors, rate_card: &[RateCardRecord]) -> SopEvaluation {
    let mut dispute_flags = Vec::new();
    let rate_rule = match_rate_rule(sop, rate_card, &mut dispute_flags);
    let tour = NormalizedTour {
        sop: sop.clone(),
        rate_rule,
        settlements: Vec::new(),
        match_method: MatchMethod::Unmatched,
        issues: Vec::new(),
    };

    let expected_payment = match expected_payment(&tour) {
        Ok((amount, _)) => Some(amount),
        Err(issue) => {
            dispute_flags.push(issue);
            None
        }
    };

    let rule = tour.rate_rule.as_ref();
    SopEvaluation {
        tour_id: sop.tour_id(),
        vehicle_type: sop.vehicle_type(),
        rate_rule_row: rule.map(|r| r.row),
        rate_basis: rule.map(|r| r.basis),
        rate: rule.map(|r| r.rate),
        currency: rule.and_then(|r| r.currency.clone()),
        expected_payment,
        dispute_flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FactorValue, MatchMethod, RateCardRecord, SettlementRecord, SopFactors};
    use proptest::prelude::*;

    fn tour(basis: RateBasis, rate: f64, paid: &[f64], sop: &[(&str, &str)]) -> NormalizedTour {
        NormalizedTour {
            sop: sop
                .iter()
                .map(|(k, v)| (k.to_string(), FactorValue::parse_for(k, v)))
                .collect::<SopFactors>(),
            rate_rule: Some(RateCardRecord {
                row: 1,
                vehicle_type: "Truck-10T".into(),
                basis,
                rate,
                currency: Some("USD".into()),
                route: None,
                weight_class: None,
                min_distance: None,
                max_distance: None,
            }),
            settlements: paid
                .iter()
                .enumerate()
                .map(|(i, a)| SettlementRecord {
                    row: i + 1,
                    tour_id: Some("T-1".into()),
                    amount: *a,
                    amount_raw: a.to_string(),
                    currency: Some("USD".into()),
                    vendor: None,
                    timestamp: None,
                    paid_at: None,
                    vehicle_type: None,
                    distance: None,
                    weight_class: None,
                    route: None,
                })
                .collect(),
            match_method: MatchMethod::TourId,
            issues: vec![],
        }
    }

    const SOP: &[(&str, &str)] = &[("vehicle_type", "Truck-10T"), ("distance", "120")];

    #[test]
    fn exact_payment() {
        let p = evaluate_payment(&tour(RateBasis::PerKm, 5.0, &[600.0], SOP), &CheckConfig::default());
        assert_eq!(p.expected_payment, Some(600.0));
        assert_eq!(p.actual_payment, 600.0);
        assert_eq!(p.variance, Some(0.0));
        assert_eq!(p.accuracy_percentage, Some(100.0));
        assert!(p.issues.is_empty());
    }

    #[test]
    fn underpayment_is_medium_variance() {
        let p = evaluate_payment(&tour(RateBasis::PerKm, 5.0, &[450.0], SOP), &CheckConfig::default());
        assert_eq!(p.variance, Some(-150.0));
        assert_eq!(p.accuracy_percentage, Some(75.0));
        assert_eq!(p.issues.len(), 1);
        assert_eq!(p.issues[0].kind, IssueKind::PaymentVariance);
        assert_eq!(p.issues[0].severity, Severity::Medium);
        assert!(p.issues[0].description.starts_with("Underpayment of 150.00"));
    }

    #[test]
    fn large_overpayment_is_high() {
        let p = evaluate_payment(&tour(RateBasis::PerKm, 5.0, &[1500.0], SOP), &CheckConfig::default());
        assert_eq!(p.accuracy_percentage, Some(40.0));
        assert_eq!(p.issues[0].severity, Severity::High);
        assert!(p.issues[0].description.starts_with("Overpayment"));
    }

    #[test]
    fn variance_within_payment_tolerance() {
        let p = evaluate_payment(&tour(RateBasis::PerKm, 5.0, &[597.0], SOP), &CheckConfig::default());
        assert_eq!(p.variance, Some(-3.0));
        assert!(p.issues.is_empty());
    }

    #[test]
    fn split_settlement_rows_are_summed() {
        let p = evaluate_payment(&tour(RateBasis::PerKm, 5.0, &[300.0, 300.0], SOP), &CheckConfig::default());
        assert_eq!(p.actual_payment, 600.0);
        assert!(p.issues.is_empty());
    }

    #[test]
    fn per_trip_uses_trip_count() {
        let sop = &[("vehicle_type", "Truck-10T"), ("trips", "3")];
        let p = evaluate_payment(&tour(RateBasis::PerTrip, 200.0, &[600.0], sop), &CheckConfig::default());
        assert_eq!(p.expected_payment, Some(600.0));
    }

    #[test]
    fn flat_ignores_distance() {
        let p = evaluate_payment(&tour(RateBasis::Flat, 350.0, &[350.0], SOP), &CheckConfig::default());
        assert_eq!(p.expected_payment, Some(350.0));
        assert_eq!(p.rate_basis, Some(RateBasis::Flat));
    }

    #[test]
    fn no_rule_is_indeterminate() {
        let mut t = tour(RateBasis::PerKm, 5.0, &[600.0], SOP);
        t.rate_rule = None;
        let p = evaluate_payment(&t, &CheckConfig::default());
        assert_eq!(p.expected_payment, None);
        assert_eq!(p.variance, None);
        assert_eq!(p.accuracy_percentage, None);
        assert_eq!(p.actual_payment, 600.0);
        assert_eq!(p.issues[0].kind, IssueKind::NoRateRule);
        assert_eq!(p.issues[0].severity, Severity::Medium);
    }

    #[test]
    fn per_km_without_distance_is_indeterminate() {
        let p = evaluate_payment(
            &tour(RateBasis::PerKm, 5.0, &[600.0], &[("vehicle_type", "Truck-10T")]),
            &CheckConfig::default(),
        );
        assert_eq!(p.expected_payment, None);
        assert_eq!(p.issues[0].kind, IssueKind::MissingDistance);
    }

    #[test]
    fn unmatched_tour_pays_zero_without_variance_issue() {
        let p = evaluate_payment(&tour(RateBasis::PerKm, 5.0, &[], SOP), &CheckConfig::default());
        assert_eq!(p.actual_payment, 0.0);
        assert_eq!(p.accuracy_percentage, Some(0.0));
        assert!(p.issues.is_empty());
    }

    #[test]
    fn zero_zero_is_full_accuracy() {
        assert_eq!(accuracy_percentage(0.0, 0.0), 100.0);
    }

    fn rule(row: usize, basis: RateBasis, rate: f64) -> RateCardRecord {
        RateCardRecord {
            row,
            vehicle_type: "Truck-10T".into(),
            basis,
            rate,
            currency: Some("USD".into()),
            route: None,
            weight_class: None,
            min_distance: None,
            max_distance: None,
        }
    }

    fn sop(pairs: &[(&str, &str)]) -> SopFactors {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FactorValue::parse_for(k, v)))
            .collect()
    }

    #[test]
    fn sop_priced_from_rate_card() {
        let eval = evaluate_sop(&sop(SOP), &[rule(1, RateBasis::PerKm, 5.0)]);
        assert_eq!(eval.expected_payment, Some(600.0));
        assert_eq!(eval.rate_rule_row, Some(1));
        assert_eq!(eval.rate_basis, Some(RateBasis::PerKm));
        assert_eq!(eval.currency.as_deref(), Some("USD"));
        assert!(eval.dispute_flags.is_empty());
        assert!(eval.is_payable());
    }

    #[test]
    fn sop_without_distance_is_flagged() {
        let eval = evaluate_sop(&sop(&[("vehicle_type", "Truck-10T")]), &[rule(1, RateBasis::PerKm, 5.0)]);
        assert_eq!(eval.expected_payment, None);
        assert_eq!(eval.dispute_flags.len(), 1);
        assert_eq!(eval.dispute_flags[0].kind, IssueKind::MissingDistance);
        assert!(!eval.is_payable());
    }

    #[test]
    fn sop_with_unpriced_vehicle_is_flagged() {
        let eval = evaluate_sop(&sop(&[("vehicle_type", "Van-3T"), ("distance", "80")]), &[rule(1, RateBasis::PerKm, 5.0)]);
        assert_eq!(eval.rate_rule_row, None);
        assert_eq!(eval.dispute_flags[0].kind, IssueKind::NoRateRule);
    }

    #[test]
    fn sop_with_conflicting_rules_is_flagged_but_priced() {
        let rules = [rule(1, RateBasis::PerKm, 5.0), rule(2, RateBasis::Flat, 900.0)];
        let eval = evaluate_sop(&sop(SOP), &rules);
        assert_eq!(eval.expected_payment, Some(600.0));
        assert_eq!(eval.dispute_flags.len(), 1);
        assert_eq!(eval.dispute_flags[0].kind, IssueKind::AmbiguousRateRule);
        assert!(!eval.is_payable());
    }

    proptest! {
        #[test]
        fn accuracy_is_bounded(expected in -1e9f64..1e9, actual in -1e9f64..1e9) {
            let pct = accuracy_percentage(expected, actual);
            prop_assert!((0.0..=100.0).contains(&pct));
        }

        #[test]
        fn accuracy_is_symmetric(expected in 0f64..1e7, actual in 0f64..1e7) {
            prop_assert_eq!(accuracy_percentage(expected, actual), accuracy_percentage(actual, expected));
        }
    }
}
