//! Field-level consistency checks across SOP, rate card and settlement.

use crate::model::{
    factor, same_text, ComparisonStatus, FactorValue, FieldComparison, Issue, IssueKind,
    NormalizedTour, Severity,
};

/// Fields compared across sources, in report order.
pub const COMPARED_FIELDS: &[&str] = &[
    factor::TOUR_ID,
    factor::VEHICLE_TYPE,
    factor::DISTANCE,
    factor::WEIGHT_CLASS,
    factor::ROUTE,
    factor::CURRENCY,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Sop,
    RateCard,
    Settlement,
}

impl Source {
    fn label(&self, tour: &NormalizedTour) -> String {
        match self {
            Self::Sop => "SOP".into(),
            Self::RateCard => match &tour.rate_rule {
                Some(r) => format!("rate card row {}", r.row),
                None => "rate card".into(),
            },
            Self::Settlement => match tour.primary_settlement() {
                Some(s) => format!("settlement row {}", s.row),
                None => "settlement".into(),
            },
        }
    }
}

/// Typed values for one field from each source.
struct FieldValues {
    sop: Option<FactorValue>,
    rate_card: Option<FactorValue>,
    /// Display-only rate card text for conditions that are not a single value.
    rate_card_display: Option<String>,
    settlement: Option<FactorValue>,
}

fn field_values(tour: &NormalizedTour, field: &str) -> FieldValues {
    let sop = tour.sop.get(field).cloned();
    let rule = tour.rate_rule.as_ref();
    let settlement = tour.primary_settlement();
    let text = |s: &Option<String>| s.as_ref().map(|v| FactorValue::Text(v.clone()));

    let (rate_card, rate_card_display, settlement) = match field {
        factor::TOUR_ID => (None, None, settlement.and_then(|s| text(&s.tour_id))),
        factor::VEHICLE_TYPE => (
            rule.map(|r| FactorValue::Text(r.vehicle_type.clone())),
            None,
            settlement.and_then(|s| text(&s.vehicle_type)),
        ),
        factor::DISTANCE => (
            None,
            rule.and_then(|r| distance_band(r.min_distance, r.max_distance)),
            settlement.and_then(|s| s.distance.map(FactorValue::Number)),
        ),
        factor::WEIGHT_CLASS => (
            rule.and_then(|r| r.weight_class.clone()),
            None,
            settlement.and_then(|s| s.weight_class.clone()),
        ),
        factor::ROUTE => (
            rule.and_then(|r| text(&r.route)),
            None,
            settlement.and_then(|s| text(&s.route)),
        ),
        factor::CURRENCY => (
            rule.and_then(|r| text(&r.currency)),
            None,
            settlement.and_then(|s| text(&s.currency)),
        ),
        _ => (None, None, None),
    };

    FieldValues { sop, rate_card, rate_card_display, settlement }
}

fn distance_band(min: Option<f64>, max: Option<f64>) -> Option<String> {
    let fmt = |v: f64| FactorValue::Number(v).to_string();
    match (min, max) {
        (Some(a), Some(b)) => Some(format!("{}-{}", fmt(a), fmt(b))),
        (Some(a), None) => Some(format!(">= {}", fmt(a))),
        (None, Some(b)) => Some(format!("<= {}", fmt(b))),
        (None, None) => None,
    }
}

/// Outcome of comparing two values of the same field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Agreement {
    Equal,
    WithinTolerance,
    Differs,
}

fn compare(a: &FactorValue, b: &FactorValue, tolerance_pct: f64) -> Agreement {
    match (a, b) {
        (FactorValue::Number(x), FactorValue::Number(y)) => {
            if x == y {
                Agreement::Equal
            } else if (x - y).abs() <= tolerance_pct / 100.0 * x.abs().max(y.abs()) {
                Agreement::WithinTolerance
            } else {
                Agreement::Differs
            }
        }
        _ => {
            if same_text(&a.to_string(), &b.to_string()) {
                Agreement::Equal
            } else {
                Agreement::Differs
            }
        }
    }
}

/// Result of checking one field: its comparison row and at most one issue.
struct FieldCheck {
    comparison: FieldComparison,
    issue: Option<Issue>,
}

fn check_field(tour: &NormalizedTour, field: &str, tolerance_pct: f64) -> FieldCheck {
    let values = field_values(tour, field);
    let settlement_matched = !tour.is_unmatched();

    // Present values in comparison order; the first one is the reference.
    let present: Vec<(Source, &FactorValue)> = [
        (Source::Sop, values.sop.as_ref()),
        (Source::Settlement, values.settlement.as_ref()),
        (Source::RateCard, values.rate_card.as_ref()),
    ]
    .into_iter()
    .filter_map(|(src, v)| v.map(|v| (src, v)))
    .collect();

    let mut status = if present.len() >= 2 {
        ComparisonStatus::Match
    } else {
        ComparisonStatus::NotCompared
    };
    let mut issue = None;

    if let Some(&(ref_src, reference)) = present.first() {
        for &(src, value) in &present[1..] {
            match compare(reference, value, tolerance_pct) {
                Agreement::Equal => {}
                Agreement::WithinTolerance => status = ComparisonStatus::WithinTolerance,
                Agreement::Differs => {
                    status = ComparisonStatus::Mismatch;
                    issue = Some(mismatch_issue(tour, field, (ref_src, reference), (src, value)));
                    break;
                }
            }
        }
    }

    // Declared on exactly one of SOP / matched settlement row. Currency is a
    // settlement/rate-card attribute; an SOP that omits it is not incomplete.
    if issue.is_none()
        && settlement_matched
        && field != factor::CURRENCY
        && values.sop.is_some() != values.settlement.is_some()
    {
        status = ComparisonStatus::Missing;
        let (has, lacks) = if values.sop.is_some() {
            (Source::Sop, Source::Settlement)
        } else {
            (Source::Settlement, Source::Sop)
        };
        let declared = values.sop.as_ref().or(values.settlement.as_ref()).map(|v| v.to_string());
        issue = Some(
            Issue::new(
                IssueKind::MissingField,
                field,
                Severity::Low,
                format!(
                    "{} is declared in the {} but missing from the {}",
                    field_label(field),
                    has.label(tour),
                    lacks.label(tour)
                ),
            )
            .values(declared.clone().filter(|_| has == Source::Sop), declared.filter(|_| has == Source::Settlement)),
        );
    }

    let show = |v: &Option<FactorValue>| v.as_ref().map(|v| v.to_string());
    FieldCheck {
        comparison: FieldComparison {
            field: field.to_string(),
            sop: show(&values.sop),
            rate_card: show(&values.rate_card).or(values.rate_card_display),
            settlement: show(&values.settlement),
            status,
        },
        issue,
    }
}

fn mismatch_issue(
    tour: &NormalizedTour,
    field: &str,
    (ref_src, reference): (Source, &FactorValue),
    (src, value): (Source, &FactorValue),
) -> Issue {
    let (kind, severity) = match field {
        factor::TOUR_ID => (IssueKind::IdentifierMismatch, Severity::High),
        factor::VEHICLE_TYPE => (IssueKind::VehicleTypeMismatch, Severity::High),
        _ if reference.as_number().is_some() && value.as_number().is_some() => {
            (IssueKind::NumericMismatch, Severity::Medium)
        }
        _ => (IssueKind::CategoricalMismatch, Severity::Medium),
    };
    Issue::new(
        kind,
        field,
        severity,
        format!(
            "{} mismatch: {} has {}, {} has {}",
            field_label(field),
            ref_src.label(tour),
            reference,
            src.label(tour),
            value
        ),
    )
    .values(Some(reference.to_string()), Some(value.to_string()))
}

fn field_label(field: &str) -> &str {
    match field {
        factor::TOUR_ID => "Tour ID",
        factor::VEHICLE_TYPE => "Vehicle type",
        factor::DISTANCE => "Distance",
        factor::WEIGHT_CLASS => "Weight class",
        factor::ROUTE => "Route",
        factor::CURRENCY => "Currency",
        other => other,
    }
}

/// Per-field comparison table for a tour (SOP vs rate card vs settlement).
pub fn compare_fields(tour: &NormalizedTour, tolerance_pct: f64) -> Vec<FieldComparison> {
    COMPARED_FIELDS
        .iter()
        .map(|f| check_field(tour, f, tolerance_pct).comparison)
        .collect()
}

/// Consistency issues for a tour, at most one per compared field, in field order.
pub fn check_consistency(tour: &NormalizedTour, tolerance_pct: f64) -> Vec<Issue> {
    COMPARED_FIELDS
        .iter()
        .filter_map(|f| check_field(tour, f, tolerance_pct).issue)
        .collect()
}
