//! Record normalization: join one SOP with its rate-card rule and settlement row(s).

use log::debug;

use crate::error::ReconError;
use crate::model::{
    factor, same_text, FactorValue, Issue, IssueKind, MatchMethod, NormalizedTour,
    RateCardRecord, SettlementRecord, Severity, SopFactors,
};

/// Scores how well a settlement row describes the tour declared by an SOP.
/// Higher is better; `0.0` means no evidence at all.
pub trait MatchScorer {
    fn score(&self, sop: &SopFactors, settlement: &SettlementRecord) -> f64;
}

/// One point per attribute declared on both sides with exactly equal values:
/// vehicle type, distance, weight class, route.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeScorer;

impl MatchScorer for AttributeScorer {
    fn score(&self, sop: &SopFactors, s: &SettlementRecord) -> f64 {
        let mut score = 0.0;
        if let (Some(a), Some(b)) = (sop.vehicle_type(), s.vehicle_type.as_deref()) {
            if same_text(&a, b) {
                score += 1.0;
            }
        }
        if let (Some(a), Some(b)) = (sop.distance(), s.distance) {
            if a == b {
                score += 1.0;
            }
        }
        if let (Some(a), Some(b)) = (sop.get(factor::WEIGHT_CLASS), s.weight_class.as_ref()) {
            if values_equal(a, b) {
                score += 1.0;
            }
        }
        if let (Some(a), Some(b)) = (sop.route(), s.route.as_deref()) {
            if same_text(&a, b) {
                score += 1.0;
            }
        }
        score
    }
}

fn values_equal(a: &FactorValue, b: &FactorValue) -> bool {
    match (a, b) {
        (FactorValue::Number(x), FactorValue::Number(y)) => x == y,
        _ => same_text(&a.to_string(), &b.to_string()),
    }
}

/// Join the SOP with the best rate rule and settlement row(s) using the default scorer.
pub fn normalize(
    sop: &SopFactors,
    rate_card: &[RateCardRecord],
    settlements: &[SettlementRecord],
) -> Result<NormalizedTour, ReconError> {
    normalize_with(sop, rate_card, settlements, &AttributeScorer)
}

/// Join the SOP with the best rate rule and settlement row(s).
///
/// Settlement rows are joined by tour id when both sides carry one; otherwise
/// the scorer picks the single best row, earliest row on ties. Matching
/// problems are reported as issues on the returned tour, never as errors.
pub fn normalize_with(
    sop: &SopFactors,
    rate_card: &[RateCardRecord],
    settlements: &[SettlementRecord],
    scorer: &dyn MatchScorer,
) -> Result<NormalizedTour, ReconError> {
    if sop.tour_id().is_none() && sop.vehicle_type().is_none() && sop.route().is_none() {
        return Err(ReconError::NoMatch(
            "SOP declares no tour id, vehicle type or route to join on".into(),
        ));
    }

    let mut issues = Vec::new();
    let (matched, match_method) = match_settlements(sop, settlements, scorer, &mut issues);
    let rate_rule = match_rate_rule(sop, rate_card, &mut issues);

    if matched.is_empty() {
        let id = sop.tour_id();
        let description = match &id {
            Some(id) => format!("No settlement record found for tour {id}"),
            None => "No settlement record matches the SOP's vehicle, distance, weight or route".into(),
        };
        issues.insert(
            0,
            Issue::new(IssueKind::UnmatchedSettlement, factor::TOUR_ID, Severity::High, description)
                .values(id, None),
        );
    }

    debug!(
        "normalized tour {:?}: method={match_method}, settlements={}, rate_rule={:?}",
        sop.tour_id(),
        matched.len(),
        rate_rule.as_ref().map(|r| r.row),
    );

    Ok(NormalizedTour {
        sop: sop.clone(),
        rate_rule,
        settlements: matched,
        match_method,
        issues,
    })
}

fn match_settlements(
    sop: &SopFactors,
    settlements: &[SettlementRecord],
    scorer: &dyn MatchScorer,
    issues: &mut Vec<Issue>,
) -> (Vec<SettlementRecord>, MatchMethod) {
    let sop_id = sop.tour_id();
    let any_ids = settlements.iter().any(|s| s.tour_id.is_some());

    if let (Some(id), true) = (&sop_id, any_ids) {
        let matched: Vec<SettlementRecord> = settlements
            .iter()
            .filter(|s| s.tour_id.as_deref().is_some_and(|t| same_text(t, id)))
            .cloned()
            .collect();
        if matched.is_empty() {
            return (matched, MatchMethod::Unmatched);
        }
        if matched.len() > 1 {
            let rows: Vec<String> = matched.iter().map(|s| s.row.to_string()).collect();
            issues.push(
                Issue::new(
                    IssueKind::DuplicateSettlement,
                    factor::TOUR_ID,
                    Severity::Medium,
                    format!(
                        "Tour {id} appears in {} settlement rows ({}); possible duplicate payment",
                        matched.len(),
                        rows.join(", ")
                    ),
                )
                .values(Some("1 row".into()), Some(format!("{} rows", matched.len()))),
            );
        }
        return (matched, MatchMethod::TourId);
    }

    // No usable identifier on one side: best attribute score, earliest row on ties.
    let mut best: Option<(usize, f64)> = None;
    let mut runner_up: Option<usize> = None;
    for (i, s) in settlements.iter().enumerate() {
        let score = scorer.score(sop, s);
        match best {
            Some((_, b)) if score > b => {
                best = Some((i, score));
                runner_up = None;
            }
            Some((_, b)) if score == b => {
                if runner_up.is_none() {
                    runner_up = Some(i);
                }
            }
            Some(_) => {}
            None => best = Some((i, score)),
        }
    }

    match best {
        Some((i, score)) if score > 0.0 => {
            let chosen = &settlements[i];
            if let Some(r) = runner_up {
                let other = &settlements[r];
                issues.push(Issue::new(
                    IssueKind::AmbiguousSettlementMatch,
                    "settlement",
                    Severity::Low,
                    format!(
                        "Settlement rows {} and {} match the SOP equally well (score {score}); row {} was used",
                        chosen.row, other.row, chosen.row
                    ),
                ));
            }
            (vec![chosen.clone()], MatchMethod::Attributes)
        }
        _ => (Vec::new(), MatchMethod::Unmatched),
    }
}

/// Pick the most specific rate rule for the SOP's vehicle type whose
/// conditions do not contradict the SOP. Earliest row wins ties.
pub fn match_rate_rule(
    sop: &SopFactors,
    rate_card: &[RateCardRecord],
    issues: &mut Vec<Issue>,
) -> Option<RateCardRecord> {
    let vehicle = sop.vehicle_type()?;

    let mut best: Option<(&RateCardRecord, usize)> = None;
    let mut tied: Vec<&RateCardRecord> = Vec::new();
    for rule in rate_card.iter().filter(|r| same_text(&r.vehicle_type, &vehicle)) {
        let Some(specificity) = rule_specificity(sop, rule) else {
            continue;
        };
        match best {
            Some((_, b)) if specificity > b => {
                best = Some((rule, specificity));
                tied.clear();
            }
            Some((_, b)) if specificity == b => tied.push(rule),
            Some(_) => {}
            None => best = Some((rule, specificity)),
        }
    }

    let (chosen, _) = best?;
    if let Some(conflict) = tied
        .iter()
        .find(|r| r.rate != chosen.rate || r.basis != chosen.basis)
    {
        issues.push(
            Issue::new(
                IssueKind::AmbiguousRateRule,
                "rate",
                Severity::Medium,
                format!(
                    "Rate card rows {} and {} both apply to {vehicle} with different pricing ({} {} vs {} {}); row {} was used",
                    chosen.row, conflict.row, chosen.rate, chosen.basis, conflict.rate, conflict.basis, chosen.row
                ),
            )
            .values(
                Some(format!("{} {}", chosen.rate, chosen.basis)),
                Some(format!("{} {}", conflict.rate, conflict.basis)),
            ),
        );
    }
    Some(chosen.clone())
}

/// Number of rule conditions satisfied by the SOP, or `None` if a declared
/// condition contradicts it. Conditions the SOP is silent on neither count
/// nor exclude.
fn rule_specificity(sop: &SopFactors, rule: &RateCardRecord) -> Option<usize> {
    let mut satisfied = 0;

    if let (Some(cond), Some(actual)) = (&rule.route, sop.route()) {
        if !same_text(cond, &actual) {
            return None;
        }
        satisfied += 1;
    }
    if let (Some(cond), Some(actual)) = (&rule.weight_class, sop.get(factor::WEIGHT_CLASS)) {
        if !values_equal(cond, actual) {
            return None;
        }
        satisfied += 1;
    }
    if rule.min_distance.is_some() || rule.max_distance.is_some() {
        if let Some(d) = sop.distance() {
            if rule.min_distance.is_some_and(|min| d < min) || rule.max_distance.is_some_and(|max| d > max) {
                return None;
            }
            satisfied += 1;
        }
    }

    Some(satisfied)
}
