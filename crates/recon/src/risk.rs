//! Severity-weighted risk score and tier.

use crate::config::RiskConfig;
use crate::model::{round_cents, Issue, RiskAssessment, Severity};

pub const MAX_SCORE: f64 = 10.0;

/// Tier for a score: below `medium_from` is low, above `high_above` is high.
pub fn tier_for(score: f64, config: &RiskConfig) -> Severity {
    if score < config.medium_from {
        Severity::Low
    } else if score > config.high_above {
        Severity::High
    } else {
        Severity::Medium
    }
}

/// Penalty for the tightest accuracy threshold the payment falls below.
pub fn accuracy_penalty(accuracy: Option<f64>, config: &RiskConfig) -> f64 {
    let Some(accuracy) = accuracy else {
        return 0.0;
    };
    let mut penalties: Vec<_> = config.accuracy_penalties.iter().collect();
    penalties.sort_by(|a, b| a.below.total_cmp(&b.below));
    penalties
        .into_iter()
        .find(|p| accuracy < p.below)
        .map(|p| p.penalty)
        .unwrap_or(0.0)
}

/// Score the issues found for one tour.
///
/// `risk_factors` is the issue list verbatim, in the order given. Every weight
/// is positive, so adding an issue never lowers the score.
pub fn score_risk(issues: &[Issue], accuracy: Option<f64>, config: &RiskConfig) -> RiskAssessment {
    let points: f64 = issues.iter().map(|i| config.weights.weight(i.severity)).sum();
    let base = (points / config.points_for_max_score * MAX_SCORE).min(MAX_SCORE);
    let penalty = accuracy_penalty(accuracy, config);
    let score = round_cents((base + penalty).min(MAX_SCORE));

    RiskAssessment {
        overall_risk_score: score,
        severity: tier_for(score, config),
        accuracy_penalty: penalty,
        risk_factors: issues.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IssueKind;
    use proptest::prelude::*;

    fn issue(severity: Severity) -> Issue {
        Issue::new(IssueKind::NumericMismatch, "distance", severity, "test")
    }

    #[test]
    fn no_issues_full_accuracy_is_zero() {
        let r = score_risk(&[], Some(100.0), &RiskConfig::default());
        assert_eq!(r.overall_risk_score, 0.0);
        assert_eq!(r.severity, Severity::Low);
        assert!(r.risk_factors.is_empty());
    }

    #[test]
    fn single_high_issue_is_high_tier() {
        let r = score_risk(&[issue(Severity::High)], Some(100.0), &RiskConfig::default());
        assert_eq!(r.overall_risk_score, 7.5);
        assert_eq!(r.severity, Severity::High);
    }

    #[test]
    fn medium_variance_with_penalty_is_at_least_medium() {
        let r = score_risk(&[issue(Severity::Medium)], Some(75.0), &RiskConfig::default());
        assert_eq!(r.accuracy_penalty, 2.0);
        assert_eq!(r.overall_risk_score, 7.0);
        assert!(r.severity >= Severity::Medium);
    }

    #[test]
    fn tightest_penalty_applies() {
        let cfg = RiskConfig::default();
        assert_eq!(accuracy_penalty(Some(40.0), &cfg), 4.0);
        assert_eq!(accuracy_penalty(Some(79.99), &cfg), 2.0);
        assert_eq!(accuracy_penalty(Some(80.0), &cfg), 0.0);
        assert_eq!(accuracy_penalty(None, &cfg), 0.0);
    }

    #[test]
    fn score_is_capped() {
        let issues = vec![issue(Severity::High); 5];
        let r = score_risk(&issues, Some(0.0), &RiskConfig::default());
        assert_eq!(r.overall_risk_score, MAX_SCORE);
    }

    #[test]
    fn tier_boundaries() {
        let cfg = RiskConfig::default();
        assert_eq!(tier_for(2.99, &cfg), Severity::Low);
        assert_eq!(tier_for(3.0, &cfg), Severity::Medium);
        assert_eq!(tier_for(6.0, &cfg), Severity::Medium);
        assert_eq!(tier_for(6.01, &cfg), Severity::High);
    }

    #[test]
    fn risk_factors_keep_order() {
        let issues = vec![issue(Severity::Low), issue(Severity::High)];
        let r = score_risk(&issues, None, &RiskConfig::default());
        assert_eq!(r.risk_factors, issues);
    }

    fn severity() -> impl Strategy<Value = Severity> {
        prop_oneof![Just(Severity::Low), Just(Severity::Medium), Just(Severity::High)]
    }

    proptest! {
        #[test]
        fn adding_an_issue_never_lowers_the_score(
            existing in proptest::collection::vec(severity(), 0..6),
            extra in severity(),
            accuracy in proptest::option::of(0f64..=100.0),
        ) {
            let cfg = RiskConfig::default();
            let before: Vec<Issue> = existing.into_iter().map(issue).collect();
            let mut after = before.clone();
            after.push(issue(extra));
            let a = score_risk(&before, accuracy, &cfg);
            let b = score_risk(&after, accuracy, &cfg);
            prop_assert!(b.overall_risk_score >= a.overall_risk_score);
            prop_assert!(b.severity >= a.severity);
            prop_assert!((0.0..=MAX_SCORE).contains(&b.overall_risk_score));
        }
    }
}
