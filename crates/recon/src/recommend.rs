//! Recommendations and narrative insights.
//!
//! An ordered rule table: every rule whose condition holds contributes its
//! recommendation and/or insight, in table order. Templates take
//! `{score}` `{tier}` `{accuracy}` `{variance}` `{expected}` `{actual}` `{issue_count}`.

use crate::model::{IssueKind, PaymentAccuracy, RiskAssessment, Severity};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Condition {
    Tier(Severity),
    HasIssue(IssueKind),
    AccuracyBelow(f64),
    AccuracyKnown,
    NoIssues,
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub when: Condition,
    pub recommendation: Option<&'static str>,
    pub insight: Option<&'static str>,
}

const fn rule(when: Condition, recommendation: Option<&'static str>, insight: Option<&'static str>) -> Rule {
    Rule { when, recommendation, insight }
}

pub const RULES: &[Rule] = &[
    rule(
        Condition::Tier(Severity::High),
        Some("Hold payment and escalate the tour for manual review (risk {score}/10)."),
        Some("Overall risk is {tier} at {score}/10 from {issue_count} issue(s)."),
    ),
    rule(
        Condition::Tier(Severity::Medium),
        Some("Review the flagged discrepancies before approving payment."),
        Some("Overall risk is {tier} at {score}/10 from {issue_count} issue(s)."),
    ),
    rule(
        Condition::Tier(Severity::Low),
        None,
        Some("Overall risk is {tier} at {score}/10 from {issue_count} issue(s)."),
    ),
    rule(
        Condition::NoIssues,
        Some("Approve payment; all sources agree."),
        Some("All compared fields agree within tolerance."),
    ),
    rule(
        Condition::HasIssue(IssueKind::UnmatchedSettlement),
        Some("Locate the settlement record for this tour; no payment could be matched."),
        Some("No settlement row matched the SOP, so the actual payment is {actual}."),
    ),
    rule(
        Condition::HasIssue(IssueKind::DuplicateSettlement),
        Some("Check for a duplicate payment: several settlement rows carry this tour id."),
        None,
    ),
    rule(
        Condition::HasIssue(IssueKind::AmbiguousSettlementMatch),
        Some("Confirm the settlement row by hand; attribute matching was ambiguous."),
        None,
    ),
    rule(
        Condition::HasIssue(IssueKind::AmbiguousRateRule),
        Some("Remove conflicting duplicate rules from the rate card."),
        None,
    ),
    rule(
        Condition::HasIssue(IssueKind::IdentifierMismatch),
        Some("Verify the tour id recorded on the settlement against the SOP."),
        None,
    ),
    rule(
        Condition::HasIssue(IssueKind::VehicleTypeMismatch),
        Some("Verify which vehicle was deployed; the billed vehicle type differs from the SOP."),
        None,
    ),
    rule(
        Condition::HasIssue(IssueKind::NumericMismatch),
        Some("Reconcile distance and weight figures with the transporter."),
        None,
    ),
    rule(
        Condition::HasIssue(IssueKind::CategoricalMismatch),
        Some("Confirm the route and currency with the vendor."),
        None,
    ),
    rule(
        Condition::HasIssue(IssueKind::MissingField),
        Some("Fill in the fields missing from the SOP or settlement report."),
        None,
    ),
    rule(
        Condition::HasIssue(IssueKind::NoRateRule),
        Some("Add a rate card rule for this vehicle type so the payment can be verified."),
        Some("Expected payment could not be determined."),
    ),
    rule(
        Condition::HasIssue(IssueKind::MissingDistance),
        Some("Record the tour distance in the SOP; the applicable rate is priced per km."),
        Some("Expected payment could not be determined."),
    ),
    rule(
        Condition::HasIssue(IssueKind::PaymentVariance),
        Some("Settle the payment difference of {variance} with the vendor."),
        None,
    ),
    rule(
        Condition::AccuracyBelow(50.0),
        Some("Raise a payment dispute with the vendor."),
        None,
    ),
    rule(
        Condition::AccuracyKnown,
        None,
        Some("Payment accuracy is {accuracy}% (expected {expected}, paid {actual})."),
    ),
];

struct Context<'a> {
    payment: &'a PaymentAccuracy,
    risk: &'a RiskAssessment,
}

impl Context<'_> {
    fn holds(&self, condition: Condition) -> bool {
        match condition {
            Condition::Tier(tier) => self.risk.severity == tier,
            Condition::HasIssue(kind) => self.risk.risk_factors.iter().any(|i| i.kind == kind),
            Condition::AccuracyBelow(limit) => {
                self.payment.accuracy_percentage.is_some_and(|a| a < limit)
            }
            Condition::AccuracyKnown => self.payment.accuracy_percentage.is_some(),
            Condition::NoIssues => self.risk.risk_factors.is_empty(),
        }
    }

    fn render(&self, template: &str) -> String {
        let money = |v: Option<f64>| v.map(|n| format!("{n:.2}")).unwrap_or_else(|| "n/a".into());
        template
            .replace("{score}", &format!("{:.1}", self.risk.overall_risk_score))
            .replace("{tier}", &self.risk.severity.to_string())
            .replace(
                "{accuracy}",
                &self
                    .payment
                    .accuracy_percentage
                    .map(|a| format!("{a:.1}"))
                    .unwrap_or_else(|| "n/a".into()),
            )
            .replace("{variance}", &money(self.payment.variance.map(f64::abs)))
            .replace("{expected}", &money(self.payment.expected_payment))
            .replace("{actual}", &money(Some(self.payment.actual_payment)))
            .replace("{issue_count}", &self.risk.risk_factors.len().to_string())
    }
}

/// Evaluate [`RULES`] against a scored result.
/// Returns `(recommendations, insights)` with exact duplicates dropped.
pub fn recommend(payment: &PaymentAccuracy, risk: &RiskAssessment) -> (Vec<String>, Vec<String>) {
    recommend_with(RULES, payment, risk)
}

pub fn recommend_with(
    rules: &[Rule],
    payment: &PaymentAccuracy,
    risk: &RiskAssessment,
) -> (Vec<String>, Vec<String>) {
    let ctx = Context { payment, risk };
    let mut recommendations: Vec<String> = Vec::new();
    let mut insights: Vec<String> = Vec::new();

    for rule in rules.iter().filter(|r| ctx.holds(r.when)) {
        if let Some(text) = rule.recommendation.map(|t| ctx.render(t)) {
            if !recommendations.contains(&text) {
                recommendations.push(text);
            }
        }
        if let Some(text) = rule.insight.map(|t| ctx.render(t)) {
            if !insights.contains(&text) {
                insights.push(text);
            }
        }
    }
    (recommendations, insights)
}
