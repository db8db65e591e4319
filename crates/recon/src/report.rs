//! Report projection: `ReconciliationResult` → logical workbook.
//!
//! One projection per [`ReportKind`]; rendering to `.xlsx` lives in
//! [`crate::export`] and is shared by every kind.

use std::fmt;

use serde::Serialize;

use crate::model::{ReconciliationResult, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    TourAnalysis,
    Payment,
    Dispute,
}

impl ReportKind {
    pub const ALL: [ReportKind; 3] = [Self::TourAnalysis, Self::Payment, Self::Dispute];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "tour_analysis" | "tour" => Some(Self::TourAnalysis),
            "payment" => Some(Self::Payment),
            "dispute" => Some(Self::Dispute),
            _ => None,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Self::TourAnalysis => "tour_analysis_report.xlsx",
            Self::Payment => "payment_report.xlsx",
            Self::Dispute => "dispute_report.xlsx",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TourAnalysis => write!(f, "tour_analysis"),
            Self::Payment => write!(f, "payment"),
            Self::Dispute => write!(f, "dispute"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logical workbook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    fn opt_text(s: Option<&str>) -> Self {
        s.map(Self::text).unwrap_or(Self::Empty)
    }

    fn opt_number(n: Option<f64>) -> Self {
        n.map(Self::Number).unwrap_or_else(|| Self::text("n/a"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub header: Vec<String>,
    /// Rows may be shorter than the header; missing trailing cells are blank.
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    fn new(name: &str, header: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            header: header.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    fn push(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    fn blank(&mut self) {
        self.rows.push(Vec::new());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

// ---------------------------------------------------------------------------
// Projections
// ---------------------------------------------------------------------------

pub fn project(result: &ReconciliationResult, kind: ReportKind) -> Workbook {
    let sheets = match kind {
        ReportKind::TourAnalysis => vec![field_comparison_sheet(result), summary_sheet(result)],
        ReportKind::Payment => vec![payment_sheet(result)],
        ReportKind::Dispute => vec![dispute_sheet(result)],
    };
    Workbook { sheets }
}

fn field_comparison_sheet(result: &ReconciliationResult) -> Sheet {
    let mut sheet = Sheet::new("Field Comparison", &["Field", "SOP", "Rate Card", "Settlement", "Status"]);
    for c in &result.field_comparisons {
        sheet.push(vec![
            Cell::text(&c.field),
            Cell::opt_text(c.sop.as_deref()),
            Cell::opt_text(c.rate_card.as_deref()),
            Cell::opt_text(c.settlement.as_deref()),
            Cell::text(c.status.to_string()),
        ]);
    }
    sheet
}

fn summary_sheet(result: &ReconciliationResult) -> Sheet {
    let risk = &result.risk_assessment;
    let pay = &result.payment_accuracy;
    let mut sheet = Sheet::new("Summary", &["Metric", "Value"]);

    sheet.push(vec![Cell::text("Tour ID"), Cell::opt_text(result.data_summary.tour_id.as_deref())]);
    sheet.push(vec![Cell::text("Match Method"), Cell::text(result.data_summary.match_method.to_string())]);
    sheet.push(vec![Cell::text("Risk Score"), Cell::Number(risk.overall_risk_score)]);
    sheet.push(vec![Cell::text("Risk Tier"), Cell::text(risk.severity.to_string())]);
    sheet.push(vec![Cell::text("Issues"), Cell::Number(risk.risk_factors.len() as f64)]);
    sheet.push(vec![Cell::text("Expected Payment"), Cell::opt_number(pay.expected_payment)]);
    sheet.push(vec![Cell::text("Actual Payment"), Cell::Number(pay.actual_payment)]);
    sheet.push(vec![Cell::text("Variance"), Cell::opt_number(pay.variance)]);
    sheet.push(vec![Cell::text("Accuracy %"), Cell::opt_number(pay.accuracy_percentage)]);

    if !result.recommendations.is_empty() {
        sheet.blank();
        for r in &result.recommendations {
            sheet.push(vec![Cell::text("Recommendation"), Cell::text(r)]);
        }
    }
    if !result.insights.is_empty() {
        sheet.blank();
        for i in &result.insights {
            sheet.push(vec![Cell::text("Insight"), Cell::text(i)]);
        }
    }
    sheet
}

/// Settlement figures are copied as loaded; the amount column is the raw cell text.
fn payment_sheet(result: &ReconciliationResult) -> Sheet {
    let pay = &result.payment_accuracy;
    let mut sheet = Sheet::new(
        "Payment",
        &["Row", "Tour ID", "Actual Payment", "Currency", "Vendor", "Timestamp"],
    );
    for s in &result.data_summary.matched_settlements {
        sheet.push(vec![
            Cell::Number(s.row as f64),
            Cell::opt_text(s.tour_id.as_deref()),
            Cell::text(&s.amount_raw),
            Cell::opt_text(s.currency.as_deref()),
            Cell::opt_text(s.vendor.as_deref()),
            Cell::opt_text(s.timestamp.as_deref()),
        ]);
    }

    sheet.blank();
    let summary = |label: &str, value: Cell| vec![Cell::text(label), Cell::Empty, value];
    sheet.push(summary("Expected Payment", Cell::opt_number(pay.expected_payment)));
    sheet.push(summary("Total Paid", Cell::Number(pay.actual_payment)));
    sheet.push(summary("Variance", Cell::opt_number(pay.variance)));
    sheet.push(summary("Accuracy %", Cell::opt_number(pay.accuracy_percentage)));
    if let Some(basis) = pay.rate_basis {
        sheet.push(summary("Rate Basis", Cell::text(basis.to_string())));
    }
    sheet
}

/// Medium and high issues, most severe first, then the recommendation list.
fn dispute_sheet(result: &ReconciliationResult) -> Sheet {
    let mut sheet = Sheet::new(
        "Disputes",
        &["Severity", "Issue", "Field", "Expected", "Observed", "Description"],
    );
    let mut disputes: Vec<_> = result
        .risk_assessment
        .risk_factors
        .iter()
        .filter(|i| i.severity >= Severity::Medium)
        .collect();
    disputes.sort_by(|a, b| b.severity.cmp(&a.severity));

    for i in disputes {
        sheet.push(vec![
            Cell::text(i.severity.to_string()),
            Cell::text(i.kind.to_string()),
            Cell::text(&i.field),
            Cell::opt_text(i.expected.as_deref()),
            Cell::opt_text(i.observed.as_deref()),
            Cell::text(&i.description),
        ]);
    }

    if !result.recommendations.is_empty() {
        sheet.blank();
        sheet.push(vec![Cell::text("Recommendations")]);
        for r in &result.recommendations {
            sheet.push(vec![Cell::text(r)]);
        }
    }
    sheet
}
