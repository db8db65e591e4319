use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Factor values
// ---------------------------------------------------------------------------

/// Canonical factor names shared by the SOP extractor and the tabular loaders.
pub mod factor {
    pub const TOUR_ID: &str = "tour_id";
    pub const VEHICLE_TYPE: &str = "vehicle_type";
    pub const DISTANCE: &str = "distance";
    pub const WEIGHT_CLASS: &str = "weight_class";
    pub const ROUTE: &str = "route";
    pub const TRIPS: &str = "trips";
    pub const CURRENCY: &str = "currency";

    /// Factors that are identifiers or labels and must never be coerced to numbers.
    pub const CATEGORICAL: &[&str] = &[TOUR_ID, VEHICLE_TYPE, ROUTE, CURRENCY];
}

/// A single SOP factor or tabular attribute: numeric or categorical.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FactorValue {
    Number(f64),
    Text(String),
}

impl FactorValue {
    /// Parse a raw cell/line value. Leading currency symbols, thousands separators
    /// and trailing units are accepted for numbers (`"1,200.5 km"` → 1200.5).
    pub fn parse(raw: &str) -> Self {
        match parse_number(raw) {
            Some(n) => Self::Number(n),
            None => Self::Text(raw.trim().to_string()),
        }
    }

    /// Parse a value for a named factor, keeping categorical factors as text.
    pub fn parse_for(name: &str, raw: &str) -> Self {
        if factor::CATEGORICAL.contains(&name) {
            Self::Text(raw.trim().to_string())
        } else {
            Self::parse(raw)
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }
}

impl fmt::Display for FactorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Lenient number parse: `$1,200.50`, `120 km`, `8T`, `-150`, `($150.00)`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    // Accounting negative: the parenthesized amount must itself be unsigned.
    if let Some(inner) = s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        let inner = inner.trim();
        if inner.starts_with(['-', '+']) {
            return None;
        }
        return parse_number(inner).map(|n| 0.0 - n);
    }
    let s = s.trim_start_matches(|c: char| matches!(c, '$' | '€' | '£' | '₹' | '¥'));
    let s = s.trim_start();
    let end = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '+')))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(end);
    if num.is_empty() || !num.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    // Units are alphabetic words (km, tons, T); anything else means this is not a number.
    if !unit.trim().chars().all(|c| c.is_alphabetic() || c == ' ' || c == '.' || c == '/') {
        return None;
    }
    num.replace(',', "").parse::<f64>().ok()
}

/// Case-insensitive, whitespace-trimmed text comparison used for all categorical joins.
pub fn same_text(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Round a currency amount to cents.
pub fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Input records
// ---------------------------------------------------------------------------

/// Factors extracted from one SOP document, keyed by canonical snake_case name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SopFactors {
    pub factors: BTreeMap<String, FactorValue>,
}

impl SopFactors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FactorValue) {
        self.factors.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FactorValue> {
        self.factors.get(name)
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).map(|v| v.to_string()).filter(|s| !s.trim().is_empty())
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(FactorValue::as_number)
    }

    pub fn tour_id(&self) -> Option<String> {
        self.text(factor::TOUR_ID)
    }

    pub fn vehicle_type(&self) -> Option<String> {
        self.text(factor::VEHICLE_TYPE)
    }

    pub fn distance(&self) -> Option<f64> {
        self.number(factor::DISTANCE)
    }

    pub fn route(&self) -> Option<String> {
        self.text(factor::ROUTE)
    }
}

impl FromIterator<(String, FactorValue)> for SopFactors {
    fn from_iter<I: IntoIterator<Item = (String, FactorValue)>>(iter: I) -> Self {
        Self { factors: iter.into_iter().collect() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateBasis {
    PerKm,
    PerTrip,
    Flat,
}

impl RateBasis {
    pub fn parse(raw: &str) -> Option<Self> {
        let norm: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' || c == '/' { '_' } else { c })
            .collect();
        match norm.as_str() {
            "per_km" | "km" | "per_kilometer" | "per_kilometre" | "rate_per_km" => Some(Self::PerKm),
            "per_trip" | "trip" | "per_tour" => Some(Self::PerTrip),
            "flat" | "fixed" | "lump_sum" => Some(Self::Flat),
            _ => None,
        }
    }
}

impl fmt::Display for RateBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerKm => write!(f, "per_km"),
            Self::PerTrip => write!(f, "per_trip"),
            Self::Flat => write!(f, "flat"),
        }
    }
}

/// One pricing rule row from the rate card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateCardRecord {
    /// 1-based data row number in the source file.
    pub row: usize,
    pub vehicle_type: String,
    pub basis: RateBasis,
    pub rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_class: Option<FactorValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_distance: Option<f64>,
}

impl RateCardRecord {
    /// (vehicle type, condition tuple) identity of the rule.
    pub fn rule_key(&self) -> String {
        let opt = |v: &Option<String>| v.as_deref().unwrap_or("*").to_ascii_lowercase();
        let num = |v: Option<f64>| v.map(|n| n.to_string()).unwrap_or_else(|| "*".into());
        format!(
            "{}|{}|{}|{}..{}",
            self.vehicle_type.trim().to_ascii_lowercase(),
            opt(&self.route),
            self.weight_class.as_ref().map(|w| w.to_string().to_ascii_lowercase()).unwrap_or_else(|| "*".into()),
            num(self.min_distance),
            num(self.max_distance),
        )
    }
}

/// One paid-transaction row from the settlement report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementRecord {
    /// 1-based data row number in the source file.
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tour_id: Option<String>,
    pub amount: f64,
    /// The amount cell exactly as it appeared in the file.
    pub amount_raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip)]
    pub paid_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_class: Option<FactorValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    TourId,
    Attributes,
    Unmatched,
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TourId => write!(f, "tour_id"),
            Self::Attributes => write!(f, "attributes"),
            Self::Unmatched => write!(f, "unmatched"),
        }
    }
}

/// One SOP joined with its best rate rule and settlement row(s).
#[derive(Debug, Clone)]
pub struct NormalizedTour {
    pub sop: SopFactors,
    pub rate_rule: Option<RateCardRecord>,
    pub settlements: Vec<SettlementRecord>,
    pub match_method: MatchMethod,
    /// Matching problems found while joining (unmatched, duplicates, ambiguity).
    pub issues: Vec<Issue>,
}

impl NormalizedTour {
    pub fn is_unmatched(&self) -> bool {
        self.settlements.is_empty()
    }

    /// The settlement row whose attributes represent the tour.
    pub fn primary_settlement(&self) -> Option<&SettlementRecord> {
        self.settlements.first()
    }
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    UnmatchedSettlement,
    DuplicateSettlement,
    AmbiguousSettlementMatch,
    AmbiguousRateRule,
    IdentifierMismatch,
    VehicleTypeMismatch,
    NumericMismatch,
    CategoricalMismatch,
    MissingField,
    NoRateRule,
    MissingDistance,
    PaymentVariance,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnmatchedSettlement => "unmatched_settlement",
            Self::DuplicateSettlement => "duplicate_settlement",
            Self::AmbiguousSettlementMatch => "ambiguous_settlement_match",
            Self::AmbiguousRateRule => "ambiguous_rate_rule",
            Self::IdentifierMismatch => "identifier_mismatch",
            Self::VehicleTypeMismatch => "vehicle_type_mismatch",
            Self::NumericMismatch => "numeric_mismatch",
            Self::CategoricalMismatch => "categorical_mismatch",
            Self::MissingField => "missing_field",
            Self::NoRateRule => "no_rate_rule",
            Self::MissingDistance => "missing_distance",
            Self::PaymentVariance => "payment_variance",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub field: String,
    pub expected: Option<String>,
    pub observed: Option<String>,
    pub severity: Severity,
    pub description: String,
}

impl Issue {
    pub fn new(
        kind: IssueKind,
        field: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            field: field.into(),
            expected: None,
            observed: None,
            severity,
            description: description.into(),
        }
    }

    pub fn values(mut self, expected: Option<String>, observed: Option<String>) -> Self {
        self.expected = expected;
        self.observed = observed;
        self
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStatus {
    Match,
    WithinTolerance,
    Mismatch,
    Missing,
    NotCompared,
}

impl fmt::Display for ComparisonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match => write!(f, "match"),
            Self::WithinTolerance => write!(f, "within tolerance"),
            Self::Mismatch => write!(f, "mismatch"),
            Self::Missing => write!(f, "missing"),
            Self::NotCompared => write!(f, "not compared"),
        }
    }
}

/// One row of the SOP vs rate card vs settlement comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldComparison {
    pub field: String,
    pub sop: Option<String>,
    pub rate_card: Option<String>,
    pub settlement: Option<String>,
    pub status: ComparisonStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSummary {
    pub sop_factors: SopFactors,
    pub rate_card_records: usize,
    pub settlement_records: usize,
    pub tour_id: Option<String>,
    pub match_method: MatchMethod,
    pub matched_rate_rule: Option<RateCardRecord>,
    pub matched_settlements: Vec<SettlementRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentAccuracy {
    /// `None` when no rate rule (or no distance for a per-km rule) applies.
    pub expected_payment: Option<f64>,
    pub actual_payment: f64,
    pub variance: Option<f64>,
    pub accuracy_percentage: Option<f64>,
    pub rate_basis: Option<RateBasis>,
    pub currency: Option<String>,
    pub issues: Vec<Issue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub overall_risk_score: f64,
    pub severity: Severity,
    pub accuracy_penalty: f64,
    pub risk_factors: Vec<Issue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultMeta {
    pub engine_version: String,
    pub numeric_tolerance_pct: f64,
    pub payment_tolerance_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationResult {
    pub meta: ResultMeta,
    pub data_summary: DataSummary,
    pub field_comparisons: Vec<FieldComparison>,
    pub consistency_checks: Vec<Issue>,
    pub payment_accuracy: PaymentAccuracy,
    pub risk_assessment: RiskAssessment,
    pub recommendations: Vec<String>,
    pub insights: Vec<String>,
}
