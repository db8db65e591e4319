use serde::Deserialize;

use crate::error::ReconError;
use crate::model::Severity;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Tunables for a cross-check run. Every section has defaults, so an empty
/// TOML document is a valid config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckConfig {
    #[serde(default)]
    pub tolerance: ToleranceConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub columns: ColumnsConfig,
}

// ---------------------------------------------------------------------------
// Tolerance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToleranceConfig {
    /// Relative tolerance for numeric field comparisons, in percent.
    #[serde(default = "default_numeric_pct")]
    pub numeric_pct: f64,
    /// Relative tolerance for expected vs actual payment, in percent.
    #[serde(default = "default_payment_pct")]
    pub payment_pct: f64,
}

fn default_numeric_pct() -> f64 {
    2.0
}

fn default_payment_pct() -> f64 {
    1.0
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            numeric_pct: default_numeric_pct(),
            payment_pct: default_payment_pct(),
        }
    }
}

// ---------------------------------------------------------------------------
// Risk
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskConfig {
    #[serde(default)]
    pub weights: SeverityWeights,
    /// Weighted issue points that map to the maximum score of 10.
    #[serde(default = "default_points_for_max_score")]
    pub points_for_max_score: f64,
    /// Scores strictly below this are "low".
    #[serde(default = "default_medium_from")]
    pub medium_from: f64,
    /// Scores strictly above this are "high".
    #[serde(default = "default_high_above")]
    pub high_above: f64,
    /// Payment accuracy below this escalates a variance issue to high severity.
    #[serde(default = "default_high_variance_accuracy")]
    pub high_variance_accuracy: f64,
    /// Ordered; the first entry whose `below` exceeds the accuracy applies.
    #[serde(default = "default_accuracy_penalties")]
    pub accuracy_penalties: Vec<AccuracyPenalty>,
}

fn default_points_for_max_score() -> f64 {
    4.0
}

fn default_medium_from() -> f64 {
    3.0
}

fn default_high_above() -> f64 {
    6.0
}

fn default_high_variance_accuracy() -> f64 {
    50.0
}

fn default_accuracy_penalties() -> Vec<AccuracyPenalty> {
    vec![
        AccuracyPenalty { below: 50.0, penalty: 4.0 },
        AccuracyPenalty { below: 80.0, penalty: 2.0 },
    ]
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            weights: SeverityWeights::default(),
            points_for_max_score: default_points_for_max_score(),
            medium_from: default_medium_from(),
            high_above: default_high_above(),
            high_variance_accuracy: default_high_variance_accuracy(),
            accuracy_penalties: default_accuracy_penalties(),
        }
    }
}

/// Points contributed by one issue of each severity.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeverityWeights {
    #[serde(default = "default_high_weight")]
    pub high: f64,
    #[serde(default = "default_medium_weight")]
    pub medium: f64,
    #[serde(default = "default_low_weight")]
    pub low: f64,
}

fn default_high_weight() -> f64 {
    3.0
}

fn default_medium_weight() -> f64 {
    2.0
}

fn default_low_weight() -> f64 {
    1.0
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            high: default_high_weight(),
            medium: default_medium_weight(),
            low: default_low_weight(),
        }
    }
}

impl SeverityWeights {
    pub fn weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccuracyPenalty {
    pub below: f64,
    pub penalty: f64,
}

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

/// Accepted header names per logical column. Matching is case-insensitive
/// and ignores spaces, dashes and underscores.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnsConfig {
    #[serde(default)]
    pub rate_card: RateCardColumns,
    #[serde(default)]
    pub settlement: SettlementColumns,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateCardColumns {
    #[serde(default = "default_vehicle_type")]
    pub vehicle_type: Vec<String>,
    #[serde(default = "default_rate_basis")]
    pub rate_basis: Vec<String>,
    #[serde(default = "default_rate")]
    pub rate: Vec<String>,
    #[serde(default = "default_currency")]
    pub currency: Vec<String>,
    #[serde(default = "default_route")]
    pub route: Vec<String>,
    #[serde(default = "default_weight_class")]
    pub weight_class: Vec<String>,
    #[serde(default = "default_min_distance")]
    pub min_distance: Vec<String>,
    #[serde(default = "default_max_distance")]
    pub max_distance: Vec<String>,
}

impl Default for RateCardColumns {
    fn default() -> Self {
        Self {
            vehicle_type: default_vehicle_type(),
            rate_basis: default_rate_basis(),
            rate: default_rate(),
            currency: default_currency(),
            route: default_route(),
            weight_class: default_weight_class(),
            min_distance: default_min_distance(),
            max_distance: default_max_distance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettlementColumns {
    #[serde(default = "default_tour_id")]
    pub tour_id: Vec<String>,
    #[serde(default = "default_amount")]
    pub amount: Vec<String>,
    #[serde(default = "default_currency")]
    pub currency: Vec<String>,
    #[serde(default = "default_vendor")]
    pub vendor: Vec<String>,
    #[serde(default = "default_timestamp")]
    pub timestamp: Vec<String>,
    #[serde(default = "default_vehicle_type")]
    pub vehicle_type: Vec<String>,
    #[serde(default = "default_distance")]
    pub distance: Vec<String>,
    #[serde(default = "default_weight_class")]
    pub weight_class: Vec<String>,
    #[serde(default = "default_route")]
    pub route: Vec<String>,
}

impl Default for SettlementColumns {
    fn default() -> Self {
        Self {
            tour_id: default_tour_id(),
            amount: default_amount(),
            currency: default_currency(),
            vendor: default_vendor(),
            timestamp: default_timestamp(),
            vehicle_type: default_vehicle_type(),
            distance: default_distance(),
            weight_class: default_weight_class(),
            route: default_route(),
        }
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn default_vehicle_type() -> Vec<String> {
    names(&["vehicle_type", "vehicle", "truck_type", "vehicle_class"])
}

fn default_rate_basis() -> Vec<String> {
    names(&["rate_basis", "basis", "rate_type", "pricing_basis", "unit"])
}

fn default_rate() -> Vec<String> {
    names(&["rate", "rate_value", "rate_per_km", "price", "amount"])
}

fn default_currency() -> Vec<String> {
    names(&["currency", "ccy"])
}

fn default_route() -> Vec<String> {
    names(&["route", "lane", "route_id"])
}

fn default_weight_class() -> Vec<String> {
    names(&["weight_class", "weight", "load", "tonnage"])
}

fn default_min_distance() -> Vec<String> {
    names(&["min_distance", "min_km", "distance_from"])
}

fn default_max_distance() -> Vec<String> {
    names(&["max_distance", "max_km", "distance_to"])
}

fn default_tour_id() -> Vec<String> {
    names(&["tour_id", "trip_id", "tour", "trip", "shipment_id"])
}

fn default_amount() -> Vec<String> {
    names(&["paid_amount", "amount_paid", "amount", "payment", "settled_amount"])
}

fn default_vendor() -> Vec<String> {
    names(&["vendor", "payee", "carrier", "vendor_name"])
}

fn default_timestamp() -> Vec<String> {
    names(&["timestamp", "paid_at", "payment_date", "date", "settlement_date"])
}

fn default_distance() -> Vec<String> {
    names(&["distance", "distance_km", "km"])
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl CheckConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: CheckConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let t = &self.tolerance;
        if !(t.numeric_pct >= 0.0) || !(t.payment_pct >= 0.0) {
            return Err(ReconError::ConfigValidation(
                "tolerance percentages must be >= 0".into(),
            ));
        }

        let r = &self.risk;
        for (name, w) in [("high", r.weights.high), ("medium", r.weights.medium), ("low", r.weights.low)] {
            if !(w > 0.0) {
                return Err(ReconError::ConfigValidation(format!(
                    "risk weight '{name}' must be > 0, got {w}"
                )));
            }
        }
        if !(r.weights.low <= r.weights.medium && r.weights.medium <= r.weights.high) {
            return Err(ReconError::ConfigValidation(
                "risk weights must satisfy low <= medium <= high".into(),
            ));
        }
        if !(r.points_for_max_score > 0.0) {
            return Err(ReconError::ConfigValidation(
                "points_for_max_score must be > 0".into(),
            ));
        }
        if !(0.0..=10.0).contains(&r.medium_from)
            || !(0.0..=10.0).contains(&r.high_above)
            || r.medium_from > r.high_above
        {
            return Err(ReconError::ConfigValidation(format!(
                "tier thresholds must satisfy 0 <= medium_from ({}) <= high_above ({}) <= 10",
                r.medium_from, r.high_above
            )));
        }
        if !(0.0..=100.0).contains(&r.high_variance_accuracy) {
            return Err(ReconError::ConfigValidation(format!(
                "high_variance_accuracy must be within 0..=100, got {}",
                r.high_variance_accuracy
            )));
        }
        for p in &r.accuracy_penalties {
            if !(0.0..=100.0).contains(&p.below) || !(p.penalty >= 0.0) {
                return Err(ReconError::ConfigValidation(format!(
                    "accuracy penalty below={} penalty={} out of range",
                    p.below, p.penalty
                )));
            }
        }

        let c = &self.columns;
        for (name, aliases) in [
            ("rate_card.vehicle_type", &c.rate_card.vehicle_type),
            ("rate_card.rate", &c.rate_card.rate),
            ("settlement.amount", &c.settlement.amount),
        ] {
            if aliases.is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "columns.{name} needs at least one header name"
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = CheckConfig::from_toml("").unwrap();
        assert_eq!(config.tolerance.numeric_pct, 2.0);
        assert_eq!(config.tolerance.payment_pct, 1.0);
        assert_eq!(config.risk.weights.high, 3.0);
        assert_eq!(config.risk.weights.medium, 2.0);
        assert_eq!(config.risk.weights.low, 1.0);
        assert_eq!(config.risk.accuracy_penalties.len(), 2);
        assert!(config.columns.settlement.amount.contains(&"paid_amount".to_string()));
    }

    #[test]
    fn parse_overrides() {
        let input = r#"
[tolerance]
numeric_pct = 5.0

[risk]
points_for_max_score = 6.0
accuracy_penalties = [{ below = 90.0, penalty = 1.5 }]

[risk.weights]
high = 4.0

[columns.settlement]
amount = ["net_paid"]
"#;
        let config = CheckConfig::from_toml(input).unwrap();
        assert_eq!(config.tolerance.numeric_pct, 5.0);
        assert_eq!(config.tolerance.payment_pct, 1.0);
        assert_eq!(config.risk.points_for_max_score, 6.0);
        assert_eq!(config.risk.weights.high, 4.0);
        assert_eq!(config.risk.weights.medium, 2.0);
        assert_eq!(
            config.risk.accuracy_penalties,
            vec![AccuracyPenalty { below: 90.0, penalty: 1.5 }]
        );
        assert_eq!(config.columns.settlement.amount, vec!["net_paid"]);
        assert!(config.columns.settlement.tour_id.contains(&"trip_id".to_string()));
    }

    #[test]
    fn reject_unknown_key() {
        let err = CheckConfig::from_toml("[tolerance]\nnumeric = 3.0\n").unwrap_err();
        assert!(matches!(err, ReconError::ConfigParse(_)));
    }

    #[test]
    fn reject_non_positive_weight() {
        let err = CheckConfig::from_toml("[risk.weights]\nlow = 0.0\n").unwrap_err();
        assert!(err.to_string().contains("'low' must be > 0"));
    }

    #[test]
    fn reject_non_monotonic_weights() {
        let err = CheckConfig::from_toml("[risk.weights]\nmedium = 5.0\n").unwrap_err();
        assert!(err.to_string().contains("low <= medium <= high"));
    }

    #[test]
    fn reject_inverted_thresholds() {
        let err = CheckConfig::from_toml("[risk]\nmedium_from = 7.0\nhigh_above = 4.0\n").unwrap_err();
        assert!(err.to_string().contains("tier thresholds"));
    }

    #[test]
    fn reject_negative_tolerance() {
        let err = CheckConfig::from_toml("[tolerance]\nnumeric_pct = -1.0\n").unwrap_err();
        assert!(matches!(err, ReconError::ConfigValidation(_)));
    }

    #[test]
    fn reject_out_of_range_variance_accuracy() {
        for value in ["-5.0", "150.0"] {
            let input = format!("[risk]\nhigh_variance_accuracy = {value}\n");
            let err = CheckConfig::from_toml(&input).unwrap_err();
            assert!(err.to_string().contains("high_variance_accuracy"), "{err}");
        }
        assert!(CheckConfig::from_toml("[risk]\nhigh_variance_accuracy = 100.0\n").is_ok());
    }

    #[test]
    fn reject_empty_alias_list() {
        let err = CheckConfig::from_toml("[columns.settlement]\namount = []\n").unwrap_err();
        assert!(err.to_string().contains("settlement.amount"));
    }
}
