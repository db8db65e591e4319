//! Loaders for the three input documents.
//!
//! The SOP is free text scanned line by line for `key: value` factors; the
//! rate card and settlement report are CSV files whose headers are resolved
//! through the alias lists in [`ColumnsConfig`](crate::config::ColumnsConfig).

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, warn};
use regex::Regex;

use crate::config::{RateCardColumns, SettlementColumns};
use crate::error::{Document, ParseError};
use crate::model::{
    factor, parse_number, FactorValue, RateBasis, RateCardRecord, SettlementRecord, SopFactors,
};

// ---------------------------------------------------------------------------
// SOP
// ---------------------------------------------------------------------------

/// Key aliases → canonical factor name. Keys are compared after normalization
/// (lowercase, non-alphanumerics collapsed to `_`).
const SOP_ALIASES: &[(&str, &str)] = &[
    ("tour_id", factor::TOUR_ID),
    ("tour", factor::TOUR_ID),
    ("tour_no", factor::TOUR_ID),
    ("tour_number", factor::TOUR_ID),
    ("trip_id", factor::TOUR_ID),
    ("trip_no", factor::TOUR_ID),
    ("trip_number", factor::TOUR_ID),
    ("shipment_id", factor::TOUR_ID),
    ("vehicle", factor::VEHICLE_TYPE),
    ("vehicle_type", factor::VEHICLE_TYPE),
    ("vehicle_class", factor::VEHICLE_TYPE),
    ("truck_type", factor::VEHICLE_TYPE),
    ("truck", factor::VEHICLE_TYPE),
    ("distance", factor::DISTANCE),
    ("distance_km", factor::DISTANCE),
    ("total_distance", factor::DISTANCE),
    ("km", factor::DISTANCE),
    ("weight", factor::WEIGHT_CLASS),
    ("weight_class", factor::WEIGHT_CLASS),
    ("load", factor::WEIGHT_CLASS),
    ("load_weight", factor::WEIGHT_CLASS),
    ("tonnage", factor::WEIGHT_CLASS),
    ("route", factor::ROUTE),
    ("route_id", factor::ROUTE),
    ("lane", factor::ROUTE),
    ("trips", factor::TRIPS),
    ("trip_count", factor::TRIPS),
    ("number_of_trips", factor::TRIPS),
    ("currency", factor::CURRENCY),
];

/// Read and extract factors from an SOP document.
pub fn parse_sop(path: &Path) -> Result<SopFactors, ParseError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        ParseError::new(Document::Sop, format!("cannot read {}: {e}", path.display()))
    })?;
    parse_sop_text(&text)
}

/// Extract factors from SOP text.
///
/// Recognizes `Key: value` and `Key = value` lines (optionally bulleted), plus
/// a free-text fallback for distances written as `... 120 km ...`.
/// Unknown keys are kept under their normalized name. The first occurrence of
/// a factor wins.
pub fn parse_sop_text(text: &str) -> Result<SopFactors, ParseError> {
    let line_re = Regex::new(r"^\s*(?:[-*•]\s*)?([A-Za-z][A-Za-z0-9 _/#.()-]{0,40}?)\s*[:=]\s*(.+?)\s*$")
        .expect("static SOP line pattern");
    let distance_re = Regex::new(r"(?i)\b(\d[\d,]*(?:\.\d+)?)\s*(?:km|kms|kilomet(?:er|re)s?)\b")
        .expect("static SOP distance pattern");

    let mut factors = SopFactors::new();

    for line in text.lines() {
        let Some(caps) = line_re.captures(line) else {
            continue;
        };
        let key = normalize_key(&caps[1]);
        if key.is_empty() {
            continue;
        }
        let name = canonical_factor(&key).unwrap_or(key.as_str()).to_string();
        if factors.get(&name).is_some() {
            continue;
        }
        let value = FactorValue::parse_for(&name, &caps[2]);
        debug!("SOP factor {name} = {value}");
        factors.insert(name, value);
    }

    if factors.get(factor::DISTANCE).is_none() {
        if let Some(n) = distance_re
            .captures(text)
            .and_then(|c| parse_number(&c[1]))
        {
            debug!("SOP distance from free text: {n}");
            factors.insert(factor::DISTANCE, FactorValue::Number(n));
        }
    }

    let recognized = factors
        .factors
        .keys()
        .any(|k| SOP_ALIASES.iter().any(|(_, canonical)| canonical == k));
    if !recognized {
        return Err(ParseError::new(
            Document::Sop,
            "no recognizable factors (expected lines like 'Vehicle Type: Truck-10T')",
        ));
    }

    Ok(factors)
}

/// Lowercase, drop parenthesized units, collapse non-alphanumerics to `_`.
fn normalize_key(raw: &str) -> String {
    let without_units = match raw.find('(') {
        Some(i) => &raw[..i],
        None => raw,
    };
    let mut out = String::with_capacity(without_units.len());
    for c in without_units.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    out.trim_end_matches('_').to_string()
}

fn canonical_factor(key: &str) -> Option<&'static str> {
    SOP_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, canonical)| *canonical)
}

// ---------------------------------------------------------------------------
// CSV helpers
// ---------------------------------------------------------------------------

fn normalize_header(h: &str) -> String {
    h.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Index of the first header matching any alias, in alias priority order.
fn find_column(headers: &[String], aliases: &[String]) -> Option<usize> {
    aliases.iter().find_map(|alias| {
        let want = normalize_header(alias);
        headers.iter().position(|h| *h == want)
    })
}

fn read_document(path: &Path, document: Document) -> Result<String, ParseError> {
    std::fs::read_to_string(path)
        .map_err(|e| ParseError::new(document, format!("cannot read {}: {e}", path.display())))
}

fn csv_reader(data: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes())
}

fn read_headers(
    reader: &mut csv::Reader<&[u8]>,
    document: Document,
) -> Result<Vec<String>, ParseError> {
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ParseError::new(document, e.to_string()))?
        .iter()
        .map(normalize_header)
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(ParseError::new(document, "missing header row"));
    }
    Ok(headers)
}

fn cell(record: &csv::StringRecord, idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn line_of(record: &csv::StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Rate card
// ---------------------------------------------------------------------------

pub fn load_rate_card(
    path: &Path,
    columns: &RateCardColumns,
) -> Result<Vec<RateCardRecord>, ParseError> {
    let data = read_document(path, Document::RateCard)?;
    load_rate_card_csv(&data, columns)
}

/// Parse rate-card CSV text. When no basis column exists, the basis is inferred
/// from the rate header (`rate_per_km` → per-km, `rate_per_trip` → per-trip).
pub fn load_rate_card_csv(
    data: &str,
    columns: &RateCardColumns,
) -> Result<Vec<RateCardRecord>, ParseError> {
    let doc = Document::RateCard;
    let mut reader = csv_reader(data);
    let headers = read_headers(&mut reader, doc)?;

    let missing = |name: &str| ParseError::new(doc, format!("missing column '{name}'"));
    let vehicle_idx = find_column(&headers, &columns.vehicle_type).ok_or_else(|| missing("vehicle_type"))?;
    let rate_idx = find_column(&headers, &columns.rate).ok_or_else(|| missing("rate"))?;
    let basis_idx = find_column(&headers, &columns.rate_basis);
    let inferred_basis = if basis_idx.is_none() {
        let rate_header = &headers[rate_idx];
        if rate_header.contains("km") {
            Some(RateBasis::PerKm)
        } else if rate_header.contains("trip") {
            Some(RateBasis::PerTrip)
        } else {
            return Err(missing("rate_basis"));
        }
    } else {
        None
    };
    let currency_idx = find_column(&headers, &columns.currency);
    let route_idx = find_column(&headers, &columns.route);
    let weight_idx = find_column(&headers, &columns.weight_class);
    let min_idx = find_column(&headers, &columns.min_distance);
    let max_idx = find_column(&headers, &columns.max_distance);

    let mut records = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result.map_err(|e| ParseError::new(doc, e.to_string()))?;
        let line = line_of(&record);
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let Some(vehicle_type) = cell(&record, Some(vehicle_idx)) else {
            warn!("rate card line {line}: no vehicle type, row skipped");
            continue;
        };

        let rate_raw = cell(&record, Some(rate_idx)).unwrap_or_default();
        let rate = parse_number(&rate_raw).ok_or_else(|| {
            ParseError::new(doc, format!("cannot parse rate '{rate_raw}'")).at_line(line)
        })?;

        let basis = match (inferred_basis, cell(&record, basis_idx)) {
            (Some(b), _) => b,
            (None, Some(raw)) => RateBasis::parse(&raw).ok_or_else(|| {
                ParseError::new(doc, format!("unknown rate basis '{raw}'")).at_line(line)
            })?,
            (None, None) => {
                return Err(ParseError::new(doc, "empty rate basis").at_line(line));
            }
        };

        let distance_bound = |idx: Option<usize>, name: &str| -> Result<Option<f64>, ParseError> {
            match cell(&record, idx) {
                None => Ok(None),
                Some(raw) => parse_number(&raw).map(Some).ok_or_else(|| {
                    ParseError::new(doc, format!("cannot parse {name} '{raw}'")).at_line(line)
                }),
            }
        };

        records.push(RateCardRecord {
            row: i + 1,
            vehicle_type,
            basis,
            rate,
            currency: cell(&record, currency_idx),
            route: cell(&record, route_idx),
            weight_class: cell(&record, weight_idx)
                .map(|w| FactorValue::parse_for(factor::WEIGHT_CLASS, &w)),
            min_distance: distance_bound(min_idx, "min_distance")?,
            max_distance: distance_bound(max_idx, "max_distance")?,
        });
    }

    if records.is_empty() {
        return Err(ParseError::new(doc, "no pricing rules found"));
    }
    debug!("loaded {} rate card rules", records.len());
    Ok(records)
}

// ---------------------------------------------------------------------------
// Settlement report
// ---------------------------------------------------------------------------

pub fn load_settlement(
    path: &Path,
    columns: &SettlementColumns,
) -> Result<Vec<SettlementRecord>, ParseError> {
    let data = read_document(path, Document::Settlement)?;
    load_settlement_csv(&data, columns)
}

pub fn load_settlement_csv(
    data: &str,
    columns: &SettlementColumns,
) -> Result<Vec<SettlementRecord>, ParseError> {
    let doc = Document::Settlement;
    let mut reader = csv_reader(data);
    let headers = read_headers(&mut reader, doc)?;

    let amount_idx = find_column(&headers, &columns.amount)
        .ok_or_else(|| ParseError::new(doc, "missing column 'paid_amount'"))?;
    let tour_idx = find_column(&headers, &columns.tour_id);
    let currency_idx = find_column(&headers, &columns.currency);
    let vendor_idx = find_column(&headers, &columns.vendor);
    let ts_idx = find_column(&headers, &columns.timestamp);
    let vehicle_idx = find_column(&headers, &columns.vehicle_type);
    let distance_idx = find_column(&headers, &columns.distance);
    let weight_idx = find_column(&headers, &columns.weight_class);
    let route_idx = find_column(&headers, &columns.route);

    let mut records = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result.map_err(|e| ParseError::new(doc, e.to_string()))?;
        let line = line_of(&record);
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let amount_raw = record.get(amount_idx).unwrap_or("").to_string();
        let amount = parse_number(&amount_raw).ok_or_else(|| {
            ParseError::new(doc, format!("cannot parse amount '{amount_raw}'")).at_line(line)
        })?;

        let timestamp = cell(&record, ts_idx);
        let paid_at = timestamp.as_deref().and_then(|raw| {
            let parsed = parse_timestamp(raw);
            if parsed.is_none() {
                warn!("settlement line {line}: unrecognized timestamp '{raw}'");
            }
            parsed
        });

        let distance = match cell(&record, distance_idx) {
            None => None,
            Some(raw) => Some(parse_number(&raw).ok_or_else(|| {
                ParseError::new(doc, format!("cannot parse distance '{raw}'")).at_line(line)
            })?),
        };

        records.push(SettlementRecord {
            row: i + 1,
            tour_id: cell(&record, tour_idx),
            amount,
            amount_raw,
            currency: cell(&record, currency_idx),
            vendor: cell(&record, vendor_idx),
            timestamp,
            paid_at,
            vehicle_type: cell(&record, vehicle_idx),
            distance,
            weight_class: cell(&record, weight_idx)
                .map(|w| FactorValue::parse_for(factor::WEIGHT_CLASS, &w)),
            route: cell(&record, route_idx),
        });
    }

    if records.is_empty() {
        return Err(ParseError::new(doc, "no settlement rows found"));
    }
    debug!("loaded {} settlement rows", records.len());
    Ok(records)
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];

    let raw = raw.trim().trim_end_matches('Z');
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SOP: &str = "\
Standard Operating Procedure - Line Haul

Tour ID: T-1001
Vehicle Type: Truck-10T
Distance (km): 120 km
Weight Class: 8 tons
Route: BLR-CHN
Notes: driver must report at dock 4
";

    #[test]
    fn parse_sop_key_value_lines() {
        let f = parse_sop_text(SOP).unwrap();
        assert_eq!(f.tour_id().as_deref(), Some("T-1001"));
        assert_eq!(f.vehicle_type().as_deref(), Some("Truck-10T"));
        assert_eq!(f.distance(), Some(120.0));
        assert_eq!(f.get("weight_class"), Some(&FactorValue::Number(8.0)));
        assert_eq!(f.route().as_deref(), Some("BLR-CHN"));
        assert_eq!(
            f.get("notes"),
            Some(&FactorValue::Text("driver must report at dock 4".into()))
        );
    }

    #[test]
    fn parse_sop_aliases_and_bullets() {
        let f = parse_sop_text("- Trip No: 77\n* Truck = Van-3T\n• Lane: DEL-JAI\n").unwrap();
        assert_eq!(f.tour_id().as_deref(), Some("77"));
        assert_eq!(f.vehicle_type().as_deref(), Some("Van-3T"));
        assert_eq!(f.route().as_deref(), Some("DEL-JAI"));
    }

    #[test]
    fn parse_sop_trip_description_is_not_an_id() {
        let f = parse_sop_text("Trip: Bangalore to Chennai\nVehicle Type: Truck-10T\n").unwrap();
        assert_eq!(f.tour_id(), None);
        assert_eq!(f.get("trip"), Some(&FactorValue::Text("Bangalore to Chennai".into())));
    }

    #[test]
    fn parse_sop_free_text_distance() {
        let f = parse_sop_text("Vehicle: Truck-10T\nThe trip covers roughly 245.5 km of highway.\n").unwrap();
        assert_eq!(f.distance(), Some(245.5));
    }

    #[test]
    fn parse_sop_first_occurrence_wins() {
        let f = parse_sop_text("Distance: 100\nDistance: 200\n").unwrap();
        assert_eq!(f.distance(), Some(100.0));
    }

    #[test]
    fn parse_sop_rejects_unrecognized_text() {
        let err = parse_sop_text("hello world\nnothing here\n").unwrap_err();
        assert_eq!(err.document, Document::Sop);
    }

    #[test]
    fn load_rate_card_basic() {
        let csv = "\
vehicle_type,rate_basis,rate,currency,route
Truck-10T,per_km,5.00,USD,
Van-3T,flat,350,USD,BLR-CHN
";
        let rules = load_rate_card_csv(csv, &RateCardColumns::default()).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].row, 1);
        assert_eq!(rules[0].basis, RateBasis::PerKm);
        assert_eq!(rules[0].rate, 5.0);
        assert_eq!(rules[0].route, None);
        assert_eq!(rules[1].basis, RateBasis::Flat);
        assert_eq!(rules[1].route.as_deref(), Some("BLR-CHN"));
    }

    #[test]
    fn load_rate_card_infers_basis_from_header() {
        let csv = "Vehicle Type,Rate Per KM\nTruck-10T,$5.50\n";
        let rules = load_rate_card_csv(csv, &RateCardColumns::default()).unwrap();
        assert_eq!(rules[0].basis, RateBasis::PerKm);
        assert_eq!(rules[0].rate, 5.5);
    }

    #[test]
    fn load_rate_card_missing_column() {
        let err = load_rate_card_csv("route,rate\nX,1\n", &RateCardColumns::default()).unwrap_err();
        assert!(err.message.contains("vehicle_type"));
    }

    #[test]
    fn load_rate_card_bad_rate_reports_line() {
        let csv = "vehicle_type,rate_basis,rate\nTruck-10T,per_km,abc\n";
        let err = load_rate_card_csv(csv, &RateCardColumns::default()).unwrap_err();
        assert_eq!(err.line, Some(2));
        assert!(err.message.contains("abc"));
    }

    #[test]
    fn load_settlement_keeps_raw_amount() {
        let csv = "\
trip_id,vendor,paid_amount,currency,payment_date,vehicle_type
T-1001,Acme Logistics,\"$1,200.50\",USD,2026-01-15,Truck-10T
T-1002,Acme Logistics,450,USD,15/01/2026,
";
        let rows = load_settlement_csv(csv, &SettlementColumns::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].tour_id.as_deref(), Some("T-1001"));
        assert_eq!(rows[0].amount, 1200.5);
        assert_eq!(rows[0].amount_raw, "$1,200.50");
        assert_eq!(rows[0].vehicle_type.as_deref(), Some("Truck-10T"));
        assert!(rows[0].paid_at.is_some());
        assert!(rows[1].paid_at.is_some());
        assert_eq!(rows[1].vehicle_type, None);
    }

    #[test]
    fn load_settlement_accepts_accounting_negative() {
        let csv = "tour_id,paid_amount\nT-1,$600.00\nT-1,(150.00)\n";
        let rows = load_settlement_csv(csv, &SettlementColumns::default()).unwrap();
        assert_eq!(rows[1].amount, -150.0);
        assert_eq!(rows[1].amount_raw, "(150.00)");
    }

    #[test]
    fn load_settlement_rejects_bad_amount() {
        let csv = "tour_id,paid_amount\nT-1,n/a\n";
        let err = load_settlement_csv(csv, &SettlementColumns::default()).unwrap_err();
        assert_eq!(err.document, Document::Settlement);
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn load_settlement_rejects_empty_file() {
        let err = load_settlement_csv("tour_id,paid_amount\n", &SettlementColumns::default()).unwrap_err();
        assert!(err.message.contains("no settlement rows"));
    }

    #[test]
    fn load_settlement_rejects_ragged_rows() {
        let csv = "tour_id,paid_amount\nT-1,100,extra\n";
        assert!(load_settlement_csv(csv, &SettlementColumns::default()).is_err());
    }
}
