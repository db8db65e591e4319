// Contract tests for the `midmile` binary: exit codes, --json stdout, report files.
// Run with: cargo test -p midmile-cli --test cli_tests -- --nocapture

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn midmile() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_midmile"));
    cmd.current_dir(env!("CARGO_MANIFEST_DIR"));
    cmd.env_remove("MIDMILE_CONFIG");
    cmd
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../recon/tests/fixtures").join(name)
}

fn check(settlement: &str, extra: &[&str]) -> Output {
    let mut cmd = midmile();
    cmd.arg("check")
        .arg(fixture("sop_t1001.txt"))
        .arg(fixture("rate_card.csv"))
        .arg(fixture(settlement))
        .args(extra);
    cmd.output().expect("run midmile check")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ===========================================================================
// midmile check
// ===========================================================================

#[test]
fn check_low_risk_exits_zero() {
    let output = check("settlement_paid_600.csv", &[]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("tour T-1001 (matched by tour_id)"));
    assert!(output.stdout.is_empty(), "human mode writes nothing to stdout");
}

#[test]
fn check_exit_code_follows_tier() {
    assert_eq!(check("settlement_split.csv", &[]).status.code(), Some(3));
    assert_eq!(check("settlement_wrong_vehicle.csv", &[]).status.code(), Some(4));
    assert_eq!(check("settlement_missing_tour.csv", &[]).status.code(), Some(4));
}

#[test]
fn check_json_is_a_single_value() {
    let output = check("settlement_paid_450.csv", &["--json"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let val: serde_json::Value = serde_json::from_str(stdout.trim())
        .unwrap_or_else(|e| panic!("stdout must be valid JSON: {e}\n{stdout}"));

    assert_eq!(val["payment_accuracy"]["expected_payment"], 600.0);
    assert_eq!(val["payment_accuracy"]["variance"], -150.0);
    assert_eq!(val["payment_accuracy"]["accuracy_percentage"], 75.0);
    assert_eq!(val["risk_assessment"]["risk_factors"][0]["kind"], "payment_variance");
    assert!(val["recommendations"].as_array().is_some_and(|r| !r.is_empty()));
}

#[test]
fn check_writes_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("result.json");
    let output = check("settlement_paid_600.csv", &["--output", out.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let val: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(val["risk_assessment"]["severity"], "low");
}

#[test]
fn check_with_config() {
    let config = fixture("lenient.check.toml");
    let output = check("settlement_paid_450.csv", &["--config", config.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(3), "stderr: {}", stderr(&output));
}

#[test]
fn check_bad_settlement_is_parse_error() {
    let output = check("settlement_bad_amount.csv", &[]);
    assert_eq!(output.status.code(), Some(5));
    let err = stderr(&output);
    assert!(err.contains("settlement report line 2"), "stderr: {err}");
}

#[test]
fn check_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bad.toml");
    std::fs::write(&config, "[tolerance]\nnumeric_pct = -3\n").unwrap();
    let output = check("settlement_paid_600.csv", &["--config", config.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(6));
}

// ===========================================================================
// midmile report
// ===========================================================================

fn report(kind: &str, out: &Path) -> Output {
    midmile()
        .args(["report", kind])
        .arg(fixture("sop_t1001.txt"))
        .arg(fixture("rate_card.csv"))
        .arg(fixture("settlement_paid_450.csv"))
        .arg("--out")
        .arg(out)
        .output()
        .expect("run midmile report")
}

#[test]
fn report_writes_workbook() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("tour.xlsx");
    let output = report("tour", &out);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(out.exists());
    assert!(std::fs::metadata(&out).unwrap().len() > 100);
}

#[test]
fn report_payment_and_dispute_pair() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("reports");
    let output = report("payment-and-dispute", &out);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(out.join("payment_report.xlsx").exists());
    assert!(out.join("dispute_report.xlsx").exists());
}

#[test]
fn report_unknown_kind_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = report("audit", &dir.path().join("x.xlsx"));
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("hint:"));
}

#[test]
fn report_unwritable_destination() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("missing").join("tour.xlsx");
    let output = report("tour", &out);
    assert_eq!(output.status.code(), Some(8));
    assert!(!out.exists());
}

// ===========================================================================
// midmile analyze / sop / config
// ===========================================================================

#[test]
fn analyze_settlement_json() {
    let output = midmile()
        .args(["analyze", "settlement"])
        .arg(fixture("settlement_split.csv"))
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let val: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(val["total_transactions"], 2);
    assert_eq!(val["discrepancies"][0]["kind"], "duplicate_tour_id");
}

#[test]
fn analyze_rate_card_summary() {
    let output = midmile()
        .args(["analyze", "rate-card"])
        .arg(fixture("rate_card.csv"))
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stderr(&output).contains("4 rule(s)"));
}

#[test]
fn sop_prints_factors() {
    let output = midmile().arg("sop").arg(fixture("sop_t1001.txt")).output().unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("tour_id: T-1001"));
    assert!(stdout.contains("vehicle_type: Truck-10T"));
    assert!(stdout.contains("distance: 120"));
}

#[test]
fn analyze_uses_config_column_aliases() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("remittance.csv");
    std::fs::write(&csv, "tour_id,remitted\nT-1001,600\n").unwrap();
    let config = dir.path().join("columns.toml");
    std::fs::write(&config, "[columns.settlement]\namount = [\"remitted\"]\n").unwrap();

    let without = midmile().args(["analyze", "settlement"]).arg(&csv).output().unwrap();
    assert_eq!(without.status.code(), Some(5));

    let output = midmile()
        .args(["analyze", "settlement"])
        .arg(&csv)
        .arg("--config")
        .arg(&config)
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let val: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(val["total_transactions"], 1);
}

#[test]
fn sop_priced_against_rate_card() {
    let output = midmile()
        .arg("sop")
        .arg(fixture("sop_t1001.txt"))
        .arg("--rate-card")
        .arg(fixture("rate_card.csv"))
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let val: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(val["factors"]["tour_id"], "T-1001");
    assert_eq!(val["evaluation"]["expected_payment"], 600.0);
    assert_eq!(val["evaluation"]["rate_rule_row"], 1);
    assert_eq!(val["evaluation"]["dispute_flags"].as_array().map(Vec::len), Some(0));
}

#[test]
fn sop_without_distance_is_held() {
    let dir = tempfile::tempdir().unwrap();
    let sop = dir.path().join("sop.txt");
    std::fs::write(&sop, "Tour ID: T-9\nVehicle Type: Van-3T\n").unwrap();
    let output = midmile()
        .arg("sop")
        .arg(&sop)
        .arg("--rate-card")
        .arg(fixture("rate_card.csv"))
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let err = stderr(&output);
    assert!(err.contains("missing_distance"), "stderr: {err}");
    assert!(err.contains("decision: hold for review"), "stderr: {err}");
}

#[test]
fn config_validate() {
    let ok = midmile().args(["config", "validate"]).arg(fixture("lenient.check.toml")).output().unwrap();
    assert!(ok.status.success(), "stderr: {}", stderr(&ok));
    assert!(stderr(&ok).starts_with("valid:"));

    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("bad.toml");
    std::fs::write(&bad, "[risk]\nmedium_from = 8.0\nhigh_above = 4.0\n").unwrap();
    let output = midmile().args(["config", "validate"]).arg(&bad).output().unwrap();
    assert_eq!(output.status.code(), Some(6));
}
