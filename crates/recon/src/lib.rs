//! `midmile-recon` - tour reconciliation and risk scoring for middle-mile freight.
//!
//! Cross-checks an SOP, a rate card and a settlement report for one tour,
//! scores the discrepancies and renders the result as report workbooks.
//! Pipeline: sources → matcher → consistency + payment → risk → recommend → report/export.

pub mod analysis;
pub mod config;
pub mod consistency;
pub mod engine;
pub mod error;
pub mod export;
pub mod matcher;
pub mod model;
pub mod payment;
pub mod recommend;
pub mod report;
pub mod risk;
pub mod sources;

pub use config::CheckConfig;
pub use engine::{reconcile, reconcile_records, reconcile_with};
pub use error::{Document, ExportError, ParseError, ReconError};
pub use export::{export_payment_and_dispute, export_report, ExportSummary};
pub use model::{Issue, IssueKind, ReconciliationResult, Severity};
pub use payment::{evaluate_sop, SopEvaluation};
pub use report::ReportKind;
