//! `.xlsx` rendering of logical report workbooks.
//!
//! Every write goes to a sibling temporary file that is renamed over the
//! destination on success; on failure the temporary file is removed and the
//! destination is left as it was. Paired reports commit together or not at all.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook, Worksheet};
use serde::Serialize;

use crate::error::ExportError;
use crate::model::ReconciliationResult;
use crate::report::{project, Cell, ReportKind, Sheet, Workbook};

const MAX_COLUMN_WIDTH: usize = 80;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    pub kind: ReportKind,
    pub path: PathBuf,
    pub sheets: usize,
    pub rows: usize,
}

/// Project `result` as `kind` and write it to `destination`.
pub fn export_report(
    result: &ReconciliationResult,
    kind: ReportKind,
    destination: &Path,
) -> Result<ExportSummary, ExportError> {
    let workbook = project(result, kind);
    write_workbook(&workbook, destination)?;
    let summary = summarize(kind, destination, &workbook);
    info!("exported {} report to {} ({} rows)", kind, destination.display(), summary.rows);
    Ok(summary)
}

/// Write `payment_report.xlsx` and `dispute_report.xlsx` into `dir` as a pair.
///
/// Both workbooks are saved to temporary siblings before either is moved into
/// place. If any step fails, both destinations keep their previous contents.
pub fn export_payment_and_dispute(
    result: &ReconciliationResult,
    dir: &Path,
) -> Result<Vec<ExportSummary>, ExportError> {
    let mut staged: Vec<(ExportSummary, PathBuf)> = Vec::with_capacity(2);
    for kind in [ReportKind::Payment, ReportKind::Dispute] {
        let path = dir.join(kind.file_name());
        let workbook = project(result, kind);
        match stage(&workbook, &path) {
            Ok(tmp) => staged.push((summarize(kind, &path, &workbook), tmp)),
            Err(e) => {
                for (_, tmp) in &staged {
                    discard(tmp);
                }
                return Err(e);
            }
        }
    }

    commit_all(&staged)?;
    for (summary, _) in &staged {
        info!(
            "exported {} report to {} ({} rows)",
            summary.kind,
            summary.path.display(),
            summary.rows
        );
    }
    Ok(staged.into_iter().map(|(summary, _)| summary).collect())
}

/// Render any logical workbook to `.xlsx` at `destination`.
pub fn write_workbook(workbook: &Workbook, destination: &Path) -> Result<(), ExportError> {
    let tmp = stage(workbook, destination)?;
    fs::rename(&tmp, destination).map_err(|e| {
        discard(&tmp);
        ExportError::new(destination, format!("failed to move into place: {e}"))
    })
}

fn summarize(kind: ReportKind, path: &Path, workbook: &Workbook) -> ExportSummary {
    ExportSummary {
        kind,
        path: path.to_path_buf(),
        sheets: workbook.sheets.len(),
        rows: workbook.sheets.iter().map(|s| s.rows.len()).sum(),
    }
}

/// Save `workbook` to the temporary sibling of `destination` and return its path.
fn stage(workbook: &Workbook, destination: &Path) -> Result<PathBuf, ExportError> {
    let tmp = sibling(destination, "tmp");
    let saved = render(workbook).and_then(|mut xlsx| {
        xlsx.save(&tmp)
            .map_err(|e| format!("failed to save workbook: {e}"))
    });
    match saved {
        Ok(()) => Ok(tmp),
        Err(message) => {
            discard(&tmp);
            Err(ExportError::new(destination, message))
        }
    }
}

/// Move every staged file over its destination, or none of them. A
/// destination replaced before a later failure is restored from its backup.
fn commit_all(staged: &[(ExportSummary, PathBuf)]) -> Result<(), ExportError> {
    let mut committed: Vec<(&Path, Option<PathBuf>)> = Vec::with_capacity(staged.len());

    for (i, (summary, tmp)) in staged.iter().enumerate() {
        let destination = summary.path.as_path();
        let moved = backup(destination).and_then(|bak| match fs::rename(tmp, destination) {
            Ok(()) => Ok(bak),
            Err(e) => {
                if let Some(bak) = &bak {
                    restore(bak, destination);
                }
                Err(ExportError::new(destination, format!("failed to move into place: {e}")))
            }
        });

        match moved {
            Ok(bak) => committed.push((destination, bak)),
            Err(e) => {
                for (_, tmp) in &staged[i..] {
                    discard(tmp);
                }
                for (destination, bak) in committed.iter().rev() {
                    match bak {
                        Some(bak) => restore(bak, destination),
                        None => discard(destination),
                    }
                }
                return Err(e);
            }
        }
    }

    for (_, bak) in &committed {
        if let Some(bak) = bak {
            discard(bak);
        }
    }
    Ok(())
}

/// Move an existing destination file aside so it can be restored.
fn backup(destination: &Path) -> Result<Option<PathBuf>, ExportError> {
    if !destination.is_file() {
        return Ok(None);
    }
    let bak = sibling(destination, "bak");
    fs::rename(destination, &bak).map_err(|e| {
        ExportError::new(destination, format!("failed to set aside existing file: {e}"))
    })?;
    Ok(Some(bak))
}

fn restore(bak: &Path, destination: &Path) {
    if let Err(e) = fs::rename(bak, destination) {
        warn!("could not restore {} from {}: {}", destination.display(), bak.display(), e);
    }
}

fn discard(path: &Path) {
    if path.is_file() {
        if let Err(e) = fs::remove_file(path) {
            warn!("could not remove {}: {}", path.display(), e);
        }
    }
}

fn sibling(destination: &Path, suffix: &str) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report.xlsx".into());
    destination.with_file_name(format!(".{name}.{}.{suffix}", std::process::id()))
}

fn render(workbook: &Workbook) -> Result<XlsxWorkbook, String> {
    let mut xlsx = XlsxWorkbook::new();
    let header_format = Format::new().set_bold();

    for sheet in &workbook.sheets {
        let worksheet = xlsx
            .add_worksheet()
            .set_name(&sheet.name)
            .map_err(|e| format!("failed to create sheet '{}': {}", sheet.name, e))?;
        write_sheet(worksheet, sheet, &header_format)?;
    }
    Ok(xlsx)
}

fn write_sheet(worksheet: &mut Worksheet, sheet: &Sheet, header_format: &Format) -> Result<(), String> {
    let cell_err = |row: usize, col: usize, e: rust_xlsxwriter::XlsxError| {
        format!("failed to write '{}' cell ({}, {}): {}", sheet.name, row, col, e)
    };

    let mut widths: Vec<usize> = sheet.header.iter().map(|h| h.chars().count()).collect();

    for (col, title) in sheet.header.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, title, header_format)
            .map_err(|e| cell_err(0, col, e))?;
    }

    for (r, row) in sheet.rows.iter().enumerate() {
        let row32 = (r + 1) as u32;
        for (col, cell) in row.iter().enumerate() {
            let col16 = col as u16;
            let width = match cell {
                Cell::Text(s) => {
                    worksheet.write_string(row32, col16, s).map_err(|e| cell_err(r + 1, col, e))?;
                    s.chars().count()
                }
                Cell::Number(n) => {
                    worksheet.write_number(row32, col16, *n).map_err(|e| cell_err(r + 1, col, e))?;
                    n.to_string().len()
                }
                Cell::Empty => 0,
            };
            if widths.len() <= col {
                widths.resize(col + 1, 0);
            }
            widths[col] = widths[col].max(width);
        }
    }

    for (col, w) in widths.iter().enumerate() {
        worksheet
            .set_column_width(col as u16, (*w).clamp(8, MAX_COLUMN_WIDTH) as f64 + 2.0)
            .map_err(|e| format!("failed to set column {col} width: {e}"))?;
    }
    worksheet
        .set_freeze_panes(1, 0)
        .map_err(|e| format!("failed to freeze header row: {e}"))?;
    Ok(())
}
