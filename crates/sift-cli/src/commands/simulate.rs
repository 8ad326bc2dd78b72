use anyhow::{Context, Result};
use serde_json::Value;
use sift_core::reconcile::ids::IdPool;
use sift_core::reconcile::report::{ReportBook, STATUS_NEW};
use sift_core::simulate::{commit_simulated, select_rows, simulate};
use std::path::Path;

use crate::output;

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("invalid JSON in {}", path.display()))
}

/// Keys of every comparison row that is new in the sheet.
fn new_row_keys(book: &ReportBook) -> Vec<String> {
    book.comparison_sheets
        .iter()
        .flat_map(|sheet| sheet.rows.iter())
        .filter(|row| row.last().is_some_and(|s| s == STATUS_NEW))
        .filter_map(|row| row.first().cloned())
        .collect()
}

pub fn run(
    template_file: &Path,
    report_file: &Path,
    select: &[String],
    confirm: bool,
) -> Result<()> {
    let template: Value = read_json(template_file)?;
    let book: ReportBook = read_json(report_file)?;

    let keys = if select.is_empty() {
        new_row_keys(&book)
    } else {
        select.to_vec()
    };
    let selection = select_rows(&book, &keys);
    let mut pool = IdPool::new(&book.max_ids);
    let outcome = simulate(&template, &selection, &mut pool);

    output::json::print(&outcome)?;

    if confirm {
        let summary = commit_simulated(&outcome.payloads);
        eprintln!(
            "Logged {} update(s), skipped {}. Nothing was sent.",
            summary.logged, summary.skipped
        );
    } else {
        eprintln!(
            "Simulated {} payload(s). Re-run with --confirm to log them as updates.",
            outcome.payloads.len()
        );
    }
    Ok(())
}
