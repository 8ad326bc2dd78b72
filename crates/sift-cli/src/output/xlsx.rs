//! Write a reconciliation report as an xlsx workbook.

use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use sift_core::reconcile::report::ReportBook;
use std::collections::BTreeSet;
use std::path::Path;

const MAX_SHEET_NAME: usize = 31;
const METADATA_SHEET: &str = "Metadata";

/// A sheet name Excel accepts and that is not taken yet.
fn sheet_name(title: &str, taken: &mut BTreeSet<String>) -> String {
    let clean: String = title
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            _ => c,
        })
        .take(MAX_SHEET_NAME)
        .collect();
    let mut name = clean.clone();
    let mut n = 2;
    while taken.contains(&name.to_lowercase()) {
        let suffix = format!(" ({n})");
        let keep = MAX_SHEET_NAME.saturating_sub(suffix.chars().count());
        name = format!("{}{suffix}", clean.chars().take(keep).collect::<String>());
        n += 1;
    }
    taken.insert(name.to_lowercase());
    name
}

fn write_table(
    worksheet: &mut Worksheet,
    header: &[String],
    rows: &[Vec<String>],
    bold: &Format,
) -> Result<()> {
    for (col, name) in header.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, name, bold)?;
    }
    for (i, row) in rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            worksheet.write_string((i + 1) as u32, col as u16, value)?;
        }
    }
    worksheet.set_freeze_panes(1, 0)?;
    worksheet.autofit();
    Ok(())
}

pub fn write_report(report: &ReportBook, path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let mut taken = BTreeSet::from([METADATA_SHEET.to_lowercase()]);

    for sheet in &report.entity_sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet_name(&sheet.title, &mut taken))?;
        write_table(worksheet, &sheet.header, &sheet.rows, &bold)?;
    }
    for sheet in &report.comparison_sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet_name(&sheet.title, &mut taken))?;
        write_table(worksheet, &sheet.header, &sheet.rows, &bold)?;
    }

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(METADATA_SHEET)?;
    worksheet.write_string_with_format(0, 0, "ID Pool", &bold)?;
    worksheet.write_string_with_format(0, 1, "Max ID", &bold)?;
    for (i, (pool, max)) in report.max_ids.iter().enumerate() {
        let row = (i + 1) as u32;
        worksheet.write_string(row, 0, pool.to_string())?;
        worksheet.write_number(row, 1, *max as f64)?;
    }
    worksheet.autofit();

    workbook
        .save(path)
        .with_context(|| format!("failed to save Excel file: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_names_are_cleaned_and_unique() {
        let mut taken = BTreeSet::from(["metadata".to_string()]);
        assert_eq!(sheet_name("A/B", &mut taken), "A_B");
        assert_eq!(sheet_name("a/b", &mut taken), "a_b (2)");
        assert_eq!(sheet_name("Metadata", &mut taken), "Metadata (2)");
        let long = "X".repeat(40);
        let name = sheet_name(&long, &mut taken);
        assert_eq!(name.chars().count(), MAX_SHEET_NAME);
        let again = sheet_name(&long, &mut taken);
        assert!(again.ends_with(" (2)"));
        assert_eq!(again.chars().count(), MAX_SHEET_NAME);
    }
}
