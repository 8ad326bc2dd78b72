use anyhow::Result;
use serde::Serialize;
use sift_core::engine::Extraction;
use sift_core::resolve::Resolution;
use std::path::{Path, PathBuf};

use crate::commands::{load_rules, read_input};
use crate::output;

#[derive(Serialize)]
struct ExtractOutput<'a> {
    extraction: &'a Extraction,
    resolution: &'a Resolution,
}

pub fn run(
    input_file: &Path,
    rule_file: Option<PathBuf>,
    preset: Option<String>,
    output_format: &str,
) -> Result<()> {
    let ruleset = load_rules(rule_file.as_deref(), preset.as_deref())?;
    let bytes = read_input(input_file)?;
    let (extraction, resolution) = sift_core::extract_workbook(&bytes, &ruleset)?;

    match output_format {
        "json" => output::json::print(&ExtractOutput {
            extraction: &extraction,
            resolution: &resolution,
        })?,
        _ => output::table::print_extraction(&extraction, &resolution),
    }
    Ok(())
}
