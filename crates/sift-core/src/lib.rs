pub mod engine;
pub mod error;
pub mod extraction;
pub mod model;
pub mod parsing;
pub mod reconcile;
pub mod resolve;
pub mod rules;
pub mod simulate;

use engine::Extraction;
use error::SiftError;
use model::Workbook;
use reconcile::report::ReportBook;
use reconcile::{ExternalInputs, Reconciliation};
use resolve::Resolution;
use rules::compiled::CompiledRuleSet;
use serde::Serialize;

/// Everything a full run produces, from raw records to report rows.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub extraction: Extraction,
    pub resolution: Resolution,
    pub reconciliation: Reconciliation,
}

impl PipelineResult {
    pub fn report(&self) -> ReportBook {
        ReportBook::build(&self.resolution, &self.reconciliation)
    }
}

/// Extract and resolve entities from xlsx bytes.
pub fn extract_workbook(
    xlsx_bytes: &[u8],
    ruleset: &CompiledRuleSet,
) -> Result<(Extraction, Resolution), SiftError> {
    let workbook = extraction::read_workbook(xlsx_bytes)?;
    let extraction = engine::extract(ruleset, &workbook);
    let resolution = resolve::resolve(ruleset, &extraction);
    Ok((extraction, resolution))
}

/// Main API entry point: extract, resolve and reconcile an in-memory workbook.
///
/// External payloads that are missing or malformed never fail the run; the
/// affected groups compare against an empty set and carry the reason.
pub fn run_workbook(
    workbook: &Workbook,
    ruleset: &CompiledRuleSet,
    inputs: &ExternalInputs,
) -> PipelineResult {
    let extraction = engine::extract(ruleset, workbook);
    let resolution = resolve::resolve(ruleset, &extraction);
    let reconciliation = reconcile::reconcile(ruleset, &resolution, inputs);
    PipelineResult {
        extraction,
        resolution,
        reconciliation,
    }
}

/// [`run_workbook`] over xlsx bytes.
pub fn run_pipeline(
    xlsx_bytes: &[u8],
    ruleset: &CompiledRuleSet,
    inputs: &ExternalInputs,
) -> Result<PipelineResult, SiftError> {
    let workbook = extraction::read_workbook(xlsx_bytes)?;
    log::debug!("read {} sheets", workbook.sheets.len());
    Ok(run_workbook(&workbook, ruleset, inputs))
}
