mod cells;
mod context;
pub mod derive;
mod fields;

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::ExtractionFieldError;
use crate::model::{CellRef, ExtractedRecord, Workbook};
use crate::rules::compiled::CompiledRuleSet;
use context::TraversalContext;

/// A field failure that was absorbed during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionIssue {
    pub entity: String,
    pub location: CellRef,
    pub error: ExtractionFieldError,
}

/// Everything one extraction run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Extraction {
    /// Records per rule name; every enabled rule has an entry.
    pub entities: BTreeMap<String, Vec<ExtractedRecord>>,
    pub issues: Vec<ExtractionIssue>,
}

impl Extraction {
    pub fn records(&self, entity: &str) -> &[ExtractedRecord] {
        self.entities
            .get(entity)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn record_count(&self) -> usize {
        self.entities.values().map(Vec::len).sum()
    }
}

/// Run both extraction passes over a workbook.
///
/// Per-field failures never abort the run; they end up in
/// [`Extraction::issues`].
pub fn extract(ruleset: &CompiledRuleSet, workbook: &Workbook) -> Extraction {
    let mut ctx = TraversalContext::new();
    let mut entities: BTreeMap<String, Vec<ExtractedRecord>> = ruleset
        .enabled_rules()
        .map(|r| (r.name.clone(), Vec::new()))
        .collect();

    cells::scan_cells(&mut ctx, ruleset, workbook, &mut entities);
    fields::scan_fields(&mut ctx, ruleset, workbook, &mut entities);

    let extraction = Extraction {
        entities,
        issues: ctx.issues,
    };
    log::info!(
        "extracted {} records ({} issues)",
        extraction.record_count(),
        extraction.issues.len()
    );
    extraction
}
