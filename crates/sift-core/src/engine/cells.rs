use std::collections::BTreeMap;

use crate::engine::context::TraversalContext;
use crate::engine::derive::{build_record, Anchor};
use crate::model::{ExtractedRecord, Workbook};
use crate::rules::compiled::{CompiledRule, CompiledRuleSet, RuleSource};
use crate::rules::matcher::Candidate;

/// Cell pass: match every unclaimed, non-blank cell against the cell-sourced
/// rules in declared order. The first matching rule claims the cell.
pub(crate) fn scan_cells(
    ctx: &mut TraversalContext,
    ruleset: &CompiledRuleSet,
    workbook: &Workbook,
    out: &mut BTreeMap<String, Vec<ExtractedRecord>>,
) {
    for (sheet_index, sheet) in workbook.sheets.iter().enumerate() {
        if !ruleset.visits_sheet(&sheet.name) {
            log::debug!("skipping sheet '{}'", sheet.name);
            continue;
        }
        let rules: Vec<&CompiledRule> = ruleset
            .enabled_rules()
            .filter(|r| r.source == RuleSource::Cells && r.applies_to_sheet(&sheet.name))
            .collect();
        if rules.is_empty() {
            continue;
        }

        let mut matched = 0usize;
        for (row, col, cell) in sheet.cells() {
            let Some(text) = cell.trimmed() else {
                continue;
            };
            if ctx.is_claimed(sheet_index, row, col) {
                continue;
            }
            let candidate = Candidate::new(text);
            let Some(rule) = rules
                .iter()
                .find(|r| r.identifier.matches_candidate(&candidate))
            else {
                continue;
            };
            ctx.claim(sheet_index, row, col);

            let anchor = Anchor {
                sheet_index,
                sheet,
                row,
                col,
            };
            let strike = rule.check_strike && cell.strike;
            let record = build_record(ctx, rule, &anchor, text, strike, None);
            log::debug!("{} matched '{}' at {}", rule.name, text, record.source);
            out.entry(rule.name.clone()).or_default().push(record);
            matched += 1;
        }
        log::info!("sheet '{}': {matched} cells matched", sheet.name);
    }
}
