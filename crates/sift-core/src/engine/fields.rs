use std::collections::BTreeMap;

use crate::engine::context::TraversalContext;
use crate::engine::derive::{build_record, Anchor};
use crate::model::{ExtractedRecord, ParentRef, Workbook};
use crate::rules::compiled::{CompiledRuleSet, RuleSource};

/// Field pass: derive records for field-sourced rules from the records of
/// their parent rule, in declared order.
///
/// Children inherit the parent's cell as their anchor, so sheet filters and
/// additional-column lookups behave as if the child sat in the parent's cell.
pub(crate) fn scan_fields(
    ctx: &mut TraversalContext,
    ruleset: &CompiledRuleSet,
    workbook: &Workbook,
    out: &mut BTreeMap<String, Vec<ExtractedRecord>>,
) {
    for rule in ruleset.enabled_rules() {
        let RuleSource::Field {
            ref parent,
            ref field,
        } = rule.source
        else {
            continue;
        };

        let mut children = Vec::new();
        for record in out.get(parent).map(Vec::as_slice).unwrap_or_default() {
            if !rule.applies_to_sheet(&record.source.sheet) {
                continue;
            }
            let Some(source) = record.field(field) else {
                continue;
            };
            let Some((sheet_index, sheet)) = workbook
                .sheets
                .iter()
                .enumerate()
                .find(|(_, s)| s.name == record.source.sheet)
            else {
                continue;
            };
            let anchor = Anchor {
                sheet_index,
                sheet,
                row: record.source.row,
                col: record.source.col,
            };
            let strike = rule.check_strike && record.strike;

            for candidate in rule.identifier.extract_all(source) {
                let value = candidate.trim();
                if value.is_empty() {
                    continue;
                }
                let parent_ref = ParentRef {
                    entity: parent.clone(),
                    key: record.primary().to_string(),
                };
                children.push(build_record(
                    ctx,
                    rule,
                    &anchor,
                    value,
                    strike,
                    Some(parent_ref),
                ));
            }
        }

        log::info!(
            "{}: {} records derived from {}.{}",
            rule.name,
            children.len(),
            parent,
            field
        );
        out.entry(rule.name.clone()).or_default().extend(children);
    }
}
