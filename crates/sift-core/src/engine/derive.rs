//! Record construction shared by the cell pass and the field pass.

use std::collections::BTreeMap;

use crate::engine::context::TraversalContext;
use crate::error::ExtractionFieldError;
use crate::model::{CellRef, ExtractedRecord, ParentRef, SubEntityValue, Worksheet};
use crate::parsing::normalize::apply_replacements;
use crate::rules::compiled::{
    AdditionalColumn, CompiledRule, ConstructField, SubEntitySource, SubEntitySpec, TemplatePart,
    PRIMARY_PLACEHOLDER,
};
use crate::rules::matcher::find_all;
use crate::rules::schema::OnMissingSource;

/// Result of building one constructed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOutcome {
    Value(String),
    /// A source was missing and the field is left out.
    Skip,
    Failed(ExtractionFieldError),
}

/// Where a record is anchored in the workbook.
pub(crate) struct Anchor<'a> {
    pub sheet_index: usize,
    pub sheet: &'a Worksheet,
    pub row: u32,
    pub col: u32,
}

impl Anchor<'_> {
    fn cell_ref(&self) -> CellRef {
        CellRef {
            sheet: self.sheet.name.clone(),
            row: self.row,
            col: self.col,
        }
    }
}

/// Build a record for `rule` from a matched value.
///
/// Steps run in a fixed order: replace rules, additional column, constructed
/// fields, sub-entities. `strike` is the already-resolved strike status.
pub(crate) fn build_record(
    ctx: &mut TraversalContext,
    rule: &CompiledRule,
    anchor: &Anchor<'_>,
    matched: &str,
    strike: bool,
    parent: Option<ParentRef>,
) -> ExtractedRecord {
    let primary = apply_replacements(matched, &rule.replacements);
    let mut fields = BTreeMap::new();
    fields.insert(rule.primary_field.clone(), primary.clone());

    if let Some(ref fac) = rule.additional_column {
        if let Some(value) = fetch_additional(ctx, &rule.name, fac, anchor) {
            fields.insert(fac.target.clone(), value);
        }
    }

    for cf in &rule.construct_fields {
        match construct_field(cf, &primary, &fields) {
            FieldOutcome::Value(v) => {
                fields.insert(cf.target.clone(), v);
            }
            FieldOutcome::Skip => {
                log::debug!(
                    "{} at {}: skipped constructed field '{}'",
                    rule.name,
                    anchor.cell_ref(),
                    cf.target
                );
            }
            FieldOutcome::Failed(e) => ctx.record_issue(&rule.name, anchor.cell_ref(), e),
        }
    }

    let mut sub_entities = BTreeMap::new();
    if let Some(ref spec) = rule.sub_entities {
        let values = extract_sub_entities(spec, &rule.primary_field, &fields, strike);
        if !values.is_empty() {
            sub_entities.insert(spec.name.clone(), values);
        }
    }

    ExtractedRecord {
        entity: rule.name.clone(),
        primary_field: rule.primary_field.clone(),
        fields,
        sub_entities,
        strike,
        source: anchor.cell_ref(),
        parent,
    }
}

/// Read the value under a header column on the anchor's row plus offset.
///
/// Blank cells and missing headers leave the field absent; positions outside
/// the sheet are recorded as issues.
fn fetch_additional(
    ctx: &mut TraversalContext,
    entity: &str,
    fac: &AdditionalColumn,
    anchor: &Anchor<'_>,
) -> Option<String> {
    let col = ctx.header_column(anchor.sheet_index, anchor.sheet, &fac.header, &fac.locations)?;
    let sheet = anchor.sheet;

    let target_row = anchor.row as i64 + fac.row_offset;
    if target_row < 1 || target_row > sheet.max_row() as i64 {
        ctx.record_issue(
            entity,
            anchor.cell_ref(),
            ExtractionFieldError::RowOutOfBounds {
                sheet: sheet.name.clone(),
                row: target_row,
                offset: fac.row_offset,
            },
        );
        return None;
    }
    if col > sheet.max_col() {
        ctx.record_issue(
            entity,
            anchor.cell_ref(),
            ExtractionFieldError::ColumnOutOfBounds {
                sheet: sheet.name.clone(),
                col,
                max_col: sheet.max_col(),
            },
        );
        return None;
    }

    let value = sheet.cell(target_row as u32, col).and_then(|c| c.trimmed())?;
    Some(apply_replacements(value, &fac.replacements))
}

/// Fill a `formatString` from the record's fields.
pub fn construct_field(
    cf: &ConstructField,
    primary: &str,
    fields: &BTreeMap<String, String>,
) -> FieldOutcome {
    let mut out = String::new();
    for part in &cf.template {
        match part {
            TemplatePart::Literal(text) => out.push_str(text),
            TemplatePart::Placeholder(name) if name == PRIMARY_PLACEHOLDER => out.push_str(primary),
            TemplatePart::Placeholder(name) => match fields.get(name) {
                Some(value) => out.push_str(value),
                None => match cf.on_missing {
                    OnMissingSource::SkipField => return FieldOutcome::Skip,
                    OnMissingSource::EmptyString => {}
                    OnMissingSource::Error => {
                        return FieldOutcome::Failed(ExtractionFieldError::MissingSource {
                            target: cf.target.clone(),
                            field: name.clone(),
                        })
                    }
                },
            },
        }
    }
    FieldOutcome::Value(out)
}

fn extract_sub_entities(
    spec: &SubEntitySpec,
    primary_field: &str,
    fields: &BTreeMap<String, String>,
    parent_strike: bool,
) -> Vec<SubEntityValue> {
    let source = match spec.source {
        SubEntitySource::Primary => fields.get(primary_field),
        SubEntitySource::Field(ref name) => fields.get(name),
    };
    let Some(source) = source else {
        return Vec::new();
    };
    find_all(&spec.pattern, source)
        .into_iter()
        .filter_map(|m| {
            let value = apply_replacements(m.trim(), &spec.replacements)
                .trim()
                .to_string();
            if value.is_empty() {
                None
            } else {
                Some(SubEntityValue {
                    value,
                    strike: spec.inherit_strike && parent_strike,
                })
            }
        })
        .collect()
}
