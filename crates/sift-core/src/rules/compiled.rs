use regex::Regex;
use std::collections::BTreeSet;

use crate::parsing::address::HeaderLocation;
use crate::rules::matcher::Identifier;
use crate::rules::schema::{IdPoolType, OnMissingSource, RuleSetDef};

pub const DEFAULT_EXTERNAL_KEY_FIELD: &str = "name";
pub const DEFAULT_EXTERNAL_SECONDARY_KEY_FIELD: &str = "IdealExpression";
pub const DEFAULT_EXTERNAL_ID_FIELD: &str = "id";

/// Placeholder in `formatString` that resolves to the record's primary value.
pub const PRIMARY_PLACEHOLDER: &str = "_primary_";

/// A validated rule set, ready for extraction.
#[derive(Debug, Clone)]
pub struct CompiledRuleSet {
    pub name: Option<String>,
    pub skip_sheets: BTreeSet<String>,
    pub rules: Vec<CompiledRule>,
    /// Non-fatal findings from validation.
    pub warnings: Vec<String>,
    /// The definition this set was compiled from.
    pub def: RuleSetDef,
}

impl CompiledRuleSet {
    pub fn rule(&self, name: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn enabled_rules(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter().filter(|r| r.enabled)
    }

    /// Whether a sheet is visited during the cell pass.
    ///
    /// Skip-listed sheets are still visited when an enabled rule names them.
    pub fn visits_sheet(&self, sheet: &str) -> bool {
        if !self.skip_sheets.contains(sheet) {
            return true;
        }
        self.enabled_rules().any(|r| r.applies_to_sheet_explicitly(sheet))
    }
}

#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub name: String,
    pub enabled: bool,
    pub identifier: Identifier,
    /// Effective strike checking after applying the global default.
    pub check_strike: bool,
    pub sheets: Option<Vec<String>>,
    pub primary_field: String,
    pub replacements: Vec<(String, String)>,
    pub additional_column: Option<AdditionalColumn>,
    pub sub_entities: Option<SubEntitySpec>,
    pub construct_fields: Vec<ConstructField>,
    pub source: RuleSource,
    pub key: KeyKind,
    pub comparison: Comparison,
}

impl CompiledRule {
    /// Whether the rule may produce records from cells on this sheet.
    pub fn applies_to_sheet(&self, sheet: &str) -> bool {
        match self.sheets {
            Some(ref sheets) => sheets.iter().any(|s| s == sheet),
            None => true,
        }
    }

    fn applies_to_sheet_explicitly(&self, sheet: &str) -> bool {
        self.sheets
            .as_ref()
            .is_some_and(|sheets| sheets.iter().any(|s| s == sheet))
    }
}

/// Where a rule draws its candidate values from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    /// Every unclaimed, non-blank workbook cell.
    Cells,
    /// A field of records already produced by another rule.
    Field { parent: String, field: String },
}

/// How a record's comparison key is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyKind {
    Simple,
    /// Primary value joined with the value of `secondary_field`.
    Compound { secondary_field: String },
}

#[derive(Debug, Clone)]
pub struct AdditionalColumn {
    pub target: String,
    pub header: String,
    pub locations: Vec<HeaderLocation>,
    pub row_offset: i64,
    pub replacements: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct SubEntitySpec {
    pub name: String,
    pub pattern: Regex,
    pub source: SubEntitySource,
    pub replacements: Vec<(String, String)>,
    pub inherit_strike: bool,
    pub comparison: Comparison,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubEntitySource {
    Primary,
    Field(String),
}

impl SubEntitySource {
    pub fn parse(spec: &str) -> Option<SubEntitySource> {
        if spec == "primaryFieldKey" {
            return Some(SubEntitySource::Primary);
        }
        spec.strip_prefix("additional.")
            .filter(|f| !f.is_empty())
            .map(|f| SubEntitySource::Field(f.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct ConstructField {
    pub target: String,
    pub template: Vec<TemplatePart>,
    pub on_missing: OnMissingSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Literal(String),
    Placeholder(String),
}

/// Split a `formatString` into literal text and `{field}` placeholders.
///
/// A `{` without a closing `}`, or an empty `{}`, is kept as literal text.
pub fn parse_template(format: &str) -> Vec<TemplatePart> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut rest = format;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if close > 0 => {
                literal.push_str(&rest[..open]);
                if !literal.is_empty() {
                    parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
                }
                parts.push(TemplatePart::Placeholder(after[..close].trim().to_string()));
                rest = &after[close + 1..];
            }
            _ => {
                literal.push_str(&rest[..open + 1]);
                rest = after;
            }
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        parts.push(TemplatePart::Literal(literal));
    }
    parts
}

/// External-side matching settings for one entity group.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub source: Option<String>,
    pub id_pool: Option<IdPoolType>,
    pub key_field: String,
    pub secondary_key_field: String,
    pub id_field: String,
    /// Overrides the rule's own identifier when filtering external records.
    pub identifier: Option<Identifier>,
    pub exclude: Vec<Identifier>,
}
