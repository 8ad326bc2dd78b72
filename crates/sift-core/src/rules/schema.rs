use serde::{Deserialize, Serialize};
use std::fmt;

/// A rule set describing which spreadsheet cells are which entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSetDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "GlobalSettings", default)]
    pub global_settings: GlobalSettingsDef,
    /// Entity rules in priority order: the first matching rule claims a cell.
    #[serde(rename = "Entities")]
    pub entities: Vec<EntityRuleDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettingsDef {
    #[serde(default = "default_skip_sheets")]
    pub default_skip_sheets: Vec<String>,
    #[serde(default)]
    pub default_check_for_strikethrough: bool,
}

impl Default for GlobalSettingsDef {
    fn default() -> Self {
        GlobalSettingsDef {
            default_skip_sheets: default_skip_sheets(),
            default_check_for_strikethrough: false,
        }
    }
}

fn default_skip_sheets() -> Vec<String> {
    vec!["Metadata".into(), "Instructions".into(), "Summary".into()]
}

fn default_true() -> bool {
    true
}

/// A single entity rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRuleDef {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub identifier: IdentifierDef,
    /// Sheets this rule applies to; `None` means every non-skipped sheet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_field_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replace_rules: Vec<ReplaceRuleDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_additional_column: Option<AdditionalColumnDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_sub_entities: Option<SubEntitiesDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub construct_fields: Vec<ConstructFieldDef>,
    /// `"ParentRule.fieldName"`: source candidates from another rule's records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_from_field: Option<String>,
    #[serde(default)]
    pub kind: EntityKind,
    /// Field holding the second key part of a compound entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_field_key: Option<String>,
    #[serde(flatten)]
    pub comparison: ComparisonDef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifierDef {
    /// One of `startswith`, `contains`, `exactmatch`, `regex` (any case).
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_for_strikethrough: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceRuleDef {
    pub find: String,
    pub replace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalColumnDef {
    pub target_key_name: String,
    pub search_header_name: String,
    /// Column letters (`"C"`, header in row 1) or header cells (`"C2"`).
    pub search_in_locations: Vec<String>,
    #[serde(default)]
    pub value_from_row_offset: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replace_rules: Vec<ReplaceRuleDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubEntitiesDef {
    pub sub_entity_name: String,
    pub regex: String,
    /// `"primaryFieldKey"` (default) or `"additional.<field>"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_value_from: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replace_rules: Vec<ReplaceRuleDef>,
    /// Inherit the parent cell's strike status.
    #[serde(default)]
    pub check_for_strikethrough: bool,
    #[serde(flatten)]
    pub comparison: ComparisonDef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructFieldDef {
    pub target_key_name: String,
    pub format_string: String,
    #[serde(default)]
    pub on_missing_source: OnMissingSource,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnMissingSource {
    #[default]
    SkipField,
    EmptyString,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[default]
    Simple,
    Compound,
}

/// Which external ID sequence an entity draws new IDs from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdPoolType {
    Dn,
    AgentGroup,
}

impl fmt::Display for IdPoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdPoolType::Dn => write!(f, "dn"),
            IdPoolType::AgentGroup => write!(f, "agent_group"),
        }
    }
}

/// How an entity type is matched against its external source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison_api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_pool_type: Option<IdPoolType>,
    /// External field holding the key (default `"name"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_key_field: Option<String>,
    /// External field holding the second key part (default `"IdealExpression"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_secondary_key_field: Option<String>,
    /// External field holding the numeric id (default `"id"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id_field: Option<String>,
    /// Predicate used instead of the rule's own identifier when filtering external records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_identifier: Option<IdentifierDef>,
    /// External records matching any of these are dropped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_exclude: Vec<IdentifierDef>,
}
