pub mod builtin;
pub mod compiled;
pub mod matcher;
pub mod schema;

use crate::error::SiftError;
use crate::parsing::address::HeaderLocation;
use compiled::{
    parse_template, AdditionalColumn, Comparison, CompiledRule, CompiledRuleSet, ConstructField,
    KeyKind, RuleSource, SubEntitySource, SubEntitySpec, DEFAULT_EXTERNAL_ID_FIELD,
    DEFAULT_EXTERNAL_KEY_FIELD, DEFAULT_EXTERNAL_SECONDARY_KEY_FIELD,
};
use matcher::Identifier;
use regex::Regex;
use schema::{
    ComparisonDef, EntityKind, EntityRuleDef, GlobalSettingsDef, ReplaceRuleDef, RuleSetDef,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Top-level shape read before the rules themselves, so that a broken rule
/// can be reported by index and name.
#[derive(Deserialize)]
struct RawRuleSet {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "GlobalSettings", default)]
    global_settings: Option<serde_json::Value>,
    #[serde(rename = "Entities")]
    entities: Option<serde_json::Value>,
}

/// Load and compile a ruleset from a JSON file.
pub fn load_ruleset(path: &Path) -> Result<CompiledRuleSet, SiftError> {
    let content = std::fs::read_to_string(path).map_err(|e| SiftError::RulesetLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let raw: RawRuleSet = serde_json::from_str(&content).map_err(|e| SiftError::RulesetLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let ruleset = compile_raw(raw)?;
    log::info!(
        "loaded ruleset from {} ({} rules)",
        path.display(),
        ruleset.rules.len()
    );
    Ok(ruleset)
}

/// Parse and compile a ruleset from a JSON string.
pub fn parse_ruleset_str(json: &str) -> Result<CompiledRuleSet, SiftError> {
    let raw: RawRuleSet = serde_json::from_str(json)?;
    compile_raw(raw)
}

/// Compile an already deserialized definition.
pub fn compile_ruleset(def: RuleSetDef) -> Result<CompiledRuleSet, SiftError> {
    let rules = def
        .entities
        .iter()
        .enumerate()
        .map(|(i, rule)| compile_rule(i, rule, &def.global_settings))
        .collect::<Result<Vec<_>, _>>()?;
    check_cross_references(&rules)?;
    let warnings = collect_warnings(&def, &rules);
    for w in &warnings {
        log::warn!("{w}");
    }
    Ok(CompiledRuleSet {
        name: def.name.clone(),
        skip_sheets: def
            .global_settings
            .default_skip_sheets
            .iter()
            .cloned()
            .collect(),
        rules,
        warnings,
        def,
    })
}

fn compile_raw(raw: RawRuleSet) -> Result<CompiledRuleSet, SiftError> {
    let entities = match raw.entities {
        Some(serde_json::Value::Array(items)) => items,
        Some(_) => {
            return Err(SiftError::RulesetInvalid(
                "'Entities' must be a list of rules".into(),
            ))
        }
        None => {
            return Err(SiftError::RulesetInvalid(
                "missing 'Entities' list".into(),
            ))
        }
    };
    let global_settings = match raw.global_settings {
        Some(value) => GlobalSettingsDef::deserialize(value)
            .map_err(|e| SiftError::RulesetInvalid(format!("invalid 'GlobalSettings': {e}")))?,
        None => GlobalSettingsDef::default(),
    };

    let mut rules = Vec::with_capacity(entities.len());
    for (i, value) in entities.into_iter().enumerate() {
        let label = rule_label(i, value.get("name").and_then(|n| n.as_str()));
        let rule = EntityRuleDef::deserialize(value)
            .map_err(|e| SiftError::RulesetInvalid(format!("{label}: {e}")))?;
        rules.push(rule);
    }

    compile_ruleset(RuleSetDef {
        name: raw.name,
        description: raw.description,
        global_settings,
        entities: rules,
    })
}

fn rule_label(index: usize, name: Option<&str>) -> String {
    match name {
        Some(name) if !name.trim().is_empty() => format!("rule #{index} '{name}'"),
        _ => format!("rule #{index}"),
    }
}

fn invalid(label: &str, reason: impl std::fmt::Display) -> SiftError {
    SiftError::RulesetInvalid(format!("{label}: {reason}"))
}

fn replacements(rules: &[ReplaceRuleDef]) -> Vec<(String, String)> {
    rules
        .iter()
        .map(|r| (r.find.clone(), r.replace.clone()))
        .collect()
}

fn compile_rule(
    index: usize,
    def: &EntityRuleDef,
    global: &GlobalSettingsDef,
) -> Result<CompiledRule, SiftError> {
    let label = rule_label(index, Some(def.name.as_str()));
    if def.name.trim().is_empty() {
        return Err(invalid(&label, "rule name must not be empty"));
    }

    let identifier = Identifier::compile(&def.identifier).map_err(|e| invalid(&label, e))?;
    let check_strike = def
        .identifier
        .check_for_strikethrough
        .unwrap_or(global.default_check_for_strikethrough);

    let primary_field = match def.primary_field_key {
        Some(ref key) if key.trim().is_empty() => {
            return Err(invalid(&label, "primaryFieldKey must not be empty"))
        }
        Some(ref key) => key.clone(),
        None => def.name.clone(),
    };

    let additional_column = match def.fetch_additional_column {
        Some(ref fac) => {
            if fac.target_key_name.trim().is_empty() {
                return Err(invalid(
                    &label,
                    "fetchAdditionalColumn.targetKeyName must not be empty",
                ));
            }
            if fac.search_header_name.trim().is_empty() {
                return Err(invalid(
                    &label,
                    "fetchAdditionalColumn.searchHeaderName must not be empty",
                ));
            }
            let locations = fac
                .search_in_locations
                .iter()
                .map(|loc| {
                    HeaderLocation::parse(loc).ok_or_else(|| {
                        invalid(
                            &label,
                            format!(
                                "invalid searchInLocations entry '{loc}' (expected a column letter or cell address)"
                            ),
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Some(AdditionalColumn {
                target: fac.target_key_name.clone(),
                header: fac.search_header_name.clone(),
                locations,
                row_offset: fac.value_from_row_offset,
                replacements: replacements(&fac.replace_rules),
            })
        }
        None => None,
    };

    let sub_entities = match def.extract_sub_entities {
        Some(ref sub) => {
            if sub.sub_entity_name.trim().is_empty() {
                return Err(invalid(
                    &label,
                    "extractSubEntities.subEntityName must not be empty",
                ));
            }
            let pattern = Regex::new(&sub.regex).map_err(|e| {
                invalid(
                    &label,
                    format!("invalid extractSubEntities regex '{}': {e}", sub.regex),
                )
            })?;
            let source = match sub.source_value_from.as_deref() {
                None => SubEntitySource::Primary,
                Some(spec) => SubEntitySource::parse(spec).ok_or_else(|| {
                    invalid(
                        &label,
                        format!(
                            "invalid sourceValueFrom '{spec}' (expected 'primaryFieldKey' or 'additional.<field>')"
                        ),
                    )
                })?,
            };
            Some(SubEntitySpec {
                name: sub.sub_entity_name.clone(),
                pattern,
                source,
                replacements: replacements(&sub.replace_rules),
                inherit_strike: sub.check_for_strikethrough,
                comparison: compile_comparison(&label, &sub.comparison)?,
            })
        }
        None => None,
    };

    let mut construct_fields = Vec::with_capacity(def.construct_fields.len());
    for cf in &def.construct_fields {
        if cf.target_key_name.trim().is_empty() {
            return Err(invalid(
                &label,
                "constructFields entry has an empty targetKeyName",
            ));
        }
        if cf.format_string.is_empty() {
            return Err(invalid(
                &label,
                format!(
                    "constructFields entry '{}' has an empty formatString",
                    cf.target_key_name
                ),
            ));
        }
        construct_fields.push(ConstructField {
            target: cf.target_key_name.clone(),
            template: parse_template(&cf.format_string),
            on_missing: cf.on_missing_source,
        });
    }

    let source = match def.source_from_field {
        Some(ref spec) => {
            let parsed = spec
                .split_once('.')
                .map(|(p, f)| (p.trim(), f.trim()))
                .filter(|(p, f)| !p.is_empty() && !f.is_empty());
            match parsed {
                Some((parent, field)) => RuleSource::Field {
                    parent: parent.to_string(),
                    field: field.to_string(),
                },
                None => {
                    return Err(invalid(
                        &label,
                        format!("invalid sourceFromField '{spec}' (expected 'Rule.field')"),
                    ))
                }
            }
        }
        None => RuleSource::Cells,
    };

    let key = match def.kind {
        EntityKind::Simple => KeyKind::Simple,
        EntityKind::Compound => match def.secondary_field_key.as_deref().map(str::trim) {
            Some(field) if !field.is_empty() => KeyKind::Compound {
                secondary_field: field.to_string(),
            },
            _ => {
                return Err(invalid(
                    &label,
                    "compound rules require a non-empty secondaryFieldKey",
                ))
            }
        },
    };

    Ok(CompiledRule {
        name: def.name.clone(),
        enabled: def.enabled,
        identifier,
        check_strike,
        sheets: def.sheets.clone(),
        primary_field,
        replacements: replacements(&def.replace_rules),
        additional_column,
        sub_entities,
        construct_fields,
        source,
        key,
        comparison: compile_comparison(&label, &def.comparison)?,
    })
}

fn compile_comparison(label: &str, def: &ComparisonDef) -> Result<Comparison, SiftError> {
    let identifier = match def.external_identifier {
        Some(ref ident) => Some(
            Identifier::compile(ident)
                .map_err(|e| invalid(label, format!("externalIdentifier: {e}")))?,
        ),
        None => None,
    };
    let exclude = def
        .external_exclude
        .iter()
        .map(|ident| {
            Identifier::compile(ident).map_err(|e| invalid(label, format!("externalExclude: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Comparison {
        source: def.comparison_api_url.clone().filter(|s| !s.trim().is_empty()),
        id_pool: def.id_pool_type,
        key_field: def
            .external_key_field
            .clone()
            .unwrap_or_else(|| DEFAULT_EXTERNAL_KEY_FIELD.into()),
        secondary_key_field: def
            .external_secondary_key_field
            .clone()
            .unwrap_or_else(|| DEFAULT_EXTERNAL_SECONDARY_KEY_FIELD.into()),
        id_field: def
            .external_id_field
            .clone()
            .unwrap_or_else(|| DEFAULT_EXTERNAL_ID_FIELD.into()),
        identifier,
        exclude,
    })
}

/// Checks that need the whole rule list: unique names and field-sourced parents.
fn check_cross_references(rules: &[CompiledRule]) -> Result<(), SiftError> {
    let mut seen = HashSet::new();
    for (i, rule) in rules.iter().enumerate() {
        if !seen.insert(rule.name.as_str()) {
            return Err(invalid(
                &rule_label(i, Some(rule.name.as_str())),
                "duplicate rule name",
            ));
        }
    }

    for (i, rule) in rules.iter().enumerate() {
        let RuleSource::Field { ref parent, .. } = rule.source else {
            continue;
        };
        let label = rule_label(i, Some(rule.name.as_str()));
        if *parent == rule.name {
            return Err(invalid(&label, "sourceFromField cannot reference the rule itself"));
        }
        let Some(parent_index) = rules.iter().position(|r| r.name == *parent) else {
            return Err(invalid(
                &label,
                format!("sourceFromField references unknown rule '{parent}'"),
            ));
        };
        if matches!(rules[parent_index].source, RuleSource::Field { .. }) && parent_index > i {
            return Err(invalid(
                &label,
                format!(
                    "sourceFromField parent '{parent}' is itself field-sourced and must be declared earlier"
                ),
            ));
        }
    }
    Ok(())
}

fn collect_warnings(def: &RuleSetDef, rules: &[CompiledRule]) -> Vec<String> {
    let mut warnings = Vec::new();
    for (i, rule) in rules.iter().enumerate() {
        let label = rule_label(i, Some(rule.name.as_str()));
        if !rule.enabled {
            warnings.push(format!("{label} is disabled"));
        }
        if rule.sheets.as_ref().is_some_and(Vec::is_empty) {
            warnings.push(format!(
                "{label} has an empty sheets list and will never match"
            ));
        }
        if let Some(ref fac) = rule.additional_column {
            if fac.locations.is_empty() {
                warnings.push(format!(
                    "{label} fetchAdditionalColumn has no searchInLocations"
                ));
            }
        }
        if let KeyKind::Compound {
            ref secondary_field,
        } = rule.key
        {
            let produced = rule
                .additional_column
                .as_ref()
                .is_some_and(|fac| fac.target == *secondary_field)
                || rule.construct_fields.iter().any(|cf| cf.target == *secondary_field);
            if !produced {
                warnings.push(format!(
                    "{label} secondaryFieldKey '{secondary_field}' is not produced by fetchAdditionalColumn or constructFields"
                ));
            }
        }
        if let RuleSource::Field { ref parent, .. } = rule.source {
            if rules.iter().any(|r| r.name == *parent && !r.enabled) {
                warnings.push(format!(
                    "{label} sources from disabled rule '{parent}' and will produce nothing"
                ));
            }
        }
    }
    if def.entities.is_empty() {
        warnings.push("ruleset has no entity rules".into());
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::matcher::IdentifierKind;

    fn err_text(json: &str) -> String {
        match parse_ruleset_str(json) {
            Ok(_) => panic!("expected ruleset to be rejected"),
            Err(e) => e.to_string(),
        }
    }

    #[test]
    fn test_parse_minimal_ruleset() {
        let rs = parse_ruleset_str(
            r#"{ "Entities": [ { "name": "VQ", "identifier": { "type": "startswith", "value": "VQ_" } } ] }"#,
        )
        .unwrap();
        assert_eq!(rs.rules.len(), 1);
        let rule = &rs.rules[0];
        assert_eq!(rule.primary_field, "VQ");
        assert!(rule.enabled);
        assert!(!rule.check_strike);
        assert_eq!(rule.source, RuleSource::Cells);
        assert_eq!(rule.key, KeyKind::Simple);
        assert_eq!(rule.identifier.kind(), IdentifierKind::StartsWith);
        assert_eq!(rule.comparison.key_field, "name");
        assert_eq!(rule.comparison.id_field, "id");
        assert!(rs.skip_sheets.contains("Metadata"));
        assert!(rs.skip_sheets.contains("Instructions"));
        assert!(rs.skip_sheets.contains("Summary"));
    }

    #[test]
    fn test_global_strike_default_applies() {
        let rs = parse_ruleset_str(
            r#"{
                "GlobalSettings": { "defaultCheckForStrikethrough": true, "defaultSkipSheets": [] },
                "Entities": [
                    { "name": "A", "identifier": { "type": "contains", "value": "a" } },
                    { "name": "B", "identifier": { "type": "contains", "value": "b", "checkForStrikethrough": false } }
                ]
            }"#,
        )
        .unwrap();
        assert!(rs.rules[0].check_strike);
        assert!(!rs.rules[1].check_strike);
        assert!(rs.skip_sheets.is_empty());
    }

    #[test]
    fn test_missing_entities_rejected() {
        assert!(err_text(r#"{ "GlobalSettings": {} }"#).contains("Entities"));
        assert!(err_text(r#"{ "Entities": {} }"#).contains("Entities"));
    }

    #[test]
    fn test_missing_identifier_names_rule() {
        let msg = err_text(r#"{ "Entities": [ { "name": "VQ" } ] }"#);
        assert!(msg.contains("rule #0 'VQ'"), "{msg}");
        assert!(msg.contains("identifier"), "{msg}");
    }

    #[test]
    fn test_missing_name_rejected() {
        let msg = err_text(
            r#"{ "Entities": [ { "identifier": { "type": "contains", "value": "x" } } ] }"#,
        );
        assert!(msg.contains("rule #0"), "{msg}");
        assert!(msg.contains("name"), "{msg}");
    }

    #[test]
    fn test_unknown_identifier_type_rejected() {
        let msg = err_text(
            r#"{ "Entities": [ { "name": "VQ", "identifier": { "type": "fuzzy", "value": "x" } } ] }"#,
        );
        assert!(msg.contains("fuzzy"), "{msg}");
    }

    #[test]
    fn test_bad_regexes_rejected() {
        err_text(
            r#"{ "Entities": [ { "name": "VQ", "identifier": { "type": "regex", "value": "(" } } ] }"#,
        );
        err_text(
            r#"{ "Entities": [ { "name": "E", "identifier": { "type": "contains", "value": ">" },
                "extractSubEntities": { "subEntityName": "Skills", "regex": "[" } } ] }"#,
        );
        err_text(
            r#"{ "Entities": [ { "name": "E", "identifier": { "type": "contains", "value": ">" },
                "externalExclude": [ { "type": "regex", "value": "(" } ] } ] }"#,
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let msg = err_text(
            r#"{ "Entities": [
                { "name": "VQ", "identifier": { "type": "contains", "value": "a" } },
                { "name": "VQ", "identifier": { "type": "contains", "value": "b" } }
            ] }"#,
        );
        assert!(msg.contains("duplicate"), "{msg}");
    }

    #[test]
    fn test_bad_search_location_rejected() {
        let msg = err_text(
            r#"{ "Entities": [ { "name": "E", "identifier": { "type": "contains", "value": ">" },
                "fetchAdditionalColumn": { "targetKeyName": "Ideal", "searchHeaderName": "Ideal Agent",
                    "searchInLocations": ["C", "2C"] } } ] }"#,
        );
        assert!(msg.contains("2C"), "{msg}");
    }

    #[test]
    fn test_unknown_on_missing_source_rejected() {
        let msg = err_text(
            r#"{ "Entities": [ { "name": "E", "identifier": { "type": "contains", "value": "x" },
                "constructFields": [ { "targetKeyName": "T", "formatString": "{a}", "onMissingSource": "explode" } ] } ] }"#,
        );
        assert!(msg.contains("rule #0 'E'"), "{msg}");
    }

    #[test]
    fn test_source_from_field_resolution() {
        let rs = parse_ruleset_str(
            r#"{ "Entities": [
                { "name": "Expr", "identifier": { "type": "contains", "value": ">" } },
                { "name": "Skill", "sourceFromField": "Expr.Expr",
                  "identifier": { "type": "regex", "value": "([A-Za-z_]+)>\\d+" } }
            ] }"#,
        )
        .unwrap();
        assert_eq!(
            rs.rules[1].source,
            RuleSource::Field {
                parent: "Expr".into(),
                field: "Expr".into()
            }
        );
    }

    #[test]
    fn test_source_from_field_errors() {
        assert!(err_text(
            r#"{ "Entities": [ { "name": "S", "sourceFromField": "S.x",
                "identifier": { "type": "contains", "value": "x" } } ] }"#
        )
        .contains("itself"));
        assert!(err_text(
            r#"{ "Entities": [ { "name": "S", "sourceFromField": "Nope.x",
                "identifier": { "type": "contains", "value": "x" } } ] }"#
        )
        .contains("unknown rule"));
        assert!(err_text(
            r#"{ "Entities": [ { "name": "S", "sourceFromField": "Sx",
                "identifier": { "type": "contains", "value": "x" } } ] }"#
        )
        .contains("Rule.field"));
        assert!(err_text(
            r#"{ "Entities": [
                { "name": "A", "sourceFromField": "B.f", "identifier": { "type": "contains", "value": "x" } },
                { "name": "B", "sourceFromField": "C.f", "identifier": { "type": "contains", "value": "x" } },
                { "name": "C", "identifier": { "type": "contains", "value": "x" } }
            ] }"#
        )
        .contains("declared earlier"));
    }

    #[test]
    fn test_compound_requires_secondary_field() {
        let msg = err_text(
            r#"{ "Entities": [ { "name": "E", "kind": "compound",
                "identifier": { "type": "contains", "value": ">" } } ] }"#,
        );
        assert!(msg.contains("secondaryFieldKey"), "{msg}");
    }

    #[test]
    fn test_warnings_collected() {
        let rs = parse_ruleset_str(
            r#"{ "Entities": [
                { "name": "A", "enabled": false, "identifier": { "type": "contains", "value": "a" } },
                { "name": "B", "sheets": [], "identifier": { "type": "contains", "value": "b" } },
                { "name": "C", "kind": "compound", "secondaryFieldKey": "Ideal",
                  "identifier": { "type": "contains", "value": ">" } }
            ] }"#,
        )
        .unwrap();
        assert_eq!(rs.warnings.len(), 3, "{:?}", rs.warnings);
    }

    #[test]
    fn test_visits_sheet_respects_skip_override() {
        let rs = parse_ruleset_str(
            r#"{ "Entities": [
                { "name": "A", "sheets": ["Summary"], "identifier": { "type": "contains", "value": "a" } }
            ] }"#,
        )
        .unwrap();
        assert!(rs.visits_sheet("Summary"));
        assert!(!rs.visits_sheet("Metadata"));
        assert!(rs.visits_sheet("Routing"));
    }

    #[test]
    fn test_load_ruleset_missing_file() {
        let err = load_ruleset(Path::new("/nonexistent/rules.json")).unwrap_err();
        assert!(matches!(err, SiftError::RulesetLoad { .. }));
    }
}
