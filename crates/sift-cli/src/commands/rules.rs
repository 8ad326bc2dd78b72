use anyhow::Result;
use sift_core::rules::builtin;
use sift_core::rules::compiled::{CompiledRule, CompiledRuleSet, KeyKind, RuleSource};
use sift_core::rules::schema::EntityRuleDef;
use std::path::Path;

pub fn list() -> Result<()> {
    println!("Available predefined rulesets:\n");
    for name in builtin::PRESETS {
        let rs = builtin::load_preset(name)?;
        let entities: Vec<&str> = rs.rules.iter().map(|r| r.name.as_str()).collect();
        println!(
            "  {:<10} {} [{}]",
            name,
            rs.name.as_deref().unwrap_or(name),
            entities.join(", ")
        );
        if let Some(ref desc) = rs.def.description {
            println!("             {}", desc);
        }
        println!();
    }
    Ok(())
}

fn describe_source(rule: &CompiledRule) -> String {
    match rule.source {
        RuleSource::Cells => match rule.sheets {
            Some(ref sheets) => format!("cells on sheets: {}", sheets.join(", ")),
            None => "cells on every sheet not skipped".to_string(),
        },
        RuleSource::Field {
            ref parent,
            ref field,
        } => format!("field '{field}' of {parent} records"),
    }
}

fn explain_rule(rule: &CompiledRule, def: &EntityRuleDef) {
    let state = if rule.enabled { "" } else { " (disabled)" };
    println!("  {}{}", rule.name, state);
    println!(
        "    match:    {} \"{}\"{}",
        rule.identifier.kind().as_str(),
        def.identifier.value,
        if def.identifier.case_sensitive {
            ", case-sensitive"
        } else {
            ""
        }
    );
    println!("    from:     {}", describe_source(rule));
    println!("    stored as {}", rule.primary_field);
    if rule.check_strike {
        println!("    struck-through values are tracked");
    }
    if let KeyKind::Compound {
        ref secondary_field,
    } = rule.key
    {
        println!("    key:      {} + {}", rule.primary_field, secondary_field);
    }
    if let Some(ref ac) = rule.additional_column {
        println!(
            "    column:   '{}' -> {} (row offset {})",
            ac.header, ac.target, ac.row_offset
        );
    }
    for cf in &def.construct_fields {
        println!(
            "    builds:   {} = \"{}\"",
            cf.target_key_name, cf.format_string
        );
    }
    if let Some(ref sub) = rule.sub_entities {
        println!(
            "    yields:   {} via /{}/",
            sub.name,
            sub.pattern.as_str()
        );
    }
    if let Some(ref src) = rule.comparison.source {
        let pool = rule
            .comparison
            .id_pool
            .map(|p| format!(", ids from {p}"))
            .unwrap_or_default();
        println!(
            "    compare:  '{}' by {}{}",
            src, rule.comparison.key_field, pool
        );
    }
    println!();
}

fn print_ruleset(rs: &CompiledRuleSet) {
    for (rule, def) in rs.rules.iter().zip(&rs.def.entities) {
        explain_rule(rule, def);
    }
}

pub fn explain(preset: &str) -> Result<()> {
    let rs = builtin::load_preset(preset)?;

    println!("{}\n", rs.name.as_deref().unwrap_or(preset));
    if let Some(ref desc) = rs.def.description {
        println!("{}\n", desc);
    }

    let skipped: Vec<&str> = rs.skip_sheets.iter().map(String::as_str).collect();
    println!("Sheets skipped unless a rule names them: {}\n", skipped.join(", "));
    println!(
        "Rules are tried in this order; the first rule that matches a cell claims it:\n"
    );
    print_ruleset(&rs);
    Ok(())
}

pub fn schema() -> Result<()> {
    print!(
        r#"JSON Rule Schema
================

A rule file tells sift which cells of a workbook hold which entity type,
how to derive extra fields from them, and which external data they are
compared against.

Top-level fields:
  name            (string, optional)  Display name
  description     (string, optional)
  GlobalSettings  (object, optional)
    defaultSkipSheets             (array)  Sheets not scanned unless a rule
                                           lists them. Default:
                                           ["Metadata", "Instructions", "Summary"]
    defaultCheckForStrikethrough  (bool)   Default: false
  Entities        (array, required)   Rules, tried in order. The first rule
                                      that matches a cell claims it.

Each rule in "Entities":
  name              (string, required)  Entity type, unique in the file
  enabled           (bool, optional)    Default: true
  identifier        (object, required)
    type            startswith | contains | exactmatch | regex
    value           (string) Text or pattern to match
    caseSensitive   (bool)   Default: false. Regex patterns always match as
                             written; use (?i) inside the pattern instead.
    checkForStrikethrough (bool) Track struck-through cells for this rule
  sheets            (array, optional)   Only scan these sheets
  primaryFieldKey   (string, optional)  Field name for the matched value.
                                        Default: the rule name
  replaceRules      (array, optional)   [{{"find": "..", "replace": ".."}}]
  fetchAdditionalColumn (object, optional)
    targetKeyName, searchHeaderName, searchInLocations (["C", "C2", ...]),
    valueFromRowOffset (int), replaceRules
  extractSubEntities (object, optional)
    subEntityName, regex, sourceValueFrom ("primaryFieldKey" or
    "additional.<field>"), replaceRules, checkForStrikethrough,
    plus the comparison fields below
  constructFields   (array, optional)
    targetKeyName, formatString ("{{Field}}", "{{_primary_}}"),
    onMissingSource (skip_field | empty_string | error)
  sourceFromField   (string, optional)  "Rule.field": match against a field of
                                        another rule's records instead of cells
  kind              simple | compound   compound keys join the primary value
  secondaryFieldKey (string)            with this field (required for compound)

Comparison fields (on a rule or on extractSubEntities):
  comparisonApiUrl            Name of the external data source
  idPoolType                  dn | agent_group
  externalKeyField            Default: "name"
  externalSecondaryKeyField   Default: "IdealExpression"
  externalIdField             Default: "id"
  externalIdentifier          Filter for external keys (same shape as identifier)
  externalExclude             Array of identifiers; matching keys are dropped

Example:
{{
  "GlobalSettings": {{ "defaultCheckForStrikethrough": true }},
  "Entities": [
    {{
      "name": "VQ",
      "identifier": {{ "type": "startswith", "value": "VQ_" }},
      "primaryFieldKey": "VQ_Name",
      "comparisonApiUrl": "dn",
      "idPoolType": "dn"
    }}
  ]
}}

Run `sift rules explain routing` to see the built-in preset.
"#
    );
    Ok(())
}

pub fn validate(file: &Path) -> Result<()> {
    let rs = sift_core::rules::load_ruleset(file)?;

    let enabled = rs.enabled_rules().count();
    println!(
        "Ruleset '{}' is valid.",
        rs.name.as_deref().unwrap_or("(unnamed)")
    );
    println!("  Rules: {} ({} enabled)", rs.rules.len(), enabled);

    if !rs.warnings.is_empty() {
        println!("\nWarnings:");
        for w in &rs.warnings {
            println!("  - {}", w);
        }
    }

    Ok(())
}
