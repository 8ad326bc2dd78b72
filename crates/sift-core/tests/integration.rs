//! End-to-end runs of the extraction and reconciliation pipeline.
//!
//! Most tests build workbooks in memory; the preset tests write a real xlsx
//! with rust_xlsxwriter so strike formatting goes through the styles reader.

use std::collections::BTreeSet;

use rust_xlsxwriter::{Format, Workbook as XlsxWriter};
use serde_json::json;
use sift_core::error::ExtractionFieldError;
use sift_core::model::{Cell, Workbook, Worksheet};
use sift_core::reconcile::report::{STATUS_MISSING, STATUS_NEW};
use sift_core::reconcile::ExternalInputs;
use sift_core::rules::builtin::load_preset;
use sift_core::rules::compiled::CompiledRuleSet;
use sift_core::rules::parse_ruleset_str;
use sift_core::rules::schema::IdPoolType;
use sift_core::{run_pipeline, run_workbook};

fn vq_rules() -> CompiledRuleSet {
    parse_ruleset_str(
        r#"{ "Entities": [
            { "name": "VQ", "primaryFieldKey": "VQ_Name",
              "identifier": { "type": "startswith", "value": "VQ_", "checkForStrikethrough": true },
              "comparisonApiUrl": "dn", "idPoolType": "dn" }
        ] }"#,
    )
    .unwrap()
}

fn keys(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Scenario A: a plain non-struck match
// ---------------------------------------------------------------------------
#[test]
fn scenario_a_simple_match() {
    let rs = vq_rules();
    let wb = Workbook::new(vec![Worksheet::from_rows("Routing", &[&["VQ_Sales"]])]);
    let result = run_workbook(&wb, &rs, &ExternalInputs::new());

    let records = result.extraction.records("VQ");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].field("VQ_Name"), Some("VQ_Sales"));
    assert!(!records[0].strike);

    let group = result.resolution.group("VQ").unwrap();
    assert_eq!(group.comparable_keys(), keys(&["VQ_Sales"]));
}

// ---------------------------------------------------------------------------
// Scenario B: the same value struck and not struck
// ---------------------------------------------------------------------------
#[test]
fn scenario_b_live_occurrence_wins() {
    let rs = vq_rules();
    let mut sheet = Worksheet::new("Routing");
    sheet.set(1, 1, Cell::struck("VQ_Sales"));
    sheet.set(5, 2, Cell::text("VQ_Sales"));
    let result = run_workbook(&Workbook::new(vec![sheet]), &rs, &ExternalInputs::new());

    let group = result.resolution.group("VQ").unwrap();
    let entry = &group.entries["VQ_Sales"];
    assert!(!entry.strike);
    assert_eq!(entry.occurrences, 2);
    assert_eq!(group.comparable_keys(), keys(&["VQ_Sales"]));
}

// ---------------------------------------------------------------------------
// Scenario C: compound key and sub-entities from the preset
// ---------------------------------------------------------------------------
#[test]
fn scenario_c_compound_key_and_skills() {
    let rs = load_preset("routing").unwrap();
    let wb = Workbook::new(vec![Worksheet::from_rows(
        "Routing",
        &[
            &["Queue", "Expression", "Ideal Agent"],
            &["", "SkillA>5&SkillB>3", "SkillC>1"],
        ],
    )]);
    let result = run_workbook(&wb, &rs, &ExternalInputs::new());

    let exprs = result.resolution.group("SkillExpr").unwrap();
    assert!(exprs.compound);
    let entry = &exprs.entries["SkillA>5 & SkillB>3 SkillC>1"];
    assert_eq!(entry.expr.as_deref(), Some("SkillA>5 & SkillB>3"));
    assert_eq!(entry.ideal.as_deref(), Some("SkillC>1"));

    let record = result
        .extraction
        .records("SkillExpr")
        .iter()
        .find(|r| r.primary() == "SkillA>5&SkillB>3")
        .unwrap();
    let skills: Vec<&str> = record.sub_entities["Skills"]
        .iter()
        .map(|s| s.value.as_str())
        .collect();
    assert_eq!(skills, vec!["SkillA", "SkillB"]);

    let skill_group = result.resolution.group("Skills").unwrap();
    assert!(skill_group.comparable_keys().contains("SkillA"));
    assert!(skill_group.comparable_keys().contains("SkillB"));
}

// ---------------------------------------------------------------------------
// Scenario D: external key with only a struck local counterpart
// ---------------------------------------------------------------------------
#[test]
fn scenario_d_struck_only_is_missing_locally() {
    let rs = vq_rules();
    let mut sheet = Worksheet::new("Routing");
    sheet.set(2, 1, Cell::struck("VQ_Sales"));
    let mut inputs = ExternalInputs::new();
    inputs.insert("dn", json!([{ "data": { "name": "VQ_Sales", "id": "1042" } }]));

    let result = run_workbook(&Workbook::new(vec![sheet]), &rs, &inputs);
    let vq = result.reconciliation.group("VQ").unwrap();
    assert!(vq.new_locally.is_empty());
    assert_eq!(vq.missing_locally.len(), 1);
    assert_eq!(vq.missing_locally[0].key, "VQ_Sales");
    assert_eq!(vq.missing_locally[0].id, "1042");

    let report = result.report();
    let sheet = report.comparison("VQ").unwrap();
    assert_eq!(sheet.rows, vec![vec!["VQ_Sales", "1042", STATUS_MISSING]]);
}

// ---------------------------------------------------------------------------
// Scenario E: a failing constructed field does not lose the record
// ---------------------------------------------------------------------------
#[test]
fn scenario_e_construct_error_is_contained() {
    let rs = parse_ruleset_str(
        r#"{ "Entities": [
            { "name": "VQ", "primaryFieldKey": "VQ_Name",
              "identifier": { "type": "startswith", "value": "VQ_" },
              "constructFields": [
                { "targetKeyName": "Broken", "formatString": "{Nowhere}", "onMissingSource": "error" },
                { "targetKeyName": "Label", "formatString": "queue {VQ_Name}" }
              ] }
        ] }"#,
    )
    .unwrap();
    let wb = Workbook::new(vec![Worksheet::from_rows("Routing", &[&["VQ_Sales"]])]);
    let result = run_workbook(&wb, &rs, &ExternalInputs::new());

    let record = &result.extraction.records("VQ")[0];
    assert_eq!(record.field("VQ_Name"), Some("VQ_Sales"));
    assert_eq!(record.field("Label"), Some("queue VQ_Sales"));
    assert_eq!(record.field("Broken"), None);

    assert_eq!(result.extraction.issues.len(), 1);
    let issue = &result.extraction.issues[0];
    assert_eq!(issue.location.to_string(), "Routing!A1");
    assert!(matches!(
        issue.error,
        ExtractionFieldError::MissingSource { ref field, .. } if field == "Nowhere"
    ));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------
fn mixed_workbook() -> Workbook {
    let mut routing = Worksheet::from_rows(
        "Routing",
        &[
            &["Queue", "Expression", "Ideal Agent"],
            &["VQ_Sales", "SkillA>5 & SkillB>3", "SkillC>1"],
            &["VQ_Support", "SkillA>2", ""],
        ],
    );
    routing.set(4, 1, Cell::struck("VQ_Sales"));
    routing.set(4, 2, Cell::struck("SkillZ>9"));
    let targeting = Worksheet::from_rows("Default Targeting- Group", &[&["VAG_Team", "VQ_Support"]]);
    let skipped = Worksheet::from_rows("Metadata", &[&["VQ_Meta", "VAG_Meta"]]);
    Workbook::new(vec![routing, targeting, skipped])
}

#[test]
fn runs_are_idempotent() {
    let rs = load_preset("routing").unwrap();
    let wb = mixed_workbook();
    let mut inputs = ExternalInputs::new();
    inputs.insert("dn", json!([{ "name": "VQ_Old", "id": 3 }]));

    let first = serde_json::to_value(run_workbook(&wb, &rs, &inputs)).unwrap();
    let second = serde_json::to_value(run_workbook(&wb, &rs, &inputs)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn pass_one_claims_are_exclusive() {
    let rs = load_preset("routing").unwrap();
    let result = run_workbook(&mixed_workbook(), &rs, &ExternalInputs::new());

    let mut seen = BTreeSet::new();
    for records in result.extraction.entities.values() {
        for record in records.iter().filter(|r| r.parent.is_none()) {
            assert!(seen.insert(record.source.clone()), "claimed twice: {}", record.source);
        }
    }
    assert!(!seen.iter().any(|c| c.sheet == "Metadata"));
}

#[test]
fn rule_order_decides_claims() {
    let first = parse_ruleset_str(
        r#"{ "Entities": [
            { "name": "A", "identifier": { "type": "startswith", "value": "VQ" } },
            { "name": "B", "identifier": { "type": "contains", "value": "_" } }
        ] }"#,
    )
    .unwrap();
    let swapped = parse_ruleset_str(
        r#"{ "Entities": [
            { "name": "B", "identifier": { "type": "contains", "value": "_" } },
            { "name": "A", "identifier": { "type": "startswith", "value": "VQ" } }
        ] }"#,
    )
    .unwrap();
    let wb = Workbook::new(vec![Worksheet::from_rows("S", &[&["VQ_Sales"]])]);

    let a = run_workbook(&wb, &first, &ExternalInputs::new());
    assert_eq!(a.extraction.records("A").len(), 1);
    assert!(a.extraction.records("B").is_empty());

    let b = run_workbook(&wb, &swapped, &ExternalInputs::new());
    assert!(b.extraction.records("A").is_empty());
    assert_eq!(b.extraction.records("B").len(), 1);
}

#[test]
fn diff_accounts_for_every_key_once() {
    let rs = vq_rules();
    let wb = Workbook::new(vec![Worksheet::from_rows(
        "S",
        &[&["VQ_A", "VQ_B", "VQ_C"]],
    )]);
    let mut inputs = ExternalInputs::new();
    inputs.insert(
        "dn",
        json!({ "data": [
            { "data": { "name": "VQ_B", "id": 1 } },
            { "data": { "name": "VQ_D", "id": 2 } },
            { "data": { "name": "VQ_E", "id": 3 } }
        ] }),
    );
    let result = run_workbook(&wb, &rs, &inputs);
    let diff = &result.reconciliation.group("VQ").unwrap().diff;

    let new: BTreeSet<_> = diff.new_locally.iter().cloned().collect();
    let missing: BTreeSet<_> = diff.missing_locally.iter().cloned().collect();
    let matched: BTreeSet<_> = diff.matched.iter().cloned().collect();
    assert!(new.is_disjoint(&missing));
    assert!(new.is_disjoint(&matched));
    assert!(missing.is_disjoint(&matched));

    let all: BTreeSet<String> = new.union(&missing).chain(matched.iter()).cloned().collect();
    assert_eq!(all, keys(&["VQ_A", "VQ_B", "VQ_C", "VQ_D", "VQ_E"]));
    assert_eq!(
        diff.new_locally.len() + diff.missing_locally.len() + diff.matched.len(),
        5
    );
}

#[test]
fn strike_resolution_ignores_cell_order() {
    let rs = vq_rules();
    let layouts: [&[(u32, u32, bool)]; 3] = [
        &[(1, 1, true), (2, 1, false)],
        &[(1, 1, false), (2, 1, true)],
        &[(3, 3, true), (1, 2, false), (2, 2, true)],
    ];
    for layout in layouts {
        let mut sheet = Worksheet::new("S");
        for &(row, col, struck) in layout {
            let cell = if struck {
                Cell::struck("VQ_X")
            } else {
                Cell::text("VQ_X")
            };
            sheet.set(row, col, cell);
        }
        let result = run_workbook(&Workbook::new(vec![sheet]), &rs, &ExternalInputs::new());
        assert_eq!(
            result.resolution.group("VQ").unwrap().comparable_keys(),
            keys(&["VQ_X"])
        );
    }
}

#[test]
fn field_pass_emits_one_child_per_match() {
    let rs = parse_ruleset_str(
        r#"{ "Entities": [
            { "name": "Expr", "primaryFieldKey": "Expression",
              "identifier": { "type": "contains", "value": ">" } },
            { "name": "Skill", "sourceFromField": "Expr.Expression",
              "identifier": { "type": "regex", "value": "([A-Za-z]+)>\\d+" } }
        ] }"#,
    )
    .unwrap();
    let wb = Workbook::new(vec![Worksheet::from_rows(
        "S",
        &[&["Alpha>1 & Beta>2 | Gamma>3"], &["Alpha>4"]],
    )]);
    let result = run_workbook(&wb, &rs, &ExternalInputs::new());

    let skills: Vec<&str> = result
        .extraction
        .records("Skill")
        .iter()
        .map(|r| r.primary())
        .collect();
    assert_eq!(skills, vec!["Alpha", "Beta", "Gamma", "Alpha"]);
    assert_eq!(
        result.resolution.group("Skill").unwrap().entries["Alpha"].occurrences,
        2
    );
}

#[test]
fn max_id_counts_only_filtered_records() {
    let rs = load_preset("routing").unwrap();
    let wb = Workbook::new(vec![Worksheet::from_rows("Routing", &[&["VQ_Sales"]])]);
    let mut inputs = ExternalInputs::new();
    inputs.insert(
        "dn",
        json!([
            { "data": { "name": "VQ_Sales", "id": "17" } },
            { "data": { "name": "Reception", "id": "9000" } },
            { "data": { "name": "VQ_Legacy", "id": "A-99" } }
        ]),
    );
    inputs.insert(
        "agent_group",
        json!([
            { "data": { "expression": "SkillA", "id": 40 } },
            { "data": { "expression": "VAG_Team", "id": 55 } },
            { "data": { "expression": "Team Lead", "id": 900 } }
        ]),
    );
    let result = run_workbook(&wb, &rs, &inputs);

    assert_eq!(result.reconciliation.max_ids.get(&IdPoolType::Dn), Some(&17));
    assert_eq!(
        result.reconciliation.max_ids.get(&IdPoolType::AgentGroup),
        Some(&55)
    );
    let skills = result.reconciliation.group("Skills").unwrap();
    assert_eq!(skills.missing_locally.len(), 1);
    assert_eq!(skills.missing_locally[0].key, "SkillA");
}

// ---------------------------------------------------------------------------
// Preset on a real xlsx file
// ---------------------------------------------------------------------------
fn routing_xlsx() -> Vec<u8> {
    let struck = Format::new().set_font_strikethrough();
    let mut wb = XlsxWriter::new();

    let ws = wb.add_worksheet();
    ws.set_name("Routing").unwrap();
    ws.write_string(0, 0, "Queue").unwrap();
    ws.write_string(0, 1, "Expression").unwrap();
    ws.write_string(0, 2, "Ideal Agent").unwrap();
    ws.write_string(1, 0, "VQ_Sales").unwrap();
    ws.write_string(1, 1, "SkillA>5&SkillB>3").unwrap();
    ws.write_string(1, 2, "SkillC>1").unwrap();
    ws.write_string_with_format(2, 0, "VQ_Old", &struck).unwrap();
    ws.write_string_with_format(2, 1, "SkillD>2", &struck).unwrap();

    let ws = wb.add_worksheet();
    ws.set_name("Default Targeting- Group").unwrap();
    ws.write_string(0, 0, "VAG_Team").unwrap();

    let ws = wb.add_worksheet();
    ws.set_name("Metadata").unwrap();
    ws.write_string(0, 0, "VQ_Meta").unwrap();

    wb.save_to_buffer().unwrap()
}

#[test]
fn preset_reconciles_real_workbook() {
    let rs = load_preset("routing").unwrap();
    let mut inputs = ExternalInputs::new();
    inputs.insert(
        "dn",
        json!([
            { "data": { "name": "VQ_Old", "id": "12" } },
            { "data": { "name": "VQ_Sales", "id": "10" } }
        ]),
    );
    inputs.insert(
        "agent_group",
        json!([
            { "data": { "expression": "SkillA", "id": "300" } },
            { "data": { "expression": "SkillZ", "id": "301" } },
            { "data": { "expression": "VAG_Team", "id": "500" } },
            { "data": { "expression": "SkillA>5 & SkillB>3", "IdealExpression": "SkillC>1", "id": "302" } }
        ]),
    );

    let result = run_pipeline(&routing_xlsx(), &rs, &inputs).unwrap();

    let vq = result.resolution.group("VQ").unwrap();
    assert_eq!(vq.comparable_keys(), keys(&["VQ_Sales"]));
    assert!(vq.entries["VQ_Old"].strike);
    assert!(!vq.entries.contains_key("VQ_Meta"));

    let vq_rec = result.reconciliation.group("VQ").unwrap();
    assert_eq!(vq_rec.diff.matched, vec!["VQ_Sales"]);
    assert_eq!(vq_rec.missing_locally[0].id, "12");

    let skills = result.reconciliation.group("Skills").unwrap();
    assert_eq!(skills.diff.matched, vec!["SkillA"]);
    assert_eq!(skills.diff.missing_locally, vec!["SkillZ"]);
    assert!(skills.diff.new_locally.contains(&"SkillB".to_string()));
    assert!(!skills.diff.new_locally.contains(&"SkillD".to_string()));

    let exprs = result.reconciliation.group("SkillExpr").unwrap();
    assert!(exprs
        .diff
        .matched
        .contains(&"SkillA>5 & SkillB>3 SkillC>1".to_string()));

    let vag = result.reconciliation.group("VAG").unwrap();
    assert_eq!(vag.diff.matched, vec!["VAG_Team"]);

    assert_eq!(
        result.reconciliation.max_ids.get(&IdPoolType::AgentGroup),
        Some(&500)
    );
    assert_eq!(result.reconciliation.max_ids.get(&IdPoolType::Dn), Some(&12));

    let report = result.report();
    let sheet = report.comparison("Skills").unwrap();
    assert_eq!(sheet.title, "Skills Comparison");
    assert!(sheet.rows.iter().any(|r| r[0] == "SkillB" && r[2] == STATUS_NEW));
}
