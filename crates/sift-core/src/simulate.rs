//! Rendering update payloads from report rows, without sending them anywhere.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use crate::reconcile::ids::IdPool;
use crate::reconcile::report::ReportBook;
use crate::rules::schema::IdPoolType;

/// Marker written in place of `{func.next_id}` when the row has no id pool.
pub const NEXT_ID_MISSING: &str = "{ERROR:next_id_missing}";

static PLACEHOLDER: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\.([^}]+)\}"));

/// One report row, column header to cell text.
pub type RowData = BTreeMap<String, String>;

/// A report row picked for simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationRow {
    /// Value of the row's first column.
    pub key: String,
    pub group: String,
    pub pool: Option<IdPoolType>,
    pub data: RowData,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub rows: Vec<SimulationRow>,
    /// Requested keys that no comparison row carries.
    pub missing: Vec<String>,
}

/// Pick rows from the comparison sheets by first-column value.
///
/// Each key is taken once, from the first sheet that has it.
pub fn select_rows(book: &ReportBook, keys: &[String]) -> Selection {
    let wanted: BTreeSet<&str> = keys.iter().map(String::as_str).collect();
    let mut taken: BTreeSet<String> = BTreeSet::new();
    let mut rows = Vec::new();

    for sheet in &book.comparison_sheets {
        for record in sheet.records() {
            let Some(first) = sheet.header.first().and_then(|h| record.get(h)) else {
                continue;
            };
            if !wanted.contains(first.as_str()) || taken.contains(first) {
                continue;
            }
            taken.insert(first.clone());
            rows.push(SimulationRow {
                key: first.clone(),
                group: sheet.group.clone(),
                pool: sheet.id_pool,
                data: record,
            });
        }
    }

    let missing: Vec<String> = wanted
        .iter()
        .filter(|k| !taken.contains(**k))
        .map(|k| k.to_string())
        .collect();
    if !missing.is_empty() {
        log::warn!("no report rows for: {}", missing.join(", "));
    }
    Selection { rows, missing }
}

fn lookup<'a>(row: &'a RowData, column: &str) -> Option<&'a String> {
    row.get(column).or_else(|| {
        row.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(column))
            .map(|(_, v)| v)
    })
}

fn render_text(text: &str, row: &RowData, next_id: Option<u64>) -> String {
    let Ok(placeholder) = PLACEHOLDER.as_ref() else {
        return text.to_string();
    };
    placeholder
        .replace_all(text, |caps: &Captures<'_>| {
            let kind = caps[1].to_lowercase();
            let name = caps[2].trim();
            match kind.as_str() {
                "row" => match lookup(row, name) {
                    Some(value) => value.clone(),
                    None => {
                        log::warn!("placeholder {{row.{name}}} has no matching column");
                        String::new()
                    }
                },
                "func" if name == "next_id" => match next_id {
                    Some(id) => id.to_string(),
                    None => {
                        log::warn!("{{func.next_id}} used but no id was allocated for this row");
                        NEXT_ID_MISSING.to_string()
                    }
                },
                _ => {
                    log::warn!("unknown placeholder {}", &caps[0]);
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// Replace `{row.Column}` and `{func.next_id}` in every string of a template.
///
/// Column lookup ignores case. Non-string values are copied as they are.
pub fn render_template(template: &Value, row: &RowData, next_id: Option<u64>) -> Value {
    match template {
        Value::String(s) => Value::String(render_text(s, row, next_id)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| render_template(item, row, next_id))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_template(v, row, next_id)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationOutcome {
    pub payloads: Vec<Value>,
    pub errors: Vec<String>,
    pub missing: Vec<String>,
}

impl SimulationOutcome {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty() && self.missing.is_empty()
    }
}

fn contains_marker(value: &Value) -> bool {
    match value {
        Value::String(s) => s.contains(NEXT_ID_MISSING),
        Value::Array(items) => items.iter().any(contains_marker),
        Value::Object(map) => map.values().any(contains_marker),
        _ => false,
    }
}

/// Render one payload per selected row, drawing ids from the row's pool.
pub fn simulate(template: &Value, selection: &Selection, pool: &mut IdPool) -> SimulationOutcome {
    let mut outcome = SimulationOutcome {
        missing: selection.missing.clone(),
        ..Default::default()
    };

    for row in &selection.rows {
        let mut exhausted = false;
        let next_id = match row.pool {
            Some(kind) => {
                let id = pool.next(kind);
                if id.is_none() {
                    log::warn!("{}: id pool {kind} is exhausted", row.key);
                    outcome
                        .errors
                        .push(format!("row '{}': id pool {kind} is exhausted", row.key));
                    exhausted = true;
                }
                id
            }
            None => {
                log::warn!("{}: group '{}' has no id pool", row.key, row.group);
                None
            }
        };
        log::debug!("{}: next_id={next_id:?}", row.key);
        let payload = render_template(template, &row.data, next_id);
        if !exhausted && contains_marker(&payload) {
            outcome
                .errors
                .push(format!("row '{}': no id available for {{func.next_id}}", row.key));
        }
        outcome.payloads.push(payload);
    }

    log::info!(
        "simulated {} payloads ({} errors, {} missing)",
        outcome.payloads.len(),
        outcome.errors.len(),
        outcome.missing.len()
    );
    outcome
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub logged: usize,
    pub skipped: usize,
}

/// Record simulated payloads in the log. Nothing is written externally.
///
/// Payloads that are not JSON objects are skipped.
pub fn commit_simulated(payloads: &[Value]) -> CommitSummary {
    let mut summary = CommitSummary::default();
    for (i, payload) in payloads.iter().enumerate() {
        if !payload.is_object() {
            log::warn!("payload #{} is not an object, skipped", i + 1);
            summary.skipped += 1;
            continue;
        }
        log::info!("update #{}: {payload}", i + 1);
        summary.logged += 1;
    }
    summary
}
