pub mod diff;
pub mod external;
pub mod ids;
pub mod report;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::resolve::{EntityGroup, Resolution};
use crate::rules::compiled::{Comparison, CompiledRuleSet};
use crate::rules::matcher::Identifier;
use crate::rules::schema::IdPoolType;
use diff::{diff, DiffResult};
use external::{normalize_external, ExternalSet, ExternalView};

/// External payloads keyed by the `comparisonApiUrl` that names them.
#[derive(Debug, Clone, Default)]
pub struct ExternalInputs {
    payloads: BTreeMap<String, Value>,
}

impl ExternalInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: impl Into<String>, payload: Value) {
        self.payloads.insert(source.into(), payload);
    }

    pub fn get(&self, source: &str) -> Option<&Value> {
        self.payloads.get(source)
    }
}

/// A live local key with no external counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal: Option<String>,
}

/// An external key with no live local counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingEntry {
    pub key: String,
    pub id: String,
    pub expr: String,
    pub ideal: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupReconciliation {
    pub group: String,
    pub compound: bool,
    pub source: Option<String>,
    pub id_pool: Option<IdPoolType>,
    pub diff: DiffResult,
    pub new_locally: Vec<NewEntry>,
    pub missing_locally: Vec<MissingEntry>,
    /// Why external data could not be used, when it could not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Reconciliation {
    pub groups: Vec<GroupReconciliation>,
    /// Highest external id per pool, over the records each group kept.
    pub max_ids: BTreeMap<IdPoolType, u64>,
}

impl Reconciliation {
    pub fn group(&self, name: &str) -> Option<&GroupReconciliation> {
        self.groups.iter().find(|g| g.group == name)
    }
}

/// Comparison settings for a group, and the identifier used to filter
/// external records when the settings carry no override.
///
/// A rule with the group's name wins; otherwise the first enabled rule that
/// extracts sub-entities under that name supplies them.
fn comparison_for<'a>(
    ruleset: &'a CompiledRuleSet,
    group: &str,
) -> Option<(&'a Comparison, Option<&'a Identifier>)> {
    if let Some(rule) = ruleset.enabled_rules().find(|r| r.name == group) {
        return Some((&rule.comparison, Some(&rule.identifier)));
    }
    ruleset
        .enabled_rules()
        .filter_map(|r| r.sub_entities.as_ref())
        .find(|spec| spec.name == group)
        .map(|spec| (&spec.comparison, None))
}

fn external_for(
    group: &EntityGroup,
    comparison: Option<(&Comparison, Option<&Identifier>)>,
    inputs: &ExternalInputs,
) -> (ExternalSet, Option<String>) {
    let Some((comparison, fallback_identifier)) = comparison else {
        return (ExternalSet::default(), None);
    };
    let Some(ref source) = comparison.source else {
        log::debug!("{}: no external source configured", group.name);
        return (ExternalSet::default(), None);
    };
    let Some(payload) = inputs.get(source) else {
        log::warn!(
            "{}: no data for source '{source}', treating every key as new",
            group.name
        );
        return (
            ExternalSet::default(),
            Some(format!("no data for source '{source}'")),
        );
    };
    let view = ExternalView {
        comparison,
        fallback_identifier,
        compound: group.compound,
    };
    match normalize_external(source, payload, &view) {
        Ok(set) => (set, None),
        Err(e) => {
            log::error!("{}: {e}", group.name);
            (ExternalSet::default(), Some(e.to_string()))
        }
    }
}

/// Diff every resolved group against its external records.
///
/// Groups without usable external data compare against an empty set, so
/// every live key is reported as new.
pub fn reconcile(
    ruleset: &CompiledRuleSet,
    resolution: &Resolution,
    inputs: &ExternalInputs,
) -> Reconciliation {
    let mut out = Reconciliation::default();

    for group in &resolution.groups {
        let comparison = comparison_for(ruleset, &group.name);
        let (external, external_error) = external_for(group, comparison, inputs);
        let id_pool = comparison.and_then(|(c, _)| c.id_pool);

        if let (Some(pool), Some(max)) = (id_pool, external.max_id) {
            let slot = out.max_ids.entry(pool).or_insert(0);
            *slot = (*slot).max(max);
        }

        let local = group.comparable_keys();
        let external_keys = external.keys().cloned().collect();
        let result = diff(&local, &external_keys);

        let new_locally = result
            .new_locally
            .iter()
            .map(|key| {
                let entry = group.entries.get(key);
                NewEntry {
                    key: key.clone(),
                    expr: entry.and_then(|e| e.expr.clone()),
                    ideal: entry.and_then(|e| e.ideal.clone()),
                }
            })
            .collect();
        let missing_locally = result
            .missing_locally
            .iter()
            .filter_map(|key| external.get(key))
            .map(|rec| MissingEntry {
                key: rec.key.clone(),
                id: rec.id.clone(),
                expr: rec.expr.clone(),
                ideal: rec.ideal.clone(),
            })
            .collect();

        log::info!(
            "{}: {} new locally, {} missing locally, {} matched",
            group.name,
            result.new_locally.len(),
            result.missing_locally.len(),
            result.matched.len()
        );
        out.groups.push(GroupReconciliation {
            group: group.name.clone(),
            compound: group.compound,
            source: comparison.and_then(|(c, _)| c.source.clone()),
            id_pool,
            diff: result,
            new_locally,
            missing_locally,
            external_error,
        });
    }
    out
}
