//! Folding duplicate occurrences into one entry per key.
//!
//! A key seen both struck and not struck counts as live. Among live
//! occurrences the later one supplies the details; among struck ones the
//! first is kept.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::engine::Extraction;
use crate::model::{CellRef, ExtractedRecord};
use crate::parsing::normalize::{compound_key, normalize};
use crate::rules::compiled::{CompiledRule, CompiledRuleSet, KeyKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupOrigin {
    Rule,
    SubEntity { parent: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEntry {
    pub key: String,
    /// Value as written in the sheet (after replace rules).
    pub value: String,
    pub strike: bool,
    pub occurrences: usize,
    pub source: CellRef,
    /// Normalized expression part of a compound key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,
    /// Normalized ideal part of a compound key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ideal: Option<String>,
}

/// The de-duplicated records of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityGroup {
    pub name: String,
    pub origin: GroupOrigin,
    pub compound: bool,
    pub entries: BTreeMap<String, ResolvedEntry>,
}

impl EntityGroup {
    fn new(name: &str, origin: GroupOrigin, compound: bool) -> Self {
        EntityGroup {
            name: name.to_string(),
            origin,
            compound,
            entries: BTreeMap::new(),
        }
    }

    /// Keys that are live (not struck) after resolution.
    pub fn comparable_keys(&self) -> BTreeSet<String> {
        self.entries
            .values()
            .filter(|e| !e.strike)
            .map(|e| e.key.clone())
            .collect()
    }

    pub fn merge(&mut self, candidate: ResolvedEntry) {
        match self.entries.get_mut(&candidate.key) {
            None => {
                self.entries.insert(candidate.key.clone(), candidate);
            }
            Some(existing) => {
                let occurrences = existing.occurrences + candidate.occurrences;
                if !candidate.strike {
                    *existing = candidate;
                }
                existing.occurrences = occurrences;
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Resolution {
    /// Rule groups in declaration order, followed by sub-entity groups.
    pub groups: Vec<EntityGroup>,
}

impl Resolution {
    pub fn group(&self, name: &str) -> Option<&EntityGroup> {
        self.groups.iter().find(|g| g.name == name)
    }
}

fn group_mut<'a>(
    groups: &'a mut Vec<EntityGroup>,
    name: &str,
    origin: GroupOrigin,
    compound: bool,
) -> &'a mut EntityGroup {
    let index = match groups.iter().position(|g| g.name == name) {
        Some(index) => index,
        None => {
            groups.push(EntityGroup::new(name, origin, compound));
            groups.len() - 1
        }
    };
    &mut groups[index]
}

fn record_entry(rule: &CompiledRule, record: &ExtractedRecord) -> Option<ResolvedEntry> {
    let primary = record.primary();
    let (key, expr, ideal) = match rule.key {
        KeyKind::Simple => (normalize(primary), None, None),
        KeyKind::Compound {
            ref secondary_field,
        } => {
            let secondary = record.field(secondary_field).unwrap_or("");
            (
                compound_key(primary, secondary),
                Some(normalize(primary)),
                Some(normalize(secondary)),
            )
        }
    };
    if key.is_empty() {
        return None;
    }
    Some(ResolvedEntry {
        key,
        value: primary.to_string(),
        strike: record.strike,
        occurrences: 1,
        source: record.source.clone(),
        expr,
        ideal,
    })
}

/// Resolve extracted records into one group per enabled rule, plus one per
/// sub-entity name. Sub-entity values join the group of a rule with the same
/// name when there is one.
pub fn resolve(ruleset: &CompiledRuleSet, extraction: &Extraction) -> Resolution {
    let mut groups: Vec<EntityGroup> = Vec::new();

    for rule in ruleset.enabled_rules() {
        let compound = matches!(rule.key, KeyKind::Compound { .. });
        group_mut(&mut groups, &rule.name, GroupOrigin::Rule, compound);
    }
    for rule in ruleset.enabled_rules() {
        if let Some(ref spec) = rule.sub_entities {
            let origin = GroupOrigin::SubEntity {
                parent: rule.name.clone(),
            };
            group_mut(&mut groups, &spec.name, origin, false);
        }
    }

    for rule in ruleset.enabled_rules() {
        for record in extraction.records(&rule.name) {
            if let Some(entry) = record_entry(rule, record) {
                group_mut(&mut groups, &rule.name, GroupOrigin::Rule, false).merge(entry);
            }
            for (name, values) in &record.sub_entities {
                for value in values {
                    let key = normalize(&value.value);
                    if key.is_empty() {
                        continue;
                    }
                    let entry = ResolvedEntry {
                        key,
                        value: value.value.clone(),
                        strike: value.strike,
                        occurrences: 1,
                        source: record.source.clone(),
                        expr: None,
                        ideal: None,
                    };
                    let origin = GroupOrigin::SubEntity {
                        parent: rule.name.clone(),
                    };
                    group_mut(&mut groups, name, origin, false).merge(entry);
                }
            }
        }
    }

    for group in &groups {
        log::info!(
            "{}: {} distinct keys, {} live",
            group.name,
            group.entries.len(),
            group.comparable_keys().len()
        );
    }
    Resolution { groups }
}
