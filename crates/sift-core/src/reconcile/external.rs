use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::SiftError;
use crate::parsing::normalize::{compound_key, normalize};
use crate::rules::compiled::Comparison;
use crate::rules::matcher::Identifier;

/// One external item, reduced to the parts that take part in comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalRecord {
    pub key: String,
    pub id: String,
    /// Normalized key (or expression) value.
    pub expr: String,
    /// Normalized secondary value; empty for simple entities.
    pub ideal: String,
}

/// External records of one entity group, keyed like the local side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExternalSet {
    pub records: BTreeMap<String, ExternalRecord>,
    /// Highest all-digit id among the records kept.
    pub max_id: Option<u64>,
}

impl ExternalSet {
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.records.keys()
    }

    pub fn get(&self, key: &str) -> Option<&ExternalRecord> {
        self.records.get(key)
    }
}

/// How to read one group's external records.
pub struct ExternalView<'a> {
    pub comparison: &'a Comparison,
    /// Predicate applied when the comparison has no override of its own.
    pub fallback_identifier: Option<&'a Identifier>,
    pub compound: bool,
}

impl ExternalView<'_> {
    fn identifier(&self) -> Option<&Identifier> {
        self.comparison
            .identifier
            .as_ref()
            .or(self.fallback_identifier)
    }

    fn accepts(&self, raw_key: &str) -> bool {
        if let Some(identifier) = self.identifier() {
            if !identifier.matches(raw_key) {
                return false;
            }
        }
        !self.comparison.exclude.iter().any(|ex| ex.matches(raw_key))
    }
}

fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// The item list of a payload: a bare array, or an object with a `data` array.
fn payload_items<'a>(source_name: &str, payload: &'a Value) -> Result<&'a [Value], SiftError> {
    match payload {
        Value::Array(items) => Ok(items.as_slice()),
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(items)) => Ok(items.as_slice()),
            _ => Err(SiftError::ExternalData {
                source_name: source_name.to_string(),
                reason: "expected a JSON array or an object with a 'data' array".into(),
            }),
        },
        _ => Err(SiftError::ExternalData {
            source_name: source_name.to_string(),
            reason: "expected a JSON array of items".into(),
        }),
    }
}

/// Filter and normalize one group's external records.
///
/// Items wrapped as `{"data": {...}}` are unwrapped. Items without a key or
/// id are skipped with a warning.
pub fn normalize_external(
    source_name: &str,
    payload: &Value,
    view: &ExternalView<'_>,
) -> Result<ExternalSet, SiftError> {
    let items = payload_items(source_name, payload)?;
    let comparison = view.comparison;
    let mut set = ExternalSet::default();
    let mut skipped = 0usize;

    for item in items {
        let data = match item.get("data") {
            Some(inner @ Value::Object(_)) => inner,
            _ => item,
        };
        let raw_key = scalar_text(data.get(&comparison.key_field))
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        let id = scalar_text(data.get(&comparison.id_field));
        let (Some(raw_key), Some(id)) = (raw_key, id) else {
            log::warn!(
                "{source_name}: skipping item without '{}' or '{}'",
                comparison.key_field,
                comparison.id_field
            );
            skipped += 1;
            continue;
        };
        if !view.accepts(&raw_key) {
            continue;
        }

        let (key, expr, ideal) = if view.compound {
            let secondary =
                scalar_text(data.get(&comparison.secondary_key_field)).unwrap_or_default();
            (
                compound_key(&raw_key, &secondary),
                normalize(&raw_key),
                normalize(&secondary),
            )
        } else {
            let key = normalize(&raw_key);
            (key.clone(), key, String::new())
        };
        if key.is_empty() {
            continue;
        }

        if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
            match id.parse::<u64>() {
                Ok(n) => set.max_id = Some(set.max_id.map_or(n, |m| m.max(n))),
                Err(_) => {
                    log::warn!("{source_name}: id '{id}' is too large to count toward the max id")
                }
            }
        }
        set.records.insert(
            key.clone(),
            ExternalRecord {
                key,
                id,
                expr,
                ideal,
            },
        );
    }

    log::info!(
        "{source_name}: {} external records kept ({skipped} skipped)",
        set.records.len()
    );
    Ok(set)
}
