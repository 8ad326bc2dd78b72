//! Tabular report rows, ready for any sheet or table writer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::reconcile::{GroupReconciliation, Reconciliation};
use crate::resolve::{EntityGroup, Resolution};
use crate::rules::schema::IdPoolType;

pub const STATUS_NEW: &str = "New in Sheet (Non-Struck)";
pub const STATUS_MISSING: &str = "Missing in Sheet (or only Struck Out)";
pub const ID_NOT_APPLICABLE: &str = "N/A";
pub const ID_NOT_FOUND: &str = "ID Not Found";
pub const COMPARISON_SUFFIX: &str = " Comparison";

pub const HEADER_ID: &str = "ID (from API)";
pub const HEADER_STATUS: &str = "Status";
pub const HEADER_KEY: &str = "Concatenated Key";
pub const HEADER_EXPRESSION: &str = "Expression";
pub const HEADER_IDEAL: &str = "Ideal Expression";
pub const HEADER_STRIKE: &str = "HasStrikeThrough";

/// One `<Group> Comparison` sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonSheet {
    pub title: String,
    pub group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_pool: Option<IdPoolType>,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ComparisonSheet {
    /// New-locally rows first, then missing rows; each block sorted by key.
    pub fn from_group(group: &GroupReconciliation) -> Self {
        let header: Vec<String> = if group.compound {
            vec![
                HEADER_KEY.into(),
                HEADER_EXPRESSION.into(),
                HEADER_IDEAL.into(),
                HEADER_ID.into(),
                HEADER_STATUS.into(),
            ]
        } else {
            vec![group.group.clone(), HEADER_ID.into(), HEADER_STATUS.into()]
        };

        let mut rows = Vec::with_capacity(group.new_locally.len() + group.missing_locally.len());
        for entry in &group.new_locally {
            if group.compound {
                rows.push(vec![
                    entry.key.clone(),
                    entry.expr.clone().unwrap_or_default(),
                    entry.ideal.clone().unwrap_or_default(),
                    ID_NOT_APPLICABLE.into(),
                    STATUS_NEW.into(),
                ]);
            } else {
                rows.push(vec![
                    entry.key.clone(),
                    ID_NOT_APPLICABLE.into(),
                    STATUS_NEW.into(),
                ]);
            }
        }
        for entry in &group.missing_locally {
            let id = if entry.id.is_empty() {
                ID_NOT_FOUND.to_string()
            } else {
                entry.id.clone()
            };
            if group.compound {
                rows.push(vec![
                    entry.key.clone(),
                    entry.expr.clone(),
                    entry.ideal.clone(),
                    id,
                    STATUS_MISSING.into(),
                ]);
            } else {
                rows.push(vec![entry.key.clone(), id, STATUS_MISSING.into()]);
            }
        }

        ComparisonSheet {
            title: format!("{}{COMPARISON_SUFFIX}", group.group),
            group: group.group.clone(),
            id_pool: group.id_pool,
            header,
            rows,
        }
    }

    /// Rows as header-keyed maps.
    pub fn records(&self) -> Vec<BTreeMap<String, String>> {
        self.rows
            .iter()
            .map(|row| {
                self.header
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

/// One sheet listing a resolved group with its strike status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySheet {
    pub title: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl EntitySheet {
    pub fn from_group(group: &EntityGroup) -> Self {
        let header: Vec<String> = if group.compound {
            vec![
                HEADER_EXPRESSION.into(),
                HEADER_IDEAL.into(),
                HEADER_KEY.into(),
                HEADER_STRIKE.into(),
            ]
        } else {
            vec![group.name.clone(), HEADER_STRIKE.into()]
        };
        let rows = group
            .entries
            .values()
            .map(|e| {
                let strike = strike_text(e.strike);
                if group.compound {
                    vec![
                        e.expr.clone().unwrap_or_default(),
                        e.ideal.clone().unwrap_or_default(),
                        e.key.clone(),
                        strike,
                    ]
                } else {
                    vec![e.key.clone(), strike]
                }
            })
            .collect();
        EntitySheet {
            title: group.name.clone(),
            header,
            rows,
        }
    }
}

fn strike_text(strike: bool) -> String {
    if strike { "TRUE" } else { "FALSE" }.to_string()
}

/// The full report: entity listings, comparisons, and id bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportBook {
    pub entity_sheets: Vec<EntitySheet>,
    pub comparison_sheets: Vec<ComparisonSheet>,
    pub max_ids: BTreeMap<IdPoolType, u64>,
}

impl ReportBook {
    pub fn build(resolution: &Resolution, reconciliation: &Reconciliation) -> Self {
        ReportBook {
            entity_sheets: resolution.groups.iter().map(EntitySheet::from_group).collect(),
            comparison_sheets: reconciliation
                .groups
                .iter()
                .map(ComparisonSheet::from_group)
                .collect(),
            max_ids: reconciliation.max_ids.clone(),
        }
    }

    pub fn comparison(&self, group: &str) -> Option<&ComparisonSheet> {
        self.comparison_sheets.iter().find(|s| s.group == group)
    }
}
