use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SiftError {
    #[error("failed to load ruleset from {path}: {reason}")]
    RulesetLoad { path: PathBuf, reason: String },

    #[error("invalid ruleset: {0}")]
    RulesetInvalid(String),

    #[error("unknown preset '{name}'. Available: {available}")]
    UnknownPreset { name: String, available: String },

    #[error("failed to read workbook: {0}")]
    Workbook(String),

    #[error("external data from '{source_name}' is unusable: {reason}")]
    ExternalData { source_name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A failure confined to a single field or record during extraction.
///
/// These never escape the engine: they are logged and collected as
/// [`crate::engine::ExtractionIssue`]s so the rest of the workbook is still
/// processed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionFieldError {
    #[error("missing source field '{field}' for constructed field '{target}'")]
    MissingSource { target: String, field: String },

    #[error("row {row} (offset {offset}) is outside sheet '{sheet}'")]
    RowOutOfBounds {
        sheet: String,
        row: i64,
        offset: i64,
    },

    #[error("column {col} is outside sheet '{sheet}' (max column {max_col})")]
    ColumnOutOfBounds {
        sheet: String,
        col: u32,
        max_col: u32,
    },
}
