use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::parsing::address;

/// A single grid cell: its text (if any) and whether its font is struck through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub value: Option<String>,
    #[serde(default)]
    pub strike: bool,
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell {
            value: Some(value.into()),
            strike: false,
        }
    }

    pub fn struck(value: impl Into<String>) -> Self {
        Cell {
            value: Some(value.into()),
            strike: true,
        }
    }

    /// Trimmed text, or `None` for blank cells.
    pub fn trimmed(&self) -> Option<&str> {
        self.value
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// One worksheet as a dense grid. Rows and columns are 1-based in the API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Worksheet {
    pub name: String,
    rows: Vec<Vec<Cell>>,
    max_col: u32,
}

impl Worksheet {
    pub fn new(name: impl Into<String>) -> Self {
        Worksheet {
            name: name.into(),
            rows: Vec::new(),
            max_col: 0,
        }
    }

    /// Build a sheet from plain text rows; empty strings become blank cells.
    pub fn from_rows(name: impl Into<String>, rows: &[&[&str]]) -> Self {
        let mut sheet = Worksheet::new(name);
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if !value.is_empty() {
                    sheet.set(r as u32 + 1, c as u32 + 1, Cell::text(*value));
                }
            }
        }
        sheet
    }

    pub fn max_row(&self) -> u32 {
        self.rows.len() as u32
    }

    pub fn max_col(&self) -> u32 {
        self.max_col
    }

    /// Cell at a 1-based position; `None` outside the used range.
    pub fn cell(&self, row: u32, col: u32) -> Option<&Cell> {
        if row == 0 || col == 0 {
            return None;
        }
        self.rows
            .get(row as usize - 1)
            .and_then(|r| r.get(col as usize - 1))
    }

    /// Store a cell at a 1-based position, growing the grid as needed.
    pub fn set(&mut self, row: u32, col: u32, cell: Cell) {
        if row == 0 || col == 0 {
            return;
        }
        let (r, c) = (row as usize - 1, col as usize - 1);
        if self.rows.len() <= r {
            self.rows.resize_with(r + 1, Vec::new);
        }
        let cells = &mut self.rows[r];
        if cells.len() <= c {
            cells.resize_with(c + 1, Cell::default);
        }
        cells[c] = cell;
        self.max_col = self.max_col.max(col);
    }

    /// Mark an existing cell as struck through.
    pub fn strike(&mut self, row: u32, col: u32) {
        if row == 0 || col == 0 {
            return;
        }
        if let Some(cell) = self
            .rows
            .get_mut(row as usize - 1)
            .and_then(|r| r.get_mut(col as usize - 1))
        {
            cell.strike = true;
        }
    }

    /// Iterate the stored grid in row-major order as `(row, col, cell)`.
    pub fn cells(&self) -> impl Iterator<Item = (u32, u32, &Cell)> {
        self.rows.iter().enumerate().flat_map(|(r, row)| {
            row.iter()
                .enumerate()
                .map(move |(c, cell)| (r as u32 + 1, c as u32 + 1, cell))
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workbook {
    pub sheets: Vec<Worksheet>,
}

impl Workbook {
    pub fn new(sheets: Vec<Worksheet>) -> Self {
        Workbook { sheets }
    }

    pub fn sheet(&self, name: &str) -> Option<&Worksheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

/// Where a record came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRef {
    pub sheet: String,
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn coordinate(&self) -> String {
        address::coordinate(self.row, self.col)
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.sheet, self.coordinate())
    }
}

/// A value pulled out of a parent record by `extractSubEntities`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubEntityValue {
    pub value: String,
    pub strike: bool,
}

/// Back-reference from a field-sourced record to the record it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    pub entity: String,
    pub key: String,
}

/// One entity occurrence extracted from the workbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    /// Name of the rule that produced this record.
    pub entity: String,
    /// Field name holding the matched value.
    pub primary_field: String,
    /// All text fields, including the primary field.
    pub fields: BTreeMap<String, String>,
    /// Sub-entity lists keyed by sub-entity name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sub_entities: BTreeMap<String, Vec<SubEntityValue>>,
    pub strike: bool,
    pub source: CellRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentRef>,
}

impl ExtractedRecord {
    pub fn primary(&self) -> &str {
        self.fields
            .get(&self.primary_field)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}
