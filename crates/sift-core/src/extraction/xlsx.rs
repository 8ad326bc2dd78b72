use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};

use crate::error::SiftError;
use crate::extraction::styles;
use crate::model::{Cell, Workbook, Worksheet};

/// Read every worksheet of an xlsx file into the grid model.
///
/// Values come from calamine; strikethrough flags from the package styles.
/// A workbook whose styles cannot be read is still returned, without any
/// struck cells.
pub fn read_workbook(bytes: &[u8]) -> Result<Workbook, SiftError> {
    let cursor = Cursor::new(bytes);
    let mut xlsx: Xlsx<_> = calamine::open_workbook_from_rs(cursor)
        .map_err(|e| SiftError::Workbook(format!("failed to open xlsx: {e}")))?;

    let strikes = match styles::read_strike_map(bytes) {
        Ok(map) => map,
        Err(e) => {
            log::warn!("strikethrough formatting unavailable: {e}");
            Default::default()
        }
    };

    let mut sheets = Vec::new();
    for name in xlsx.sheet_names() {
        let range = xlsx
            .worksheet_range(&name)
            .map_err(|e| SiftError::Workbook(format!("failed to read sheet '{name}': {e}")))?;
        let (row0, col0) = range.start().unwrap_or((0, 0));

        let mut sheet = Worksheet::new(name.clone());
        for (r, c, data) in range.used_cells() {
            if let Some(text) = cell_text(data) {
                sheet.set(row0 + r as u32 + 1, col0 + c as u32 + 1, Cell::text(text));
            }
        }
        if let Some(cells) = strikes.get(&name) {
            for &(row, col) in cells {
                sheet.strike(row, col);
            }
        }
        log::debug!(
            "read sheet '{name}' ({} rows x {} cols)",
            sheet.max_row(),
            sheet.max_col()
        );
        sheets.push(sheet);
    }

    log::info!("read workbook with {} sheets", sheets.len());
    Ok(Workbook::new(sheets))
}

fn cell_text(data: &Data) -> Option<String> {
    match data {
        Data::String(s) => Some(s.clone()),
        Data::Float(f) => Some(f.to_string()),
        Data::Int(i) => Some(i.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        Data::Empty | Data::Error(_) => None,
        other => Some(format!("{other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::{Format, Workbook as XlsxWriter};

    fn sample_bytes() -> Vec<u8> {
        let mut wb = XlsxWriter::new();
        let struck = Format::new().set_font_strikethrough();

        let ws = wb.add_worksheet();
        ws.set_name("Routing").unwrap();
        ws.write_string(0, 0, "VQ_Sales").unwrap();
        ws.write_string_with_format(1, 0, "VQ_Old", &struck).unwrap();
        ws.write_number(2, 1, 42.0).unwrap();
        ws.write_number(3, 1, 2.5).unwrap();

        let ws = wb.add_worksheet();
        ws.set_name("Metadata").unwrap();
        ws.write_string(4, 3, "note").unwrap();

        wb.save_to_buffer().unwrap()
    }

    #[test]
    fn test_values_and_sheet_order() {
        let wb = read_workbook(&sample_bytes()).unwrap();
        let names: Vec<&str> = wb.sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Routing", "Metadata"]);

        let routing = wb.sheet("Routing").unwrap();
        assert_eq!(routing.cell(1, 1).and_then(Cell::trimmed), Some("VQ_Sales"));
        assert_eq!(routing.cell(3, 2).and_then(Cell::trimmed), Some("42"));
        assert_eq!(routing.cell(4, 2).and_then(Cell::trimmed), Some("2.5"));
    }

    #[test]
    fn test_range_offset_preserved() {
        let wb = read_workbook(&sample_bytes()).unwrap();
        let meta = wb.sheet("Metadata").unwrap();
        assert_eq!(meta.cell(5, 4).and_then(Cell::trimmed), Some("note"));
        assert_eq!(meta.max_row(), 5);
        assert_eq!(meta.max_col(), 4);
    }

    #[test]
    fn test_strike_flags() {
        let wb = read_workbook(&sample_bytes()).unwrap();
        let routing = wb.sheet("Routing").unwrap();
        assert!(!routing.cell(1, 1).unwrap().strike);
        assert!(routing.cell(2, 1).unwrap().strike);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            read_workbook(b"not a workbook"),
            Err(SiftError::Workbook(_))
        ));
    }
}
