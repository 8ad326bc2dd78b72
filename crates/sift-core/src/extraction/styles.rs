//! Strikethrough detection straight from the xlsx package.
//!
//! calamine exposes cell values only, so fonts are resolved here: each cell's
//! `s` attribute indexes `cellXfs`, whose `fontId` indexes `fonts`, and a
//! font with a `<strike/>` child (not `val="0"`/`"false"`) marks the cell.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use zip::ZipArchive;

use crate::error::SiftError;
use crate::parsing::address::parse_coordinate;

/// Per cell-format (`cellXfs` index) strike flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleTable {
    xf_strike: Vec<bool>,
}

impl StyleTable {
    pub fn is_struck(&self, xf: usize) -> bool {
        self.xf_strike.get(xf).copied().unwrap_or(false)
    }

    pub fn has_strike(&self) -> bool {
        self.xf_strike.iter().any(|s| *s)
    }
}

fn xml_err(e: impl std::fmt::Display) -> SiftError {
    SiftError::Workbook(format!("malformed xlsx XML: {e}"))
}

fn attr_value(element: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, SiftError> {
    for attr in element.attributes() {
        let attr = attr.map_err(xml_err)?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value().map_err(xml_err)?.into_owned()));
        }
    }
    Ok(None)
}

fn is_truthy(val: Option<&str>) -> bool {
    !matches!(val, Some("0") | Some("false"))
}

/// Parse `xl/styles.xml` into strike flags per cell format.
pub fn parse_styles(xml: &[u8]) -> Result<StyleTable, SiftError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut font_strike: Vec<bool> = Vec::new();
    let mut xf_fonts: Vec<usize> = Vec::new();
    let mut in_fonts = false;
    let mut in_font = false;
    let mut in_cell_xfs = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"fonts" => in_fonts = true,
                b"font" if in_fonts => {
                    font_strike.push(false);
                    in_font = true;
                }
                b"strike" if in_font => {
                    let val = attr_value(&e, b"val")?;
                    if let Some(last) = font_strike.last_mut() {
                        *last = is_truthy(val.as_deref());
                    }
                }
                b"cellXfs" => in_cell_xfs = true,
                b"xf" if in_cell_xfs => xf_fonts.push(font_id(&e)?),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"font" if in_fonts => font_strike.push(false),
                b"strike" if in_font => {
                    let val = attr_value(&e, b"val")?;
                    if let Some(last) = font_strike.last_mut() {
                        *last = is_truthy(val.as_deref());
                    }
                }
                b"xf" if in_cell_xfs => xf_fonts.push(font_id(&e)?),
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"fonts" => in_fonts = false,
                b"font" => in_font = false,
                b"cellXfs" => in_cell_xfs = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
        buf.clear();
    }

    let xf_strike = xf_fonts
        .into_iter()
        .map(|font| font_strike.get(font).copied().unwrap_or(false))
        .collect();
    Ok(StyleTable { xf_strike })
}

fn font_id(element: &BytesStart<'_>) -> Result<usize, SiftError> {
    Ok(attr_value(element, b"fontId")?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0))
}

/// Sheet names with their relationship ids, in workbook order.
pub fn parse_workbook_sheets(xml: &[u8]) -> Result<Vec<(String, String)>, SiftError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"sheet" => {
                let name = attr_value(&e, b"name")?;
                let rel_id = attr_value(&e, b"r:id")?;
                if let (Some(name), Some(rel_id)) = (name, rel_id) {
                    sheets.push((name, rel_id));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(sheets)
}

/// Relationship id to package path for worksheet parts.
pub fn parse_relationships(xml: &[u8]) -> Result<HashMap<String, String>, SiftError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut map = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"Relationship" => {
                let id = attr_value(&e, b"Id")?;
                let target = attr_value(&e, b"Target")?;
                if let (Some(id), Some(target)) = (id, target) {
                    map.insert(id, package_path(&target));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(map)
}

fn package_path(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{target}"),
    }
}

/// 1-based `(row, col)` of every cell whose format is struck through.
pub fn struck_cells(sheet_xml: &[u8], styles: &StyleTable) -> Result<Vec<(u32, u32)>, SiftError> {
    let mut reader = Reader::from_reader(sheet_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut cells = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"c" => {
                let xf = attr_value(&e, b"s")?.and_then(|s| s.parse::<usize>().ok());
                if xf.is_some_and(|xf| styles.is_struck(xf)) {
                    if let Some(pos) = attr_value(&e, b"r")?.as_deref().and_then(parse_coordinate)
                    {
                        cells.push(pos);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(cells)
}

fn read_part<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>, SiftError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(SiftError::Workbook(format!("failed to read '{name}': {e}"))),
    };
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

/// Struck-through cell positions per sheet name.
///
/// Workbooks without a styles part, or without any struck format, yield an
/// empty map.
pub fn read_strike_map(bytes: &[u8]) -> Result<HashMap<String, Vec<(u32, u32)>>, SiftError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| SiftError::Workbook(format!("not an xlsx package: {e}")))?;

    let Some(styles_xml) = read_part(&mut archive, "xl/styles.xml")? else {
        return Ok(HashMap::new());
    };
    let styles = parse_styles(&styles_xml)?;
    if !styles.has_strike() {
        return Ok(HashMap::new());
    }

    let workbook_xml = read_part(&mut archive, "xl/workbook.xml")?
        .ok_or_else(|| SiftError::Workbook("missing xl/workbook.xml".into()))?;
    let rels_xml = read_part(&mut archive, "xl/_rels/workbook.xml.rels")?
        .ok_or_else(|| SiftError::Workbook("missing xl/_rels/workbook.xml.rels".into()))?;
    let sheets = parse_workbook_sheets(&workbook_xml)?;
    let rels = parse_relationships(&rels_xml)?;

    let mut map = HashMap::new();
    for (name, rel_id) in sheets {
        let Some(path) = rels.get(&rel_id) else {
            log::warn!("sheet '{name}' has no relationship target ({rel_id})");
            continue;
        };
        let Some(sheet_xml) = read_part(&mut archive, path)? else {
            log::warn!("sheet '{name}' part '{path}' is missing");
            continue;
        };
        let cells = struck_cells(&sheet_xml, &styles)?;
        log::debug!("sheet '{name}': {} struck cells", cells.len());
        map.insert(name, cells);
    }
    Ok(map)
}
