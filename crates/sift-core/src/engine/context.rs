use std::collections::{HashMap, HashSet};

use crate::engine::ExtractionIssue;
use crate::error::ExtractionFieldError;
use crate::model::{CellRef, Worksheet};
use crate::parsing::address::HeaderLocation;

/// State owned by one `extract` call.
///
/// Holds the cells already claimed by a rule, the header columns resolved
/// per sheet, and the field failures absorbed along the way.
#[derive(Debug, Default)]
pub(crate) struct TraversalContext {
    claimed: HashSet<(usize, u32, u32)>,
    headers: HashMap<(usize, String), Option<u32>>,
    pub(crate) issues: Vec<ExtractionIssue>,
}

impl TraversalContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_claimed(&self, sheet: usize, row: u32, col: u32) -> bool {
        self.claimed.contains(&(sheet, row, col))
    }

    /// Claim a cell; returns false when another rule already holds it.
    pub(crate) fn claim(&mut self, sheet: usize, row: u32, col: u32) -> bool {
        self.claimed.insert((sheet, row, col))
    }

    /// Column holding `header` on this sheet, searched once per sheet.
    ///
    /// Locations are tried in order; a location matches when its header cell
    /// contains `header` (case-sensitive).
    pub(crate) fn header_column(
        &mut self,
        sheet_index: usize,
        sheet: &Worksheet,
        header: &str,
        locations: &[HeaderLocation],
    ) -> Option<u32> {
        let key = (sheet_index, header.to_string());
        if let Some(cached) = self.headers.get(&key) {
            return *cached;
        }
        let found = locations.iter().find_map(|loc| {
            let (row, col) = loc.header_cell();
            sheet
                .cell(row, col)
                .and_then(|c| c.value.as_deref())
                .filter(|text| text.contains(header))
                .map(|_| col)
        });
        match found {
            Some(col) => log::debug!("sheet '{}': header '{header}' in column {col}", sheet.name),
            None => log::debug!("sheet '{}': header '{header}' not found", sheet.name),
        }
        self.headers.insert(key, found);
        found
    }

    pub(crate) fn record_issue(
        &mut self,
        entity: &str,
        location: CellRef,
        error: ExtractionFieldError,
    ) {
        match error {
            ExtractionFieldError::MissingSource { .. } => {
                log::error!("{entity} at {location}: {error}")
            }
            _ => log::warn!("{entity} at {location}: {error}"),
        }
        self.issues.push(ExtractionIssue {
            entity: entity.to_string(),
            location,
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_are_exclusive() {
        let mut ctx = TraversalContext::new();
        assert!(!ctx.is_claimed(0, 1, 1));
        assert!(ctx.claim(0, 1, 1));
        assert!(!ctx.claim(0, 1, 1));
        assert!(ctx.is_claimed(0, 1, 1));
        assert!(!ctx.is_claimed(1, 1, 1));
    }

    #[test]
    fn test_header_lookup_tries_locations_in_order() {
        let sheet = Worksheet::from_rows(
            "S",
            &[&["Expr", "", "Other"], &["", "", "Ideal Agent"]],
        );
        let mut ctx = TraversalContext::new();
        let locations = [
            HeaderLocation::Column(3),
            HeaderLocation::Column(4),
            HeaderLocation::Cell { row: 2, col: 3 },
        ];
        assert_eq!(
            ctx.header_column(0, &sheet, "Ideal Agent", &locations),
            Some(3)
        );
        assert_eq!(ctx.header_column(0, &sheet, "Missing", &locations), None);
    }

    #[test]
    fn test_header_cell_may_extend_the_name() {
        let sheet = Worksheet::from_rows("S", &[&["Expression", "", "Ideal Agent Expression"]]);
        let mut ctx = TraversalContext::new();
        let locations = [HeaderLocation::Column(3)];
        assert_eq!(
            ctx.header_column(0, &sheet, "Ideal Agent", &locations),
            Some(3)
        );
        assert_eq!(ctx.header_column(0, &sheet, "ideal agent", &locations), None);
    }

    #[test]
    fn test_header_lookup_is_cached_per_sheet() {
        let first = Worksheet::from_rows("A", &[&["Ideal Agent"]]);
        let second = Worksheet::from_rows("B", &[&["Something"]]);
        let mut ctx = TraversalContext::new();
        let locations = [HeaderLocation::Column(1)];
        assert_eq!(ctx.header_column(0, &first, "Ideal Agent", &locations), Some(1));
        // A different sheet is resolved independently.
        assert_eq!(ctx.header_column(1, &second, "Ideal Agent", &locations), None);
        // The cached answer for sheet 0 is reused even if asked with another sheet.
        assert_eq!(ctx.header_column(0, &second, "Ideal Agent", &locations), Some(1));
    }
}
