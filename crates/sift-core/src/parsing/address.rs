//! Spreadsheet coordinate conversion.
//!
//! Rows and columns are 1-based throughout, matching how cells are
//! addressed in rule files (`"C"`, `"C2"`).

/// Convert a 1-based column index to its letter form (`1 -> "A"`, `28 -> "AB"`).
pub fn column_letter(col: u32) -> String {
    let mut n = col;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Parse a column letter (case-insensitive) into a 1-based index.
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = (ch.to_ascii_uppercase() as u8 - b'A' + 1) as u32;
        col = col.checked_mul(26)?.checked_add(digit)?;
    }
    Some(col)
}

/// Format a 1-based `(row, col)` pair as an A1 coordinate.
pub fn coordinate(row: u32, col: u32) -> String {
    format!("{}{}", column_letter(col), row)
}

/// Parse an A1 coordinate into a 1-based `(row, col)` pair.
///
/// Returns `None` for malformed input, including row 0 (`"A0"`).
pub fn parse_coordinate(a1: &str) -> Option<(u32, u32)> {
    let split = a1.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = a1.split_at(split);
    let col = column_index(letters)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) || digits.starts_with('0')
    {
        return None;
    }
    let row: u32 = digits.parse().ok()?;
    Some((row, col))
}

/// A header location hint from `fetchAdditionalColumn.searchInLocations`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLocation {
    /// Whole column; the header is looked up in row 1.
    Column(u32),
    /// A specific header cell; values are read from its column.
    Cell { row: u32, col: u32 },
}

impl HeaderLocation {
    pub fn parse(hint: &str) -> Option<HeaderLocation> {
        let hint = hint.trim();
        if hint.chars().all(|c| c.is_ascii_alphabetic()) {
            return column_index(hint).map(HeaderLocation::Column);
        }
        parse_coordinate(hint).map(|(row, col)| HeaderLocation::Cell { row, col })
    }

    /// The cell holding the header text.
    pub fn header_cell(&self) -> (u32, u32) {
        match *self {
            HeaderLocation::Column(col) => (1, col),
            HeaderLocation::Cell { row, col } => (row, col),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(28), "AB");
        assert_eq!(column_letter(702), "ZZ");
        assert_eq!(column_letter(703), "AAA");
    }

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A"), Some(1));
        assert_eq!(column_index("c"), Some(3));
        assert_eq!(column_index("AB"), Some(28));
        assert_eq!(column_index(""), None);
        assert_eq!(column_index("A1"), None);
    }

    #[test]
    fn test_parse_coordinate() {
        assert_eq!(parse_coordinate("C2"), Some((2, 3)));
        assert_eq!(parse_coordinate("aa10"), Some((10, 27)));
        assert_eq!(parse_coordinate("A0"), None);
        assert_eq!(parse_coordinate("12"), None);
        assert_eq!(parse_coordinate("B2C"), None);
    }

    #[test]
    fn test_coordinate_roundtrip_sample() {
        assert_eq!(coordinate(7, 29), "AC7");
        assert_eq!(parse_coordinate("AC7"), Some((7, 29)));
    }

    #[test]
    fn test_header_location() {
        assert_eq!(HeaderLocation::parse("D"), Some(HeaderLocation::Column(4)));
        assert_eq!(
            HeaderLocation::parse("C2"),
            Some(HeaderLocation::Cell { row: 2, col: 3 })
        );
        assert_eq!(HeaderLocation::parse("C-2"), None);
        assert_eq!(HeaderLocation::Column(4).header_cell(), (1, 4));
    }
}
