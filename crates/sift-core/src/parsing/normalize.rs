/// Normalize a cell or external value into the shared key space.
///
/// Steps:
/// 1. Drop every space and non-breaking space (U+00A0)
/// 2. Surround each `|` and `&` operator with exactly one space
///
/// Both the workbook side and the external side go through this function;
/// keys compared for equality must never be normalized any other way.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            ' ' | '\u{00A0}' => {}
            '|' => out.push_str(" | "),
            '&' => out.push_str(" & "),
            _ => out.push(c),
        }
    }
    out
}

/// Build the comparison key for a compound entity from its two parts.
///
/// Both parts are normalized; the ideal part is appended after a single
/// space only when it is non-empty.
pub fn compound_key(expr: &str, ideal: &str) -> String {
    let expr = normalize(expr);
    let ideal = normalize(ideal);
    format!("{expr} {ideal}").trim().to_string()
}

/// Apply literal find/replace pairs in order.
pub fn apply_replacements(value: &str, replacements: &[(String, String)]) -> String {
    let mut out = value.to_string();
    for (find, replace) in replacements {
        if find.is_empty() {
            continue;
        }
        out = out.replace(find.as_str(), replace);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_spaces_and_nbsp() {
        assert_eq!(normalize("VQ_ Sales\u{00A0}EN"), "VQ_SalesEN");
    }

    #[test]
    fn test_operator_spacing() {
        assert_eq!(normalize("SkillA>5&SkillB>3"), "SkillA>5 & SkillB>3");
        assert_eq!(normalize("A>1 |  B>2"), "A>1 | B>2");
        assert_eq!(normalize("A>1&&B>2"), "A>1 &  & B>2");
    }

    #[test]
    fn test_fixed_point() {
        let samples = [
            "",
            " ",
            "&",
            "a | b",
            "SkillA>5&SkillB>3|C>1",
            "\u{00A0}x\u{00A0}&\u{00A0}y",
            "a&&|b",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not a fixed point for {s:?}");
        }
    }

    #[test]
    fn test_compound_key() {
        assert_eq!(
            compound_key("SkillA>5&SkillB>3", "SkillC>1"),
            "SkillA>5 & SkillB>3 SkillC>1"
        );
        assert_eq!(compound_key("SkillA>5", ""), "SkillA>5");
        assert_eq!(compound_key("SkillA>5", " \u{00A0}"), "SkillA>5");
    }

    #[test]
    fn test_replacements_in_order() {
        let rules = vec![
            ("VQ-".to_string(), "VQ_".to_string()),
            ("_".to_string(), "__".to_string()),
        ];
        assert_eq!(apply_replacements("VQ-Sales", &rules), "VQ__Sales");
    }
}
