use regex::Regex;
use std::cell::OnceCell;

use crate::rules::schema::IdentifierDef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    StartsWith,
    Contains,
    ExactMatch,
    Regex,
}

impl IdentifierKind {
    pub fn parse(s: &str) -> Option<IdentifierKind> {
        match s.trim().to_lowercase().as_str() {
            "startswith" => Some(IdentifierKind::StartsWith),
            "contains" => Some(IdentifierKind::Contains),
            "exactmatch" => Some(IdentifierKind::ExactMatch),
            "regex" => Some(IdentifierKind::Regex),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::StartsWith => "startswith",
            IdentifierKind::Contains => "contains",
            IdentifierKind::ExactMatch => "exactmatch",
            IdentifierKind::Regex => "regex",
        }
    }
}

/// A cell value prepared for matching against many identifiers.
///
/// The case-folded form is computed at most once per value, no matter how
/// many case-insensitive rules look at it.
pub struct Candidate<'a> {
    original: &'a str,
    folded: OnceCell<String>,
}

impl<'a> Candidate<'a> {
    pub fn new(original: &'a str) -> Self {
        Candidate {
            original,
            folded: OnceCell::new(),
        }
    }

    pub fn original(&self) -> &'a str {
        self.original
    }

    fn folded(&self) -> &str {
        self.folded.get_or_init(|| self.original.to_lowercase())
    }
}

/// A pre-resolved identifier predicate.
#[derive(Debug, Clone)]
pub struct Identifier {
    kind: IdentifierKind,
    /// Comparison value; lowercased once when the identifier is case-insensitive.
    needle: String,
    case_sensitive: bool,
    regex: Option<Regex>,
}

impl Identifier {
    /// Resolve an identifier definition. Errors are human-readable reasons.
    pub fn compile(def: &IdentifierDef) -> Result<Identifier, String> {
        let kind = IdentifierKind::parse(&def.kind).ok_or_else(|| {
            format!(
                "invalid identifier type '{}' (expected startswith, contains, exactmatch or regex)",
                def.kind
            )
        })?;
        if def.value.is_empty() {
            return Err("identifier value must not be empty".into());
        }
        let regex = match kind {
            IdentifierKind::Regex => Some(
                Regex::new(&def.value)
                    .map_err(|e| format!("invalid identifier regex '{}': {e}", def.value))?,
            ),
            _ => None,
        };
        let needle = if kind == IdentifierKind::Regex || def.case_sensitive {
            def.value.clone()
        } else {
            def.value.to_lowercase()
        };
        Ok(Identifier {
            kind,
            needle,
            case_sensitive: def.case_sensitive,
            regex,
        })
    }

    pub fn kind(&self) -> IdentifierKind {
        self.kind
    }

    pub fn matches(&self, value: &str) -> bool {
        self.matches_candidate(&Candidate::new(value))
    }

    /// Test a prepared candidate.
    ///
    /// Regex identifiers always search the original text; patterns carry
    /// their own case flags, so `caseSensitive` does not apply to them.
    pub fn matches_candidate(&self, candidate: &Candidate<'_>) -> bool {
        if self.needle.is_empty() {
            return false;
        }
        if let Some(ref re) = self.regex {
            return re.is_match(candidate.original());
        }
        let value = if self.case_sensitive {
            candidate.original()
        } else {
            candidate.folded()
        };
        match self.kind {
            IdentifierKind::StartsWith => value.starts_with(self.needle.as_str()),
            IdentifierKind::Contains => value.contains(self.needle.as_str()),
            IdentifierKind::ExactMatch => value == self.needle,
            IdentifierKind::Regex => false,
        }
    }

    /// Every candidate this identifier yields from a source string.
    ///
    /// Regex identifiers return all non-overlapping matches (capture group 1
    /// when the pattern has groups, otherwise the whole match). Other kinds
    /// return the whole string once when it matches.
    pub fn extract_all(&self, value: &str) -> Vec<String> {
        match self.regex {
            Some(ref re) => find_all(re, value),
            None => {
                if self.matches(value) {
                    vec![value.to_string()]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

/// All non-overlapping matches of `re` in `text`, preferring capture group 1.
pub fn find_all(re: &Regex, text: &str) -> Vec<String> {
    let grouped = re.captures_len() > 1;
    re.captures_iter(text)
        .map(|caps| {
            if grouped {
                caps.get(1).map(|m| m.as_str()).unwrap_or("").to_string()
            } else {
                caps.get(0).map(|m| m.as_str()).unwrap_or("").to_string()
            }
        })
        .collect()
}
