pub mod extract;
pub mod reconcile;
pub mod rules;
pub mod simulate;

use anyhow::{Context, Result};
use sift_core::rules::builtin;
use sift_core::rules::compiled::CompiledRuleSet;
use std::path::Path;

pub const DEFAULT_PRESET: &str = "routing";

/// Load the rule file if one is given, otherwise the preset (default: routing).
pub fn load_rules(path: Option<&Path>, preset: Option<&str>) -> Result<CompiledRuleSet> {
    let rs = match path {
        Some(path) => sift_core::rules::load_ruleset(path)?,
        None => {
            let name = preset.unwrap_or(DEFAULT_PRESET);
            builtin::load_preset(name)?
        }
    };
    for w in &rs.warnings {
        log::debug!("ruleset: {w}");
    }
    Ok(rs)
}

pub fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}
