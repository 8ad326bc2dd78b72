use crate::error::SiftError;
use crate::rules::compiled::CompiledRuleSet;
use crate::rules::parse_ruleset_str;

const ROUTING_JSON: &str = include_str!("../../../../rules/routing.json");

/// Available predefined rulesets.
pub const PRESETS: &[&str] = &["routing"];

/// Raw JSON of a predefined ruleset.
pub fn preset_json(name: &str) -> Result<&'static str, SiftError> {
    match name {
        "routing" => Ok(ROUTING_JSON),
        _ => Err(SiftError::UnknownPreset {
            name: name.to_string(),
            available: PRESETS.join(", "),
        }),
    }
}

/// Load and compile a predefined ruleset by name.
pub fn load_preset(name: &str) -> Result<CompiledRuleSet, SiftError> {
    parse_ruleset_str(preset_json(name)?)
}
