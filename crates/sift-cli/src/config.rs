//! `sift.toml`: default rules, external data files and report path.
//!
//! ```toml
//! [rules]
//! preset = "routing"      # or: path = "my-rules.json"
//!
//! [sources]
//! dn = "exports/dn.json"
//! agent_group = "exports/agent_group.json"
//!
//! [report]
//! path = "reconciliation.xlsx"
//! ```
//!
//! Relative paths are resolved against the directory of the config file.
//! Command-line flags override every value.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "sift.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub rules: RulesConfig,
    /// External data files keyed by `comparisonApiUrl`.
    #[serde(default)]
    pub sources: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesConfig {
    pub path: Option<PathBuf>,
    pub preset: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    pub path: Option<PathBuf>,
}

impl Config {
    pub fn parse(content: &str) -> Result<Config> {
        toml::from_str(content).context("invalid configuration")
    }

    pub fn load(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config =
            Config::parse(&content).with_context(|| format!("in {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    /// An explicit path must exist; the default file is optional.
    pub fn resolve(explicit: Option<&Path>) -> Result<Config> {
        match explicit {
            Some(path) => Config::load(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    log::info!("using {DEFAULT_CONFIG_FILE}");
                    Config::load(default)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    fn rebase(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(ref mut p) = self.rules.path {
            join(p);
        }
        for p in self.sources.values_mut() {
            join(p);
        }
        if let Some(ref mut p) = self.report.path {
            join(p);
        }
    }
}
