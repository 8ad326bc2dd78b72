use anyhow::{bail, Context, Result};
use sift_core::reconcile::ExternalInputs;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::commands::{load_rules, read_input};
use crate::config::Config;
use crate::output;

pub struct ReconcileArgs {
    pub input_file: PathBuf,
    pub rules: Option<PathBuf>,
    pub preset: Option<String>,
    pub config: Option<PathBuf>,
    pub sources: Vec<String>,
    pub output: String,
    pub report: Option<PathBuf>,
    pub report_json: Option<PathBuf>,
}

/// Split a `NAME=FILE` argument.
pub fn parse_source(arg: &str) -> Result<(String, PathBuf)> {
    match arg.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
            Ok((name.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => bail!("invalid --source '{arg}', expected NAME=FILE"),
    }
}

/// Read external payloads. An unreadable file only affects the groups that
/// use it; they are compared against an empty set.
fn load_sources(sources: &BTreeMap<String, PathBuf>) -> ExternalInputs {
    let mut inputs = ExternalInputs::new();
    for (name, path) in sources {
        let payload = std::fs::read(path)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(anyhow::Error::from));
        match payload {
            Ok(value) => {
                log::info!("{name}: loaded {}", path.display());
                inputs.insert(name.clone(), value);
            }
            Err(e) => log::error!("{name}: cannot use {}: {e}", path.display()),
        }
    }
    inputs
}

pub fn run(args: ReconcileArgs) -> Result<()> {
    let config = Config::resolve(args.config.as_deref())?;

    let rule_file = args.rules.or(config.rules.path);
    let preset = args.preset.or(config.rules.preset);
    let ruleset = load_rules(rule_file.as_deref(), preset.as_deref())?;

    let mut sources = config.sources;
    for arg in &args.sources {
        let (name, path) = parse_source(arg)?;
        sources.insert(name, path);
    }
    let inputs = load_sources(&sources);

    let bytes = read_input(&args.input_file)?;
    let result = sift_core::run_pipeline(&bytes, &ruleset, &inputs)?;
    let report = result.report();

    match args.output.as_str() {
        "json" => output::json::print(&result)?,
        _ => output::table::print_reconciliation(&result),
    }

    if let Some(path) = args.report.or(config.report.path) {
        write_report(&path, |p| output::xlsx::write_report(&report, p))?;
    }
    if let Some(path) = args.report_json {
        write_report(&path, |p| output::json::write(&report, p))?;
    }
    Ok(())
}

fn write_report(path: &Path, write: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
    write(path).with_context(|| format!("failed to write {}", path.display()))?;
    eprintln!("Report written to {}", path.display());
    Ok(())
}
