mod commands;
mod config;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sift",
    version,
    about = "Extract routing entities from spreadsheets and reconcile them against exported configuration"
)]
struct Cli {
    /// More log output (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract and de-duplicate entities from a workbook
    Extract {
        /// Path to the .xlsx workbook
        input_file: PathBuf,

        #[command(flatten)]
        rules: RuleArgs,

        /// Output format: table (default) or json
        #[arg(short, long, default_value = "table")]
        output: String,
    },
    /// Extract entities and compare them against external data
    Reconcile {
        /// Path to the .xlsx workbook
        input_file: PathBuf,

        #[command(flatten)]
        rules: RuleArgs,

        /// Configuration file (default: sift.toml when present)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// External data as NAME=FILE, where NAME is a comparisonApiUrl value
        #[arg(short, long = "source", value_name = "NAME=FILE")]
        sources: Vec<String>,

        /// Output format: table (default) or json
        #[arg(short, long, default_value = "table")]
        output: String,

        /// Write an xlsx report
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,

        /// Write the report rows as JSON, for `sift simulate`
        #[arg(long, value_name = "FILE")]
        report_json: Option<PathBuf>,
    },
    /// Render update payloads for report rows without sending them
    Simulate {
        /// JSON payload template with {row.Column} and {func.next_id} placeholders
        #[arg(short, long, value_name = "FILE")]
        template: PathBuf,

        /// Report rows saved by `sift reconcile --report-json`
        #[arg(short, long, value_name = "FILE")]
        report_json: PathBuf,

        /// Row keys to render (default: every row new in the sheet)
        #[arg(long = "select", value_name = "KEY")]
        select: Vec<String>,

        /// Log the rendered payloads as committed updates
        #[arg(long)]
        confirm: bool,
    },
    /// Manage and inspect rulesets
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },
}

#[derive(clap::Args)]
struct RuleArgs {
    /// Custom JSON rule file
    #[arg(short, long = "rules", value_name = "FILE", conflicts_with = "preset")]
    rules: Option<PathBuf>,

    /// Predefined ruleset (default: routing)
    #[arg(short, long = "preset", value_name = "NAME")]
    preset: Option<String>,
}

#[derive(Subcommand)]
enum RulesAction {
    /// List predefined rulesets
    List,
    /// Explain a ruleset in plain language
    Explain {
        /// Preset name (e.g., "routing")
        preset: String,
    },
    /// Print the JSON rule format with field descriptions and an example
    Schema,
    /// Validate a custom rule file
    Validate {
        /// Path to JSON rule file
        file: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Extract {
            input_file,
            rules,
            output,
        } => commands::extract::run(&input_file, rules.rules, rules.preset, &output),
        Commands::Reconcile {
            input_file,
            rules,
            config,
            sources,
            output,
            report,
            report_json,
        } => commands::reconcile::run(commands::reconcile::ReconcileArgs {
            input_file,
            rules: rules.rules,
            preset: rules.preset,
            config,
            sources,
            output,
            report,
            report_json,
        }),
        Commands::Simulate {
            template,
            report_json,
            select,
            confirm,
        } => commands::simulate::run(&template, &report_json, &select, confirm),
        Commands::Rules { action } => match action {
            RulesAction::List => commands::rules::list(),
            RulesAction::Explain { preset } => commands::rules::explain(&preset),
            RulesAction::Schema => commands::rules::schema(),
            RulesAction::Validate { file } => commands::rules::validate(&file),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
