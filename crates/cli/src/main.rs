// midmile - middle-mile tour reconciliation from the command line

mod analyze;
mod check;
mod exit_codes;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exit_codes::{EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "midmile")]
#[command(about = "Cross-check SOPs, rate cards and settlement reports for middle-mile tours")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile one tour and score its risk
    #[command(after_help = "\
Examples:
  midmile check sop.txt rate_card.csv settlement.csv
  midmile check sop.txt rate_card.csv settlement.csv --json
  midmile check sop.txt rate_card.csv settlement.csv --config check.toml --output result.json

Exit codes: 0 low risk, 3 medium risk, 4 high risk")]
    Check {
        #[command(flatten)]
        inputs: check::Inputs,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Reconcile one tour and export report workbooks
    #[command(after_help = "\
Examples:
  midmile report tour sop.txt rate_card.csv settlement.csv --out tour.xlsx
  midmile report payment sop.txt rate_card.csv settlement.csv --out payment.xlsx
  midmile report payment-and-dispute sop.txt rate_card.csv settlement.csv --out reports/")]
    Report {
        /// tour, payment, dispute or payment-and-dispute
        kind: String,

        #[command(flatten)]
        inputs: check::Inputs,

        /// Destination file (a directory for payment-and-dispute)
        #[arg(long)]
        out: PathBuf,
    },

    /// Profile a rate card or settlement report on its own
    #[command(after_help = "\
Examples:
  midmile analyze rate-card rate_card.csv
  midmile analyze settlement settlement.csv --json
  midmile analyze settlement settlement.csv --config check.toml")]
    Analyze {
        #[command(subcommand)]
        document: analyze::AnalyzeCommands,

        /// TOML file with column aliases for the document's headers
        #[arg(long, global = true, env = "MIDMILE_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Print the factors extracted from an SOP document, optionally priced
    /// against a rate card
    #[command(after_help = "\
Examples:
  midmile sop sop.txt
  midmile sop sop.txt --json
  midmile sop sop.txt --rate-card rate_card.csv --json")]
    Sop {
        file: PathBuf,

        /// Rate card CSV to compute the expected payment and dispute flags
        #[arg(long)]
        rate_card: Option<PathBuf>,

        /// TOML file with rate card column aliases
        #[arg(long, env = "MIDMILE_CONFIG")]
        config: Option<PathBuf>,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Config file commands
    Config {
        #[command(subcommand)]
        command: check::ConfigCommands,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  midmile-recon ", env!("CARGO_PKG_VERSION"),
    )
}

/// Library diagnostics go to stderr, filtered by `MIDMILE_LOG` (default `warn`).
fn init_logging() {
    let filter = EnvFilter::try_from_env("MIDMILE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check { inputs, json, output } => check::cmd_check(inputs, json, output),
        Commands::Report { kind, inputs, out } => check::cmd_report(&kind, inputs, out),
        Commands::Analyze { document, config } => analyze::cmd_analyze(document, config),
        Commands::Sop { file, rate_card, config, json } => analyze::cmd_sop(file, rate_card, config, json),
        Commands::Config { command } => check::cmd_config(command),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn args(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    /// Exit with `code` without printing an error line.
    pub fn silent(code: u8) -> Self {
        Self { code, message: String::new(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<midmile_recon::ReconError> for CliError {
    fn from(err: midmile_recon::ReconError) -> Self {
        use midmile_recon::ReconError;
        let hint = match &err {
            ReconError::Parse(p) if p.message.starts_with("missing column") => Some(
                "map the header under [columns.rate_card] or [columns.settlement] in a --config file",
            ),
            ReconError::NoMatch(_) => Some("add a 'Tour ID:' or 'Vehicle Type:' line to the SOP"),
            _ => None,
        };
        let cli = Self::new(exit_codes::recon_exit_code(&err), err.to_string());
        match hint {
            Some(h) => cli.with_hint(h),
            None => cli,
        }
    }
}

impl From<midmile_recon::ExportError> for CliError {
    fn from(err: midmile_recon::ExportError) -> Self {
        Self::new(exit_codes::EXIT_EXPORT, err.to_string())
    }
}
