// amaster - merge invoice and attachment extracts into one master table

mod envelope;
mod exit_codes;
mod fetch;
mod pipeline;
mod store;

use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use attachmaster_recon::Field;
use clap::{Parser, Subcommand};

use exit_codes::{EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};
use pipeline::{FailureReport, MergeOptions, RunOptions, StageError};

#[derive(Parser)]
#[command(name = "amaster")]
#[command(about = "Merge invoice and attachment CSV extracts into a classified master table")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the sources named in a run envelope, merge them, store the master CSV
    #[command(after_help = "\
Examples:
  amaster run --json '{\"Year\":\"2021\",\"Links\":\"{\\\"TempLink\\\":\\\"https://…/a.csv\\\"}\"}'
  amaster run --input envelope.json --store ./kv-store --out master.csv
  cat envelope.json | amaster run

Prints one JSON report on stdout, {\"ok\":true,...} or {\"ok\":false,\"stage\":...}.")]
    Run {
        /// Envelope JSON text
        #[arg(long, env = "AMASTER_JSON", conflicts_with = "input")]
        json: Option<String>,

        /// Read the envelope from a file
        #[arg(long)]
        input: Option<PathBuf>,

        /// Result store directory
        #[arg(long, env = "AMASTER_STORE", default_value = "./kv-store")]
        store: PathBuf,

        /// Also write the master CSV here
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        /// Field table TOML (overrides column synonyms)
        #[arg(long)]
        fields: Option<PathBuf>,

        /// Per-request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Merge local CSV files into a master CSV
    #[command(after_help = "\
Examples:
  amaster merge invoices.csv files.csv > master.csv
  amaster merge invoices.csv files.csv --year 2021 --out master.csv --json")]
    Merge {
        /// Input CSV files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Tag rows with this source year (adds __source_year / __source_url)
        #[arg(long)]
        year: Option<String>,

        /// Write the master CSV here instead of stdout
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        /// Field table TOML (overrides column synonyms)
        #[arg(long)]
        fields: Option<PathBuf>,

        /// Print a JSON summary on stdout (requires --out)
        #[arg(long)]
        json: bool,
    },

    /// Print the effective field table as TOML
    Fields {
        /// Field table TOML to validate and print
        #[arg(long)]
        fields: Option<PathBuf>,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\ntarget:  ", env!("TARGET"),
    )
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Run { json, input, store, out, fields, timeout } => {
            cmd_run(json, input, store, out, fields, timeout)
        }
        Commands::Merge { inputs, year, out, fields, json } => cmd_merge(inputs, year, out, fields, json),
        Commands::Fields { fields } => cmd_fields(fields),
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
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError::io(e.to_string()))?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", text).map_err(|e| CliError::io(e.to_string()))
}

// ============================================================================
// run
// ============================================================================

/// Envelope text from --json, --input, or piped stdin. Empty when none given.
fn read_envelope(json: Option<String>, input: Option<PathBuf>) -> Result<String, CliError> {
    if let Some(text) = json {
        return Ok(text);
    }
    if let Some(path) = input {
        return std::fs::read_to_string(&path)
            .map_err(|e| CliError::io(format!("cannot read {}: {}", path.display(), e)));
    }
    if io::stdin().is_terminal() {
        return Ok(String::new());
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| CliError::io(format!("cannot read stdin: {}", e)))?;
    Ok(buf)
}

fn cmd_run(
    json: Option<String>,
    input: Option<PathBuf>,
    store: PathBuf,
    out: Option<PathBuf>,
    fields: Option<PathBuf>,
    timeout: Option<u64>,
) -> Result<(), CliError> {
    let envelope = read_envelope(json, input)?;
    let opts = RunOptions {
        envelope,
        store_dir: store,
        out,
        fields,
        timeout_secs: timeout,
    };

    match pipeline::run(&opts) {
        Ok(report) => print_json(&report),
        Err(err) => {
            print_json(&FailureReport::from_stage_error(&err))?;
            Err(stage_failure(err))
        }
    }
}

fn stage_failure(err: StageError) -> CliError {
    let hint = match err.code {
        exit_codes::EXIT_ENVELOPE_MISSING => {
            Some("pass --json, --input, set AMASTER_JSON, or pipe the envelope on stdin")
        }
        exit_codes::EXIT_FETCH_NONE => Some("temporary links expire; regenerate them and retry"),
        exit_codes::EXIT_CONFIG_INVALID => Some("run `amaster fields` to see the expected layout"),
        _ => None,
    };
    let cli: CliError = err.into();
    match hint {
        Some(h) => cli.with_hint(h),
        None => cli,
    }
}

// ============================================================================
// merge
// ============================================================================

fn cmd_merge(
    inputs: Vec<PathBuf>,
    year: Option<String>,
    out: Option<PathBuf>,
    fields: Option<PathBuf>,
    json: bool,
) -> Result<(), CliError> {
    if json && out.is_none() {
        return Err(CliError::args("--json needs --out for the CSV")
            .with_hint("amaster merge a.csv b.csv --out master.csv --json"));
    }

    let merged = pipeline::merge_files(&MergeOptions { inputs, year, fields }).map_err(stage_failure)?;

    match out {
        Some(path) => {
            std::fs::write(&path, &merged.master_csv)
                .map_err(|e| CliError::io(format!("cannot write {}: {}", path.display(), e)))?;
            log::info!("wrote {} rows to {}", merged.summary.rows, path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(merged.master_csv.as_bytes())
                .map_err(|e| CliError::io(e.to_string()))?;
        }
    }

    if json {
        print_json(&serde_json::json!({
            "ok": true,
            "inputs": merged.per_file,
            "summary": merged.summary,
        }))?;
    }

    Ok(())
}

// ============================================================================
// fields
// ============================================================================

#[derive(serde::Serialize)]
struct FieldTableDump {
    fields: BTreeMap<&'static str, Vec<String>>,
}

fn cmd_fields(fields: Option<PathBuf>) -> Result<(), CliError> {
    let table = pipeline::load_field_table(fields.as_deref()).map_err(stage_failure)?;

    let dump = FieldTableDump {
        fields: Field::ALL
            .iter()
            .map(|f| (f.name(), table.synonyms(*f).to_vec()))
            .collect(),
    };
    let text = toml::to_string(&dump).map_err(|e| CliError::io(e.to_string()))?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(text.as_bytes()).map_err(|e| CliError::io(e.to_string()))
}
