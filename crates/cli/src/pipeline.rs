//! `amaster run` and `amaster merge`: fetch, merge, store.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use attachmaster_recon::{
    load_csv_records, merge_and_classify_with, summarize, write_master_csv, FieldTable, MergeSummary,
    Record, SourceTag,
};
use serde::Serialize;

use crate::envelope::parse_envelope;
use crate::exit_codes::{EXIT_CONFIG_INVALID, EXIT_ERROR, EXIT_FETCH_NO_ROWS, EXIT_IO};
use crate::fetch::{CsvFetcher, Payload};
use crate::store::ResultStore;
use crate::CliError;

pub const MASTER_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

// ── Stage errors ────────────────────────────────────────────────────

/// Where a run stopped. Reported in the failure JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Input,
    Envelope,
    Links,
    Fetch,
    Parse,
    Config,
    Output,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Input => "input",
            Self::Envelope => "envelope",
            Self::Links => "links",
            Self::Fetch => "fetch",
            Self::Parse => "parse",
            Self::Config => "config",
            Self::Output => "output",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct StageError {
    pub stage: Stage,
    pub code: u8,
    pub message: String,
}

impl StageError {
    pub fn new(stage: Stage, code: u8, message: impl Into<String>) -> Self {
        Self { stage, code, message: message.into() }
    }
}

impl From<StageError> for CliError {
    fn from(e: StageError) -> Self {
        CliError {
            code: e.code,
            message: format!("[{}] {}", e.stage, e.message),
            hint: None,
        }
    }
}

// ── Reports ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub ok: bool,
    pub year: String,
    pub sources: usize,
    pub rows: usize,
    pub groups: usize,
    pub kv_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_at: Option<PathBuf>,
    pub summary: MergeSummary,
}

#[derive(Debug, Serialize)]
pub struct FailureReport<'a> {
    pub ok: bool,
    pub stage: Stage,
    pub error: &'a str,
    pub exit_code: u8,
}

impl<'a> FailureReport<'a> {
    pub fn from_stage_error(err: &'a StageError) -> Self {
        Self {
            ok: false,
            stage: err.stage,
            error: &err.message,
            exit_code: err.code,
        }
    }
}

// ── Shared steps ────────────────────────────────────────────────────

/// Default table, or the one in `path`.
pub fn load_field_table(path: Option<&Path>) -> Result<FieldTable, StageError> {
    let Some(path) = path else {
        return Ok(FieldTable::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| {
        StageError::new(Stage::Config, EXIT_CONFIG_INVALID, format!("cannot read {}: {e}", path.display()))
    })?;
    FieldTable::from_toml(&text).map_err(|e| {
        StageError::new(Stage::Config, EXIT_CONFIG_INVALID, format!("{}: {e}", path.display()))
    })
}

/// Parse every payload, skipping ones that are not readable CSV.
pub fn parse_payloads(payloads: &[Payload], year: &str) -> Result<Vec<Record>, StageError> {
    let mut all_rows = Vec::new();

    for payload in payloads {
        let tag = SourceTag {
            year: year.to_string(),
            url: payload.url.clone(),
        };
        match load_csv_records(&payload.text, Some(&tag)) {
            Ok(rows) => {
                log::info!("parsed {} rows from {}", rows.len(), payload.url);
                all_rows.extend(rows);
            }
            Err(e) => log::warn!("skipping {}: {e}", payload.url),
        }
    }

    log::info!("total rows parsed from all CSVs: {}", all_rows.len());

    if all_rows.is_empty() {
        return Err(StageError::new(
            Stage::Parse,
            EXIT_FETCH_NO_ROWS,
            format!("no rows parsed from any CSV for year {year}"),
        ));
    }

    Ok(all_rows)
}

pub fn master_key(year: &str) -> String {
    format!("attach_master_{year}.csv")
}

// ── run ─────────────────────────────────────────────────────────────

pub struct RunOptions {
    pub envelope: String,
    pub store_dir: PathBuf,
    pub out: Option<PathBuf>,
    pub fields: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

/// Envelope → download → merge → store. Per-source failures are skipped;
/// everything else stops the run with its stage.
pub fn run(opts: &RunOptions) -> Result<RunReport, StageError> {
    let table = load_field_table(opts.fields.as_deref())?;

    let envelope = parse_envelope(&opts.envelope)?;
    log::info!("parsed year={}, {} link(s)", envelope.year, envelope.links.len());

    let fetcher = CsvFetcher::new(opts.timeout_secs)?;
    let payloads = fetcher.fetch_all(&envelope.links)?;
    let records = parse_payloads(&payloads, &envelope.year)?;

    let output = merge_and_classify_with(records, &table);
    log::info!(
        "merge_and_classify finished: rows={}, groups={}",
        output.records.len(),
        output.group_count
    );

    let master_csv = write_master_csv(&output.columns, &output.records)
        .map_err(|e| StageError::new(Stage::Output, EXIT_ERROR, e.to_string()))?;

    if let Some(ref path) = opts.out {
        std::fs::write(path, &master_csv).map_err(|e| {
            StageError::new(Stage::Output, EXIT_IO, format!("cannot write {}: {e}", path.display()))
        })?;
        log::info!("wrote {}", path.display());
    }

    let kv_key = master_key(&envelope.year);
    let stored_at = ResultStore::new(&opts.store_dir).put_detached(&kv_key, master_csv.as_bytes(), MASTER_CONTENT_TYPE);

    Ok(RunReport {
        ok: true,
        year: envelope.year,
        sources: payloads.len(),
        rows: output.records.len(),
        groups: output.group_count,
        kv_key,
        stored_at,
        summary: summarize(&output),
    })
}

// ── merge ───────────────────────────────────────────────────────────

pub struct MergeOptions {
    pub inputs: Vec<PathBuf>,
    pub year: Option<String>,
    pub fields: Option<PathBuf>,
}

pub struct LocalMerge {
    pub master_csv: String,
    pub summary: MergeSummary,
    pub per_file: BTreeMap<String, usize>,
}

/// Merge local CSV files. Unlike `run`, an unreadable file is an error.
pub fn merge_files(opts: &MergeOptions) -> Result<LocalMerge, StageError> {
    let table = load_field_table(opts.fields.as_deref())?;

    let mut records = Vec::new();
    let mut per_file = BTreeMap::new();

    for path in &opts.inputs {
        let bytes = std::fs::read(path).map_err(|e| {
            StageError::new(Stage::Input, EXIT_IO, format!("cannot read {}: {e}", path.display()))
        })?;
        let text = String::from_utf8_lossy(&bytes);
        let tag = opts.year.as_ref().map(|year| SourceTag {
            year: year.clone(),
            url: path.display().to_string(),
        });
        let rows = load_csv_records(&text, tag.as_ref()).map_err(|e| {
            StageError::new(Stage::Parse, EXIT_ERROR, format!("{}: {e}", path.display()))
        })?;
        log::info!("parsed {} rows from {}", rows.len(), path.display());
        per_file.insert(path.display().to_string(), rows.len());
        records.extend(rows);
    }

    if records.is_empty() {
        return Err(StageError::new(Stage::Parse, EXIT_FETCH_NO_ROWS, "no rows parsed from any CSV"));
    }

    let output = merge_and_classify_with(records, &table);
    let master_csv = write_master_csv(&output.columns, &output.records)
        .map_err(|e| StageError::new(Stage::Output, EXIT_ERROR, e.to_string()))?;

    Ok(LocalMerge {
        master_csv,
        summary: summarize(&output),
        per_file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_key_format() {
        assert_eq!(master_key("2016"), "attach_master_2016.csv");
    }

    #[test]
    fn parse_payloads_tags_rows() {
        let payloads = vec![
            Payload { url: "https://a/1.csv".into(), text: "Invoice ID,Type\n1,Bill\n".into() },
            Payload { url: "https://a/2.csv".into(), text: "File tag\nscan\n".into() },
        ];
        let rows = parse_payloads(&payloads, "2021").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("__source_url"), Some("https://a/2.csv"));
        assert_eq!(rows[0].get("__source_year"), Some("2021"));
    }

    #[test]
    fn parse_payloads_header_only_is_no_rows() {
        let payloads = vec![Payload { url: "https://a/1.csv".into(), text: "Invoice ID\n".into() }];
        let err = parse_payloads(&payloads, "2021").unwrap_err();
        assert_eq!(err.code, EXIT_FETCH_NO_ROWS);
        assert_eq!(err.stage, Stage::Parse);
    }

    #[test]
    fn missing_field_table_is_config_error() {
        let err = load_field_table(Some(Path::new("/nonexistent/fields.toml"))).unwrap_err();
        assert_eq!(err.code, EXIT_CONFIG_INVALID);
    }

    #[test]
    fn stage_error_message_carries_stage() {
        let cli: CliError = StageError::new(Stage::Links, 11, "bad").into();
        assert_eq!(cli.code, 11);
        assert_eq!(cli.message, "[links] bad");
    }
}
