//! Run input envelope: `{"Year": "2021", "Links": "{\"TempLink\":\"https://…\"}, {…}"}`.
//!
//! `Links` is a comma-joined run of JSON objects (not an array) as produced
//! by the upstream scenario; it is wrapped in `[` `]` before parsing. A
//! ready-made JSON array is accepted too. The envelope may arrive wrapped in
//! an actor-input object `{"json": "<envelope>"}` or `{"input": "<envelope>"}`.

use serde_json::Value;

use crate::exit_codes::{EXIT_ENVELOPE_MALFORMED, EXIT_ENVELOPE_MISSING, EXIT_ENVELOPE_NO_LINKS};
use crate::pipeline::{Stage, StageError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub year: String,
    pub links: Vec<String>,
}

pub fn parse_envelope(raw: &str) -> Result<Envelope, StageError> {
    let raw = raw.trim_start_matches('\u{feff}').trim();
    if raw.is_empty() {
        return Err(StageError::new(
            Stage::Input,
            EXIT_ENVELOPE_MISSING,
            "missing envelope (use --json, --input or stdin)",
        ));
    }

    let mut payload: Value = serde_json::from_str(raw).map_err(|e| {
        StageError::new(
            Stage::Envelope,
            EXIT_ENVELOPE_MALFORMED,
            format!("envelope is not valid JSON: {e} (sample: {})", sample(raw)),
        )
    })?;

    if let Some(inner) = actor_input_payload(&payload) {
        if inner.trim().is_empty() {
            return Err(StageError::new(
                Stage::Input,
                EXIT_ENVELOPE_MISSING,
                "actor input carries an empty envelope",
            ));
        }
        payload = serde_json::from_str(&inner).map_err(|e| {
            StageError::new(
                Stage::Envelope,
                EXIT_ENVELOPE_MALFORMED,
                format!("wrapped envelope is not valid JSON: {e} (sample: {})", sample(&inner)),
            )
        })?;
    }

    let year = match payload.get("Year") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };

    let link_items: Vec<Value> = match payload.get("Links") {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(blob)) if !blob.trim().is_empty() => {
            let wrapped = format!("[{blob}]");
            serde_json::from_str(&wrapped).map_err(|e| {
                StageError::new(
                    Stage::Links,
                    EXIT_ENVELOPE_MALFORMED,
                    format!("cannot parse Links blob as a JSON array: {e} (sample: {})", sample(blob)),
                )
            })?
        }
        _ => Vec::new(),
    };

    if year.is_empty() || link_items.is_empty() {
        return Err(StageError::new(
            Stage::Envelope,
            EXIT_ENVELOPE_MALFORMED,
            "Year or Links missing/empty after parsing",
        ));
    }

    let links: Vec<String> = link_items
        .iter()
        .filter_map(|item| item.get("TempLink").and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if links.is_empty() {
        return Err(StageError::new(
            Stage::Links,
            EXIT_ENVELOPE_NO_LINKS,
            format!("no TempLink entries found for year {year}"),
        ));
    }

    Ok(Envelope { year, links })
}

/// Inner envelope string when `payload` is an actor-input wrapper.
fn actor_input_payload(payload: &Value) -> Option<String> {
    if payload.get("Year").is_some() {
        return None;
    }
    ["json", "input"]
        .iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_str))
        .map(String::from)
}

fn sample(s: &str) -> String {
    s.chars().take(200).collect()
}
