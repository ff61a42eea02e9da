//! Canonical text form for cell values.

use std::sync::LazyLock;

use regex::Regex;

/// Export artifact some upstream steps glue onto identifier cells,
/// e.g. `attach_invoices_2019.csv 100`.
static EXPORT_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^attach_invoices_\d{4}\.csv\s+").expect("export prefix pattern")
});

/// Absent → `""`, otherwise the value with surrounding whitespace removed.
pub fn normalize(value: Option<&str>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

/// [`normalize`], then drop a leading `attach_invoices_<year>.csv ` artifact.
pub fn strip_known_prefix(value: Option<&str>) -> String {
    let v = normalize(value);
    match EXPORT_PREFIX.find(&v) {
        Some(m) => v[m.end()..].trim().to_string(),
        None => v,
    }
}
