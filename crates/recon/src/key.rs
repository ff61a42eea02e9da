use crate::model::SemanticRecord;
use crate::normalize::strip_known_prefix;

/// Derive the grouping key, most specific identity first.
///
/// 1. `{invoice}::{line}::{type}::{year}`
/// 2. `INV::{invoice}::{type}::{year}`
/// 3. `HASH::{hash}`
/// 4. `INVFN::{invoice}::{filename}`
///
/// Returns `""` when none applies; the engine then falls back to a
/// positional key.
pub fn build_key(rec: &SemanticRecord) -> String {
    let invoice = strip_known_prefix(Some(rec.invoice_id.as_str()));
    let line = strip_known_prefix(Some(rec.line_item_id.as_str()));
    let kind = rec.record_type.as_str();
    let year = rec.record_year.as_str();

    if !invoice.is_empty() && !line.is_empty() && !kind.is_empty() && !year.is_empty() {
        return format!("{invoice}::{line}::{kind}::{year}");
    }
    if !invoice.is_empty() && !kind.is_empty() && !year.is_empty() {
        return format!("INV::{invoice}::{kind}::{year}");
    }
    if !rec.content_hash.is_empty() {
        return format!("HASH::{}", rec.content_hash);
    }
    if !rec.file_name.is_empty() && !invoice.is_empty() {
        return format!("INVFN::{invoice}::{}", rec.file_name);
    }
    String::new()
}

/// Key for a row with nothing to join on. Unique per input position.
pub fn positional_key(index: usize) -> String {
    format!("ROW::{index}")
}
