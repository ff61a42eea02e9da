use std::collections::BTreeMap;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Engine-owned columns
// ---------------------------------------------------------------------------

/// Resolved grouping key, written back onto every record.
pub const KEY_COLUMN: &str = "__group_key";
/// Relationship category of the record's group.
pub const BUCKET_COLUMN: &str = "__bucket";
/// `Y` when the record sits in a group with related attachments.
pub const RELATED_COLUMN: &str = "__related";

/// Provenance columns added by [`crate::engine::load_csv_records`].
pub const SOURCE_YEAR_COLUMN: &str = "__source_year";
pub const SOURCE_URL_COLUMN: &str = "__source_url";

pub const ENGINE_COLUMNS: [&str; 3] = [KEY_COLUMN, BUCKET_COLUMN, RELATED_COLUMN];

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One row of an extract: column name → value, in insertion order.
///
/// A cell may be present-but-absent (`None`), which is how CSV rows shorter
/// than their header are represented. Engine decisions treat absent and
/// empty alike.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    cells: Vec<(String, Option<String>)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `column`, or `None` if the column is missing or absent.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn contains(&self, column: &str) -> bool {
        self.cells.iter().any(|(name, _)| name == column)
    }

    /// Overwrite `column` in place, or append it if new.
    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        self.put(column, Some(value.into()));
    }

    /// Declare `column` without a value.
    pub fn set_absent(&mut self, column: &str) {
        self.put(column, None);
    }

    fn put(&mut self, column: &str, value: Option<String>) {
        match self.cells.iter_mut().find(|(name, _)| name == column) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((column.to_string(), value)),
        }
    }

    /// Column names in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            let column: String = k.into();
            record.set(&column, v);
        }
        record
    }
}

/// Typed view of a [`Record`] through a [`crate::config::FieldTable`].
///
/// Every value is normalized; an empty string means the field is absent.
/// Identifier fields keep any export prefix, key building strips it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SemanticRecord {
    pub invoice_id: String,
    pub line_item_id: String,
    pub record_type: String,
    pub record_year: String,
    pub file_name: String,
    pub content_hash: String,
    pub entity_code: String,
    pub invoice_reference: String,
    pub line_account_code: String,
    pub file_tag: String,
    pub storage_file_name: String,
    pub storage_path: String,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Bucket {
    #[serde(rename = "Invoice+File")]
    InvoiceFile,
    #[serde(rename = "Invoice+MultiFile")]
    InvoiceMultiFile,
    #[serde(rename = "Invoice_Only")]
    InvoiceOnly,
    #[serde(rename = "Orphan_File")]
    OrphanFile,
    #[serde(rename = "Orphan_File_Group")]
    OrphanFileGroup,
    #[serde(rename = "Orphan_Unknown")]
    OrphanUnknown,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvoiceFile => "Invoice+File",
            Self::InvoiceMultiFile => "Invoice+MultiFile",
            Self::InvoiceOnly => "Invoice_Only",
            Self::OrphanFile => "Orphan_File",
            Self::OrphanFileGroup => "Orphan_File_Group",
            Self::OrphanUnknown => "Orphan_Unknown",
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records sharing one grouping key, by index into the input.
#[derive(Debug, Clone, Default)]
pub struct Group {
    pub key: String,
    pub members: Vec<usize>,
    pub invoices: Vec<usize>,
    pub files: Vec<usize>,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MergeOutput {
    /// Union of input columns in first-seen order, then the engine columns.
    pub columns: Vec<String>,
    /// Input records in their original order, with engine columns populated.
    pub records: Vec<Record>,
    pub group_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub rows: usize,
    pub groups: usize,
    /// Records flagged `Y` in the relatedness column.
    pub related: usize,
    /// Records left without a bucket label.
    pub unlabeled: usize,
    pub bucket_counts: BTreeMap<String, usize>,
}
