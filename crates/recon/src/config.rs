use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::error::AttachError;
use crate::model::{Record, SemanticRecord};
use crate::normalize::normalize;

// ---------------------------------------------------------------------------
// Logical fields
// ---------------------------------------------------------------------------

/// A column the engine consults, independent of how a given extract spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    InvoiceId,
    LineItemId,
    RecordType,
    RecordYear,
    FileName,
    ContentHash,
    EntityCode,
    InvoiceReference,
    LineAccountCode,
    FileTag,
    StorageFileName,
    StoragePath,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::InvoiceId,
        Field::LineItemId,
        Field::RecordType,
        Field::RecordYear,
        Field::FileName,
        Field::ContentHash,
        Field::EntityCode,
        Field::InvoiceReference,
        Field::LineAccountCode,
        Field::FileTag,
        Field::StorageFileName,
        Field::StoragePath,
    ];

    /// snake_case name used in field table TOML.
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvoiceId => "invoice_id",
            Self::LineItemId => "line_item_id",
            Self::RecordType => "record_type",
            Self::RecordYear => "record_year",
            Self::FileName => "file_name",
            Self::ContentHash => "content_hash",
            Self::EntityCode => "entity_code",
            Self::InvoiceReference => "invoice_reference",
            Self::LineAccountCode => "line_account_code",
            Self::FileTag => "file_tag",
            Self::StorageFileName => "storage_file_name",
            Self::StoragePath => "storage_path",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    fn default_synonyms(&self) -> &'static [&'static str] {
        match self {
            Self::InvoiceId => &["Xero invoice ID", "Invoice ID", "InvoiceID"],
            Self::LineItemId => &["Xero line item ID", "Line item ID", "LineItemID"],
            Self::RecordType => &["Xero type", "Type"],
            Self::RecordYear => &["Xero year", "Year"],
            Self::FileName => &["Storage file name", "File name", "Filename"],
            Self::ContentHash => &["Content hash", "content_hash"],
            Self::EntityCode => &["Entity code", "EntityCode"],
            Self::InvoiceReference => &["Invoice reference"],
            Self::LineAccountCode => &["Line account code", "Account code"],
            Self::FileTag => &["File tag"],
            Self::StorageFileName => &["Storage file name"],
            Self::StoragePath => &["Storage path"],
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Resolution table
// ---------------------------------------------------------------------------

/// Logical field → accepted physical column names, highest priority first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTable {
    synonyms: BTreeMap<Field, Vec<String>>,
}

impl Default for FieldTable {
    fn default() -> Self {
        let synonyms = Field::ALL
            .iter()
            .map(|f| (*f, f.default_synonyms().iter().map(|s| s.to_string()).collect()))
            .collect();
        Self { synonyms }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldTableFile {
    #[serde(default)]
    fields: HashMap<String, Vec<String>>,
}

impl FieldTable {
    pub fn synonyms(&self, field: Field) -> &[String] {
        self.synonyms.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replace the synonyms of one field.
    pub fn set_synonyms(&mut self, field: Field, names: Vec<String>) {
        self.synonyms.insert(field, names);
    }

    /// First non-empty synonym of `field` in `record`, normalized.
    pub fn value(&self, record: &Record, field: Field) -> String {
        self.synonyms(field)
            .iter()
            .map(|column| normalize(record.get(column)))
            .find(|v| !v.is_empty())
            .unwrap_or_default()
    }

    pub fn resolve(&self, record: &Record) -> SemanticRecord {
        SemanticRecord {
            invoice_id: self.value(record, Field::InvoiceId),
            line_item_id: self.value(record, Field::LineItemId),
            record_type: self.value(record, Field::RecordType),
            record_year: self.value(record, Field::RecordYear),
            file_name: self.value(record, Field::FileName),
            content_hash: self.value(record, Field::ContentHash),
            entity_code: self.value(record, Field::EntityCode),
            invoice_reference: self.value(record, Field::InvoiceReference),
            line_account_code: self.value(record, Field::LineAccountCode),
            file_tag: self.value(record, Field::FileTag),
            storage_file_name: self.value(record, Field::StorageFileName),
            storage_path: self.value(record, Field::StoragePath),
        }
    }

    // -----------------------------------------------------------------------
    // Parse + Validate
    // -----------------------------------------------------------------------

    /// Default table with the fields listed under `[fields]` replaced.
    pub fn from_toml(input: &str) -> Result<Self, AttachError> {
        let file: FieldTableFile =
            toml::from_str(input).map_err(|e| AttachError::ConfigParse(e.to_string()))?;

        let mut table = FieldTable::default();
        for (name, names) in file.fields {
            let field = Field::from_name(&name).ok_or_else(|| {
                AttachError::ConfigParse(format!("unknown field '{name}'"))
            })?;
            table.set_synonyms(field, names);
        }
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), AttachError> {
        for field in Field::ALL {
            let names = self.synonyms(field);
            if names.is_empty() {
                return Err(AttachError::ConfigValidation(format!(
                    "field '{field}' has no column names"
                )));
            }
            if names.iter().any(|n| n.trim().is_empty()) {
                return Err(AttachError::ConfigValidation(format!(
                    "field '{field}' lists a blank column name"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_is_valid() {
        let table = FieldTable::default();
        table.validate().unwrap();
        assert_eq!(table.synonyms(Field::RecordType), ["Xero type", "Type"]);
    }

    #[test]
    fn first_non_empty_synonym_wins() {
        let table = FieldTable::default();
        let record: Record = [("Xero type", "  "), ("Type", "Bill")].into_iter().collect();
        assert_eq!(table.value(&record, Field::RecordType), "Bill");

        let record: Record = [("Type", "Bill"), ("Xero type", "ACCPAY")].into_iter().collect();
        assert_eq!(table.value(&record, Field::RecordType), "ACCPAY");
    }

    #[test]
    fn generic_ledger_columns_do_not_classify() {
        let table = FieldTable::default();
        let record: Record = [("Name", "Acme Ltd"), ("Reference", "PO-1"), ("Tag", "vip"), ("Path", "/x")]
            .into_iter()
            .collect();
        assert_eq!(table.resolve(&record), SemanticRecord::default());
    }

    #[test]
    fn absent_field_resolves_empty() {
        let table = FieldTable::default();
        let sem = table.resolve(&Record::new());
        assert_eq!(sem, SemanticRecord::default());
    }

    #[test]
    fn toml_overrides_only_listed_fields() {
        let table = FieldTable::from_toml(
            r#"
[fields]
invoice_id = ["Bill number"]
"#,
        )
        .unwrap();
        assert_eq!(table.synonyms(Field::InvoiceId), ["Bill number"]);
        assert_eq!(table.synonyms(Field::RecordYear), ["Xero year", "Year"]);
    }

    #[test]
    fn toml_empty_document_is_default() {
        assert_eq!(FieldTable::from_toml("").unwrap(), FieldTable::default());
    }

    #[test]
    fn toml_unknown_field_rejected() {
        let err = FieldTable::from_toml("[fields]\ncolour = [\"c\"]\n").unwrap_err();
        assert!(matches!(err, AttachError::ConfigParse(_)));
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn toml_empty_list_rejected() {
        let err = FieldTable::from_toml("[fields]\nfile_tag = []\n").unwrap_err();
        assert!(matches!(err, AttachError::ConfigValidation(_)));
    }

    #[test]
    fn toml_blank_name_rejected() {
        let err = FieldTable::from_toml("[fields]\nfile_tag = [\"Tag\", \" \"]\n").unwrap_err();
        assert!(matches!(err, AttachError::ConfigValidation(_)));
    }

    #[test]
    fn field_names_round_trip() {
        for field in Field::ALL {
            assert_eq!(Field::from_name(field.name()), Some(field));
        }
        assert_eq!(Field::from_name("nope"), None);
    }
}
