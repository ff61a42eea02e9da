//! Presence heuristics deciding whether a row is an invoice row, a file row,
//! both, or neither. Values are normalized but never prefix-stripped.

use crate::model::SemanticRecord;

/// File rows carry a tag, a stored file name, or a storage path without an
/// entity code. A path next to an entity code belongs to an invoice row.
pub fn is_file_record(rec: &SemanticRecord) -> bool {
    !rec.file_tag.is_empty()
        || !rec.storage_file_name.is_empty()
        || (!rec.storage_path.is_empty() && rec.entity_code.is_empty())
}

pub fn is_invoice_record(rec: &SemanticRecord) -> bool {
    !rec.entity_code.is_empty()
        || !rec.invoice_reference.is_empty()
        || !rec.line_account_code.is_empty()
        || (!rec.invoice_id.is_empty() && !rec.record_type.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sem() -> SemanticRecord {
        SemanticRecord::default()
    }

    #[test]
    fn empty_record_is_neither() {
        assert!(!is_file_record(&sem()));
        assert!(!is_invoice_record(&sem()));
    }

    #[test]
    fn file_tag_marks_file() {
        let rec = SemanticRecord { file_tag: "receipt".into(), ..sem() };
        assert!(is_file_record(&rec));
        assert!(!is_invoice_record(&rec));
    }

    #[test]
    fn storage_file_name_marks_file() {
        let rec = SemanticRecord { storage_file_name: "inv-100.pdf".into(), ..sem() };
        assert!(is_file_record(&rec));
    }

    #[test]
    fn path_without_entity_code_marks_file() {
        let rec = SemanticRecord { storage_path: "/2021/inv-100.pdf".into(), ..sem() };
        assert!(is_file_record(&rec));
    }

    #[test]
    fn path_with_entity_code_is_invoice_not_file() {
        let rec = SemanticRecord {
            storage_path: "/2021/inv-100.pdf".into(),
            entity_code: "ACME".into(),
            ..sem()
        };
        assert!(!is_file_record(&rec));
        assert!(is_invoice_record(&rec));
    }

    #[test]
    fn invoice_signals() {
        for rec in [
            SemanticRecord { entity_code: "ACME".into(), ..sem() },
            SemanticRecord { invoice_reference: "PO-7".into(), ..sem() },
            SemanticRecord { line_account_code: "400".into(), ..sem() },
            SemanticRecord { invoice_id: "100".into(), record_type: "Bill".into(), ..sem() },
        ] {
            assert!(is_invoice_record(&rec), "{rec:?}");
        }
    }

    #[test]
    fn invoice_id_alone_is_not_invoice() {
        let rec = SemanticRecord { invoice_id: "100".into(), ..sem() };
        assert!(!is_invoice_record(&rec));
        let rec = SemanticRecord { record_type: "Bill".into(), ..sem() };
        assert!(!is_invoice_record(&rec));
    }

    #[test]
    fn row_can_be_both() {
        let rec = SemanticRecord {
            entity_code: "ACME".into(),
            file_tag: "receipt".into(),
            ..sem()
        };
        assert!(is_file_record(&rec));
        assert!(is_invoice_record(&rec));
    }
}
