use std::collections::{HashMap, HashSet};

use crate::classify::{is_file_record, is_invoice_record};
use crate::config::FieldTable;
use crate::error::AttachError;
use crate::key::{build_key, positional_key};
use crate::model::{
    Bucket, Group, MergeOutput, Record, BUCKET_COLUMN, ENGINE_COLUMNS, KEY_COLUMN, RELATED_COLUMN,
    SOURCE_URL_COLUMN, SOURCE_YEAR_COLUMN,
};
use crate::normalize::normalize;

/// Group, classify and label records using the default field table.
pub fn merge_and_classify(records: Vec<Record>) -> MergeOutput {
    merge_and_classify_with(records, &FieldTable::default())
}

/// Group records by derived key and label every group with a [`Bucket`].
///
/// Writes three columns onto the records: the grouping key (always), the
/// bucket and the relatedness flag (per group membership). Existing keys and
/// buckets are kept, so running the engine over its own output changes
/// nothing.
pub fn merge_and_classify_with(mut records: Vec<Record>, table: &FieldTable) -> MergeOutput {
    if records.is_empty() {
        return MergeOutput {
            columns: Vec::new(),
            records,
            group_count: 0,
        };
    }

    let columns = output_columns(&records);
    let groups = group_records(&mut records, table);

    for group in &groups {
        label_group(&mut records, group);
    }

    log::debug!(
        "merge_and_classify: {} rows, {} groups, {} columns",
        records.len(),
        groups.len(),
        columns.len()
    );

    MergeOutput {
        columns,
        records,
        group_count: groups.len(),
    }
}

/// Union of all record columns in first-seen order, then any missing
/// engine columns.
pub fn output_columns(records: &[Record]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut columns: Vec<String> = Vec::new();

    for record in records {
        for column in record.columns() {
            if seen.insert(column) {
                columns.push(column.to_string());
            }
        }
    }

    for column in ENGINE_COLUMNS {
        if !seen.contains(column) {
            columns.push(column.to_string());
        }
    }

    columns
}

/// Resolve every record's key, write it back, and collect groups in the
/// order their keys were first seen.
fn group_records(records: &mut [Record], table: &FieldTable) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    // Keys carried in from an earlier run; positional keys must avoid them.
    let preset: HashSet<String> = records
        .iter()
        .map(|r| normalize(r.get(KEY_COLUMN)))
        .filter(|k| !k.is_empty())
        .collect();

    for (idx, record) in records.iter_mut().enumerate() {
        let sem = table.resolve(record);

        let mut key = normalize(record.get(KEY_COLUMN));
        if key.is_empty() {
            key = build_key(&sem);
        }
        if key.is_empty() {
            key = free_positional_key(idx, &preset);
        }

        let slot = *by_key.entry(key.clone()).or_insert_with(|| {
            groups.push(Group {
                key: key.clone(),
                ..Group::default()
            });
            groups.len() - 1
        });
        let group = &mut groups[slot];

        group.members.push(idx);
        if is_invoice_record(&sem) {
            group.invoices.push(idx);
        }
        if is_file_record(&sem) {
            group.files.push(idx);
        }

        record.set(KEY_COLUMN, key);
    }

    groups
}

/// `ROW::{idx}`, or `ROW::{idx}#{n}` when a preset key already uses it.
fn free_positional_key(idx: usize, preset: &HashSet<String>) -> String {
    let key = positional_key(idx);
    if !preset.contains(&key) {
        return key;
    }
    let mut n = 1;
    loop {
        let candidate = format!("{key}#{n}");
        if !preset.contains(&candidate) {
            log::warn!("row {idx}: key {key} already taken by an input row, using {candidate}");
            return candidate;
        }
        n += 1;
    }
}

fn label_group(records: &mut [Record], group: &Group) {
    let has_invoice = !group.invoices.is_empty();
    let has_file = !group.files.is_empty();

    match (has_invoice, has_file) {
        (true, true) => {
            let bucket = if group.files.len() == 1 {
                Bucket::InvoiceFile
            } else {
                Bucket::InvoiceMultiFile
            };
            for &idx in &group.members {
                set_bucket(&mut records[idx], bucket);
                records[idx].set(RELATED_COLUMN, "Y");
            }
        }
        (true, false) => {
            // Members that are neither invoice nor file stay unlabeled.
            for &idx in &group.invoices {
                set_bucket(&mut records[idx], Bucket::InvoiceOnly);
            }
        }
        (false, true) => {
            let bucket = if group.files.len() == 1 {
                Bucket::OrphanFile
            } else {
                Bucket::OrphanFileGroup
            };
            for &idx in &group.members {
                set_bucket(&mut records[idx], bucket);
            }
            for &idx in &group.files {
                records[idx].set(RELATED_COLUMN, "Y");
            }
        }
        (false, false) => {
            for &idx in &group.members {
                set_bucket(&mut records[idx], Bucket::OrphanUnknown);
            }
        }
    }
}

/// A bucket already on the record wins; manual overrides survive reruns.
fn set_bucket(record: &mut Record, bucket: Bucket) {
    if normalize(record.get(BUCKET_COLUMN)).is_empty() {
        record.set(BUCKET_COLUMN, bucket.as_str());
    }
}

// ---------------------------------------------------------------------------
// CSV in / out
// ---------------------------------------------------------------------------

/// Where a payload came from; stamped onto each of its records.
#[derive(Debug, Clone)]
pub struct SourceTag {
    pub year: String,
    pub url: String,
}

/// Parse a CSV payload (header row required) into records.
///
/// Cells missing from short rows become absent values; cells beyond the
/// header are dropped.
pub fn load_csv_records(csv_data: &str, source: Option<&SourceTag>) -> Result<Vec<Record>, AttachError> {
    let csv_data = csv_data.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = Record::new();
        for (i, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            match row.get(i) {
                Some(value) => record.set(header, value),
                None => record.set_absent(header),
            }
        }
        if let Some(tag) = source {
            record.set(SOURCE_YEAR_COLUMN, tag.year.as_str());
            record.set(SOURCE_URL_COLUMN, tag.url.as_str());
        }
        records.push(record);
    }

    Ok(records)
}

/// Render records under `columns` with a header row. Columns a record lacks
/// render empty; columns outside `columns` are ignored.
pub fn write_master_csv(columns: &[String], records: &[Record]) -> Result<String, AttachError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(columns)?;
    for record in records {
        writer.write_record(columns.iter().map(|c| record.get(c).unwrap_or("")))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AttachError::Csv(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| AttachError::Csv(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(cells: &[(&str, &str)]) -> Record {
        cells.iter().copied().collect()
    }

    fn bucket(r: &Record) -> Option<&str> {
        r.get(BUCKET_COLUMN)
    }

    #[test]
    fn empty_input() {
        let out = merge_and_classify(Vec::new());
        assert!(out.columns.is_empty());
        assert!(out.records.is_empty());
        assert_eq!(out.group_count, 0);
    }

    #[test]
    fn schema_union_first_seen_order() {
        let out = merge_and_classify(vec![
            rec(&[("A", "1"), ("B", "2")]),
            rec(&[("B", "3"), ("C", "4")]),
        ]);
        assert_eq!(
            out.columns,
            ["A", "B", "C", KEY_COLUMN, BUCKET_COLUMN, RELATED_COLUMN]
        );
    }

    #[test]
    fn engine_columns_not_duplicated() {
        let out = merge_and_classify(vec![rec(&[(BUCKET_COLUMN, ""), ("A", "1")])]);
        assert_eq!(out.columns, [BUCKET_COLUMN, "A", KEY_COLUMN, RELATED_COLUMN]);
    }

    #[test]
    fn invoice_and_file_share_key() {
        let out = merge_and_classify(vec![
            rec(&[("Invoice ID", "100"), ("Type", "Bill"), ("Year", "2021"), ("Entity code", "ACME")]),
            rec(&[("Invoice ID", "100"), ("Type", "Bill"), ("Year", "2021"), ("File tag", "receipt")]),
        ]);
        assert_eq!(out.group_count, 1);
        for r in &out.records {
            assert_eq!(r.get(KEY_COLUMN), Some("INV::100::Bill::2021"));
            assert_eq!(bucket(r), Some("Invoice+File"));
            assert_eq!(r.get(RELATED_COLUMN), Some("Y"));
        }
    }

    #[test]
    fn invoice_with_two_files_is_multifile() {
        let out = merge_and_classify(vec![
            rec(&[("Invoice ID", "7"), ("Type", "Bill"), ("Year", "2020"), ("Entity code", "ACME")]),
            rec(&[("Invoice ID", "7"), ("Type", "Bill"), ("Year", "2020"), ("File tag", "a")]),
            rec(&[("Invoice ID", "7"), ("Type", "Bill"), ("Year", "2020"), ("Storage file name", "b.pdf")]),
        ]);
        assert_eq!(out.group_count, 1);
        assert!(out.records.iter().all(|r| bucket(r) == Some("Invoice+MultiFile")));
    }

    #[test]
    fn invoice_only_leaves_neither_members_unlabeled() {
        let out = merge_and_classify(vec![
            rec(&[(KEY_COLUMN, "K1"), ("Entity code", "ACME")]),
            rec(&[(KEY_COLUMN, "K1"), ("Memo", "stray")]),
        ]);
        assert_eq!(bucket(&out.records[0]), Some("Invoice_Only"));
        assert_eq!(bucket(&out.records[1]), None);
        assert_eq!(out.records[0].get(RELATED_COLUMN), None);
    }

    #[test]
    fn single_orphan_file() {
        let out = merge_and_classify(vec![rec(&[("Content hash", "abc"), ("File tag", "x")])]);
        assert_eq!(bucket(&out.records[0]), Some("Orphan_File"));
        assert_eq!(out.records[0].get(RELATED_COLUMN), Some("Y"));
    }

    #[test]
    fn orphan_file_group() {
        let out = merge_and_classify(vec![
            rec(&[("Content hash", "h1"), ("File tag", "a")]),
            rec(&[("Content hash", "h1"), ("Storage path", "/a.pdf")]),
            rec(&[("Content hash", "h1"), ("Storage file name", "a.pdf")]),
        ]);
        assert_eq!(out.group_count, 1);
        for r in &out.records {
            assert_eq!(bucket(r), Some("Orphan_File_Group"));
            assert_eq!(r.get(RELATED_COLUMN), Some("Y"));
        }
    }

    #[test]
    fn file_only_group_relates_file_members_only() {
        let out = merge_and_classify(vec![
            rec(&[("Content hash", "h2"), ("File tag", "scan")]),
            rec(&[("Content hash", "h2"), ("Memo", "no role")]),
        ]);
        assert_eq!(out.group_count, 1);
        assert_eq!(bucket(&out.records[0]), Some("Orphan_File"));
        assert_eq!(bucket(&out.records[1]), Some("Orphan_File"));
        assert_eq!(out.records[0].get(RELATED_COLUMN), Some("Y"));
        assert_eq!(out.records[1].get(RELATED_COLUMN), None);
    }

    #[test]
    fn row_that_is_invoice_and_file_is_invoice_file() {
        let out = merge_and_classify(vec![rec(&[
            ("Invoice ID", "9"),
            ("Type", "Bill"),
            ("Year", "2021"),
            ("Entity code", "ACME"),
            ("File tag", "invoice"),
        ])]);
        assert_eq!(out.group_count, 1);
        assert_eq!(bucket(&out.records[0]), Some("Invoice+File"));
        assert_eq!(out.records[0].get(RELATED_COLUMN), Some("Y"));
    }

    #[test]
    fn positional_key_avoids_carried_over_keys() {
        let out = merge_and_classify(vec![
            rec(&[(KEY_COLUMN, "ROW::1"), ("Memo", "from last run")]),
            rec(&[("Memo", "new")]),
        ]);
        assert_eq!(out.group_count, 2);
        assert_eq!(out.records[0].get(KEY_COLUMN), Some("ROW::1"));
        assert_eq!(out.records[1].get(KEY_COLUMN), Some("ROW::1#1"));
    }

    #[test]
    fn positional_key_skips_every_taken_suffix() {
        let out = merge_and_classify(vec![
            rec(&[("Memo", "fresh")]),
            rec(&[(KEY_COLUMN, "ROW::0"), ("Memo", "old")]),
            rec(&[(KEY_COLUMN, "ROW::0#1"), ("Memo", "older")]),
        ]);
        assert_eq!(out.group_count, 3);
        assert_eq!(out.records[0].get(KEY_COLUMN), Some("ROW::0#2"));
    }

    #[test]
    fn unidentifiable_rows_get_positional_keys() {
        let out = merge_and_classify(vec![rec(&[("Memo", "a")]), rec(&[("Memo", "b")])]);
        assert_eq!(out.group_count, 2);
        assert_eq!(out.records[0].get(KEY_COLUMN), Some("ROW::0"));
        assert_eq!(out.records[1].get(KEY_COLUMN), Some("ROW::1"));
        assert!(out.records.iter().all(|r| bucket(r) == Some("Orphan_Unknown")));
    }

    #[test]
    fn preset_bucket_is_not_overwritten() {
        let out = merge_and_classify(vec![rec(&[("Memo", "a"), (BUCKET_COLUMN, "Manual")])]);
        assert_eq!(bucket(&out.records[0]), Some("Manual"));
    }

    #[test]
    fn preset_key_is_reused() {
        let out = merge_and_classify(vec![rec(&[
            (KEY_COLUMN, "  custom "),
            ("Invoice ID", "100"),
            ("Type", "Bill"),
            ("Year", "2021"),
        ])]);
        assert_eq!(out.records[0].get(KEY_COLUMN), Some("custom"));
    }

    #[test]
    fn rerun_is_stable() {
        let first = merge_and_classify(vec![
            rec(&[("Invoice ID", "1"), ("Type", "Bill"), ("Year", "2021"), ("Entity code", "E")]),
            rec(&[("Content hash", "h"), ("File tag", "t")]),
            rec(&[("Memo", "?")]),
        ]);
        let second = merge_and_classify(first.records.clone());
        assert_eq!(first.records, second.records);
        assert_eq!(first.group_count, second.group_count);
    }

    #[test]
    fn load_csv_tags_source_and_handles_short_rows() {
        let data = "\u{feff}Invoice ID,Type,Year\n100,Bill,2021\n101,Bill\n";
        let tag = SourceTag { year: "2021".into(), url: "https://x/a.csv".into() };
        let records = load_csv_records(data, Some(&tag)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("Invoice ID"), Some("100"));
        assert_eq!(records[0].get(SOURCE_URL_COLUMN), Some("https://x/a.csv"));
        assert!(records[1].contains("Year"));
        assert_eq!(records[1].get("Year"), None);
        assert_eq!(records[1].get(SOURCE_YEAR_COLUMN), Some("2021"));
    }

    #[test]
    fn write_csv_pads_missing_columns() {
        let out = merge_and_classify(vec![
            rec(&[("A", "1"), ("B", "2")]),
            rec(&[("B", "3"), ("C", "4")]),
        ]);
        let text = write_master_csv(&out.columns, &out.records).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "A,B,C,__group_key,__bucket,__related");
        assert_eq!(lines[1], "1,2,,ROW::0,Orphan_Unknown,");
        assert_eq!(lines[2], ",3,4,ROW::1,Orphan_Unknown,");
    }

    #[test]
    fn write_csv_ignores_extra_columns() {
        let columns = vec!["A".to_string()];
        let text = write_master_csv(&columns, &[rec(&[("A", "x"), ("Z", "y")])]).unwrap();
        assert_eq!(text, "A\nx\n");
    }
}
