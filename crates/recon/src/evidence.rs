use std::collections::BTreeMap;

use crate::model::{MergeOutput, MergeSummary, BUCKET_COLUMN, RELATED_COLUMN};
use crate::normalize::normalize;

/// Count labeled records per bucket.
pub fn summarize(output: &MergeOutput) -> MergeSummary {
    let mut bucket_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut related = 0;
    let mut unlabeled = 0;

    for r in &output.records {
        let bucket = normalize(r.get(BUCKET_COLUMN));
        if bucket.is_empty() {
            unlabeled += 1;
        } else {
            *bucket_counts.entry(bucket).or_insert(0) += 1;
        }

        if normalize(r.get(RELATED_COLUMN)) == "Y" {
            related += 1;
        }
    }

    MergeSummary {
        rows: output.records.len(),
        groups: output.group_count,
        related,
        unlabeled,
        bucket_counts,
    }
}
