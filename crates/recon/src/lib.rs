//! `attachmaster-recon`: invoice/attachment merge and classification engine.
//!
//! Pure engine crate: receives pre-loaded records, returns grouped and
//! labeled records. No network, no filesystem.

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod key;
pub mod model;
pub mod normalize;

pub use classify::{is_file_record, is_invoice_record};
pub use config::{Field, FieldTable};
pub use engine::{load_csv_records, merge_and_classify, merge_and_classify_with, write_master_csv, SourceTag};
pub use error::AttachError;
pub use evidence::summarize;
pub use key::build_key;
pub use model::{Bucket, MergeOutput, MergeSummary, Record, SemanticRecord};
pub use normalize::{normalize, strip_known_prefix};
