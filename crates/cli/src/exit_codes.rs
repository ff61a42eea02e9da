//! CLI Exit Code Registry
//!
//! Single source of truth for `amaster` exit codes. Schedulers and shell
//! wrappers branch on them, so treat them as a contract.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain    | Description                              |
//! |---------|-----------|------------------------------------------|
//! | 0       | Universal | Success                                  |
//! | 1       | Universal | General error (unspecified)              |
//! | 2       | Universal | CLI usage error (bad args)               |
//! | 3       | Universal | Local file read/write failed             |
//! | 10-19   | envelope  | Run input envelope problems              |
//! | 20-29   | fetch     | Source download / parse                  |
//! | 30-39   | config    | Field table configuration                |

// =============================================================================
// Universal (0-3)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Local file could not be read or written.
pub const EXIT_IO: u8 = 3;

// =============================================================================
// Envelope (10-19)
// =============================================================================

/// No envelope given (no --json, no --input, empty stdin).
pub const EXIT_ENVELOPE_MISSING: u8 = 10;

/// Envelope or its Links blob is not valid JSON, or Year/Links are empty.
pub const EXIT_ENVELOPE_MALFORMED: u8 = 11;

/// Envelope parsed but carries no TempLink entries.
pub const EXIT_ENVELOPE_NO_LINKS: u8 = 12;

// =============================================================================
// Fetch (20-29)
// =============================================================================

/// Every source failed to download.
pub const EXIT_FETCH_NONE: u8 = 20;

/// Sources downloaded but no rows parsed from any of them.
pub const EXIT_FETCH_NO_ROWS: u8 = 21;

// =============================================================================
// Config (30-39)
// =============================================================================

/// Field table TOML could not be read, parsed or validated.
pub const EXIT_CONFIG_INVALID: u8 = 30;
