use std::fmt;

#[derive(Debug)]
pub enum AttachError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Field table validation error (empty synonym list, blank column name).
    ConfigValidation(String),
    /// CSV payload could not be read.
    Csv(String),
}

impl fmt::Display for AttachError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::Csv(msg) => write!(f, "CSV error: {msg}"),
        }
    }
}

impl std::error::Error for AttachError {}

impl From<csv::Error> for AttachError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e.to_string())
    }
}
