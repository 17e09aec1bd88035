use thiserror::Error;

use super::transaction::Column;

/// Field-level failures while building a typed record from raw cells.
/// File and line context is attached by the reader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("Invalid date in {column}: '{value}'")]
    InvalidDate { column: &'static str, value: String },
    #[error("Invalid number in {column}: '{value}'")]
    InvalidNumber { column: &'static str, value: String },
    #[error("Missing value in {column}")]
    MissingValue { column: &'static str },
    #[error("Expected {expected} columns, got {found}")]
    ColumnCount { expected: usize, found: usize },
    #[error("Column {index} has values in both rows: '{lead}', '{detail}'")]
    AwardConflict { index: usize, lead: String, detail: String },
}

impl RecordError {
    pub fn invalid_date(column: Column, value: &str) -> Self {
        RecordError::InvalidDate { column: column.header(), value: value.to_string() }
    }

    pub fn invalid_number(column: Column, value: &str) -> Self {
        RecordError::InvalidNumber { column: column.header(), value: value.to_string() }
    }
}
