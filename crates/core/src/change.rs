use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeReason {
    MappedSymbol,
    SyntheticSymbol,
    RoundingFix,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeReason::MappedSymbol => write!(f, "mapped symbol"),
            ChangeReason::SyntheticSymbol => write!(f, "synthetic symbol"),
            ChangeReason::RoundingFix => write!(f, "rounding fix"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangedField {
    Symbol,
    Amount,
}

impl fmt::Display for ChangedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangedField::Symbol => write!(f, "Symbol"),
            ChangedField::Amount => write!(f, "Amount"),
        }
    }
}

/// One edit made by postprocessing. `line` is the 1-based line of the row in
/// the input file, counting the header as line 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub line: usize,
    pub field: ChangedField,
    pub old_value: String,
    pub new_value: String,
    pub reason: ChangeReason,
}

impl fmt::Display for ChangeLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}: {} {:?} -> {:?} ({})",
            self.line, self.field, self.old_value, self.new_value, self.reason
        )
    }
}
