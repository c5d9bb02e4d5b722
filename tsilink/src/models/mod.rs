//! Domain models shared across the pipeline.
//!
//! - [`Row`] - Raw column values of one input line
//! - [`Record`] - A resolved event payload
//! - [`ProducerEvent`] - What the row producer hands to the dispatcher
//! - [`ProviderKind`] - Which row producer reads the input file

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{MappingError, ProviderError};

// =============================================================================
// Rows and Records
// =============================================================================

/// Raw values of one input row, keyed by column identifier.
///
/// Excel rows use letter columns (`A`, `B`, ..., `AA`), delimited text
/// rows use 1-based positions (`"1"`, `"2"`, ...).
pub type Row = HashMap<String, String>;

/// A resolved event, shaped like the mapping that produced it.
pub type Record = serde_json::Value;

/// A row together with its 1-based position in the input.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberedRow {
    pub number: usize,
    pub values: Row,
}

impl NumberedRow {
    pub fn new(number: usize, values: Row) -> Self {
        Self { number, values }
    }
}

// =============================================================================
// Producer Events
// =============================================================================

/// One message from the row producer to the dispatcher.
///
/// `Eod` is sent exactly once, after the last row.
#[derive(Debug)]
pub enum ProducerEvent {
    /// A row resolved into a record.
    Record { row: usize, record: Record },
    /// A row that could not be resolved and is dropped.
    Skipped { row: usize, error: MappingError },
    /// A row the source could not read; `row` is 0 when unknown.
    Unreadable { row: usize, error: ProviderError },
    /// No more data will arrive.
    Eod,
}

// =============================================================================
// Provider Kind
// =============================================================================

/// Input file format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Excel,
    Csv,
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "excel" | "xlsx" | "xls" => Ok(ProviderKind::Excel),
            "csv" => Ok(ProviderKind::Csv),
            other => Err(ProviderError::UnknownProvider(other.to_string())),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Excel => write!(f, "excel"),
            ProviderKind::Csv => write!(f, "csv"),
        }
    }
}

// =============================================================================
// Column Names
// =============================================================================

/// Spreadsheet column name for a 0-based column index (`0 -> A`, `26 -> AA`).
pub fn column_name(index: usize) -> String {
    let mut name = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        name.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

// =============================================================================
// Tests
// =============================================================================
