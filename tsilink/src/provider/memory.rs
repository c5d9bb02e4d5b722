//! In-memory row producer.

use std::collections::VecDeque;

use super::RowSource;
use crate::error::ProviderResult;
use crate::models::{NumberedRow, Row};

/// Emits a fixed list of rows, numbered from 1.
#[derive(Debug, Default)]
pub struct MemorySource {
    rows: VecDeque<NumberedRow>,
}

impl MemorySource {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .enumerate()
                .map(|(i, values)| NumberedRow::new(i + 1, values))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RowSource for MemorySource {
    fn describe(&self) -> String {
        format!("memory ({} rows)", self.rows.len())
    }

    fn next_row(&mut self) -> Option<ProviderResult<NumberedRow>> {
        self.rows.pop_front().map(Ok)
    }
}
