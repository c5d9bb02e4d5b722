//! Spreadsheet row producer backed by calamine.
//!
//! Columns are keyed by their letter name (`A`, `B`, ... `AA`), rows by
//! their 1-based sheet row number. Reading stops at the first row without
//! any value or after the configured end row.
//!
//! Cells are read as their displayed text, except date cells: the workbook
//! only tells calamine that a number format is a date, not which one, so
//! dates always render as [`DATE_TIME_FORMAT`]. Map them with the pattern
//! `YYYY-MM-DD HH:mm:ss`.

use calamine::{open_workbook_auto, Data, Range, Reader};
use std::path::Path;
use tracing::info;

use super::RowSource;
use crate::error::{ProviderError, ProviderResult};
use crate::models::{column_name, NumberedRow, Row};

/// Rendering of date cells (chrono syntax).
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Options for [`ExcelSource`].
#[derive(Debug, Clone)]
pub struct ExcelOptions {
    /// Sheet to read; the first sheet of the workbook when `None`.
    pub sheet: Option<String>,
    /// First row to emit (1-based, inclusive).
    pub start: usize,
    /// Last row to emit (1-based, inclusive).
    pub end: Option<usize>,
}

impl Default for ExcelOptions {
    fn default() -> Self {
        Self {
            sheet: None,
            start: 1,
            end: None,
        }
    }
}

pub struct ExcelSource {
    sheet: String,
    range: Range<Data>,
    /// Absolute (row, column) of the range's top-left cell.
    origin: (usize, usize),
    next: usize,
    start: usize,
    end: Option<usize>,
    done: bool,
}

impl ExcelSource {
    /// Open a workbook (xlsx, xlsm, xls, ods) and select the sheet.
    pub fn open(path: impl AsRef<Path>, options: ExcelOptions) -> ProviderResult<Self> {
        let path = path.as_ref();
        info!(file = %path.display(), "Reading excel file");
        let mut workbook =
            open_workbook_auto(path).map_err(|e| ProviderError::Workbook(e.to_string()))?;

        let names = workbook.sheet_names();
        let sheet = match options.sheet.clone() {
            Some(name) if names.contains(&name) => name,
            Some(name) => return Err(ProviderError::SheetNotFound(name)),
            None => names.first().cloned().ok_or(ProviderError::EmptyWorkbook)?,
        };

        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| ProviderError::Workbook(e.to_string()))?;

        Ok(Self::from_range(sheet, range, options))
    }

    /// Build a source over an already loaded sheet range.
    pub fn from_range(sheet: impl Into<String>, range: Range<Data>, options: ExcelOptions) -> Self {
        let origin = range
            .start()
            .map_or((0, 0), |(row, col)| (row as usize, col as usize));
        Self {
            sheet: sheet.into(),
            range,
            origin,
            next: 0,
            start: options.start,
            end: options.end,
            done: false,
        }
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    fn read_row(&self, index: usize) -> Row {
        let (_, width) = self.range.get_size();
        (0..width)
            .filter_map(|col| {
                let text = self.range.get((index, col)).and_then(cell_text)?;
                Some((column_name(self.origin.1 + col), text))
            })
            .collect()
    }
}

/// Displayed text of a cell, `None` for empty cells.
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) if s.is_empty() => None,
        Data::DateTime(dt) if dt.is_datetime() => Some(
            dt.as_datetime()
                .map(|d| d.format(DATE_TIME_FORMAT).to_string())
                .unwrap_or_else(|| dt.as_f64().to_string()),
        ),
        other => Some(other.to_string()),
    }
}

impl RowSource for ExcelSource {
    fn describe(&self) -> String {
        let (height, width) = self.range.get_size();
        format!(
            "excel (sheet '{}', {}x{} cells, rows {}..{})",
            self.sheet,
            height,
            width,
            self.start,
            self.end.map_or_else(|| "end".to_string(), |e| e.to_string())
        )
    }

    fn next_row(&mut self) -> Option<ProviderResult<NumberedRow>> {
        let (height, _) = self.range.get_size();

        while !self.done && self.next < height {
            let index = self.next;
            self.next += 1;

            let number = self.origin.0 + index + 1;
            if number < self.start {
                continue;
            }
            if self.end.is_some_and(|end| number > end) {
                break;
            }

            let values = self.read_row(index);
            if values.is_empty() {
                break;
            }
            return Some(Ok(NumberedRow::new(number, values)));
        }

        self.done = true;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::dates::to_epoch;
    use calamine::{ExcelDateTime, ExcelDateTimeType};

    fn sheet(rows: &[&[&str]]) -> Range<Data> {
        let height = rows.len() as u32;
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(1) as u32;
        let mut range = Range::new((0, 0), (height - 1, width - 1));
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if !value.is_empty() {
                    range.set_value((r as u32, c as u32), Data::String(value.to_string()));
                }
            }
        }
        range
    }

    fn collect(source: &mut ExcelSource) -> Vec<NumberedRow> {
        std::iter::from_fn(|| source.next_row())
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn test_letter_columns_and_header_skip() {
        let range = sheet(&[&["id", "title"], &["INC1", "Printer"], &["INC2", "Disk"]]);
        let options = ExcelOptions {
            start: 2,
            ..ExcelOptions::default()
        };
        let mut source = ExcelSource::from_range("Sheet1", range, options);
        let rows = collect(&mut source);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].number, 2);
        assert_eq!(rows[0].values["A"], "INC1");
        assert_eq!(rows[1].values["B"], "Disk");
    }

    #[test]
    fn test_stops_at_empty_row() {
        let range = sheet(&[&["INC1", "a"], &["", ""], &["INC3", "c"]]);
        let mut source = ExcelSource::from_range("Sheet1", range, ExcelOptions::default());
        assert_eq!(collect(&mut source).len(), 1);
        assert!(source.next_row().is_none());
    }

    #[test]
    fn test_end_bound() {
        let range = sheet(&[&["1"], &["2"], &["3"], &["4"]]);
        let options = ExcelOptions {
            end: Some(2),
            ..ExcelOptions::default()
        };
        let mut source = ExcelSource::from_range("Sheet1", range, options);
        assert_eq!(collect(&mut source).len(), 2);
    }

    #[test]
    fn test_empty_cells_are_omitted() {
        let range = sheet(&[&["INC1", "", "Munich"]]);
        let mut source = ExcelSource::from_range("Sheet1", range, ExcelOptions::default());
        let rows = collect(&mut source);
        assert!(!rows[0].values.contains_key("B"));
        assert_eq!(rows[0].values["C"], "Munich");
    }

    #[test]
    fn test_numeric_cells_use_display_text() {
        let mut range = Range::new((0, 0), (0, 1));
        range.set_value((0, 0), Data::Float(3.0));
        range.set_value((0, 1), Data::Int(42));
        let mut source = ExcelSource::from_range("Sheet1", range, ExcelOptions::default());
        let rows = collect(&mut source);
        assert_eq!(rows[0].values["A"], "3");
        assert_eq!(rows[0].values["B"], "42");
    }

    #[test]
    fn test_date_cells_render_as_timestamp() {
        // 42766.5 is 2017-01-31 12:00 in the 1900 date system
        let mut range = Range::new((0, 0), (0, 1));
        let cell = ExcelDateTime::new(42766.5, ExcelDateTimeType::DateTime, false);
        range.set_value((0, 0), Data::DateTime(cell));
        range.set_value((0, 1), Data::String("INC1".into()));
        let mut source = ExcelSource::from_range("Sheet1", range, ExcelOptions::default());
        let rows = collect(&mut source);

        assert_eq!(rows[0].values["A"], "2017-01-31 12:00:00");
        assert_eq!(
            to_epoch(&rows[0].values["A"], "YYYY-MM-DD HH:mm:ss").unwrap(),
            1485864000
        );
    }

    #[test]
    fn test_duration_cells_keep_serial_value() {
        let mut range = Range::new((0, 0), (0, 0));
        let cell = ExcelDateTime::new(0.5, ExcelDateTimeType::TimeDelta, false);
        range.set_value((0, 0), Data::DateTime(cell));
        let mut source = ExcelSource::from_range("Sheet1", range, ExcelOptions::default());
        assert_eq!(collect(&mut source)[0].values["A"], "0.5");
    }

    #[test]
    fn test_missing_file_is_workbook_error() {
        let err = ExcelSource::open("/nonexistent/incidents.xlsx", ExcelOptions::default());
        assert!(matches!(err, Err(ProviderError::Workbook(_))));
    }
}
