//! Delimited text row producer with encoding and delimiter auto-detection.
//!
//! Rows carry no header semantics: columns are keyed by their 1-based
//! position (`"1"`, `"2"`, ...), rows by their 1-based line number.

use csv::{ReaderBuilder, StringRecordsIntoIter};
use std::io::Cursor;
use std::path::Path;

use super::RowSource;
use crate::error::{ProviderError, ProviderResult};
use crate::models::{NumberedRow, Row};

/// Options for [`CsvSource`].
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Field delimiter, auto-detected when `None`.
    pub delimiter: Option<char>,
    /// First row to emit (1-based, inclusive).
    pub start: usize,
    /// Last row to emit (1-based, inclusive).
    pub end: Option<usize>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            start: 1,
            end: None,
        }
    }
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "iso-8859-15" | "latin-9" | "latin9" => "iso-8859-15".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes with the given encoding, falling back to lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::mem::decode_latin1(bytes).into_owned(),
        "iso-8859-15" | "latin-9" | "latin9" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best_sep = ',';
    let mut best_count = 0;

    for sep in [',', ';', '\t', '|'] {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Streams rows of a delimited text file.
pub struct CsvSource {
    records: StringRecordsIntoIter<Cursor<Vec<u8>>>,
    start: usize,
    end: Option<usize>,
    encoding: String,
    delimiter: char,
    done: bool,
}

impl CsvSource {
    /// Read and decode the file at `path`.
    pub fn open(path: impl AsRef<Path>, options: CsvOptions) -> ProviderResult<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes, options)
    }

    pub fn from_bytes(bytes: &[u8], options: CsvOptions) -> ProviderResult<Self> {
        let encoding = detect_encoding(bytes);
        let content = decode_content(bytes, &encoding);
        let delimiter = options
            .delimiter
            .unwrap_or_else(|| detect_delimiter(&content));

        if !delimiter.is_ascii() {
            return Err(ProviderError::InvalidDelimiter(delimiter));
        }

        let records = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter as u8)
            .from_reader(Cursor::new(content.into_bytes()))
            .into_records();

        Ok(Self {
            records,
            start: options.start,
            end: options.end,
            encoding,
            delimiter,
            done: false,
        })
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }
}

impl RowSource for CsvSource {
    fn describe(&self) -> String {
        format!(
            "csv (encoding {}, delimiter {:?}, rows {}..{})",
            self.encoding,
            self.delimiter,
            self.start,
            self.end.map_or_else(|| "end".to_string(), |e| e.to_string())
        )
    }

    fn next_row(&mut self) -> Option<ProviderResult<NumberedRow>> {
        while !self.done {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => {
                    let line = e.position().map_or(0, |p| p.line() as usize);
                    return Some(Err(ProviderError::Csv {
                        line,
                        message: e.to_string(),
                    }));
                }
            };

            let number = record.position().map_or(0, |p| p.line() as usize);
            if self.end.is_some_and(|end| number > end) {
                self.done = true;
                break;
            }
            if number < self.start {
                continue;
            }

            let values: Row = record
                .iter()
                .enumerate()
                .map(|(i, value)| ((i + 1).to_string(), value.to_string()))
                .collect();

            return Some(Ok(NumberedRow::new(number, values)));
        }
        None
    }
}
