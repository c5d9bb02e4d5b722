//! Row producers
//!
//! A [`RowSource`] yields numbered rows until it is exhausted. The producer
//! task ([`spawn_producer`]) pulls from a source, resolves each row through
//! the mapping [`Resolver`] and forwards the result to the dispatcher as
//! [`ProducerEvent`]s, finishing with exactly one [`ProducerEvent::Eod`].
//!
//! The dispatcher pauses and resumes the task through a [`ProducerHandle`].

pub mod csv;
pub mod excel;
pub mod memory;

use std::path::Path;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::{ProviderError, ProviderResult};
use crate::map::Resolver;
use crate::models::{NumberedRow, ProducerEvent, ProviderKind};

pub use self::csv::{CsvOptions, CsvSource};
pub use excel::{ExcelOptions, ExcelSource};
pub use memory::MemorySource;

/// Events buffered between the producer task and the dispatcher.
pub const CHANNEL_CAPACITY: usize = 200;

/// A sequence of input rows.
pub trait RowSource {
    /// Human readable summary for the startup log.
    fn describe(&self) -> String;

    /// Next row, `None` once the input is exhausted.
    ///
    /// An `Err` concerns a single row; the caller may keep reading.
    fn next_row(&mut self) -> Option<ProviderResult<NumberedRow>>;
}

impl RowSource for Box<dyn RowSource + Send> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn next_row(&mut self) -> Option<ProviderResult<NumberedRow>> {
        (**self).next_row()
    }
}

/// Settings needed to open any of the file based sources.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub kind: ProviderKind,
    pub start: usize,
    pub end: Option<usize>,
    pub sheet: Option<String>,
    pub delimiter: Option<char>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Excel,
            start: 2,
            end: None,
            sheet: None,
            delimiter: None,
        }
    }
}

/// Open `path` with the source selected by `options.kind`.
pub fn open_source(
    path: impl AsRef<Path>,
    options: &SourceOptions,
) -> ProviderResult<Box<dyn RowSource + Send>> {
    match options.kind {
        ProviderKind::Excel => {
            let excel = ExcelOptions {
                sheet: options.sheet.clone(),
                start: options.start,
                end: options.end,
            };
            Ok(Box::new(ExcelSource::open(path, excel)?))
        }
        ProviderKind::Csv => {
            let csv = CsvOptions {
                delimiter: options.delimiter,
                start: options.start,
                end: options.end,
            };
            Ok(Box::new(CsvSource::open(path, csv)?))
        }
    }
}

// =============================================================================
// Pause / Resume
// =============================================================================

/// What the dispatcher may do to the producer.
pub trait ProducerControl {
    /// Stop emitting rows. Idempotent.
    fn pause(&self);
    /// Continue emitting rows. Idempotent.
    fn resume(&self);
}

/// Pause switch of a running producer task.
#[derive(Debug)]
pub struct ProducerHandle {
    paused: watch::Sender<bool>,
}

impl ProducerHandle {
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }
}

impl ProducerControl for ProducerHandle {
    fn pause(&self) {
        self.paused.send_if_modified(|paused| !std::mem::replace(paused, true));
    }

    fn resume(&self) {
        self.paused.send_if_modified(|paused| std::mem::replace(paused, false));
    }
}

// =============================================================================
// Producer Task
// =============================================================================

/// Spawn the producer task on the current runtime.
///
/// The returned receiver yields one event per row followed by `Eod`.
pub fn spawn_producer<S>(
    source: S,
    resolver: Resolver,
) -> (mpsc::Receiver<ProducerEvent>, ProducerHandle, JoinHandle<()>)
where
    S: RowSource + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (paused_tx, paused_rx) = watch::channel(false);
    let task = tokio::spawn(produce(source, resolver, tx, paused_rx));
    (rx, ProducerHandle { paused: paused_tx }, task)
}

async fn produce<S: RowSource>(
    mut source: S,
    mut resolver: Resolver,
    tx: mpsc::Sender<ProducerEvent>,
    mut paused: watch::Receiver<bool>,
) {
    info!(source = %source.describe(), "Starting data provider");

    loop {
        let running = paused.wait_for(|p| !*p).await.is_ok();
        if !running {
            // handle dropped: nobody is listening anymore
            return;
        }

        let row = match source.next_row() {
            None => break,
            Some(Ok(row)) => row,
            Some(Err(error)) => {
                let row = match &error {
                    ProviderError::Csv { line, .. } => *line,
                    _ => 0,
                };
                if tx.send(ProducerEvent::Unreadable { row, error }).await.is_err() {
                    return;
                }
                continue;
            }
        };

        let event = match resolver.resolve(&row.values) {
            Ok(record) => ProducerEvent::Record {
                row: row.number,
                record,
            },
            Err(error) => ProducerEvent::Skipped {
                row: row.number,
                error,
            },
        };

        if tx.send(event).await.is_err() {
            return;
        }
        tokio::task::yield_now().await;
    }

    info!("Stopping data provider");
    let _ = tx.send(ProducerEvent::Eod).await;
}
