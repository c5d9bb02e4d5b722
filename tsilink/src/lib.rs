//! # tsilink - push Excel / CSV rows to TrueSight Intelligence as events
//!
//! Every input row is mapped to a JSON event by a declarative mapping file
//! and POSTed to the event API. An adaptive dispatcher keeps the number of
//! unanswered requests inside a configurable window.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Excel / CSV │────▶│  Producer   │────▶│ Dispatcher  │────▶│    Sink     │
//! │   (rows)    │     │ (map + row) │◀────│ (tick, FC)  │     │ (HTTPS/fake)│
//! └─────────────┘     └─────────────┘pause└─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tsilink::{run, RunOptions};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let mut options = RunOptions::new("incidents.xlsx", "incident-map.json");
//!     options.fake = true;
//!     let stats = run(options).await.unwrap();
//!     println!("{}", stats);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Rows, records and producer events
//! - [`map`] - Mapping specification, templates and expressions
//! - [`provider`] - CSV / Excel row sources and the producer task
//! - [`sink`] - Event API client and the fake sink
//! - [`dispatch`] - Adaptive flow control and statistics
//! - [`pipeline`] - End-to-end run

// Core modules
pub mod error;
pub mod models;

// Mapping
pub mod map;

// Input
pub mod provider;

// Output
pub mod dispatch;
pub mod sink;

// Orchestration
pub mod pipeline;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{
    ConfigError, ExpressionError, MappingError, PipelineError, ProviderError, TransportError,
};

pub use models::{column_name, NumberedRow, ProducerEvent, ProviderKind, Record, Row};

pub use map::{MappingSpec, Resolver};

pub use provider::{
    open_source, spawn_producer, CsvSource, ExcelSource, MemorySource, ProducerControl,
    ProducerHandle, RowSource, SourceOptions,
};

pub use sink::{FakeSink, HttpSink, HttpSinkOptions, Sink, SinkResponse, SinkResult};

pub use dispatch::{BatchOptions, Dispatcher, DispatcherState, Statistics, TickOutcome};

pub use pipeline::{run, run_with, RunOptions};
