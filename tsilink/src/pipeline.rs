//! End-to-end run: mapping file + input file -> events pushed to a sink.
//!
//! # Example
//!
//! ```rust,ignore
//! use tsilink::pipeline::{run, RunOptions};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut options = RunOptions::new("incidents.xlsx", "incident-map.json");
//!     options.fake = true;
//!
//!     let stats = run(options).await?;
//!     println!("{}", stats);
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use tracing::{info, warn};

use crate::dispatch::{BatchOptions, Dispatcher, Statistics};
use crate::error::{ConfigError, PipelineResult};
use crate::map::Resolver;
use crate::provider::{open_source, spawn_producer, RowSource, SourceOptions};
use crate::sink::http::{DEFAULT_HOSTNAME, DEFAULT_PORT};
use crate::sink::{FakeSink, HttpSink, HttpSinkOptions, Sink};

/// Everything a run needs.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Input file (Excel workbook or CSV).
    pub file: PathBuf,
    /// Mapping file (JSON).
    pub map: PathBuf,
    pub source: SourceOptions,
    pub batch: BatchOptions,
    /// Log events instead of sending them.
    pub fake: bool,
    pub email: Option<String>,
    pub api_token: Option<String>,
    pub hostname: String,
    pub port: u16,
}

impl RunOptions {
    pub fn new(file: impl Into<PathBuf>, map: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            map: map.into(),
            source: SourceOptions::default(),
            batch: BatchOptions::default(),
            fake: false,
            email: None,
            api_token: None,
            hostname: DEFAULT_HOSTNAME.to_string(),
            port: DEFAULT_PORT,
        }
    }

    /// Connection settings of the real sink; both credentials are required.
    pub fn sink_options(&self) -> Result<HttpSinkOptions, ConfigError> {
        let email = self
            .email
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or(ConfigError::Missing("email"))?;
        let token = self
            .api_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::Missing("api token"))?;

        Ok(HttpSinkOptions::new(email, token)
            .with_hostname(self.hostname.clone())
            .with_port(self.port))
    }
}

/// Validate the options, then push every row of `options.file`.
///
/// Configuration problems (unreadable mapping, broken template, missing
/// sheet, missing credentials) are returned before the first row is read.
pub async fn run(options: RunOptions) -> PipelineResult<Statistics> {
    options.batch.validate()?;

    let mut resolver = Resolver::from_file(&options.map)?;
    let templates = resolver.prepare()?;
    info!(map = %options.map.display(), templates, "Loaded mapping");

    let sink: Box<dyn Sink + Send> = if options.fake {
        Box::new(FakeSink)
    } else {
        Box::new(HttpSink::new(options.sink_options()?)?)
    };

    let source = open_source(&options.file, &options.source)?;
    Ok(run_with(source, resolver, sink, options.batch).await)
}

/// Run an already assembled pipeline; used by [`run`] and by tests that
/// bring their own source or sink.
pub async fn run_with<R, S>(
    source: R,
    resolver: Resolver,
    sink: S,
    batch: BatchOptions,
) -> Statistics
where
    R: RowSource + Send + 'static,
    S: Sink,
{
    let (events, handle, producer) = spawn_producer(source, resolver);
    let stats = Dispatcher::new(batch, sink, handle).run(events).await;

    if let Err(e) = producer.await {
        warn!(error = %e, "Data provider task failed");
    }
    stats
}
