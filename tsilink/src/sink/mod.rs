//! Remote sinks
//!
//! A [`Sink`] accepts one record at a time and returns a future that
//! settles with either an HTTP response (any status) or a transport
//! error. Retrying is the dispatcher's job.

pub mod fake;
pub mod http;

use futures::future::BoxFuture;
use std::collections::BTreeMap;

use crate::error::TransportError;
use crate::models::Record;

pub use fake::FakeSink;
pub use http::{HttpSink, HttpSinkOptions};

/// Response of the destination to one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl SinkResponse {
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Accepted by the transport but rejected by the destination.
    pub fn is_rejection(&self) -> bool {
        self.status >= 400
    }
}

/// Outcome of one send attempt.
pub type SinkResult = Result<SinkResponse, TransportError>;

/// Destination for resolved records.
pub trait Sink {
    /// Start sending `record`. `attempt` is 0 for the first try.
    ///
    /// Must not block: all I/O happens inside the returned future.
    fn send(&self, record: &Record, attempt: u32) -> BoxFuture<'static, SinkResult>;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn send(&self, record: &Record, attempt: u32) -> BoxFuture<'static, SinkResult> {
        (**self).send(record, attempt)
    }
}
