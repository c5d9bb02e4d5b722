//! Sink used by `--fake`: logs the event instead of sending it.

use futures::future::{self, BoxFuture, FutureExt};
use tracing::info;

use super::{Sink, SinkResponse, SinkResult};
use crate::models::Record;

#[derive(Debug, Clone, Copy, Default)]
pub struct FakeSink;

impl Sink for FakeSink {
    fn send(&self, record: &Record, _attempt: u32) -> BoxFuture<'static, SinkResult> {
        info!(event = %record, "Creating event");
        future::ready(Ok(SinkResponse::with_status(200))).boxed()
    }
}
