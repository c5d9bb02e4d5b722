//! Adaptive batch dispatcher
//!
//! Moves records from the producer to the sink while keeping the number of
//! in-flight requests inside the `[min, max]` window:
//!
//! ```text
//!            submit ──▶ quota left? ──yes──▶ sink ──▶ in flight ──▶ on_completion
//!                           │no                                        │
//!                           ▼                                          │ transport error
//!                  buffer + pause producer                             ▼
//!                           ▲                                   retry / fatal
//!   tick: ratio = max - backlog, drain buffer, resume producer
//! ```
//!
//! State: `Stopped -> Running (start) -> Stopping (end of data) -> Terminated`.
//! A stopping dispatcher terminates on the first tick where nothing is
//! buffered or in flight, or after `force_shutdown_after_idle_intervals`
//! ticks without any request or response.

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::VecDeque;
use std::fmt;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::options::BatchOptions;
use super::stats::Statistics;
use crate::models::{ProducerEvent, Record};
use crate::provider::ProducerControl;
use crate::sink::{Sink, SinkResult};

/// Lifecycle of a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Stopped,
    Running,
    Stopping,
    Terminated,
}

/// What a tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Terminated,
}

/// A settled send attempt.
pub struct Completion {
    pub record: Record,
    pub attempt: u32,
    pub result: SinkResult,
}

/// Log a progress line every this many ticks.
const PROGRESS_EVERY_TICKS: u64 = 10;

/// Log a progress line every this many requests.
const PROGRESS_EVERY_REQUESTS: u64 = 1000;

pub struct Dispatcher<S, P> {
    options: BatchOptions,
    sink: S,
    producer: P,
    stats: Statistics,
    state: DispatcherState,
    ratio: u64,
    buffer: VecDeque<Record>,
    saturated: bool,
    producer_paused: bool,
    send_per_interval: u64,
    interval_requests: u64,
    interval_completions: u64,
    idle_intervals: u32,
    ticks: u64,
    in_flight: FuturesUnordered<BoxFuture<'static, Completion>>,
}

impl<S: Sink, P: ProducerControl> Dispatcher<S, P> {
    pub fn new(options: BatchOptions, sink: S, producer: P) -> Self {
        let ratio = options.initial_ratio;
        Self {
            options,
            sink,
            producer,
            stats: Statistics::default(),
            state: DispatcherState::Stopped,
            ratio,
            buffer: VecDeque::new(),
            saturated: false,
            producer_paused: false,
            send_per_interval: 0,
            interval_requests: 0,
            interval_completions: 0,
            idle_intervals: 0,
            ticks: 0,
            in_flight: FuturesUnordered::new(),
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    pub fn ratio(&self) -> u64 {
        self.ratio
    }

    pub fn backlog(&self) -> u64 {
        self.stats.backlog()
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_saturated(&self) -> bool {
        self.saturated
    }

    pub fn start(&mut self) {
        info!(
            min = self.options.min,
            max = self.options.max,
            initial_ratio = self.ratio,
            max_retries = self.options.max_retries,
            "Starting batch"
        );
        self.state = DispatcherState::Running;
    }

    /// End of data: keep draining until the backlog clears.
    pub fn stop(&mut self) {
        if matches!(self.state, DispatcherState::Stopped | DispatcherState::Running) {
            info!(
                backlog = self.stats.backlog(),
                buffered = self.buffer.len(),
                "End of data, draining"
            );
            self.state = DispatcherState::Stopping;
        }
    }

    /// Hand one record to the sink, or buffer it when the quota is used up.
    pub fn submit(&mut self, record: Record) {
        if self.options.verbose {
            info!(event = %record, "Sending event");
        }

        if self.saturated || self.send_per_interval >= self.ratio {
            self.buffer.push_back(record);
            self.saturate();
            return;
        }

        self.send(record, 0);
        self.send_per_interval += 1;
        if self.send_per_interval >= self.ratio {
            self.saturate();
        }
    }

    /// A row the producer could not read or resolve.
    pub fn skip(&mut self, row: usize, error: &dyn fmt::Display) {
        warn!(row, error = %error, "Skipping row");
        self.stats.on_skipped_row();
    }

    /// Account for a settled attempt; transport errors are retried here.
    pub fn on_completion(&mut self, completion: Completion) {
        self.interval_completions += 1;
        let Completion {
            record,
            attempt,
            result,
        } = completion;

        match result {
            Ok(response) => {
                self.stats.on_response(response.status, Utc::now());
                if response.is_rejection() {
                    error!(
                        status = response.status,
                        headers = ?response.headers,
                        body = response.body.as_deref().unwrap_or(""),
                        "Event rejected"
                    );
                }
            }
            Err(e) if attempt < self.options.max_retries => {
                info!(retry = attempt + 1, error = %e, "Resending request");
                self.send(record, attempt + 1);
            }
            Err(e) => {
                self.stats.on_fatal_error();
                error!(error = %e, attempts = attempt + 1, event = %record, "Giving up on event");
            }
        }
    }

    /// One flow-control step.
    pub fn tick(&mut self) -> TickOutcome {
        self.ticks += 1;

        if self.interval_requests == 0 && self.interval_completions == 0 {
            self.idle_intervals += 1;
        } else {
            self.idle_intervals = 0;
        }
        self.interval_requests = 0;
        self.interval_completions = 0;

        self.ratio = self.options.max.saturating_sub(self.stats.backlog());
        self.send_per_interval = 0;

        while self.send_per_interval < self.ratio {
            match self.buffer.pop_front() {
                Some(record) => {
                    self.send(record, 0);
                    self.send_per_interval += 1;
                }
                None => break,
            }
        }

        if self.buffer.is_empty() && self.send_per_interval < self.ratio {
            self.unsaturate();
        } else {
            self.saturate();
        }

        let backlog = self.stats.backlog();
        if self.ticks % PROGRESS_EVERY_TICKS == 0 {
            info!(
                requests = self.stats.number_of_requests,
                responses = self.stats.number_of_responses,
                backlog,
                ratio = self.ratio,
                buffered = self.buffer.len(),
                "Progress"
            );
        }

        if self.state != DispatcherState::Stopping {
            return TickOutcome::Continue;
        }

        let drained = backlog == 0 && self.buffer.is_empty();
        let idle_ceiling = self.idle_intervals >= self.options.force_shutdown_after_idle_intervals;
        if drained || idle_ceiling {
            if !drained {
                warn!(
                    backlog,
                    buffered = self.buffer.len(),
                    idle_intervals = self.idle_intervals,
                    "No activity, forcing shutdown"
                );
            }
            self.state = DispatcherState::Terminated;
            return TickOutcome::Terminated;
        }

        TickOutcome::Continue
    }

    /// Drive the batch until the producer is exhausted and the backlog has
    /// drained, then report and return the final statistics.
    pub async fn run(mut self, mut events: mpsc::Receiver<ProducerEvent>) -> Statistics {
        self.start();

        let period = self.options.tick_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut producer_open = true;

        loop {
            tokio::select! {
                event = events.recv(), if producer_open => match event {
                    Some(ProducerEvent::Record { row, record }) => {
                        debug!(row, "Received record");
                        self.submit(record);
                    }
                    Some(ProducerEvent::Skipped { row, error }) => self.skip(row, &error),
                    Some(ProducerEvent::Unreadable { row, error }) => self.skip(row, &error),
                    Some(ProducerEvent::Eod) | None => {
                        producer_open = false;
                        self.stop();
                    }
                },
                Some(completion) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    self.on_completion(completion);
                }
                _ = ticker.tick() => {
                    if self.tick() == TickOutcome::Terminated {
                        break;
                    }
                }
            }
        }

        events.close();
        self.in_flight.clear();
        info!("Batch terminated");
        self.stats.report();
        self.stats
    }

    fn send(&mut self, record: Record, attempt: u32) {
        let now = Utc::now();
        if attempt == 0 {
            self.stats.on_request_sent(now);
            if self.stats.number_of_requests % PROGRESS_EVERY_REQUESTS == 0 {
                info!(
                    requests = self.stats.number_of_requests,
                    responses = self.stats.number_of_responses,
                    backlog = self.stats.backlog(),
                    ratio = self.ratio,
                    "Progress"
                );
            }
        } else {
            self.stats.on_retry(now);
        }
        self.interval_requests += 1;

        let response = self.sink.send(&record, attempt);
        self.in_flight.push(
            async move {
                Completion {
                    record,
                    attempt,
                    result: response.await,
                }
            }
            .boxed(),
        );
    }

    fn saturate(&mut self) {
        self.saturated = true;
        if !self.producer_paused {
            debug!(ratio = self.ratio, "Quota used up, pausing producer");
            self.producer.pause();
            self.producer_paused = true;
        }
    }

    fn unsaturate(&mut self) {
        self.saturated = false;
        if self.producer_paused {
            debug!(ratio = self.ratio, "Resuming producer");
            self.producer.resume();
            self.producer_paused = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MappingError, ProviderError, TransportError};
    use crate::map::{MappingSpec, Resolver};
    use crate::models::Row;
    use crate::provider::{spawn_producer, MemorySource};
    use crate::sink::SinkResponse;
    use serde_json::json;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    // -------------------------------------------------------------------------
    // Test doubles
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct CountingControl {
        pauses: Cell<u32>,
        resumes: Cell<u32>,
    }

    impl ProducerControl for &CountingControl {
        fn pause(&self) {
            self.pauses.set(self.pauses.get() + 1);
        }

        fn resume(&self) {
            self.resumes.set(self.resumes.get() + 1);
        }
    }

    /// Never answers.
    struct SilentSink;

    impl Sink for SilentSink {
        fn send(&self, _record: &Record, _attempt: u32) -> BoxFuture<'static, SinkResult> {
            futures::future::pending().boxed()
        }
    }

    /// Answers every request with `status` after `delay`, tracking concurrency.
    #[derive(Clone)]
    struct DelayedSink {
        status: u16,
        delay: Duration,
        attempts: Arc<AtomicU32>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl DelayedSink {
        fn new(status: u16, delay: Duration) -> Self {
            Self {
                status,
                delay,
                attempts: Arc::default(),
                in_flight: Arc::default(),
                max_in_flight: Arc::default(),
            }
        }
    }

    impl Sink for DelayedSink {
        fn send(&self, _record: &Record, _attempt: u32) -> BoxFuture<'static, SinkResult> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let (status, delay, in_flight) = (self.status, self.delay, self.in_flight.clone());
            async move {
                tokio::time::sleep(delay).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(SinkResponse::with_status(status))
            }
            .boxed()
        }
    }

    /// Fails every attempt at the transport level.
    #[derive(Clone, Default)]
    struct BrokenSink {
        attempts: Arc<AtomicU32>,
    }

    impl Sink for BrokenSink {
        fn send(&self, _record: &Record, _attempt: u32) -> BoxFuture<'static, SinkResult> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Err(TransportError::new("connection reset"))).boxed()
        }
    }

    /// Fails the first `failures` attempts at the transport level, then answers 200.
    #[derive(Clone)]
    struct FlakySink {
        failures: u32,
        attempts: Arc<AtomicU32>,
    }

    impl FlakySink {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                attempts: Arc::default(),
            }
        }
    }

    impl Sink for FlakySink {
        fn send(&self, _record: &Record, _attempt: u32) -> BoxFuture<'static, SinkResult> {
            let seen = self.attempts.fetch_add(1, Ordering::SeqCst);
            let result = if seen < self.failures {
                Err(TransportError::new("connection reset"))
            } else {
                Ok(SinkResponse::with_status(200))
            };
            futures::future::ready(result).boxed()
        }
    }

    fn options(min: u64, max: u64) -> BatchOptions {
        BatchOptions {
            force_shutdown_after_idle_intervals: 3,
            ..BatchOptions::with_window(min, max)
        }
    }

    async fn settle_all<S: Sink, P: ProducerControl>(dispatcher: &mut Dispatcher<S, P>) {
        while let Some(completion) = dispatcher.in_flight.next().await {
            dispatcher.on_completion(completion);
        }
    }

    fn feed(records: Vec<Record>) -> mpsc::Receiver<ProducerEvent> {
        let (tx, rx) = mpsc::channel(records.len() + 1);
        for (i, record) in records.into_iter().enumerate() {
            tx.try_send(ProducerEvent::Record { row: i + 1, record }).unwrap();
        }
        tx.try_send(ProducerEvent::Eod).unwrap();
        rx
    }

    // -------------------------------------------------------------------------
    // Synchronous state machine
    // -------------------------------------------------------------------------

    #[test]
    fn test_quota_buffers_and_pauses_once() {
        let control = CountingControl::default();
        let mut options = options(2, 5);
        options.initial_ratio = 3;
        let mut dispatcher = Dispatcher::new(options, SilentSink, &control);
        dispatcher.start();

        for i in 0..8 {
            dispatcher.submit(json!({ "id": i }));
        }

        assert_eq!(dispatcher.in_flight(), 3);
        assert_eq!(dispatcher.buffered(), 5);
        assert!(dispatcher.is_saturated());
        assert_eq!(control.pauses.get(), 1);
    }

    #[test]
    fn test_ratio_is_max_minus_backlog_and_floors_at_zero() {
        let control = CountingControl::default();
        let mut options = options(2, 5);
        options.initial_ratio = 3;
        let mut dispatcher = Dispatcher::new(options, SilentSink, &control);
        dispatcher.start();
        for i in 0..8 {
            dispatcher.submit(json!({ "id": i }));
        }

        assert_eq!(dispatcher.tick(), TickOutcome::Continue);
        assert_eq!(dispatcher.ratio(), 2);
        assert_eq!(dispatcher.in_flight(), 5);
        assert_eq!(dispatcher.buffered(), 3);

        dispatcher.tick();
        assert_eq!(dispatcher.ratio(), 0);
        assert_eq!(dispatcher.in_flight(), 5);
        assert_eq!(control.resumes.get(), 0);
        assert_eq!(control.pauses.get(), 1);
    }

    #[tokio::test]
    async fn test_resume_exactly_once_per_transition() {
        let control = CountingControl::default();
        let mut options = options(1, 4);
        options.initial_ratio = 2;
        let sink = DelayedSink::new(200, Duration::ZERO);
        let mut dispatcher = Dispatcher::new(options, sink, &control);
        dispatcher.start();

        for i in 0..3 {
            dispatcher.submit(json!({ "id": i }));
        }
        assert_eq!(control.pauses.get(), 1);
        settle_all(&mut dispatcher).await;

        dispatcher.tick();
        assert_eq!(dispatcher.buffered(), 0);
        assert!(!dispatcher.is_saturated());
        assert_eq!(control.resumes.get(), 1);

        dispatcher.tick();
        assert_eq!(control.resumes.get(), 1);
    }

    #[tokio::test]
    async fn test_http_errors_are_counted_not_retried() {
        let control = CountingControl::default();
        let sink = DelayedSink::new(500, Duration::ZERO);
        let mut dispatcher = Dispatcher::new(options(50, 150), sink.clone(), &control);
        dispatcher.start();

        for i in 0..4 {
            dispatcher.submit(json!({ "id": i }));
        }
        settle_all(&mut dispatcher).await;

        let stats = dispatcher.statistics();
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(stats.number_of_responses, 4);
        assert_eq!(stats.number_of_errors, 4);
        assert_eq!(stats.number_of_retries, 0);
        assert_eq!(stats.backlog(), 0);
    }

    #[test]
    fn test_stopping_terminates_once_drained() {
        let control = CountingControl::default();
        let mut dispatcher = Dispatcher::new(options(50, 150), SilentSink, &control);
        dispatcher.start();
        assert_eq!(dispatcher.tick(), TickOutcome::Continue);

        dispatcher.stop();
        assert_eq!(dispatcher.state(), DispatcherState::Stopping);
        assert_eq!(dispatcher.tick(), TickOutcome::Terminated);
        assert_eq!(dispatcher.state(), DispatcherState::Terminated);
    }

    #[test]
    fn test_idle_ceiling_forces_shutdown() {
        let control = CountingControl::default();
        let mut dispatcher = Dispatcher::new(options(50, 150), SilentSink, &control);
        dispatcher.start();
        dispatcher.submit(json!({ "id": 1 }));
        dispatcher.stop();

        // the interval with the request is not idle
        assert_eq!(dispatcher.tick(), TickOutcome::Continue);
        assert_eq!(dispatcher.tick(), TickOutcome::Continue);
        assert_eq!(dispatcher.tick(), TickOutcome::Continue);
        assert_eq!(dispatcher.tick(), TickOutcome::Terminated);
        assert_eq!(dispatcher.backlog(), 1);
    }

    // -------------------------------------------------------------------------
    // Full runs
    // -------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_retry_ceiling() {
        let control = CountingControl::default();
        let sink = BrokenSink::default();
        let dispatcher = Dispatcher::new(options(50, 150), sink.clone(), &control);

        let stats = dispatcher.run(feed(vec![json!({ "id": 1 })])).await;

        assert_eq!(sink.attempts.load(Ordering::SeqCst), 6);
        assert_eq!(stats.number_of_requests, 1);
        assert_eq!(stats.number_of_retries, 5);
        assert_eq!(stats.number_of_fatal_errors, 1);
        assert_eq!(stats.number_of_responses, 0);
        assert_eq!(
            stats.number_of_requests,
            stats.number_of_responses + stats.number_of_fatal_errors
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovered_retry_counts_as_response() {
        let control = CountingControl::default();
        let sink = FlakySink::new(2);
        let dispatcher = Dispatcher::new(options(50, 150), sink.clone(), &control);

        let stats = dispatcher.run(feed(vec![json!({ "id": 1 })])).await;

        assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(stats.number_of_requests, 1);
        assert_eq!(stats.number_of_retries, 2);
        assert_eq!(stats.number_of_responses, 1);
        assert_eq!(stats.number_of_errors, 0);
        assert_eq!(stats.number_of_fatal_errors, 0);
        assert_eq!(
            stats.number_of_requests,
            stats.number_of_responses + stats.number_of_fatal_errors
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_backlog_stays_within_window() {
        let sink = DelayedSink::new(200, Duration::from_millis(2500));
        let rows: Vec<Row> = (0..120)
            .map(|i| Row::from([("incident_id".to_string(), format!("INC{}", i))]))
            .collect();
        let resolver = Resolver::new(MappingSpec::from_value(json!({ "id": "incident_id" })));
        let (events, handle, _task) = spawn_producer(MemorySource::new(rows), resolver);

        let dispatcher = Dispatcher::new(options(4, 10), sink.clone(), handle);
        let stats = dispatcher.run(events).await;

        assert!(sink.max_in_flight.load(Ordering::SeqCst) <= 10);
        assert_eq!(stats.number_of_requests, 120);
        assert_eq!(stats.number_of_responses, 120);
        assert_eq!(stats.number_of_fatal_errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_sink_does_not_hang() {
        let control = CountingControl::default();
        let dispatcher = Dispatcher::new(options(50, 150), SilentSink, &control);
        let records = (0..3).map(|i| json!({ "id": i })).collect();

        let stats = tokio::time::timeout(Duration::from_secs(60), dispatcher.run(feed(records)))
            .await
            .expect("dispatcher must terminate");

        assert_eq!(stats.number_of_requests, 3);
        assert_eq!(stats.number_of_responses, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_rows_are_counted() {
        let control = CountingControl::default();
        let sink = DelayedSink::new(200, Duration::ZERO);
        let dispatcher = Dispatcher::new(options(50, 150), sink, &control);

        let (tx, rx) = mpsc::channel(5);
        tx.try_send(ProducerEvent::Skipped {
            row: 7,
            error: MappingError::Validation {
                path: "id".into(),
                value: "BAD".into(),
            },
        })
        .unwrap();
        tx.try_send(ProducerEvent::Unreadable {
            row: 6,
            error: ProviderError::Csv {
                line: 6,
                message: "bad record".into(),
            },
        })
        .unwrap();
        tx.try_send(ProducerEvent::Record {
            row: 8,
            record: json!({ "id": "INC8" }),
        })
        .unwrap();
        tx.try_send(ProducerEvent::Eod).unwrap();

        let stats = dispatcher.run(rx).await;
        assert_eq!(stats.number_of_skipped_rows, 2);
        assert_eq!(stats.number_of_requests, 1);
        assert_eq!(stats.number_of_responses, 1);
    }
}
