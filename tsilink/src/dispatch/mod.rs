//! Adaptive flow control between the producer and a sink
//!
//! - `options`: window bounds, tick period and retry ceiling
//! - `stats`: request / response counters
//! - `dispatcher`: the tick driven state machine

pub mod dispatcher;
pub mod options;
pub mod stats;

pub use dispatcher::{Completion, Dispatcher, DispatcherState, TickOutcome};
pub use options::BatchOptions;
pub use stats::Statistics;
