//! artifactor-metrics — counters, gauges, histograms and timers shared by
//! every other service crate, plus a background sampler that derives
//! application-level snapshots from them (SPEC_FULL.md §4.7).

pub mod collector;
pub mod error;
pub mod names;
pub mod sampler;

pub use collector::{Labels, MetricsCollector, TimerScope};
pub use error::{MetricsError, Result};
pub use sampler::{History, Snapshot};
