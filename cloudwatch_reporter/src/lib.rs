//! Periodic, batched delivery of in-process metrics to CloudWatch.
//!
//! [`cloudwatch_reporter`](crate) walks a point-in-time snapshot of a metrics
//! registry, turns each counter, gauge, histogram, meter and timer into a handful
//! of datums, and submits them in requests of at most 20. It focuses on your
//! service first - a misbehaving metric or a rejected request is logged and skipped,
//! never allowed to stop a pass.
//!
//! # Getting Started
//!
//! Build a [`CloudWatchReporter`] around a [`PutMetricData`] client, then either
//! call [`CloudWatchReporter::report`] from your own scheduler or hand it to
//! [`CloudWatchReporter::report_forever`] on a tokio runtime.
//!
//! ```
//! # use cloudwatch_reporter::{CloudWatchReporter, HistogramSnapshot, LoggingClient, RegistrySnapshot};
//! let mut reporter = CloudWatchReporter::builder("MyService", LoggingClient::default())
//!     .histogram_summary(true)
//!     .build()
//!     .expect("valid configuration");
//!
//! let snapshot = RegistrySnapshot::default()
//!     .with_counter("requests", 41)
//!     .with_histogram("payload_bytes", HistogramSnapshot::new([512.0, 2048.0, 1024.0]));
//! reporter.report(&snapshot);
//! ```
//!
//! # Feature Flags
//!
//! - `ahash-hasher`: use ahash for the once-only diagnostic bookkeeping.

pub mod batch;
pub mod configuration;
pub mod datum;
pub mod diagnostics;
pub mod dimensions;
pub mod downstream;
pub mod error;
pub mod instance_id;
pub mod normalize;
pub mod registry;
pub mod reporter;
pub mod translate;
pub mod types;
pub mod units;

pub use batch::PassSummary;
pub use datum::{Datum, PutMetricDataRequest, StandardUnit};
pub use downstream::{ChannelClient, LoggingClient, PutMetricData};
pub use registry::{
    CounterSnapshot, HistogramSnapshot, MeterSnapshot, MetricRegistry, RegistrySnapshot,
    TimerSnapshot,
};
pub use reporter::{Builder, CloudWatchReporter};
pub use units::Unit;

/// Errors from collaborators: clients, gauges and identity sources.
pub type StdError = Box<dyn std::error::Error + Send + Sync + 'static>;
