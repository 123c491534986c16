//! Errors the reporter can return or log.

use crate::{units::Unit, StdError};

/// Problems with a reporter's configuration, caught when it is built.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Every request needs a namespace
    #[error("namespace must not be empty")]
    EmptyNamespace,
    /// Durations can only be reported in units of time
    #[error("unsupported duration unit: {0:?}")]
    UnsupportedDurationUnit(Unit),
    /// Rates can only be reported per unit of time
    #[error("unsupported rate unit: {0:?}")]
    UnsupportedRateUnit(Unit),
    /// Percentiles are quantiles in `[0, 1]`
    #[error("percentile {0} is not within [0, 1]")]
    InvalidPercentile(f64),
    /// Each percentile names its own datum, so it may only appear once
    #[error("percentile {0} is listed more than once")]
    DuplicatePercentile(f64),
    /// At least one dimension has to fit on a datum
    #[error("dimension limit must be at least 1")]
    ZeroDimensionLimit,
    /// Requests hold between 1 and 20 datums
    #[error("requests must hold between 1 and {limit} datums, not {requested}")]
    InvalidRequestSize {
        /// what was asked for
        requested: usize,
        /// what the ingestion api allows
        limit: usize,
    },
}

/// Why one metric could not be translated in a pass. The metric is skipped and the
/// pass moves on to the next one.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    /// The gauge could not produce a value
    #[error("could not read gauge: {0}")]
    GaugeRead(#[source] StdError),
    /// Providers produced more dimensions than a datum may carry
    #[error("{count} dimensions is more than the limit of {limit}")]
    TooManyDimensions {
        /// dimensions produced
        count: usize,
        /// dimensions allowed
        limit: usize,
    },
}
