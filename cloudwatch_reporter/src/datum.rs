//! The wire-facing shape of what gets sent: datums, units and requests.

use std::{fmt::Display, time::SystemTime};

use crate::types::DimensionPair;

/// The ingestion api accepts at most this many datums per request.
pub const MAX_DATUMS_PER_REQUEST: usize = 20;

/// The ingestion api accepts at most this many dimensions per datum.
pub const MAX_DIMENSIONS_PER_DATUM: usize = 10;

/// The units the ingestion api understands. Anything else has to be mapped onto one
/// of these before it is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardUnit {
    /// seconds
    Seconds,
    /// milliseconds
    Milliseconds,
    /// microseconds
    Microseconds,
    /// bytes
    Bytes,
    /// percent
    Percent,
    /// a plain count
    Count,
    /// a count per second
    CountPerSecond,
    /// unitless
    None,
}

impl StandardUnit {
    /// The name the ingestion api uses for this unit.
    pub fn as_str(&self) -> &'static str {
        match self {
            StandardUnit::Seconds => "Seconds",
            StandardUnit::Milliseconds => "Milliseconds",
            StandardUnit::Microseconds => "Microseconds",
            StandardUnit::Bytes => "Bytes",
            StandardUnit::Percent => "Percent",
            StandardUnit::Count => "Count",
            StandardUnit::CountPerSecond => "Count/Second",
            StandardUnit::None => "None",
        }
    }
}

impl Display for StandardUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sample bound for the ingestion api. Built by the reporter with an already
/// normalized value; not modified afterward.
#[derive(Debug, Clone, PartialEq)]
pub struct Datum {
    /// When the reporting pass that produced this datum began
    pub timestamp: SystemTime,
    /// Sanitized metric name plus the suffix of the statistic, like `.median`
    pub name: String,
    /// A value inside the range the ingestion api accepts
    pub value: f64,
    /// The unit of `value`
    pub unit: StandardUnit,
    /// Tags, in provider registration order
    pub dimensions: Vec<DimensionPair>,
}

impl Display for Datum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={} {}", self.name, self.value, self.unit)?;
        if !self.dimensions.is_empty() {
            let mut map = f.debug_map();
            for (name, value) in &self.dimensions {
                map.entry(&name.as_str(), &format_args!("{value}"));
            }
            map.finish()?;
        }
        Ok(())
    }
}

/// A single call's worth of datums for one namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct PutMetricDataRequest {
    /// Namespace all of the datums are sent under
    pub namespace: String,
    /// At most [`MAX_DATUMS_PER_REQUEST`] datums, in the order they were produced
    pub metric_data: Vec<Datum>,
}

impl PutMetricDataRequest {
    /// An empty request for a namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            metric_data: Vec::with_capacity(MAX_DATUMS_PER_REQUEST),
        }
    }
}

impl Display for PutMetricDataRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: [", self.namespace)?;
        for (i, datum) in self.metric_data.iter().enumerate() {
            if 0 < i {
                f.write_str(", ")?;
            }
            write!(f, "{datum}")?;
        }
        f.write_str("]")
    }
}
