//! The read-only view of a metrics registry that a reporting pass walks.
//!
//! The registry itself lives elsewhere. All the reporter needs is a point-in-time
//! [`RegistrySnapshot`], grouped by metric kind and sorted by name.

use std::{collections::BTreeMap, fmt::Debug, sync::Arc, time::Duration};

use ordered_float::OrderedFloat;

use crate::{types::GaugeValue, units::Unit, StdError};

/// A source of registry snapshots. Called once per pass.
pub trait MetricRegistry {
    /// A point-in-time view of every registered metric
    fn snapshot(&self) -> RegistrySnapshot;
}

impl<F> MetricRegistry for F
where
    F: Fn() -> RegistrySnapshot,
{
    fn snapshot(&self) -> RegistrySnapshot {
        self()
    }
}

/// Decides whether a metric takes part, by name and metric.
pub type MetricFilter = Arc<dyn Fn(&str, Metric<'_>) -> bool + Send + Sync>;

/// A filter that lets everything through
pub fn match_all() -> MetricFilter {
    Arc::new(|_: &str, _: Metric<'_>| true)
}

/// A gauge is read when it is reported, not when the snapshot is taken.
pub trait Gauge: Send + Sync {
    /// The current value. Errors are logged and the gauge is skipped for the pass.
    fn value(&self) -> Result<GaugeValue, StdError>;
}

impl<F> Gauge for F
where
    F: Fn() -> Result<GaugeValue, StdError> + Send + Sync,
{
    fn value(&self) -> Result<GaugeValue, StdError> {
        self()
    }
}

impl Gauge for GaugeValue {
    fn value(&self) -> Result<GaugeValue, StdError> {
        Ok(self.clone())
    }
}

/// A counter's count at snapshot time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// the count
    pub count: i64,
}

/// A rate-measuring instrument. Rates are events per second.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeterSnapshot {
    /// Events since the meter was created
    pub count: u64,
    /// Events per second over the meter's lifetime
    pub mean_rate: f64,
    /// Exponentially weighted moving rate over 1 minute
    pub one_minute_rate: f64,
    /// Exponentially weighted moving rate over 5 minutes
    pub five_minute_rate: f64,
    /// Exponentially weighted moving rate over 15 minutes
    pub fifteen_minute_rate: f64,
}

/// A sorted sample of a distribution, answering order statistic queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramSnapshot {
    values: Vec<f64>,
}

impl HistogramSnapshot {
    /// Snapshot a sample of values in any order
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        let mut values: Vec<f64> = values.into_iter().collect();
        values.sort_unstable_by_key(|value| OrderedFloat(*value));
        Self { values }
    }

    /// Snapshot a sample of durations as nanoseconds, the way timers hold them
    pub fn from_durations(durations: impl IntoIterator<Item = Duration>) -> Self {
        Self::new(
            durations
                .into_iter()
                .map(|duration| duration.as_nanos() as f64),
        )
    }

    /// How many values are in the sample
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the sample has no values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value at a quantile in `[0, 1]`, interpolated between the neighboring
    /// samples. 0 for an empty sample, NaN for a quantile outside `[0, 1]`.
    pub fn value_at(&self, quantile: f64) -> f64 {
        if !(0.0..=1.0).contains(&quantile) {
            return f64::NAN;
        }
        if self.values.is_empty() {
            return 0.0;
        }

        let position = quantile * (self.values.len() + 1) as f64;
        let index = position as usize;
        if index < 1 {
            return self.values[0];
        }
        if self.values.len() <= index {
            return self.values[self.values.len() - 1];
        }
        let lower = self.values[index - 1];
        let upper = self.values[index];
        lower + (position - position.floor()) * (upper - lower)
    }

    /// The 50th percentile
    pub fn median(&self) -> f64 {
        self.value_at(0.5)
    }

    /// The smallest value, or 0 when empty
    pub fn min(&self) -> f64 {
        self.values.first().copied().unwrap_or_default()
    }

    /// The largest value, or 0 when empty
    pub fn max(&self) -> f64 {
        self.values.last().copied().unwrap_or_default()
    }

    /// The arithmetic mean, or 0 when empty
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// The sample standard deviation, or 0 with fewer than 2 values
    pub fn std_dev(&self) -> f64 {
        if self.values.len() <= 1 {
            return 0.0;
        }
        let mean = self.mean();
        let sum_of_squares: f64 = self
            .values
            .iter()
            .map(|value| (value - mean) * (value - mean))
            .sum();
        (sum_of_squares / (self.values.len() - 1) as f64).sqrt()
    }
}

impl FromIterator<f64> for HistogramSnapshot {
    fn from_iter<T: IntoIterator<Item = f64>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// A timer is a meter of events plus a distribution of their durations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimerSnapshot {
    /// How often the timed thing happens
    pub rates: MeterSnapshot,
    /// How long the timed thing takes, in nanoseconds
    pub durations: HistogramSnapshot,
    /// Report this timer in a unit other than the reporter's duration unit
    pub unit: Option<Unit>,
}

/// The kinds of metric a registry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// a count
    Counter,
    /// a sampled value
    Gauge,
    /// a distribution
    Histogram,
    /// a rate
    Meter,
    /// a rate and a distribution of durations
    Timer,
}

/// A borrowed view of one metric in a snapshot.
#[derive(Clone, Copy)]
pub enum Metric<'a> {
    /// a count
    Counter(&'a CounterSnapshot),
    /// a sampled value
    Gauge(&'a dyn Gauge),
    /// a distribution
    Histogram(&'a HistogramSnapshot),
    /// a rate
    Meter(&'a MeterSnapshot),
    /// a rate and a distribution of durations
    Timer(&'a TimerSnapshot),
}

impl Metric<'_> {
    /// What kind of metric this is
    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Gauge(_) => MetricKind::Gauge,
            Metric::Histogram(_) => MetricKind::Histogram,
            Metric::Meter(_) => MetricKind::Meter,
            Metric::Timer(_) => MetricKind::Timer,
        }
    }
}

impl Debug for Metric<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Counter(counter) => f.debug_tuple("Counter").field(counter).finish(),
            Metric::Gauge(_) => f.write_str("Gauge"),
            Metric::Histogram(histogram) => f
                .debug_struct("Histogram")
                .field("len", &histogram.len())
                .finish(),
            Metric::Meter(meter) => f.debug_tuple("Meter").field(meter).finish(),
            Metric::Timer(timer) => f
                .debug_struct("Timer")
                .field("rates", &timer.rates)
                .field("len", &timer.durations.len())
                .field("unit", &timer.unit)
                .finish(),
        }
    }
}

/// Every metric in a registry at one point in time, grouped by kind and sorted by name.
#[derive(Default, Clone)]
pub struct RegistrySnapshot {
    /// Gauges, by name
    pub gauges: BTreeMap<String, Arc<dyn Gauge>>,
    /// Counters, by name
    pub counters: BTreeMap<String, CounterSnapshot>,
    /// Histograms, by name
    pub histograms: BTreeMap<String, HistogramSnapshot>,
    /// Meters, by name
    pub meters: BTreeMap<String, MeterSnapshot>,
    /// Timers, by name
    pub timers: BTreeMap<String, TimerSnapshot>,
    /// Gauges describing the whole process rather than one component, like memory
    /// use. These get every provider's process-level dimensions.
    pub process_gauges: BTreeMap<String, Arc<dyn Gauge>>,
}

impl RegistrySnapshot {
    /// Add a gauge
    pub fn with_gauge(mut self, name: impl Into<String>, gauge: impl Gauge + 'static) -> Self {
        self.gauges.insert(name.into(), Arc::new(gauge));
        self
    }

    /// Add a counter
    pub fn with_counter(mut self, name: impl Into<String>, count: i64) -> Self {
        self.counters
            .insert(name.into(), CounterSnapshot { count });
        self
    }

    /// Add a histogram
    pub fn with_histogram(mut self, name: impl Into<String>, histogram: HistogramSnapshot) -> Self {
        self.histograms.insert(name.into(), histogram);
        self
    }

    /// Add a meter
    pub fn with_meter(mut self, name: impl Into<String>, meter: MeterSnapshot) -> Self {
        self.meters.insert(name.into(), meter);
        self
    }

    /// Add a timer
    pub fn with_timer(mut self, name: impl Into<String>, timer: TimerSnapshot) -> Self {
        self.timers.insert(name.into(), timer);
        self
    }

    /// Add a process-level gauge
    pub fn with_process_gauge(
        mut self,
        name: impl Into<String>,
        gauge: impl Gauge + 'static,
    ) -> Self {
        self.process_gauges.insert(name.into(), Arc::new(gauge));
        self
    }

    /// Component metrics in reporting order: gauges, counters, histograms, meters,
    /// then timers, each sorted by name. Process-level gauges are not included.
    pub fn metrics(&self) -> impl Iterator<Item = (&str, Metric<'_>)> {
        let gauges = self
            .gauges
            .iter()
            .map(|(name, gauge)| (name.as_str(), Metric::Gauge(gauge.as_ref())));
        let counters = self
            .counters
            .iter()
            .map(|(name, counter)| (name.as_str(), Metric::Counter(counter)));
        let histograms = self
            .histograms
            .iter()
            .map(|(name, histogram)| (name.as_str(), Metric::Histogram(histogram)));
        let meters = self
            .meters
            .iter()
            .map(|(name, meter)| (name.as_str(), Metric::Meter(meter)));
        let timers = self
            .timers
            .iter()
            .map(|(name, timer)| (name.as_str(), Metric::Timer(timer)));
        gauges
            .chain(counters)
            .chain(histograms)
            .chain(meters)
            .chain(timers)
    }

    /// Process-level gauges, sorted by name
    pub fn process_metrics(&self) -> impl Iterator<Item = (&str, Metric<'_>)> {
        self.process_gauges
            .iter()
            .map(|(name, gauge)| (name.as_str(), Metric::Gauge(gauge.as_ref())))
    }

    /// How many metrics the snapshot holds, process-level included
    pub fn len(&self) -> usize {
        self.gauges.len()
            + self.counters.len()
            + self.histograms.len()
            + self.meters.len()
            + self.timers.len()
            + self.process_gauges.len()
    }

    /// True when there is nothing to report
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
