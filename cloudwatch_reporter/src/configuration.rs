//! The per-pass reporting choices and their validation.

use std::{fmt::Debug, sync::Arc};

use crate::{
    datum::MAX_DATUMS_PER_REQUEST,
    error::ConfigError,
    units::{map_duration, rate_factor, Unit},
};

/// Rewrites metric names into whatever the ingestion api accepts.
pub type Sanitizer = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// What gets derived from each metric on every pass. Fixed once the reporter is built.
///
/// The defaults are parsimonious, since every distinct metric name costs money:
/// the median, 95th and 99th percentiles of histograms and timers, and the one
/// minute rate of meters and timers.
#[derive(Clone)]
pub struct ReportConfiguration {
    pub(crate) percentiles: Vec<f64>,
    pub(crate) one_minute_rate: bool,
    pub(crate) five_minute_rate: bool,
    pub(crate) fifteen_minute_rate: bool,
    pub(crate) meter_summary: bool,
    pub(crate) timer_summary: bool,
    pub(crate) histogram_summary: bool,
    pub(crate) rate_unit: Unit,
    pub(crate) duration_unit: Unit,
    pub(crate) max_datums_per_request: usize,
    pub(crate) sanitizer: Sanitizer,
    rate_factor: f64,
}

impl Default for ReportConfiguration {
    fn default() -> Self {
        Self {
            percentiles: vec![0.5, 0.95, 0.99],
            one_minute_rate: true,
            five_minute_rate: false,
            fifteen_minute_rate: false,
            meter_summary: false,
            timer_summary: false,
            histogram_summary: false,
            rate_unit: Unit::Seconds,
            duration_unit: Unit::Milliseconds,
            max_datums_per_request: MAX_DATUMS_PER_REQUEST,
            sanitizer: Arc::new(|name: &str| name.to_string()),
            rate_factor: 1.0,
        }
    }
}

impl Debug for ReportConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportConfiguration")
            .field("percentiles", &self.percentiles)
            .field("one_minute_rate", &self.one_minute_rate)
            .field("five_minute_rate", &self.five_minute_rate)
            .field("fifteen_minute_rate", &self.fifteen_minute_rate)
            .field("meter_summary", &self.meter_summary)
            .field("timer_summary", &self.timer_summary)
            .field("histogram_summary", &self.histogram_summary)
            .field("rate_unit", &self.rate_unit)
            .field("duration_unit", &self.duration_unit)
            .field("max_datums_per_request", &self.max_datums_per_request)
            .finish_non_exhaustive()
    }
}

impl ReportConfiguration {
    /// Percentiles of histograms and timers to send. 0.5 is sent as `median`.
    /// Replaces the current percentiles (default 0.5, 0.95, 0.99).
    pub fn percentiles(&mut self, percentiles: impl IntoIterator<Item = f64>) {
        self.percentiles = percentiles.into_iter().collect();
    }

    /// Send the one minute rate of meters and timers (default true)
    pub fn one_minute_rate(&mut self, enabled: bool) {
        self.one_minute_rate = enabled
    }

    /// Send the five minute rate of meters and timers (default false)
    pub fn five_minute_rate(&mut self, enabled: bool) {
        self.five_minute_rate = enabled
    }

    /// Send the fifteen minute rate of meters and timers (default false)
    pub fn fifteen_minute_rate(&mut self, enabled: bool) {
        self.fifteen_minute_rate = enabled
    }

    /// Send the lifetime count and mean rate of meters (default false)
    pub fn meter_summary(&mut self, enabled: bool) {
        self.meter_summary = enabled
    }

    /// Send min, max, mean and standard deviation of timers (default false)
    pub fn timer_summary(&mut self, enabled: bool) {
        self.timer_summary = enabled
    }

    /// Send min, max, mean and standard deviation of histograms (default false)
    pub fn histogram_summary(&mut self, enabled: bool) {
        self.histogram_summary = enabled
    }

    /// Report rates as events per this unit (default seconds). Rates are held per
    /// second, so the default sends them as recorded; any other unit changes the
    /// values dashboards see.
    pub fn rate_unit(&mut self, unit: Unit) {
        self.rate_unit = unit
    }

    /// Report timer durations in this unit (default milliseconds)
    pub fn duration_unit(&mut self, unit: Unit) {
        self.duration_unit = unit
    }

    /// Send requests of at most this many datums (default and maximum 20)
    pub fn max_datums_per_request(&mut self, max: usize) {
        self.max_datums_per_request = max
    }

    /// Rewrite every metric name before it is sent (default leaves names alone)
    pub fn sanitize_names_with(&mut self, sanitizer: impl Fn(&str) -> String + Send + Sync + 'static) {
        self.sanitizer = Arc::new(sanitizer)
    }

    pub(crate) fn rate_factor(&self) -> f64 {
        self.rate_factor
    }

    /// Check the configuration and settle derived values.
    pub(crate) fn validated(mut self) -> Result<Self, ConfigError> {
        if map_duration(self.duration_unit).is_none() {
            return Err(ConfigError::UnsupportedDurationUnit(self.duration_unit));
        }
        self.rate_factor =
            rate_factor(self.rate_unit).ok_or(ConfigError::UnsupportedRateUnit(self.rate_unit))?;
        if let Some(invalid) = self
            .percentiles
            .iter()
            .find(|percentile| !(0.0..=1.0).contains(*percentile))
        {
            return Err(ConfigError::InvalidPercentile(*invalid));
        }
        for (i, percentile) in self.percentiles.iter().enumerate() {
            if self.percentiles[..i].contains(percentile) {
                return Err(ConfigError::DuplicatePercentile(*percentile));
            }
        }
        if !(1..=MAX_DATUMS_PER_REQUEST).contains(&self.max_datums_per_request) {
            return Err(ConfigError::InvalidRequestSize {
                requested: self.max_datums_per_request,
                limit: MAX_DATUMS_PER_REQUEST,
            });
        }
        Ok(self)
    }
}
