//! Turns one metric into the datums that describe it.
//!
//! Each metric kind has its own translation, all of them driven by the
//! [`ReportConfiguration`]. Every value is normalized on the way into a [`Datum`].

use std::time::SystemTime;

use crate::{
    configuration::ReportConfiguration,
    datum::{Datum, StandardUnit},
    diagnostics::{Diagnostic, Diagnostics},
    error::TranslateError,
    normalize::normalize_for,
    registry::{CounterSnapshot, Gauge, HistogramSnapshot, MeterSnapshot, Metric, TimerSnapshot},
    types::DimensionPair,
    units::resolve_duration,
};

/// The name suffix for a percentile: `.median` for 0.5, `_percentile_<q>` otherwise.
///
/// The quantile is written as its shortest round-trip decimal, always with a
/// fractional digit: 0.95 is `_percentile_0.95` and 1 is `_percentile_1.0`.
/// Small quantiles are never written in exponent form, so 0.0001 is
/// `_percentile_0.0001` where JVM reporters sent `_percentile_1.0E-4`.
pub fn percentile_suffix(quantile: f64) -> String {
    if quantile == 0.5 {
        return ".median".to_string();
    }
    let quantile = quantile.to_string();
    if quantile.contains('.') {
        format!("_percentile_{quantile}")
    } else {
        format!("_percentile_{quantile}.0")
    }
}

/// Collects the datums of one metric, sharing name, timestamp and dimensions.
struct Datums<'a> {
    name: String,
    timestamp: SystemTime,
    dimensions: &'a [DimensionPair],
    diagnostics: &'a mut Diagnostics,
    datums: Vec<Datum>,
}

impl Datums<'_> {
    fn push(&mut self, suffix: &str, value: f64, unit: StandardUnit) {
        let name = format!("{}{suffix}", self.name);
        let value = normalize_for(&name, value, self.diagnostics);
        self.datums.push(Datum {
            timestamp: self.timestamp,
            name,
            value,
            unit,
            dimensions: self.dimensions.to_vec(),
        });
    }
}

/// Translate one metric. Unsupported gauge values and timer units produce no datums
/// and are logged once per name; a gauge that fails to read is an error.
pub(crate) fn translate(
    configuration: &ReportConfiguration,
    timestamp: SystemTime,
    name: &str,
    metric: Metric<'_>,
    dimensions: &[DimensionPair],
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Datum>, TranslateError> {
    let mut datums = Datums {
        name: (configuration.sanitizer)(name),
        timestamp,
        dimensions,
        diagnostics,
        datums: Vec::new(),
    };
    match metric {
        Metric::Counter(counter) => translate_counter(counter, &mut datums),
        Metric::Gauge(gauge) => translate_gauge(name, gauge, &mut datums)?,
        Metric::Histogram(histogram) => {
            translate_histogram(configuration, histogram, &mut datums)
        }
        Metric::Meter(meter) => translate_meter(configuration, meter, &mut datums),
        Metric::Timer(timer) => translate_timer(configuration, name, timer, &mut datums),
    }
    Ok(datums.datums)
}

fn translate_counter(counter: &CounterSnapshot, datums: &mut Datums<'_>) {
    datums.push("", counter.count as f64, StandardUnit::Count);
}

fn translate_gauge(
    name: &str,
    gauge: &dyn Gauge,
    datums: &mut Datums<'_>,
) -> Result<(), TranslateError> {
    let value = gauge.value().map_err(TranslateError::GaugeRead)?;
    match value.as_f64() {
        Some(number) => datums.push("", number, StandardUnit::None),
        None => {
            if datums
                .diagnostics
                .first(Diagnostic::UnsupportedGaugeValue(name.to_string()))
            {
                log::warn!(
                    "The type of the value for {name} is {}. It must be a number to send to CloudWatch.",
                    value.type_name()
                );
            }
        }
    }
    Ok(())
}

fn translate_meter(
    configuration: &ReportConfiguration,
    meter: &MeterSnapshot,
    datums: &mut Datums<'_>,
) {
    // CloudWatch has no unit for "per minute" and friends, so rates go out unitless.
    let rate = |per_second: f64| per_second * configuration.rate_factor();
    if configuration.one_minute_rate {
        datums.push(".1MinuteRate", rate(meter.one_minute_rate), StandardUnit::None);
    }
    if configuration.five_minute_rate {
        datums.push(".5MinuteRate", rate(meter.five_minute_rate), StandardUnit::None);
    }
    if configuration.fifteen_minute_rate {
        datums.push(
            ".15MinuteRate",
            rate(meter.fifteen_minute_rate),
            StandardUnit::None,
        );
    }
    if configuration.meter_summary {
        datums.push(".count", meter.count as f64, StandardUnit::None);
        datums.push(".meanRate", rate(meter.mean_rate), StandardUnit::None);
    }
}

fn translate_histogram(
    configuration: &ReportConfiguration,
    histogram: &HistogramSnapshot,
    datums: &mut Datums<'_>,
) {
    push_distribution(
        configuration,
        histogram,
        configuration.histogram_summary,
        StandardUnit::None,
        |value| value,
        datums,
    );
}

fn translate_timer(
    configuration: &ReportConfiguration,
    name: &str,
    timer: &TimerSnapshot,
    datums: &mut Datums<'_>,
) {
    let unit = timer.unit.unwrap_or(configuration.duration_unit);
    let Some(mapping) = resolve_duration(name, unit, datums.diagnostics) else {
        return;
    };
    translate_meter(configuration, &timer.rates, datums);
    push_distribution(
        configuration,
        &timer.durations,
        configuration.timer_summary,
        mapping.standard_unit,
        |nanos| mapping.convert(nanos),
        datums,
    );
}

fn push_distribution(
    configuration: &ReportConfiguration,
    distribution: &HistogramSnapshot,
    summary: bool,
    unit: StandardUnit,
    convert: impl Fn(f64) -> f64,
    datums: &mut Datums<'_>,
) {
    for quantile in &configuration.percentiles {
        let value = convert(distribution.value_at(*quantile));
        datums.push(&percentile_suffix(*quantile), value, unit);
    }
    if summary {
        datums.push(".min", convert(distribution.min()), unit);
        datums.push(".max", convert(distribution.max()), unit);
        datums.push(".mean", convert(distribution.mean()), unit);
        datums.push(".stddev", convert(distribution.std_dev()), unit);
    }
}
