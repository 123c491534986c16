//! Mapping of in-process units onto the units the ingestion api supports.

use crate::{
    datum::StandardUnit,
    diagnostics::{Diagnostic, Diagnostics},
};

const NANOS_PER_MICRO: f64 = 1_000.0;
const NANOS_PER_MILLI: f64 = 1_000_000.0;
const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// Units a metric can be recorded or reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    /// nanoseconds
    Nanoseconds,
    /// microseconds
    Microseconds,
    /// milliseconds
    Milliseconds,
    /// seconds
    Seconds,
    /// minutes
    Minutes,
    /// hours
    Hours,
    /// days
    Days,
    /// a plain count
    Count,
    /// bytes
    Bytes,
    /// percent
    Percent,
}

impl Unit {
    /// How many nanoseconds one of this unit is. None for units that are not durations.
    pub fn nanos(&self) -> Option<f64> {
        match self {
            Unit::Nanoseconds => Some(1.0),
            Unit::Microseconds => Some(NANOS_PER_MICRO),
            Unit::Milliseconds => Some(NANOS_PER_MILLI),
            Unit::Seconds => Some(NANOS_PER_SECOND),
            Unit::Minutes => Some(60.0 * NANOS_PER_SECOND),
            Unit::Hours => Some(60.0 * 60.0 * NANOS_PER_SECOND),
            Unit::Days => Some(24.0 * 60.0 * 60.0 * NANOS_PER_SECOND),
            Unit::Count | Unit::Bytes | Unit::Percent => None,
        }
    }

    /// Whether this is a unit of time
    pub fn is_duration(&self) -> bool {
        self.nanos().is_some()
    }
}

/// How the durations of one metric are converted and labeled.
///
/// Resolved once per metric per pass so every duration of that metric (percentiles,
/// min, max, mean, stddev) agrees on the unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationMapping {
    /// The label the ingestion api gets
    pub standard_unit: StandardUnit,
    /// The unit values are actually converted into
    pub conversion: Unit,
    nanos_per_unit: f64,
}

impl DurationMapping {
    /// Convert a nanosecond duration into this mapping's unit
    pub fn convert(&self, nanos: f64) -> f64 {
        nanos / self.nanos_per_unit
    }

    fn new(standard_unit: StandardUnit, conversion: Unit) -> Self {
        Self {
            standard_unit,
            conversion,
            nanos_per_unit: conversion.nanos().unwrap_or(1.0),
        }
    }
}

/// Find the closest supported unit for durations reported in `unit`.
///
/// Seconds, milliseconds and microseconds are supported as they are. Nanoseconds
/// become microseconds, and minutes, hours and days become seconds. None means the
/// unit is not a duration and cannot be reported as one.
pub fn map_duration(unit: Unit) -> Option<DurationMapping> {
    match unit {
        Unit::Seconds => Some(DurationMapping::new(StandardUnit::Seconds, Unit::Seconds)),
        Unit::Milliseconds => Some(DurationMapping::new(
            StandardUnit::Milliseconds,
            Unit::Milliseconds,
        )),
        Unit::Microseconds | Unit::Nanoseconds => Some(DurationMapping::new(
            StandardUnit::Microseconds,
            Unit::Microseconds,
        )),
        Unit::Minutes | Unit::Hours | Unit::Days => {
            Some(DurationMapping::new(StandardUnit::Seconds, Unit::Seconds))
        }
        Unit::Count | Unit::Bytes | Unit::Percent => None,
    }
}

/// [`map_duration`] for a named metric, logging the first substitution or refusal
/// for each name.
pub(crate) fn resolve_duration(
    name: &str,
    unit: Unit,
    diagnostics: &mut Diagnostics,
) -> Option<DurationMapping> {
    match map_duration(unit) {
        Some(mapping) => {
            if mapping.conversion != unit
                && diagnostics.first(Diagnostic::SubstitutedUnit(name.to_string()))
            {
                log::warn!(
                    "CloudWatch does not support {unit:?}; reporting {name} in {:?} instead",
                    mapping.conversion
                );
            }
            Some(mapping)
        }
        None => {
            if diagnostics.first(Diagnostic::UnsupportedUnit(name.to_string())) {
                log::warn!("{unit:?} is not a unit of time; {name} will not be reported");
            }
            None
        }
    }
}

/// Multiplier turning a per-second rate into a rate per `unit`. None for units that
/// are not durations.
pub fn rate_factor(unit: Unit) -> Option<f64> {
    unit.nanos().map(|nanos| nanos / NANOS_PER_SECOND)
}
