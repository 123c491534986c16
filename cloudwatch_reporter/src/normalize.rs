//! Keeps values inside the numeric range the ingestion api accepts.
//!
//! A single out-of-range value fails the whole request it rides in, so values are
//! trimmed before they are batched rather than after a rejection.

use crate::diagnostics::{Diagnostic, Diagnostics};

/// Nonzero magnitudes smaller than this are rejected by the ingestion api.
/// The documented floor is lower, but this is the smallest value it actually accepts.
pub const SMALLEST_SENDABLE: f64 = 1E-108;

/// Magnitudes larger than this are rejected by the ingestion api.
/// The documented ceiling is higher, but this is the largest value it actually accepts.
pub const LARGEST_SENDABLE: f64 = 1E108;

/// How a value was changed to make it sendable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// Raised to +/- [`SMALLEST_SENDABLE`]
    TooSmall,
    /// Lowered to +/- [`LARGEST_SENDABLE`]
    TooLarge,
    /// Replaced with 0
    NotANumber,
}

impl From<Adjustment> for Diagnostic {
    fn from(adjustment: Adjustment) -> Self {
        match adjustment {
            Adjustment::TooSmall => Diagnostic::ValueTooSmall,
            Adjustment::TooLarge => Diagnostic::ValueTooLarge,
            Adjustment::NotANumber => Diagnostic::NotANumber,
        }
    }
}

/// Clamp a value into the sendable range, preserving its sign. 0 passes through
/// untouched and NaN becomes 0.
pub fn normalize(value: f64) -> (f64, Option<Adjustment>) {
    if value.is_nan() {
        return (0.0, Some(Adjustment::NotANumber));
    }
    let magnitude = value.abs();
    if 0.0 < magnitude && magnitude < SMALLEST_SENDABLE {
        (SMALLEST_SENDABLE.copysign(value), Some(Adjustment::TooSmall))
    } else if LARGEST_SENDABLE < magnitude {
        (LARGEST_SENDABLE.copysign(value), Some(Adjustment::TooLarge))
    } else {
        (value, None)
    }
}

/// [`normalize`], logging the first adjustment of each kind.
pub(crate) fn normalize_for(name: &str, value: f64, diagnostics: &mut Diagnostics) -> f64 {
    let (normalized, adjustment) = normalize(value);
    if let Some(adjustment) = adjustment {
        if diagnostics.first(adjustment.into()) {
            match adjustment {
                Adjustment::TooSmall => log::debug!("Value for {name} is smaller than what CloudWatch supports; trimming to {normalized}. Further small values won't be logged."),
                Adjustment::TooLarge => log::debug!("Value for {name} is larger than what CloudWatch supports; trimming to {normalized}. Further large values won't be logged."),
                Adjustment::NotANumber => log::debug!("Value for {name} is NaN; sending 0 instead. Further NaN values won't be logged."),
            }
        }
    }
    normalized
}
