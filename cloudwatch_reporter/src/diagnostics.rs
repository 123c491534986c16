//! First-occurrence-only bookkeeping for things worth logging exactly once.

use std::collections::HashSet;

#[cfg(not(feature = "ahash-hasher"))]
use std::collections::hash_map::RandomState;

#[cfg(feature = "ahash-hasher")]
use ahash::RandomState;

/// Alias for the default hasher, selected by the ahash-hasher crate feature
pub(crate) type Hasher = RandomState;

/// Something the reporter tells you about once per lifetime (or once per metric
/// name) rather than on every pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Diagnostic {
    /// A nonzero value was closer to 0 than the ingestion api can represent
    ValueTooSmall,
    /// A value was larger in magnitude than the ingestion api can represent
    ValueTooLarge,
    /// A value was NaN
    NotANumber,
    /// The named gauge reported something other than a number
    UnsupportedGaugeValue(String),
    /// The named timer's unit was substituted with the closest supported one
    SubstitutedUnit(String),
    /// The named timer's unit cannot be sent at all
    UnsupportedUnit(String),
    /// The named metric had more dimensions than a datum may carry
    TooManyDimensions(String),
}

/// The set of diagnostics that have already been logged.
///
/// Owned by one reporter. Passes are never concurrent, so a plain set is enough.
#[derive(Debug, Default)]
pub struct Diagnostics {
    seen: HashSet<Diagnostic, Hasher>,
}

impl Diagnostics {
    /// True the first time this diagnostic is raised, false every time after.
    pub fn first(&mut self, diagnostic: Diagnostic) -> bool {
        self.seen.insert(diagnostic)
    }

    /// Whether the diagnostic has been raised before
    pub fn has_seen(&self, diagnostic: &Diagnostic) -> bool {
        self.seen.contains(diagnostic)
    }
}
