//! Pluggable dimension providers and the composer that merges their output.

use crate::{
    datum::MAX_DIMENSIONS_PER_DATUM,
    diagnostics::{Diagnostic, Diagnostics},
    error::TranslateError,
    registry::{Metric, MetricFilter},
    types::{Dimension, DimensionPair, Name},
};

/// Produces dimensions for the datums of a metric.
///
/// Providers are created once with the reporter and asked on every pass. They may
/// return nothing for metrics they do not apply to.
pub trait DimensionProvider: Send + Sync {
    /// Dimensions for a component metric
    fn generate(&self, name: &str, metric: Metric<'_>) -> Vec<DimensionPair>;

    /// Dimensions for process-level metrics. These apply regardless of any per-metric
    /// predicate the provider has.
    fn generate_for_process_metrics(&self) -> Vec<DimensionPair>;
}

/// A fixed set of dimensions, optionally limited to the metrics a predicate matches.
pub struct StaticDimensions {
    dimensions: Vec<DimensionPair>,
    predicate: Option<MetricFilter>,
}

impl StaticDimensions {
    /// Dimensions applied to every metric
    ///
    /// ```
    /// # use cloudwatch_reporter::dimensions::StaticDimensions;
    /// StaticDimensions::new([("Stage", "beta"), ("Region", "us-west-2")]);
    /// ```
    pub fn new(dimensions: impl IntoIterator<Item = (impl Into<Name>, impl Into<Dimension>)>) -> Self {
        Self {
            dimensions: dimensions
                .into_iter()
                .map(|(name, dimension)| (name.into(), dimension.into()))
                .collect(),
            predicate: None,
        }
    }

    /// Only apply these dimensions to component metrics the predicate matches
    pub fn matching(mut self, predicate: MetricFilter) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

impl DimensionProvider for StaticDimensions {
    fn generate(&self, name: &str, metric: Metric<'_>) -> Vec<DimensionPair> {
        match &self.predicate {
            Some(predicate) if !predicate(name, metric) => Vec::new(),
            _ => self.dimensions.clone(),
        }
    }

    fn generate_for_process_metrics(&self) -> Vec<DimensionPair> {
        self.dimensions.clone()
    }
}

/// Dimensions computed by a function of the metric. Contributes nothing to
/// process-level metrics.
pub struct DimensionFn<F> {
    function: F,
}

impl<F> DimensionFn<F>
where
    F: Fn(&str, Metric<'_>) -> Vec<DimensionPair> + Send + Sync,
{
    /// Wrap a function as a provider
    pub fn new(function: F) -> Self {
        Self { function }
    }
}

impl<F> DimensionProvider for DimensionFn<F>
where
    F: Fn(&str, Metric<'_>) -> Vec<DimensionPair> + Send + Sync,
{
    fn generate(&self, name: &str, metric: Metric<'_>) -> Vec<DimensionPair> {
        (self.function)(name, metric)
    }

    fn generate_for_process_metrics(&self) -> Vec<DimensionPair> {
        Vec::new()
    }
}

/// What to do when the providers produce more dimensions than a datum may carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DimensionLimitPolicy {
    /// Keep the first dimensions up to the limit and warn once per metric name
    #[default]
    WarnAndTruncate,
    /// Skip the metric for the pass
    Reject,
}

/// Merges the output of every provider, in registration order.
///
/// Keys are not deduplicated. Two providers emitting the same key produce two
/// entries; that is a configuration mistake, not something corrected here.
pub struct DimensionComposer {
    providers: Vec<Box<dyn DimensionProvider>>,
    limit: usize,
    policy: DimensionLimitPolicy,
}

impl Default for DimensionComposer {
    fn default() -> Self {
        Self::new(
            Vec::new(),
            MAX_DIMENSIONS_PER_DATUM,
            DimensionLimitPolicy::default(),
        )
    }
}

impl DimensionComposer {
    /// A composer over providers with a per-datum dimension limit
    pub fn new(
        providers: Vec<Box<dyn DimensionProvider>>,
        limit: usize,
        policy: DimensionLimitPolicy,
    ) -> Self {
        Self {
            providers,
            limit,
            policy,
        }
    }

    /// Dimensions for a component metric
    pub fn compose(
        &self,
        name: &str,
        metric: Metric<'_>,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<DimensionPair>, TranslateError> {
        let dimensions = self
            .providers
            .iter()
            .flat_map(|provider| provider.generate(name, metric))
            .collect();
        self.limited(name, dimensions, diagnostics)
    }

    /// Dimensions for a process-level metric
    pub fn compose_for_process_metric(
        &self,
        name: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<DimensionPair>, TranslateError> {
        let dimensions = self
            .providers
            .iter()
            .flat_map(|provider| provider.generate_for_process_metrics())
            .collect();
        self.limited(name, dimensions, diagnostics)
    }

    fn limited(
        &self,
        name: &str,
        mut dimensions: Vec<DimensionPair>,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<DimensionPair>, TranslateError> {
        if dimensions.len() <= self.limit {
            return Ok(dimensions);
        }
        match self.policy {
            DimensionLimitPolicy::WarnAndTruncate => {
                if diagnostics.first(Diagnostic::TooManyDimensions(name.to_string())) {
                    log::warn!(
                        "{name} has {} dimensions; only the first {} will be sent",
                        dimensions.len(),
                        self.limit
                    );
                }
                dimensions.truncate(self.limit);
                Ok(dimensions)
            }
            DimensionLimitPolicy::Reject => Err(TranslateError::TooManyDimensions {
                count: dimensions.len(),
                limit: self.limit,
            }),
        }
    }
}
