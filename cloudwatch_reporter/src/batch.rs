//! Bounded batches of datums, submitted whenever they fill up.

use std::panic::{self, AssertUnwindSafe};

use crate::{
    datum::{Datum, PutMetricDataRequest},
    downstream::PutMetricData,
    reporter::panic_message,
    StdError,
};

/// What happened during one reporting pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Datums handed to the batch
    pub datums: usize,
    /// Requests the client accepted
    pub requests_submitted: usize,
    /// Requests the client rejected
    pub requests_failed: usize,
    /// Datums that were in rejected requests
    pub datums_dropped: usize,
    /// Metrics that could not be translated
    pub metrics_skipped: usize,
}

/// The in-flight request of one pass.
///
/// A batch borrows the client for the length of the pass, so there is never more
/// than one batch and it cannot outlive the pass that began it. It never holds
/// more than its limit: the datum that reaches the limit submits the request.
pub struct Batch<'a, C: PutMetricData + ?Sized> {
    client: &'a mut C,
    request: PutMetricDataRequest,
    max_datums: usize,
    summary: PassSummary,
}

impl<'a, C> Batch<'a, C>
where
    C: PutMetricData + ?Sized,
{
    /// Start an empty batch for a namespace. `max_datums` must be at least 1.
    pub fn begin(client: &'a mut C, namespace: &str, max_datums: usize) -> Self {
        Self {
            client,
            request: PutMetricDataRequest {
                namespace: namespace.to_string(),
                metric_data: Vec::with_capacity(max_datums),
            },
            max_datums: max_datums.max(1),
            summary: PassSummary::default(),
        }
    }

    /// Add a datum, submitting the batch if this fills it.
    pub fn append(&mut self, datum: Datum) {
        log::debug!("Appending {datum}");
        self.request.metric_data.push(datum);
        self.summary.datums += 1;
        if self.max_datums <= self.request.metric_data.len() {
            self.flush();
        }
    }

    /// Submit whatever is batched. The batch is empty afterward whether or not the
    /// client accepted it; rejected datums are dropped, not retried. A client that
    /// panics counts as a rejection.
    pub fn flush(&mut self) {
        if self.request.metric_data.is_empty() {
            return;
        }
        let request = PutMetricDataRequest {
            namespace: self.request.namespace.clone(),
            metric_data: std::mem::replace(
                &mut self.request.metric_data,
                Vec::with_capacity(self.max_datums),
            ),
        };
        let datums = request.metric_data.len();
        let client = &mut *self.client;
        let submitted = panic::catch_unwind(AssertUnwindSafe(|| client.put_metric_data(request)))
            .unwrap_or_else(|panic| {
                Err(StdError::from(format!(
                    "client panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });
        match submitted {
            Ok(()) => self.summary.requests_submitted += 1,
            Err(e) => {
                log::warn!(
                    "Failed to put {datums} datums in {}, dropping them: {e}",
                    self.request.namespace
                );
                self.summary.requests_failed += 1;
                self.summary.datums_dropped += datums;
            }
        }
    }

    /// Datums waiting for the next flush
    pub fn len(&self) -> usize {
        self.request.metric_data.len()
    }

    /// True when nothing is waiting for the next flush
    pub fn is_empty(&self) -> bool {
        self.request.metric_data.is_empty()
    }

    pub(crate) fn skipped_metric(&mut self) {
        self.summary.metrics_skipped += 1;
    }

    /// Submit the remainder and end the pass.
    pub fn finish(mut self) -> PassSummary {
        self.flush();
        self.summary
    }
}
