//! Where finished requests go.
//!
//! The reporter owns one [`PutMetricData`] client and hands it every full or final
//! batch. A failed submission is logged by the reporter and the batch is dropped;
//! clients do not need to retry.

mod channel_client;
mod logging_client;

pub use channel_client::ChannelClient;
pub use logging_client::LoggingClient;

use crate::{datum::PutMetricDataRequest, StdError};

/// Submits metric data to the ingestion api.
pub trait PutMetricData {
    /// Send one request. At most [`MAX_DATUMS_PER_REQUEST`](crate::datum::MAX_DATUMS_PER_REQUEST)
    /// datums ride in a request, all from the same namespace.
    fn put_metric_data(&mut self, request: PutMetricDataRequest) -> Result<(), StdError>;
}

impl<F> PutMetricData for F
where
    F: FnMut(PutMetricDataRequest) -> Result<(), StdError>,
{
    fn put_metric_data(&mut self, request: PutMetricDataRequest) -> Result<(), StdError> {
        self(request)
    }
}
