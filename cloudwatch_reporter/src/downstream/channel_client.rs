use tokio::sync::mpsc;

use crate::{datum::PutMetricDataRequest, StdError};

use super::PutMetricData;

/// A client that queues requests for an async sender.
///
/// Reporting passes never wait on the network: requests go into a bounded queue and
/// whatever owns the receiver submits them to the real api. When the queue is full
/// or the receiver is gone the request fails, and the reporter drops it.
#[derive(Debug, Clone)]
pub struct ChannelClient {
    queue: mpsc::Sender<PutMetricDataRequest>,
}

impl ChannelClient {
    /// Create a client and the receiver its requests arrive on.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PutMetricDataRequest>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { queue: sender }, receiver)
    }
}

impl PutMetricData for ChannelClient {
    fn put_metric_data(&mut self, request: PutMetricDataRequest) -> Result<(), StdError> {
        self.queue
            .try_send(request)
            .map_err(|e| format!("could not queue request: {e}").into())
    }
}
