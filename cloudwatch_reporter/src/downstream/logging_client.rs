use crate::{datum::PutMetricDataRequest, StdError};

use super::PutMetricData;

/// A client that just logs requests and drops them. Handy for trying out a
/// configuration without credentials.
#[derive(Debug, Clone, Copy)]
pub struct LoggingClient {
    log_level: log::Level,
}

impl Default for LoggingClient {
    fn default() -> Self {
        Self {
            log_level: log::Level::Info,
        }
    }
}

impl LoggingClient {
    /// Log requests at this level instead of info
    pub fn at_level(log_level: log::Level) -> Self {
        Self { log_level }
    }
}

impl PutMetricData for LoggingClient {
    fn put_metric_data(&mut self, request: PutMetricDataRequest) -> Result<(), StdError> {
        log::log!(self.log_level, "PutMetricData: {request}");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::LoggingClient;
    use crate::{datum::PutMetricDataRequest, downstream::PutMetricData};

    #[test_log::test]
    fn logging_never_fails() {
        let mut client = LoggingClient::at_level(log::Level::Debug);
        client
            .put_metric_data(PutMetricDataRequest::new("ns"))
            .expect("logging succeeds");
    }
}
