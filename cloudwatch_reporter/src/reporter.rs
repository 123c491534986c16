//! The reporter: configuration, one reporting pass, and a periodic driver.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    time::{Duration, SystemTime},
};

use tokio::time::MissedTickBehavior;

use crate::{
    batch::{Batch, PassSummary},
    configuration::ReportConfiguration,
    datum::{Datum, MAX_DIMENSIONS_PER_DATUM},
    diagnostics::Diagnostics,
    dimensions::{DimensionComposer, DimensionLimitPolicy, DimensionProvider},
    downstream::PutMetricData,
    error::{ConfigError, TranslateError},
    instance_id::InstanceIdDimension,
    registry::{match_all, Metric, MetricFilter, MetricRegistry, RegistrySnapshot},
    translate::translate,
    units::Unit,
};

/// Ships registry snapshots to CloudWatch.
///
/// ```
/// # use cloudwatch_reporter::{CloudWatchReporter, LoggingClient, RegistrySnapshot};
/// let mut reporter = CloudWatchReporter::builder("MyService", LoggingClient::default())
///     .percentiles([0.5, 0.99])
///     .instance_id_dimension("i-0123456789")
///     .build()
///     .expect("valid configuration");
///
/// let summary = reporter.report(&RegistrySnapshot::default().with_counter("requests", 12));
/// assert_eq!(1, summary.datums);
/// ```
///
/// Passes must not overlap, which `&mut self` guarantees. Use
/// [`report_forever`](Self::report_forever) to run them on a tokio interval.
pub struct CloudWatchReporter<C> {
    namespace: String,
    client: C,
    configuration: ReportConfiguration,
    composer: DimensionComposer,
    filter: MetricFilter,
    diagnostics: Diagnostics,
}

impl<C> CloudWatchReporter<C>
where
    C: PutMetricData,
{
    /// Start configuring a reporter for a namespace
    pub fn builder(namespace: impl Into<String>, client: C) -> Builder<C> {
        Builder {
            namespace: namespace.into(),
            client,
            configuration: ReportConfiguration::default(),
            providers: Vec::new(),
            max_dimensions: MAX_DIMENSIONS_PER_DATUM,
            dimension_limit_policy: DimensionLimitPolicy::default(),
            filter: match_all(),
        }
    }

    /// Report a snapshot, stamping every datum with the current time.
    pub fn report(&mut self, snapshot: &RegistrySnapshot) -> PassSummary {
        self.report_at(snapshot, SystemTime::now())
    }

    /// Run one reporting pass over a snapshot.
    ///
    /// Nothing here fails the pass: a metric that cannot be translated, or whose
    /// gauge, filter or dimension provider panics, is logged and skipped. A request
    /// the client rejects is logged and dropped.
    pub fn report_at(&mut self, snapshot: &RegistrySnapshot, timestamp: SystemTime) -> PassSummary {
        let Self {
            namespace,
            client,
            configuration,
            composer,
            filter,
            diagnostics,
        } = self;
        let mut batch = Batch::begin(client, namespace, configuration.max_datums_per_request);

        let mut report_metric = |name: &str, metric: Metric<'_>, process_level: bool| {
            let translated = panic::catch_unwind(AssertUnwindSafe(
                || -> Result<Vec<Datum>, TranslateError> {
                    if !filter(name, metric) {
                        return Ok(Vec::new());
                    }
                    let dimensions = if process_level {
                        composer.compose_for_process_metric(name, diagnostics)?
                    } else {
                        composer.compose(name, metric, diagnostics)?
                    };
                    translate(configuration, timestamp, name, metric, &dimensions, diagnostics)
                },
            ));
            match translated {
                Ok(Ok(datums)) => datums.into_iter().for_each(|datum| batch.append(datum)),
                Ok(Err(e)) => {
                    log::warn!("Skipping {name} this pass: {e}");
                    batch.skipped_metric();
                }
                Err(panic) => {
                    log::error!(
                        "Skipping {name} this pass, it panicked while being reported: {}",
                        panic_message(panic.as_ref())
                    );
                    batch.skipped_metric();
                }
            }
        };

        for (name, metric) in snapshot.metrics() {
            report_metric(name, metric, false);
        }
        for (name, metric) in snapshot.process_metrics() {
            report_metric(name, metric, true);
        }

        let summary = batch.finish();
        log::debug!("Reported to {namespace}: {summary:?}");
        summary
    }

    /// Report a fresh snapshot of the registry every period, forever.
    ///
    /// Ticks that come due while a pass is still running are skipped, so passes
    /// never overlap.
    pub async fn report_forever(mut self, registry: impl MetricRegistry, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let snapshot = registry.snapshot();
            self.report(&snapshot);
        }
    }

    /// The namespace every request goes to
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// What gets sent for each metric
    pub fn configuration(&self) -> &ReportConfiguration {
        &self.configuration
    }

    /// The client requests are submitted to
    pub fn client(&self) -> &C {
        &self.client
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Configures a [`CloudWatchReporter`]. Everything is checked in [`build`](Self::build).
pub struct Builder<C> {
    namespace: String,
    client: C,
    configuration: ReportConfiguration,
    providers: Vec<Box<dyn DimensionProvider>>,
    max_dimensions: usize,
    dimension_limit_policy: DimensionLimitPolicy,
    filter: MetricFilter,
}

impl<C> Builder<C>
where
    C: PutMetricData,
{
    /// Percentiles of histograms and timers to send, each in `[0, 1]`.
    /// Default 0.5, 0.95 and 0.99.
    pub fn percentiles(mut self, percentiles: impl IntoIterator<Item = f64>) -> Self {
        self.configuration.percentiles(percentiles);
        self
    }

    /// Send the one minute rate of meters and timers. Default on.
    pub fn one_minute_rate(mut self, enabled: bool) -> Self {
        self.configuration.one_minute_rate(enabled);
        self
    }

    /// Send the five minute rate of meters and timers. Default off.
    pub fn five_minute_rate(mut self, enabled: bool) -> Self {
        self.configuration.five_minute_rate(enabled);
        self
    }

    /// Send the fifteen minute rate of meters and timers. Default off.
    pub fn fifteen_minute_rate(mut self, enabled: bool) -> Self {
        self.configuration.fifteen_minute_rate(enabled);
        self
    }

    /// Send the lifetime count and mean rate of meters. Default off.
    pub fn meter_summary(mut self, enabled: bool) -> Self {
        self.configuration.meter_summary(enabled);
        self
    }

    /// Send the min, max, mean and stddev of timers. Default off.
    pub fn timer_summary(mut self, enabled: bool) -> Self {
        self.configuration.timer_summary(enabled);
        self
    }

    /// Send the min, max, mean and stddev of histograms. Default off.
    pub fn histogram_summary(mut self, enabled: bool) -> Self {
        self.configuration.histogram_summary(enabled);
        self
    }

    /// Report rates as events per this unit. Default seconds, which sends rates as
    /// recorded.
    pub fn rate_unit(mut self, unit: Unit) -> Self {
        self.configuration.rate_unit(unit);
        self
    }

    /// Report timer durations in this unit unless the timer names its own.
    /// Default milliseconds.
    pub fn duration_unit(mut self, unit: Unit) -> Self {
        self.configuration.duration_unit(unit);
        self
    }

    /// Datums per request, at most 20. Default 20.
    pub fn max_datums_per_request(mut self, max: usize) -> Self {
        self.configuration.max_datums_per_request(max);
        self
    }

    /// Rewrite metric names before they are sent
    pub fn sanitize_names_with(
        mut self,
        sanitizer: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.configuration.sanitize_names_with(sanitizer);
        self
    }

    /// Only report metrics the filter matches
    pub fn filter(mut self, filter: MetricFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Add a dimension provider. Providers are asked in the order they are added.
    pub fn dimension_provider(mut self, provider: impl DimensionProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Tag every datum with the instance id from the EC2 metadata service.
    /// Needs a tokio runtime to resolve; `InstanceId=unknown` is sent until then.
    pub fn ec2_instance_id_dimension(self) -> Self {
        self.dimension_provider(InstanceIdDimension::ec2())
    }

    /// Tag every datum with a fixed instance id
    pub fn instance_id_dimension(self, instance_id: impl Into<String>) -> Self {
        self.dimension_provider(InstanceIdDimension::fixed(instance_id))
    }

    /// Dimensions a datum may carry. Default 10, the ingestion api's limit.
    pub fn max_dimensions(mut self, max_dimensions: usize) -> Self {
        self.max_dimensions = max_dimensions;
        self
    }

    /// What to do with metrics that have too many dimensions
    pub fn dimension_limit_policy(mut self, policy: DimensionLimitPolicy) -> Self {
        self.dimension_limit_policy = policy;
        self
    }

    /// Check the configuration and build the reporter
    pub fn build(self) -> Result<CloudWatchReporter<C>, ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        if self.max_dimensions == 0 {
            return Err(ConfigError::ZeroDimensionLimit);
        }
        let configuration = self.configuration.validated()?;
        log::debug!(
            "Reporting to {} with {configuration:?}",
            self.namespace
        );
        Ok(CloudWatchReporter {
            namespace: self.namespace,
            client: self.client,
            configuration,
            composer: DimensionComposer::new(
                self.providers,
                self.max_dimensions,
                self.dimension_limit_policy,
            ),
            filter: self.filter,
            diagnostics: Diagnostics::default(),
        })
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use futures::{future::BoxFuture, FutureExt};

    use super::CloudWatchReporter;
    use crate::{
        datum::{Datum, PutMetricDataRequest, StandardUnit},
        diagnostics::Diagnostic,
        dimensions::{DimensionFn, DimensionLimitPolicy, StaticDimensions},
        downstream::{ChannelClient, PutMetricData},
        error::ConfigError,
        instance_id::{InstanceIdDimension, InstanceIdentity},
        registry::{HistogramSnapshot, Metric, MeterSnapshot, RegistrySnapshot, TimerSnapshot},
        types::{Dimension, GaugeValue, Name},
        units::Unit,
        StdError,
    };

    /// Keeps every request, failing the first `failures` of them.
    #[derive(Clone, Default)]
    struct RecordingClient {
        requests: Arc<Mutex<Vec<PutMetricDataRequest>>>,
        failures: usize,
    }

    impl RecordingClient {
        fn failing_first(failures: usize) -> Self {
            Self {
                failures,
                ..Default::default()
            }
        }

        fn take(&self) -> Vec<PutMetricDataRequest> {
            std::mem::take(&mut *self.requests.lock().expect("local mutex"))
        }
    }

    impl PutMetricData for RecordingClient {
        fn put_metric_data(&mut self, request: PutMetricDataRequest) -> Result<(), StdError> {
            if 0 < self.failures {
                self.failures -= 1;
                return Err("invalid parameter combination".into());
            }
            self.requests.lock().expect("local mutex").push(request);
            Ok(())
        }
    }

    fn datums(requests: &[PutMetricDataRequest]) -> Vec<&Datum> {
        requests
            .iter()
            .flat_map(|request| request.metric_data.iter())
            .collect()
    }

    fn default_reporter(client: &RecordingClient) -> CloudWatchReporter<RecordingClient> {
        CloudWatchReporter::builder("test", client.clone())
            .build()
            .expect("valid configuration")
    }

    #[test_log::test]
    fn counters_report_their_current_count() {
        let client = RecordingClient::default();
        let mut reporter = default_reporter(&client);

        reporter.report(&RegistrySnapshot::default().with_counter("req", 0));
        let requests = client.take();
        assert_eq!(1, requests.len());
        assert_eq!("test", requests[0].namespace);
        let sent = datums(&requests);
        assert_eq!(1, sent.len());
        assert_eq!("req", sent[0].name);
        assert_eq!(0.0, sent[0].value);
        assert_eq!(StandardUnit::Count, sent[0].unit);

        reporter.report(&RegistrySnapshot::default().with_counter("req", 1));
        let requests = client.take();
        assert_eq!(1.0, datums(&requests)[0].value);
    }

    #[test_log::test]
    fn timers_report_every_enabled_statistic() {
        let client = RecordingClient::default();
        let mut reporter = CloudWatchReporter::builder("test", client.clone())
            .duration_unit(Unit::Seconds)
            .percentiles([0.1, 0.5, 0.9, 0.999])
            .timer_summary(true)
            .one_minute_rate(false)
            .five_minute_rate(true)
            .build()
            .expect("valid configuration");
        let timer = TimerSnapshot {
            rates: MeterSnapshot::default(),
            durations: HistogramSnapshot::from_durations(
                (0..5000).map(|i| Duration::from_secs(60 * (i % 100))),
            ),
            unit: None,
        };

        let summary = reporter.report(&RegistrySnapshot::default().with_timer("t", timer));
        assert_eq!(9, summary.datums);
        let requests = client.take();
        let sent = datums(&requests);
        let names: Vec<&str> = sent.iter().map(|datum| datum.name.as_str()).collect();
        assert_eq!(
            vec![
                "t.5MinuteRate",
                "t_percentile_0.1",
                "t.median",
                "t_percentile_0.9",
                "t_percentile_0.999",
                "t.min",
                "t.max",
                "t.mean",
                "t.stddev",
            ],
            names
        );
        let value_of = |name: &str| {
            sent
                .iter()
                .find(|datum| datum.name == name)
                .map(|datum| datum.value)
                .expect("datum is present")
        };
        assert_eq!(0.0, value_of("t.min"));
        assert!((value_of("t_percentile_0.999") - 5940.0).abs() < 1e-6);
        assert!(sent[1..]
            .iter()
            .all(|datum| datum.unit == StandardUnit::Seconds));
    }

    #[test_log::test]
    fn non_numeric_gauges_warn_once_and_send_nothing() {
        let client = RecordingClient::default();
        let mut reporter = default_reporter(&client);
        let snapshot = RegistrySnapshot::default().with_gauge("status", GaugeValue::from("ok"));

        for _ in 0..3 {
            let summary = reporter.report(&snapshot);
            assert_eq!(0, summary.datums);
            assert_eq!(0, summary.metrics_skipped);
        }
        assert!(client.take().is_empty());
        assert!(reporter
            .diagnostics
            .has_seen(&Diagnostic::UnsupportedGaugeValue("status".to_string())));
    }

    #[test_log::test]
    fn requests_never_exceed_twenty_datums() {
        let client = RecordingClient::default();
        let mut reporter = default_reporter(&client);
        let snapshot = (0..21).fold(RegistrySnapshot::default(), |snapshot, i| {
            snapshot.with_counter(format!("c{i:02}"), i)
        });

        let summary = reporter.report(&snapshot);
        assert_eq!(21, summary.datums);
        assert_eq!(2, summary.requests_submitted);
        let sizes: Vec<usize> = client
            .take()
            .iter()
            .map(|request| request.metric_data.len())
            .collect();
        assert_eq!(vec![20, 1], sizes);
    }

    #[test_log::test]
    fn rejected_requests_are_dropped_not_retried() {
        let client = RecordingClient::failing_first(1);
        let mut reporter = default_reporter(&client);
        let snapshot = (0..25).fold(RegistrySnapshot::default(), |snapshot, i| {
            snapshot.with_counter(format!("c{i:02}"), i)
        });

        let summary = reporter.report(&snapshot);
        assert_eq!(1, summary.requests_failed);
        assert_eq!(20, summary.datums_dropped);
        assert_eq!(1, summary.requests_submitted);

        let requests = client.take();
        assert_eq!(1, requests.len());
        let names: Vec<&str> = datums(&requests)
            .iter()
            .map(|datum| datum.name.as_str())
            .collect();
        assert_eq!(vec!["c20", "c21", "c22", "c23", "c24"], names);
    }

    #[test_log::test]
    fn one_broken_metric_does_not_stop_the_pass() {
        let client = RecordingClient::default();
        let mut reporter = default_reporter(&client);
        let snapshot = RegistrySnapshot::default()
            .with_gauge("broken", || -> Result<GaugeValue, StdError> {
                Err("disk unplugged".into())
            })
            .with_counter("req", 3);

        let summary = reporter.report(&snapshot);
        assert_eq!(1, summary.metrics_skipped);
        assert_eq!(1, summary.datums);
        assert_eq!("req", datums(&client.take())[0].name);
    }

    #[test_log::test]
    fn a_panicking_gauge_does_not_stop_the_pass() {
        let client = RecordingClient::default();
        let mut reporter = default_reporter(&client);
        let snapshot = RegistrySnapshot::default()
            .with_gauge("a_bad", || -> Result<GaugeValue, StdError> { panic!("gauge bug") })
            .with_counter("req", 1);

        for _ in 0..2 {
            let summary = reporter.report(&snapshot);
            assert_eq!(1, summary.metrics_skipped);
            let requests = client.take();
            let names: Vec<&str> = datums(&requests)
                .iter()
                .map(|datum| datum.name.as_str())
                .collect();
            assert_eq!(vec!["req"], names);
        }
    }

    #[test_log::test]
    fn a_panicking_dimension_provider_does_not_stop_the_pass() {
        let client = RecordingClient::default();
        let mut reporter = CloudWatchReporter::builder("test", client.clone())
            .dimension_provider(DimensionFn::new(|name: &str, _metric: Metric<'_>| {
                if name == "a_bad" {
                    panic!("provider bug");
                }
                Vec::new()
            }))
            .build()
            .expect("valid configuration");
        let snapshot = RegistrySnapshot::default()
            .with_counter("a_bad", 1)
            .with_counter("req", 1);

        let summary = reporter.report(&snapshot);
        assert_eq!(1, summary.metrics_skipped);
        assert_eq!(1, summary.datums);
        assert_eq!("req", datums(&client.take())[0].name);
    }

    #[test_log::test]
    fn filters_choose_what_is_reported() {
        let client = RecordingClient::default();
        let mut reporter = CloudWatchReporter::builder("test", client.clone())
            .filter(Arc::new(|name: &str, _metric: Metric<'_>| {
                !name.starts_with("debug.")
            }))
            .build()
            .expect("valid configuration");
        let snapshot = RegistrySnapshot::default()
            .with_counter("debug.retries", 1)
            .with_counter("req", 1);

        reporter.report(&snapshot);
        let requests = client.take();
        let names: Vec<&str> = datums(&requests)
            .iter()
            .map(|datum| datum.name.as_str())
            .collect();
        assert_eq!(vec!["req"], names);
    }

    #[test_log::test]
    fn process_metrics_carry_process_dimensions() {
        let client = RecordingClient::default();
        let mut reporter = CloudWatchReporter::builder("test", client.clone())
            .dimension_provider(
                StaticDimensions::new([("Stage", "beta")])
                    .matching(Arc::new(|_: &str, _: Metric<'_>| false)),
            )
            .build()
            .expect("valid configuration");
        let snapshot = RegistrySnapshot::default()
            .with_counter("req", 1)
            .with_process_gauge("threads", GaugeValue::from(12_u32));

        reporter.report(&snapshot);
        let requests = client.take();
        let sent = datums(&requests);
        assert_eq!(2, sent.len());
        assert_eq!("req", sent[0].name);
        assert!(sent[0].dimensions.is_empty());
        assert_eq!("threads", sent[1].name);
        assert_eq!(
            vec![(Name::from("Stage"), Dimension::from("beta"))],
            sent[1].dimensions
        );
    }

    #[test_log::test]
    fn too_many_dimensions_can_be_rejected() {
        let client = RecordingClient::default();
        let mut reporter = CloudWatchReporter::builder("test", client.clone())
            .dimension_provider(StaticDimensions::new([("a", "1"), ("b", "2")]))
            .max_dimensions(1)
            .dimension_limit_policy(DimensionLimitPolicy::Reject)
            .build()
            .expect("valid configuration");

        let summary = reporter.report(&RegistrySnapshot::default().with_counter("req", 1));
        assert_eq!(1, summary.metrics_skipped);
        assert!(client.take().is_empty());
    }

    #[test_log::test]
    fn invalid_configurations_do_not_build() {
        let client = RecordingClient::default();
        assert!(matches!(
            CloudWatchReporter::builder("", client.clone()).build(),
            Err(ConfigError::EmptyNamespace)
        ));
        assert!(matches!(
            CloudWatchReporter::builder("test", client.clone())
                .max_dimensions(0)
                .build(),
            Err(ConfigError::ZeroDimensionLimit)
        ));
        assert!(matches!(
            CloudWatchReporter::builder("test", client.clone())
                .duration_unit(Unit::Bytes)
                .build(),
            Err(ConfigError::UnsupportedDurationUnit(Unit::Bytes))
        ));
        assert!(matches!(
            CloudWatchReporter::builder("test", client)
                .percentiles([1.5])
                .build(),
            Err(ConfigError::InvalidPercentile(_))
        ));
    }

    struct SlowIdentity;

    impl InstanceIdentity for SlowIdentity {
        fn fetch_instance_id(&self) -> BoxFuture<'static, Result<String, StdError>> {
            async {
                tokio::task::yield_now().await;
                Ok("i-0abc".to_string())
            }
            .boxed()
        }
    }

    #[test_log::test(tokio::test)]
    async fn instance_ids_start_unknown_then_resolve() {
        let client = RecordingClient::default();
        let mut reporter = CloudWatchReporter::builder("test", client.clone())
            .dimension_provider(InstanceIdDimension::resolved_by(SlowIdentity))
            .build()
            .expect("valid configuration");
        let snapshot = RegistrySnapshot::default().with_counter("req", 1);
        let instance_ids = |requests: Vec<PutMetricDataRequest>| -> Vec<String> {
            requests
                .iter()
                .flat_map(|request| request.metric_data.iter())
                .flat_map(|datum| datum.dimensions.iter())
                .map(|(name, dimension)| format!("{name}={dimension}"))
                .collect()
        };

        reporter.report(&snapshot);
        assert_eq!(vec!["InstanceId=unknown"], instance_ids(client.take()));

        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
        for _ in 0..2 {
            reporter.report(&snapshot);
            assert_eq!(vec!["InstanceId=i-0abc"], instance_ids(client.take()));
        }
    }

    #[test_log::test(tokio::test)]
    async fn report_forever_reports_every_period() {
        let (client, mut receiver) = ChannelClient::new(16);
        let reporter = CloudWatchReporter::builder("test", client)
            .build()
            .expect("valid configuration");
        let task = tokio::spawn(reporter.report_forever(
            || RegistrySnapshot::default().with_counter("ticks", 1),
            Duration::from_millis(5),
        ));

        for _ in 0..2 {
            let request = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
                .await
                .expect("a pass runs within the timeout")
                .expect("the reporter is still running");
            assert_eq!("test", request.namespace);
            assert_eq!("ticks", request.metric_data[0].name);
        }
        task.abort();
    }
}
