//! An `InstanceId` dimension, fixed or discovered from the EC2 metadata service.
//!
//! Discovery happens off the reporting path: a fetch is spawned on the ambient tokio
//! runtime and its result is published through an [`ArcSwapOption`]. Until it
//! succeeds every datum is tagged `InstanceId=unknown`, and a failed fetch is only
//! retried once the cooldown has passed.

use std::{
    pin::pin,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use arc_swap::ArcSwapOption;
use bytes::BytesMut;
use futures::{future::BoxFuture, FutureExt};
use http_body::Body;
use hyper::{body::Incoming, Request, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::{
    dimensions::DimensionProvider,
    registry::{Metric, MetricFilter},
    types::{Dimension, DimensionPair, Name},
    StdError,
};

/// The dimension name
pub const INSTANCE_ID_DIMENSION: &str = "InstanceId";

/// The dimension value sent until an instance id is known
pub const UNKNOWN_INSTANCE_ID: &str = "unknown";

/// Where EC2 instances can look up their own id
pub const EC2_INSTANCE_ID_URI: &str = "http://169.254.169.254/latest/meta-data/instance-id";

const DEFAULT_RETRY_COOLDOWN: Duration = Duration::from_secs(60);
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(2);
const NEVER: u64 = u64::MAX;

/// A side channel that knows which instance this process runs on.
pub trait InstanceIdentity: Send + Sync + 'static {
    /// Look up the instance id. Runs on the tokio runtime, never on the reporting path.
    fn fetch_instance_id(&self) -> BoxFuture<'static, Result<String, StdError>>;
}

/// Reads the instance id from the EC2 instance metadata service over plain http.
#[derive(Clone)]
pub struct Ec2InstanceMetadata {
    client: Client<HttpConnector, String>,
    uri: Uri,
    timeout: Duration,
}

impl Default for Ec2InstanceMetadata {
    fn default() -> Self {
        Self::with_endpoint(Uri::from_static(EC2_INSTANCE_ID_URI))
    }
}

impl Ec2InstanceMetadata {
    /// Read the instance id from somewhere other than the well-known metadata address
    pub fn with_endpoint(uri: Uri) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
            uri,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Give up on a request after this long (default 2s)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl InstanceIdentity for Ec2InstanceMetadata {
    fn fetch_instance_id(&self) -> BoxFuture<'static, Result<String, StdError>> {
        fetch(self.client.clone(), self.uri.clone(), self.timeout).boxed()
    }
}

async fn fetch(
    client: Client<HttpConnector, String>,
    uri: Uri,
    timeout: Duration,
) -> Result<String, StdError> {
    let request = Request::get(uri).body(String::new())?;
    let response = tokio::time::timeout(timeout, client.request(request)).await??;
    if !response.status().is_success() {
        return Err(format!(
            "bad response code {} fetching instance id",
            response.status()
        )
        .into());
    }
    let body = tokio::time::timeout(timeout, read_body(response.into_body())).await??;
    let body = String::from_utf8(body.to_vec())?;
    match body.lines().next().map(str::trim) {
        Some(instance_id) if !instance_id.is_empty() => Ok(instance_id.to_string()),
        _ => Err("empty instance id".into()),
    }
}

async fn read_body(body: Incoming) -> Result<BytesMut, StdError> {
    let mut body = pin!(body);
    let mut collected = BytesMut::new();
    while let Some(frame) = std::future::poll_fn(|context| body.as_mut().poll_frame(context)).await
    {
        if let Ok(data) = frame?.into_data() {
            collected.extend_from_slice(&data);
        }
    }
    Ok(collected)
}

struct Resolution {
    instance_id: ArcSwapOption<String>,
    created: Instant,
    last_attempt_millis: AtomicU64,
    failed_before: AtomicBool,
    retry_cooldown: Duration,
}

impl Resolution {
    fn new(instance_id: Option<String>, retry_cooldown: Duration) -> Self {
        Self {
            instance_id: ArcSwapOption::new(instance_id.map(Arc::new)),
            created: Instant::now(),
            last_attempt_millis: AtomicU64::new(NEVER),
            failed_before: AtomicBool::new(false),
            retry_cooldown,
        }
    }

    /// Claim the right to attempt a fetch now. Only one caller wins per cooldown.
    fn claim_attempt(&self) -> bool {
        let now = self.created.elapsed().as_millis() as u64;
        let last = self.last_attempt_millis.load(Ordering::Acquire);
        if last != NEVER && now.saturating_sub(last) < self.retry_cooldown.as_millis() as u64 {
            return false;
        }
        self.last_attempt_millis
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    fn absorb(&self, fetched: Result<String, StdError>) {
        match fetched {
            Ok(instance_id) => {
                if self.failed_before.load(Ordering::Relaxed) {
                    log::warn!("Succeeded fetching instance id after failure; the instance id will be correct now");
                }
                log::debug!("resolved instance id {instance_id}");
                self.instance_id.store(Some(Arc::new(instance_id)));
            }
            Err(e) => {
                if !self.failed_before.swap(true, Ordering::Relaxed) {
                    log::warn!(
                        "Failed fetching instance id; will retry every {:?} until it succeeds. Metrics will be reported with the instance id '{UNKNOWN_INSTANCE_ID}' until then. If running outside EC2, configure a fixed instance id. {e}",
                        self.retry_cooldown
                    );
                }
            }
        }
    }
}

/// Tags datums with `InstanceId`.
///
/// Either fixed at construction, or resolved lazily from an [`InstanceIdentity`].
/// Once resolved the id is never fetched again.
pub struct InstanceIdDimension {
    predicate: Option<MetricFilter>,
    source: Option<Arc<dyn InstanceIdentity>>,
    resolution: Arc<Resolution>,
}

impl InstanceIdDimension {
    /// Always send this instance id
    pub fn fixed(instance_id: impl Into<String>) -> Self {
        Self {
            predicate: None,
            source: None,
            resolution: Arc::new(Resolution::new(
                Some(instance_id.into()),
                DEFAULT_RETRY_COOLDOWN,
            )),
        }
    }

    /// Discover the instance id from the EC2 metadata service
    pub fn ec2() -> Self {
        Self::resolved_by(Ec2InstanceMetadata::default())
    }

    /// Discover the instance id from some other source
    pub fn resolved_by(source: impl InstanceIdentity) -> Self {
        Self {
            predicate: None,
            source: Some(Arc::new(source)),
            resolution: Arc::new(Resolution::new(None, DEFAULT_RETRY_COOLDOWN)),
        }
    }

    /// Only tag component metrics the predicate matches. Process-level metrics are
    /// always tagged.
    pub fn matching(mut self, predicate: MetricFilter) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// How long to wait after a failed fetch before trying again (default 60s)
    pub fn retry_cooldown(mut self, retry_cooldown: Duration) -> Self {
        let instance_id = self.resolution.instance_id.load_full();
        self.resolution = Arc::new(Resolution::new(
            instance_id.map(|id| id.as_ref().clone()),
            retry_cooldown,
        ));
        self
    }

    /// The instance id, if it is known yet
    pub fn instance_id(&self) -> Option<Arc<String>> {
        self.resolution.instance_id.load_full()
    }

    fn maybe_fetch(&self) {
        let Some(source) = &self.source else {
            return;
        };
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                log::debug!("no tokio runtime to fetch the instance id on");
                return;
            }
        };
        // Only a fetch that is actually spawned starts the cooldown.
        if !self.resolution.claim_attempt() {
            return;
        }
        let resolution = self.resolution.clone();
        let fetch = source.fetch_instance_id();
        runtime.spawn(async move { resolution.absorb(fetch.await) });
    }
}

impl DimensionProvider for InstanceIdDimension {
    fn generate(&self, name: &str, metric: Metric<'_>) -> Vec<DimensionPair> {
        match &self.predicate {
            Some(predicate) if !predicate(name, metric) => Vec::new(),
            _ => self.generate_for_process_metrics(),
        }
    }

    fn generate_for_process_metrics(&self) -> Vec<DimensionPair> {
        let value = match self.instance_id() {
            Some(instance_id) => Dimension::Shared(instance_id),
            None => {
                self.maybe_fetch();
                Dimension::Str(UNKNOWN_INSTANCE_ID)
            }
        };
        vec![(Name::Str(INSTANCE_ID_DIMENSION), value)]
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use futures::{future::BoxFuture, FutureExt};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::{Ec2InstanceMetadata, InstanceIdDimension, InstanceIdentity};
    use crate::{
        dimensions::DimensionProvider,
        registry::{CounterSnapshot, Metric},
        types::{Dimension, Name},
        StdError,
    };

    struct CountingIdentity {
        fetches: Arc<AtomicUsize>,
        instance_id: Option<&'static str>,
    }

    impl CountingIdentity {
        fn new(instance_id: Option<&'static str>) -> (Self, Arc<AtomicUsize>) {
            let fetches = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    fetches: fetches.clone(),
                    instance_id,
                },
                fetches,
            )
        }
    }

    impl InstanceIdentity for CountingIdentity {
        fn fetch_instance_id(&self) -> BoxFuture<'static, Result<String, StdError>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let result = self
                .instance_id
                .map(str::to_string)
                .ok_or_else(|| StdError::from("metadata service unavailable"));
            futures::future::ready(result).boxed()
        }
    }

    fn instance_id_of(provider: &InstanceIdDimension) -> String {
        let dimensions = provider.generate_for_process_metrics();
        assert_eq!(1, dimensions.len());
        assert_eq!(Name::from("InstanceId"), dimensions[0].0);
        dimensions[0].1.to_string()
    }

    async fn let_fetches_run() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[test_log::test]
    fn fixed_instance_id() {
        let provider = InstanceIdDimension::fixed("i-fixed");
        assert_eq!("i-fixed", instance_id_of(&provider));
        assert_eq!(
            vec![(Name::from("InstanceId"), Dimension::Shared(Arc::new("i-fixed".to_string())))],
            provider.generate("req", Metric::Counter(&CounterSnapshot { count: 0 }))
        );
    }

    #[test_log::test]
    fn unknown_without_a_runtime() {
        let (identity, fetches) = CountingIdentity::new(Some("i-123"));
        let provider = InstanceIdDimension::resolved_by(identity);
        assert_eq!("unknown", instance_id_of(&provider));
        assert_eq!(0, fetches.load(Ordering::SeqCst));
    }

    #[test_log::test]
    fn passes_outside_a_runtime_do_not_start_the_cooldown() {
        let (identity, fetches) = CountingIdentity::new(Some("i-123"));
        let provider = InstanceIdDimension::resolved_by(identity);
        assert_eq!("unknown", instance_id_of(&provider));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("can build a runtime");
        runtime.block_on(async {
            assert_eq!("unknown", instance_id_of(&provider));
            let_fetches_run().await;
        });
        assert_eq!("i-123", instance_id_of(&provider));
        assert_eq!(1, fetches.load(Ordering::SeqCst));
    }

    #[test_log::test(tokio::test)]
    async fn resolves_once_then_stops_fetching() {
        let (identity, fetches) = CountingIdentity::new(Some("i-123"));
        let provider = InstanceIdDimension::resolved_by(identity).retry_cooldown(Duration::ZERO);

        assert_eq!("unknown", instance_id_of(&provider));
        let_fetches_run().await;

        for _ in 0..3 {
            assert_eq!("i-123", instance_id_of(&provider));
        }
        assert_eq!(1, fetches.load(Ordering::SeqCst));
    }

    #[test_log::test(tokio::test)]
    async fn failures_retry_after_the_cooldown() {
        let (identity, fetches) = CountingIdentity::new(None);
        let provider = InstanceIdDimension::resolved_by(identity).retry_cooldown(Duration::ZERO);

        assert_eq!("unknown", instance_id_of(&provider));
        let_fetches_run().await;
        assert_eq!("unknown", instance_id_of(&provider));
        let_fetches_run().await;
        assert_eq!(2, fetches.load(Ordering::SeqCst));
        assert_eq!(None, provider.instance_id());
    }

    #[test_log::test(tokio::test)]
    async fn failures_wait_out_the_cooldown() {
        let (identity, fetches) = CountingIdentity::new(None);
        let provider = InstanceIdDimension::resolved_by(identity);

        for _ in 0..3 {
            assert_eq!("unknown", instance_id_of(&provider));
            let_fetches_run().await;
        }
        assert_eq!(1, fetches.load(Ordering::SeqCst));
    }

    #[test_log::test(tokio::test)]
    async fn predicates_do_not_hide_process_dimensions() {
        let provider = InstanceIdDimension::fixed("i-fixed")
            .matching(Arc::new(|name: &str, _metric: Metric<'_>| name.starts_with("jvm.")));
        let counter = CounterSnapshot { count: 1 };
        assert!(provider.generate("req", Metric::Counter(&counter)).is_empty());
        assert_eq!(1, provider.generate("jvm.threads", Metric::Counter(&counter)).len());
        assert_eq!("i-fixed", instance_id_of(&provider));
    }

    async fn serve_once(response: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("can bind a local port");
        let address = listener.local_addr().expect("bound socket has an address");
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("client connects");
            let mut request = vec![0; 4096];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(response)
                .await
                .expect("can write the response");
        });
        format!("http://{address}/latest/meta-data/instance-id")
    }

    #[test_log::test(tokio::test)]
    async fn ec2_metadata_reads_the_instance_id() {
        let endpoint = serve_once(
            b"HTTP/1.1 200 OK\r\ncontent-length: 11\r\nconnection: close\r\n\r\ni-0abc1234\n",
        )
        .await;
        let metadata =
            Ec2InstanceMetadata::with_endpoint(endpoint.parse().expect("valid uri"));
        assert_eq!(
            "i-0abc1234",
            metadata
                .fetch_instance_id()
                .await
                .expect("metadata is served")
        );
    }

    #[test_log::test(tokio::test)]
    async fn ec2_metadata_rejects_bad_status() {
        let endpoint = serve_once(
            b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;
        let metadata = Ec2InstanceMetadata::with_endpoint(endpoint.parse().expect("valid uri"))
            .timeout(Duration::from_secs(5));
        assert!(metadata.fetch_instance_id().await.is_err());
    }
}
