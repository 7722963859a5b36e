use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::logger::LogSink;
use crate::platform::{Platform, VitalsSource};
use crate::sampling::Sampler;
use crate::TransportFactory;

/// Where web vitals are posted by default.
pub const DEFAULT_WEB_VITALS_ENDPOINT: &str = "/api/web-vitals";
/// Where threshold alerts are posted by default.
pub const DEFAULT_ALERT_ENDPOINT: &str = "/api/alerts/performance";
/// Where RUM batches are posted by default.
pub const DEFAULT_RUM_ENDPOINT: &str = "/api/rum/track";
/// How many requests may wait for the transport before new ones are dropped.
pub const DEFAULT_QUEUE_SIZE: usize = 30;
/// The shortest flush or memory interval accepted.
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Per-metric alert thresholds.
///
/// A metric whose value is strictly greater than its threshold raises an
/// alert.  The defaults follow the "good" bands of the Core Web Vitals:
///
/// | metric | threshold |
/// |---|---|
/// | `LCP` | 2500 ms |
/// | `FID` | 100 ms |
/// | `INP` | 100 ms |
/// | `CLS` | 0.1 |
/// | `FCP` | 1800 ms |
/// | `TTFB` | 600 ms |
#[derive(Clone, Debug, PartialEq)]
pub struct Thresholds(BTreeMap<String, f64>);

impl Default for Thresholds {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        map.insert("LCP".to_owned(), 2500.0);
        map.insert("FID".to_owned(), 100.0);
        map.insert("INP".to_owned(), 100.0);
        map.insert("CLS".to_owned(), 0.1);
        map.insert("FCP".to_owned(), 1800.0);
        map.insert("TTFB".to_owned(), 600.0);
        Thresholds(map)
    }
}

impl Thresholds {
    /// Creates an empty threshold map, without the defaults.
    pub fn empty() -> Self {
        Thresholds(BTreeMap::new())
    }

    /// Returns the threshold for a metric.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Sets or replaces the threshold for a metric.
    pub fn set(&mut self, name: impl Into<String>, threshold: f64) {
        self.0.insert(name.into(), threshold);
    }

    /// Removes the threshold for a metric.
    pub fn remove(&mut self, name: &str) -> Option<f64> {
        self.0.remove(name)
    }

    /// Overlays `other` on top of these thresholds.
    #[must_use]
    pub fn merged(mut self, other: Thresholds) -> Self {
        self.0.extend(other.0);
        self
    }

    /// Iterates over all thresholds.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Configuration for the [`WebVitalsTracker`](crate::WebVitalsTracker).
#[derive(Clone, Debug, PartialEq)]
pub struct WebVitalsOptions {
    /// Where metrics are posted.
    pub api_endpoint: Cow<'static, str>,
    /// Where threshold alerts are posted.
    pub alert_endpoint: Cow<'static, str>,
    /// The probability that a tracker is active. (0.0 - 1.0, defaults to 1.0)
    pub sample_rate: f32,
    /// Prints every recorded metric when enabled.
    pub debug: bool,
    /// Alert thresholds, defaults merged with overrides.
    pub thresholds: Thresholds,
    /// Requests waiting for the transport beyond this are dropped and
    /// logged. (defaults to 30)
    pub queue_size: usize,
}

impl Default for WebVitalsOptions {
    fn default() -> Self {
        WebVitalsOptions {
            api_endpoint: Cow::Borrowed(DEFAULT_WEB_VITALS_ENDPOINT),
            alert_endpoint: Cow::Borrowed(DEFAULT_ALERT_ENDPOINT),
            sample_rate: 1.0,
            debug: false,
            thresholds: Thresholds::default(),
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

impl WebVitalsOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the metrics endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<Cow<'static, str>>) -> Self {
        self.api_endpoint = endpoint.into();
        self
    }

    /// Sets the alert endpoint.
    #[must_use]
    pub fn with_alert_endpoint(mut self, endpoint: impl Into<Cow<'static, str>>) -> Self {
        self.alert_endpoint = endpoint.into();
        self
    }

    /// Sets the sample rate.
    #[must_use]
    pub fn with_sample_rate(mut self, sample_rate: f32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Enables or disables debug output.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Overrides a single threshold, keeping the other defaults.
    #[must_use]
    pub fn with_threshold(mut self, name: impl Into<String>, threshold: f64) -> Self {
        self.thresholds.set(name, threshold);
        self
    }

    /// Overlays a set of thresholds over the current ones.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = self.thresholds.merged(thresholds);
        self
    }

    /// Sets the send queue bound.
    #[must_use]
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size.max(1);
        self
    }
}

/// Configuration for [`RealUserMonitoring`](crate::RealUserMonitoring).
#[derive(Clone, Debug, PartialEq)]
pub struct RumOptions {
    /// Where batches are posted.
    pub api_endpoint: Cow<'static, str>,
    /// The probability that a collector is active. (0.0 - 1.0, defaults to 1.0)
    pub sample_rate: f32,
    /// Prints every recorded metric when enabled.
    pub debug: bool,
    /// Flush as soon as this many metrics are buffered. (defaults to 20)
    pub batch_size: usize,
    /// How often the buffer is flushed. (defaults to 30 seconds)
    pub flush_interval: Duration,
    /// How often memory snapshots are taken. (defaults to 60 seconds)
    pub memory_interval: Duration,
    /// The most metrics held while sends fail or the host is offline.
    ///
    /// When full, the oldest metric is dropped. (defaults to 1000)
    pub max_buffer_size: usize,
    /// Scroll events closer together than this are ignored. (defaults to 100ms)
    pub scroll_throttle: Duration,
    /// Batches waiting for the transport beyond this are re-queued into the
    /// buffer. (defaults to 30)
    pub queue_size: usize,
}

impl Default for RumOptions {
    fn default() -> Self {
        RumOptions {
            api_endpoint: Cow::Borrowed(DEFAULT_RUM_ENDPOINT),
            sample_rate: 1.0,
            debug: false,
            batch_size: 20,
            flush_interval: Duration::from_secs(30),
            memory_interval: Duration::from_secs(60),
            max_buffer_size: 1000,
            scroll_throttle: Duration::from_millis(100),
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

impl RumOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the default options for a deployment environment.
    ///
    /// `development` samples every session, anything else one in ten.
    pub fn for_environment(environment: &str) -> Self {
        let sample_rate = if environment == "development" { 1.0 } else { 0.1 };
        Self::default().with_sample_rate(sample_rate)
    }

    /// Sets the batch endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<Cow<'static, str>>) -> Self {
        self.api_endpoint = endpoint.into();
        self
    }

    /// Sets the sample rate.
    #[must_use]
    pub fn with_sample_rate(mut self, sample_rate: f32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Enables or disables debug output.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sets the flush interval, at least [`MIN_INTERVAL`].
    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Sets the memory snapshot interval, at least [`MIN_INTERVAL`].
    #[must_use]
    pub fn with_memory_interval(mut self, interval: Duration) -> Self {
        self.memory_interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Sets the buffer bound.
    #[must_use]
    pub fn with_max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.max_buffer_size = max_buffer_size.max(1);
        self
    }

    /// Sets the send queue bound.
    #[must_use]
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size.max(1);
        self
    }
}

/// Configuration for a [`Beacon`](crate::Beacon).
///
/// # Examples
///
/// ```
/// let _options = beacon_core::BeaconOptions {
///     debug: true,
///     ..Default::default()
/// };
/// ```
#[derive(Clone)]
pub struct BeaconOptions {
    /// Base URL that relative endpoints are resolved against.
    pub base_url: Option<Cow<'static, str>>,
    /// The deployment environment, e.g. `development` or `production`.
    pub environment: Option<Cow<'static, str>>,
    /// Enables debug output for both collectors.
    pub debug: bool,
    /// Web vitals configuration.
    pub web_vitals: WebVitalsOptions,
    /// RUM configuration.
    ///
    /// When unset, [`RumOptions::for_environment`] is used.
    pub rum: Option<RumOptions>,
    /// Creates the transport.  Without one nothing is sent.
    pub transport: Option<Arc<dyn TransportFactory>>,
    /// The host the collectors read context and events from.
    pub platform: Option<Arc<dyn Platform>>,
    /// The web vitals library.
    pub vitals_source: Option<Arc<dyn VitalsSource>>,
    /// Where the logger facade writes.  Defaults to the `log` crate.
    pub log_sink: Option<Arc<dyn LogSink>>,
    /// The random source for sampling decisions.
    pub sampler: Option<Arc<dyn Sampler>>,
    /// An optional HTTP proxy to use.
    pub http_proxy: Option<Cow<'static, str>>,
    /// An optional HTTPS proxy to use.
    pub https_proxy: Option<Cow<'static, str>>,
    /// How long shutdown waits for pending sends.
    pub shutdown_timeout: Duration,
}

impl Default for BeaconOptions {
    fn default() -> Self {
        BeaconOptions {
            base_url: None,
            environment: None,
            debug: false,
            web_vitals: WebVitalsOptions::default(),
            rum: None,
            transport: None,
            platform: None,
            vitals_source: None,
            log_sink: None,
            sampler: None,
            http_proxy: None,
            https_proxy: None,
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

impl BeaconOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<Cow<'static, str>>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the environment.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<Cow<'static, str>>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Sets the web vitals options.
    #[must_use]
    pub fn with_web_vitals(mut self, options: WebVitalsOptions) -> Self {
        self.web_vitals = options;
        self
    }

    /// Sets the RUM options.
    #[must_use]
    pub fn with_rum(mut self, options: RumOptions) -> Self {
        self.rum = Some(options);
        self
    }

    /// Sets the transport factory.
    #[must_use]
    pub fn with_transport<F: TransportFactory + 'static>(mut self, factory: F) -> Self {
        self.transport = Some(Arc::new(factory));
        self
    }

    /// Sets the platform.
    #[must_use]
    pub fn with_platform(mut self, platform: Arc<dyn Platform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Sets the web vitals library.
    #[must_use]
    pub fn with_vitals_source(mut self, source: Arc<dyn VitalsSource>) -> Self {
        self.vitals_source = Some(source);
        self
    }

    /// Sets the log sink.
    #[must_use]
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Sets the sampler.
    #[must_use]
    pub fn with_sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }
}

impl From<&'static str> for BeaconOptions {
    fn from(base_url: &'static str) -> Self {
        BeaconOptions::new().with_base_url(base_url)
    }
}

impl From<String> for BeaconOptions {
    fn from(base_url: String) -> Self {
        BeaconOptions::new().with_base_url(base_url)
    }
}

impl fmt::Debug for BeaconOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[derive(Debug)]
        struct Opaque;
        f.debug_struct("BeaconOptions")
            .field("base_url", &self.base_url)
            .field("environment", &self.environment)
            .field("debug", &self.debug)
            .field("web_vitals", &self.web_vitals)
            .field("rum", &self.rum)
            .field("transport", &self.transport.as_ref().map(|_| Opaque))
            .field("has_platform", &self.platform.is_some())
            .field("has_vitals_source", &self.vitals_source.is_some())
            .field("has_log_sink", &self.log_sink.is_some())
            .field("has_sampler", &self.sampler.is_some())
            .field("http_proxy", &self.http_proxy)
            .field("https_proxy", &self.https_proxy)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}
