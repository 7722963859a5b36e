//! Core Web Vitals tracking.
//!
//! Every metric the tracker sees is enriched, kept in an append-only
//! history and posted on its own.  Metrics above their configured threshold
//! additionally raise a [`PerformanceAlert`].  Sends are fire-and-forget: a
//! failed send is reported to the logger and the metric is gone.

use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, Instant, SystemTime};

use crate::dispatch::Dispatcher;
use crate::enrich::{enrich, RawMetric};
use crate::error::TransportError;
use crate::options::WebVitalsOptions;
use crate::pipeline::Pipeline;
use crate::platform::{DomEvent, EntryType, EventKind, PerformanceEntry, Vital, VitalsSource};
use crate::protocol::{AlertType, Map, Metric, Payload, PerformanceAlert, Uuid, Value};
use crate::sampling::sample_should_send;
use crate::transport::Request;
use crate::utils::{elapsed_millis, now_millis};

/// Resources slower than this are reported as `SlowResource`.
const SLOW_RESOURCE_MS: f64 = 1000.0;

struct TrackerInner {
    options: WebVitalsOptions,
    pipeline: Pipeline,
    sampled: bool,
    session_id: Uuid,
    user_id: RwLock<Option<String>>,
    history: Mutex<Vec<Metric>>,
    dispatcher: Option<Dispatcher>,
    created: Instant,
}

/// Tracks Core Web Vitals and performance entries.
///
/// This is a cheap handle; clones share the same session and history.
///
/// # Examples
///
/// ```
/// use beacon_core::platform::ManualPlatform;
/// use beacon_core::{NoopTransport, Pipeline, WebVitalsOptions, WebVitalsTracker};
/// use std::sync::Arc;
///
/// let platform = Arc::new(ManualPlatform::new("https://example.com/"));
/// let tracker = WebVitalsTracker::new(
///     WebVitalsOptions::default(),
///     Pipeline::new(Arc::new(NoopTransport), platform),
/// );
///
/// tracker.track_custom_metric("search_latency", 42.0);
/// assert_eq!(tracker.get_metrics()[0].name, "search_latency");
/// ```
#[derive(Clone)]
pub struct WebVitalsTracker {
    inner: Arc<TrackerInner>,
}

impl WebVitalsTracker {
    /// Creates a tracker.
    ///
    /// The sampling decision is made here, once.  A tracker that is not
    /// sampled ignores everything it is given.
    pub fn new(options: WebVitalsOptions, pipeline: Pipeline) -> Self {
        let sampled = sample_should_send(pipeline.sampler.as_ref(), options.sample_rate);
        let dispatcher = if sampled {
            let logger = pipeline.logger.clone();
            Some(Dispatcher::new(
                "web-vitals",
                pipeline.transport.clone(),
                options.queue_size,
                move |request: &Request, err: TransportError| {
                    let message = match request.payload {
                        Payload::Alert(_) => "Failed to send performance alert",
                        _ => "Failed to send web vital",
                    };
                    let mut context = Map::new();
                    context.insert("endpoint".to_owned(), Value::from(&*request.endpoint));
                    context.insert("error".to_owned(), Value::from(err.to_string()));
                    logger.error(message, context);
                },
            ))
        } else {
            None
        };
        beacon_debug!(
            options.debug,
            "[WebVitals] session started (sampled: {})",
            sampled
        );

        WebVitalsTracker {
            inner: Arc::new(TrackerInner {
                options,
                pipeline,
                sampled,
                session_id: crate::random_uuid(),
                user_id: RwLock::new(None),
                history: Mutex::new(Vec::new()),
                dispatcher,
                created: Instant::now(),
            }),
        }
    }

    fn from_weak(weak: &Weak<TrackerInner>) -> Option<Self> {
        weak.upgrade().map(|inner| WebVitalsTracker { inner })
    }

    fn active(&self) -> bool {
        self.inner.sampled && self.inner.pipeline.platform.is_browser()
    }

    /// Loads the vitals library and subscribes to every vital.
    ///
    /// A load failure is logged and nothing is subscribed.
    pub fn install(&self, source: &dyn VitalsSource) {
        if !self.active() {
            return;
        }
        if let Err(err) = source.load() {
            let mut context = Map::new();
            context.insert("error".to_owned(), Value::from(err.to_string()));
            self.inner
                .pipeline
                .logger
                .error("Failed to load web vitals library", context);
            return;
        }
        for vital in Vital::ALL {
            let weak = Arc::downgrade(&self.inner);
            source.subscribe(
                vital,
                Arc::new(move |raw: RawMetric| {
                    if let Some(tracker) = WebVitalsTracker::from_weak(&weak) {
                        tracker.handle_metric(raw);
                    }
                }),
            );
        }
    }

    /// Enriches a metric, records it, checks it and sends it.
    pub fn handle_metric(&self, raw: RawMetric) {
        if !self.active() {
            return;
        }
        let metric = enrich(
            self.inner.pipeline.platform.as_ref(),
            self.inner.session_id,
            self.user_id(),
            raw,
        );
        self.inner
            .history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(metric.clone());

        self.check_thresholds(&metric);
        beacon_debug!(
            self.inner.options.debug,
            "[WebVitals] {}: {}",
            metric.name,
            metric.value
        );
        self.send_metric(metric);
    }

    /// Raises an alert if the metric is above its threshold.
    ///
    /// Returns whether an alert was sent.
    pub fn check_thresholds(&self, metric: &Metric) -> bool {
        match self.inner.options.thresholds.get(&metric.name) {
            Some(threshold) if metric.value > threshold => {
                self.send_performance_alert(metric, threshold);
                true
            }
            _ => false,
        }
    }

    /// Posts a threshold alert for `metric` to the alert endpoint.
    pub fn send_performance_alert(&self, metric: &Metric, threshold: f64) {
        let alert = PerformanceAlert {
            ty: AlertType::WebVitalThreshold,
            metric: metric.name.clone(),
            value: metric.value,
            threshold,
            url: metric.context.url.clone(),
            session_id: self.inner.session_id,
            user_id: metric.context.user_id.clone(),
            timestamp: SystemTime::now(),
        };
        self.dispatch(Request::new(self.inner.options.alert_endpoint.clone(), alert));
    }

    /// Posts one metric to the metrics endpoint.
    pub fn send_metric(&self, metric: Metric) {
        self.dispatch(Request::new(self.inner.options.api_endpoint.clone(), metric));
    }

    fn dispatch(&self, request: Request) {
        if let Some(ref dispatcher) = self.inner.dispatcher {
            dispatcher.dispatch(request);
        }
    }

    /// Tracks an application-defined metric with a delta of zero.
    pub fn track_custom_metric(&self, name: &str, value: f64) {
        self.track_custom_metric_with_delta(name, value, 0.0);
    }

    /// Tracks an application-defined metric.
    ///
    /// The metric id is `"{name}-{timestamp}"`.
    pub fn track_custom_metric_with_delta(&self, name: &str, value: f64, delta: f64) {
        let raw = RawMetric::new(name, value)
            .with_delta(delta)
            .with_id(format!("{}-{}", name, now_millis()));
        self.handle_metric(raw);
    }

    /// Turns navigation, resource and long task entries into metrics.
    ///
    /// Entry types the platform cannot observe are skipped.
    pub fn observe_performance(&self) {
        if !self.active() {
            return;
        }
        for entry_type in [EntryType::Navigation, EntryType::Resource, EntryType::LongTask] {
            let weak = Arc::downgrade(&self.inner);
            let rv = self.inner.pipeline.platform.observe(
                entry_type,
                Arc::new(move |entry: &PerformanceEntry| {
                    if let Some(tracker) = WebVitalsTracker::from_weak(&weak) {
                        tracker.handle_entry(entry);
                    }
                }),
            );
            if let Err(err) = rv {
                beacon_debug!(
                    self.inner.options.debug,
                    "[WebVitals] not observing {}: {}",
                    entry_type.as_str(),
                    err
                );
            }
        }
    }

    fn handle_entry(&self, entry: &PerformanceEntry) {
        match entry {
            PerformanceEntry::Navigation(nav) => {
                self.track_custom_metric(
                    "DOMContentLoaded",
                    nav.dom_content_loaded_event_end - nav.fetch_start,
                );
                self.track_custom_metric("LoadComplete", nav.load_event_end - nav.fetch_start);
            }
            PerformanceEntry::Resource(resource) => {
                if resource.duration > SLOW_RESOURCE_MS {
                    self.track_custom_metric("SlowResource", resource.duration);
                }
            }
            PerformanceEntry::LongTask(task) => {
                self.track_custom_metric("LongTask", task.duration);
            }
        }
    }

    /// Records when the page is hidden or unloaded.
    ///
    /// `PageHidden` and `PageUnload` carry the time since the tracker was
    /// created.
    pub fn track_page_lifecycle(&self) {
        if !self.active() {
            return;
        }
        for kind in [EventKind::VisibilityChange, EventKind::BeforeUnload] {
            let weak = Arc::downgrade(&self.inner);
            let rv = self.inner.pipeline.platform.add_event_listener(
                kind,
                Arc::new(move |event: &DomEvent| {
                    let Some(tracker) = WebVitalsTracker::from_weak(&weak) else {
                        return;
                    };
                    let name = match event {
                        DomEvent::VisibilityChange { hidden: true } => "PageHidden",
                        DomEvent::BeforeUnload => "PageUnload",
                        _ => return,
                    };
                    tracker.track_custom_metric(name, elapsed_millis(tracker.inner.created));
                }),
            );
            if let Err(err) = rv {
                beacon_debug!(
                    self.inner.options.debug,
                    "[WebVitals] no page lifecycle tracking: {}",
                    err
                );
            }
        }
    }

    /// Returns every metric recorded so far.
    pub fn get_metrics(&self) -> Vec<Metric> {
        self.inner
            .history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Returns the session id of this tracker.
    pub fn get_session_id(&self) -> Uuid {
        self.inner.session_id
    }

    /// Sets the user id attached to metrics created from now on.
    pub fn set_user_id(&self, user_id: impl Into<String>) {
        *self.inner.user_id.write().unwrap_or_else(|e| e.into_inner()) = Some(user_id.into());
    }

    /// Stops attaching a user id.
    pub fn clear_user_id(&self) {
        *self.inner.user_id.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn user_id(&self) -> Option<String> {
        self.inner
            .user_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Whether this tracker won the sampling decision.
    pub fn is_sampled(&self) -> bool {
        self.inner.sampled
    }

    /// Waits for queued sends to be handed to the transport.
    ///
    /// Returns `false` if that did not happen within `timeout`.
    pub fn flush(&self, timeout: Duration) -> bool {
        match self.inner.dispatcher {
            Some(ref dispatcher) => dispatcher.flush(timeout),
            None => true,
        }
    }
}

impl std::fmt::Debug for WebVitalsTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebVitalsTracker")
            .field("session_id", &self.inner.session_id)
            .field("sampled", &self.inner.sampled)
            .field("options", &self.inner.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{LongTaskTiming, ManualPlatform, NavigationTiming, ResourceTiming};
    use crate::test::{FixedSampler, TestSink, TestTransport, TestVitalsSource};

    const WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        transport: Arc<TestTransport>,
        platform: Arc<ManualPlatform>,
        sink: Arc<TestSink>,
        tracker: WebVitalsTracker,
    }

    fn harness(options: WebVitalsOptions) -> Harness {
        let transport = TestTransport::new();
        let platform = Arc::new(ManualPlatform::new("https://example.com/anime"));
        let sink = TestSink::new();
        let pipeline = Pipeline::new(transport.clone(), platform.clone())
            .with_logger(crate::Logger::new(sink.clone()));
        let tracker = WebVitalsTracker::new(options, pipeline);
        Harness {
            transport,
            platform,
            sink,
            tracker,
        }
    }

    fn sent(h: &Harness) -> Vec<Request> {
        assert!(h.tracker.flush(WAIT));
        h.transport.fetch_and_clear_requests()
    }

    #[test]
    fn test_breach_sends_one_alert() {
        let h = harness(WebVitalsOptions::default());
        h.tracker.handle_metric(RawMetric::new("LCP", 3000.0));

        let requests = sent(&h);
        assert_eq!(requests.len(), 2);
        let alerts: Vec<_> = requests
            .iter()
            .filter(|r| r.endpoint == "/api/alerts/performance")
            .collect();
        assert_eq!(alerts.len(), 1);
        match alerts[0].payload {
            Payload::Alert(ref alert) => {
                assert_eq!(alert.metric, "LCP");
                assert_eq!(alert.value, 3000.0);
                assert_eq!(alert.threshold, 2500.0);
                assert_eq!(alert.session_id, h.tracker.get_session_id());
            }
            ref other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_good_value_sends_no_alert() {
        let h = harness(WebVitalsOptions::default());
        h.tracker.handle_metric(RawMetric::new("LCP", 2000.0));
        h.tracker.handle_metric(RawMetric::new("LCP", 2500.0));

        let requests = sent(&h);
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.endpoint == "/api/web-vitals"));
    }

    #[test]
    fn test_repeated_breaches_are_not_deduplicated() {
        let h = harness(WebVitalsOptions::default());
        for _ in 0..3 {
            h.tracker.handle_metric(RawMetric::new("CLS", 0.25));
        }
        let alerts = sent(&h)
            .into_iter()
            .filter(|r| matches!(r.payload, Payload::Alert(_)))
            .count();
        assert_eq!(alerts, 3);
    }

    #[test]
    fn test_custom_metric_reaches_transport_unchanged() {
        let h = harness(WebVitalsOptions::default());
        h.tracker.track_custom_metric("foo", 42.0);

        let requests = sent(&h);
        assert_eq!(requests.len(), 1);
        let metric = &requests[0].payload.metrics()[0];
        assert_eq!(metric.name, "foo");
        assert_eq!(metric.value, 42.0);
        assert_eq!(metric.delta, Some(0.0));
        assert!(metric.id.as_deref().unwrap().starts_with("foo-"));
        assert_eq!(metric.context.url, "https://example.com/anime");
    }

    #[test]
    fn test_user_id_is_not_retroactive() {
        let h = harness(WebVitalsOptions::default());
        h.tracker.track_custom_metric("before", 1.0);
        h.tracker.set_user_id("user-7");
        h.tracker.track_custom_metric("after", 2.0);

        let history = h.tracker.get_metrics();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].context.user_id, None);
        assert_eq!(history[1].context.user_id.as_deref(), Some("user-7"));
        assert!(history
            .iter()
            .all(|m| m.context.session_id == h.tracker.get_session_id()));
    }

    #[test]
    fn test_unsampled_tracker_is_inert() {
        let transport = TestTransport::new();
        let platform = Arc::new(ManualPlatform::new("https://example.com/"));
        let source = TestVitalsSource::new();
        let pipeline = Pipeline::new(transport.clone(), platform.clone())
            .with_sampler(Arc::new(FixedSampler::new(0.99)));
        let tracker = WebVitalsTracker::new(WebVitalsOptions::new().with_sample_rate(0.5), pipeline);

        assert!(!tracker.is_sampled());
        tracker.install(source.as_ref());
        tracker.observe_performance();
        tracker.track_page_lifecycle();
        tracker.track_custom_metric("foo", 1.0);

        assert_eq!(source.subscription_count(), 0);
        assert_eq!(platform.observer_count(), 0);
        assert_eq!(platform.listener_count(), 0);
        assert!(tracker.flush(WAIT));
        assert!(transport.fetch_and_clear_requests().is_empty());
        assert!(tracker.get_metrics().is_empty());
    }

    #[test]
    fn test_headless_platform_is_a_noop() {
        let transport = TestTransport::new();
        let platform = Arc::new(ManualPlatform::new("").headless());
        let tracker = WebVitalsTracker::new(
            WebVitalsOptions::default(),
            Pipeline::new(transport.clone(), platform),
        );
        tracker.track_custom_metric("foo", 1.0);
        assert!(tracker.flush(WAIT));
        assert!(transport.fetch_and_clear_requests().is_empty());
    }

    #[test]
    fn test_install_subscribes_every_vital() {
        let h = harness(WebVitalsOptions::default());
        let source = TestVitalsSource::new();
        h.tracker.install(source.as_ref());
        assert_eq!(source.subscription_count(), Vital::ALL.len());

        source.emit(Vital::Ttfb, RawMetric::new("TTFB", 120.0).with_delta(120.0));
        let requests = sent(&h);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].payload.metrics()[0].name, "TTFB");
    }

    #[test]
    fn test_load_failure_is_logged() {
        let h = harness(WebVitalsOptions::default());
        let source = TestVitalsSource::failing();
        h.tracker.install(source.as_ref());

        assert_eq!(source.subscription_count(), 0);
        let logs = h.sink.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].body, "Failed to load web vitals library");
    }

    #[test]
    fn test_send_failure_is_logged_and_dropped() {
        let h = harness(WebVitalsOptions::default());
        h.transport.set_failing(true);
        h.tracker.track_custom_metric("foo", 1.0);

        assert_eq!(sent(&h).len(), 1);
        let logs = h.sink.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].body, "Failed to send web vital");
        assert_eq!(logs[0].attributes["endpoint"], "/api/web-vitals");
    }

    #[test]
    fn test_dropping_the_tracker_delivers_queued_metrics() {
        let h = harness(WebVitalsOptions::default());
        h.transport
            .on_send(|_| std::thread::sleep(Duration::from_millis(20)));
        for idx in 0..5 {
            h.tracker.track_custom_metric("tick", idx as f64);
        }
        let Harness {
            transport, tracker, ..
        } = h;
        drop(tracker);

        let values: Vec<f64> = transport
            .fetch_and_clear_requests()
            .iter()
            .map(|r| r.payload.metrics()[0].value)
            .collect();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_full_queue_is_logged() {
        let h = harness(WebVitalsOptions::new().with_queue_size(1));
        let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
        let gate_rx = Mutex::new(gate_rx);
        h.transport.on_send(move |_| {
            gate_rx.lock().unwrap().recv().ok();
        });

        h.tracker.track_custom_metric("first", 1.0);
        let deadline = Instant::now() + WAIT;
        while h.transport.request_count() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        h.tracker.track_custom_metric("second", 2.0);
        h.tracker.track_custom_metric("third", 3.0);

        let logs = h.sink.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].body, "Failed to send web vital");
        assert_eq!(logs[0].attributes["error"], "send queue is full");

        drop(gate_tx);
        h.transport.clear_on_send();
        assert_eq!(sent(&h).len(), 2);
    }

    #[test]
    fn test_performance_entries() {
        let h = harness(WebVitalsOptions::default());
        h.tracker.observe_performance();
        assert_eq!(h.platform.observer_count(), 3);

        h.platform.record(&PerformanceEntry::Navigation(NavigationTiming {
            fetch_start: 10.0,
            dom_content_loaded_event_end: 610.0,
            load_event_end: 1210.0,
            ..Default::default()
        }));
        h.platform.record(&PerformanceEntry::Resource(ResourceTiming {
            name: "https://cdn.example.com/app.js".into(),
            duration: 400.0,
            ..Default::default()
        }));
        h.platform.record(&PerformanceEntry::Resource(ResourceTiming {
            name: "https://cdn.example.com/hero.png".into(),
            duration: 1500.0,
            ..Default::default()
        }));
        h.platform.record(&PerformanceEntry::LongTask(LongTaskTiming {
            duration: 80.0,
            ..Default::default()
        }));

        let names: Vec<_> = h
            .tracker
            .get_metrics()
            .into_iter()
            .map(|m| (m.name, m.value))
            .collect();
        assert_eq!(
            names,
            vec![
                ("DOMContentLoaded".to_owned(), 600.0),
                ("LoadComplete".to_owned(), 1200.0),
                ("SlowResource".to_owned(), 1500.0),
                ("LongTask".to_owned(), 80.0),
            ]
        );
    }

    #[test]
    fn test_missing_observer_is_skipped() {
        let transport = TestTransport::new();
        let platform =
            Arc::new(ManualPlatform::new("https://example.com/").without_performance_observer());
        let tracker = WebVitalsTracker::new(
            WebVitalsOptions::default(),
            Pipeline::new(transport, platform.clone()),
        );
        tracker.observe_performance();
        assert_eq!(platform.observer_count(), 0);
    }

    #[test]
    fn test_page_lifecycle() {
        let h = harness(WebVitalsOptions::default());
        h.tracker.track_page_lifecycle();
        h.platform
            .dispatch(&DomEvent::VisibilityChange { hidden: false });
        h.platform
            .dispatch(&DomEvent::VisibilityChange { hidden: true });
        h.platform.dispatch(&DomEvent::BeforeUnload);

        let names: Vec<_> = h.tracker.get_metrics().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["PageHidden", "PageUnload"]);
    }
}
