//! Real user monitoring.
//!
//! The collector listens to page load timing, resources, user interaction,
//! memory and network changes and buffers one [`Metric`] per observation.
//! The buffer is posted as a [`RumBatch`] when it reaches the batch size,
//! on a timer, when the host comes back online and when the page unloads.
//!
//! Batches are handed to a background sender, so recording a metric never
//! waits for the endpoint.  A failed post puts the whole batch back at the
//! front of the buffer, in its original order, ahead of whatever was
//! recorded in the meantime.  The buffer is bounded: once it holds
//! `max_buffer_size` metrics the oldest one is dropped for every new one.

use std::collections::VecDeque;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use crate::dispatch::{Dispatcher, DRAIN_TIMEOUT};
use crate::enrich::{enrich, RawMetric};
use crate::error::{parse_type_from_debug, render_error_chain, TransportError};
use crate::options::{RumOptions, MIN_INTERVAL};
use crate::pipeline::Pipeline;
use crate::platform::{
    DomEvent, ElementInfo, EntryType, EventKind, NavigationTiming, NetworkInformation,
    PerformanceEntry, ResourceTiming,
};
use crate::protocol::{Map, Metric, Payload, RumBatch, SessionInfo, Uuid, Value};
use crate::sampling::sample_should_send;
use crate::transport::Request;
use crate::utils::now_millis;

/// Resources slower than this are additionally reported as `slow_resource`.
const SLOW_RESOURCE_MS: f64 = 1000.0;

struct RumInner {
    options: RumOptions,
    pipeline: Pipeline,
    sampled: bool,
    active: bool,
    session_id: Uuid,
    user_id: RwLock<Option<String>>,
    buffer: Mutex<MetricBuffer>,
    online: AtomicBool,
    last_scroll: Mutex<Option<Instant>>,
    timer: Mutex<Option<TimerWorker>>,
    dispatcher: Option<Dispatcher>,
}

#[derive(Default)]
struct MetricBuffer {
    metrics: VecDeque<Metric>,
    /// How many metrics at the front were put back by failed sends.
    requeued: usize,
}

/// Collects real user monitoring metrics and posts them in batches.
///
/// This is a cheap handle; clones share the same buffer.  The collector is
/// torn down by [`destroy`](Self::destroy) or when the last handle is
/// dropped, which both post whatever is still buffered.
///
/// # Examples
///
/// ```
/// use beacon_core::platform::ManualPlatform;
/// use beacon_core::{NoopTransport, Pipeline, RealUserMonitoring, RumOptions};
/// use std::sync::Arc;
///
/// let platform = Arc::new(ManualPlatform::new("https://example.com/"));
/// let rum = RealUserMonitoring::new(
///     RumOptions::new().with_batch_size(3),
///     Pipeline::new(Arc::new(NoopTransport), platform),
/// );
///
/// rum.track_metric("search", 1.0, None);
/// rum.track_metric("search", 2.0, None);
/// assert_eq!(rum.get_metrics().len(), 2);
///
/// rum.track_metric("search", 3.0, None);
/// assert!(rum.get_metrics().is_empty());
/// ```
#[derive(Clone)]
pub struct RealUserMonitoring {
    inner: Arc<RumInner>,
}

impl RealUserMonitoring {
    /// Creates a collector and, if it is sampled, wires it to the platform.
    pub fn new(options: RumOptions, pipeline: Pipeline) -> Self {
        let sampled = sample_should_send(pipeline.sampler.as_ref(), options.sample_rate);
        let active = sampled && pipeline.platform.is_browser();
        let online = pipeline.platform.is_online();
        beacon_debug!(
            options.debug,
            "[RUM] session started (sampled: {}, active: {})",
            sampled,
            active
        );

        let inner = Arc::new_cyclic(|weak: &Weak<RumInner>| {
            let dispatcher = if active {
                Some(RumInner::start_dispatcher(&options, &pipeline, weak.clone()))
            } else {
                None
            };
            RumInner {
                options,
                pipeline,
                sampled,
                active,
                session_id: crate::random_uuid(),
                user_id: RwLock::new(None),
                buffer: Mutex::new(MetricBuffer::default()),
                online: AtomicBool::new(online),
                last_scroll: Mutex::new(None),
                timer: Mutex::new(None),
                dispatcher,
            }
        });
        if active {
            RumInner::initialize(&inner);
        }
        RealUserMonitoring { inner }
    }

    /// Enriches and buffers one metric.
    ///
    /// Reaching the batch size flushes immediately.
    pub fn track_metric(
        &self,
        name: &str,
        value: f64,
        metadata: impl Into<Option<Map<String, Value>>>,
    ) {
        self.inner.track_metric(name, value, metadata.into());
    }

    /// Takes the buffer and queues it as one batch.
    ///
    /// Does nothing if the buffer is empty, or if the host is offline and
    /// `force` is not set.  The batch is posted in the background; if that
    /// fails it is put back at the front of the buffer.
    pub fn flush(&self, force: bool) {
        self.inner.flush(force);
    }

    /// Waits until every queued batch was handed to the transport.
    ///
    /// Returns `false` if that did not happen within `timeout`.
    pub fn drain(&self, timeout: Duration) -> bool {
        self.inner.drain(timeout)
    }

    /// Records a connectivity change.
    ///
    /// Every online notification flushes the buffer.
    pub fn set_online(&self, online: bool) {
        self.inner.set_online(online);
    }

    /// Records an error as a `javascript_error` metric.
    ///
    /// The metadata carries the message, the rendered `source` chain as
    /// `stack` and the type name.
    pub fn track_error<E: Error + ?Sized>(
        &self,
        error: &E,
        metadata: impl Into<Option<Map<String, Value>>>,
    ) {
        let mut metadata = metadata.into().unwrap_or_default();
        metadata.insert("message".to_owned(), Value::from(error.to_string()));
        metadata.insert("stack".to_owned(), Value::from(render_error_chain(error)));
        metadata.insert("name".to_owned(), Value::from(parse_type_from_debug(error)));
        self.inner
            .track_metric("javascript_error", now_millis() as f64, Some(metadata));
    }

    /// Records a step of a user journey, e.g. `checkout:payment`.
    pub fn track_user_journey(
        &self,
        step: &str,
        metadata: impl Into<Option<Map<String, Value>>>,
    ) {
        let mut metadata = metadata.into().unwrap_or_default();
        metadata.insert("step".to_owned(), Value::from(step));
        self.inner
            .track_metric("user_journey", now_millis() as f64, Some(metadata));
    }

    /// Stops the timers and posts whatever is buffered, regardless of
    /// connectivity.
    ///
    /// Waits up to two seconds for the batch to go out.
    pub fn destroy(&self) {
        self.shutdown(DRAIN_TIMEOUT);
    }

    /// Like [`destroy`](Self::destroy), waiting at most `timeout`.
    ///
    /// Returns whether every batch was handed to the transport in time.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        self.inner.stop_timer();
        self.inner.flush(true);
        self.inner.drain(timeout)
    }

    /// Returns a copy of the buffered metrics.
    pub fn get_metrics(&self) -> Vec<Metric> {
        self.inner.lock_buffer().metrics.iter().cloned().collect()
    }

    /// Returns the session id of this collector.
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

    /// Whether this collector won the sampling decision.
    pub fn is_sampled(&self) -> bool {
        self.inner.sampled
    }

    /// Whether the collector currently considers the host online.
    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for RealUserMonitoring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealUserMonitoring")
            .field("session_id", &self.inner.session_id)
            .field("sampled", &self.inner.sampled)
            .field("online", &self.is_online())
            .field("buffered", &self.inner.lock_buffer().metrics.len())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl RumInner {
    fn start_dispatcher(
        options: &RumOptions,
        pipeline: &Pipeline,
        rum: Weak<RumInner>,
    ) -> Dispatcher {
        let logger = pipeline.logger.clone();
        Dispatcher::new(
            "rum",
            pipeline.transport.clone(),
            options.queue_size,
            move |request: &Request, err: TransportError| {
                let Payload::Batch(ref batch) = request.payload else {
                    return;
                };
                let mut context = Map::new();
                context.insert("endpoint".to_owned(), Value::from(&*request.endpoint));
                context.insert("error".to_owned(), Value::from(err.to_string()));
                context.insert("metrics".to_owned(), Value::from(batch.metrics.len()));
                match rum.upgrade() {
                    Some(rum) => {
                        logger.warn("Failed to send RUM batch, re-queueing", context);
                        rum.requeue(batch.metrics.clone());
                    }
                    None => logger.warn("Failed to send RUM batch, dropping", context),
                }
            },
        )
    }

    fn lock_buffer(&self) -> std::sync::MutexGuard<'_, MetricBuffer> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn user_id(&self) -> Option<String> {
        self.user_id.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn track_metric(&self, name: &str, value: f64, metadata: Option<Map<String, Value>>) {
        if !self.active {
            return;
        }
        let raw = RawMetric::new(name, value).with_metadata_map(metadata.unwrap_or_default());
        let metric = enrich(
            self.pipeline.platform.as_ref(),
            self.session_id,
            self.user_id(),
            raw,
        );
        beacon_debug!(self.options.debug, "[RUM] {}: {}", metric.name, metric.value);

        let should_flush = {
            let mut buffer = self.lock_buffer();
            if buffer.metrics.len() >= self.options.max_buffer_size {
                if let Some(dropped) = buffer.metrics.pop_front() {
                    buffer.requeued = buffer.requeued.saturating_sub(1);
                    beacon_debug!(
                        self.options.debug,
                        "[RUM] buffer full, dropping {}",
                        dropped.name
                    );
                }
            }
            buffer.metrics.push_back(metric);
            buffer.metrics.len() >= self.options.batch_size
        };
        if should_flush {
            self.flush(false);
        }
    }

    fn flush(&self, force: bool) {
        if !force && !self.online.load(Ordering::SeqCst) {
            return;
        }
        let metrics: Vec<Metric> = {
            let mut buffer = self.lock_buffer();
            if buffer.metrics.is_empty() {
                return;
            }
            buffer.requeued = 0;
            std::mem::take(&mut buffer.metrics).into()
        };
        let count = metrics.len();

        let batch = RumBatch {
            metrics,
            session: SessionInfo {
                session_id: self.session_id,
                user_id: self.user_id(),
                timestamp: SystemTime::now(),
            },
        };
        if let Some(ref dispatcher) = self.dispatcher {
            beacon_debug!(self.options.debug, "[RUM] flushing {} metrics", count);
            dispatcher.dispatch(Request::new(self.options.api_endpoint.clone(), batch));
        }
    }

    fn drain(&self, timeout: Duration) -> bool {
        match self.dispatcher {
            Some(ref dispatcher) => dispatcher.flush(timeout),
            None => true,
        }
    }

    /// Puts a failed batch back after the batches that failed before it.
    fn requeue(&self, failed: Vec<Metric>) {
        let mut buffer = self.lock_buffer();
        let at = buffer.requeued.min(buffer.metrics.len());
        let count = failed.len();
        let rest = buffer.metrics.split_off(at);
        buffer.metrics.extend(failed);
        buffer.metrics.extend(rest);
        buffer.requeued = at + count;

        let overflow = buffer.metrics.len().saturating_sub(self.options.max_buffer_size);
        if overflow > 0 {
            buffer.metrics.drain(..overflow);
            buffer.requeued = buffer.requeued.saturating_sub(overflow);
            beacon_debug!(
                self.options.debug,
                "[RUM] buffer full, dropped {} metrics",
                overflow
            );
        }
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        if online {
            self.flush(false);
        }
    }

    fn stop_timer(&self) {
        let timer = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(timer) = timer {
            timer.stop();
        }
    }

    fn initialize(this: &Arc<Self>) {
        let platform = this.pipeline.platform.clone();

        if platform.is_loaded() {
            this.track_page_load();
        } else {
            this.listen(EventKind::Load, |rum, _| rum.track_page_load());
        }

        this.observe(EntryType::Resource, |rum, entry| {
            if let PerformanceEntry::Resource(resource) = entry {
                rum.track_resource(resource);
            }
        });
        this.observe(EntryType::Navigation, |rum, entry| {
            if let PerformanceEntry::Navigation(nav) = entry {
                rum.track_navigation(nav);
            }
        });

        this.listen(EventKind::Click, |rum, event| {
            if let DomEvent::Click { target, x, y } = event {
                let mut metadata = element_metadata(target);
                metadata.insert("x".to_owned(), Value::from(*x));
                metadata.insert("y".to_owned(), Value::from(*y));
                rum.track_metric("user_click", now_millis() as f64, Some(metadata));
            }
        });
        this.listen(EventKind::Scroll, |rum, event| {
            if let DomEvent::Scroll {
                scroll_y,
                viewport_height,
                document_height,
            } = event
            {
                rum.track_scroll(*scroll_y, *viewport_height, *document_height);
            }
        });
        this.listen(EventKind::Submit, |rum, event| {
            if let DomEvent::Submit {
                form_id,
                action,
                method,
            } = event
            {
                let mut metadata = Map::new();
                metadata.insert("formId".to_owned(), Value::from(form_id.clone()));
                metadata.insert("action".to_owned(), Value::from(action.clone()));
                metadata.insert("method".to_owned(), Value::from(method.clone()));
                rum.track_metric("form_submit", now_millis() as f64, Some(metadata));
            }
        });
        this.listen(EventKind::FocusIn, |rum, event| {
            if let DomEvent::FocusIn { target } = event {
                rum.track_metric(
                    "element_focus",
                    now_millis() as f64,
                    Some(element_metadata(target)),
                );
            }
        });

        this.track_memory();

        if let Some(info) = platform.network_information() {
            this.track_network("network_info", &info);
        }
        this.listen(EventKind::ConnectionChange, |rum, event| {
            if let DomEvent::ConnectionChange(info) = event {
                rum.track_network("network_change", info);
            }
        });

        this.listen(EventKind::Online, |rum, _| rum.set_online(true));
        this.listen(EventKind::Offline, |rum, _| rum.set_online(false));
        this.listen(EventKind::BeforeUnload, |rum, _| {
            rum.track_metric("page_unload", now_millis() as f64, None);
            rum.flush(true);
        });

        let timer = TimerWorker::start(Arc::downgrade(this));
        *this.timer.lock().unwrap_or_else(|e| e.into_inner()) = timer;
    }

    fn listen<F>(self: &Arc<Self>, kind: EventKind, f: F)
    where
        F: Fn(&RumInner, &DomEvent) + Send + Sync + 'static,
    {
        let weak = Arc::downgrade(self);
        let rv = self.pipeline.platform.add_event_listener(
            kind,
            Arc::new(move |event: &DomEvent| {
                if let Some(rum) = weak.upgrade() {
                    f(&*rum, event);
                }
            }),
        );
        if let Err(err) = rv {
            beacon_debug!(self.options.debug, "[RUM] not listening to {:?}: {}", kind, err);
        }
    }

    fn observe<F>(self: &Arc<Self>, entry_type: EntryType, f: F)
    where
        F: Fn(&RumInner, &PerformanceEntry) + Send + Sync + 'static,
    {
        let weak = Arc::downgrade(self);
        let rv = self.pipeline.platform.observe(
            entry_type,
            Arc::new(move |entry: &PerformanceEntry| {
                if let Some(rum) = weak.upgrade() {
                    f(&*rum, entry);
                }
            }),
        );
        if let Err(err) = rv {
            beacon_debug!(
                self.options.debug,
                "[RUM] not observing {}: {}",
                entry_type.as_str(),
                err
            );
        }
    }

    fn track_page_load(&self) {
        let Some(nav) = self.pipeline.platform.navigation_timing() else {
            return;
        };
        let mut metadata = Map::new();
        metadata.insert("type".to_owned(), Value::from(nav.navigation_type.clone()));

        let timings = [
            ("dns_lookup", nav.domain_lookup_end - nav.domain_lookup_start),
            ("tcp_connection", nav.connect_end - nav.connect_start),
            ("server_response", nav.response_start - nav.request_start),
            ("dom_processing", nav.dom_content_loaded_event_end - nav.response_end),
            (
                "dom_content_loaded",
                nav.dom_content_loaded_event_end - nav.fetch_start,
            ),
            ("page_load", nav.load_event_end - nav.fetch_start),
        ];
        for (name, value) in timings {
            self.track_metric(name, value, Some(metadata.clone()));
        }
    }

    fn track_resource(&self, resource: &ResourceTiming) {
        let mut metadata = Map::new();
        metadata.insert("name".to_owned(), Value::from(resource.name.clone()));
        metadata.insert("type".to_owned(), Value::from(resource.initiator_type.clone()));

        if resource.duration > SLOW_RESOURCE_MS {
            self.track_metric("slow_resource", resource.duration, Some(metadata.clone()));
        }

        metadata.insert("dns".to_owned(), Value::from(resource.dns_time()));
        metadata.insert("connection".to_owned(), Value::from(resource.connection_time()));
        metadata.insert("request".to_owned(), Value::from(resource.request_time()));
        metadata.insert("size".to_owned(), Value::from(resource.transfer_size));
        self.track_metric("resource_timing", resource.duration, Some(metadata));
    }

    fn track_navigation(&self, nav: &NavigationTiming) {
        let mut metadata = Map::new();
        metadata.insert("type".to_owned(), Value::from(nav.navigation_type.clone()));
        metadata.insert("transferSize".to_owned(), Value::from(nav.transfer_size));
        self.track_metric("navigation", nav.duration, Some(metadata));
    }

    fn track_scroll(&self, scroll_y: f64, viewport_height: f64, document_height: f64) {
        {
            let mut last = self.last_scroll.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            if let Some(prev) = *last {
                if now.duration_since(prev) < self.options.scroll_throttle {
                    return;
                }
            }
            *last = Some(now);
        }
        let depth = if document_height > 0.0 {
            ((scroll_y + viewport_height) / document_height * 100.0)
                .round()
                .clamp(0.0, 100.0)
        } else {
            0.0
        };
        let mut metadata = Map::new();
        metadata.insert("scrollY".to_owned(), Value::from(scroll_y));
        self.track_metric("scroll_depth", depth, Some(metadata));
    }

    fn track_memory(&self) {
        let Some(memory) = self.pipeline.platform.memory_info() else {
            return;
        };
        let mut metadata = Map::new();
        metadata.insert("total".to_owned(), Value::from(memory.total_js_heap_size));
        metadata.insert("limit".to_owned(), Value::from(memory.js_heap_size_limit));
        self.track_metric(
            "memory_used",
            memory.used_js_heap_size as f64,
            Some(metadata),
        );
    }

    fn track_network(&self, name: &str, info: &NetworkInformation) {
        let mut metadata = Map::new();
        metadata.insert("effectiveType".to_owned(), Value::from(info.effective_type.clone()));
        metadata.insert("rtt".to_owned(), Value::from(info.rtt));
        metadata.insert("saveData".to_owned(), Value::from(info.save_data));
        self.track_metric(name, info.downlink, Some(metadata));
    }
}

impl Drop for RumInner {
    fn drop(&mut self) {
        self.stop_timer();
        if self.active {
            self.flush(true);
        }
    }
}

fn element_metadata(target: &ElementInfo) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("element".to_owned(), Value::from(target.tag_name.clone()));
    if let Some(ref id) = target.id {
        metadata.insert("id".to_owned(), Value::from(id.clone()));
    }
    if let Some(ref class_name) = target.class_name {
        metadata.insert("className".to_owned(), Value::from(class_name.clone()));
    }
    if let Some(ref input_type) = target.input_type {
        metadata.insert("type".to_owned(), Value::from(input_type.clone()));
    }
    metadata
}

/// Drives the flush and memory snapshot intervals.
struct TimerWorker {
    shutdown: Arc<(Mutex<bool>, Condvar)>,
    handle: JoinHandle<()>,
}

impl TimerWorker {
    fn start(rum: Weak<RumInner>) -> Option<Self> {
        let (flush_interval, memory_interval) = match rum.upgrade() {
            Some(rum) => (
                rum.options.flush_interval.max(MIN_INTERVAL),
                rum.options.memory_interval.max(MIN_INTERVAL),
            ),
            None => return None,
        };
        #[allow(clippy::mutex_atomic)]
        let shutdown = Arc::new((Mutex::new(false), Condvar::new()));
        let worker_shutdown = shutdown.clone();

        let handle = thread::Builder::new()
            .name("beacon-rum-timer".into())
            .spawn(move || {
                let (lock, cvar) = worker_shutdown.as_ref();
                let mut next_flush = Instant::now() + flush_interval;
                let mut next_memory = Instant::now() + memory_interval;
                loop {
                    let mut stopped = lock.lock().unwrap_or_else(|e| e.into_inner());
                    // check this immediately, in case the collector is already shutting down
                    if *stopped {
                        return;
                    }
                    let timeout = next_flush
                        .min(next_memory)
                        .saturating_duration_since(Instant::now());
                    stopped = match cvar.wait_timeout(stopped, timeout) {
                        Ok((guard, _)) => guard,
                        Err(err) => err.into_inner().0,
                    };
                    if *stopped {
                        return;
                    }
                    drop(stopped);

                    let Some(rum) = rum.upgrade() else {
                        return;
                    };
                    let now = Instant::now();
                    if now >= next_flush {
                        rum.flush(false);
                        next_flush = now + flush_interval;
                    }
                    if now >= next_memory {
                        rum.track_memory();
                        next_memory = now + memory_interval;
                    }
                }
            })
            .ok()?;

        Some(TimerWorker { shutdown, handle })
    }

    fn stop(self) {
        let (lock, cvar) = self.shutdown.as_ref();
        *lock.lock().unwrap_or_else(|e| e.into_inner()) = true;
        cvar.notify_one();
        // the last handle may be released on the timer thread itself
        if self.handle.thread().id() != thread::current().id() {
            self.handle.join().ok();
        }
    }
}
