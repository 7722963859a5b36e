//! The host abstraction.
//!
//! Collectors never talk to a browser directly.  Everything they read (page
//! URL, viewport, network information, memory) and every event they react
//! to (performance entries, DOM events, connectivity changes) comes through
//! the [`Platform`] trait.  A wasm bridge, a webview shell or a test harness
//! implements it; [`ManualPlatform`] is a ready-made implementation that is
//! fed by calling [`ManualPlatform::dispatch`] and [`ManualPlatform::record`].
//!
//! Missing capabilities are reported as [`PlatformError::Unsupported`] and
//! the collectors skip the corresponding signal.

use std::sync::{Arc, Mutex, RwLock};

use crate::enrich::RawMetric;
use crate::error::PlatformError;
use crate::protocol::{ConnectionType, Viewport};

/// Receives performance entries from an observer.
pub type EntryCallback = Arc<dyn Fn(&PerformanceEntry) + Send + Sync>;
/// Receives DOM and window events.
pub type EventCallback = Arc<dyn Fn(&DomEvent) + Send + Sync>;
/// Receives metrics from a [`VitalsSource`].
pub type VitalCallback = Arc<dyn Fn(RawMetric) + Send + Sync>;

/// A snapshot of the Network Information API.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NetworkInformation {
    /// `slow-2g`, `2g`, `3g` or `4g`.
    pub effective_type: String,
    /// Downlink bandwidth estimate in Mbit/s.
    pub downlink: f64,
    /// Round trip time estimate in ms.
    pub rtt: f64,
    /// Whether the user asked for reduced data usage.
    pub save_data: bool,
}

impl NetworkInformation {
    /// The parsed effective connection type.
    pub fn connection_type(&self) -> ConnectionType {
        ConnectionType::from_effective_type(&self.effective_type)
    }
}

/// A JS heap snapshot (`performance.memory`, Chromium only).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    /// Bytes currently used by the heap.
    pub used_js_heap_size: u64,
    /// Bytes currently allocated for the heap.
    pub total_js_heap_size: u64,
    /// The most the heap may grow to.
    pub js_heap_size_limit: u64,
}

/// Navigation timing, in ms relative to the time origin.
#[derive(Clone, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct NavigationTiming {
    /// `navigate`, `reload`, `back_forward` or `prerender`.
    pub navigation_type: String,
    pub fetch_start: f64,
    pub domain_lookup_start: f64,
    pub domain_lookup_end: f64,
    pub connect_start: f64,
    pub connect_end: f64,
    pub request_start: f64,
    pub response_start: f64,
    pub response_end: f64,
    pub dom_interactive: f64,
    pub dom_content_loaded_event_start: f64,
    pub dom_content_loaded_event_end: f64,
    pub load_event_start: f64,
    pub load_event_end: f64,
    pub duration: f64,
    pub transfer_size: u64,
}

/// Resource timing, in ms relative to the time origin.
#[derive(Clone, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct ResourceTiming {
    /// The resource URL.
    pub name: String,
    /// `script`, `img`, `fetch`, ...
    pub initiator_type: String,
    pub start_time: f64,
    pub duration: f64,
    pub domain_lookup_start: f64,
    pub domain_lookup_end: f64,
    pub connect_start: f64,
    pub connect_end: f64,
    pub request_start: f64,
    pub response_end: f64,
    pub transfer_size: u64,
}

impl ResourceTiming {
    /// Time spent resolving the host.
    pub fn dns_time(&self) -> f64 {
        self.domain_lookup_end - self.domain_lookup_start
    }

    /// Time spent establishing the connection.
    pub fn connection_time(&self) -> f64 {
        self.connect_end - self.connect_start
    }

    /// Time from sending the request until the last byte arrived.
    pub fn request_time(&self) -> f64 {
        self.response_end - self.request_start
    }
}

/// A long task, in ms relative to the time origin.
#[derive(Clone, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct LongTaskTiming {
    pub name: String,
    pub start_time: f64,
    pub duration: f64,
}

/// The entry types a performance observer can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// `navigation`
    Navigation,
    /// `resource`
    Resource,
    /// `longtask`
    LongTask,
}

impl EntryType {
    /// The name used by `PerformanceObserver.observe`.
    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::Navigation => "navigation",
            EntryType::Resource => "resource",
            EntryType::LongTask => "longtask",
        }
    }
}

/// A performance entry delivered to an observer.
#[derive(Clone, Debug, PartialEq)]
pub enum PerformanceEntry {
    /// A navigation entry.
    Navigation(NavigationTiming),
    /// A resource entry.
    Resource(ResourceTiming),
    /// A long task entry.
    LongTask(LongTaskTiming),
}

impl PerformanceEntry {
    /// The type of this entry.
    pub fn entry_type(&self) -> EntryType {
        match self {
            PerformanceEntry::Navigation(_) => EntryType::Navigation,
            PerformanceEntry::Resource(_) => EntryType::Resource,
            PerformanceEntry::LongTask(_) => EntryType::LongTask,
        }
    }
}

/// The element a click or focus event targeted.
#[derive(Clone, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct ElementInfo {
    /// Upper-case tag name, e.g. `BUTTON`.
    pub tag_name: String,
    pub id: Option<String>,
    pub class_name: Option<String>,
    /// The `type` attribute of inputs.
    pub input_type: Option<String>,
}

/// DOM and window events the collectors listen to.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum DomEvent {
    /// The `load` event.
    Load,
    /// A click, with page coordinates.
    Click { target: ElementInfo, x: f64, y: f64 },
    /// A scroll.
    Scroll {
        scroll_y: f64,
        viewport_height: f64,
        document_height: f64,
    },
    /// A form submit.
    Submit {
        form_id: Option<String>,
        action: Option<String>,
        method: Option<String>,
    },
    /// Focus moved into an element.
    FocusIn { target: ElementInfo },
    /// The host went online.
    Online,
    /// The host went offline.
    Offline,
    /// The page is about to unload.
    BeforeUnload,
    /// The page visibility changed.
    VisibilityChange { hidden: bool },
    /// The Network Information API reported a change.
    ConnectionChange(NetworkInformation),
}

impl DomEvent {
    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            DomEvent::Load => EventKind::Load,
            DomEvent::Click { .. } => EventKind::Click,
            DomEvent::Scroll { .. } => EventKind::Scroll,
            DomEvent::Submit { .. } => EventKind::Submit,
            DomEvent::FocusIn { .. } => EventKind::FocusIn,
            DomEvent::Online => EventKind::Online,
            DomEvent::Offline => EventKind::Offline,
            DomEvent::BeforeUnload => EventKind::BeforeUnload,
            DomEvent::VisibilityChange { .. } => EventKind::VisibilityChange,
            DomEvent::ConnectionChange(_) => EventKind::ConnectionChange,
        }
    }
}

/// The kinds of [`DomEvent`] a listener can be registered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum EventKind {
    Load,
    Click,
    Scroll,
    Submit,
    FocusIn,
    Online,
    Offline,
    BeforeUnload,
    VisibilityChange,
    ConnectionChange,
}

/// The host the collectors run in.
pub trait Platform: Send + Sync + 'static {
    /// Whether this is a browser-like host.
    ///
    /// Collectors do nothing at all outside of one.
    fn is_browser(&self) -> bool;

    /// The current page URL.
    fn url(&self) -> String;

    /// The user agent string.
    fn user_agent(&self) -> String;

    /// The current viewport.
    fn viewport(&self) -> Viewport;

    /// Network Information API snapshot, if available.
    fn network_information(&self) -> Option<NetworkInformation> {
        None
    }

    /// `navigator.deviceMemory` in GiB, if available.
    fn device_memory(&self) -> Option<f64> {
        None
    }

    /// `performance.memory`, if available.
    fn memory_info(&self) -> Option<MemoryInfo> {
        None
    }

    /// Whether the host currently has connectivity.
    fn is_online(&self) -> bool {
        true
    }

    /// Whether the document finished loading.
    fn is_loaded(&self) -> bool {
        false
    }

    /// The navigation timing of the current document, if available.
    fn navigation_timing(&self) -> Option<NavigationTiming> {
        None
    }

    /// Registers a performance observer for one entry type.
    fn observe(&self, entry_type: EntryType, callback: EntryCallback) -> Result<(), PlatformError> {
        let _ = (entry_type, callback);
        Err(PlatformError::Unsupported("PerformanceObserver"))
    }

    /// Registers an event listener.
    fn add_event_listener(
        &self,
        kind: EventKind,
        callback: EventCallback,
    ) -> Result<(), PlatformError> {
        let _ = (kind, callback);
        Err(PlatformError::Unsupported("addEventListener"))
    }
}

/// The web vitals library, treated as a black box producing metrics.
pub trait VitalsSource: Send + Sync + 'static {
    /// Loads the library.
    ///
    /// An error means no vital will ever be reported.
    fn load(&self) -> Result<(), PlatformError>;

    /// Subscribes to one vital.
    fn subscribe(&self, vital: Vital, callback: VitalCallback);
}

/// The vitals a [`VitalsSource`] reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Vital {
    /// Largest Contentful Paint.
    Lcp,
    /// Cumulative Layout Shift.
    Cls,
    /// Interaction to Next Paint.
    Inp,
    /// First Contentful Paint.
    Fcp,
    /// Time to First Byte.
    Ttfb,
}

impl Vital {
    /// Every vital, in subscription order.
    pub const ALL: [Vital; 5] = [Vital::Lcp, Vital::Cls, Vital::Inp, Vital::Fcp, Vital::Ttfb];

    /// The metric name reported for this vital.
    pub fn name(self) -> &'static str {
        match self {
            Vital::Lcp => "LCP",
            Vital::Cls => "CLS",
            Vital::Inp => "INP",
            Vital::Fcp => "FCP",
            Vital::Ttfb => "TTFB",
        }
    }
}

/// A host without a page: server-side rendering, CLIs, background jobs.
///
/// Collectors bound to it stay inert.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeadlessPlatform;

impl Platform for HeadlessPlatform {
    fn is_browser(&self) -> bool {
        false
    }

    fn url(&self) -> String {
        String::new()
    }

    fn user_agent(&self) -> String {
        String::new()
    }

    fn viewport(&self) -> Viewport {
        Viewport::default()
    }
}

#[derive(Debug, Default)]
struct PageState {
    url: String,
    user_agent: String,
    viewport: Viewport,
    network: Option<NetworkInformation>,
    device_memory: Option<f64>,
    memory: Option<MemoryInfo>,
    online: bool,
    loaded: bool,
    navigation: Option<NavigationTiming>,
}

/// A platform driven by explicit calls.
///
/// Page state is set through the `set_*` methods; events and performance
/// entries are pushed with [`dispatch`](Self::dispatch) and
/// [`record`](Self::record), which invoke the registered callbacks on the
/// calling thread.
///
/// # Examples
///
/// ```
/// use beacon_core::platform::{DomEvent, EventKind, ManualPlatform, Platform};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let platform = ManualPlatform::new("https://example.com/");
/// let clicks = Arc::new(AtomicUsize::new(0));
/// let counter = clicks.clone();
/// platform
///     .add_event_listener(EventKind::Online, Arc::new(move |_: &DomEvent| {
///         counter.fetch_add(1, Ordering::SeqCst);
///     }))
///     .unwrap();
/// platform.dispatch(&DomEvent::Online);
/// assert_eq!(clicks.load(Ordering::SeqCst), 1);
/// ```
pub struct ManualPlatform {
    browser: bool,
    state: RwLock<PageState>,
    listeners: Mutex<Vec<(EventKind, EventCallback)>>,
    observers: Mutex<Vec<(EntryType, EntryCallback)>>,
    supports_observers: bool,
    supports_listeners: bool,
}

impl ManualPlatform {
    /// Creates a browser-like platform showing `url`.
    pub fn new(url: impl Into<String>) -> Self {
        ManualPlatform {
            browser: true,
            state: RwLock::new(PageState {
                url: url.into(),
                online: true,
                ..Default::default()
            }),
            listeners: Mutex::new(Vec::new()),
            observers: Mutex::new(Vec::new()),
            supports_observers: true,
            supports_listeners: true,
        }
    }

    /// Makes `is_browser` return `false`.
    #[must_use]
    pub fn headless(mut self) -> Self {
        self.browser = false;
        self
    }

    /// Makes `observe` fail as if `PerformanceObserver` did not exist.
    #[must_use]
    pub fn without_performance_observer(mut self) -> Self {
        self.supports_observers = false;
        self
    }

    /// Makes `add_event_listener` fail.
    #[must_use]
    pub fn without_event_listeners(mut self) -> Self {
        self.supports_listeners = false;
        self
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, PageState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, PageState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Sets the page URL.
    pub fn set_url(&self, url: impl Into<String>) {
        self.write_state().url = url.into();
    }

    /// Sets the user agent.
    pub fn set_user_agent(&self, user_agent: impl Into<String>) {
        self.write_state().user_agent = user_agent.into();
    }

    /// Sets the viewport.
    pub fn set_viewport(&self, viewport: Viewport) {
        self.write_state().viewport = viewport;
    }

    /// Sets the network information.
    pub fn set_network_information(&self, network: Option<NetworkInformation>) {
        self.write_state().network = network;
    }

    /// Sets the device memory.
    pub fn set_device_memory(&self, device_memory: Option<f64>) {
        self.write_state().device_memory = device_memory;
    }

    /// Sets the heap snapshot.
    pub fn set_memory_info(&self, memory: Option<MemoryInfo>) {
        self.write_state().memory = memory;
    }

    /// Sets the connectivity reported by `is_online`.
    ///
    /// This does not dispatch `online`/`offline` events.
    pub fn set_online(&self, online: bool) {
        self.write_state().online = online;
    }

    /// Marks the document as loaded with the given timing.
    pub fn set_loaded(&self, navigation: Option<NavigationTiming>) {
        let mut state = self.write_state();
        state.loaded = true;
        state.navigation = navigation;
    }

    /// Sets the navigation timing without marking the document loaded.
    pub fn set_navigation_timing(&self, navigation: Option<NavigationTiming>) {
        self.write_state().navigation = navigation;
    }

    /// Invokes every listener registered for the event's kind.
    pub fn dispatch(&self, event: &DomEvent) {
        let kind = event.kind();
        let callbacks: Vec<EventCallback> = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }

    /// Invokes every observer registered for the entry's type.
    pub fn record(&self, entry: &PerformanceEntry) {
        let entry_type = entry.entry_type();
        let callbacks: Vec<EntryCallback> = self
            .observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(t, _)| *t == entry_type)
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            callback(entry);
        }
    }

    /// The number of registered event listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// The number of registered performance observers.
    pub fn observer_count(&self) -> usize {
        self.observers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Platform for ManualPlatform {
    fn is_browser(&self) -> bool {
        self.browser
    }

    fn url(&self) -> String {
        self.read_state().url.clone()
    }

    fn user_agent(&self) -> String {
        self.read_state().user_agent.clone()
    }

    fn viewport(&self) -> Viewport {
        self.read_state().viewport
    }

    fn network_information(&self) -> Option<NetworkInformation> {
        self.read_state().network.clone()
    }

    fn device_memory(&self) -> Option<f64> {
        self.read_state().device_memory
    }

    fn memory_info(&self) -> Option<MemoryInfo> {
        self.read_state().memory
    }

    fn is_online(&self) -> bool {
        self.read_state().online
    }

    fn is_loaded(&self) -> bool {
        self.read_state().loaded
    }

    fn navigation_timing(&self) -> Option<NavigationTiming> {
        self.read_state().navigation.clone()
    }

    fn observe(&self, entry_type: EntryType, callback: EntryCallback) -> Result<(), PlatformError> {
        if !self.supports_observers {
            return Err(PlatformError::Unsupported("PerformanceObserver"));
        }
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((entry_type, callback));
        Ok(())
    }

    fn add_event_listener(
        &self,
        kind: EventKind,
        callback: EventCallback,
    ) -> Result<(), PlatformError> {
        if !self.supports_listeners {
            return Err(PlatformError::Unsupported("addEventListener"));
        }
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((kind, callback));
        Ok(())
    }
}

impl std::fmt::Debug for ManualPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualPlatform")
            .field("browser", &self.browser)
            .field("state", &*self.read_state())
            .field("listeners", &self.listener_count())
            .field("observers", &self.observer_count())
            .finish()
    }
}
