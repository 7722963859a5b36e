use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use crate::logger::Logger;
use crate::options::{BeaconOptions, RumOptions};
use crate::pipeline::Pipeline;
use crate::platform::HeadlessPlatform;
use crate::rum::RealUserMonitoring;
use crate::sampling::RandomSampler;
use crate::transport::NoopTransport;
use crate::web_vitals::WebVitalsTracker;

/// Owns the collectors of one page session.
///
/// The host builds one `Beacon` at startup and hands it (or clones of the
/// collector handles) to whoever records metrics.  Real user monitoring is
/// started right away; the web vitals tracker is created on first access to
/// [`web_vitals`](Self::web_vitals), at which point it starts observing
/// performance entries and the page lifecycle and subscribes to the vitals
/// source.
///
/// # Examples
///
/// ```
/// use beacon_core::{Beacon, BeaconOptions};
///
/// let beacon = Beacon::new(BeaconOptions::default());
/// beacon.set_user_id("user-1");
/// beacon.rum().track_user_journey("open_list", None);
/// beacon.close(None);
/// ```
pub struct Beacon {
    options: BeaconOptions,
    pipeline: Pipeline,
    rum: RealUserMonitoring,
    web_vitals: OnceLock<WebVitalsTracker>,
    user_id: RwLock<Option<String>>,
}

impl Beacon {
    /// Creates the pipeline and starts real user monitoring.
    pub fn new(options: BeaconOptions) -> Beacon {
        let transport = match options.transport {
            Some(ref factory) => factory.create_transport(&options),
            None => {
                beacon_debug!(options.debug, "no transport configured, nothing will be sent");
                Arc::new(NoopTransport)
            }
        };
        let pipeline = Pipeline {
            transport,
            platform: options
                .platform
                .clone()
                .unwrap_or_else(|| Arc::new(HeadlessPlatform)),
            logger: options
                .log_sink
                .clone()
                .map(Logger::new)
                .unwrap_or_default(),
            sampler: options
                .sampler
                .clone()
                .unwrap_or_else(|| Arc::new(RandomSampler)),
        };

        let mut rum_options = match (&options.rum, &options.environment) {
            (Some(rum), _) => rum.clone(),
            (None, Some(environment)) => RumOptions::for_environment(environment),
            (None, None) => RumOptions::default(),
        };
        rum_options.debug |= options.debug;
        let rum = RealUserMonitoring::new(rum_options, pipeline.clone());

        Beacon {
            options,
            pipeline,
            rum,
            web_vitals: OnceLock::new(),
            user_id: RwLock::new(None),
        }
    }

    /// The options this beacon was created from.
    pub fn options(&self) -> &BeaconOptions {
        &self.options
    }

    /// The logger facade shared by both collectors.
    pub fn logger(&self) -> &Logger {
        &self.pipeline.logger
    }

    /// The real user monitoring collector.
    pub fn rum(&self) -> &RealUserMonitoring {
        &self.rum
    }

    /// Returns the web vitals tracker, creating it on first access.
    pub fn web_vitals(&self) -> &WebVitalsTracker {
        self.web_vitals.get_or_init(|| {
            let mut options = self.options.web_vitals.clone();
            options.debug |= self.options.debug;
            let tracker = WebVitalsTracker::new(options, self.pipeline.clone());
            if let Some(ref user_id) = *self.user_id.read().unwrap_or_else(|e| e.into_inner()) {
                tracker.set_user_id(user_id.clone());
            }
            tracker.observe_performance();
            tracker.track_page_lifecycle();
            if let Some(ref source) = self.options.vitals_source {
                tracker.install(source.as_ref());
            }
            tracker
        })
    }

    /// Sets the user id on both collectors, including a tracker created
    /// later.
    pub fn set_user_id(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        *self.user_id.write().unwrap_or_else(|e| e.into_inner()) = Some(user_id.clone());
        self.rum.set_user_id(user_id.clone());
        if let Some(tracker) = self.web_vitals.get() {
            tracker.set_user_id(user_id);
        }
    }

    /// Drains both collectors and shuts the transport down.
    ///
    /// Buffered RUM metrics are posted regardless of connectivity.  Returns
    /// whether everything was handed over within `timeout`, which defaults
    /// to the configured shutdown timeout.
    pub fn close(&self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(self.options.shutdown_timeout);
        let drained = self.rum.shutdown(timeout);
        let drained = match self.web_vitals.get() {
            Some(tracker) => tracker.flush(timeout) && drained,
            None => drained,
        };
        self.pipeline.transport.shutdown(timeout) && drained
    }
}

impl std::fmt::Debug for Beacon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Beacon")
            .field("options", &self.options)
            .field("rum", &self.rum)
            .field("web_vitals", &self.web_vitals.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ManualPlatform;
    use crate::test::{with_captured_requests, FixedSampler, TestTransport, TestVitalsSource};
    use crate::WebVitalsOptions;

    #[test]
    fn test_web_vitals_is_lazy() {
        let platform = Arc::new(ManualPlatform::new("https://example.com/"));
        let beacon = Beacon::new(BeaconOptions::new().with_platform(platform.clone()));
        let rum_listeners = platform.listener_count();
        let rum_observers = platform.observer_count();

        let _ = beacon.web_vitals();
        assert_eq!(platform.observer_count(), rum_observers + 3);
        assert_eq!(platform.listener_count(), rum_listeners + 2);

        let _ = beacon.web_vitals();
        assert_eq!(platform.observer_count(), rum_observers + 3);
    }

    #[test]
    fn test_user_id_reaches_late_tracker() {
        let requests = with_captured_requests(|beacon| {
            beacon.set_user_id("user-9");
            beacon.web_vitals().track_custom_metric("foo", 1.0);
        });
        let metric = &requests[0].payload.metrics()[0];
        assert_eq!(metric.context.user_id.as_deref(), Some("user-9"));
    }

    #[test]
    fn test_close_flushes_buffered_rum() {
        let requests = with_captured_requests(|beacon| {
            beacon.rum().set_online(false);
            beacon.rum().track_metric("pending", 1.0, None);
        });
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].endpoint, "/api/rum/track");
    }

    #[test]
    fn test_close_reports_slow_drain() {
        let transport = TestTransport::new();
        transport.on_send(|_| std::thread::sleep(Duration::from_millis(300)));
        let beacon = Beacon::new(
            BeaconOptions::new()
                .with_platform(Arc::new(ManualPlatform::new("https://example.com/")))
                .with_sampler(Arc::new(FixedSampler::new(0.0)))
                .with_transport(transport.clone()),
        );
        beacon.rum().track_metric("a", 1.0, None);

        assert!(!beacon.close(Some(Duration::from_millis(20))));
        drop(beacon);
        assert_eq!(transport.request_count(), 1);
        transport.clear_on_send();
    }

    #[test]
    fn test_vitals_source_installed_on_access() {
        let source = TestVitalsSource::new();
        let transport = TestTransport::new();
        let beacon = Beacon::new(
            BeaconOptions::new()
                .with_platform(Arc::new(ManualPlatform::new("https://example.com/")))
                .with_vitals_source(source.clone())
                .with_sampler(Arc::new(FixedSampler::new(0.0)))
                .with_transport(transport.clone())
                .with_web_vitals(WebVitalsOptions::new().with_endpoint("/vitals")),
        );
        assert_eq!(source.subscription_count(), 0);
        let _ = beacon.web_vitals();
        assert_eq!(source.subscription_count(), 5);
    }

    #[test]
    fn test_environment_picks_rum_sampling() {
        let beacon = Beacon::new(
            BeaconOptions::new()
                .with_environment("production")
                .with_sampler(Arc::new(FixedSampler::new(0.5))),
        );
        assert!(!beacon.rum().is_sampled());

        let beacon = Beacon::new(
            BeaconOptions::new()
                .with_environment("development")
                .with_sampler(Arc::new(FixedSampler::new(0.5))),
        );
        assert!(beacon.rum().is_sampled());
    }
}
