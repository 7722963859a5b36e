//! Turning raw measurements into [`Metric`]s.

use std::time::SystemTime;

use crate::platform::Platform;
use crate::protocol::{ConnectionType, Map, Metric, MetricContext, Rating, Uuid, Value};

/// A measurement before enrichment.
///
/// This is what the vitals library and the collectors produce; the
/// context fields are added by [`enrich`].
#[derive(Clone, Debug, PartialEq)]
pub struct RawMetric {
    /// The metric name.
    pub name: String,
    /// The measured value.
    pub value: f64,
    /// Change since the last report of the same metric.
    pub delta: Option<f64>,
    /// An identifier, if the producer assigns one.
    pub id: Option<String>,
    /// The producer's rating.
    pub rating: Option<Rating>,
    /// Collector-specific data.
    pub metadata: Map<String, Value>,
}

impl RawMetric {
    /// Creates a raw metric with only a name and a value.
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        RawMetric {
            name: name.into(),
            value,
            delta: None,
            id: None,
            rating: None,
            metadata: Map::new(),
        }
    }

    /// Sets the delta.
    #[must_use]
    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = Some(delta);
        self
    }

    /// Sets the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the rating.
    #[must_use]
    pub fn with_rating(mut self, rating: Rating) -> Self {
        self.rating = Some(rating);
        self
    }

    /// Adds one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replaces the metadata.
    #[must_use]
    pub fn with_metadata_map(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Reads the page context from `platform` and attaches it to `raw`.
///
/// The timestamp is the current time.  Missing platform capabilities fall
/// back to `unknown` connection type and zero device memory.
pub fn enrich(
    platform: &dyn Platform,
    session_id: Uuid,
    user_id: Option<String>,
    raw: RawMetric,
) -> Metric {
    let connection_type = platform
        .network_information()
        .map(|info| info.connection_type())
        .unwrap_or(ConnectionType::Unknown);

    Metric {
        name: raw.name,
        value: raw.value,
        delta: raw.delta,
        id: raw.id,
        rating: raw.rating,
        context: MetricContext {
            timestamp: SystemTime::now(),
            url: platform.url(),
            user_agent: platform.user_agent(),
            connection_type,
            device_memory: platform.device_memory().unwrap_or(0.0),
            viewport: platform.viewport(),
            session_id,
            user_id,
        },
        metadata: raw.metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ManualPlatform, NetworkInformation};
    use crate::protocol::Viewport;

    #[test]
    fn test_enrich_reads_page_context() {
        let platform = ManualPlatform::new("https://example.com/anime/1");
        platform.set_user_agent("Mozilla/5.0");
        platform.set_viewport(Viewport::new(1280, 720));
        platform.set_device_memory(Some(8.0));
        platform.set_network_information(Some(NetworkInformation {
            effective_type: "4g".into(),
            downlink: 10.0,
            rtt: 50.0,
            save_data: false,
        }));

        let session_id = crate::random_uuid();
        let metric = enrich(
            &platform,
            session_id,
            Some("user-1".into()),
            RawMetric::new("LCP", 1200.0).with_delta(1200.0),
        );

        assert_eq!(metric.name, "LCP");
        assert_eq!(metric.delta, Some(1200.0));
        assert_eq!(metric.context.url, "https://example.com/anime/1");
        assert_eq!(metric.context.user_agent, "Mozilla/5.0");
        assert_eq!(metric.context.connection_type, ConnectionType::FourG);
        assert_eq!(metric.context.device_memory, 8.0);
        assert_eq!(metric.context.viewport, Viewport::new(1280, 720));
        assert_eq!(metric.context.session_id, session_id);
        assert_eq!(metric.context.user_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn test_enrich_without_optional_apis() {
        let platform = ManualPlatform::new("https://example.com/");
        let metric = enrich(&platform, crate::random_uuid(), None, RawMetric::new("x", 1.0));
        assert_eq!(metric.context.connection_type, ConnectionType::Unknown);
        assert_eq!(metric.context.device_memory, 0.0);
        assert_eq!(metric.context.user_id, None);
    }
}
