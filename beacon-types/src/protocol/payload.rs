use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Metric;
use crate::utils::ts_millis;

/// Session information sent alongside a batch of metrics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// The collector session.
    pub session_id: Uuid,
    /// The user id at the time the batch was sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// When the batch was sent.
    #[serde(with = "ts_millis")]
    pub timestamp: SystemTime,
}

/// A batch of buffered metrics, as posted by real user monitoring.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RumBatch {
    /// The metrics in recording order.
    pub metrics: Vec<Metric>,
    /// The sending session.
    pub session: SessionInfo,
}

/// The kind of a performance alert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertType {
    /// A web vital exceeded its configured threshold.
    #[serde(rename = "web-vital-threshold")]
    WebVitalThreshold,
}

/// Sent when a metric value exceeds its configured threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceAlert {
    /// The alert kind.
    #[serde(rename = "type")]
    pub ty: AlertType,
    /// The name of the breaching metric.
    pub metric: String,
    /// The observed value.
    pub value: f64,
    /// The threshold that was exceeded.
    pub threshold: f64,
    /// The page the metric was observed on.
    pub url: String,
    /// The collector session.
    pub session_id: Uuid,
    /// The user id, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// When the alert was raised.
    #[serde(with = "ts_millis")]
    pub timestamp: SystemTime,
}

/// The body of one outbound request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// A single metric.
    Metric(Box<Metric>),
    /// A threshold alert.
    Alert(PerformanceAlert),
    /// A batch of metrics.
    Batch(RumBatch),
}

impl Payload {
    /// Serializes the payload into a JSON byte vector.
    pub fn to_json_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Returns the metrics carried by this payload.
    pub fn metrics(&self) -> &[Metric] {
        match self {
            Payload::Metric(metric) => std::slice::from_ref(metric.as_ref()),
            Payload::Batch(batch) => &batch.metrics,
            Payload::Alert(_) => &[],
        }
    }
}

impl From<Metric> for Payload {
    fn from(metric: Metric) -> Self {
        Payload::Metric(Box::new(metric))
    }
}

impl From<PerformanceAlert> for Payload {
    fn from(alert: PerformanceAlert) -> Self {
        Payload::Alert(alert)
    }
}

impl From<RumBatch> for Payload {
    fn from(batch: RumBatch) -> Self {
        Payload::Batch(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::millis_to_datetime;

    #[test]
    fn test_alert_shape() {
        let alert = PerformanceAlert {
            ty: AlertType::WebVitalThreshold,
            metric: "LCP".into(),
            value: 3000.0,
            threshold: 2500.0,
            url: "https://example.com/".into(),
            session_id: Uuid::nil(),
            user_id: Some("user-1".into()),
            timestamp: millis_to_datetime(42).unwrap(),
        };
        let value = serde_json::to_value(Payload::from(alert)).unwrap();
        assert_eq!(value["type"], "web-vital-threshold");
        assert_eq!(value["threshold"], 2500.0);
        assert_eq!(value["userId"], "user-1");
        assert_eq!(value["timestamp"], 42);
    }

    #[test]
    fn test_batch_session_shape() {
        let batch = RumBatch {
            metrics: vec![],
            session: SessionInfo {
                session_id: Uuid::nil(),
                user_id: None,
                timestamp: millis_to_datetime(7).unwrap(),
            },
        };
        let json = String::from_utf8(Payload::from(batch).to_json_vec().unwrap()).unwrap();
        assert_eq!(
            json,
            r#"{"metrics":[],"session":{"sessionId":"00000000-0000-0000-0000-000000000000","timestamp":7}}"#
        );
    }

    #[test]
    fn test_untagged_payload_parses_batch() {
        let json = r#"{"metrics":[],"session":{"sessionId":"00000000-0000-0000-0000-000000000000","timestamp":7}}"#;
        let payload: Payload = serde_json::from_str(json).unwrap();
        assert!(matches!(payload, Payload::Batch(_)));
        assert!(payload.metrics().is_empty());
    }
}
