use std::fmt;
use std::str;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{Map, Value};
use crate::utils::ts_millis;

/// The size of the visible page area in CSS pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Viewport {
    /// Creates a new viewport.
    pub fn new(width: u32, height: u32) -> Self {
        Viewport { width, height }
    }
}

/// An error returned when parsing an unknown connection type.
#[derive(Debug, Error)]
#[error("invalid connection type")]
pub struct ParseConnectionTypeError;

/// The effective connection type as reported by the Network Information API.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionType {
    /// `slow-2g`
    #[serde(rename = "slow-2g")]
    Slow2g,
    /// `2g`
    #[serde(rename = "2g")]
    TwoG,
    /// `3g`
    #[serde(rename = "3g")]
    ThreeG,
    /// `4g`
    #[serde(rename = "4g")]
    FourG,
    /// The connection type could not be determined.
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl ConnectionType {
    /// Maps an `effectiveType` string onto a connection type.
    ///
    /// Anything unrecognized becomes [`ConnectionType::Unknown`].
    pub fn from_effective_type(effective_type: &str) -> ConnectionType {
        effective_type.parse().unwrap_or_default()
    }

    /// Returns the wire name of this connection type.
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionType::Slow2g => "slow-2g",
            ConnectionType::TwoG => "2g",
            ConnectionType::ThreeG => "3g",
            ConnectionType::FourG => "4g",
            ConnectionType::Unknown => "unknown",
        }
    }
}

impl str::FromStr for ConnectionType {
    type Err = ParseConnectionTypeError;

    fn from_str(string: &str) -> Result<ConnectionType, Self::Err> {
        Ok(match string {
            "slow-2g" => ConnectionType::Slow2g,
            "2g" => ConnectionType::TwoG,
            "3g" => ConnectionType::ThreeG,
            "4g" => ConnectionType::FourG,
            "unknown" => ConnectionType::Unknown,
            _ => return Err(ParseConnectionTypeError),
        })
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The rating a web vitals library assigns to a measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rating {
    /// Within the "good" band.
    Good,
    /// Between the "good" and "poor" bands.
    NeedsImprovement,
    /// Within the "poor" band.
    Poor,
}

/// The context attached to every metric when it is created.
///
/// Once a metric is built its context is never touched again.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricContext {
    /// When the metric was recorded.
    #[serde(with = "ts_millis")]
    pub timestamp: SystemTime,
    /// The page URL at the time of recording.
    pub url: String,
    /// The user agent of the host.
    pub user_agent: String,
    /// The effective network connection type.
    pub connection_type: ConnectionType,
    /// Approximate device memory in GiB, `0` if unknown.
    pub device_memory: f64,
    /// The viewport size.
    pub viewport: Viewport,
    /// The session of the collector that created the metric.
    pub session_id: Uuid,
    /// The user id, if one was set on the collector before recording.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// One observed measurement, enriched with its recording context.
///
/// The unit of `value` depends on `name`: milliseconds for timings, bytes
/// for memory, a unitless score for layout shift or a timestamp for event
/// markers such as clicks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    /// The metric name, e.g. `LCP` or `user_click`.
    pub name: String,
    /// The measured value.
    pub value: f64,
    /// The change since the last report of the same metric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    /// An identifier for this report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The rating assigned by the producing library.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    /// The recording context.
    #[serde(flatten)]
    pub context: MetricContext,
    /// Collector specific data.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}
