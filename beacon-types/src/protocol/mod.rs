//! The beacon wire protocol.
//!
//! Everything a collector sends is one of the [`Payload`] variants:
//! a single [`Metric`], a [`RumBatch`] or a [`PerformanceAlert`].

mod log;
mod metric;
mod payload;

pub use self::log::{Capture, Exception, Level, LogLevel, LogRecord, ParseLevelError, SpanRecord};
pub use self::metric::{
    ConnectionType, Metric, MetricContext, ParseConnectionTypeError, Rating, Viewport,
};
pub use self::payload::{AlertType, Payload, PerformanceAlert, RumBatch, SessionInfo};

/// The map type used for metadata, attributes and contexts.
pub type Map<K, V> = std::collections::BTreeMap<K, V>;

/// Free-form JSON values.
pub use serde_json::Value;

pub use uuid::Uuid;
