//! This crate provides the core of the beacon telemetry client: the logger
//! facade, the web vitals tracker and real user monitoring.
//!
//! `beacon-core` is meant for hosts that bring their own transport, or that
//! embed the collectors into a larger runtime.  Regular users should instead
//! use the [`beacon`] crate, which comes with an HTTP transport and reads its
//! defaults from the environment.
//!
//! # Core Concepts
//!
//! Both collectors share one shape: a collector receives observations from
//! the [`Platform`](platform::Platform), [`enrich`]es them with page and
//! session context and hands them to a [`Transport`].
//!
//! * The [`WebVitalsTracker`] sends every metric on its own and raises an
//!   alert when a metric crosses its threshold.  Sends happen on a
//!   background thread and failures are only logged.
//! * [`RealUserMonitoring`] buffers metrics and posts them in batches.  A
//!   failed batch goes back to the front of the buffer.
//! * The [`Logger`] facade is where both report their failures.
//!
//! A [`Beacon`] builds all of this from [`BeaconOptions`].
//!
//! # Parallelism
//!
//! Collectors are cheap handles that can be cloned into any thread.  The
//! RUM buffer is guarded by a mutex: a flush takes the whole buffer under
//! the lock and hands it to a background sender, so producers are never
//! blocked by a slow endpoint.  Both collectors queue at most
//! [`DEFAULT_QUEUE_SIZE`] requests unless configured otherwise.
//!
//! [`beacon`]: https://crates.io/crates/beacon

#![warn(missing_docs)]

// macros; these need to be first to be used by other modules
#[macro_use]
mod macros;

mod dispatch;
mod enrich;
mod error;
mod logger;
mod options;
mod pipeline;
pub mod platform;
mod registry;
mod rum;
mod sampling;
mod transport;
mod utils;
mod web_vitals;

// public api or exports from this crate
pub use crate::enrich::{enrich, RawMetric};
pub use crate::error::{exceptions_from_error, parse_type_from_debug, PlatformError, TransportError};
pub use crate::logger::{CaptureOptions, LogCrateSink, LogSink, Logger, NoopSink, SpanContext};
pub use crate::macros::debug_print;
pub use crate::options::{
    BeaconOptions, RumOptions, Thresholds, WebVitalsOptions, DEFAULT_ALERT_ENDPOINT,
    DEFAULT_QUEUE_SIZE, DEFAULT_RUM_ENDPOINT, DEFAULT_WEB_VITALS_ENDPOINT, MIN_INTERVAL,
};
pub use crate::pipeline::Pipeline;
pub use crate::registry::Beacon;
pub use crate::rum::RealUserMonitoring;
pub use crate::sampling::{sample_should_send, RandomSampler, Sampler};
pub use crate::transport::{NoopTransport, Request, Transport, TransportFactory};
pub use crate::web_vitals::WebVitalsTracker;


// public api from other crates
#[doc(inline)]
pub use beacon_types as types;
pub use beacon_types::protocol;
pub use beacon_types::protocol::{Level, LogLevel, Metric};
pub use beacon_types::{datetime_to_millis, random_uuid};
