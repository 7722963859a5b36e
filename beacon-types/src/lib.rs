//! This crate provides common types for working with the beacon telemetry
//! protocol.
//!
//! The types in [`protocol`] describe what goes over the wire: enriched
//! [`Metric`](protocol::Metric) records, the batch envelope used by real user
//! monitoring and the threshold alert sent when a web vital degrades.  They
//! also describe the records the logger facade hands to its sinks.
//!
//! All JSON produced by these types uses `camelCase` field names and
//! millisecond Unix timestamps, matching what browser collection endpoints
//! expect.

#![warn(missing_docs)]

#[macro_use]
mod macros;
mod utils;

pub mod protocol;

pub use uuid::Uuid;

pub use crate::utils::{datetime_to_millis, millis_to_datetime};

/// Generates a random v4 UUID.
///
/// Used for session identifiers.
pub fn random_uuid() -> Uuid {
    uuid::Builder::from_random_bytes(rand::random()).into_uuid()
}
