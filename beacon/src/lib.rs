//! This crate provides client-side telemetry for pages and embedded web
//! views: Core Web Vitals with threshold alerts, real user monitoring with
//! batched delivery, and a structured logging facade.
//!
//! # Quickstart
//!
//! The most convenient way to use this library is the [`beacon::init`]
//! function, which applies the environment defaults, creates a [`Beacon`]
//! with an HTTP transport and starts real user monitoring.
//!
//! The [`beacon::init`] function returns a guard that when dropped will post
//! the metrics that were not yet sent.  Keep the guard around for as long as
//! metrics should be collected.
//!
//! ```
//! let beacon = beacon::init("https://rum.example.com");
//! beacon.rum().track_user_journey("open_watch_list", None);
//! beacon.web_vitals().track_custom_metric("list_render", 84.0);
//! // when the guard goes out of scope here, buffered metrics are posted.
//! ```
//!
//! Without a [`Platform`](platform::Platform) both collectors stay inert:
//! the host page (a webview shell, a wasm bridge) provides one through
//! [`BeaconOptions::platform`].
//!
//! [`beacon::init`]: fn.init.html
//!
//! # Minimal API
//!
//! To bring a custom [`Transport`], or to embed the collectors without the
//! HTTP stack, use the [`beacon-core`] crate instead.
//!
//! [`beacon-core`]: https://crates.io/crates/beacon-core
//!
//! # Features
//!
//! Default features:
//!
//! * `transport`: Enables the default transport, which is `reqwest` with `native-tls`.
//!
//! Additional features:
//!
//! * `test`: Enables testing support.
//! * `debug-logs`: Uses the `log` crate for internal logging.
//! * `reqwest`: Enables the `reqwest` transport.
//! * `native-tls`: Uses the `native-tls` crate, which is currently the default.
//! * `rustls`: Enables the `rustls` support of the `reqwest` transport.
//!   Please note that `native-tls` is a default feature, and one needs to use
//!   `default-features = false` to completely disable building `native-tls` dependencies.

#![warn(missing_docs)]

mod defaults;
mod init;
pub mod transports;

// re-export from core
#[doc(inline)]
pub use beacon_core::*;

// added public API
pub use crate::defaults::apply_defaults;
pub use crate::init::{init, BeaconGuard};
