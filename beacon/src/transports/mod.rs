//! The provided transports.
//!
//! This module exposes all transports that are compiled into the beacon
//! library.  The `reqwest` feature turns on the HTTP transport.

use std::sync::Arc;

use crate::{BeaconOptions, Transport, TransportFactory};

#[cfg(feature = "reqwest")]
mod reqwest;
#[cfg(feature = "reqwest")]
pub use self::reqwest::ReqwestHttpTransport;

/// The default http transport.
#[cfg(feature = "reqwest")]
pub type HttpTransport = ReqwestHttpTransport;

/// Creates the default HTTP transport.
///
/// This is the default value for `transport` on the beacon options.  It
/// creates a `HttpTransport`.  If no http transport was compiled into the
/// library nothing is sent.
#[derive(Clone)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create_transport(&self, options: &BeaconOptions) -> Arc<dyn Transport> {
        #[cfg(feature = "reqwest")]
        {
            Arc::new(HttpTransport::new(options))
        }
        #[cfg(not(feature = "reqwest"))]
        {
            crate::beacon_debug!(
                options.debug,
                "beacon was compiled without transport, nothing will be sent"
            );
            Arc::new(crate::NoopTransport)
        }
    }
}
