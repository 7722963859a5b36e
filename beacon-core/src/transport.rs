use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use crate::error::TransportError;
use crate::protocol::Payload;
use crate::BeaconOptions;

/// One POST to a collection endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    /// The endpoint, absolute or relative to the base URL.
    pub endpoint: Cow<'static, str>,
    /// The JSON body.
    pub payload: Payload,
}

impl Request {
    /// Creates a new request.
    pub fn new(endpoint: impl Into<Cow<'static, str>>, payload: impl Into<Payload>) -> Self {
        Request {
            endpoint: endpoint.into(),
            payload: payload.into(),
        }
    }
}

/// The trait for transports.
///
/// A transport is responsible for delivering requests to the collection
/// endpoints.  `send` blocks until the endpoint answered; the collectors
/// decide whether that happens on a worker thread or on the caller's.
pub trait Transport: Send + Sync + 'static {
    /// Sends one request.
    ///
    /// Any non-2xx answer is an error.
    fn send(&self, request: &Request) -> Result<(), TransportError>;

    /// Instructs the transport to shut down within `timeout`.
    ///
    /// Returns whether everything was delivered in time.
    fn shutdown(&self, timeout: Duration) -> bool {
        let _ = timeout;
        true
    }
}

/// A factory creating transport instances.
///
/// Because options are potentially reused between different [`Beacon`]s
/// the options do not actually contain a transport but a factory object
/// that can create transports instead.
///
/// The factory has a single method that creates a new arced transport.
/// Because transports can be wrapped in `Arc`s and those are clonable any
/// `Arc<Transport>` is also a valid transport factory.  This for instance
/// lets you put a `Arc<TestTransport>` directly into the options.
///
/// This is automatically implemented for all closures optionally taking
/// options and returning a boxed factory.
///
/// [`Beacon`]: crate::Beacon
pub trait TransportFactory: Send + Sync {
    /// Given some options creates a transport.
    fn create_transport(&self, options: &BeaconOptions) -> Arc<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn(&BeaconOptions) -> Arc<dyn Transport> + Clone + Send + Sync + 'static,
{
    fn create_transport(&self, options: &BeaconOptions) -> Arc<dyn Transport> {
        (*self)(options)
    }
}

impl<T: Transport> TransportFactory for Arc<T> {
    fn create_transport(&self, options: &BeaconOptions) -> Arc<dyn Transport> {
        let _ = options;
        self.clone()
    }
}

/// Accepts and discards every request.
///
/// Used when no transport factory is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTransport;

impl Transport for NoopTransport {
    fn send(&self, _request: &Request) -> Result<(), TransportError> {
        Ok(())
    }
}
