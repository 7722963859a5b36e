use std::error::Error;

use thiserror::Error;

use crate::protocol::Exception;

/// Failure to deliver a request to a collection endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint answered with a non-2xx status.
    #[error("endpoint responded with status {0}")]
    Status(u16),
    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),
    /// The endpoint could not be resolved into a URL.
    #[error("invalid endpoint url `{0}`")]
    InvalidUrl(String),
    /// The payload could not be encoded.
    #[error("failed to serialize payload")]
    Serialization(#[from] serde_json::Error),
    /// The send queue was full and the request was dropped.
    #[error("send queue is full")]
    QueueFull,
    /// The transport was shut down.
    #[error("transport is shut down")]
    Disconnected,
}

/// A host capability is missing or refused a registration.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The host does not provide this API.
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
    /// The host provides the API but the call failed.
    #[error("platform call failed: {0}")]
    Failed(String),
}

/// Parse the types name from `Debug` output.
///
/// # Examples
///
/// ```
/// use beacon_core::parse_type_from_debug;
///
/// let err = "NaN".parse::<usize>().unwrap_err();
/// assert_eq!(&parse_type_from_debug(&err), "ParseIntError");
/// ```
pub fn parse_type_from_debug<D: std::fmt::Debug + ?Sized>(d: &D) -> String {
    let dbg = format!("{:#?}", d);

    dbg.split(&[' ', '(', '{', '\r', '\n'][..])
        .next()
        .unwrap_or(&dbg)
        .trim()
        .to_owned()
}

/// Resolves the `source` chain of an error, sorted oldest to newest.
pub fn exceptions_from_error<E: Error + ?Sized>(err: &E) -> Vec<Exception> {
    let mut exceptions = vec![exception_from_error(err)];

    let mut source = err.source();
    while let Some(err) = source {
        exceptions.push(exception_from_error(err));
        source = err.source();
    }

    exceptions.reverse();
    exceptions
}

fn exception_from_error<E: Error + ?Sized>(err: &E) -> Exception {
    Exception {
        ty: parse_type_from_debug(err),
        value: Some(err.to_string()),
    }
}

/// Renders an error and its sources, one per line.
pub(crate) fn render_error_chain<E: Error + ?Sized>(err: &E) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(err) = source {
        rendered.push_str("\nCaused by: ");
        rendered.push_str(&err.to_string());
        source = err.source();
    }
    rendered
}
