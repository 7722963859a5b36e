use reqwest::blocking::Client as ReqwestClient;
use reqwest::header as ReqwestHeaders;
use reqwest::Proxy;
use url::Url;

use crate::{beacon_debug, BeaconOptions, Request, Transport, TransportError};

/// A [`Transport`] that posts JSON via the [`reqwest`] library.
///
/// When the `transport` feature is enabled this will currently
/// be the default transport.  This is separately enabled by the
/// `reqwest` feature flag.
///
/// Relative endpoints such as `/api/rum/track` are resolved against
/// [`BeaconOptions::base_url`].  Requests block the calling thread; the
/// blocking client must not be created or used from within an async
/// runtime.
///
/// [`reqwest`]: https://crates.io/crates/reqwest
#[cfg_attr(doc_cfg, doc(cfg(feature = "reqwest")))]
pub struct ReqwestHttpTransport {
    client: ReqwestClient,
    base_url: Option<Url>,
    debug: bool,
}

#[cfg_attr(doc_cfg, doc(cfg(feature = "reqwest")))]
impl ReqwestHttpTransport {
    /// Creates a new Transport.
    pub fn new(options: &BeaconOptions) -> Self {
        Self::new_internal(options, None)
    }

    /// Creates a new Transport that uses the specified [`ReqwestClient`].
    pub fn with_client(options: &BeaconOptions, client: ReqwestClient) -> Self {
        Self::new_internal(options, Some(client))
    }

    fn new_internal(options: &BeaconOptions, client: Option<ReqwestClient>) -> Self {
        let client = client.unwrap_or_else(|| {
            let mut builder = ReqwestClient::builder();
            if let Some(url) = options.http_proxy.as_ref() {
                match Proxy::http(url.as_ref()) {
                    Ok(proxy) => builder = builder.proxy(proxy),
                    Err(err) => beacon_debug!(options.debug, "invalid http proxy: {}", err),
                }
            };
            if let Some(url) = options.https_proxy.as_ref() {
                match Proxy::https(url.as_ref()) {
                    Ok(proxy) => builder = builder.proxy(proxy),
                    Err(err) => beacon_debug!(options.debug, "invalid https proxy: {}", err),
                }
            };
            builder.build().unwrap_or_else(|err| {
                beacon_debug!(options.debug, "falling back to default http client: {}", err);
                ReqwestClient::new()
            })
        });
        let base_url = options.base_url.as_ref().and_then(|url| match Url::parse(url) {
            Ok(url) => Some(url),
            Err(err) => {
                beacon_debug!(options.debug, "ignoring invalid base url `{}`: {}", url, err);
                None
            }
        });

        ReqwestHttpTransport {
            client,
            base_url,
            debug: options.debug,
        }
    }

    fn resolve(&self, endpoint: &str) -> Result<Url, TransportError> {
        match Url::parse(endpoint) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .base_url
                .as_ref()
                .and_then(|base| base.join(endpoint).ok())
                .ok_or_else(|| TransportError::InvalidUrl(endpoint.to_owned())),
            Err(_) => Err(TransportError::InvalidUrl(endpoint.to_owned())),
        }
    }
}

#[cfg_attr(doc_cfg, doc(cfg(feature = "reqwest")))]
impl Transport for ReqwestHttpTransport {
    fn send(&self, request: &Request) -> Result<(), TransportError> {
        let url = self.resolve(&request.endpoint)?;
        let body = request.payload.to_json_vec()?;

        let response = self
            .client
            .post(url)
            .header(ReqwestHeaders::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(|err| TransportError::Network(err.to_string()))?;

        let status = response.status();
        beacon_debug!(self.debug, "{} responded with {}", request.endpoint, status);
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status(status.as_u16()))
        }
    }
}
