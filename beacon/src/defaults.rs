use std::borrow::Cow;
use std::env;
use std::sync::Arc;

use crate::transports::DefaultTransportFactory;
use crate::BeaconOptions;

/// Apply default beacon options.
///
/// This is called by [`init`](crate::init) and fills in everything the
/// options leave unset:
///
/// * `transport` becomes the [`DefaultTransportFactory`].
/// * `base_url` is read from `BEACON_BASE_URL`.
/// * `environment` is read from `BEACON_ENVIRONMENT`, falling back to
///   `development` for debug builds and `production` otherwise.  Unless RUM
///   options are given explicitly, the environment picks the RUM sample rate.
/// * `debug` is switched on by `BEACON_DEBUG=1` or `BEACON_DEBUG=true`.
/// * `http_proxy` and `https_proxy` follow the usual environment variables.
///
/// # Examples
///
/// ```
/// std::env::set_var("BEACON_ENVIRONMENT", "staging");
/// let options = beacon::apply_defaults(beacon::BeaconOptions::default());
/// assert_eq!(options.environment.as_deref(), Some("staging"));
/// ```
pub fn apply_defaults(mut opts: BeaconOptions) -> BeaconOptions {
    if opts.transport.is_none() {
        opts.transport = Some(Arc::new(DefaultTransportFactory));
    }
    if opts.base_url.is_none() {
        opts.base_url = env::var("BEACON_BASE_URL").ok().map(Cow::Owned);
    }
    if opts.environment.is_none() {
        opts.environment = env::var("BEACON_ENVIRONMENT")
            .ok()
            .map(Cow::Owned)
            .or_else(|| {
                Some(Cow::Borrowed(if cfg!(debug_assertions) {
                    "development"
                } else {
                    "production"
                }))
            });
    }
    if !opts.debug {
        opts.debug = env::var("BEACON_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
    }
    if opts.http_proxy.is_none() {
        opts.http_proxy = env::var("HTTP_PROXY")
            .ok()
            .map(Cow::Owned)
            .or_else(|| env::var("http_proxy").ok().map(Cow::Owned));
    }
    if opts.https_proxy.is_none() {
        opts.https_proxy = env::var("HTTPS_PROXY")
            .ok()
            .map(Cow::Owned)
            .or_else(|| env::var("https_proxy").ok().map(Cow::Owned))
            .or_else(|| opts.http_proxy.clone());
    }
    opts
}
