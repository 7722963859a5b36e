use std::ops::Deref;
use std::sync::Arc;

use beacon_core::beacon_debug;

use crate::defaults::apply_defaults;
use crate::{Beacon, BeaconOptions};

/// Helper struct that is returned from `init`.
///
/// When this is dropped the beacon is closed: buffered RUM metrics are
/// posted and pending web vitals are drained within the shutdown timeout.
#[must_use = "when the init guard is dropped the beacon is closed and buffered metrics are \
              posted.  If you do want to ignore this use mem::forget on it."]
pub struct BeaconGuard(Arc<Beacon>);

impl BeaconGuard {
    /// Returns a shared handle to the beacon.
    ///
    /// The handle outlives the guard, but closing happens when the guard is
    /// dropped.
    pub fn beacon(&self) -> Arc<Beacon> {
        self.0.clone()
    }
}

impl Deref for BeaconGuard {
    type Target = Beacon;

    fn deref(&self) -> &Beacon {
        &self.0
    }
}

impl Drop for BeaconGuard {
    fn drop(&mut self) {
        beacon_debug!(self.0.options().debug, "dropping beacon guard -> closing beacon");
        self.0.close(None);
    }
}

/// Creates a beacon from the given options with environment defaults.
///
/// This returns a guard that must be kept in scope for as long as metrics
/// should be collected.  When the guard is dropped the beacon posts what
/// is still buffered and the transport shuts down.
///
/// Anything that converts into [`BeaconOptions`] is accepted, in particular
/// a base URL to resolve the relative endpoints against.
///
/// # Examples
///
/// ```
/// let _beacon = beacon::init("https://rum.example.com");
/// ```
///
/// With explicit options:
///
/// ```
/// use beacon::{BeaconOptions, WebVitalsOptions};
///
/// let beacon = beacon::init(
///     BeaconOptions::new()
///         .with_base_url("https://rum.example.com")
///         .with_web_vitals(WebVitalsOptions::new().with_threshold("LCP", 2000.0)),
/// );
/// beacon.set_user_id("user-1");
/// ```
pub fn init<O: Into<BeaconOptions>>(options: O) -> BeaconGuard {
    let options = apply_defaults(options.into());
    let debug = options.debug;
    let beacon = Arc::new(Beacon::new(options));
    match beacon.options().base_url {
        Some(ref base_url) => beacon_debug!(debug, "enabled beacon for {}", base_url),
        None => beacon_debug!(debug, "enabled beacon without base url, relative endpoints will fail"),
    }
    BeaconGuard(beacon)
}
