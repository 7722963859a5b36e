#[macro_export]
#[doc(hidden)]
macro_rules! beacon_debug {
    ($enabled:expr, $($arg:tt)*) => {
        if $enabled {
            $crate::debug_print(format_args!($($arg)*));
        }
    }
}

/// Writes one line of internal diagnostics.
///
/// With the `debug-logs` feature this goes through the `log` crate with the
/// `beacon` target, otherwise it is printed to stderr.
#[doc(hidden)]
pub fn debug_print(args: std::fmt::Arguments<'_>) {
    #[cfg(feature = "debug-logs")]
    {
        log::debug!(target: "beacon", "{}", args);
    }
    #[cfg(not(feature = "debug-logs"))]
    {
        eprintln!("[beacon] {}", args);
    }
}
