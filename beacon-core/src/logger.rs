//! The structured logging facade.
//!
//! A [`Logger`] forwards log records, captured exceptions and messages, and
//! finished performance spans to a [`LogSink`].  Both collectors report their
//! failures through it, and hosts can use it for their own diagnostics.
//!
//! The `logger_*!` macros are the formatting helpers: they render the message
//! and keep the template and its parameters as attributes, so sinks can group
//! records by template instead of by rendered text.

use std::error::Error;
use std::future::Future;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::error::exceptions_from_error;
use crate::protocol::{Capture, Level, LogLevel, LogRecord, Map, SpanRecord, Value};

/// Receives everything a [`Logger`] produces.
///
/// Implementations must not fail loudly: a sink that cannot deliver a record
/// drops it.
pub trait LogSink: Send + Sync + 'static {
    /// Receives a structured log record.
    fn log(&self, record: LogRecord);

    /// Receives a captured exception or message.
    fn capture(&self, capture: Capture);

    /// Receives a finished span.
    fn span(&self, span: SpanRecord) {
        let _ = span;
    }
}

/// Forwards everything to the [`log`] crate under the `beacon` target.
///
/// This is the default sink.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogCrateSink;

impl LogSink for LogCrateSink {
    fn log(&self, record: LogRecord) {
        let level = match record.level {
            LogLevel::Trace => log::Level::Trace,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error | LogLevel::Fatal => log::Level::Error,
        };
        if record.attributes.is_empty() {
            log::log!(target: "beacon", level, "{}", record.body);
        } else {
            let attributes = serde_json::to_string(&record.attributes).unwrap_or_default();
            log::log!(target: "beacon", level, "{} {}", record.body, attributes);
        }
    }

    fn capture(&self, capture: Capture) {
        let level = match capture.level {
            Level::Debug => log::Level::Debug,
            Level::Info => log::Level::Info,
            Level::Warning => log::Level::Warn,
            Level::Error | Level::Fatal => log::Level::Error,
        };
        let text = match (&capture.message, capture.exception.last()) {
            (Some(message), _) => message.clone(),
            (None, Some(exc)) => match exc.value {
                Some(ref value) => format!("{}: {}", exc.ty, value),
                None => exc.ty.clone(),
            },
            (None, None) => String::from("<empty capture>"),
        };
        log::log!(target: "beacon", level, "captured {}", text);
    }

    fn span(&self, span: SpanRecord) {
        log::trace!(
            target: "beacon",
            "span `{}` ({}) finished in {:.3}ms",
            span.name,
            span.op,
            span.duration.as_secs_f64() * 1000.0
        );
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl LogSink for NoopSink {
    fn log(&self, _record: LogRecord) {}
    fn capture(&self, _capture: Capture) {}
}

/// Options for [`Logger::capture_exception`] and [`Logger::capture_message`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaptureOptions {
    /// Extra context.
    pub context: Map<String, Value>,
    /// Tags.
    pub tags: Map<String, String>,
    /// Overrides the default level of the capture.
    pub level: Option<Level>,
}

impl CaptureOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Sets the level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }
}

/// Names a span for [`Logger::with_span`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpanContext {
    op: String,
    name: String,
}

impl SpanContext {
    /// Creates a span context from an operation and a name.
    pub fn new(op: impl Into<String>, name: impl Into<String>) -> Self {
        SpanContext {
            op: op.into(),
            name: name.into(),
        }
    }

    fn finish(self, start: SystemTime, started: Instant) -> SpanRecord {
        SpanRecord {
            op: self.op,
            name: self.name,
            start,
            duration: started.elapsed(),
        }
    }
}

/// The structured logging facade.
///
/// Cloning a logger is cheap; all clones share the sink.
///
/// # Examples
///
/// ```
/// use beacon_core::{logger_warn, CaptureOptions, Logger, SpanContext};
///
/// let logger = Logger::default();
/// logger.info("collector started", None);
/// logger_warn!(logger, endpoint = "/api/rum/track", "flush took {}ms", 1200);
///
/// let answer = logger.with_span(SpanContext::new("task", "compute"), || 42);
/// assert_eq!(answer, 42);
///
/// logger.capture_message("cache cold", CaptureOptions::new().with_tag("page", "home"));
/// ```
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
}

impl Default for Logger {
    fn default() -> Self {
        Logger::new(Arc::new(LogCrateSink))
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

impl Logger {
    /// Creates a logger writing to the given sink.
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Logger { sink }
    }

    /// Creates a logger that discards everything.
    pub fn noop() -> Self {
        Logger::new(Arc::new(NoopSink))
    }

    /// Logs a message at the given level with optional context.
    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        context: impl Into<Option<Map<String, Value>>>,
    ) {
        self.capture_log(LogRecord {
            level,
            body: message.into(),
            timestamp: SystemTime::now(),
            attributes: context.into().unwrap_or_default(),
        });
    }

    /// Hands a prepared record to the sink.
    ///
    /// This is what the `logger_*!` macros expand to.
    pub fn capture_log(&self, record: LogRecord) {
        self.sink.log(record);
    }

    /// Logs at trace level.
    pub fn trace(&self, message: impl Into<String>, context: impl Into<Option<Map<String, Value>>>) {
        self.log(LogLevel::Trace, message, context)
    }

    /// Logs at debug level.
    pub fn debug(&self, message: impl Into<String>, context: impl Into<Option<Map<String, Value>>>) {
        self.log(LogLevel::Debug, message, context)
    }

    /// Logs at info level.
    pub fn info(&self, message: impl Into<String>, context: impl Into<Option<Map<String, Value>>>) {
        self.log(LogLevel::Info, message, context)
    }

    /// Logs at warn level.
    pub fn warn(&self, message: impl Into<String>, context: impl Into<Option<Map<String, Value>>>) {
        self.log(LogLevel::Warn, message, context)
    }

    /// Logs at error level.
    pub fn error(&self, message: impl Into<String>, context: impl Into<Option<Map<String, Value>>>) {
        self.log(LogLevel::Error, message, context)
    }

    /// Logs at fatal level.
    pub fn fatal(&self, message: impl Into<String>, context: impl Into<Option<Map<String, Value>>>) {
        self.log(LogLevel::Fatal, message, context)
    }

    /// Captures an error and its `source` chain.
    ///
    /// The level defaults to [`Level::Error`].
    pub fn capture_exception<E: Error + ?Sized>(&self, error: &E, options: CaptureOptions) {
        self.sink.capture(Capture {
            level: options.level.unwrap_or(Level::Error),
            message: None,
            exception: exceptions_from_error(error),
            context: options.context,
            tags: options.tags,
            timestamp: SystemTime::now(),
        });
    }

    /// Captures a plain message.
    ///
    /// The level defaults to [`Level::Info`].
    pub fn capture_message(&self, message: &str, options: CaptureOptions) {
        self.sink.capture(Capture {
            level: options.level.unwrap_or(Level::Info),
            message: Some(message.to_owned()),
            exception: Vec::new(),
            context: options.context,
            tags: options.tags,
            timestamp: SystemTime::now(),
        });
    }

    /// Runs `f` inside a named span and returns its result unchanged.
    pub fn with_span<F, R>(&self, ctx: SpanContext, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = SystemTime::now();
        let started = Instant::now();
        let rv = f();
        self.sink.span(ctx.finish(start, started));
        rv
    }

    /// Awaits `future` inside a named span and returns its output unchanged.
    pub async fn with_span_async<F>(&self, ctx: SpanContext, future: F) -> F::Output
    where
        F: Future,
    {
        let start = SystemTime::now();
        let started = Instant::now();
        let rv = future.await;
        self.sink.span(ctx.finish(start, started));
        rv
    }
}

// Helper macro to capture a log at the given level. Should not be used directly.
#[doc(hidden)]
#[macro_export]
macro_rules! logger_log {
    // Simple message
    ($logger:expr, $level:expr, $msg:literal) => {{
        let record = $crate::protocol::LogRecord {
            level: $level,
            body: $msg.to_owned(),
            timestamp: ::std::time::SystemTime::now(),
            attributes: $crate::protocol::Map::new(),
        };
        $logger.capture_log(record)
    }};

    // Message with format string and args
    ($logger:expr, $level:expr, $fmt:literal, $($arg:expr),+) => {{
        let mut attributes = $crate::protocol::Map::new();
        $crate::logger_log!(@internal attributes, $logger, $level, $fmt, $($arg),+)
    }};

    // Attributes entrypoint
    ($logger:expr, $level:expr, $($rest:tt)+) => {{
        let mut attributes = $crate::protocol::Map::new();
        $crate::logger_log!(@internal attributes, $logger, $level, $($rest)+)
    }};

    // Attributes base case: no more attributes, simple message
    (@internal $attrs:ident, $logger:expr, $level:expr, $msg:literal) => {{
        let record = $crate::protocol::LogRecord {
            level: $level,
            body: $msg.to_owned(),
            timestamp: ::std::time::SystemTime::now(),
            #[allow(clippy::redundant_field_names)]
            attributes: $attrs,
        };
        $logger.capture_log(record)
    }};

    // Attributes base case: no more attributes, message with format string and args
    (@internal $attrs:ident, $logger:expr, $level:expr, $fmt:literal, $($arg:expr),+) => {{
        $attrs.insert(
            "message.template".to_owned(),
            $crate::protocol::Value::from($fmt)
        );
        let mut i = 0usize;
        $(
            $attrs.insert(
                format!("message.parameter.{}", i),
                $crate::protocol::Value::from($arg)
            );
            i += 1;
        )*
        let _ = i;

        let record = $crate::protocol::LogRecord {
            level: $level,
            body: format!($fmt, $($arg),*),
            timestamp: ::std::time::SystemTime::now(),
            #[allow(clippy::redundant_field_names)]
            attributes: $attrs,
        };
        $logger.capture_log(record)
    }};

    // Attributes recursive case
    (@internal $attrs:ident, $logger:expr, $level:expr, $($key:ident).+ = $value:expr, $($rest:tt)+) => {{
        $attrs.insert(
            stringify!($($key).+).to_owned(),
            $crate::protocol::Value::from($value)
        );
        $crate::logger_log!(@internal $attrs, $logger, $level, $($rest)+)
    }};
}

/// Logs at the trace level through the given [`Logger`].
///
/// Attributes go before the message with `key = value` syntax; the message
/// is a literal or a format string with arguments.
///
/// # Examples
///
/// ```
/// use beacon_core::{logger_trace, Logger};
///
/// let logger = Logger::noop();
/// logger_trace!(logger, "Hello world");
/// logger_trace!(logger, "Value is {}", 42);
/// logger_trace!(logger, metric = "LCP", session.id = "abc", "slow page {}", "/home");
/// ```
#[macro_export]
macro_rules! logger_trace {
    ($logger:expr, $($arg:tt)+) => {
        $crate::logger_log!($logger, $crate::protocol::LogLevel::Trace, $($arg)+)
    };
}

/// Logs at the debug level through the given [`Logger`].
///
/// See [`logger_trace!`] for the accepted syntax.
#[macro_export]
macro_rules! logger_debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::logger_log!($logger, $crate::protocol::LogLevel::Debug, $($arg)+)
    };
}

/// Logs at the info level through the given [`Logger`].
///
/// See [`logger_trace!`] for the accepted syntax.
#[macro_export]
macro_rules! logger_info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::logger_log!($logger, $crate::protocol::LogLevel::Info, $($arg)+)
    };
}

/// Logs at the warn level through the given [`Logger`].
///
/// See [`logger_trace!`] for the accepted syntax.
#[macro_export]
macro_rules! logger_warn {
    ($logger:expr, $($arg:tt)+) => {
        $crate::logger_log!($logger, $crate::protocol::LogLevel::Warn, $($arg)+)
    };
}

/// Logs at the error level through the given [`Logger`].
///
/// See [`logger_trace!`] for the accepted syntax.
#[macro_export]
macro_rules! logger_error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::logger_log!($logger, $crate::protocol::LogLevel::Error, $($arg)+)
    };
}

/// Logs at the fatal level through the given [`Logger`].
///
/// See [`logger_trace!`] for the accepted syntax.
#[macro_export]
macro_rules! logger_fatal {
    ($logger:expr, $($arg:tt)+) => {
        $crate::logger_log!($logger, $crate::protocol::LogLevel::Fatal, $($arg)+)
    };
}
