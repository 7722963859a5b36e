//! Fire-and-forget delivery on a background thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::TransportError;
use crate::transport::{Request, Transport};

/// How long a dropped dispatcher keeps sending what is still queued.
pub(crate) const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

type ErrorHandler = Arc<dyn Fn(&Request, TransportError) + Send + Sync>;

enum Task {
    Send(Request),
    Flush(SyncSender<()>),
    Shutdown,
}

/// Sends requests on a worker thread without waiting for the result.
///
/// Failed sends are reported to the error handler.  Requests still queued
/// when the dispatcher is dropped get [`DRAIN_TIMEOUT`] to go out; whatever
/// is left after that is reported as [`TransportError::Disconnected`].
pub(crate) struct Dispatcher {
    sender: SyncSender<Task>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    on_error: ErrorHandler,
    drain_timeout: Duration,
}

impl Dispatcher {
    pub(crate) fn new<E>(
        name: &str,
        transport: Arc<dyn Transport>,
        queue_size: usize,
        on_error: E,
    ) -> Self
    where
        E: Fn(&Request, TransportError) + Send + Sync + 'static,
    {
        let on_error: ErrorHandler = Arc::new(on_error);
        let (sender, receiver) = sync_channel(queue_size.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_worker = shutdown.clone();
        let worker_on_error = on_error.clone();
        let handle = thread::Builder::new()
            .name(format!("beacon-{name}"))
            .spawn(move || {
                for task in receiver.into_iter() {
                    match task {
                        Task::Send(request) => {
                            if shutdown_worker.load(Ordering::SeqCst) {
                                worker_on_error(&request, TransportError::Disconnected);
                            } else if let Err(err) = transport.send(&request) {
                                worker_on_error(&request, err);
                            }
                        }
                        Task::Flush(sender) => {
                            sender.send(()).ok();
                        }
                        Task::Shutdown => return,
                    }
                }
            })
            .ok();

        Dispatcher {
            sender,
            shutdown,
            handle,
            on_error,
            drain_timeout: DRAIN_TIMEOUT,
        }
    }

    /// Sets how long a drop waits for queued requests.
    #[cfg(test)]
    pub(crate) fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Queues a request.
    ///
    /// Never blocks; a full queue drops the request.
    pub(crate) fn dispatch(&self, request: Request) {
        match self.sender.try_send(Task::Send(request)) {
            Ok(()) => {}
            Err(TrySendError::Full(Task::Send(request))) => {
                (self.on_error)(&request, TransportError::QueueFull)
            }
            Err(TrySendError::Disconnected(Task::Send(request))) => {
                (self.on_error)(&request, TransportError::Disconnected)
            }
            Err(_) => {}
        }
    }

    /// Waits until every request queued so far was handed to the transport.
    ///
    /// Returns `false` if that did not happen within `timeout`.
    pub(crate) fn flush(&self, timeout: Duration) -> bool {
        let (sender, receiver) = sync_channel(1);
        if self.sender.send(Task::Flush(sender)).is_err() {
            return false;
        }
        receiver.recv_timeout(timeout).is_ok()
    }

    fn on_worker_thread(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| handle.thread().id() == thread::current().id())
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // the last handle may be released by the error handler itself
        if self.on_worker_thread() {
            self.shutdown.store(true, Ordering::SeqCst);
            let _ = self.sender.try_send(Task::Shutdown);
            return;
        }
        if self.handle.is_some() {
            self.flush(self.drain_timeout);
        }
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.sender.send(Task::Shutdown);
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RumBatch, SessionInfo};
    use crate::test::TestTransport;
    use std::sync::Mutex;
    use std::time::SystemTime;

    fn request() -> Request {
        Request::new(
            "/api/rum/track",
            RumBatch {
                metrics: Vec::new(),
                session: SessionInfo {
                    session_id: crate::random_uuid(),
                    user_id: None,
                    timestamp: SystemTime::now(),
                },
            },
        )
    }

    fn collecting_errors() -> (
        Arc<Mutex<Vec<String>>>,
        impl Fn(&Request, TransportError) + Send + Sync + 'static,
    ) {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen = errors.clone();
        (errors, move |_: &Request, err: TransportError| {
            seen.lock().unwrap().push(err.to_string());
        })
    }

    #[test]
    fn test_flush_waits_for_queued_sends() {
        let transport = TestTransport::new();
        let dispatcher = Dispatcher::new("test", transport.clone(), 30, |_, _| {});
        for _ in 0..5 {
            dispatcher.dispatch(request());
        }
        assert!(dispatcher.flush(Duration::from_secs(5)));
        assert_eq!(transport.fetch_and_clear_requests().len(), 5);
    }

    #[test]
    fn test_failures_reach_error_handler() {
        let transport = TestTransport::new();
        transport.set_failing(true);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen = errors.clone();
        let dispatcher = Dispatcher::new("test", transport.clone(), 30, move |req, err| {
            seen.lock().unwrap().push((req.endpoint.to_string(), err.to_string()));
        });
        dispatcher.dispatch(request());
        assert!(dispatcher.flush(Duration::from_secs(5)));

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "/api/rum/track");
        assert_eq!(errors[0].1, "endpoint responded with status 500");
    }

    #[test]
    fn test_drop_delivers_queued_requests() {
        let transport = TestTransport::new();
        transport.on_send(|_| thread::sleep(Duration::from_millis(50)));
        let (errors, on_error) = collecting_errors();
        let dispatcher = Dispatcher::new("test", transport.clone(), 30, on_error);
        for _ in 0..5 {
            dispatcher.dispatch(request());
        }
        drop(dispatcher);

        assert_eq!(transport.request_count(), 5);
        assert!(errors.lock().unwrap().is_empty());
    }

    #[test]
    fn test_drop_reports_what_it_could_not_deliver() {
        let transport = TestTransport::new();
        transport.on_send(|_| thread::sleep(Duration::from_millis(200)));
        let (errors, on_error) = collecting_errors();
        let dispatcher = Dispatcher::new("test", transport.clone(), 30, on_error)
            .with_drain_timeout(Duration::from_millis(20));
        for _ in 0..5 {
            dispatcher.dispatch(request());
        }
        drop(dispatcher);

        let errors = errors.lock().unwrap();
        assert!(!errors.is_empty());
        assert!(errors.iter().all(|err| err == "transport is shut down"));
        assert_eq!(transport.request_count() + errors.len(), 5);
    }

    #[test]
    fn test_full_queue_is_reported() {
        let transport = TestTransport::new();
        let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
        let gate_rx = Mutex::new(gate_rx);
        transport.on_send(move |_| {
            gate_rx.lock().unwrap().recv().ok();
        });
        let (errors, on_error) = collecting_errors();
        let dispatcher = Dispatcher::new("test", transport.clone(), 1, on_error);

        // one request blocks in the transport, one waits in the queue
        dispatcher.dispatch(request());
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while transport.request_count() == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        dispatcher.dispatch(request());
        dispatcher.dispatch(request());

        assert_eq!(*errors.lock().unwrap(), vec!["send queue is full".to_owned()]);
        drop(gate_tx);
        transport.clear_on_send();
        drop(dispatcher);
        assert_eq!(transport.request_count(), 2);
    }
}
