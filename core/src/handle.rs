//! Per-request callback registry and terminal-state guard.
//!
//! # Design
//! A `RequestHandle` is returned as soon as a request is submitted. Its
//! state moves once from `Pending` to `Succeeded` or `Failed`; the first
//! terminal event wins and every later transport event is dropped. The
//! transport's `Exchange` is released at that point.
//!
//! Callbacks are single-slot (the last registration wins) and are always
//! invoked outside the state lock, as is classification, which runs the
//! caller's status validator and file saver. Registering a terminal callback
//! after the request has ended fires it immediately with the recorded
//! outcome, which covers transports that complete before the caller had a
//! chance to register. A registration that lands while the first delivery
//! is still running is queued behind it, so `on_end` always follows
//! `on_success`/`on_error`. Progress is never replayed.
//!
//! On failure the client-wide `ErrorHook`, when configured, runs before
//! the handle's own `on_error`, so both observe every failure.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::classify::{classify, ClassifyContext, TerminalEvent};
use crate::config::ErrorHook;
use crate::http::TransportResponse;
use crate::outcome::{ErrorKind, Failure, Outcome, Progress, Success};
use crate::transport::Exchange;

type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;
type SuccessFn = Box<dyn FnOnce(Success) + Send>;
type ErrorFn = Box<dyn FnOnce(Failure) + Send>;
type EndFn = Box<dyn FnOnce(bool) + Send>;

enum Status {
    Pending,
    /// A terminal event was accepted and is being classified.
    Settling,
    Succeeded(Success),
    Failed(Failure),
}

#[derive(Default)]
struct Callbacks {
    on_progress: Option<ProgressFn>,
    on_success: Option<SuccessFn>,
    on_error: Option<ErrorFn>,
    on_end: Option<EndFn>,
}

impl Callbacks {
    fn has_terminal(&self) -> bool {
        self.on_success.is_some() || self.on_error.is_some() || self.on_end.is_some()
    }

    /// Run the terminal callbacks for `outcome`, `on_end` last.
    fn deliver(self, outcome: &Outcome) {
        match outcome {
            Outcome::Success(success) => {
                if let Some(on_success) = self.on_success {
                    on_success(success.clone());
                }
                if let Some(on_end) = self.on_end {
                    on_end(true);
                }
            }
            Outcome::Failure(failure) => {
                if let Some(on_error) = self.on_error {
                    on_error(failure.clone());
                }
                if let Some(on_end) = self.on_end {
                    on_end(false);
                }
            }
        }
    }
}

struct HandleState {
    status: Status,
    /// Set once the callbacks taken at settlement have all run.
    delivered: bool,
    exchange: Option<Box<dyn Exchange>>,
    abort_requested: bool,
    callbacks: Callbacks,
    /// Registrations made after settlement, before `delivered`.
    queued: Callbacks,
}

impl HandleState {
    /// Only a `Pending` handle accepts transport events and aborts.
    fn accepts_events(&self) -> bool {
        matches!(self.status, Status::Pending)
    }

    /// No outcome recorded yet.
    fn is_pending(&self) -> bool {
        matches!(self.status, Status::Pending | Status::Settling)
    }

    fn register_success(&mut self, f: SuccessFn) -> Option<(SuccessFn, Success)> {
        match &self.status {
            Status::Pending | Status::Settling => {
                self.callbacks.on_success = Some(f);
                None
            }
            Status::Succeeded(_) if !self.delivered => {
                self.queued.on_success = Some(f);
                None
            }
            Status::Succeeded(success) => Some((f, success.clone())),
            Status::Failed(_) => None,
        }
    }

    fn register_error(&mut self, f: ErrorFn) -> Option<(ErrorFn, Failure)> {
        match &self.status {
            Status::Pending | Status::Settling => {
                self.callbacks.on_error = Some(f);
                None
            }
            Status::Failed(_) if !self.delivered => {
                self.queued.on_error = Some(f);
                None
            }
            Status::Failed(failure) => Some((f, failure.clone())),
            Status::Succeeded(_) => None,
        }
    }

    fn register_end(&mut self, f: EndFn) -> Option<(EndFn, bool)> {
        match &self.status {
            Status::Pending | Status::Settling => {
                self.callbacks.on_end = Some(f);
                None
            }
            Status::Succeeded(_) | Status::Failed(_) if !self.delivered => {
                self.queued.on_end = Some(f);
                None
            }
            Status::Succeeded(_) => Some((f, true)),
            Status::Failed(_) => Some((f, false)),
        }
    }

    fn outcome(&self) -> Option<Outcome> {
        match &self.status {
            Status::Pending | Status::Settling => None,
            Status::Succeeded(success) => Some(Outcome::Success(success.clone())),
            Status::Failed(failure) => Some(Outcome::Failure(failure.clone())),
        }
    }
}

struct Shared {
    state: Mutex<HandleState>,
    context: ClassifyContext,
    error_hook: Option<ErrorHook>,
    report_download_progress: bool,
    report_upload_progress: bool,
    outcome: watch::Sender<Option<Outcome>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn progress(&self, progress: Progress) {
        let callback = {
            let state = self.lock();
            if !state.accepts_events() {
                tracing::trace!(url = %self.context.url, "ignoring progress after termination");
                return;
            }
            state.callbacks.on_progress.clone()
        };
        if let Some(callback) = callback {
            callback(progress);
        }
    }

    fn settle(&self, event: TerminalEvent) {
        {
            let mut state = self.lock();
            if !state.accepts_events() {
                tracing::trace!(url = %self.context.url, ?event, "ignoring event after termination");
                return;
            }
            state.status = Status::Settling;
        }

        let outcome = classify(event, &self.context);

        let (callbacks, exchange) = {
            let mut state = self.lock();
            state.status = match &outcome {
                Outcome::Success(success) => Status::Succeeded(success.clone()),
                Outcome::Failure(failure) => Status::Failed(failure.clone()),
            };
            (std::mem::take(&mut state.callbacks), state.exchange.take())
        };

        match &outcome {
            Outcome::Success(success) => {
                tracing::debug!(url = %self.context.url, status = success.status, "request succeeded");
            }
            Outcome::Failure(failure) => {
                tracing::debug!(
                    url = %self.context.url,
                    status = failure.status,
                    code = failure.code(),
                    "request failed: {}",
                    failure.kind
                );
                if let Some(hook) = &self.error_hook {
                    hook.call(failure);
                }
            }
        }
        callbacks.deliver(&outcome);

        loop {
            let queued = {
                let mut state = self.lock();
                if !state.queued.has_terminal() {
                    state.delivered = true;
                    break;
                }
                std::mem::take(&mut state.queued)
            };
            queued.deliver(&outcome);
        }

        drop(exchange);
        self.outcome.send_replace(Some(outcome));
    }
}

/// Chainable subscription surface for one submitted request.
///
/// Cloning yields another handle to the same request.
#[derive(Clone)]
pub struct RequestHandle {
    shared: Arc<Shared>,
}

impl RequestHandle {
    pub(crate) fn new(
        context: ClassifyContext,
        error_hook: Option<ErrorHook>,
        report_download_progress: bool,
        report_upload_progress: bool,
    ) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(HandleState {
                    status: Status::Pending,
                    delivered: false,
                    exchange: None,
                    abort_requested: false,
                    callbacks: Callbacks::default(),
                    queued: Callbacks::default(),
                }),
                context,
                error_hook,
                report_download_progress,
                report_upload_progress,
                outcome,
            }),
        }
    }

    /// Event sink handed to the transport.
    pub(crate) fn events(&self) -> TransportEvents {
        TransportEvents {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Keep the transport's exchange until the request ends.
    pub(crate) fn attach(&self, mut exchange: Box<dyn Exchange>) {
        let abort_now = {
            let state = self.shared.lock();
            if !state.accepts_events() {
                return;
            }
            state.abort_requested
        };
        if abort_now && !exchange.is_done() {
            exchange.abort();
        }
        let mut state = self.shared.lock();
        if state.accepts_events() {
            state.exchange = Some(exchange);
        }
    }

    /// Receive progress as a percentage, or `Progress::Unknown` when the
    /// total size is not known.
    pub fn on_progress(&self, f: impl Fn(Progress) + Send + Sync + 'static) -> &Self {
        self.shared.lock().callbacks.on_progress = Some(Arc::new(f));
        self
    }

    pub fn on_success(&self, f: impl FnOnce(Success) + Send + 'static) -> &Self {
        let replay = self.shared.lock().register_success(Box::new(f));
        if let Some((f, success)) = replay {
            f(success);
        }
        self
    }

    pub fn on_error(&self, f: impl FnOnce(Failure) + Send + 'static) -> &Self {
        let replay = self.shared.lock().register_error(Box::new(f));
        if let Some((f, failure)) = replay {
            f(failure);
        }
        self
    }

    /// Called after `on_success` or `on_error` with whether the request
    /// succeeded.
    pub fn on_end(&self, f: impl FnOnce(bool) + Send + 'static) -> &Self {
        let replay = self.shared.lock().register_end(Box::new(f));
        if let Some((f, was_success)) = replay {
            f(was_success);
        }
        self
    }

    /// Ask the transport to cancel.
    ///
    /// A no-op once the request has ended or the exchange reports done.
    /// The `Canceled` failure arrives through the normal event path.
    pub fn abort(&self) {
        let exchange = {
            let mut state = self.shared.lock();
            if !state.accepts_events() {
                return;
            }
            state.abort_requested = true;
            state.exchange.take()
        };
        let Some(mut exchange) = exchange else {
            return;
        };
        if !exchange.is_done() {
            tracing::debug!(url = %self.shared.context.url, "aborting request");
            exchange.abort();
        }
        let mut state = self.shared.lock();
        if state.accepts_events() && state.exchange.is_none() {
            state.exchange = Some(exchange);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.shared.lock().is_pending()
    }

    /// The terminal outcome, once there is one.
    pub fn outcome(&self) -> Option<Outcome> {
        self.shared.lock().outcome()
    }

    /// Resolve once the request reaches its terminal outcome.
    pub async fn wait(&self) -> Outcome {
        let mut rx = self.shared.outcome.subscribe();
        let settled = match rx.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        // The sender lives in `shared`, which `self` keeps alive.
        settled.unwrap_or_else(|| Outcome::Failure(Failure::new(ErrorKind::Unknown, 0)))
    }

    pub fn url(&self) -> &str {
        &self.shared.context.url
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("url", &self.shared.context.url)
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Event sink a `Transport` reports an exchange through.
///
/// Progress and upload-error events are dropped unless the request asked
/// for them. Anything after the first terminal event is dropped.
#[derive(Clone)]
pub struct TransportEvents {
    shared: Arc<Shared>,
}

impl TransportEvents {
    /// A complete response was received.
    pub fn loaded(&self, response: TransportResponse) {
        self.shared.settle(TerminalEvent::Loaded(response));
    }

    /// The exchange failed before an HTTP response completed.
    pub fn network_error(&self, status: u16) {
        self.shared.settle(TerminalEvent::NetworkError(status));
    }

    pub fn timed_out(&self, status: u16) {
        self.shared.settle(TerminalEvent::TimedOut(status));
    }

    pub fn aborted(&self, status: u16) {
        self.shared.settle(TerminalEvent::Aborted(status));
    }

    pub fn download_progress(&self, loaded: u64, total: Option<u64>) {
        if self.shared.report_download_progress {
            self.shared.progress(Progress::from_counts(loaded, total));
        }
    }

    pub fn upload_progress(&self, loaded: u64, total: Option<u64>) {
        if self.shared.report_upload_progress {
            self.shared.progress(Progress::from_counts(loaded, total));
        }
    }

    pub fn upload_error(&self, status: u16) {
        if self.shared.report_upload_progress {
            self.shared.settle(TerminalEvent::NetworkError(status));
        }
    }
}

impl fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportEvents")
            .field("url", &self.shared.context.url)
            .finish()
    }
}
