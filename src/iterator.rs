//! Chain executor ("function iterator").
//!
//! Runs the scoped middleware of one call in registration order, then the
//! method implementation, and routes any failure through the scoped error
//! handlers.
//!
//! # Chain rules
//!
//! - A response in the context stops the chain; later `next` calls resolve
//!   to it.
//! - A middleware continues the chain through [`Next::run`]. Returning
//!   without a response and without calling `next` stops the chain with no
//!   response.
//! - The implementation runs at most once, after the last middleware. Its
//!   reply is sent unless a response is already set.
//! - A failure (error return or panic) enters the error handlers at index 0.
//!   An error handler heals the error by sending a response, passes it on
//!   with `next.run()`, replaces it with `next.fail(other)` (which restarts
//!   the scan at index 0 unless `other` already went through the scan) or
//!   fails, making its failure the error seen by the following handler.
//! - An error that went through the error handlers is not handled again as
//!   it propagates back up through enclosing middleware. This tracks the
//!   escaped status itself: a new status raised by a middleware is handled
//!   even when it equals one that escaped earlier.
//! - [`FunctionIterator::run`] runs the chain once; calling it again
//!   resolves to the first outcome.
//!
//! ```text
//! mw[0] ─next─► mw[1] ─next─► ... ─next─► implementation
//!   │             │                         │
//!   └──── failure ┴─────────────────────────┘
//!                 ▼
//!   err[0] ─next─► err[1] ─next─► ... ─► NoResponseAfterErrorHandled
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{FutureExt, Shared, WeakShared};
use parking_lot::Mutex;

use crate::handler::{BoxFuture, CallContext, ErrorHandler, HandlerResult, MethodHandler, Middleware};
use crate::response::Response;
use crate::scope::ScopedEntry;
use crate::status::Status;

/// Outcome of a chain step: the response (if any step sent one) or the
/// error that escaped the error handlers.
pub type ChainResult = std::result::Result<Option<Response>, Status>;

type SharedOutcome = Shared<BoxFuture<'static, ChainResult>>;

/// How the error scan reached its current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arrival {
    /// Fresh error entering the handlers.
    Raised,
    /// The previous handler passed the error on with a plain `next()`.
    Consumed,
    /// The previous handler failed or passed an error to `next`.
    Forwarded,
}

#[derive(Debug, Default)]
struct IteratorState {
    /// Number of chain positions entered (the implementation is position
    /// `middleware.len()`).
    middleware_index: usize,
    /// Error handler currently running.
    error_handler_index: usize,
    /// Errors that entered the error-handler scan at index 0.
    scanned: Vec<Status>,
    /// Escape ids of errors that went through the error handlers unhealed.
    settled: Vec<u64>,
}

/// Per-call chain executor.
pub struct FunctionIterator {
    middleware: Arc<[ScopedEntry<dyn Middleware>]>,
    error_handlers: Arc<[ScopedEntry<dyn ErrorHandler>]>,
    context: Arc<CallContext>,
    implementation: Arc<dyn MethodHandler>,
    state: Mutex<IteratorState>,
    /// Outcome of the whole chain, shared by every `run`.
    root: Mutex<Option<Root>>,
}

enum Root {
    /// Held weakly: the chain future owns the iterator.
    Pending(WeakShared<BoxFuture<'static, ChainResult>>),
    Done(ChainResult),
}

impl FunctionIterator {
    /// Create an executor for one call.
    pub fn new(
        middleware: Arc<[ScopedEntry<dyn Middleware>]>,
        error_handlers: Arc<[ScopedEntry<dyn ErrorHandler>]>,
        context: Arc<CallContext>,
        implementation: Arc<dyn MethodHandler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            middleware,
            error_handlers,
            context,
            implementation,
            state: Mutex::new(IteratorState::default()),
            root: Mutex::new(None),
        })
    }

    /// Run the chain from the first middleware.
    ///
    /// A chain that ends without any response resolves to
    /// [`Response::empty`]. The chain runs once; later calls resolve to the
    /// same outcome.
    pub async fn run(self: Arc<Self>) -> std::result::Result<Response, Status> {
        let method = self.context.method_name().to_string();
        let root = {
            let mut slot = self.root.lock();
            match slot.as_ref() {
                Some(Root::Done(outcome)) => Err(outcome.clone()),
                Some(Root::Pending(weak)) => weak
                    .upgrade()
                    .ok_or_else(|| Err(Status::cancelled("chain was cancelled"))),
                None => {
                    let root = self.clone().step(0).shared();
                    *slot = root.downgrade().map(Root::Pending);
                    Ok(root)
                }
            }
        };
        let outcome = match root {
            Ok(root) => {
                let outcome = root.await;
                *self.root.lock() = Some(Root::Done(outcome.clone()));
                outcome
            }
            Err(outcome) => outcome,
        };
        match outcome {
            Ok(Some(response)) => Ok(response),
            Ok(None) => {
                tracing::debug!("Chain for {} ended without a response", method);
                Ok(Response::empty())
            }
            Err(status) => Err(status),
        }
    }

    /// The call context shared by every step.
    pub fn context(&self) -> &Arc<CallContext> {
        &self.context
    }

    /// Number of chain positions entered so far.
    pub fn middleware_index(&self) -> usize {
        self.state.lock().middleware_index
    }

    /// Index of the error handler that ran last.
    pub fn error_handler_index(&self) -> usize {
        self.state.lock().error_handler_index
    }

    fn step(self: Arc<Self>, pos: usize) -> BoxFuture<'static, ChainResult> {
        Box::pin(async move {
            if let Some(response) = self.context.response() {
                return Ok(Some(response));
            }

            let stale = {
                let mut state = self.state.lock();
                let stale = pos < state.middleware_index;
                if !stale {
                    state.middleware_index = pos + 1;
                }
                stale
            };
            if stale || pos > self.middleware.len() {
                return Ok(self.context.response());
            }

            if let Some(entry) = self.middleware.get(pos).cloned() {
                tracing::trace!(
                    "{}: middleware {} (scope {})",
                    self.context.method_name(),
                    pos,
                    entry.scope
                );
                let next = Next::new(self.clone(), Lane::Middleware(pos + 1));
                let downstream = next.outcome.clone();
                let ctx = self.context.clone();
                let result = contain(move || entry.handler.call(ctx, next)).await;

                return match result {
                    Ok(()) => {
                        if let Some(response) = self.context.response() {
                            return Ok(Some(response));
                        }
                        let pending = downstream.lock().clone();
                        match pending {
                            Some(outcome) => outcome.await,
                            None => Ok(None),
                        }
                    }
                    Err(error) => self.raise(error).await,
                };
            }

            tracing::trace!("{}: implementation", self.context.method_name());
            let implementation = self.implementation.clone();
            let ctx = self.context.clone();
            match contain(move || implementation.call(ctx)).await {
                Ok(response) => {
                    if !self.context.has_response() {
                        self.context.send(response);
                    }
                    Ok(self.context.response())
                }
                Err(error) => self.raise(error).await,
            }
        })
    }

    /// Route a failure through the error handlers, unless it already went
    /// through them.
    fn raise(self: Arc<Self>, error: Status) -> BoxFuture<'static, ChainResult> {
        Box::pin(async move {
            let seen = error
                .escape_id()
                .is_some_and(|id| self.state.lock().settled.contains(&id));
            if seen {
                return Err(error);
            }

            tracing::debug!("{}: error raised: {}", self.context.method_name(), error);
            self.state.lock().scanned.push(error.clone());
            match self.clone().error_scan(0, error, Arrival::Raised).await {
                Err(escaped) => {
                    let id = NEXT_ESCAPE_ID.fetch_add(1, Ordering::Relaxed);
                    self.state.lock().settled.push(id);
                    Err(escaped.with_escape_id(id))
                }
                outcome => outcome,
            }
        })
    }

    fn error_scan(
        self: Arc<Self>,
        start: usize,
        error: Status,
        arrival: Arrival,
    ) -> BoxFuture<'static, ChainResult> {
        Box::pin(async move {
            let mut index = start;
            let mut error = error;
            let mut arrival = arrival;

            loop {
                if let Some(response) = self.context.response() {
                    return Ok(Some(response));
                }
                self.state.lock().error_handler_index = index;

                let Some(entry) = self.error_handlers.get(index).cloned() else {
                    return match arrival {
                        Arrival::Consumed => Err(no_response_status()),
                        Arrival::Raised | Arrival::Forwarded => Err(error),
                    };
                };

                let next = Next::new(
                    self.clone(),
                    Lane::ErrorHandler {
                        index,
                        error: error.clone(),
                    },
                );
                let downstream = next.outcome.clone();
                let ctx = self.context.clone();
                let current = error.clone();
                let result = contain(move || entry.handler.call(current, ctx, next)).await;

                if let Some(response) = self.context.response() {
                    tracing::debug!(
                        "{}: error healed by handler {}",
                        self.context.method_name(),
                        index
                    );
                    return Ok(Some(response));
                }

                let pending = downstream.lock().clone();
                match (result, pending) {
                    (Ok(()), Some(outcome)) => return outcome.await,
                    (Ok(()), None) => return Err(no_response_status()),
                    (Err(thrown), None) => {
                        error = thrown;
                        index += 1;
                        arrival = Arrival::Forwarded;
                    }
                    (Err(thrown), Some(_)) => return Err(thrown),
                }
            }
        })
    }

    /// Continuation of error handler `index` after `next.fail(error)`.
    fn forward(self: Arc<Self>, index: usize, current: Status, error: Status) -> BoxFuture<'static, ChainResult> {
        if error == current {
            return self.error_scan(index + 1, error, Arrival::Forwarded);
        }

        let restart = {
            let mut state = self.state.lock();
            let fresh = !state.scanned.contains(&error);
            if fresh {
                state.scanned.push(error.clone());
            }
            fresh
        };
        if restart {
            tracing::debug!(
                "{}: error handler {} replaced the error, restarting",
                self.context.method_name(),
                index
            );
            self.error_scan(0, error, Arrival::Raised)
        } else {
            self.error_scan(index + 1, error, Arrival::Forwarded)
        }
    }
}

impl std::fmt::Debug for FunctionIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FunctionIterator")
            .field("method", &self.context.method_name())
            .field("middleware", &self.middleware.len())
            .field("error_handlers", &self.error_handlers.len())
            .field("middleware_index", &state.middleware_index)
            .field("error_handler_index", &state.error_handler_index)
            .finish()
    }
}

#[derive(Debug, Clone)]
enum Lane {
    /// Continue with the chain position.
    Middleware(usize),
    /// Continue after error handler `index`, which received `error`.
    ErrorHandler { index: usize, error: Status },
}

/// Continuation handed to middleware and error handlers.
///
/// The first call to [`run`](Self::run) or [`fail`](Self::fail) decides the
/// continuation; later calls (on this handle or its clones) resolve to the
/// same outcome without running anything again.
#[derive(Clone)]
pub struct Next {
    iterator: Arc<FunctionIterator>,
    lane: Lane,
    outcome: Arc<Mutex<Option<SharedOutcome>>>,
}

impl Next {
    fn new(iterator: Arc<FunctionIterator>, lane: Lane) -> Self {
        Self {
            iterator,
            lane,
            outcome: Arc::new(Mutex::new(None)),
        }
    }

    /// Continue the chain.
    ///
    /// From a middleware this runs the rest of the chain; from an error
    /// handler it passes the error to the following handler.
    pub fn run(&self) -> impl Future<Output = ChainResult> + Send + 'static {
        self.continue_with(None)
    }

    /// Continue with an error.
    ///
    /// From a middleware this enters the error handlers. From an error
    /// handler it passes `error` on, restarting the scan when it differs
    /// from the error being handled.
    pub fn fail(&self, error: impl Into<Status>) -> impl Future<Output = ChainResult> + Send + 'static {
        self.continue_with(Some(error.into()))
    }

    /// True once `run` or `fail` was called.
    pub fn is_called(&self) -> bool {
        self.outcome.lock().is_some()
    }

    fn continue_with(&self, error: Option<Status>) -> SharedOutcome {
        let mut slot = self.outcome.lock();
        if let Some(outcome) = slot.as_ref() {
            return outcome.clone();
        }

        let iterator = self.iterator.clone();
        let fut: BoxFuture<'static, ChainResult> = match (&self.lane, error) {
            (Lane::Middleware(pos), None) => iterator.step(*pos),
            (Lane::Middleware(_), Some(error)) => iterator.raise(error),
            (Lane::ErrorHandler { index, error: current }, None) => {
                iterator.error_scan(index + 1, current.clone(), Arrival::Consumed)
            }
            (Lane::ErrorHandler { index, error: current }, Some(error)) => {
                iterator.forward(*index, current.clone(), error)
            }
        };
        let outcome = fut.shared();
        *slot = Some(outcome.clone());
        outcome
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("lane", &self.lane)
            .field("called", &self.is_called())
            .finish()
    }
}

/// Source of escape ids, unique across chains.
static NEXT_ESCAPE_ID: AtomicU64 = AtomicU64::new(1);

fn no_response_status() -> Status {
    Status::no_response_after_error_handled()
}

/// Invoke a user step, turning panics (while building or polling its
/// future) into `INTERNAL` errors.
async fn contain<T, F>(invoke: F) -> HandlerResult<T>
where
    F: FnOnce() -> BoxFuture<'static, HandlerResult<T>>,
{
    let fut = match std::panic::catch_unwind(AssertUnwindSafe(invoke)) {
        Ok(fut) => fut,
        Err(panic) => return Err(panic_status(panic)),
    };
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(panic_status(panic)),
    }
}

fn panic_status(panic: Box<dyn Any + Send>) -> Status {
    let message = if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    tracing::warn!("Handler panicked: {}", message);
    Status::internal(format!("handler panicked: {message}"))
}
