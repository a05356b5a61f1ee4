//! One-shot result container bridging async handler chains to a
//! transport's callback contract.
//!
//! A [`Completion`] settles exactly once, either resolved with a value or
//! rejected with a [`Status`]. Settling invokes the callback it was built
//! with (if any) and wakes everything awaiting [`Completion::wait`].
//!
//! ```ignore
//! let completion = Completion::new(|outcome| match outcome {
//!     Ok(response) => transport_reply(response),
//!     Err(status) => transport_fail(status),
//! });
//! completion.resolve(Response::new(json!({"ok": true})))?;
//! assert!(completion.resolve(Response::empty()).is_err());
//! ```

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{CondorError, Result};
use crate::status::Status;

/// Callback invoked once with the settled outcome.
pub type CompletionCallback<T> = Box<dyn FnOnce(std::result::Result<T, Status>) + Send>;

enum State<T> {
    Pending,
    Resolved(T),
    Rejected(Status),
}

/// Settle-once container for a call outcome.
pub struct Completion<T> {
    state: Mutex<State<T>>,
    callback: Mutex<Option<CompletionCallback<T>>>,
    done: watch::Sender<bool>,
}

impl<T: Clone + Send + 'static> Completion<T> {
    /// Create a completion that invokes `callback` when settled.
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(std::result::Result<T, Status>) + Send + 'static,
    {
        Self::build(Some(Box::new(callback)))
    }

    /// Create a completion without a callback; observe it with
    /// [`wait`](Self::wait).
    pub fn detached() -> Self {
        Self::build(None)
    }

    fn build(callback: Option<CompletionCallback<T>>) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            state: Mutex::new(State::Pending),
            callback: Mutex::new(callback),
            done,
        }
    }

    /// Resolve with `value`.
    ///
    /// Fails with [`CondorError::AlreadyResolved`] if already settled.
    pub fn resolve(&self, value: T) -> Result<()> {
        {
            let mut state = self.state.lock();
            if !matches!(*state, State::Pending) {
                return Err(CondorError::AlreadyResolved);
            }
            *state = State::Resolved(value.clone());
        }
        self.settle(Ok(value));
        Ok(())
    }

    /// Reject with `error`.
    ///
    /// Anything convertible into a [`Status`] is accepted: a status, a
    /// code, a numeric code, a message or a [`CondorError`]. Missing code
    /// and message are filled with `INTERNAL` and
    /// `"Internal Server Error"`.
    pub fn reject(&self, error: impl Into<Status>) -> Result<()> {
        let status = error.into().normalized();
        {
            let mut state = self.state.lock();
            if !matches!(*state, State::Pending) {
                return Err(CondorError::AlreadyResolved);
            }
            *state = State::Rejected(status.clone());
        }
        self.settle(Err(status));
        Ok(())
    }

    fn settle(&self, outcome: std::result::Result<T, Status>) {
        // Taken outside the state lock so the callback may inspect us.
        let callback = self.callback.lock().take();
        if let Some(callback) = callback {
            callback(outcome);
        }
        self.done.send_replace(true);
    }

    /// True once resolved or rejected.
    pub fn is_done(&self) -> bool {
        !matches!(*self.state.lock(), State::Pending)
    }

    /// True if rejected.
    pub fn has_error(&self) -> bool {
        matches!(*self.state.lock(), State::Rejected(_))
    }

    /// Resolved value, `None` if rejected.
    ///
    /// Fails with [`CondorError::NotDone`] while pending.
    pub fn result(&self) -> Result<Option<T>> {
        match &*self.state.lock() {
            State::Pending => Err(CondorError::NotDone),
            State::Resolved(value) => Ok(Some(value.clone())),
            State::Rejected(_) => Ok(None),
        }
    }

    /// Rejection status, `None` if resolved.
    ///
    /// Fails with [`CondorError::NotDone`] while pending.
    pub fn error(&self) -> Result<Option<Status>> {
        match &*self.state.lock() {
            State::Pending => Err(CondorError::NotDone),
            State::Resolved(_) => Ok(None),
            State::Rejected(status) => Ok(Some(status.clone())),
        }
    }

    /// Wait until settled and return the outcome.
    pub async fn wait(&self) -> std::result::Result<T, Status> {
        let mut rx = self.done.subscribe();
        // The sender lives in self, so the channel cannot close while we wait.
        let _ = rx.wait_for(|done| *done).await;
        match &*self.state.lock() {
            State::Resolved(value) => Ok(value.clone()),
            State::Rejected(status) => Err(status.clone()),
            State::Pending => Err(Status::internal(CondorError::NotDone.to_string())),
        }
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.state.lock() {
            State::Pending => "pending",
            State::Resolved(_) => "resolved",
            State::Rejected(_) => "rejected",
        };
        f.debug_struct("Completion").field("state", &state).finish()
    }
}
