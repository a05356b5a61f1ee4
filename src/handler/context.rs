//! Call context for handlers.
//!
//! Wraps the transport's call and holds the response slot shared by every
//! step of one chain execution:
//! - `send` - set (or replace) the response
//! - `write` / `end` - stream response messages
//! - `on` / `incoming` - consume streamed request messages
//! - `emit_error` - fail a response stream
//!
//! # Example
//!
//! ```ignore
//! async fn sum(ctx: Arc<CallContext>) -> HandlerResult<Value> {
//!     let mut incoming = ctx.incoming();
//!     let mut total = 0;
//!     while let Some(message) = incoming.message().await {
//!         total += message?["value"].as_i64().unwrap_or(0);
//!     }
//!     Ok(json!({ "total": total }))
//! }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use super::HandlerResult;
use crate::error::Result;
use crate::metadata::Metadata;
use crate::response::Response;
use crate::status::Status;
use crate::transport::{Call, CallKind, MessageStream, StreamEvent};

/// Context passed to middleware, method implementations and error handlers.
///
/// One context is created per call and shared (behind an `Arc`) by every
/// step of the chain. The last response sent wins.
pub struct CallContext {
    /// Underlying transport call.
    call: Arc<dyn Call>,
    /// Fully-qualified method name, e.g. `testapp.PersonService.getPerson`.
    method_name: String,
    /// Response slot.
    response: Mutex<Option<Response>>,
}

impl CallContext {
    /// Create a context for `call`.
    pub fn new(call: Arc<dyn Call>, method_name: impl Into<String>) -> Self {
        Self {
            call,
            method_name: method_name.into(),
            response: Mutex::new(None),
        }
    }

    /// Request message. `Value::Null` for calls with streamed requests.
    #[inline]
    pub fn request(&self) -> &Value {
        self.call.request()
    }

    /// Decode the request message.
    ///
    /// Fails with `INVALID_ARGUMENT` when the message does not match `T`.
    pub fn request_as<T: DeserializeOwned>(&self) -> HandlerResult<T> {
        T::deserialize(self.call.request())
            .map_err(|e| Status::invalid_argument(format!("Invalid request: {e}")))
    }

    /// Request metadata.
    #[inline]
    pub fn metadata(&self) -> &Metadata {
        self.call.metadata()
    }

    #[inline]
    pub fn kind(&self) -> CallKind {
        self.call.kind()
    }

    #[inline]
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// The underlying transport call.
    pub fn call(&self) -> &Arc<dyn Call> {
        &self.call
    }

    /// Set the response, replacing any earlier one.
    ///
    /// A raw `serde_json::Value` is wrapped in a [`Response`].
    pub fn send(&self, response: impl Into<Response>) {
        *self.response.lock() = Some(response.into());
    }

    /// Set the response with metadata.
    pub fn send_with_metadata(&self, message: impl Into<Value>, metadata: Metadata) {
        self.send(Response::with_metadata(message, metadata));
    }

    /// Current response, if any step sent one.
    pub fn response(&self) -> Option<Response> {
        self.response.lock().clone()
    }

    pub fn has_response(&self) -> bool {
        self.response.lock().is_some()
    }

    /// Serialize and write a response message.
    pub async fn write<T: Serialize>(&self, message: &T) -> Result<()> {
        let value = serde_json::to_value(message)?;
        self.call.write(value).await
    }

    /// Write a response message.
    pub async fn write_value(&self, message: Value) -> Result<()> {
        self.call.write(message).await
    }

    /// Finish the response stream.
    pub async fn end(&self) -> Result<()> {
        self.call.end().await
    }

    /// Subscribe to streamed request messages.
    pub fn on<F>(&self, listener: F)
    where
        F: Fn(StreamEvent) + Send + Sync + 'static,
    {
        self.call.on(Arc::new(listener));
    }

    /// Streamed request messages as a [`MessageStream`].
    pub fn incoming(&self) -> MessageStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.on(move |event| {
            let _ = tx.send(event);
        });
        MessageStream::new(rx)
    }

    /// Fail the response stream.
    pub async fn emit_error(&self, status: Status) -> Result<()> {
        self.call.emit_error(status).await
    }
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("method_name", &self.method_name)
            .field("kind", &self.call.kind())
            .field("has_response", &self.has_response())
            .finish()
    }
}
