//! Transport seam.
//!
//! The dispatch layer never touches sockets. It talks to a [`Transport`]
//! that registers services, binds and shuts down, and to one [`Call`] per
//! incoming request or stream.
//!
//! - [`memory`] - in-process transport backed by tokio channels

pub mod memory;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::handler::BoxFuture;
use crate::metadata::Metadata;
use crate::options::Credentials;
use crate::response::Response;
use crate::status::Status;

pub use memory::{MemoryCall, MemoryClient, MemoryTransport, PendingResponse, RequestSink};

/// Shape of a call, derived from the `stream` markers of an `rpc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Unary,
    ClientStreaming,
    ServerStreaming,
    Bidirectional,
}

impl CallKind {
    /// Kind for an `rpc` with the given request/response stream markers.
    pub fn from_streaming(client_streaming: bool, server_streaming: bool) -> Self {
        match (client_streaming, server_streaming) {
            (false, false) => CallKind::Unary,
            (true, false) => CallKind::ClientStreaming,
            (false, true) => CallKind::ServerStreaming,
            (true, true) => CallKind::Bidirectional,
        }
    }

    /// Calls answered with a single response through a callback.
    #[inline]
    pub fn has_callback(self) -> bool {
        matches!(self, CallKind::Unary | CallKind::ClientStreaming)
    }

    /// Calls whose request arrives as a stream of messages.
    #[inline]
    pub fn streams_requests(self) -> bool {
        matches!(self, CallKind::ClientStreaming | CallKind::Bidirectional)
    }

    /// Calls whose response is written as a stream of messages.
    #[inline]
    pub fn streams_responses(self) -> bool {
        matches!(self, CallKind::ServerStreaming | CallKind::Bidirectional)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::Unary => "unary",
            CallKind::ClientStreaming => "client streaming",
            CallKind::ServerStreaming => "server streaming",
            CallKind::Bidirectional => "bidirectional",
        }
    }
}

/// Event on a message stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A message.
    Data(Value),
    /// The peer finished sending.
    End,
    /// The peer failed the stream.
    Error(Status),
}

/// Listener registered on a call's inbound stream.
pub type StreamListener = Arc<dyn Fn(StreamEvent) + Send + Sync>;

/// One incoming call as seen by the dispatch layer.
pub trait Call: Send + Sync {
    /// Call shape.
    fn kind(&self) -> CallKind;

    /// Request message. `Value::Null` for calls with streamed requests.
    fn request(&self) -> &Value;

    /// Request metadata.
    fn metadata(&self) -> &Metadata;

    /// Write a response message (server and bidirectional streams).
    fn write(&self, message: Value) -> BoxFuture<'_, Result<()>>;

    /// Finish the response stream.
    fn end(&self) -> BoxFuture<'_, Result<()>>;

    /// Subscribe to inbound stream events. Events received before the first
    /// subscription are buffered and delivered to it in order.
    fn on(&self, listener: StreamListener);

    /// Fail the response stream with `status`.
    fn emit_error(&self, status: Status) -> BoxFuture<'_, Result<()>>;
}

/// Callback through which unary and client-streaming calls are answered.
pub type Callback = Box<dyn FnOnce(std::result::Result<Response, Status>) + Send>;

/// Per-method entry point registered with a transport.
///
/// The callback is `Some` exactly for kinds where
/// [`CallKind::has_callback`] holds.
pub type TransportHandler =
    Arc<dyn Fn(Arc<dyn Call>, Option<Callback>) -> BoxFuture<'static, ()> + Send + Sync>;

/// A method as declared in the proto file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: String,
    pub client_streaming: bool,
    pub server_streaming: bool,
}

impl MethodDescriptor {
    pub fn kind(&self) -> CallKind {
        CallKind::from_streaming(self.client_streaming, self.server_streaming)
    }
}

/// A service as declared in the proto file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Fully-qualified service name, e.g. `testapp.PersonService`.
    pub full_name: String,
    pub methods: Vec<MethodDescriptor>,
}

impl ServiceDescriptor {
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// RPC transport the server runs on.
pub trait Transport: Send + Sync {
    /// Register the handlers of one service, keyed by method name.
    fn add_service(
        &mut self,
        service: ServiceDescriptor,
        handlers: HashMap<String, TransportHandler>,
    ) -> Result<()>;

    /// Bind to `address` (`host:port`). Returns the bound port.
    fn bind(&mut self, address: &str, credentials: Credentials) -> Result<u16>;

    /// Start serving calls.
    fn start(&mut self) -> Result<()>;

    /// Stop accepting calls and wait for in-flight calls to finish.
    fn shutdown(&self) -> BoxFuture<'_, Result<()>>;

    /// Stop immediately, cancelling in-flight calls.
    fn force_shutdown(&self);
}

/// Receiving half of a message stream.
///
/// Yields `Ok(message)` per message, `Err(status)` once if the peer fails
/// the stream, and ends after [`StreamEvent::End`]. A stream dropped by its
/// sender without an end yields a `CANCELLED` status.
#[derive(Debug)]
pub struct MessageStream {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    finished: bool,
}

impl MessageStream {
    pub fn new(rx: mpsc::UnboundedReceiver<StreamEvent>) -> Self {
        Self {
            rx,
            finished: false,
        }
    }

    /// Next message, or `None` once the stream ended.
    pub async fn message(&mut self) -> Option<std::result::Result<Value, Status>> {
        futures::StreamExt::next(self).await
    }

    /// Drain the stream into a vector, stopping at the first error.
    pub async fn collect_messages(mut self) -> std::result::Result<Vec<Value>, Status> {
        let mut messages = Vec::new();
        while let Some(message) = self.message().await {
            messages.push(message?);
        }
        Ok(messages)
    }
}

impl Stream for MessageStream {
    type Item = std::result::Result<Value, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        let event = match self.rx.poll_recv(cx) {
            Poll::Ready(event) => event,
            Poll::Pending => return Poll::Pending,
        };
        let item = match event {
            Some(StreamEvent::Data(value)) => Some(Ok(value)),
            Some(StreamEvent::End) => {
                self.finished = true;
                None
            }
            Some(StreamEvent::Error(status)) => {
                self.finished = true;
                Some(Err(status))
            }
            None => {
                self.finished = true;
                Some(Err(Status::cancelled("stream closed before end")))
            }
        };
        Poll::Ready(item)
    }
}
