//! In-process transport backed by tokio channels.
//!
//! Calls are handed over as `serde_json::Value` messages without any
//! framing. Each call runs in its own task; the transport counts in-flight
//! calls so a graceful shutdown can wait for them, and keeps their task
//! handles so a forced shutdown can abort them.
//!
//! ```text
//! MemoryClient ──route──► TransportHandler ──spawn──► call task
//!      ▲                                                 │
//!      └──── oneshot (callback) / mpsc (stream) ◄────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! let transport = MemoryTransport::new();
//! let client = transport.client();
//! condor.start(transport)?;
//!
//! let person = client.unary("testapp.PersonService.getPerson", json!({"id": 1})).await?;
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::{
    Call, CallKind, Callback, MessageStream, ServiceDescriptor, StreamEvent, StreamListener,
    Transport, TransportHandler,
};
use crate::error::{CondorError, Result};
use crate::handler::BoxFuture;
use crate::metadata::Metadata;
use crate::options::Credentials;
use crate::response::Response;
use crate::status::Status;

/// First port handed out when binding to port 0.
const EPHEMERAL_PORT_START: u16 = 49152;

static NEXT_EPHEMERAL_PORT: AtomicU16 = AtomicU16::new(EPHEMERAL_PORT_START);

// ============================================================================
// Call
// ============================================================================

#[derive(Default)]
struct Inbound {
    listeners: Vec<StreamListener>,
    backlog: VecDeque<StreamEvent>,
    flushing: bool,
}

/// One in-process call.
pub struct MemoryCall {
    kind: CallKind,
    request: Value,
    metadata: Metadata,
    /// Response stream; taken by `end`.
    outbound: Mutex<Option<mpsc::UnboundedSender<StreamEvent>>>,
    /// Request stream events and their listeners.
    inbound: Mutex<Inbound>,
}

impl MemoryCall {
    /// Create a call and the receiving half of its response stream.
    pub fn new(kind: CallKind, request: Value, metadata: Metadata) -> (Self, MessageStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let call = Self {
            kind,
            request,
            metadata,
            outbound: Mutex::new(Some(tx)),
            inbound: Mutex::new(Inbound::default()),
        };
        (call, MessageStream::new(rx))
    }

    /// A unary call whose response stream is discarded.
    pub fn unary(request: Value) -> Self {
        Self::new(CallKind::Unary, request, Metadata::new()).0
    }

    /// Deliver a request stream event to the listeners, buffering it while
    /// there are none.
    pub fn deliver(&self, event: StreamEvent) {
        let mut inbound = self.inbound.lock();
        inbound.backlog.push_back(event);
        if inbound.listeners.is_empty() || inbound.flushing {
            return;
        }
        inbound.flushing = true;
        drop(inbound);
        self.flush();
    }

    /// Close the response stream without an end marker.
    fn abandon(&self) {
        self.outbound.lock().take();
    }

    fn flush(&self) {
        loop {
            let (event, listeners) = {
                let mut inbound = self.inbound.lock();
                match inbound.backlog.pop_front() {
                    Some(event) => (event, inbound.listeners.clone()),
                    None => {
                        inbound.flushing = false;
                        return;
                    }
                }
            };
            for listener in &listeners {
                listener(event.clone());
            }
        }
    }

    fn send_outbound(&self, event: StreamEvent) -> Result<()> {
        let outbound = self.outbound.lock();
        let tx = outbound.as_ref().ok_or(CondorError::StreamClosed)?;
        tx.send(event).map_err(|_| CondorError::StreamClosed)
    }
}

impl Call for MemoryCall {
    fn kind(&self) -> CallKind {
        self.kind
    }

    fn request(&self) -> &Value {
        &self.request
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn write(&self, message: Value) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.kind.streams_responses() {
                return Err(CondorError::StreamClosed);
            }
            self.send_outbound(StreamEvent::Data(message))
        })
    }

    fn end(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let tx = self.outbound.lock().take().ok_or(CondorError::StreamClosed)?;
            tx.send(StreamEvent::End)
                .map_err(|_| CondorError::StreamClosed)
        })
    }

    fn on(&self, listener: StreamListener) {
        let mut inbound = self.inbound.lock();
        inbound.listeners.push(listener);
        if inbound.flushing || inbound.backlog.is_empty() {
            return;
        }
        inbound.flushing = true;
        drop(inbound);
        self.flush();
    }

    fn emit_error(&self, status: Status) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.send_outbound(StreamEvent::Error(status)) })
    }
}

impl std::fmt::Debug for MemoryCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCall")
            .field("kind", &self.kind)
            .field("open", &self.outbound.lock().is_some())
            .finish()
    }
}

// ============================================================================
// Transport
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Bound,
    Serving,
    Draining,
    Stopped,
}

struct Route {
    kind: CallKind,
    handler: TransportHandler,
}

struct Inner {
    routes: RwLock<HashMap<String, Route>>,
    lifecycle: Mutex<Lifecycle>,
    address: Mutex<Option<String>>,
    credentials: Mutex<Option<Credentials>>,
    in_flight: watch::Sender<usize>,
    tasks: Mutex<HashMap<u64, JoinHandle<()>>>,
    next_task_id: AtomicU64,
}

/// In-process [`Transport`].
///
/// Cloning shares the same transport, so a clone kept before handing the
/// transport to the server can still create clients.
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                routes: RwLock::new(HashMap::new()),
                lifecycle: Mutex::new(Lifecycle::Idle),
                address: Mutex::new(None),
                credentials: Mutex::new(None),
                in_flight,
                tasks: Mutex::new(HashMap::new()),
                next_task_id: AtomicU64::new(0),
            }),
        }
    }

    /// Create a client calling into this transport.
    pub fn client(&self) -> MemoryClient {
        MemoryClient {
            inner: self.inner.clone(),
        }
    }

    /// Address passed to `bind`.
    pub fn address(&self) -> Option<String> {
        self.inner.address.lock().clone()
    }

    /// Credentials passed to `bind`.
    pub fn credentials(&self) -> Option<Credentials> {
        self.inner.credentials.lock().clone()
    }

    /// Registered method paths (`package.Service.method`), sorted.
    pub fn routes(&self) -> Vec<String> {
        let mut routes: Vec<String> = self.inner.routes.read().keys().cloned().collect();
        routes.sort_unstable();
        routes
    }

    /// Calls currently running.
    pub fn in_flight(&self) -> usize {
        *self.inner.in_flight.borrow()
    }

    pub fn is_serving(&self) -> bool {
        *self.inner.lifecycle.lock() == Lifecycle::Serving
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("lifecycle", &*self.inner.lifecycle.lock())
            .field("address", &*self.inner.address.lock())
            .field("routes", &self.inner.routes.read().len())
            .finish()
    }
}

impl Transport for MemoryTransport {
    fn add_service(
        &mut self,
        service: ServiceDescriptor,
        mut handlers: HashMap<String, TransportHandler>,
    ) -> Result<()> {
        if *self.inner.lifecycle.lock() != Lifecycle::Idle {
            return Err(CondorError::Transport(format!(
                "cannot add {} after bind",
                service.full_name
            )));
        }

        let mut routes = self.inner.routes.write();
        for method in &service.methods {
            let Some(handler) = handlers.remove(&method.name) else {
                continue;
            };
            routes.insert(
                format!("{}.{}", service.full_name, method.name),
                Route {
                    kind: method.kind(),
                    handler,
                },
            );
        }
        Ok(())
    }

    fn bind(&mut self, address: &str, credentials: Credentials) -> Result<u16> {
        let mut lifecycle = self.inner.lifecycle.lock();
        if *lifecycle != Lifecycle::Idle {
            return Err(CondorError::Transport("already bound".to_string()));
        }

        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| CondorError::Transport(format!("invalid address {address}")))?;
        let mut port: u16 = port
            .parse()
            .map_err(|_| CondorError::Transport(format!("invalid port in {address}")))?;
        if port == 0 {
            port = NEXT_EPHEMERAL_PORT.fetch_add(1, Ordering::Relaxed);
        }

        *self.inner.address.lock() = Some(format!("{host}:{port}"));
        *self.inner.credentials.lock() = Some(credentials);
        *lifecycle = Lifecycle::Bound;
        Ok(port)
    }

    fn start(&mut self) -> Result<()> {
        let mut lifecycle = self.inner.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Bound => {
                *lifecycle = Lifecycle::Serving;
                Ok(())
            }
            Lifecycle::Idle => Err(CondorError::Transport("start called before bind".to_string())),
            _ => Err(CondorError::Transport("already started".to_string())),
        }
    }

    fn shutdown(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            *self.inner.lifecycle.lock() = Lifecycle::Draining;
            let mut in_flight = self.inner.in_flight.subscribe();
            let _ = in_flight.wait_for(|count| *count == 0).await;
            *self.inner.lifecycle.lock() = Lifecycle::Stopped;
            Ok(())
        })
    }

    fn force_shutdown(&self) {
        *self.inner.lifecycle.lock() = Lifecycle::Stopped;
        let tasks: Vec<JoinHandle<()>> = self.inner.tasks.lock().drain().map(|(_, t)| t).collect();
        for task in tasks {
            task.abort();
        }
    }
}

/// Decrements the in-flight count when a call task finishes or is aborted.
struct InFlightGuard {
    inner: Arc<Inner>,
    call: Arc<MemoryCall>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        // A stream left open by an aborted task ends with CANCELLED.
        self.call.abandon();
        self.inner.in_flight.send_modify(|count| *count = count.saturating_sub(1));
    }
}

impl Inner {
    /// Start a call to `method`, spawning its task.
    fn open(
        self: &Arc<Self>,
        method: &str,
        expected: CallKind,
        request: Value,
        metadata: Metadata,
        callback: Option<Callback>,
    ) -> std::result::Result<(Arc<MemoryCall>, MessageStream), Status> {
        // Held until the call is counted and tracked so shutdowns cannot miss it.
        let lifecycle = self.lifecycle.lock();
        if *lifecycle != Lifecycle::Serving {
            return Err(Status::unavailable("server is not serving"));
        }

        let handler = {
            let routes = self.routes.read();
            let route = routes
                .get(method)
                .ok_or_else(|| Status::unimplemented(format!("{method} is not implemented")))?;
            if route.kind != expected {
                return Err(Status::unimplemented(format!(
                    "{method} is a {} method",
                    route.kind.as_str()
                )));
            }
            route.handler.clone()
        };

        let (call, stream) = MemoryCall::new(expected, request, metadata);
        let call = Arc::new(call);
        let fut = handler(call.clone(), callback);

        self.in_flight.send_modify(|count| *count += 1);
        let guard = InFlightGuard {
            inner: self.clone(),
            call: call.clone(),
        };
        let task = tokio::spawn(async move {
            let _guard = guard;
            fut.await;
        });

        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let mut tasks = self.tasks.lock();
        tasks.retain(|_, task| !task.is_finished());
        tasks.insert(id, task);
        drop(tasks);
        drop(lifecycle);

        Ok((call, stream))
    }
}

// ============================================================================
// Client
// ============================================================================

/// Client side of a [`MemoryTransport`].
#[derive(Clone)]
pub struct MemoryClient {
    inner: Arc<Inner>,
}

impl MemoryClient {
    /// Unary call.
    pub async fn unary(&self, method: &str, request: Value) -> std::result::Result<Response, Status> {
        self.unary_with_metadata(method, request, Metadata::new()).await
    }

    /// Unary call with request metadata.
    pub async fn unary_with_metadata(
        &self,
        method: &str,
        request: Value,
        metadata: Metadata,
    ) -> std::result::Result<Response, Status> {
        let (callback, pending) = reply_channel();
        self.inner
            .open(method, CallKind::Unary, request, metadata, Some(callback))?;
        pending.response().await
    }

    /// Client-streaming call: send messages through the sink, then await
    /// the single response.
    pub fn client_streaming(
        &self,
        method: &str,
        metadata: Metadata,
    ) -> std::result::Result<(RequestSink, PendingResponse), Status> {
        let (callback, pending) = reply_channel();
        let (call, _) = self.inner.open(
            method,
            CallKind::ClientStreaming,
            Value::Null,
            metadata,
            Some(callback),
        )?;
        Ok((RequestSink::new(call), pending))
    }

    /// Server-streaming call.
    pub fn server_streaming(
        &self,
        method: &str,
        request: Value,
        metadata: Metadata,
    ) -> std::result::Result<MessageStream, Status> {
        let (_, stream) = self
            .inner
            .open(method, CallKind::ServerStreaming, request, metadata, None)?;
        Ok(stream)
    }

    /// Bidirectional call.
    pub fn bidirectional(
        &self,
        method: &str,
        metadata: Metadata,
    ) -> std::result::Result<(RequestSink, MessageStream), Status> {
        let (call, stream) =
            self.inner
                .open(method, CallKind::Bidirectional, Value::Null, metadata, None)?;
        Ok((RequestSink::new(call), stream))
    }
}

impl std::fmt::Debug for MemoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryClient").finish_non_exhaustive()
    }
}

fn reply_channel() -> (Callback, PendingResponse) {
    let (tx, rx) = oneshot::channel();
    let callback: Callback = Box::new(move |outcome| {
        let _ = tx.send(outcome);
    });
    (callback, PendingResponse { rx })
}

/// Response of a call answered through the callback.
#[derive(Debug)]
pub struct PendingResponse {
    rx: oneshot::Receiver<std::result::Result<Response, Status>>,
}

impl PendingResponse {
    /// Wait for the response. A call dropped before answering yields
    /// `CANCELLED`.
    pub async fn response(self) -> std::result::Result<Response, Status> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(Status::cancelled("call dropped before responding")))
    }
}

/// Sending half of a request stream.
///
/// Dropping the sink without [`end`](Self::end) fails the request stream
/// with `CANCELLED`.
#[derive(Debug)]
pub struct RequestSink {
    call: Arc<MemoryCall>,
    closed: bool,
}

impl RequestSink {
    fn new(call: Arc<MemoryCall>) -> Self {
        Self {
            call,
            closed: false,
        }
    }

    /// Send a request message.
    pub fn send(&self, message: Value) {
        self.call.deliver(StreamEvent::Data(message));
    }

    /// Finish the request stream.
    pub fn end(mut self) {
        self.closed = true;
        self.call.deliver(StreamEvent::End);
    }

    /// Fail the request stream.
    pub fn error(mut self, status: Status) {
        self.closed = true;
        self.call.deliver(StreamEvent::Error(status));
    }
}

impl Drop for RequestSink {
    fn drop(&mut self) {
        if !self.closed {
            self.call
                .deliver(StreamEvent::Error(Status::cancelled("request stream dropped")));
        }
    }
}
