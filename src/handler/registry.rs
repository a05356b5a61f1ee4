//! Method handlers and the per-service implementation table.
//!
//! A [`ServiceImplementation`] maps method names to handlers. Only methods
//! that are also declared as `rpc` in the service's proto file are ever
//! dispatched.
//!
//! # Example
//!
//! ```ignore
//! use condor::handler::ServiceImplementation;
//!
//! let people = ServiceImplementation::new()
//!     .method("ping", |_ctx| async { Ok(json!({"pong": true})) })
//!     .typed("getPerson", |req: GetPerson, _ctx| async move {
//!         Ok(Person { id: req.id, name: "Ada".into() })
//!     });
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::CallContext;
use crate::response::{IntoResponse, Response};
use crate::status::Status;

/// Result type for handler functions.
pub type HandlerResult<T = ()> = std::result::Result<T, Status>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for method implementations.
pub trait MethodHandler: Send + Sync + 'static {
    /// Handle a call. The returned response is sent unless the chain
    /// already holds one.
    fn call(&self, ctx: Arc<CallContext>) -> BoxFuture<'static, HandlerResult<Response>>;
}

/// Wrapper around a closure taking the raw call context.
pub struct FnHandler<F, R, Fut>
where
    F: Fn(Arc<CallContext>) -> Fut + Send + Sync + 'static,
    R: IntoResponse + 'static,
    Fut: Future<Output = HandlerResult<R>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, R, Fut> FnHandler<F, R, Fut>
where
    F: Fn(Arc<CallContext>) -> Fut + Send + Sync + 'static,
    R: IntoResponse + 'static,
    Fut: Future<Output = HandlerResult<R>> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, R, Fut> MethodHandler for FnHandler<F, R, Fut>
where
    F: Fn(Arc<CallContext>) -> Fut + Send + Sync + 'static,
    R: IntoResponse + 'static,
    Fut: Future<Output = HandlerResult<R>> + Send + 'static,
{
    fn call(&self, ctx: Arc<CallContext>) -> BoxFuture<'static, HandlerResult<Response>> {
        let fut = (self.handler)(ctx);
        Box::pin(async move { fut.await.map(IntoResponse::into_response) })
    }
}

/// Wrapper that deserializes the request before calling the handler and
/// serializes its reply.
pub struct TypedHandler<F, T, R, Fut>
where
    F: Fn(T, Arc<CallContext>) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + 'static,
    Fut: Future<Output = HandlerResult<R>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<F, T, R, Fut> TypedHandler<F, T, R, Fut>
where
    F: Fn(T, Arc<CallContext>) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + 'static,
    Fut: Future<Output = HandlerResult<R>> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R, Fut> MethodHandler for TypedHandler<F, T, R, Fut>
where
    F: Fn(T, Arc<CallContext>) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + 'static,
    Fut: Future<Output = HandlerResult<R>> + Send + 'static,
{
    fn call(&self, ctx: Arc<CallContext>) -> BoxFuture<'static, HandlerResult<Response>> {
        let parsed: T = match ctx.request_as() {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(e) }),
        };

        let fut = (self.handler)(parsed, ctx);
        Box::pin(async move {
            let reply = fut.await?;
            Response::json(&reply).map_err(Status::from)
        })
    }
}

/// Method table of one service.
#[derive(Clone, Default)]
pub struct ServiceImplementation {
    methods: HashMap<String, Arc<dyn MethodHandler>>,
}

impl ServiceImplementation {
    /// Create an empty implementation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a method taking the call context.
    ///
    /// The handler returns anything convertible into a [`Response`]:
    /// a `Response`, a `serde_json::Value`, or `()` for no message.
    pub fn method<F, R, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(Arc<CallContext>) -> Fut + Send + Sync + 'static,
        R: IntoResponse + 'static,
        Fut: Future<Output = HandlerResult<R>> + Send + 'static,
    {
        self.register(name, Arc::new(FnHandler::new(handler)));
        self
    }

    /// Add a method with a typed request and reply.
    ///
    /// A request that fails to decode is answered with `INVALID_ARGUMENT`
    /// through the error chain.
    pub fn typed<F, T, R, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(T, Arc<CallContext>) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        Fut: Future<Output = HandlerResult<R>> + Send + 'static,
    {
        self.register(name, Arc::new(TypedHandler::new(handler)));
        self
    }

    /// Add a prepared handler, replacing any previous one of that name.
    pub fn register(&mut self, name: &str, handler: Arc<dyn MethodHandler>) {
        self.methods.insert(name.to_string(), handler);
    }

    /// Get a handler by method name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn MethodHandler>> {
        self.methods.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl std::fmt::Debug for ServiceImplementation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceImplementation")
            .field("methods", &self.method_names())
            .finish()
    }
}
