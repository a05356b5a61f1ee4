//! Middleware and error-handler traits.
//!
//! Both receive a [`Next`] continuation. A middleware either sends a
//! response, awaits `next.run()` to continue the chain, or fails. An error
//! handler either sends a response (healing the error), calls `next.run()`
//! to pass the error on, calls `next.fail(other)` to replace it, or fails.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use super::registry::{BoxFuture, HandlerResult};
use super::CallContext;
use crate::iterator::Next;
use crate::status::Status;

/// Cross-cutting step run before the method implementation.
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, ctx: Arc<CallContext>, next: Next) -> BoxFuture<'static, HandlerResult>;
}

/// Step run when the chain fails.
pub trait ErrorHandler: Send + Sync + 'static {
    fn call(
        &self,
        error: Status,
        ctx: Arc<CallContext>,
        next: Next,
    ) -> BoxFuture<'static, HandlerResult>;
}

/// Middleware backed by a closure.
pub struct FnMiddleware<F, Fut>
where
    F: Fn(Arc<CallContext>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnMiddleware<F, Fut>
where
    F: Fn(Arc<CallContext>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Middleware for FnMiddleware<F, Fut>
where
    F: Fn(Arc<CallContext>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: Arc<CallContext>, next: Next) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(ctx, next))
    }
}

/// Error handler backed by a closure.
pub struct FnErrorHandler<F, Fut>
where
    F: Fn(Status, Arc<CallContext>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnErrorHandler<F, Fut>
where
    F: Fn(Status, Arc<CallContext>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> ErrorHandler for FnErrorHandler<F, Fut>
where
    F: Fn(Status, Arc<CallContext>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(
        &self,
        error: Status,
        ctx: Arc<CallContext>,
        next: Next,
    ) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(error, ctx, next))
    }
}
