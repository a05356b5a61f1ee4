//! Handler module - call context, handler traits and method tables.
//!
//! Provides:
//! - [`CallContext`] - per-call view of the request plus the response slot
//! - [`Middleware`] / [`ErrorHandler`] - chain steps taking a [`Next`](crate::Next)
//! - [`ServiceImplementation`] - maps method names to handlers
//!
//! # Example
//!
//! ```ignore
//! use condor::handler::ServiceImplementation;
//!
//! let greeter = ServiceImplementation::new()
//!     .method("sayHello", |ctx| async move {
//!         let name = ctx.request()["name"].as_str().unwrap_or("stranger").to_string();
//!         Ok(json!({ "message": format!("Hello {name}") }))
//!     })
//!     .method("countdown", |ctx| async move {
//!         for i in (0..3).rev() {
//!             ctx.write(&i).await?;
//!         }
//!         ctx.end().await?;
//!         Ok(())
//!     });
//! ```

mod context;
mod middleware;
mod registry;

pub use context::CallContext;
pub use middleware::{ErrorHandler, FnErrorHandler, FnMiddleware, Middleware};
pub use registry::{
    BoxFuture, FnHandler, HandlerResult, MethodHandler, ServiceImplementation, TypedHandler,
};
