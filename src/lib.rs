//! # condor
//!
//! Scoped middleware and error-handler dispatch for RPC services.
//!
//! Services are registered against their proto file. Middleware and error
//! handlers are registered under a scope (`"*"`, a package, a service or a
//! single method) and composed, per method, into a chain that runs on every
//! call:
//!
//! ```text
//! middleware... ──► implementation
//!       │                 │
//!       └──── failure ────┴──► error handlers... ──► transport
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use condor::{Condor, MemoryTransport, ServerOptions, ServiceImplementation, Status};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let people = ServiceImplementation::new()
//!         .method("getPerson", |ctx| async move {
//!             match ctx.request()["id"].as_i64() {
//!                 Some(1) => Ok(json!({"id": 1, "name": "Ada"})),
//!                 _ => Err(Status::not_found("Not found")),
//!             }
//!         });
//!
//!     let mut app = Condor::new(ServerOptions::default());
//!     app.add_service("protos/person.proto", "testapp.PersonService", people)?
//!         .add_error_handler(|error, ctx, next| async move {
//!             tracing::warn!("{} failed: {}", ctx.method_name(), error);
//!             next.run().await?;
//!             Ok(())
//!         })?;
//!
//!     let transport = MemoryTransport::new();
//!     let client = transport.client();
//!     app.start(transport)?;
//!
//!     let person = client.unary("testapp.PersonService.getPerson", json!({"id": 1})).await?;
//!     println!("{}", person.grpc_object());
//!     app.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod completion;
pub mod error;
pub mod handler;
pub mod iterator;
pub mod metadata;
pub mod options;
pub mod proto;
pub mod proxy;
pub mod response;
pub mod scope;
pub mod status;
pub mod transport;

mod server;

pub use builder::{Builder, ServiceDefinition};
pub use completion::Completion;
pub use error::{CondorError, Result};
pub use handler::{CallContext, ErrorHandler, HandlerResult, Middleware, ServiceImplementation};
pub use iterator::{FunctionIterator, Next};
pub use metadata::{Metadata, MetadataValue};
pub use options::{Credentials, ServerOptions};
pub use response::{IntoResponse, Response};
pub use server::{Condor, Server};
pub use status::{Code, Status};
pub use transport::{MemoryClient, MemoryTransport};
