//! Server lifecycle and the [`Condor`] facade.
//!
//! The [`Condor`] value owns the registration table and the options. Its
//! lifecycle:
//! 1. Register services, middleware and error handlers
//! 2. `start(transport)` builds one proxy per service, binds and serves
//! 3. `stop()` drains in-flight calls, `force_stop()` cancels them
//!
//! # Example
//!
//! ```ignore
//! use condor::{Condor, MemoryTransport, ServerOptions, ServiceImplementation};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut app = Condor::new(ServerOptions::new().port(50051));
//!     app.add_service("protos/person.proto", "testapp.PersonService", people())?
//!         .use_middleware(|ctx, next| async move {
//!             tracing::info!("call {}", ctx.method_name());
//!             next.run().await?;
//!             Ok(())
//!         })?;
//!
//!     app.start(MemoryTransport::new())?;
//!     app.stop().await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use crate::builder::Builder;
use crate::error::{CondorError, Result};
use crate::handler::{CallContext, HandlerResult, ServiceImplementation};
use crate::iterator::Next;
use crate::options::ServerOptions;
use crate::proxy::build_proxy;
use crate::status::Status;
use crate::transport::Transport;

/// A running server bound to a transport.
pub struct Server {
    transport: Box<dyn Transport>,
    address: String,
    port: u16,
}

impl Server {
    /// Build proxies for every registered service, bind and start serving.
    ///
    /// Fails if no service is registered or the configured credentials
    /// cannot be loaded.
    pub fn start(builder: &Builder, options: &ServerOptions, mut transport: Box<dyn Transport>) -> Result<Self> {
        let services = builder.services();
        if services.is_empty() {
            return Err(CondorError::Start("No services have been defined".to_string()));
        }

        let credentials = options.credentials()?;
        let middleware = builder.middleware();
        let error_handlers = builder.error_handlers();

        for definition in &services {
            let handlers = build_proxy(definition, &middleware, &error_handlers);
            tracing::debug!(
                "Registering {} ({} of {} methods implemented)",
                definition.service_full_name,
                handlers.len(),
                definition.methods.len()
            );
            transport.add_service(definition.descriptor(), handlers)?;
        }

        let address = options.address();
        let secure = credentials.is_secure();
        let port = transport.bind(&address, credentials)?;
        transport.start()?;

        tracing::info!(
            "Server listening on {} ({})",
            address,
            if secure { "ssl" } else { "insecure" }
        );

        Ok(Self {
            transport,
            address,
            port,
        })
    }

    /// Bound port.
    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address the server was bound to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Stop accepting calls and wait for in-flight calls.
    pub async fn stop(&self) -> Result<()> {
        tracing::info!("Stopping server on {}", self.address);
        self.transport.shutdown().await?;
        tracing::info!("Server on {} stopped", self.address);
        Ok(())
    }

    /// Stop immediately, cancelling in-flight calls.
    pub fn force_stop(&self) {
        tracing::info!("Force stopping server on {}", self.address);
        self.transport.force_shutdown();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("address", &self.address)
            .field("port", &self.port)
            .finish()
    }
}

/// Application facade: registration, options and server lifecycle.
#[derive(Debug, Default)]
pub struct Condor {
    builder: Builder,
    options: ServerOptions,
    server: Option<Server>,
}

impl Condor {
    /// Create an application with the given options.
    pub fn new(options: ServerOptions) -> Self {
        Self {
            builder: Builder::new(),
            options,
            server: None,
        }
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// The registration table.
    pub fn builder(&self) -> &Builder {
        &self.builder
    }

    /// Register a service. See [`Builder::add_service`].
    pub fn add_service(
        &mut self,
        proto_file_path: impl AsRef<Path>,
        service_full_name: &str,
        implementation: ServiceImplementation,
    ) -> Result<&mut Self> {
        self.builder
            .add_service(proto_file_path, service_full_name, implementation)?;
        Ok(self)
    }

    /// Register several services of one proto file. See
    /// [`Builder::add_services`].
    pub fn add_services<I, S>(&mut self, proto_file_path: impl AsRef<Path>, services: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (S, ServiceImplementation)>,
        S: AsRef<str>,
    {
        self.builder.add_services(proto_file_path, services)?;
        Ok(self)
    }

    /// Add a middleware for every method.
    pub fn use_middleware<F, Fut>(&mut self, middleware: F) -> Result<&mut Self>
    where
        F: Fn(Arc<CallContext>, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.builder.use_middleware(middleware)?;
        Ok(self)
    }

    /// Add a middleware for methods under `scope`.
    pub fn use_middleware_for<F, Fut>(&mut self, scope: &str, middleware: F) -> Result<&mut Self>
    where
        F: Fn(Arc<CallContext>, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.builder.use_middleware_for(scope, middleware)?;
        Ok(self)
    }

    /// Add an error handler for every method.
    pub fn add_error_handler<F, Fut>(&mut self, handler: F) -> Result<&mut Self>
    where
        F: Fn(Status, Arc<CallContext>, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.builder.add_error_handler(handler)?;
        Ok(self)
    }

    /// Add an error handler for methods under `scope`.
    pub fn add_error_handler_for<F, Fut>(&mut self, scope: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(Status, Arc<CallContext>, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.builder.add_error_handler_for(scope, handler)?;
        Ok(self)
    }

    /// Start serving on `transport`. Returns the bound port.
    ///
    /// Registration is frozen once the server started.
    pub fn start<T: Transport + 'static>(&mut self, transport: T) -> Result<u16> {
        if self.builder.has_started() {
            return Err(CondorError::AlreadyStarted("start server"));
        }
        let server = Server::start(&self.builder, &self.options, Box::new(transport))?;
        let port = server.port();
        self.builder.mark_started();
        self.server = Some(server);
        Ok(port)
    }

    pub fn has_started(&self) -> bool {
        self.builder.has_started()
    }

    /// The running server, if started.
    pub fn server(&self) -> Option<&Server> {
        self.server.as_ref()
    }

    /// Graceful shutdown.
    pub async fn stop(&self) -> Result<()> {
        let server = self
            .server
            .as_ref()
            .ok_or(CondorError::NotStarted("stop server"))?;
        server.stop().await
    }

    /// Immediate shutdown.
    pub fn force_stop(&self) -> Result<()> {
        let server = self
            .server
            .as_ref()
            .ok_or(CondorError::NotStarted("stop server"))?;
        server.force_stop();
        Ok(())
    }
}
