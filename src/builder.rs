//! Registration table for services, middleware and error handlers.
//!
//! Registration is validated eagerly and refused once the server started.
//! Every accessor returns a snapshot; changing it never affects the
//! builder.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{CondorError, Result};
use crate::handler::{
    CallContext, ErrorHandler, FnErrorHandler, FnMiddleware, HandlerResult, Middleware,
    ServiceImplementation,
};
use crate::iterator::Next;
use crate::proto::ProtoFile;
use crate::scope::{ScopedEntry, GLOBAL_SCOPE};
use crate::status::Status;
use crate::transport::{MethodDescriptor, ServiceDescriptor};

/// A registered service.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    /// Proto file the service was validated against.
    pub proto_file_path: PathBuf,
    /// Fully-qualified service name, e.g. `testapp.PersonService`.
    pub service_full_name: String,
    /// Method table.
    pub implementation: Arc<ServiceImplementation>,
    /// `rpc` methods declared in the proto file.
    pub methods: Vec<MethodDescriptor>,
}

impl ServiceDefinition {
    /// Transport-facing description of the service.
    pub fn descriptor(&self) -> ServiceDescriptor {
        ServiceDescriptor {
            full_name: self.service_full_name.clone(),
            methods: self.methods.clone(),
        }
    }
}

/// Ordered registration table.
#[derive(Default)]
pub struct Builder {
    services: Vec<ServiceDefinition>,
    middleware: Vec<ScopedEntry<dyn Middleware>>,
    error_handlers: Vec<ScopedEntry<dyn ErrorHandler>>,
    started: bool,
}

impl Builder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the service `service_full_name` declared in `proto_file_path`.
    ///
    /// The file must exist, end in `.proto`, declare the package (when the
    /// name has one) and declare the service.
    pub fn add_service(
        &mut self,
        proto_file_path: impl AsRef<Path>,
        service_full_name: &str,
        implementation: ServiceImplementation,
    ) -> Result<&mut Self> {
        self.ensure_not_started("add service")?;
        let proto = ProtoFile::load(proto_file_path.as_ref())?;
        let definition = define(&proto, service_full_name, implementation)?;
        self.services.push(definition);
        Ok(self)
    }

    /// Register several services of one proto file.
    ///
    /// Either every service is registered or none is.
    pub fn add_services<I, S>(&mut self, proto_file_path: impl AsRef<Path>, services: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (S, ServiceImplementation)>,
        S: AsRef<str>,
    {
        self.ensure_not_started("add service")?;
        let proto = ProtoFile::load(proto_file_path.as_ref())?;
        let definitions = services
            .into_iter()
            .map(|(name, implementation)| define(&proto, name.as_ref(), implementation))
            .collect::<Result<Vec<_>>>()?;
        self.services.extend(definitions);
        Ok(self)
    }

    /// Add a middleware for every method.
    pub fn use_middleware<F, Fut>(&mut self, middleware: F) -> Result<&mut Self>
    where
        F: Fn(Arc<CallContext>, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.use_middleware_for(GLOBAL_SCOPE, middleware)
    }

    /// Add a middleware for methods under `scope`.
    pub fn use_middleware_for<F, Fut>(&mut self, scope: &str, middleware: F) -> Result<&mut Self>
    where
        F: Fn(Arc<CallContext>, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.use_middleware_arc(scope, Arc::new(FnMiddleware::new(middleware)))
    }

    /// Add a prepared middleware for methods under `scope`.
    pub fn use_middleware_arc(&mut self, scope: &str, middleware: Arc<dyn Middleware>) -> Result<&mut Self> {
        self.ensure_not_started("add middleware")?;
        validate_scope("add middleware", scope)?;
        self.middleware.push(ScopedEntry::new(scope, middleware));
        Ok(self)
    }

    /// Add an error handler for every method.
    pub fn add_error_handler<F, Fut>(&mut self, handler: F) -> Result<&mut Self>
    where
        F: Fn(Status, Arc<CallContext>, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_error_handler_for(GLOBAL_SCOPE, handler)
    }

    /// Add an error handler for methods under `scope`.
    pub fn add_error_handler_for<F, Fut>(&mut self, scope: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(Status, Arc<CallContext>, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_error_handler_arc(scope, Arc::new(FnErrorHandler::new(handler)))
    }

    /// Add a prepared error handler for methods under `scope`.
    pub fn add_error_handler_arc(&mut self, scope: &str, handler: Arc<dyn ErrorHandler>) -> Result<&mut Self> {
        self.ensure_not_started("add error handler")?;
        validate_scope("add error handler", scope)?;
        self.error_handlers.push(ScopedEntry::new(scope, handler));
        Ok(self)
    }

    /// Registered services, in registration order.
    pub fn services(&self) -> Vec<ServiceDefinition> {
        self.services.clone()
    }

    /// Registered middleware, in registration order.
    pub fn middleware(&self) -> Vec<ScopedEntry<dyn Middleware>> {
        self.middleware.clone()
    }

    /// Registered error handlers, in registration order.
    pub fn error_handlers(&self) -> Vec<ScopedEntry<dyn ErrorHandler>> {
        self.error_handlers.clone()
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    /// Freeze registration.
    pub(crate) fn mark_started(&mut self) {
        self.started = true;
    }

    fn ensure_not_started(&self, action: &'static str) -> Result<()> {
        if self.started {
            return Err(CondorError::AlreadyStarted(action));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("services", &self.services)
            .field("middleware", &self.middleware)
            .field("error_handlers", &self.error_handlers)
            .field("started", &self.started)
            .finish()
    }
}

fn define(
    proto: &ProtoFile,
    service_full_name: &str,
    implementation: ServiceImplementation,
) -> Result<ServiceDefinition> {
    let descriptor = proto.describe_service(service_full_name)?;
    Ok(ServiceDefinition {
        proto_file_path: proto.path().to_path_buf(),
        service_full_name: descriptor.full_name,
        implementation: Arc::new(implementation),
        methods: descriptor.methods,
    })
}

fn validate_scope(action: &'static str, scope: &str) -> Result<()> {
    if scope.trim().is_empty() {
        return Err(CondorError::validation(action, "Scope must not be empty"));
    }
    Ok(())
}
