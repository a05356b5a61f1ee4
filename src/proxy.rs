//! Service proxy: turns a registered service into per-method transport
//! handlers.
//!
//! Scoped middleware and error handlers are filtered once per method when
//! the proxy is built. Each call then gets a fresh [`CallContext`] and
//! [`FunctionIterator`]; the outcome is delivered through the transport
//! callback (unary and client-streaming calls) or, on failure, as an error
//! event on the stream (server-streaming and bidirectional calls).

use std::collections::HashMap;
use std::sync::Arc;

use crate::builder::ServiceDefinition;
use crate::completion::Completion;
use crate::handler::{BoxFuture, CallContext, ErrorHandler, MethodHandler, Middleware};
use crate::iterator::FunctionIterator;
use crate::response::Response;
use crate::scope::{filter_for_method, ScopedEntry};
use crate::status::Status;
use crate::transport::{Call, Callback, TransportHandler};

/// Build the transport handlers of one service, keyed by method name.
///
/// Only methods both declared in the proto file and present in the
/// implementation are included.
pub fn build_proxy(
    definition: &ServiceDefinition,
    middleware: &[ScopedEntry<dyn Middleware>],
    error_handlers: &[ScopedEntry<dyn ErrorHandler>],
) -> HashMap<String, TransportHandler> {
    for name in definition.implementation.method_names() {
        if !definition.methods.iter().any(|m| m.name == name) {
            tracing::warn!(
                "{}.{} is not declared in {}, skipping",
                definition.service_full_name,
                name,
                definition.proto_file_path.display()
            );
        }
    }

    let mut handlers = HashMap::new();
    for method in &definition.methods {
        let Some(implementation) = definition.implementation.get(&method.name) else {
            tracing::debug!(
                "{}.{} has no implementation",
                definition.service_full_name,
                method.name
            );
            continue;
        };

        let full_name = format!("{}.{}", definition.service_full_name, method.name);
        let handler = proxy_method(
            full_name.clone(),
            filter_for_method(middleware, &full_name),
            filter_for_method(error_handlers, &full_name),
            implementation,
        );
        handlers.insert(method.name.clone(), handler);
    }
    handlers
}

fn proxy_method(
    full_name: String,
    middleware: Arc<[ScopedEntry<dyn Middleware>]>,
    error_handlers: Arc<[ScopedEntry<dyn ErrorHandler>]>,
    implementation: Arc<dyn MethodHandler>,
) -> TransportHandler {
    Arc::new(move |call: Arc<dyn Call>, callback: Option<Callback>| -> BoxFuture<'static, ()> {
        let full_name = full_name.clone();
        let middleware = middleware.clone();
        let error_handlers = error_handlers.clone();
        let implementation = implementation.clone();

        Box::pin(async move {
            tracing::debug!("Dispatching {} ({})", full_name, call.kind().as_str());
            let ctx = Arc::new(CallContext::new(call.clone(), full_name.clone()));
            let outcome = FunctionIterator::new(middleware, error_handlers, ctx, implementation)
                .run()
                .await;

            match callback {
                Some(callback) => deliver(&full_name, outcome, callback),
                None => {
                    if let Err(status) = outcome {
                        fail_stream(&full_name, call.as_ref(), status).await;
                    }
                }
            }
        })
    })
}

fn deliver(method: &str, outcome: Result<Response, Status>, callback: Callback) {
    let completion = Completion::new(callback);
    let settled = match outcome {
        Ok(response) => completion.resolve(response),
        Err(status) => {
            tracing::debug!("{} failed: {}", method, status);
            completion.reject(status)
        }
    };
    if let Err(e) = settled {
        tracing::error!("Cannot deliver result of {}: {}", method, e);
    }
}

async fn fail_stream(method: &str, call: &dyn Call, status: Status) {
    let status = status.normalized();
    tracing::debug!("{} stream failed: {}", method, status);
    if let Err(e) = call.emit_error(status).await {
        tracing::warn!("Cannot emit error on {}: {}", method, e);
    }
    if let Err(e) = call.end().await {
        tracing::debug!("Cannot end stream of {}: {}", method, e);
    }
}
