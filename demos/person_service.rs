//! Person service - middleware, error handlers and every call kind.
//!
//! This demo:
//! - Registers `testapp.PersonService` from `tests/protos/person.proto`
//! - Logs every call with a global middleware
//! - Guards the service with a token check scoped to the service
//! - Turns `NOT_FOUND` into a placeholder person with an error handler
//! - Calls the server through the in-memory client
//!
//! # Running
//!
//! ```text
//! RUST_LOG=condor=debug,person_service=info cargo run --example person_service
//! ```

use std::path::PathBuf;
use std::time::Instant;

use condor::{Code, Condor, Metadata, MemoryTransport, ServerOptions, ServiceImplementation, Status};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Deserialize, Debug)]
struct PersonRequest {
    id: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct Person {
    id: i32,
    name: String,
}

fn directory() -> Vec<Person> {
    [(1, "Ada"), (2, "Grace"), (3, "Edsger")]
        .into_iter()
        .map(|(id, name)| Person {
            id,
            name: name.to_string(),
        })
        .collect()
}

fn people() -> ServiceImplementation {
    ServiceImplementation::new()
        .typed("getPerson", |req: PersonRequest, _ctx| async move {
            directory()
                .into_iter()
                .find(|p| p.id == req.id)
                .ok_or_else(|| Status::not_found(format!("person {} not found", req.id)))
        })
        .method("listPeople", |ctx| async move {
            for person in directory() {
                ctx.write(&person).await?;
            }
            ctx.end().await?;
            Ok(())
        })
        .method("addPeople", |ctx| async move {
            let added = ctx.incoming().collect_messages().await?;
            Ok(json!({ "count": added.len() }))
        })
        .method("chat", |ctx| async move {
            let mut incoming = ctx.incoming();
            while let Some(message) = incoming.message().await {
                let person: Person = serde_json::from_value(message?)?;
                ctx.write(&json!({ "id": person.id, "name": format!("hello {}", person.name) }))
                    .await?;
            }
            ctx.end().await?;
            Ok(())
        })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let proto = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/protos/person.proto");

    let mut app = Condor::new(ServerOptions::new().host("127.0.0.1").port(50051));
    app.add_service(&proto, "testapp.PersonService", people())?
        .use_middleware(|ctx, next| async move {
            let started = Instant::now();
            let outcome = next.run().await;
            tracing::info!(
                "{} ({}) took {:?}",
                ctx.method_name(),
                ctx.kind().as_str(),
                started.elapsed()
            );
            outcome?;
            Ok(())
        })?
        .use_middleware_for("testapp.PersonService", |ctx, next| async move {
            if ctx.metadata().get_str("authorization") != Some("Bearer demo") {
                return Err(Status::unauthenticated("missing or invalid token"));
            }
            next.run().await?;
            Ok(())
        })?
        .add_error_handler(|error, ctx, next| async move {
            if error.code() == Code::NotFound {
                ctx.send(json!({ "id": 0, "name": "unknown" }));
                return Ok(());
            }
            next.fail(error).await?;
            Ok(())
        })?;

    let transport = MemoryTransport::new();
    let client = transport.client();
    let port = app.start(transport)?;
    tracing::info!("person service started on port {}", port);

    let mut auth = Metadata::new();
    auth.insert("authorization", "Bearer demo");

    // Unary
    let person = client
        .unary_with_metadata("testapp.PersonService.getPerson", json!({ "id": 2 }), auth.clone())
        .await?;
    tracing::info!("getPerson(2) -> {}", person.grpc_object());

    let missing = client
        .unary_with_metadata("testapp.PersonService.getPerson", json!({ "id": 9 }), auth.clone())
        .await?;
    tracing::info!("getPerson(9) -> {}", missing.grpc_object());

    match client
        .unary("testapp.PersonService.getPerson", json!({ "id": 1 }))
        .await
    {
        Ok(response) => tracing::warn!("unauthenticated call succeeded: {}", response.grpc_object()),
        Err(status) => tracing::info!("getPerson without token -> {}", status),
    }

    // Server streaming
    let people = client
        .server_streaming("testapp.PersonService.listPeople", json!({}), auth.clone())?
        .collect_messages()
        .await?;
    tracing::info!("listPeople -> {} people", people.len());

    // Client streaming
    let (sink, pending) = client.client_streaming("testapp.PersonService.addPeople", auth.clone())?;
    sink.send(json!({ "id": 4, "name": "Barbara" }));
    sink.send(json!({ "id": 5, "name": "Donald" }));
    sink.end();
    tracing::info!("addPeople -> {}", pending.response().await?.grpc_object());

    // Bidirectional
    let (sink, mut replies) = client.bidirectional("testapp.PersonService.chat", auth)?;
    for person in directory() {
        sink.send(serde_json::to_value(&person)?);
        if let Some(reply) = replies.message().await {
            tracing::info!("chat -> {}", reply?);
        }
    }
    sink.end();

    app.stop().await?;
    Ok(())
}
