//! End-to-end dispatch tests over the in-memory transport.
//!
//! Each test registers services from the fixtures in `tests/protos`, starts
//! a server on a [`MemoryTransport`] and calls it through a client.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use condor::{
    Code, Condor, CondorError, Metadata, MemoryClient, MemoryTransport, Response, ServerOptions,
    ServiceImplementation, Status,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

fn proto(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("protos")
        .join(name)
}

fn people() -> ServiceImplementation {
    ServiceImplementation::new()
        .method("getPerson", |ctx| async move {
            match ctx.request()["id"].as_i64() {
                Some(1) => Ok(json!({"id": 1, "name": "Ada"})),
                _ => Err(Status::not_found("Not found")),
            }
        })
        .method("listPeople", |ctx| async move {
            for (id, name) in [(1, "Ada"), (2, "Grace"), (3, "Edsger")] {
                ctx.write(&json!({"id": id, "name": name})).await?;
            }
            ctx.end().await?;
            Ok(())
        })
        .method("addPeople", |ctx| async move {
            let added = ctx.incoming().collect_messages().await?;
            Ok(json!({"count": added.len()}))
        })
        .method("chat", |ctx| async move {
            let mut incoming = ctx.incoming();
            while let Some(message) = incoming.message().await {
                let person = message?;
                ctx.write(&json!({"id": person["id"], "name": "echo"})).await?;
            }
            ctx.end().await?;
            Ok(())
        })
}

fn animals() -> ServiceImplementation {
    ServiceImplementation::new().method("getAnimal", |_ctx| async { Ok(json!({"id": 7, "name": "Rex"})) })
}

fn app() -> Condor {
    let mut app = Condor::new(ServerOptions::new().host("127.0.0.1").port(0));
    app.add_service(proto("person.proto"), "testapp.PersonService", people())
        .unwrap();
    app
}

fn start(app: &mut Condor) -> (MemoryTransport, MemoryClient) {
    let transport = MemoryTransport::new();
    let client = transport.client();
    app.start(transport.clone()).unwrap();
    (transport, client)
}

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

// ============================================================================
// Unary calls and middleware
// ============================================================================

#[tokio::test]
async fn test_unary_call() {
    let mut app = app();
    let (_transport, client) = start(&mut app);

    let response = client
        .unary("testapp.PersonService.getPerson", json!({"id": 1}))
        .await
        .unwrap();
    assert_eq!(response.grpc_object(), json!({"id": 1, "name": "Ada"}));

    let err = client
        .unary("testapp.PersonService.getPerson", json!({"id": 2}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
    assert_eq!(err.message(), "Not found");
}

#[tokio::test]
async fn test_middleware_runs_in_registration_order() {
    let calls = log();
    let mut app = app();
    for name in ["first", "second"] {
        let calls = calls.clone();
        app.use_middleware(move |_ctx, next| {
            let calls = calls.clone();
            async move {
                calls.lock().push(format!("{name}:before"));
                next.run().await?;
                calls.lock().push(format!("{name}:after"));
                Ok(())
            }
        })
        .unwrap();
    }
    let (_transport, client) = start(&mut app);

    client
        .unary("testapp.PersonService.getPerson", json!({"id": 1}))
        .await
        .unwrap();
    assert_eq!(
        *calls.lock(),
        vec!["first:before", "second:before", "second:after", "first:after"]
    );
}

#[tokio::test]
async fn test_scoped_middleware() {
    let hits = log();
    let mut app = Condor::new(ServerOptions::new().port(0));
    app.add_services(
        proto("person.proto"),
        [
            ("testapp.PersonService", people()),
            ("testapp.AnimalService", animals()),
        ],
    )
    .unwrap();
    for scope in [
        "*",
        "testapp",
        "testapp.PersonService",
        "testapp.PersonService.getPerson",
        "testapp.AnimalService.getAnimal",
    ] {
        let hits = hits.clone();
        app.use_middleware_for(scope, move |ctx, next| {
            let hits = hits.clone();
            async move {
                hits.lock().push(format!("{scope} <- {}", ctx.method_name()));
                next.run().await?;
                Ok(())
            }
        })
        .unwrap();
    }
    let (_transport, client) = start(&mut app);

    client
        .unary("testapp.PersonService.getPerson", json!({"id": 1}))
        .await
        .unwrap();
    assert_eq!(
        std::mem::take(&mut *hits.lock()),
        vec![
            "* <- testapp.PersonService.getPerson",
            "testapp <- testapp.PersonService.getPerson",
            "testapp.PersonService <- testapp.PersonService.getPerson",
            "testapp.PersonService.getPerson <- testapp.PersonService.getPerson",
        ]
    );

    let response = client
        .unary("testapp.AnimalService.getAnimal", json!({}))
        .await
        .unwrap();
    assert_eq!(response.grpc_object()["name"], "Rex");
    assert_eq!(
        *hits.lock(),
        vec![
            "* <- testapp.AnimalService.getAnimal",
            "testapp <- testapp.AnimalService.getAnimal",
            "testapp.AnimalService.getAnimal <- testapp.AnimalService.getAnimal",
        ]
    );
}

#[tokio::test]
async fn test_middleware_short_circuits_with_response() {
    let implemented = Arc::new(AtomicUsize::new(0));
    let counter = implemented.clone();
    let mut app = Condor::new(ServerOptions::new().port(0));
    app.add_service(
        proto("person.proto"),
        "testapp.PersonService",
        ServiceImplementation::new().method("getPerson", move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(json!({"from": "implementation"})) }
        }),
    )
    .unwrap()
    .use_middleware(|ctx, _next| async move {
        ctx.send(json!({"from": "cache"}));
        Ok(())
    })
    .unwrap();
    let (_transport, client) = start(&mut app);

    let response = client
        .unary("testapp.PersonService.getPerson", json!({"id": 1}))
        .await
        .unwrap();
    assert_eq!(response.grpc_object(), json!({"from": "cache"}));
    assert_eq!(implemented.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_repeated_next_runs_implementation_once() {
    let implemented = Arc::new(AtomicUsize::new(0));
    let counter = implemented.clone();
    let mut app = Condor::new(ServerOptions::new().port(0));
    app.add_service(
        proto("person.proto"),
        "testapp.PersonService",
        ServiceImplementation::new().method("getPerson", move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(json!({"id": 1})) }
        }),
    )
    .unwrap()
    .use_middleware(|_ctx, next| async move {
        let first = next.run().await?;
        let second = next.run().await?;
        assert_eq!(first, second);
        Ok(())
    })
    .unwrap();
    let (_transport, client) = start(&mut app);

    let response = client
        .unary("testapp.PersonService.getPerson", json!({}))
        .await
        .unwrap();
    assert_eq!(response.grpc_object(), json!({"id": 1}));
    assert_eq!(implemented.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_middleware_without_next_or_response_sends_empty_object() {
    let mut app = app();
    app.use_middleware(|_ctx, _next| async { Ok(()) }).unwrap();
    let (_transport, client) = start(&mut app);

    let response = client
        .unary("testapp.PersonService.getPerson", json!({"id": 1}))
        .await
        .unwrap();
    assert_eq!(response.grpc_object(), json!({}));
}

#[tokio::test]
async fn test_metadata_guard() {
    let mut app = app();
    app.use_middleware(|ctx, next| async move {
        if ctx.metadata().get_str("authorization") != Some("Bearer secret") {
            return Err(Status::unauthenticated("missing token"));
        }
        next.run().await?;
        Ok(())
    })
    .unwrap();
    let (_transport, client) = start(&mut app);

    let err = client
        .unary("testapp.PersonService.getPerson", json!({"id": 1}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);

    let mut metadata = Metadata::new();
    metadata.insert("Authorization", "Bearer secret");
    let response = client
        .unary_with_metadata("testapp.PersonService.getPerson", json!({"id": 1}), metadata)
        .await
        .unwrap();
    assert_eq!(response.grpc_object()["name"], "Ada");
}

#[tokio::test]
async fn test_response_metadata() {
    let mut app = app();
    app.use_middleware(|ctx, next| async move {
        let response = next.run().await?.unwrap_or_else(Response::empty);
        let mut metadata = Metadata::new();
        metadata.insert("x-served-by", "condor");
        ctx.send_with_metadata(response.message().clone(), metadata);
        Ok(())
    })
    .unwrap();
    let (_transport, client) = start(&mut app);

    let response = client
        .unary("testapp.PersonService.getPerson", json!({"id": 1}))
        .await
        .unwrap();
    assert_eq!(response.grpc_object()["name"], "Ada");
    assert_eq!(
        response.metadata().and_then(|m| m.get_str("x-served-by")),
        Some("condor")
    );
}

#[tokio::test]
async fn test_typed_method_without_package() {
    #[derive(Deserialize)]
    struct HelloRequest {
        name: String,
    }

    #[derive(Serialize)]
    struct HelloReply {
        message: String,
    }

    let mut app = Condor::new(ServerOptions::new().port(0));
    app.add_service(
        proto("greeter.proto"),
        "Greeter",
        ServiceImplementation::new().typed("sayHello", |req: HelloRequest, _ctx| async move {
            Ok(HelloReply {
                message: format!("Hello {}", req.name),
            })
        }),
    )
    .unwrap();
    let (_transport, client) = start(&mut app);

    let response = client
        .unary("Greeter.sayHello", json!({"name": "Ada"}))
        .await
        .unwrap();
    assert_eq!(response.grpc_object(), json!({"message": "Hello Ada"}));

    let err = client
        .unary("Greeter.sayHello", json!({"nom": "Ada"}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
}

// ============================================================================
// Error handlers
// ============================================================================

#[tokio::test]
async fn test_error_handler_heals() {
    let mut app = app();
    app.add_error_handler(|error, ctx, _next| async move {
        if error.code() == Code::NotFound {
            ctx.send(json!({"id": 0, "name": "nobody"}));
        }
        Ok(())
    })
    .unwrap();
    let (_transport, client) = start(&mut app);

    let response = client
        .unary("testapp.PersonService.getPerson", json!({"id": 42}))
        .await
        .unwrap();
    assert_eq!(response.grpc_object(), json!({"id": 0, "name": "nobody"}));
}

#[tokio::test]
async fn test_healing_skips_later_error_handlers() {
    let later = Arc::new(AtomicUsize::new(0));
    let counter = later.clone();
    let mut app = app();
    app.add_error_handler(|_error, ctx, next| async move {
        ctx.send(json!({"healed": true}));
        next.run().await?;
        Ok(())
    })
    .unwrap()
    .add_error_handler(move |error, _ctx, next| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            next.fail(error).await?;
            Ok(())
        }
    })
    .unwrap();
    let (_transport, client) = start(&mut app);

    let response = client
        .unary("testapp.PersonService.getPerson", json!({"id": 42}))
        .await
        .unwrap();
    assert_eq!(response.grpc_object(), json!({"healed": true}));
    assert_eq!(later.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_error_handlers_see_error_in_order() {
    let seen = log();
    let mut app = app();
    for name in ["first", "second"] {
        let seen = seen.clone();
        app.add_error_handler(move |error, _ctx, next| {
            let seen = seen.clone();
            async move {
                seen.lock().push(format!("{name}: {}", error.message()));
                next.fail(error).await?;
                Ok(())
            }
        })
        .unwrap();
    }
    let (_transport, client) = start(&mut app);

    let err = client
        .unary("testapp.PersonService.getPerson", json!({"id": 42}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
    assert_eq!(*seen.lock(), vec!["first: Not found", "second: Not found"]);
}

#[tokio::test]
async fn test_error_handler_consuming_error_without_response() {
    let mut app = app();
    app.add_error_handler(|_error, _ctx, next| async move {
        next.run().await?;
        Ok(())
    })
    .unwrap();
    let (_transport, client) = start(&mut app);

    let err = client
        .unary("testapp.PersonService.getPerson", json!({"id": 42}))
        .await
        .unwrap_err();
    assert!(err.is_no_response_after_error_handled());
    assert_eq!(err.message(), "No response sent after error was handled");
}

#[tokio::test]
async fn test_error_handler_replacing_error_restarts_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let mut app = app();
    app.add_error_handler(move |error, _ctx, next| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if error.code() == Code::NotFound {
                next.fail(Status::permission_denied("hidden")).await?;
            } else {
                next.fail(error).await?;
            }
            Ok(())
        }
    })
    .unwrap();
    let (_transport, client) = start(&mut app);

    let err = client
        .unary("testapp.PersonService.getPerson", json!({"id": 42}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::PermissionDenied);
    assert_eq!(err.message(), "hidden");
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_scoped_error_handler() {
    let mut app = Condor::new(ServerOptions::new().port(0));
    app.add_services(
        proto("person.proto"),
        [
            ("testapp.PersonService", people()),
            (
                "testapp.AnimalService",
                ServiceImplementation::new()
                    .method("getAnimal", |_ctx| async { Err::<Value, _>(Status::not_found("no animal")) }),
            ),
        ],
    )
    .unwrap()
    .add_error_handler_for("testapp.AnimalService", |_error, ctx, _next| async move {
        ctx.send(json!({"name": "stray"}));
        Ok(())
    })
    .unwrap();
    let (_transport, client) = start(&mut app);

    let response = client
        .unary("testapp.AnimalService.getAnimal", json!({}))
        .await
        .unwrap();
    assert_eq!(response.grpc_object(), json!({"name": "stray"}));

    let err = client
        .unary("testapp.PersonService.getPerson", json!({"id": 42}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
}

#[tokio::test]
async fn test_send_then_fail_keeps_response() {
    let mut app = app();
    app.use_middleware(|ctx, _next| async move {
        ctx.send(json!({"partial": true}));
        Err(Status::internal("late failure"))
    })
    .unwrap();
    let (_transport, client) = start(&mut app);

    let response = client
        .unary("testapp.PersonService.getPerson", json!({"id": 1}))
        .await
        .unwrap();
    assert_eq!(response.grpc_object(), json!({"partial": true}));
}

#[tokio::test]
async fn test_error_not_handled_twice_while_bubbling_up() {
    let handled = Arc::new(AtomicUsize::new(0));
    let counter = handled.clone();
    let mut app = app();
    app.use_middleware(|_ctx, next| async move {
        next.run().await?;
        Ok(())
    })
    .unwrap()
    .use_middleware(|_ctx, next| async move {
        next.run().await?;
        Ok(())
    })
    .unwrap()
    .add_error_handler(move |error, _ctx, next| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            next.fail(error).await?;
            Ok(())
        }
    })
    .unwrap();
    let (_transport, client) = start(&mut app);

    let err = client
        .unary("testapp.PersonService.getPerson", json!({"id": 42}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
    assert_eq!(handled.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_panicking_implementation() {
    let mut app = Condor::new(ServerOptions::new().port(0));
    app.add_service(
        proto("person.proto"),
        "testapp.PersonService",
        ServiceImplementation::new().method("getPerson", |_ctx| async {
            if true {
                panic!("database exploded");
            }
            Ok(json!({}))
        }),
    )
    .unwrap();
    let (_transport, client) = start(&mut app);

    let err = client
        .unary("testapp.PersonService.getPerson", json!({"id": 1}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Internal);
    assert!(err.message().contains("database exploded"));
}

// ============================================================================
// Streaming calls
// ============================================================================

#[tokio::test]
async fn test_server_streaming() {
    let mut app = app();
    let (_transport, client) = start(&mut app);

    let stream = client
        .server_streaming("testapp.PersonService.listPeople", json!({}), Metadata::new())
        .unwrap();
    let people = stream.collect_messages().await.unwrap();
    let names: Vec<&str> = people.iter().filter_map(|p| p["name"].as_str()).collect();
    assert_eq!(names, vec!["Ada", "Grace", "Edsger"]);
}

#[tokio::test]
async fn test_server_streaming_failure_emits_normalized_error() {
    let mut app = Condor::new(ServerOptions::new().port(0));
    app.add_service(
        proto("person.proto"),
        "testapp.PersonService",
        ServiceImplementation::new().method("listPeople", |ctx| async move {
            ctx.write(&json!({"id": 1})).await?;
            Err::<(), _>(Status::new(Code::Ok, ""))
        }),
    )
    .unwrap();
    let (_transport, client) = start(&mut app);

    let mut stream = client
        .server_streaming("testapp.PersonService.listPeople", json!({}), Metadata::new())
        .unwrap();
    assert_eq!(stream.message().await.unwrap().unwrap(), json!({"id": 1}));
    let err = stream.message().await.unwrap().unwrap_err();
    assert_eq!(err.code(), Code::Internal);
    assert_eq!(err.message(), "Internal Server Error");
    assert!(stream.message().await.is_none());
}

#[tokio::test]
async fn test_client_streaming() {
    let mut app = app();
    let (_transport, client) = start(&mut app);

    let (sink, pending) = client
        .client_streaming("testapp.PersonService.addPeople", Metadata::new())
        .unwrap();
    sink.send(json!({"id": 1, "name": "Ada"}));
    sink.send(json!({"id": 2, "name": "Grace"}));
    sink.end();

    let response = pending.response().await.unwrap();
    assert_eq!(response.grpc_object(), json!({"count": 2}));
}

#[tokio::test]
async fn test_client_streaming_aborted_by_client() {
    let mut app = app();
    let (_transport, client) = start(&mut app);

    let (sink, pending) = client
        .client_streaming("testapp.PersonService.addPeople", Metadata::new())
        .unwrap();
    sink.send(json!({"id": 1}));
    sink.error(Status::cancelled("changed my mind"));

    let err = pending.response().await.unwrap_err();
    assert_eq!(err.code(), Code::Cancelled);
}

#[tokio::test]
async fn test_bidirectional() {
    let mut app = app();
    let (_transport, client) = start(&mut app);

    let (sink, mut stream) = client
        .bidirectional("testapp.PersonService.chat", Metadata::new())
        .unwrap();
    sink.send(json!({"id": 1}));
    assert_eq!(
        stream.message().await.unwrap().unwrap(),
        json!({"id": 1, "name": "echo"})
    );
    sink.send(json!({"id": 2}));
    assert_eq!(
        stream.message().await.unwrap().unwrap(),
        json!({"id": 2, "name": "echo"})
    );
    sink.end();
    assert!(stream.message().await.is_none());
}

#[tokio::test]
async fn test_wrong_call_kind_is_unimplemented() {
    let mut app = app();
    let (_transport, client) = start(&mut app);

    let err = client
        .unary("testapp.PersonService.listPeople", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);

    let err = client
        .unary("testapp.PersonService.nope", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);
}

// ============================================================================
// Registration and lifecycle
// ============================================================================

#[test]
fn test_registration_errors() {
    let mut app = Condor::default();

    let err = app
        .add_service(proto("missing.proto"), "testapp.PersonService", people())
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot add service: ProtoFilePath is not a valid file path"
    );

    let err = app
        .add_service(proto("not_a_proto.txt"), "Greeter", people())
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot add service: ProtoFilePath is not a valid file"
    );

    let err = app
        .add_service(proto("person.proto"), "zoo.PersonService", people())
        .unwrap_err();
    assert_eq!(err.to_string(), "Cannot add service: Package name not found");

    let err = app
        .add_service(proto("person.proto"), "testapp.PlantService", people())
        .unwrap_err();
    assert_eq!(err.to_string(), "Cannot add service: Service name not found");

    let err = app
        .add_services(
            proto("person.proto"),
            [
                ("testapp.PersonService", people()),
                ("testapp.PlantService", people()),
            ],
        )
        .unwrap_err();
    assert!(matches!(err, CondorError::Validation { .. }));
    assert!(app.builder().services().is_empty());

    let err = app
        .use_middleware_for("", |_ctx, _next| async { Ok(()) })
        .unwrap_err();
    assert!(matches!(err, CondorError::Validation { .. }));
}

#[tokio::test]
async fn test_registration_frozen_after_start() {
    let mut app = app();
    let (transport, _client) = start(&mut app);
    assert_eq!(
        transport.routes(),
        vec![
            "testapp.PersonService.addPeople",
            "testapp.PersonService.chat",
            "testapp.PersonService.getPerson",
            "testapp.PersonService.listPeople",
        ]
    );

    let err = app
        .use_middleware(|_ctx, _next| async { Ok(()) })
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot add middleware: Server has already started"
    );
    let err = app
        .add_error_handler(|_error, _ctx, _next| async { Ok(()) })
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot add error handler: Server has already started"
    );
    assert!(app.builder().middleware().is_empty());
}

#[tokio::test]
async fn test_graceful_stop_drains_in_flight_calls() {
    let mut app = Condor::new(ServerOptions::new().port(0));
    app.add_service(
        proto("person.proto"),
        "testapp.PersonService",
        ServiceImplementation::new().method("getPerson", |_ctx| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(json!({"slow": true}))
        }),
    )
    .unwrap();
    let (transport, client) = start(&mut app);

    let in_flight = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .unary("testapp.PersonService.getPerson", json!({}))
                .await
        })
    };
    while transport.in_flight() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    app.stop().await.unwrap();
    assert_eq!(transport.in_flight(), 0);
    let response = in_flight.await.unwrap().unwrap();
    assert_eq!(response.grpc_object(), json!({"slow": true}));

    let err = client
        .unary("testapp.PersonService.getPerson", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unavailable);
}

#[tokio::test]
async fn test_force_stop_cancels_in_flight_calls() {
    let mut app = Condor::new(ServerOptions::new().port(0));
    app.add_service(
        proto("person.proto"),
        "testapp.PersonService",
        ServiceImplementation::new().method("getPerson", |_ctx| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(json!({}))
        }),
    )
    .unwrap();
    let (transport, client) = start(&mut app);

    let in_flight = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .unary("testapp.PersonService.getPerson", json!({}))
                .await
        })
    };
    while transport.in_flight() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    app.force_stop().unwrap();
    let err = in_flight.await.unwrap().unwrap_err();
    assert_eq!(err.code(), Code::Cancelled);
    assert!(!transport.is_serving());
}
