//! End-to-end recovery behaviour across pipelines, recipient lists, and
//! nested routes.

use std::io::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use switchyard_core::{Destination, ErrorKind, Exchange, FailurePhase, RouteError, Value};
use switchyard_engine::{
    ClauseDefinition, ContextError, Expression, MockDestination, RouteContext, RouteDefinition,
    RouteFailure, StepDefinition,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn mock(context: &RouteContext, uri: &str) -> Arc<MockDestination> {
    let mock = Arc::new(MockDestination::new(uri));
    context.destinations().register(mock.clone());
    mock
}

fn failing_mock(context: &RouteContext, uri: &str) -> Arc<MockDestination> {
    let mock = Arc::new(MockDestination::new(uri).failing(ErrorKind::Destination, "always fails"));
    context.destinations().register(mock.clone());
    mock
}

/// Route that turns "A" into "B", points `path` at the failing destination
/// and dispatches through a recipient list.
fn dispatching_route(share_unit_of_work: bool) -> RouteDefinition {
    RouteDefinition::new("start", "direct:start")
        .step(StepDefinition::set_body(Expression::constant("B")))
        .step(StepDefinition::set_header(
            "path",
            Expression::constant("mock:throwException"),
        ))
        .step(StepDefinition::recipient_list(
            Expression::header("path"),
            share_unit_of_work,
        ))
        .on_exception(
            ClauseDefinition::new([ErrorKind::Any])
                .handled(true)
                .use_original_message(true)
                .step(StepDefinition::to("mock:error")),
        )
}

/// Destination that appends its URI to a shared log, optionally failing.
struct Ordered {
    uri: String,
    log: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

#[async_trait]
impl Destination for Ordered {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn send(&self, _exchange: &mut Exchange) -> Result<(), RouteError> {
        self.log.lock().push(self.uri.clone());
        if self.fail {
            return Err(RouteError::new(ErrorKind::Io, format!("{} is down", self.uri)));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reference scenario
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shared_recipient_failure_restores_original_and_recovers() {
    let context = RouteContext::default();
    let thrower = failing_mock(&context, "mock:throwException");
    let capture = mock(&context, "mock:error");
    context.define_route(dispatching_route(true)).unwrap();

    let exchange = context
        .send("direct:start", Exchange::new("A"))
        .await
        .unwrap();

    assert_eq!(thrower.received_bodies(), vec![Value::from("B")]);
    assert_eq!(capture.received_bodies(), vec![Value::from("A")]);
    assert!(exchange.is_handled());
    assert!(exchange.exception().is_none());
    assert_eq!(exchange.body(), &Value::from("A"));
}

#[tokio::test]
async fn reference_routes_file_loads_from_disk() {
    let json = r#"{
        "config": { "context_name": "reference" },
        "routes": [{
            "id": "start",
            "from": "direct:start",
            "steps": [
                { "type": "set_body", "expression": { "type": "constant", "value": "B" } },
                { "type": "set_header", "name": "path",
                  "expression": { "type": "constant", "value": "mock:throwException" } },
                { "type": "recipient_list", "share_unit_of_work": true,
                  "expression": { "type": "simple", "value": "${header.path}" } }
            ],
            "on_exception": [{
                "kinds": ["any"],
                "handled": true,
                "use_original_message": true,
                "steps": [{ "type": "to", "uri": "mock:error" }]
            }]
        }]
    }"#;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();

    let (context, definitions) = RouteContext::from_routes_file(file.path()).unwrap();
    assert_eq!(context.config().context_name, "reference");
    failing_mock(&context, "mock:throwException");
    let capture = mock(&context, "mock:error");
    for definition in definitions {
        context.define_route(definition).unwrap();
    }

    context.start().await.unwrap();
    context
        .send("direct:start", Exchange::new("A"))
        .await
        .unwrap();
    context.stop().await.unwrap();

    assert_eq!(capture.received_bodies(), vec![Value::from("A")]);
}

// ---------------------------------------------------------------------------
// Handled and original-message restoration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn matched_failure_is_cleared_and_marked_handled() {
    let context = RouteContext::default();
    failing_mock(&context, "mock:throwException");
    mock(&context, "mock:error");
    let route = context.define_route(dispatching_route(true)).unwrap();

    let mut exchange = Exchange::new("A");
    route.process(&mut exchange).await.unwrap();

    assert!(exchange.is_handled());
    assert!(!exchange.is_failed());
}

#[tokio::test]
async fn original_message_restores_entry_headers_exactly() {
    let context = RouteContext::default();
    failing_mock(&context, "mock:broken");
    let capture = mock(&context, "mock:error");
    let route = context
        .define_route(
            RouteDefinition::new("headers", "direct:headers")
                .step(StepDefinition::set_header("h", Expression::constant("2")))
                .step(StepDefinition::set_header("added", Expression::constant(true)))
                .step(StepDefinition::RemoveHeader {
                    name: "keep".into(),
                })
                .step(StepDefinition::SetProperty {
                    name: "progress".into(),
                    expression: Expression::constant("mutated"),
                })
                .step(StepDefinition::set_body(Expression::constant("changed")))
                .step(StepDefinition::to("mock:broken"))
                .on_exception(
                    ClauseDefinition::new([ErrorKind::Destination])
                        .handled(true)
                        .use_original_message(true)
                        .step(StepDefinition::to("mock:error")),
                ),
        )
        .unwrap();

    let mut exchange = Exchange::new("orig")
        .with_header("h", "1")
        .with_header("keep", "yes");
    let entry = exchange.message().clone();
    route.process(&mut exchange).await.unwrap();

    assert_eq!(exchange.message(), &entry);
    assert_eq!(capture.received_messages(), vec![entry]);
    assert_eq!(exchange.property("progress"), Some(&Value::from("mutated")));
}

// ---------------------------------------------------------------------------
// Shared versus isolated dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn isolated_recipient_failure_is_invisible_to_route_clauses() {
    let context = RouteContext::default();
    let thrower = failing_mock(&context, "mock:throwException");
    let capture = mock(&context, "mock:error");
    let route = context.define_route(dispatching_route(false)).unwrap();

    let mut exchange = Exchange::new("A");
    let failure = route.process(&mut exchange).await.unwrap_err();

    assert!(matches!(failure, RouteFailure::Unhandled { .. }));
    assert_eq!(failure.error().kind(), ErrorKind::Destination);
    assert_eq!(thrower.received_count(), 1);
    assert_eq!(capture.received_count(), 0);
    assert!(exchange.is_failed());
    assert!(!exchange.is_handled());
    assert_eq!(exchange.body(), &Value::from("B"));
}

#[tokio::test]
async fn isolated_failure_surfaces_to_sender() {
    let context = RouteContext::default();
    failing_mock(&context, "mock:throwException");
    mock(&context, "mock:error");
    context.define_route(dispatching_route(false)).unwrap();

    let err = context
        .send("direct:start", Exchange::new("A"))
        .await
        .unwrap_err();
    assert!(matches!(err, ContextError::Route(RouteFailure::Unhandled { .. })));
}

/// Parent route dispatching to `direct:sub`, which mutates the body to "C"
/// before hitting the failing destination.
fn define_nested(context: &RouteContext, share_unit_of_work: bool) {
    context
        .define_route(
            RouteDefinition::new("sub", "direct:sub")
                .step(StepDefinition::set_body(Expression::constant("C")))
                .step(StepDefinition::to("mock:throwException"))
                .on_exception(
                    ClauseDefinition::new([ErrorKind::Destination])
                        .handled(true)
                        .use_original_message(true)
                        .step(StepDefinition::to("mock:subError")),
                ),
        )
        .unwrap();
    context
        .define_route(
            RouteDefinition::new("parent", "direct:parent")
                .step(StepDefinition::set_body(Expression::constant("B")))
                .step(StepDefinition::recipient_list(
                    Expression::constant("direct:sub"),
                    share_unit_of_work,
                ))
                .step(StepDefinition::to("mock:after"))
                .on_exception(
                    ClauseDefinition::new([ErrorKind::Any])
                        .handled(true)
                        .use_original_message(true)
                        .step(StepDefinition::to("mock:error")),
                ),
        )
        .unwrap();
}

#[tokio::test]
async fn shared_dispatch_lets_parent_clause_restore_parent_entry_state() {
    let context = RouteContext::default();
    failing_mock(&context, "mock:throwException");
    let parent_capture = mock(&context, "mock:error");
    let sub_capture = mock(&context, "mock:subError");
    let after = mock(&context, "mock:after");
    define_nested(&context, true);

    let exchange = context
        .send("direct:parent", Exchange::new("A"))
        .await
        .unwrap();

    // The parent's clause is consulted first on the shared scope.
    assert_eq!(parent_capture.received_bodies(), vec![Value::from("A")]);
    assert_eq!(sub_capture.received_count(), 0);
    assert_eq!(after.received_count(), 0);
    assert!(exchange.is_handled());
}

#[tokio::test]
async fn isolated_dispatch_restores_sub_exchange_state() {
    let context = RouteContext::default();
    failing_mock(&context, "mock:throwException");
    let parent_capture = mock(&context, "mock:error");
    let sub_capture = mock(&context, "mock:subError");
    let after = mock(&context, "mock:after");
    define_nested(&context, false);

    let exchange = context
        .send("direct:parent", Exchange::new("A"))
        .await
        .unwrap();

    // The sub route recovered inside its own scope, whose snapshot is the
    // exchange as dispatched; the parent kept routing.
    assert_eq!(sub_capture.received_bodies(), vec![Value::from("B")]);
    assert_eq!(parent_capture.received_count(), 0);
    assert_eq!(after.received_bodies(), vec![Value::from("B")]);
    assert!(!exchange.is_handled());
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn recipients_run_in_order_and_stop_at_first_failure() {
    let context = RouteContext::default();
    let log = Arc::new(Mutex::new(Vec::new()));
    for (uri, fail) in [("ord:first", false), ("ord:second", true), ("ord:third", false)] {
        context.destinations().register(Arc::new(Ordered {
            uri: uri.to_string(),
            log: log.clone(),
            fail,
        }));
    }
    let capture = mock(&context, "mock:error");
    context
        .define_route(
            RouteDefinition::new("ordered", "direct:ordered")
                .step(StepDefinition::recipient_list(
                    Expression::constant("ord:first, ord:second, ord:third"),
                    true,
                ))
                .on_exception(
                    ClauseDefinition::new([ErrorKind::Io])
                        .handled(true)
                        .step(StepDefinition::to("mock:error")),
                ),
        )
        .unwrap();

    context
        .send("direct:ordered", Exchange::new("x"))
        .await
        .unwrap();

    assert_eq!(*log.lock(), vec!["ord:first", "ord:second"]);
    assert_eq!(capture.received_count(), 1);
}

#[tokio::test]
async fn first_failing_recipient_blocks_the_rest_without_a_clause() {
    let context = RouteContext::default();
    let log = Arc::new(Mutex::new(Vec::new()));
    for (uri, fail) in [("ord:a", true), ("ord:b", false)] {
        context.destinations().register(Arc::new(Ordered {
            uri: uri.to_string(),
            log: log.clone(),
            fail,
        }));
    }
    let targets = Value::Array(vec![Value::from("ord:a"), Value::from("ord:b")]);
    context
        .define_route(
            RouteDefinition::new("bare", "direct:bare")
                .step(StepDefinition::set_header("targets", Expression::Constant(targets)))
                .step(StepDefinition::recipient_list(Expression::header("targets"), false)),
        )
        .unwrap();

    let err = context
        .send("direct:bare", Exchange::new("x"))
        .await
        .unwrap_err();

    assert!(matches!(err, ContextError::Route(_)));
    assert_eq!(*log.lock(), vec!["ord:a"]);
}

// ---------------------------------------------------------------------------
// Recovery failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn recovery_failure_never_reinvokes_its_own_clause() {
    let context = RouteContext::default();
    failing_mock(&context, "mock:throwException");
    let broken_recovery = failing_mock(&context, "mock:alsoBroken");
    context
        .define_route(
            RouteDefinition::new("loop", "direct:loop")
                .step(StepDefinition::recipient_list(
                    Expression::constant("mock:throwException"),
                    true,
                ))
                .on_exception(ClauseDefinition {
                    catch_recovery_failures: true,
                    ..ClauseDefinition::new([ErrorKind::Any])
                        .handled(true)
                        .step(StepDefinition::to("mock:alsoBroken"))
                }),
        )
        .unwrap();

    let mut exchange = Exchange::new("A");
    let route = context.route("loop").unwrap();
    let failure = route.process(&mut exchange).await.unwrap_err();

    assert!(failure.is_recovery());
    assert_eq!(broken_recovery.received_count(), 1);
    assert_eq!(failure.error().phase(), FailurePhase::Recovery);
    assert_eq!(
        failure.error().cause().unwrap().message(),
        "always fails"
    );
    assert!(!exchange.is_handled());
}

#[tokio::test]
async fn distinct_eligible_clause_catches_recovery_failure() {
    let context = RouteContext::default();
    failing_mock(&context, "mock:throwException");
    let broken_recovery = failing_mock(&context, "mock:alsoBroken");
    let fallback = mock(&context, "mock:fallback");
    context
        .define_route(
            RouteDefinition::new("fallback", "direct:fallback")
                .step(StepDefinition::to("mock:throwException"))
                .on_exception(
                    ClauseDefinition::new([ErrorKind::Destination])
                        .handled(true)
                        .step(StepDefinition::to("mock:alsoBroken")),
                )
                .on_exception(ClauseDefinition {
                    catch_recovery_failures: true,
                    ..ClauseDefinition::new([ErrorKind::Any])
                        .handled(true)
                        .step(StepDefinition::to("mock:fallback"))
                }),
        )
        .unwrap();

    let exchange = context
        .send("direct:fallback", Exchange::new("A"))
        .await
        .unwrap();

    assert_eq!(broken_recovery.received_count(), 1);
    assert_eq!(fallback.received_count(), 1);
    assert!(exchange.is_handled());
}

// ---------------------------------------------------------------------------
// Continued clauses
// ---------------------------------------------------------------------------

#[tokio::test]
async fn continued_clause_resumes_after_failing_step() {
    let context = RouteContext::default();
    context.destinations().register(Arc::new(
        MockDestination::new("mock:flaky").failing(ErrorKind::Validation, "bad input"),
    ));
    let out = mock(&context, "mock:out");
    context
        .define_route(
            RouteDefinition::new("lenient", "direct:lenient")
                .step(StepDefinition::to("mock:flaky"))
                .step(StepDefinition::set_header("after", Expression::constant("yes")))
                .step(StepDefinition::to("mock:out"))
                .on_exception(ClauseDefinition {
                    continued: true,
                    ..ClauseDefinition::new([ErrorKind::IllegalArgument])
                }),
        )
        .unwrap();

    let exchange = context
        .send("direct:lenient", Exchange::new("x"))
        .await
        .unwrap();

    assert_eq!(out.received_count(), 1);
    assert_eq!(exchange.header("after"), Some(&Value::from("yes")));
    assert!(!exchange.is_handled());
    assert!(!exchange.is_failed());
}
