use std::sync::Arc;

use switchyard_core::{Begun, Exchange, FailureListener, Synchronization, UnitOfWork};
use tracing::{debug, warn};

use super::error::RouteFailure;
use crate::policy::ExceptionPolicy;
use crate::processor::{Pipeline, PipelineOutcome};

/// A pipeline bound to a source URI together with its exception policy.
pub struct Route {
    id: String,
    from: String,
    pipeline: Pipeline,
    policy: Arc<ExceptionPolicy>,
    synchronizations: Vec<Arc<dyn Synchronization>>,
}

impl Route {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        from: impl Into<String>,
        pipeline: Pipeline,
        policy: Arc<ExceptionPolicy>,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            pipeline,
            policy,
            synchronizations: Vec::new(),
        }
    }

    /// Consuming builder: a completion callback attached to every unit of
    /// work this route begins.
    #[must_use]
    pub fn with_synchronization(mut self, synchronization: Arc<dyn Synchronization>) -> Self {
        self.synchronizations.push(synchronization);
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// URI of the source that feeds this route.
    #[must_use]
    pub fn source_uri(&self) -> &str {
        &self.from
    }

    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    #[must_use]
    pub fn policy(&self) -> &Arc<ExceptionPolicy> {
        &self.policy
    }

    /// Runs the exchange through this route.
    ///
    /// An exchange without a unit of work gets a new one (capturing the
    /// original message) that this route completes and removes when it
    /// returns. An exchange that already carries one is attached to it: the
    /// route's policy listens on the shared scope only while the route runs.
    ///
    /// # Errors
    ///
    /// Returns [`RouteFailure`] when the exchange ends with a failure that no
    /// clause recovered.
    pub async fn process(&self, exchange: &mut Exchange) -> Result<(), RouteFailure> {
        let Begun {
            unit_of_work,
            owner,
        } = UnitOfWork::begin(exchange);
        let listener = unit_of_work.add_listener(self.policy.clone() as Arc<dyn FailureListener>);
        if owner {
            for synchronization in &self.synchronizations {
                unit_of_work.add_synchronization(synchronization.clone());
            }
        }
        debug!(
            route = %self.id,
            exchange_id = %exchange.id(),
            unit_of_work = %unit_of_work.id(),
            owner,
            "route entered"
        );

        let outcome = self.pipeline.run(exchange).await;

        if owner {
            unit_of_work.done(exchange);
            exchange.take_unit_of_work();
        } else {
            unit_of_work.remove_listener(listener);
            unit_of_work.detach();
        }

        match outcome {
            PipelineOutcome::Completed | PipelineOutcome::Handled => Ok(()),
            PipelineOutcome::Failed(error) => {
                warn!(
                    route = %self.id,
                    exchange_id = %exchange.id(),
                    phase = ?error.phase(),
                    %error,
                    "exchange failed"
                );
                Err(RouteFailure::from_error(self.id.clone(), error))
            }
        }
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("from", &self.from)
            .field("pipeline", &self.pipeline)
            .field("policy", &self.policy)
            .field("synchronizations", &self.synchronizations.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use switchyard_core::{ErrorKind, Processor, Value};

    use super::*;
    use crate::destination::{DestinationRegistry, MockDestination};
    use crate::expression::Expression;
    use crate::policy::ExceptionClause;
    use crate::processor::{SendTo, SetBody};

    struct Outcomes(Arc<Mutex<Vec<&'static str>>>);

    impl Synchronization for Outcomes {
        fn on_complete(&self, _exchange: &Exchange) {
            self.0.lock().push("complete");
        }

        fn on_failure(&self, _exchange: &Exchange) {
            self.0.lock().push("failure");
        }
    }

    fn route(
        registry: &Arc<DestinationRegistry>,
        target: &str,
        clauses: Vec<ExceptionClause>,
    ) -> Route {
        let steps: Vec<Arc<dyn Processor>> = vec![
            Arc::new(SetBody::new(Expression::constant("B"))),
            Arc::new(SendTo::new(target, registry.clone())),
        ];
        let policy = Arc::new(ExceptionPolicy::new("r", 4));
        for clause in clauses {
            policy.register(clause);
        }
        Route::new("r", "direct:start", Pipeline::new(steps), policy)
    }

    #[tokio::test]
    async fn owner_scope_is_completed_and_removed() {
        let registry = Arc::new(DestinationRegistry::new());
        let out = Arc::new(MockDestination::new("mock:out"));
        registry.register(out.clone());
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let route = route(&registry, "mock:out", vec![])
            .with_synchronization(Arc::new(Outcomes(outcomes.clone())));

        let mut exchange = Exchange::new("A");
        route.process(&mut exchange).await.unwrap();

        assert!(exchange.unit_of_work().is_none());
        assert_eq!(out.received_bodies(), vec![Value::from("B")]);
        assert_eq!(*outcomes.lock(), vec!["complete"]);
    }

    #[tokio::test]
    async fn unmatched_failure_surfaces_to_caller_and_callbacks() {
        let registry = Arc::new(DestinationRegistry::new());
        registry.register(Arc::new(
            MockDestination::new("mock:broken").failing(ErrorKind::Io, "down"),
        ));
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let route = route(
            &registry,
            "mock:broken",
            vec![ExceptionClause::new([ErrorKind::Validation]).handled(true)],
        )
        .with_synchronization(Arc::new(Outcomes(outcomes.clone())));

        let mut exchange = Exchange::new("A");
        let failure = route.process(&mut exchange).await.unwrap_err();

        assert!(matches!(failure, RouteFailure::Unhandled { .. }));
        assert_eq!(failure.error().kind(), ErrorKind::Io);
        assert!(exchange.is_failed());
        assert_eq!(*outcomes.lock(), vec!["failure"]);
    }

    #[tokio::test]
    async fn handled_failure_completes_the_route() {
        let registry = Arc::new(DestinationRegistry::new());
        registry.register(Arc::new(
            MockDestination::new("mock:broken").failing(ErrorKind::Io, "down"),
        ));
        let route = route(
            &registry,
            "mock:broken",
            vec![ExceptionClause::new([ErrorKind::Io]).handled(true)],
        );

        let mut exchange = Exchange::new("A");
        route.process(&mut exchange).await.unwrap();

        assert!(exchange.is_handled());
        assert!(!exchange.is_failed());
    }

    #[tokio::test]
    async fn attached_route_listens_only_while_running() {
        let registry = Arc::new(DestinationRegistry::new());
        registry.register(Arc::new(MockDestination::new("mock:out")));
        let route = route(&registry, "mock:out", vec![]);

        let mut exchange = Exchange::new("A");
        let outer = UnitOfWork::begin(&mut exchange).unit_of_work;
        route.process(&mut exchange).await.unwrap();

        assert!(Arc::ptr_eq(exchange.unit_of_work().unwrap(), &outer));
        assert_eq!(outer.listener_count(), 0);
        assert_eq!(outer.attached(), 0);
        assert!(!outer.is_done());
    }
}
