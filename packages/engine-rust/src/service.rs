//! Tower adapter: a route as a `Service<Exchange>`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use switchyard_core::Exchange;
use tower::Service;

use crate::route::{Route, RouteFailure};

/// Boxed future returned by route services.
pub type RouteFuture = Pin<Box<dyn Future<Output = Result<Exchange, RouteFailure>> + Send>>;

/// Processes each request exchange through one route and hands it back.
///
/// Always ready; a route has no capacity limit of its own.
#[derive(Debug, Clone)]
pub struct RouteService {
    route: Arc<Route>,
}

impl RouteService {
    #[must_use]
    pub fn new(route: Arc<Route>) -> Self {
        Self { route }
    }

    #[must_use]
    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }
}

impl Service<Exchange> for RouteService {
    type Response = Exchange;
    type Error = RouteFailure;
    type Future = RouteFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut exchange: Exchange) -> Self::Future {
        let route = self.route.clone();
        Box::pin(async move {
            route.process(&mut exchange).await?;
            Ok(exchange)
        })
    }
}

#[cfg(test)]
mod tests {
    use switchyard_core::{ErrorKind, Processor, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::destination::{DestinationRegistry, MockDestination};
    use crate::expression::Expression;
    use crate::policy::ExceptionPolicy;
    use crate::processor::{Pipeline, SendTo, SetBody};

    fn route(target: &str, registry: &Arc<DestinationRegistry>) -> Arc<Route> {
        let steps: Vec<Arc<dyn Processor>> = vec![
            Arc::new(SetBody::new(Expression::constant("done"))),
            Arc::new(SendTo::new(target, registry.clone())),
        ];
        Arc::new(Route::new(
            "svc",
            "direct:svc",
            Pipeline::new(steps),
            Arc::new(ExceptionPolicy::new("svc", 4)),
        ))
    }

    #[tokio::test]
    async fn returns_processed_exchange() {
        let registry = Arc::new(DestinationRegistry::new());
        registry.register(Arc::new(MockDestination::new("mock:ok")));
        let svc = RouteService::new(route("mock:ok", &registry));

        let exchange = svc.oneshot(Exchange::new("start")).await.unwrap();
        assert_eq!(exchange.body(), &Value::from("done"));
    }

    #[tokio::test]
    async fn unrecovered_failure_is_the_service_error() {
        let registry = Arc::new(DestinationRegistry::new());
        registry.register(Arc::new(
            MockDestination::new("mock:down").failing(ErrorKind::Timeout, "slow"),
        ));
        let svc = RouteService::new(route("mock:down", &registry));

        let failure = svc.oneshot(Exchange::new("start")).await.unwrap_err();
        assert_eq!(failure.route_id(), "svc");
        assert_eq!(failure.error().kind(), ErrorKind::Timeout);
    }
}
