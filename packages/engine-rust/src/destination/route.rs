use std::sync::Weak;

use async_trait::async_trait;
use switchyard_core::{Destination, Exchange, RouteError};

use crate::route::{Route, RouteFailure};

/// Destination that feeds the exchange into another route, making routes
/// with a `direct:` source callable from other routes.
///
/// The exchange keeps its unit of work, so the called route attaches to the
/// caller's scope. The route is held weakly; the owning context keeps it
/// alive.
pub struct RouteDestination {
    uri: String,
    route: Weak<Route>,
}

impl RouteDestination {
    #[must_use]
    pub fn new(uri: impl Into<String>, route: Weak<Route>) -> Self {
        Self {
            uri: uri.into(),
            route,
        }
    }
}

#[async_trait]
impl Destination for RouteDestination {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn send(&self, exchange: &mut Exchange) -> Result<(), RouteError> {
        let Some(route) = self.route.upgrade() else {
            return Err(RouteError::no_such_destination(&self.uri));
        };
        route.process(exchange).await.map_err(RouteFailure::into_error)
    }
}

impl std::fmt::Debug for RouteDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDestination")
            .field("uri", &self.uri)
            .field("live", &(self.route.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use switchyard_core::{ErrorKind, Processor, Value};

    use super::*;
    use crate::expression::Expression;
    use crate::policy::ExceptionPolicy;
    use crate::processor::{Pipeline, SetHeader};

    #[tokio::test]
    async fn forwards_into_the_route() {
        let steps: Vec<Arc<dyn Processor>> =
            vec![Arc::new(SetHeader::new("visited", Expression::constant(true)))];
        let route = Arc::new(Route::new(
            "sub",
            "direct:sub",
            Pipeline::new(steps),
            Arc::new(ExceptionPolicy::new("sub", 4)),
        ));
        let destination = RouteDestination::new("direct:sub", Arc::downgrade(&route));

        let mut exchange = Exchange::new("A");
        destination.send(&mut exchange).await.unwrap();
        assert_eq!(exchange.header("visited"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn dropped_route_is_no_such_destination() {
        let route = Arc::new(Route::new(
            "gone",
            "direct:gone",
            Pipeline::default(),
            Arc::new(ExceptionPolicy::new("gone", 4)),
        ));
        let destination = RouteDestination::new("direct:gone", Arc::downgrade(&route));
        drop(route);

        let err = destination.send(&mut Exchange::new("A")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSuchDestination);
    }
}
