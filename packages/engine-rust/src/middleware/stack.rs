//! Service stack composition for routes.

use std::sync::Arc;

use switchyard_core::Exchange;
use tower::ServiceBuilder;

use super::metrics::MetricsLayer;
use crate::route::{Route, RouteFailure};
use crate::service::RouteService;

/// Wrap a route in its middleware layers.
///
/// The returned service implements `tower::Service<Exchange>`.
#[must_use]
pub fn build_route_service(
    route: Arc<Route>,
) -> impl tower::Service<Exchange, Response = Exchange, Error = RouteFailure> + Clone {
    ServiceBuilder::new()
        .layer(MetricsLayer::new(route.id()))
        .service(RouteService::new(route))
}
