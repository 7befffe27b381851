//! Metrics middleware for route services.
//!
//! Wraps each exchange in a tracing span and records counters and a duration
//! histogram through the `metrics` facade. Installing an exporter is left to
//! the embedding binary.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use switchyard_core::Exchange;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::route::RouteFailure;

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments exchanges with timing and outcome.
#[derive(Debug, Clone)]
pub struct MetricsLayer {
    route_id: Arc<str>,
}

impl MetricsLayer {
    #[must_use]
    pub fn new(route_id: &str) -> Self {
        Self {
            route_id: Arc::from(route_id),
        }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            route_id: self.route_id.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that records exchange duration and outcome.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
    route_id: Arc<str>,
}

/// Outcome label for a finished exchange.
fn outcome_label(result: &Result<Exchange, RouteFailure>) -> &'static str {
    match result {
        Ok(exchange) if exchange.is_handled() => "handled",
        Ok(_) => "completed",
        Err(RouteFailure::Unhandled { .. }) => "failed",
        Err(RouteFailure::Recovery { .. }) => "recovery_failed",
    }
}

impl<S> Service<Exchange> for MetricsService<S>
where
    S: Service<Exchange, Response = Exchange, Error = RouteFailure> + Send,
    S::Future: Send + 'static,
{
    type Response = Exchange;
    type Error = RouteFailure;
    type Future = Pin<Box<dyn Future<Output = Result<Exchange, RouteFailure>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, exchange: Exchange) -> Self::Future {
        let route_id = self.route_id.clone();

        let span = info_span!(
            "exchange",
            route = %route_id,
            exchange_id = %exchange.id(),
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(exchange);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
                let outcome = outcome_label(&result);

                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                ::metrics::counter!(
                    "switchyard_exchanges_total",
                    "route" => route_id.to_string(),
                    "outcome" => outcome
                )
                .increment(1);
                ::metrics::histogram!(
                    "switchyard_exchange_duration_ms",
                    "route" => route_id.to_string()
                )
                .record(duration_ms);

                tracing::info!(
                    route = %route_id,
                    duration_ms,
                    outcome,
                    "exchange complete"
                );

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
