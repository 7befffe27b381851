use async_trait::async_trait;

use crate::error::RouteError;
use crate::exchange::Exchange;

/// A single step of a pipeline or recovery pipeline.
///
/// Steps mutate the exchange in place. An `Err` is a failure of this step;
/// the executor running the step decides whether it is funneled into the
/// unit of work or returned to its caller.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Short label used in logs, e.g. `"set_body"` or `"recipient_list"`.
    fn label(&self) -> &str;

    /// Process the exchange.
    async fn process(&self, exchange: &mut Exchange) -> Result<(), RouteError>;
}

/// Send contract of a downstream destination (external collaborator).
///
/// A destination accepts an exchange and either returns success or raises a
/// failure. Internal asynchrony is the destination's concern; callers await
/// each send before moving to the next destination.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Identifier under which the destination is registered, e.g. `"mock:error"`.
    fn uri(&self) -> &str;

    /// Deliver the exchange.
    async fn send(&self, exchange: &mut Exchange) -> Result<(), RouteError>;

    /// One-time initialization before the first send.
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release resources. Called in reverse registration order.
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
