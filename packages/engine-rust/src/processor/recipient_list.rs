//! Dynamic recipient list: resolve destinations from the exchange at runtime
//! and dispatch to them one after another.

use std::sync::Arc;

use async_trait::async_trait;
use switchyard_core::{
    Destination, Exchange, FailureOutcome, Processor, RouteError, UnitOfWork, Value,
};
use tracing::debug;

use crate::destination::DestinationRegistry;
use crate::expression::Expression;

/// Router step that evaluates an expression to an ordered list of destination
/// URIs and sends the exchange to each in turn.
///
/// The expression is evaluated fresh for every exchange. Destinations run
/// strictly in resolved order on the same exchange instance, and dispatch
/// halts at the first failure. With a shared unit of work the failure goes
/// through the scope the exchange already carries, so the enclosing route's
/// clauses see it; otherwise a child scope is installed for the dispatch and
/// the failure stays inside it.
pub struct RecipientList {
    expression: Expression,
    registry: Arc<DestinationRegistry>,
    share_unit_of_work: bool,
    delimiter: String,
    ignore_invalid_destinations: bool,
}

impl RecipientList {
    #[must_use]
    pub fn new(expression: Expression, registry: Arc<DestinationRegistry>) -> Self {
        Self {
            expression,
            registry,
            share_unit_of_work: false,
            delimiter: ",".to_string(),
            ignore_invalid_destinations: false,
        }
    }

    #[must_use]
    pub fn share_unit_of_work(mut self, share: bool) -> Self {
        self.share_unit_of_work = share;
        self
    }

    /// Separator used to split a single string into several URIs.
    #[must_use]
    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Skip URIs with no registered destination instead of failing.
    #[must_use]
    pub fn ignore_invalid_destinations(mut self, ignore: bool) -> Self {
        self.ignore_invalid_destinations = ignore;
        self
    }

    #[must_use]
    pub fn shares_unit_of_work(&self) -> bool {
        self.share_unit_of_work
    }

    #[must_use]
    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Evaluates the expression against the exchange's current state.
    ///
    /// A string is split on the delimiter; an array yields its elements in
    /// order (string elements are split too); null yields nothing. Entries
    /// are trimmed and empty ones dropped.
    ///
    /// # Errors
    ///
    /// Propagates expression evaluation failures.
    pub fn resolve(&self, exchange: &Exchange) -> Result<Vec<String>, RouteError> {
        let mut uris = Vec::new();
        self.collect(&self.expression.evaluate(exchange)?, &mut uris);
        Ok(uris)
    }

    fn collect(&self, value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Null => {}
            Value::String(s) => out.extend(
                s.split(self.delimiter.as_str())
                    .map(str::trim)
                    .filter(|uri| !uri.is_empty())
                    .map(str::to_string),
            ),
            Value::Array(items) => {
                for item in items {
                    self.collect(item, out);
                }
            }
            other => {
                let rendered = other.render();
                let uri = rendered.trim();
                if !uri.is_empty() {
                    out.push(uri.to_string());
                }
            }
        }
    }

    /// Sends the exchange to `uris` in order.
    ///
    /// Every URI is looked up before anything is sent. A destination failure
    /// stops the dispatch and is passed to the active unit of work's `fail`;
    /// a recovered failure returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchDestination` for an unknown URI (unless ignored), or the
    /// destination failure when no listener recovered it.
    pub async fn dispatch(&self, exchange: &mut Exchange, uris: &[String]) -> Result<(), RouteError> {
        let targets = self.lookup(uris)?;
        if targets.is_empty() {
            debug!(exchange_id = %exchange.id(), "recipient list resolved no destinations");
            return Ok(());
        }

        let handled_before = exchange.is_handled();
        let parent = if self.share_unit_of_work {
            None
        } else {
            Some(UnitOfWork::fork(exchange))
        };

        let result = match send_in_order(exchange, &targets, handled_before).await {
            Ok(()) => Ok(()),
            Err(error) => funnel(exchange, error).await,
        };

        if let Some(parent) = parent {
            if let Some(child) = exchange.replace_unit_of_work(parent) {
                child.done(exchange);
            }
            // A recovery inside the child scope does not end the parent's
            // routing.
            if !handled_before {
                exchange.set_handled(false);
            }
        }

        result
    }

    fn lookup(&self, uris: &[String]) -> Result<Vec<Arc<dyn Destination>>, RouteError> {
        let mut targets = Vec::with_capacity(uris.len());
        for uri in uris {
            match self.registry.get(uri) {
                Some(destination) => targets.push(destination),
                None if self.ignore_invalid_destinations => {
                    debug!(uri = %uri, "skipping unknown recipient");
                }
                None => return Err(RouteError::no_such_destination(uri)),
            }
        }
        Ok(targets)
    }
}

async fn send_in_order(
    exchange: &mut Exchange,
    targets: &[Arc<dyn Destination>],
    handled_before: bool,
) -> Result<(), RouteError> {
    for (index, destination) in targets.iter().enumerate() {
        debug!(
            exchange_id = %exchange.id(),
            uri = destination.uri(),
            index,
            "dispatching to recipient"
        );
        destination.send(exchange).await?;
        if exchange.is_handled() && !handled_before {
            debug!(
                exchange_id = %exchange.id(),
                uri = destination.uri(),
                "exchange handled by recipient, halting dispatch"
            );
            break;
        }
    }
    Ok(())
}

/// Passes a dispatch failure to whichever unit of work the exchange carries
/// right now.
async fn funnel(exchange: &mut Exchange, error: RouteError) -> Result<(), RouteError> {
    let Some(uow) = exchange.unit_of_work().cloned() else {
        exchange.set_exception(error.clone());
        return Err(error);
    };
    let fallback = error.clone();
    match uow.fail(exchange, error).await {
        FailureOutcome::Handled | FailureOutcome::Continued => Ok(()),
        FailureOutcome::Unhandled => Err(exchange.exception().cloned().unwrap_or(fallback)),
    }
}

#[async_trait]
impl Processor for RecipientList {
    fn label(&self) -> &str {
        "recipient_list"
    }

    async fn process(&self, exchange: &mut Exchange) -> Result<(), RouteError> {
        let uris = self.resolve(exchange)?;
        self.dispatch(exchange, &uris).await
    }
}

impl std::fmt::Debug for RecipientList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipientList")
            .field("expression", &self.expression)
            .field("share_unit_of_work", &self.share_unit_of_work)
            .field("delimiter", &self.delimiter)
            .field("ignore_invalid_destinations", &self.ignore_invalid_destinations)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
