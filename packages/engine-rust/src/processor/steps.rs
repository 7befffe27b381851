//! Built-in pipeline steps.

use std::sync::Arc;

use async_trait::async_trait;
use switchyard_core::{Exchange, Processor, RouteError};
use tracing::debug;

use crate::destination::DestinationRegistry;
use crate::expression::Expression;

/// Replaces the body with the expression's value.
#[derive(Debug, Clone)]
pub struct SetBody {
    expression: Expression,
}

impl SetBody {
    #[must_use]
    pub fn new(expression: Expression) -> Self {
        Self { expression }
    }
}

#[async_trait]
impl Processor for SetBody {
    fn label(&self) -> &str {
        "set_body"
    }

    async fn process(&self, exchange: &mut Exchange) -> Result<(), RouteError> {
        let body = self.expression.evaluate(exchange)?;
        exchange.set_body(body);
        Ok(())
    }
}

/// Sets a header to the expression's value.
#[derive(Debug, Clone)]
pub struct SetHeader {
    name: String,
    expression: Expression,
}

impl SetHeader {
    #[must_use]
    pub fn new(name: impl Into<String>, expression: Expression) -> Self {
        Self {
            name: name.into(),
            expression,
        }
    }
}

#[async_trait]
impl Processor for SetHeader {
    fn label(&self) -> &str {
        "set_header"
    }

    async fn process(&self, exchange: &mut Exchange) -> Result<(), RouteError> {
        let value = self.expression.evaluate(exchange)?;
        exchange.set_header(self.name.clone(), value);
        Ok(())
    }
}

/// Sets an exchange property to the expression's value.
#[derive(Debug, Clone)]
pub struct SetProperty {
    name: String,
    expression: Expression,
}

impl SetProperty {
    #[must_use]
    pub fn new(name: impl Into<String>, expression: Expression) -> Self {
        Self {
            name: name.into(),
            expression,
        }
    }
}

#[async_trait]
impl Processor for SetProperty {
    fn label(&self) -> &str {
        "set_property"
    }

    async fn process(&self, exchange: &mut Exchange) -> Result<(), RouteError> {
        let value = self.expression.evaluate(exchange)?;
        exchange.set_property(self.name.clone(), value);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RemoveHeader {
    name: String,
}

impl RemoveHeader {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Processor for RemoveHeader {
    fn label(&self) -> &str {
        "remove_header"
    }

    async fn process(&self, exchange: &mut Exchange) -> Result<(), RouteError> {
        exchange.remove_header(&self.name);
        Ok(())
    }
}

/// Sends the exchange to one fixed destination.
///
/// The destination is looked up at send time, so routes may reference
/// destinations (including other routes) registered after them.
pub struct SendTo {
    uri: String,
    registry: Arc<DestinationRegistry>,
}

impl SendTo {
    #[must_use]
    pub fn new(uri: impl Into<String>, registry: Arc<DestinationRegistry>) -> Self {
        Self {
            uri: uri.into(),
            registry,
        }
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

#[async_trait]
impl Processor for SendTo {
    fn label(&self) -> &str {
        "to"
    }

    async fn process(&self, exchange: &mut Exchange) -> Result<(), RouteError> {
        let destination = self.registry.resolve(&self.uri)?;
        debug!(uri = %self.uri, exchange_id = %exchange.id(), "sending to destination");
        destination.send(exchange).await
    }
}

impl std::fmt::Debug for SendTo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendTo").field("uri", &self.uri).finish()
    }
}
