use async_trait::async_trait;
use parking_lot::Mutex;
use switchyard_core::{Destination, ErrorKind, Exchange, Message, RouteError, Value};
use tracing::debug;

/// In-memory destination that records a copy of every message it receives.
///
/// A failing mock records the message and then raises its configured
/// failure, which makes it the usual stand-in for a broken downstream system.
pub struct MockDestination {
    uri: String,
    failure: Option<(ErrorKind, String)>,
    received: Mutex<Vec<Message>>,
}

impl MockDestination {
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            failure: None,
            received: Mutex::new(Vec::new()),
        }
    }

    /// Consuming builder: every send fails with `kind` after recording.
    #[must_use]
    pub fn failing(mut self, kind: ErrorKind, message: impl Into<String>) -> Self {
        self.failure = Some((kind, message.into()));
        self
    }

    #[must_use]
    pub fn is_failing(&self) -> bool {
        self.failure.is_some()
    }

    #[must_use]
    pub fn received_messages(&self) -> Vec<Message> {
        self.received.lock().clone()
    }

    #[must_use]
    pub fn received_bodies(&self) -> Vec<Value> {
        self.received
            .lock()
            .iter()
            .map(|message| message.body().clone())
            .collect()
    }

    #[must_use]
    pub fn received_count(&self) -> usize {
        self.received.lock().len()
    }

    pub fn reset(&self) {
        self.received.lock().clear();
    }
}

#[async_trait]
impl Destination for MockDestination {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn send(&self, exchange: &mut Exchange) -> Result<(), RouteError> {
        self.received.lock().push(exchange.message().clone());
        debug!(uri = %self.uri, exchange_id = %exchange.id(), "mock received message");

        match &self.failure {
            Some((kind, message)) => Err(RouteError::new(*kind, message.clone())),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for MockDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDestination")
            .field("uri", &self.uri)
            .field("failure", &self.failure)
            .field("received", &self.received_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_copies_of_messages() {
        let mock = MockDestination::new("mock:capture");
        let mut exchange = Exchange::new("A").with_header("h", "1");

        mock.send(&mut exchange).await.unwrap();
        exchange.set_body("B");
        mock.send(&mut exchange).await.unwrap();

        assert_eq!(mock.received_bodies(), vec![Value::from("A"), Value::from("B")]);
        assert_eq!(
            mock.received_messages()[0].header("h"),
            Some(&Value::from("1"))
        );

        mock.reset();
        assert_eq!(mock.received_count(), 0);
    }

    #[tokio::test]
    async fn failing_mock_records_then_fails() {
        let mock = MockDestination::new("mock:throwException")
            .failing(ErrorKind::Destination, "always fails");
        let mut exchange = Exchange::new("B");

        let err = mock.send(&mut exchange).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Destination);
        assert_eq!(err.message(), "always fails");
        assert_eq!(mock.received_count(), 1);
        assert!(mock.is_failing());
    }
}
