//! Message payload and the immutable original-message snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::Value;

/// Body plus headers of an exchange. Header names are unique.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    body: Value,
    headers: BTreeMap<String, Value>,
}

impl Message {
    /// Creates a message with the given body and no headers.
    #[must_use]
    pub fn new(body: impl Into<Value>) -> Self {
        Self {
            body: body.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Consuming builder: adds or replaces a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Value {
        &mut self.body
    }

    pub fn set_body(&mut self, body: impl Into<Value>) {
        self.body = body.into();
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.get(name)
    }

    /// Sets a header, returning the value it replaced.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.headers.insert(name.into(), value.into())
    }

    pub fn remove_header(&mut self, name: &str) -> Option<Value> {
        self.headers.remove(name)
    }

    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, Value> {
        &self.headers
    }
}

/// Immutable copy of the body and headers taken when a unit of work captures
/// its original input.
///
/// Shared behind an [`Arc`]; there is no way to mutate a snapshot once built.
/// Recovery copies out of it with [`MessageSnapshot::to_message`].
#[derive(Debug)]
pub struct MessageSnapshot {
    message: Message,
    captured_at_ms: u64,
}

impl MessageSnapshot {
    /// Captures a copy of `message`.
    #[must_use]
    pub fn capture(message: &Message) -> Arc<Self> {
        let captured_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        Arc::new(Self {
            message: message.clone(),
            captured_at_ms,
        })
    }

    /// Borrow the captured message.
    #[must_use]
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// A fresh, independently owned copy of the captured message.
    #[must_use]
    pub fn to_message(&self) -> Message {
        self.message.clone()
    }

    /// Wall-clock capture time in milliseconds since the Unix epoch.
    #[must_use]
    pub fn captured_at_ms(&self) -> u64 {
        self.captured_at_ms
    }
}
