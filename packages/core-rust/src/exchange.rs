//! The exchange: one in-flight unit of work moving through a route.

use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::RouteError;
use crate::message::Message;
use crate::types::Value;
use crate::unit_of_work::UnitOfWork;

/// Identifier of an exception clause, unique within a process.
pub type ClauseId = u64;

/// Mutable container for a message travelling through a route.
///
/// Holds the message (body and headers), exchange-scoped properties in a
/// namespace separate from headers, a single exception slot, and a handle to
/// the governing [`UnitOfWork`]. The handle is reference-counted: the unit of
/// work owns the snapshot and listeners, the exchange only points at it.
#[derive(Debug)]
pub struct Exchange {
    id: String,
    message: Message,
    properties: BTreeMap<String, Value>,
    exception: Option<RouteError>,
    handled: bool,
    unit_of_work: Option<Arc<UnitOfWork>>,
    /// Clauses whose recovery pipeline is currently running on this exchange,
    /// innermost last.
    recovery_trail: Vec<ClauseId>,
}

impl Exchange {
    /// Creates an exchange with a fresh id around the given body.
    #[must_use]
    pub fn new(body: impl Into<Value>) -> Self {
        Self::from_message(Message::new(body))
    }

    #[must_use]
    pub fn from_message(message: Message) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message,
            properties: BTreeMap::new(),
            exception: None,
            handled: false,
            unit_of_work: None,
            recovery_trail: Vec::new(),
        }
    }

    /// Consuming builder: adds or replaces a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.message.set_header(name, value);
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    // -- message ------------------------------------------------------------

    #[must_use]
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Replaces body and headers wholesale. Properties and the exception slot
    /// are untouched.
    pub fn replace_message(&mut self, message: Message) -> Message {
        std::mem::replace(&mut self.message, message)
    }

    #[must_use]
    pub fn body(&self) -> &Value {
        self.message.body()
    }

    pub fn set_body(&mut self, body: impl Into<Value>) {
        self.message.set_body(body);
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&Value> {
        self.message.header(name)
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.message.set_header(name, value)
    }

    pub fn remove_header(&mut self, name: &str) -> Option<Value> {
        self.message.remove_header(name)
    }

    // -- properties ---------------------------------------------------------

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.properties.insert(name.into(), value.into())
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }

    #[must_use]
    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    // -- exception slot -----------------------------------------------------

    #[must_use]
    pub fn exception(&self) -> Option<&RouteError> {
        self.exception.as_ref()
    }

    /// Stores `error` in the exception slot unless the exchange is already
    /// marked handled. Returns whether the slot was written.
    pub fn set_exception(&mut self, error: RouteError) -> bool {
        if self.handled {
            return false;
        }
        self.exception = Some(error);
        true
    }

    pub fn take_exception(&mut self) -> Option<RouteError> {
        self.exception.take()
    }

    /// `true` while an exception occupies the slot.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.exception.is_some()
    }

    #[must_use]
    pub fn is_handled(&self) -> bool {
        self.handled
    }

    pub fn set_handled(&mut self, handled: bool) {
        self.handled = handled;
    }

    /// Puts a failure back on an exchange that was marked handled, e.g. when
    /// the recovery that marked it fails in turn.
    pub fn reopen(&mut self, error: RouteError) {
        self.handled = false;
        self.exception = Some(error);
    }

    // -- unit of work -------------------------------------------------------

    #[must_use]
    pub fn unit_of_work(&self) -> Option<&Arc<UnitOfWork>> {
        self.unit_of_work.as_ref()
    }

    /// Installs a unit of work handle, returning the one it replaced.
    pub fn replace_unit_of_work(
        &mut self,
        unit_of_work: Option<Arc<UnitOfWork>>,
    ) -> Option<Arc<UnitOfWork>> {
        std::mem::replace(&mut self.unit_of_work, unit_of_work)
    }

    pub fn take_unit_of_work(&mut self) -> Option<Arc<UnitOfWork>> {
        self.unit_of_work.take()
    }

    // -- recovery trail -----------------------------------------------------

    /// Clauses whose recovery is currently running, outermost first.
    #[must_use]
    pub fn recovery_trail(&self) -> &[ClauseId] {
        &self.recovery_trail
    }

    #[must_use]
    pub fn is_recovering(&self) -> bool {
        !self.recovery_trail.is_empty()
    }

    pub fn enter_recovery(&mut self, clause: ClauseId) {
        self.recovery_trail.push(clause);
    }

    pub fn leave_recovery(&mut self) -> Option<ClauseId> {
        self.recovery_trail.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn headers_and_properties_are_separate_namespaces() {
        let mut exchange = Exchange::new("A");
        exchange.set_header("key", "header");
        exchange.set_property("key", "property");

        assert_eq!(exchange.header("key"), Some(&Value::from("header")));
        assert_eq!(exchange.property("key"), Some(&Value::from("property")));

        exchange.remove_header("key");
        assert!(exchange.header("key").is_none());
        assert!(exchange.property("key").is_some());
    }

    #[test]
    fn exception_slot_is_not_overwritten_once_handled() {
        let mut exchange = Exchange::new("A");
        assert!(exchange.set_exception(RouteError::new(ErrorKind::Io, "first")));
        assert!(exchange.set_exception(RouteError::new(ErrorKind::Io, "second")));
        assert_eq!(exchange.exception().unwrap().message(), "second");

        exchange.take_exception();
        exchange.set_handled(true);
        assert!(!exchange.set_exception(RouteError::new(ErrorKind::Io, "third")));
        assert!(!exchange.is_failed());
    }

    #[test]
    fn reopen_clears_handled() {
        let mut exchange = Exchange::new("A");
        exchange.set_handled(true);
        exchange.reopen(RouteError::new(ErrorKind::Io, "recovery failed"));
        assert!(!exchange.is_handled());
        assert!(exchange.is_failed());
    }

    #[test]
    fn replace_message_keeps_properties() {
        let mut exchange = Exchange::new("A");
        exchange.set_property("attempt", 1_i64);
        exchange.replace_message(Message::new("Z"));
        assert_eq!(exchange.body(), &Value::from("Z"));
        assert_eq!(exchange.property("attempt"), Some(&Value::Int(1)));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(Exchange::new("A").id(), Exchange::new("A").id());
    }
}
