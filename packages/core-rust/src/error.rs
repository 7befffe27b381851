//! Failure kinds and the error value carried in an exchange's exception slot.
//!
//! Failure kinds form a closed set with an explicit "is-a" table rather than a
//! type hierarchy discovered at runtime. [`ErrorKind::distance_to`] measures
//! how many is-a hops separate a kind from one of its ancestors, which is what
//! exception clauses use to rank specificity.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Closed set of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Root of the hierarchy; every kind is-a `Any`.
    Any,
    /// Programming or state errors raised while processing.
    Runtime,
    IllegalArgument,
    IllegalState,
    /// Payload failed validation.
    Validation,
    /// An expression could not be evaluated.
    Expression,
    /// A destination identifier did not resolve to a registered destination.
    NoSuchDestination,
    /// Input/output failures reported by a destination or collaborator.
    Io,
    FileNotFound,
    Timeout,
    /// A destination rejected or failed to accept an exchange.
    Destination,
}

/// Parent relation: `(kind, parent)`. Every kind except [`ErrorKind::Any`]
/// appears exactly once on the left-hand side.
const IS_A: &[(ErrorKind, ErrorKind)] = &[
    (ErrorKind::Runtime, ErrorKind::Any),
    (ErrorKind::IllegalArgument, ErrorKind::Runtime),
    (ErrorKind::IllegalState, ErrorKind::Runtime),
    (ErrorKind::Validation, ErrorKind::IllegalArgument),
    (ErrorKind::Expression, ErrorKind::Runtime),
    (ErrorKind::NoSuchDestination, ErrorKind::Runtime),
    (ErrorKind::Io, ErrorKind::Any),
    (ErrorKind::FileNotFound, ErrorKind::Io),
    (ErrorKind::Timeout, ErrorKind::Io),
    (ErrorKind::Destination, ErrorKind::Any),
];

impl ErrorKind {
    /// All kinds, in declaration order.
    pub const ALL: [ErrorKind; 11] = [
        ErrorKind::Any,
        ErrorKind::Runtime,
        ErrorKind::IllegalArgument,
        ErrorKind::IllegalState,
        ErrorKind::Validation,
        ErrorKind::Expression,
        ErrorKind::NoSuchDestination,
        ErrorKind::Io,
        ErrorKind::FileNotFound,
        ErrorKind::Timeout,
        ErrorKind::Destination,
    ];

    /// Direct parent in the is-a table, `None` for the root.
    #[must_use]
    pub fn parent(self) -> Option<ErrorKind> {
        IS_A
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, parent)| *parent)
    }

    /// This kind followed by each ancestor up to the root.
    pub fn lineage(self) -> impl Iterator<Item = ErrorKind> {
        std::iter::successors(Some(self), |kind| kind.parent())
    }

    /// Number of is-a hops from `self` up to `ancestor`: `Some(0)` for an exact
    /// match, `None` when `ancestor` is not in this kind's lineage.
    #[must_use]
    pub fn distance_to(self, ancestor: ErrorKind) -> Option<usize> {
        self.lineage().position(|kind| kind == ancestor)
    }

    #[must_use]
    pub fn is_a(self, ancestor: ErrorKind) -> bool {
        self.distance_to(ancestor).is_some()
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Any => "any",
            ErrorKind::Runtime => "runtime",
            ErrorKind::IllegalArgument => "illegal_argument",
            ErrorKind::IllegalState => "illegal_state",
            ErrorKind::Validation => "validation",
            ErrorKind::Expression => "expression",
            ErrorKind::NoSuchDestination => "no_such_destination",
            ErrorKind::Io => "io",
            ErrorKind::FileNotFound => "file_not_found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Destination => "destination",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error from parsing an unknown [`ErrorKind`] name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown error kind: {0}")]
pub struct UnknownErrorKind(pub String);

impl FromStr for ErrorKind {
    type Err = UnknownErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownErrorKind(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// RouteError
// ---------------------------------------------------------------------------

/// Phase in which an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePhase {
    /// Raised by a pipeline step or destination during normal routing.
    #[default]
    Processing,
    /// Raised while an exception clause's recovery pipeline was running and
    /// not recovered by any eligible clause.
    Recovery,
}

/// A failure raised while routing an exchange.
///
/// Cloneable so the same failure can sit in the exchange's exception slot
/// while being handed to listeners. `scope` records the unit of work that
/// first offered the failure to its listeners; a stamped failure is never
/// offered again.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RouteError {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: Option<Arc<RouteError>>,
    scope: Option<Uuid>,
    phase: FailurePhase,
}

impl RouteError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
            scope: None,
            phase: FailurePhase::Processing,
        }
    }

    /// Consuming builder: attaches the failure that led to this one.
    #[must_use]
    pub fn with_cause(mut self, cause: RouteError) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Shorthand for an unresolvable destination identifier.
    #[must_use]
    pub fn no_such_destination(uri: &str) -> Self {
        Self::new(
            ErrorKind::NoSuchDestination,
            format!("no destination registered for {uri}"),
        )
    }

    /// Marks `self` as a recovery failure whose cause is `original`.
    #[must_use]
    pub fn into_recovery_failure(mut self, original: RouteError) -> Self {
        self.phase = FailurePhase::Recovery;
        if self.cause.is_none() {
            self.cause = Some(Arc::new(original));
        }
        self
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn cause(&self) -> Option<&RouteError> {
        self.cause.as_deref()
    }

    /// This error followed by each nested cause, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &RouteError> {
        std::iter::successors(Some(self), |err| err.cause())
    }

    #[must_use]
    pub fn phase(&self) -> FailurePhase {
        self.phase
    }

    /// The unit of work that first offered this failure to listeners.
    #[must_use]
    pub fn scope(&self) -> Option<Uuid> {
        self.scope
    }

    /// Stamps the offering scope. Returns `false` if the error was already
    /// stamped, leaving the existing stamp in place.
    pub fn stamp_scope(&mut self, scope: Uuid) -> bool {
        if self.scope.is_some() {
            return false;
        }
        self.scope = Some(scope);
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
