use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use switchyard_core::{ClauseId, ErrorKind, Processor};

use crate::expression::Predicate;

static NEXT_CLAUSE_ID: AtomicU64 = AtomicU64::new(1);

/// A route-level recovery rule.
///
/// Matches failures whose kind is one of `kinds` or descends from one of
/// them. The closer the match in the is-a table, the more specific the clause.
#[derive(Clone)]
pub struct ExceptionClause {
    id: ClauseId,
    kinds: Vec<ErrorKind>,
    handled: bool,
    continued: bool,
    use_original_message: bool,
    catch_recovery_failures: bool,
    when: Option<Predicate>,
    recovery: Vec<Arc<dyn Processor>>,
}

impl ExceptionClause {
    /// Creates an unhandled clause over `kinds` with an empty recovery
    /// pipeline. An empty kind set matches nothing.
    #[must_use]
    pub fn new(kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        Self {
            id: NEXT_CLAUSE_ID.fetch_add(1, Ordering::Relaxed),
            kinds: kinds.into_iter().collect(),
            handled: false,
            continued: false,
            use_original_message: false,
            catch_recovery_failures: false,
            when: None,
            recovery: Vec::new(),
        }
    }

    /// Clear the failure and mark the exchange handled.
    #[must_use]
    pub fn handled(mut self, handled: bool) -> Self {
        self.handled = handled;
        self
    }

    /// Clear the failure and resume with the step after the failing one.
    /// Ignored when `handled` is also set.
    #[must_use]
    pub fn continued(mut self, continued: bool) -> Self {
        self.continued = continued;
        self
    }

    /// Restore body and headers from the unit of work's snapshot before the
    /// recovery pipeline runs.
    #[must_use]
    pub fn use_original_message(mut self, use_original: bool) -> Self {
        self.use_original_message = use_original;
        self
    }

    /// Make this clause eligible for failures raised by another clause's
    /// recovery pipeline.
    #[must_use]
    pub fn catch_recovery_failures(mut self, catch: bool) -> Self {
        self.catch_recovery_failures = catch;
        self
    }

    /// Only match while `predicate` holds for the exchange.
    #[must_use]
    pub fn when(mut self, predicate: Predicate) -> Self {
        self.when = Some(predicate);
        self
    }

    /// Replaces the recovery pipeline.
    #[must_use]
    pub fn recovery(mut self, steps: Vec<Arc<dyn Processor>>) -> Self {
        self.recovery = steps;
        self
    }

    /// Appends one recovery step.
    #[must_use]
    pub fn then(mut self, step: Arc<dyn Processor>) -> Self {
        self.recovery.push(step);
        self
    }

    #[must_use]
    pub fn id(&self) -> ClauseId {
        self.id
    }

    #[must_use]
    pub fn kinds(&self) -> &[ErrorKind] {
        &self.kinds
    }

    #[must_use]
    pub fn is_handled(&self) -> bool {
        self.handled
    }

    /// `true` only when `continued` is set and `handled` is not.
    #[must_use]
    pub fn is_continued(&self) -> bool {
        self.continued && !self.handled
    }

    #[must_use]
    pub fn uses_original_message(&self) -> bool {
        self.use_original_message
    }

    #[must_use]
    pub fn catches_recovery_failures(&self) -> bool {
        self.catch_recovery_failures
    }

    #[must_use]
    pub fn predicate(&self) -> Option<&Predicate> {
        self.when.as_ref()
    }

    #[must_use]
    pub fn recovery_steps(&self) -> &[Arc<dyn Processor>] {
        &self.recovery
    }

    /// Smallest is-a distance from `kind` to any of this clause's kinds, or
    /// `None` when no kind matches.
    #[must_use]
    pub fn distance(&self, kind: ErrorKind) -> Option<usize> {
        self.kinds
            .iter()
            .filter_map(|candidate| kind.distance_to(*candidate))
            .min()
    }
}

impl fmt::Debug for ExceptionClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionClause")
            .field("id", &self.id)
            .field("kinds", &self.kinds)
            .field("handled", &self.handled)
            .field("continued", &self.continued)
            .field("use_original_message", &self.use_original_message)
            .field("catch_recovery_failures", &self.catch_recovery_failures)
            .field("when", &self.when)
            .field("recovery_steps", &self.recovery.len())
            .finish()
    }
}
