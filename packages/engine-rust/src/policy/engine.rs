//! Route-level exception policy: clause registry, most-specific-first
//! selection, and recovery execution.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use switchyard_core::{ClauseId, Exchange, FailureListener, ListenerVerdict, RouteError};
use tracing::{debug, info, warn};

use super::clause::ExceptionClause;
use crate::processor::run_steps;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Clauses registered for one route, consulted as a [`FailureListener`] on
/// every unit of work the route runs under.
///
/// Selection walks the failure's cause chain outermost first. For each error
/// in the chain, the clause with the smallest is-a distance wins and ties go
/// to the earliest registered clause. The first error in the chain that any
/// clause matches decides.
pub struct ExceptionPolicy {
    route_id: String,
    clauses: RwLock<Vec<Arc<ExceptionClause>>>,
    max_recovery_depth: usize,
}

impl ExceptionPolicy {
    #[must_use]
    pub fn new(route_id: impl Into<String>, max_recovery_depth: usize) -> Self {
        Self {
            route_id: route_id.into(),
            clauses: RwLock::new(Vec::new()),
            max_recovery_depth,
        }
    }

    #[must_use]
    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    /// Adds a clause after every clause registered so far.
    pub fn register(&self, clause: ExceptionClause) -> ClauseId {
        let id = clause.id();
        self.clauses.write().push(Arc::new(clause));
        id
    }

    #[must_use]
    pub fn clause_count(&self) -> usize {
        self.clauses.read().len()
    }

    #[must_use]
    pub fn clauses(&self) -> Vec<Arc<ExceptionClause>> {
        self.clauses.read().clone()
    }

    /// Picks the clause for `error`, skipping clauses in `excluded` and, when
    /// `recovery_only` is set, clauses that do not catch recovery failures.
    /// A clause whose `when` predicate is false or fails to evaluate is
    /// skipped.
    #[must_use]
    pub fn select(
        &self,
        error: &RouteError,
        exchange: &Exchange,
        excluded: &[ClauseId],
        recovery_only: bool,
    ) -> Option<Arc<ExceptionClause>> {
        let clauses = self.clauses.read();
        for candidate in error.chain() {
            let mut best: Option<(usize, &Arc<ExceptionClause>)> = None;
            for clause in clauses.iter() {
                if excluded.contains(&clause.id())
                    || (recovery_only && !clause.catches_recovery_failures())
                {
                    continue;
                }
                let Some(distance) = clause.distance(candidate.kind()) else {
                    continue;
                };
                if best.is_some_and(|(best_distance, _)| distance >= best_distance) {
                    continue;
                }
                if !when_holds(clause, exchange) {
                    continue;
                }
                best = Some((distance, clause));
            }
            if let Some((distance, clause)) = best {
                debug!(
                    route = %self.route_id,
                    clause = clause.id(),
                    kind = %candidate.kind(),
                    distance,
                    "exception clause selected"
                );
                return Some(clause.clone());
            }
        }
        None
    }

    /// Selects a clause for `error` and applies it to `exchange`.
    ///
    /// Returns [`ListenerVerdict::Pass`] when no clause matches. While a
    /// recovery pipeline is running on the exchange only clauses that catch
    /// recovery failures and are not already active are considered.
    pub async fn handle(&self, exchange: &mut Exchange, error: &RouteError) -> ListenerVerdict {
        let recovering = exchange.is_recovering();
        if recovering && exchange.recovery_trail().len() >= self.max_recovery_depth {
            debug!(
                route = %self.route_id,
                depth = exchange.recovery_trail().len(),
                "recovery depth exhausted, not selecting a clause"
            );
            return ListenerVerdict::Pass;
        }

        let trail = exchange.recovery_trail().to_vec();
        let Some(clause) = self.select(error, exchange, &trail, recovering) else {
            debug!(
                route = %self.route_id,
                exchange_id = %exchange.id(),
                kind = %error.kind(),
                "no exception clause matched"
            );
            self.count(error, "unmatched");
            return ListenerVerdict::Pass;
        };

        let verdict = self.apply(clause, exchange, error.clone()).await;
        self.count(error, verdict_label(verdict));
        verdict
    }

    fn apply<'a>(
        &'a self,
        clause: Arc<ExceptionClause>,
        exchange: &'a mut Exchange,
        error: RouteError,
    ) -> BoxFuture<'a, ListenerVerdict> {
        Box::pin(async move {
            if clause.is_handled() || clause.is_continued() {
                exchange.take_exception();
            }
            if clause.is_handled() {
                exchange.set_handled(true);
            }

            if clause.uses_original_message() {
                match exchange.unit_of_work().and_then(|uow| uow.original_message()) {
                    Some(original) => {
                        exchange.replace_message(original);
                    }
                    None => warn!(
                        route = %self.route_id,
                        exchange_id = %exchange.id(),
                        clause = clause.id(),
                        "original message requested but no snapshot was captured"
                    ),
                }
            }

            exchange.enter_recovery(clause.id());
            let result = run_steps(clause.recovery_steps(), exchange).await;

            let verdict = match result {
                Ok(()) => {
                    info!(
                        route = %self.route_id,
                        exchange_id = %exchange.id(),
                        clause = clause.id(),
                        kind = %error.kind(),
                        handled = clause.is_handled(),
                        "recovery complete"
                    );
                    if clause.is_handled() {
                        ListenerVerdict::Handled
                    } else if clause.is_continued() {
                        ListenerVerdict::Continued
                    } else {
                        ListenerVerdict::Failed
                    }
                }
                Err(recovery_error) => {
                    self.recovery_failed(&clause, exchange, error, recovery_error)
                        .await
                }
            };

            exchange.leave_recovery();
            verdict
        })
    }

    /// Offers a recovery failure to an eligible fallback clause, or makes it
    /// the exchange's fatal failure.
    async fn recovery_failed(
        &self,
        clause: &ExceptionClause,
        exchange: &mut Exchange,
        original: RouteError,
        recovery_error: RouteError,
    ) -> ListenerVerdict {
        let mut failure = recovery_error.into_recovery_failure(original);

        // A stamped failure was already offered through the unit of work
        // while the recovery ran.
        let fallback = if failure.scope().is_none()
            && exchange.recovery_trail().len() < self.max_recovery_depth
        {
            self.select(&failure, exchange, exchange.recovery_trail(), true)
        } else {
            None
        };

        if let Some(uow) = exchange.unit_of_work() {
            failure.stamp_scope(uow.id());
        }

        if let Some(fallback) = fallback {
            debug!(
                route = %self.route_id,
                failed_clause = clause.id(),
                fallback = fallback.id(),
                kind = %failure.kind(),
                "recovery failed, trying fallback clause"
            );
            exchange.reopen(failure.clone());
            let verdict = self.apply(fallback, exchange, failure.clone()).await;
            self.count(&failure, verdict_label(verdict));
            return verdict;
        }

        warn!(
            route = %self.route_id,
            exchange_id = %exchange.id(),
            clause = clause.id(),
            %failure,
            "recovery failed"
        );
        exchange.reopen(failure);
        ListenerVerdict::Failed
    }

    fn count(&self, error: &RouteError, verdict: &'static str) {
        metrics::counter!(
            "switchyard_failures_total",
            "route" => self.route_id.clone(),
            "kind" => error.kind().as_str(),
            "verdict" => verdict
        )
        .increment(1);
    }
}

fn when_holds(clause: &ExceptionClause, exchange: &Exchange) -> bool {
    let Some(predicate) = clause.predicate() else {
        return true;
    };
    match predicate.matches(exchange) {
        Ok(holds) => holds,
        Err(error) => {
            debug!(clause = clause.id(), %error, "clause predicate failed, skipping clause");
            false
        }
    }
}

fn verdict_label(verdict: ListenerVerdict) -> &'static str {
    match verdict {
        ListenerVerdict::Pass => "unmatched",
        ListenerVerdict::Handled => "handled",
        ListenerVerdict::Continued => "continued",
        ListenerVerdict::Failed => "failed",
    }
}

#[async_trait]
impl FailureListener for ExceptionPolicy {
    fn name(&self) -> &str {
        &self.route_id
    }

    async fn on_failure(&self, exchange: &mut Exchange, error: &RouteError) -> ListenerVerdict {
        self.handle(exchange, error).await
    }
}

impl std::fmt::Debug for ExceptionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionPolicy")
            .field("route_id", &self.route_id)
            .field("clauses", &*self.clauses.read())
            .field("max_recovery_depth", &self.max_recovery_depth)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
