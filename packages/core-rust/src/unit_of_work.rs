//! Unit of work: the scope that owns an exchange's original-message snapshot,
//! its failure listeners, and its completion callbacks.
//!
//! Every failure raised while routing funnels through [`UnitOfWork::fail`].
//! Listeners are consulted in registration order until one returns a verdict
//! other than [`ListenerVerdict::Pass`]. A failure is offered to listeners at
//! most once: the first `fail` stamps it with the scope's id, and any later
//! `fail` of a stamped failure (from this or another scope) only records it.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::RouteError;
use crate::exchange::Exchange;
use crate::message::{Message, MessageSnapshot};

// ---------------------------------------------------------------------------
// Listener and callback traits
// ---------------------------------------------------------------------------

/// What a failure listener did with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerVerdict {
    /// Not interested; offer the failure to the next listener.
    Pass,
    /// Recovered; the exception slot is cleared and the exchange is handled.
    Handled,
    /// Recovered; the exception slot is cleared and routing resumes after the
    /// failing step.
    Continued,
    /// The listener acted on the failure but the exchange remains failed.
    Failed,
}

/// Result of [`UnitOfWork::fail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Handled,
    Continued,
    Unhandled,
}

/// Observer notified synchronously, in registration order, when a failure is
/// funneled through a unit of work.
///
/// Used as `Arc<dyn FailureListener>`.
#[async_trait]
pub trait FailureListener: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Called with the exchange and the failure being offered. The failure is
    /// already stored in the exception slot unless the exchange was marked
    /// handled.
    async fn on_failure(&self, exchange: &mut Exchange, error: &RouteError) -> ListenerVerdict;
}

/// Completion callback run once when the owning route finishes the exchange.
pub trait Synchronization: Send + Sync {
    /// Called when the exchange completes without an exception.
    fn on_complete(&self, exchange: &Exchange);

    /// Called when the exchange completes with an exception in its slot.
    fn on_failure(&self, exchange: &Exchange);
}

/// Handle returned by [`UnitOfWork::add_listener`], used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

// ---------------------------------------------------------------------------
// UnitOfWork
// ---------------------------------------------------------------------------

/// Scope governing a top-level exchange and anything dispatched with a shared
/// scope from it.
///
/// The snapshot is captured at most once and never mutated afterwards. The
/// listener list is append-safe under concurrent access.
pub struct UnitOfWork {
    id: Uuid,
    parent: Option<Uuid>,
    exchange_id: String,
    snapshot: OnceLock<Arc<MessageSnapshot>>,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn FailureListener>)>>,
    synchronizations: Mutex<Vec<Arc<dyn Synchronization>>>,
    next_listener_id: AtomicU64,
    attached: AtomicUsize,
    done: AtomicBool,
}

/// Result of [`UnitOfWork::begin`].
#[derive(Debug, Clone)]
pub struct Begun {
    pub unit_of_work: Arc<UnitOfWork>,
    /// `true` when `begin` created the scope, `false` when it attached to the
    /// scope the exchange already carried.
    pub owner: bool,
}

impl UnitOfWork {
    fn new(exchange_id: &str, parent: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent,
            exchange_id: exchange_id.to_string(),
            snapshot: OnceLock::new(),
            listeners: RwLock::new(Vec::new()),
            synchronizations: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            attached: AtomicUsize::new(0),
            done: AtomicBool::new(false),
        }
    }

    /// Opens the scope for `exchange` at route entry.
    ///
    /// If the exchange already carries a unit of work (it was dispatched with a
    /// shared scope), attaches to it and skips re-snapshotting. Otherwise
    /// creates a new unit of work, installs it on the exchange, and captures
    /// the original message.
    pub fn begin(exchange: &mut Exchange) -> Begun {
        if let Some(existing) = exchange.unit_of_work() {
            existing.attached.fetch_add(1, Ordering::SeqCst);
            return Begun {
                unit_of_work: existing.clone(),
                owner: false,
            };
        }

        let uow = Arc::new(Self::new(exchange.id(), None));
        uow.capture_original(exchange);
        exchange.replace_unit_of_work(Some(uow.clone()));
        Begun {
            unit_of_work: uow,
            owner: true,
        }
    }

    /// Installs a fresh child scope on `exchange` for a non-shared dispatch and
    /// returns the handle it displaced, which the caller must put back.
    ///
    /// The child captures the exchange as it is now, not the parent's input.
    pub fn fork(exchange: &mut Exchange) -> Option<Arc<UnitOfWork>> {
        let parent = exchange.unit_of_work().map(|uow| uow.id);
        let child = Arc::new(Self::new(exchange.id(), parent));
        child.capture_original(exchange);
        exchange.replace_unit_of_work(Some(child))
    }

    /// Releases an attachment made by [`UnitOfWork::begin`] on an existing scope.
    pub fn detach(&self) {
        let _ = self
            .attached
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Id of the scope this one was forked from, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Uuid> {
        self.parent
    }

    #[must_use]
    pub fn exchange_id(&self) -> &str {
        &self.exchange_id
    }

    /// Number of routes currently attached to this scope besides its owner.
    #[must_use]
    pub fn attached(&self) -> usize {
        self.attached.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    // -- snapshot -----------------------------------------------------------

    /// Stores a snapshot of the exchange's message if none exists yet.
    /// Returns `true` if this call captured it.
    pub fn capture_original(&self, exchange: &Exchange) -> bool {
        let mut captured = false;
        self.snapshot.get_or_init(|| {
            captured = true;
            MessageSnapshot::capture(exchange.message())
        });
        captured
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<MessageSnapshot>> {
        self.snapshot.get().cloned()
    }

    /// A fresh copy of the original message, if one was captured.
    #[must_use]
    pub fn original_message(&self) -> Option<Message> {
        self.snapshot.get().map(|s| s.to_message())
    }

    // -- listeners ----------------------------------------------------------

    pub fn add_listener(&self, listener: Arc<dyn FailureListener>) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn add_synchronization(&self, synchronization: Arc<dyn Synchronization>) {
        self.synchronizations.lock().push(synchronization);
    }

    // -- failure path -------------------------------------------------------

    /// Records `error` on the exchange and offers it to the listeners.
    ///
    /// Listeners run in registration order; the first non-`Pass` verdict ends
    /// the notification. A failure already stamped by a previous `fail` (here
    /// or in another scope) is recorded but not offered again.
    pub async fn fail(&self, exchange: &mut Exchange, mut error: RouteError) -> FailureOutcome {
        let fresh = error.stamp_scope(self.id);
        exchange.set_exception(error.clone());

        if !fresh {
            tracing::debug!(
                exchange_id = %exchange.id(),
                unit_of_work = %self.id,
                offered_by = ?error.scope(),
                kind = %error.kind(),
                "failure already offered, not re-notifying listeners"
            );
            return FailureOutcome::Unhandled;
        }

        // Clone the list so no lock is held across listener awaits; a listener
        // may add or remove listeners while it runs.
        let listeners: Vec<Arc<dyn FailureListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            let verdict = listener.on_failure(exchange, &error).await;
            tracing::debug!(
                exchange_id = %exchange.id(),
                listener = listener.name(),
                kind = %error.kind(),
                ?verdict,
                "failure listener notified"
            );
            match verdict {
                ListenerVerdict::Pass => {}
                ListenerVerdict::Handled => return FailureOutcome::Handled,
                ListenerVerdict::Continued => return FailureOutcome::Continued,
                ListenerVerdict::Failed => return FailureOutcome::Unhandled,
            }
        }

        FailureOutcome::Unhandled
    }

    /// Completes the scope: runs completion callbacks once, in registration
    /// order, then releases listeners and callbacks. Idempotent.
    pub fn done(&self, exchange: &Exchange) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }

        let synchronizations = std::mem::take(&mut *self.synchronizations.lock());
        for sync in &synchronizations {
            if exchange.is_failed() {
                sync.on_failure(exchange);
            } else {
                sync.on_complete(exchange);
            }
        }
        self.listeners.write().clear();
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("exchange_id", &self.exchange_id)
            .field("has_snapshot", &self.snapshot.get().is_some())
            .field("listeners", &self.listener_count())
            .field("attached", &self.attached())
            .field("done", &self.is_done())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
