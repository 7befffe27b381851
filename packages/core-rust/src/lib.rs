//! Switchyard Core: exchanges, units of work, failure kinds, and the traits
//! that routing steps and destinations implement.

pub mod error;
pub mod exchange;
pub mod message;
pub mod traits;
pub mod types;
pub mod unit_of_work;

pub use error::{ErrorKind, FailurePhase, RouteError, UnknownErrorKind};
pub use exchange::{ClauseId, Exchange};
pub use message::{Message, MessageSnapshot};
pub use traits::{Destination, Processor};
pub use types::Value;
pub use unit_of_work::{
    Begun, FailureListener, FailureOutcome, ListenerId, ListenerVerdict, Synchronization,
    UnitOfWork,
};
