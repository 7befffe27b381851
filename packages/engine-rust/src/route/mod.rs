//! Route orchestration: definitions, the running route, and the context that
//! owns them.

pub mod context;
pub mod definition;
pub mod error;
pub mod runtime;

pub use context::RouteContext;
pub use definition::{ClauseDefinition, RouteDefinition, RoutesFile, StepDefinition};
pub use error::{ConfigError, ContextError, RouteFailure};
pub use runtime::Route;
