//! Exception policies: route-level clauses and the engine that matches
//! failures against them.

pub mod clause;
pub mod engine;

pub use clause::ExceptionClause;
pub use engine::ExceptionPolicy;
