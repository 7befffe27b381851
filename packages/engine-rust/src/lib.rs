//! Switchyard Engine: exception policies, pipelines, recipient lists, and
//! route orchestration on top of `switchyard-core`.

pub mod config;
pub mod destination;
pub mod expression;
pub mod logging;
pub mod middleware;
pub mod policy;
pub mod processor;
pub mod route;
pub mod service;

pub use config::EngineConfig;
pub use destination::{DestinationRegistry, LogDestination, MockDestination, RouteDestination};
pub use expression::{Expression, Predicate};
pub use middleware::{build_route_service, MetricsLayer};
pub use policy::{ExceptionClause, ExceptionPolicy};
pub use processor::{Pipeline, PipelineOutcome, RecipientList};
pub use route::{
    ClauseDefinition, ConfigError, ContextError, Route, RouteContext, RouteDefinition,
    RouteFailure, StepDefinition,
};
pub use service::RouteService;
