//! Tower middleware layers applied around route services.

pub mod metrics;
pub mod stack;

pub use self::metrics::{MetricsLayer, MetricsService};
pub use stack::build_route_service;
