use switchyard_core::{FailurePhase, RouteError};

/// A route finished with the exchange still failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RouteFailure {
    /// No clause recovered the failure, or the matching clause was not
    /// `handled`.
    #[error("route {route_id} failed: {error}")]
    Unhandled { route_id: String, error: RouteError },
    /// A clause's recovery pipeline failed and no eligible clause caught it.
    #[error("route {route_id} recovery failed: {error}")]
    Recovery { route_id: String, error: RouteError },
}

impl RouteFailure {
    /// Classifies `error` by the phase it was raised in.
    #[must_use]
    pub fn from_error(route_id: impl Into<String>, error: RouteError) -> Self {
        let route_id = route_id.into();
        match error.phase() {
            FailurePhase::Processing => RouteFailure::Unhandled { route_id, error },
            FailurePhase::Recovery => RouteFailure::Recovery { route_id, error },
        }
    }

    #[must_use]
    pub fn route_id(&self) -> &str {
        match self {
            RouteFailure::Unhandled { route_id, .. } | RouteFailure::Recovery { route_id, .. } => {
                route_id
            }
        }
    }

    #[must_use]
    pub fn error(&self) -> &RouteError {
        match self {
            RouteFailure::Unhandled { error, .. } | RouteFailure::Recovery { error, .. } => error,
        }
    }

    #[must_use]
    pub fn into_error(self) -> RouteError {
        match self {
            RouteFailure::Unhandled { error, .. } | RouteFailure::Recovery { error, .. } => error,
        }
    }

    #[must_use]
    pub fn is_recovery(&self) -> bool {
        matches!(self, RouteFailure::Recovery { .. })
    }
}

/// A route definition could not be turned into a running route.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("duplicate route id: {id}")]
    DuplicateRoute { id: String },
    #[error("source {source_uri} already consumed by route {route_id}")]
    DuplicateSource { source_uri: String, route_id: String },
    #[error("route {route_id}: no processor registered as {name}")]
    UnknownProcessor { route_id: String, name: String },
    #[error("route {route_id}: exception clause {index} has no error kinds")]
    EmptyKindSet { route_id: String, index: usize },
    #[error("invalid route definition: {0}")]
    InvalidDefinition(#[from] serde_json::Error),
    #[error("failed to read routes file: {0}")]
    Io(#[from] std::io::Error),
}

/// Sending into the context failed.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("no route consumes {uri}")]
    NoConsumer { uri: String },
    #[error(transparent)]
    Route(#[from] RouteFailure),
}
