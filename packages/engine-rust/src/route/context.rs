//! The route context: owns routes, destinations, and named processors, and
//! turns route definitions into running routes.

use std::path::Path;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use switchyard_core::{Exchange, Processor, Value};
use tower::ServiceExt;
use tracing::{debug, info};

use super::definition::{ClauseDefinition, RouteDefinition, RoutesFile, StepDefinition};
use super::error::{ConfigError, ContextError};
use super::runtime::Route;
use crate::config::EngineConfig;
use crate::destination::{DestinationRegistry, RouteDestination};
use crate::middleware::build_route_service;
use crate::policy::{ExceptionClause, ExceptionPolicy};
use crate::processor::{
    Pipeline, RecipientList, RemoveHeader, SendTo, SetBody, SetHeader, SetProperty,
};

/// Source scheme whose routes are also registered as destinations.
const DIRECT_SCHEME: &str = "direct:";

/// Container for every route in one engine instance.
///
/// Routes are keyed by id and by source URI; a source feeds exactly one
/// route. Destinations and named processors are shared by all routes.
pub struct RouteContext {
    config: EngineConfig,
    destinations: Arc<DestinationRegistry>,
    processors: DashMap<String, Arc<dyn Processor>>,
    routes: DashMap<String, Arc<Route>>,
    route_order: RwLock<Vec<String>>,
    sources: DashMap<String, String>,
}

impl RouteContext {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            destinations: Arc::new(DestinationRegistry::new()),
            processors: DashMap::new(),
            routes: DashMap::new(),
            route_order: RwLock::new(Vec::new()),
            sources: DashMap::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn destinations(&self) -> &Arc<DestinationRegistry> {
        &self.destinations
    }

    /// Makes `processor` available to `process` steps under `name`.
    pub fn register_processor(&self, name: impl Into<String>, processor: Arc<dyn Processor>) {
        self.processors.insert(name.into(), processor);
    }

    // -- definition ---------------------------------------------------------

    /// Binds `source` to a pipeline of `steps` with `clauses` registered in
    /// order on the route's exception policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the id or source is already taken.
    pub fn add_route(
        &self,
        id: impl Into<String>,
        source: impl Into<String>,
        steps: Vec<Arc<dyn Processor>>,
        clauses: Vec<ExceptionClause>,
    ) -> Result<Arc<Route>, ConfigError> {
        let id = id.into();
        let policy = Arc::new(ExceptionPolicy::new(id.clone(), self.config.max_recovery_depth));
        for clause in clauses {
            policy.register(clause);
        }
        self.install(Route::new(id, source, Pipeline::new(steps), policy))
    }

    /// Builds a route from its declarative definition and installs it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for duplicate ids or sources, `process` steps
    /// naming an unregistered processor, and clauses without kinds.
    pub fn define_route(&self, definition: RouteDefinition) -> Result<Arc<Route>, ConfigError> {
        let steps = self.build_steps(&definition.id, &definition.steps)?;
        let clauses = definition
            .on_exception
            .iter()
            .enumerate()
            .map(|(index, clause)| self.build_clause(&definition.id, index, clause))
            .collect::<Result<Vec<_>, _>>()?;
        self.add_route(definition.id, definition.from, steps, clauses)
    }

    /// Registers a fully built route. A `direct:` source also becomes a
    /// destination other routes can send to.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the id or source is already taken.
    pub fn install(&self, route: Route) -> Result<Arc<Route>, ConfigError> {
        let route = Arc::new(route);
        let id = route.id().to_string();
        let source = route.source_uri().to_string();

        // Both slots stay locked until the route is in, so concurrent
        // definitions cannot overwrite each other.
        let Entry::Vacant(route_slot) = self.routes.entry(id.clone()) else {
            return Err(ConfigError::DuplicateRoute { id });
        };
        let source_slot = match self.sources.entry(source.clone()) {
            Entry::Occupied(existing) => {
                return Err(ConfigError::DuplicateSource {
                    source_uri: source,
                    route_id: existing.get().clone(),
                });
            }
            Entry::Vacant(slot) => slot,
        };
        source_slot.insert(id.clone());
        route_slot.insert(route.clone());
        self.route_order.write().push(id.clone());

        if source.starts_with(DIRECT_SCHEME) {
            self.destinations.register(Arc::new(RouteDestination::new(
                source.clone(),
                Arc::downgrade(&route),
            )));
        }
        info!(
            context = %self.config.context_name,
            route = %id,
            from = %source,
            steps = route.pipeline().len(),
            clauses = route.policy().clause_count(),
            "route defined"
        );
        Ok(route)
    }

    /// Parses a routes file and defines every route in it, in order.
    ///
    /// The file's `config` section is ignored here; it applies when the
    /// context is created with [`RouteContext::from_routes_file`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed JSON or an invalid route.
    pub fn load_routes_json(&self, json: &str) -> Result<Vec<Arc<Route>>, ConfigError> {
        let file: RoutesFile = serde_json::from_str(json)?;
        file.routes
            .into_iter()
            .map(|definition| self.define_route(definition))
            .collect()
    }

    /// Creates a context configured by the file at `path` without defining
    /// its routes yet, so destinations and processors can be registered
    /// first. Returns the context and the parsed route definitions.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn from_routes_file(
        path: impl AsRef<Path>,
    ) -> Result<(Self, Vec<RouteDefinition>), ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let file: RoutesFile = serde_json::from_str(&json)?;
        let context = Self::new(file.config.unwrap_or_default());
        Ok((context, file.routes))
    }

    fn build_steps(
        &self,
        route_id: &str,
        definitions: &[StepDefinition],
    ) -> Result<Vec<Arc<dyn Processor>>, ConfigError> {
        definitions
            .iter()
            .map(|definition| self.build_step(route_id, definition))
            .collect()
    }

    fn build_step(
        &self,
        route_id: &str,
        definition: &StepDefinition,
    ) -> Result<Arc<dyn Processor>, ConfigError> {
        let step: Arc<dyn Processor> = match definition {
            StepDefinition::SetBody { expression } => Arc::new(SetBody::new(expression.clone())),
            StepDefinition::SetHeader { name, expression } => {
                Arc::new(SetHeader::new(name.clone(), expression.clone()))
            }
            StepDefinition::SetProperty { name, expression } => {
                Arc::new(SetProperty::new(name.clone(), expression.clone()))
            }
            StepDefinition::RemoveHeader { name } => Arc::new(RemoveHeader::new(name.clone())),
            StepDefinition::To { uri } => {
                Arc::new(SendTo::new(uri.clone(), self.destinations.clone()))
            }
            StepDefinition::RecipientList {
                expression,
                share_unit_of_work,
                delimiter,
                ignore_invalid_destinations,
            } => Arc::new(
                RecipientList::new(expression.clone(), self.destinations.clone())
                    .share_unit_of_work(*share_unit_of_work)
                    .delimiter(
                        delimiter
                            .clone()
                            .unwrap_or_else(|| self.config.default_delimiter.clone()),
                    )
                    .ignore_invalid_destinations(
                        ignore_invalid_destinations
                            .unwrap_or(self.config.ignore_invalid_destinations),
                    ),
            ),
            StepDefinition::Process { name } => self
                .processors
                .get(name)
                .map(|entry| entry.value().clone())
                .ok_or_else(|| ConfigError::UnknownProcessor {
                    route_id: route_id.to_string(),
                    name: name.clone(),
                })?,
        };
        Ok(step)
    }

    fn build_clause(
        &self,
        route_id: &str,
        index: usize,
        definition: &ClauseDefinition,
    ) -> Result<ExceptionClause, ConfigError> {
        if definition.kinds.is_empty() {
            return Err(ConfigError::EmptyKindSet {
                route_id: route_id.to_string(),
                index,
            });
        }
        let mut clause = ExceptionClause::new(definition.kinds.iter().copied())
            .handled(definition.handled)
            .continued(definition.continued)
            .use_original_message(definition.use_original_message)
            .catch_recovery_failures(definition.catch_recovery_failures)
            .recovery(self.build_steps(route_id, &definition.steps)?);
        if let Some(predicate) = &definition.when {
            clause = clause.when(predicate.clone());
        }
        Ok(clause)
    }

    // -- lookup -------------------------------------------------------------

    #[must_use]
    pub fn route(&self, id: &str) -> Option<Arc<Route>> {
        self.routes.get(id).map(|entry| entry.value().clone())
    }

    /// The route consuming `uri`, if any.
    #[must_use]
    pub fn route_for_source(&self, uri: &str) -> Option<Arc<Route>> {
        let id = self.sources.get(uri)?.value().clone();
        self.route(&id)
    }

    /// Route ids in definition order.
    #[must_use]
    pub fn route_ids(&self) -> Vec<String> {
        self.route_order.read().clone()
    }

    // -- sending ------------------------------------------------------------

    /// Feeds `exchange` to the route consuming `uri` through the instrumented
    /// service stack and returns the finished exchange.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::NoConsumer`] when no route consumes `uri`, or
    /// the route's failure.
    pub async fn send(&self, uri: &str, exchange: Exchange) -> Result<Exchange, ContextError> {
        let route = self
            .route_for_source(uri)
            .ok_or_else(|| ContextError::NoConsumer {
                uri: uri.to_string(),
            })?;
        debug!(uri, exchange_id = %exchange.id(), "sending exchange into context");
        let exchange = build_route_service(route).oneshot(exchange).await?;
        Ok(exchange)
    }

    /// Builds an exchange from `body` and `headers` and sends it to `uri`.
    ///
    /// # Errors
    ///
    /// See [`RouteContext::send`].
    pub async fn send_body_and_headers<I, K, V>(
        &self,
        uri: &str,
        body: impl Into<Value>,
        headers: I,
    ) -> Result<Exchange, ContextError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let exchange = headers
            .into_iter()
            .fold(Exchange::new(body), |exchange, (name, value)| {
                exchange.with_header(name, value)
            });
        self.send(uri, exchange).await
    }

    // -- lifecycle ----------------------------------------------------------

    /// Starts every destination in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first destination start failure.
    pub async fn start(&self) -> anyhow::Result<()> {
        self.destinations.start_all().await?;
        info!(
            context = %self.config.context_name,
            routes = self.routes.len(),
            "route context started"
        );
        Ok(())
    }

    /// Stops every destination in reverse registration order.
    ///
    /// # Errors
    ///
    /// Returns the first destination stop failure.
    pub async fn stop(&self) -> anyhow::Result<()> {
        self.destinations.stop_all().await?;
        info!(context = %self.config.context_name, "route context stopped");
        Ok(())
    }
}

impl Default for RouteContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for RouteContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteContext")
            .field("config", &self.config)
            .field("routes", &self.route_ids())
            .field("destinations", &self.destinations)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
