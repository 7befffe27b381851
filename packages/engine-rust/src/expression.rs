//! Runtime expressions and predicates evaluated against an exchange.
//!
//! Expressions are declarative values (serde-friendly) rather than closures so
//! that routes can be written as configuration. Evaluation always reads the
//! exchange's current state; nothing is cached between exchanges.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use switchyard_core::{ErrorKind, Exchange, RouteError, Value};

/// Matches `${...}` placeholders in simple templates.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder pattern is valid"));

// ---------------------------------------------------------------------------
// Expression
// ---------------------------------------------------------------------------

/// A value computed from the exchange.
///
/// Serialized adjacently tagged: `{"type": "header", "value": "path"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Expression {
    /// A fixed value.
    Constant(Value),
    /// A header by name; null when absent.
    Header(String),
    /// An exchange property by name; null when absent.
    Property(String),
    /// The message body.
    Body,
    /// The exchange id.
    ExchangeId,
    /// Message of the exception in the slot; null when there is none.
    ExceptionMessage,
    /// Template with `${...}` placeholders: `body`, `header.NAME`,
    /// `exchangeProperty.NAME`, `exchangeId`, `exception.message`.
    Simple(String),
}

impl Expression {
    /// Shorthand for [`Expression::Constant`].
    #[must_use]
    pub fn constant(value: impl Into<Value>) -> Self {
        Expression::Constant(value.into())
    }

    /// Shorthand for [`Expression::Header`].
    #[must_use]
    pub fn header(name: impl Into<String>) -> Self {
        Expression::Header(name.into())
    }

    /// Evaluate against the exchange's current state.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Expression`] failure when a simple template
    /// references an unknown placeholder.
    pub fn evaluate(&self, exchange: &Exchange) -> Result<Value, RouteError> {
        match self {
            Expression::Constant(value) => Ok(value.clone()),
            Expression::Header(name) => Ok(exchange.header(name).cloned().unwrap_or_default()),
            Expression::Property(name) => {
                Ok(exchange.property(name).cloned().unwrap_or_default())
            }
            Expression::Body => Ok(exchange.body().clone()),
            Expression::ExchangeId => Ok(Value::from(exchange.id())),
            Expression::ExceptionMessage => Ok(exchange
                .exception()
                .map(|e| Value::from(e.message()))
                .unwrap_or_default()),
            Expression::Simple(template) => evaluate_simple(template, exchange),
        }
    }
}

fn evaluate_simple(template: &str, exchange: &Exchange) -> Result<Value, RouteError> {
    // A template that is exactly one placeholder yields the raw value, so
    // arrays and other structured values pass through unrendered.
    if let Some(caps) = PLACEHOLDER.captures(template) {
        if caps.get(0).is_some_and(|m| m.as_str() == template) {
            return resolve_placeholder(&caps[1], exchange);
        }
    }

    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        rendered.push_str(&template[last..whole.start()]);
        rendered.push_str(&resolve_placeholder(&caps[1], exchange)?.render());
        last = whole.end();
    }
    rendered.push_str(&template[last..]);
    Ok(Value::String(rendered))
}

fn resolve_placeholder(name: &str, exchange: &Exchange) -> Result<Value, RouteError> {
    let name = name.trim();
    if let Some(header) = name
        .strip_prefix("header.")
        .or_else(|| name.strip_prefix("headers."))
    {
        return Ok(exchange.header(header).cloned().unwrap_or_default());
    }
    if let Some(property) = name.strip_prefix("exchangeProperty.") {
        return Ok(exchange.property(property).cloned().unwrap_or_default());
    }
    match name {
        "body" => Ok(exchange.body().clone()),
        "exchangeId" => Ok(Value::from(exchange.id())),
        "exception.message" => Ok(exchange
            .exception()
            .map(|e| Value::from(e.message()))
            .unwrap_or_default()),
        other => Err(RouteError::new(
            ErrorKind::Expression,
            format!("unknown placeholder ${{{other}}}"),
        )),
    }
}

// ---------------------------------------------------------------------------
// Predicate
// ---------------------------------------------------------------------------

/// Boolean condition over the exchange, used by conditional exception clauses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// The expression evaluates to exactly `value`.
    Eq { expression: Expression, value: Value },
    /// The rendered expression contains `value`.
    Contains { expression: Expression, value: String },
    /// The expression evaluates to something other than null.
    Exists { expression: Expression },
    Not { predicate: Box<Predicate> },
    And { predicates: Vec<Predicate> },
    Or { predicates: Vec<Predicate> },
}

impl Predicate {
    /// Evaluate against the exchange.
    ///
    /// # Errors
    ///
    /// Propagates expression evaluation failures.
    pub fn matches(&self, exchange: &Exchange) -> Result<bool, RouteError> {
        match self {
            Predicate::Eq { expression, value } => Ok(&expression.evaluate(exchange)? == value),
            Predicate::Contains { expression, value } => {
                Ok(expression.evaluate(exchange)?.render().contains(value.as_str()))
            }
            Predicate::Exists { expression } => Ok(!expression.evaluate(exchange)?.is_null()),
            Predicate::Not { predicate } => Ok(!predicate.matches(exchange)?),
            Predicate::And { predicates } => {
                for p in predicates {
                    if !p.matches(exchange)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Or { predicates } => {
                for p in predicates {
                    if p.matches(exchange)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
