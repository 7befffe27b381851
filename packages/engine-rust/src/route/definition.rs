//! Declarative route configuration, deserializable from JSON.

use serde::{Deserialize, Serialize};
use switchyard_core::ErrorKind;

use crate::config::EngineConfig;
use crate::expression::{Expression, Predicate};

/// One route: a source, its steps, and its exception clauses in declaration
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDefinition {
    pub id: String,
    /// Source URI, e.g. `direct:start`.
    pub from: String,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub on_exception: Vec<ClauseDefinition>,
}

impl RouteDefinition {
    #[must_use]
    pub fn new(id: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            steps: Vec::new(),
            on_exception: Vec::new(),
        }
    }

    #[must_use]
    pub fn step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn on_exception(mut self, clause: ClauseDefinition) -> Self {
        self.on_exception.push(clause);
        self
    }
}

/// A pipeline step, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepDefinition {
    SetBody {
        expression: Expression,
    },
    SetHeader {
        name: String,
        expression: Expression,
    },
    SetProperty {
        name: String,
        expression: Expression,
    },
    RemoveHeader {
        name: String,
    },
    /// Send to a fixed destination.
    To {
        uri: String,
    },
    /// Unset options fall back to the engine configuration.
    RecipientList {
        expression: Expression,
        #[serde(default)]
        share_unit_of_work: bool,
        #[serde(default)]
        delimiter: Option<String>,
        #[serde(default)]
        ignore_invalid_destinations: Option<bool>,
    },
    /// A processor registered on the context under `name`.
    Process {
        name: String,
    },
}

impl StepDefinition {
    #[must_use]
    pub fn set_body(expression: Expression) -> Self {
        StepDefinition::SetBody { expression }
    }

    #[must_use]
    pub fn set_header(name: impl Into<String>, expression: Expression) -> Self {
        StepDefinition::SetHeader {
            name: name.into(),
            expression,
        }
    }

    #[must_use]
    pub fn to(uri: impl Into<String>) -> Self {
        StepDefinition::To { uri: uri.into() }
    }

    #[must_use]
    pub fn recipient_list(expression: Expression, share_unit_of_work: bool) -> Self {
        StepDefinition::RecipientList {
            expression,
            share_unit_of_work,
            delimiter: None,
            ignore_invalid_destinations: None,
        }
    }
}

/// An exception clause; `steps` is its recovery pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseDefinition {
    pub kinds: Vec<ErrorKind>,
    #[serde(default)]
    pub handled: bool,
    #[serde(default)]
    pub continued: bool,
    #[serde(default)]
    pub use_original_message: bool,
    #[serde(default)]
    pub catch_recovery_failures: bool,
    #[serde(default)]
    pub when: Option<Predicate>,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl ClauseDefinition {
    #[must_use]
    pub fn new(kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            handled: false,
            continued: false,
            use_original_message: false,
            catch_recovery_failures: false,
            when: None,
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn handled(mut self, handled: bool) -> Self {
        self.handled = handled;
        self
    }

    #[must_use]
    pub fn use_original_message(mut self, use_original: bool) -> Self {
        self.use_original_message = use_original;
        self
    }

    #[must_use]
    pub fn step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }
}

/// Top-level shape of a routes file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutesFile {
    #[serde(default)]
    pub config: Option<EngineConfig>,
    pub routes: Vec<RouteDefinition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE: &str = r#"{
        "config": { "max_recovery_depth": 2 },
        "routes": [{
            "id": "start",
            "from": "direct:start",
            "steps": [
                { "type": "set_body", "expression": { "type": "constant", "value": "B" } },
                { "type": "set_header", "name": "path",
                  "expression": { "type": "constant", "value": "mock:throwException" } },
                { "type": "recipient_list", "share_unit_of_work": true,
                  "expression": { "type": "header", "value": "path" } }
            ],
            "on_exception": [{
                "kinds": ["any"],
                "handled": true,
                "use_original_message": true,
                "steps": [{ "type": "to", "uri": "mock:error" }]
            }]
        }]
    }"#;

    #[test]
    fn parses_routes_file() {
        let file: RoutesFile = serde_json::from_str(REFERENCE).unwrap();
        let config = file.config.unwrap();
        assert_eq!(config.max_recovery_depth, 2);
        assert_eq!(config.default_delimiter, ",");

        let expected = RouteDefinition::new("start", "direct:start")
            .step(StepDefinition::set_body(Expression::constant("B")))
            .step(StepDefinition::set_header(
                "path",
                Expression::constant("mock:throwException"),
            ))
            .step(StepDefinition::recipient_list(Expression::header("path"), true))
            .on_exception(
                ClauseDefinition::new([ErrorKind::Any])
                    .handled(true)
                    .use_original_message(true)
                    .step(StepDefinition::to("mock:error")),
            );
        assert_eq!(file.routes, vec![expected]);
    }

    #[test]
    fn unknown_step_type_is_rejected() {
        let err = serde_json::from_str::<StepDefinition>(r#"{ "type": "teleport" }"#);
        assert!(err.is_err());
    }

    #[test]
    fn clause_flags_default_to_false() {
        let clause: ClauseDefinition = serde_json::from_str(r#"{ "kinds": ["io"] }"#).unwrap();
        assert_eq!(clause, ClauseDefinition::new([ErrorKind::Io]));
    }
}
