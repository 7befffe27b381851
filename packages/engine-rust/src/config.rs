use serde::{Deserialize, Serialize};

/// Engine-level configuration shared by every route in a [`RouteContext`].
///
/// Controls recipient-list defaults and how deep recovery-failure fallback may
/// nest. Every field has a default, so a routes file may omit the section or
/// any part of it.
///
/// [`RouteContext`]: crate::route::RouteContext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name of the route context, used in logs.
    pub context_name: String,
    /// Separator for recipient lists that resolve to a single string and do
    /// not configure their own delimiter.
    pub default_delimiter: String,
    /// Skip unresolvable destination ids instead of failing the step, for
    /// recipient lists that do not configure this themselves.
    pub ignore_invalid_destinations: bool,
    /// Maximum number of recovery pipelines that may be active on one
    /// exchange at once. A recovery failure beyond this depth is fatal.
    pub max_recovery_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            context_name: "switchyard".to_string(),
            default_delimiter: ",".to_string(),
            ignore_invalid_destinations: false,
            max_recovery_depth: 4,
        }
    }
}
