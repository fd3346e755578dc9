use serde::{Deserialize, Serialize};

/// Read-only view of the state a persistent session carries between calls.
///
/// Imports and function sources are listed in insertion order, the order
/// they are replayed in. Variable values stay inside the container; only
/// their names are reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct SessionSummary {
    /// Import statements replayed first.
    pub imports: Vec<String>,
    /// Function definition sources replayed after the imports.
    pub functions: Vec<String>,
    /// Names of the variables restored last.
    pub variables: Vec<String>,
}

impl SessionSummary {
    /// `true` when nothing has been persisted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty() && self.functions.is_empty() && self.variables.is_empty()
    }

    #[must_use]
    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.iter().any(|v| v == name)
    }
}
