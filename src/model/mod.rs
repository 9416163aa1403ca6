//! # Data Model
//!
//! `Parameter` and `Project` are the two value types handed back by a
//! `ParameterSource`. Both are immutable once produced and rebuilt fresh on
//! every reconciliation tick — nothing here is persisted across ticks.

use serde::{Deserialize, Serialize};

/// A single configuration or secret value within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub key: String,
    pub value: String,
    pub secret: bool,
}

impl Parameter {
    pub fn new(key: impl Into<String>, value: impl Into<String>, secret: bool) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            secret,
        }
    }
}

/// A named collection of parameters, optionally linked to a parent project.
///
/// `parameters` is ordered; later entries with the same key override earlier
/// ones, matching the `ParameterSource` contract (§6).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub parent: Option<String>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<Parameter>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Flatten this project's own parameter list (later wins on duplicate
    /// key), ignoring ancestry. Used as the base case by `ProjectGraph`.
    pub fn own_values(&self) -> Vec<(&str, &str, bool)> {
        let mut seen = std::collections::HashMap::new();
        let mut order = Vec::new();
        for p in &self.parameters {
            if !seen.contains_key(p.key.as_str()) {
                order.push(p.key.as_str());
            }
            seen.insert(p.key.as_str(), (p.value.as_str(), p.secret));
        }
        order
            .into_iter()
            .map(|k| {
                let (v, s) = seen[k];
                (k, v, s)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_values_last_write_wins_preserves_first_seen_order() {
        let project = Project::new("proj1").with_parameters(vec![
            Parameter::new("a", "1", false),
            Parameter::new("b", "2", false),
            Parameter::new("a", "3", false),
        ]);

        assert_eq!(
            project.own_values(),
            vec![("a", "3", false), ("b", "2", false)]
        );
    }
}
