//! # Config Composition
//!
//! Collapses the set of `ProjectMapping` CRDs fetched from the cluster into a
//! single root spec plus an ordered list of overrides, and resolves the
//! effective spec for a given project name by shallow-merging matching
//! overrides onto the root, in declared order.

use regex::Regex;

use crate::crd::{ProjectMappingSpec, Scope};
use crate::error::ReconcileError;

/// The full set of `ProjectMapping` documents observed on a tick, split by
/// scope.
#[derive(Debug, Clone)]
pub struct Config {
    root: ProjectMappingSpec,
    overrides: Vec<ProjectMappingSpec>,
}

impl Config {
    /// Build a `Config` from the raw list of specs fetched from the cluster.
    ///
    /// Exactly one `Root` spec must be present; anything else is a
    /// configuration error and the caller should skip the tick (§7, "missing
    /// root CRD" open question — resolved as a no-op tick, see DESIGN.md).
    pub fn load(specs: Vec<ProjectMappingSpec>) -> Result<Self, ReconcileError> {
        let mut roots = Vec::new();
        let mut overrides = Vec::new();
        for spec in specs {
            match spec.scope {
                Scope::Root => roots.push(spec),
                Scope::Override => overrides.push(spec),
            }
        }

        match roots.len() {
            0 => Err(ReconcileError::Config(
                "no root ProjectMapping found in cluster".to_string(),
            )),
            1 => Ok(Self {
                root: roots.into_iter().next().expect("checked len == 1"),
                overrides,
            }),
            n => Err(ReconcileError::Config(format!(
                "expected exactly one root ProjectMapping, found {n}"
            ))),
        }
    }

    /// The root spec, unmodified. Used by the reconcile engine to decide
    /// whether to fetch secret parameters at all (§4.6, step 3).
    pub fn root(&self) -> &ProjectMappingSpec {
        &self.root
    }

    /// Resolve the effective spec for `project_name`: the root spec with
    /// every override whose `project_selector` matches `project_name`
    /// shallow-merged on top, in declared order. Later overrides win
    /// field-by-field; list and string fields are replaced wholesale, never
    /// concatenated (see DESIGN.md open question on list-field merging).
    pub fn spec_for(&self, project_name: &str) -> Result<ProjectMappingSpec, ReconcileError> {
        let mut effective = self.root.clone();
        for over in &self.overrides {
            if selector_matches(&over.project_selector, project_name)? {
                merge_override(&mut effective, over);
            }
        }
        Ok(effective)
    }
}

/// Whether `pattern` (a regular expression, empty meaning "match everything")
/// matches `project_name`. Exposed for the reconcile engine's own
/// selector-filtering step (§4.6.b), separate from override matching.
pub fn selector_matches(pattern: &str, project_name: &str) -> Result<bool, ReconcileError> {
    if pattern.is_empty() {
        return Ok(true);
    }
    let re = Regex::new(pattern)
        .map_err(|e| ReconcileError::Config(format!("invalid projectSelector {pattern:?}: {e}")))?;
    Ok(re.is_match(project_name))
}

/// Shallow-merge `over` onto `base`: non-default fields in `over` replace
/// the corresponding field in `base`. `project_selector` and `scope` are
/// never merged — they only ever describe the override itself.
fn merge_override(base: &mut ProjectMappingSpec, over: &ProjectMappingSpec) {
    if over.skip {
        base.skip = true;
    }
    if over.skip_secrets {
        base.skip_secrets = true;
    }
    if !over.included_projects.is_empty() {
        base.included_projects = over.included_projects.clone();
    }
    if !over.configmap_template.is_empty() {
        base.configmap_template = over.configmap_template.clone();
    }
    if !over.secret_template.is_empty() {
        base.secret_template = over.secret_template.clone();
    }
    if over.resource_name.is_some() {
        base.resource_name = over.resource_name.clone();
    }
    if over.resource_namespace.is_some() {
        base.resource_namespace = over.resource_namespace.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> ProjectMappingSpec {
        ProjectMappingSpec {
            scope: Scope::Root,
            project_selector: String::new(),
            skip: false,
            skip_secrets: false,
            included_projects: vec![],
            configmap_template: "root-template".to_string(),
            secret_template: String::new(),
            resource_name: None,
            resource_namespace: None,
        }
    }

    #[test]
    fn load_requires_exactly_one_root() {
        assert!(Config::load(vec![]).is_err());
        assert!(Config::load(vec![root(), root()]).is_err());
        assert!(Config::load(vec![root()]).is_ok());
    }

    #[test]
    fn spec_for_applies_matching_overrides_in_order() {
        let mut override_a = root();
        override_a.scope = Scope::Override;
        override_a.project_selector = "^svc-.*".to_string();
        override_a.skip_secrets = true;

        let mut override_b = root();
        override_b.scope = Scope::Override;
        override_b.project_selector = "^svc-special$".to_string();
        override_b.configmap_template = "special-template".to_string();

        let config = Config::load(vec![root(), override_a, override_b]).unwrap();

        let plain = config.spec_for("svc-plain").unwrap();
        assert!(plain.skip_secrets);
        assert_eq!(plain.configmap_template, "root-template");

        let special = config.spec_for("svc-special").unwrap();
        assert!(special.skip_secrets);
        assert_eq!(special.configmap_template, "special-template");

        let unrelated = config.spec_for("other").unwrap();
        assert!(!unrelated.skip_secrets);
        assert_eq!(unrelated.configmap_template, "root-template");
    }

    #[test]
    fn spec_for_rejects_invalid_selector() {
        let mut bad = root();
        bad.scope = Scope::Override;
        bad.project_selector = "(".to_string();
        let config = Config::load(vec![root(), bad]).unwrap();
        assert!(config.spec_for("anything").is_err());
    }
}
