//! # Project Graph
//!
//! Builds the parent/child hierarchy across every project returned by a
//! `ParameterSource` and flattens it into an ordered value set for a single
//! project, tracking which project contributed each final value (§4.5).
//!
//! Resolution order, lowest to highest precedence:
//! 1. the project's ancestor chain, furthest ancestor first;
//! 2. `included_projects`, in the order they're declared;
//! 3. the project's own parameters.
//!
//! A later source overwrites an earlier one on key collision, and the
//! origin map is updated to match.

use std::collections::HashMap;

use tracing::warn;

use crate::model::Project;

/// Records which project (and, for an included project, which position in
/// the `included_projects` list) contributed the winning value for a key.
pub type ParameterOriginMap = HashMap<String, String>;

/// The full project hierarchy for one reconciliation tick.
#[derive(Debug, Clone)]
pub struct ProjectGraph {
    projects: HashMap<String, Project>,
    /// Names in the order the source returned them, duplicates removed
    /// (last occurrence kept, matching `projects`). §5's ordering guarantee
    /// requires reconciliation and cluster writes to follow source order,
    /// so this is threaded through instead of sorting `projects`' keys.
    order: Vec<String>,
}

impl ProjectGraph {
    /// Index `projects` by name, remembering the order the source returned
    /// them in. If the source returned duplicate names the last one wins,
    /// keeping its position in `order`; that shouldn't happen in practice
    /// and is the source's responsibility, not this type's.
    pub fn build(projects: Vec<Project>) -> Self {
        let mut by_name = HashMap::with_capacity(projects.len());
        let mut order = Vec::with_capacity(projects.len());
        for project in projects {
            if !by_name.contains_key(&project.name) {
                order.push(project.name.clone());
            }
            by_name.insert(project.name.clone(), project);
        }
        Self { projects: by_name, order }
    }

    pub fn get(&self, name: &str) -> Option<&Project> {
        self.projects.get(name)
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Every project name known to this graph, in the order the source
    /// returned them (§5).
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Walk `project`'s ancestor chain, furthest ancestor first, nearest
    /// parent last. Stops (with a warning) at the first repeated project
    /// name rather than looping forever on a cyclic hierarchy.
    pub fn ancestors(&self, project: &str) -> Vec<&Project> {
        let mut chain = Vec::new();
        let mut seen = std::collections::HashSet::new();
        seen.insert(project.to_string());

        let mut current = self.projects.get(project).and_then(|p| p.parent.clone());
        while let Some(name) = current {
            if !seen.insert(name.clone()) {
                warn!(project, repeated = %name, "cycle detected in project hierarchy, truncating");
                break;
            }
            let Some(parent_project) = self.projects.get(&name) else {
                break;
            };
            chain.push(parent_project);
            current = parent_project.parent.clone();
        }
        chain.reverse();
        chain
    }

    /// The full hierarchy path from the top-most ancestor down to and
    /// including `project`, as names.
    pub fn hierarchy_names(&self, project: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .ancestors(project)
            .into_iter()
            .map(|p| p.name.clone())
            .collect();
        names.push(project.to_string());
        names
    }

    /// Build the nested `{self: {parent: {grandparent: {}}}}` hierarchy tree
    /// used as the template context's `project_heirarchy` field (§3, §4.5).
    ///
    /// `included_projects` are grafted onto the tree beyond `project`'s own
    /// ancestry, one under the next in declared order, since they're
    /// inherited "as if parents" (§3's `ProjectMappingSpec.included_projects`
    /// semantics). A name not present in the graph is skipped with a
    /// warning rather than breaking tree construction.
    pub fn hierarchy_of(&self, project: &str, included_projects: &[String]) -> serde_json::Value {
        let mut chain = vec![project.to_string()];
        chain.extend(self.ancestors(project).into_iter().rev().map(|p| p.name.clone()));

        for included_name in included_projects {
            let Some(_included) = self.projects.get(included_name) else {
                warn!(project, included = %included_name, "includedProjects entry not found, skipping in hierarchy");
                continue;
            };
            chain.push(included_name.clone());
            chain.extend(self.ancestors(included_name).into_iter().rev().map(|p| p.name.clone()));
        }

        let mut node = serde_json::Value::Object(serde_json::Map::new());
        for name in chain.into_iter().rev() {
            let mut map = serde_json::Map::new();
            map.insert(name, node);
            node = serde_json::Value::Object(map);
        }
        node
    }

    /// Flatten the effective value set for `project`, applying
    /// `included_projects` after the ancestor chain and before the
    /// project's own parameters.
    ///
    /// Returns `(values, origins)` where `values` is in first-seen key
    /// order and `origins` maps each key to a human-readable description of
    /// which project supplied the winning value.
    pub fn flatten(
        &self,
        project: &str,
        included_projects: &[String],
    ) -> (Vec<(String, String, bool)>, ParameterOriginMap) {
        let mut order: Vec<String> = Vec::new();
        let mut values: HashMap<String, (String, bool)> = HashMap::new();
        let mut origins: ParameterOriginMap = HashMap::new();

        for ancestor in self.ancestors(project) {
            apply_layer(
                &mut order,
                &mut values,
                &mut origins,
                ancestor.own_values(),
                ancestor.name.clone(),
            );
        }

        for included_name in included_projects {
            let Some(included) = self.projects.get(included_name) else {
                warn!(project, included = %included_name, "includedProjects entry not found, skipping");
                continue;
            };
            let origin_label = format!("{project} ({included_name})");
            for ancestor in self.ancestors(included_name) {
                apply_layer(
                    &mut order,
                    &mut values,
                    &mut origins,
                    ancestor.own_values(),
                    origin_label.clone(),
                );
            }
            apply_layer(
                &mut order,
                &mut values,
                &mut origins,
                included.own_values(),
                origin_label,
            );
        }

        if let Some(this_project) = self.projects.get(project) {
            apply_layer(
                &mut order,
                &mut values,
                &mut origins,
                this_project.own_values(),
                project.to_string(),
            );
        }

        let flattened = order
            .into_iter()
            .map(|key| {
                let (value, secret) = values.remove(&key).expect("key came from this map");
                (key, value, secret)
            })
            .collect();

        (flattened, origins)
    }
}

fn apply_layer(
    order: &mut Vec<String>,
    values: &mut HashMap<String, (String, bool)>,
    origins: &mut ParameterOriginMap,
    layer: Vec<(&str, &str, bool)>,
    origin_label: String,
) {
    for (key, value, secret) in layer {
        if !values.contains_key(key) {
            order.push(key.to_string());
        }
        values.insert(key.to_string(), (value.to_string(), secret));
        origins.insert(key.to_string(), origin_label.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Parameter;

    fn project(name: &str, parent: Option<&str>, params: &[(&str, &str, bool)]) -> Project {
        let mut p = Project::new(name);
        if let Some(parent) = parent {
            p = p.with_parent(parent);
        }
        p.with_parameters(
            params
                .iter()
                .map(|(k, v, s)| Parameter::new(*k, *v, *s))
                .collect(),
        )
    }

    #[test]
    fn flatten_applies_ancestors_then_own_values() {
        let graph = ProjectGraph::build(vec![
            project("root", None, &[("a", "root-a", false)]),
            project("child", Some("root"), &[("a", "child-a", false), ("b", "child-b", false)]),
        ]);

        let (values, origins) = graph.flatten("child", &[]);
        let map: HashMap<_, _> = values.into_iter().map(|(k, v, _)| (k, v)).collect();
        assert_eq!(map["a"], "child-a");
        assert_eq!(map["b"], "child-b");
        assert_eq!(origins["a"], "child");
    }

    #[test]
    fn flatten_included_projects_beat_ancestors_but_not_own() {
        let graph = ProjectGraph::build(vec![
            project("root", None, &[("a", "root-a", false)]),
            project("child", Some("root"), &[]),
            project("shared", None, &[("a", "shared-a", false)]),
        ]);

        let (values, origins) = graph.flatten("child", &["shared".to_string()]);
        let map: HashMap<_, _> = values.into_iter().map(|(k, v, _)| (k, v)).collect();
        assert_eq!(map["a"], "shared-a");
        assert_eq!(origins["a"], "child (shared)");
    }

    #[test]
    fn names_preserves_source_order_not_alphabetical() {
        let graph = ProjectGraph::build(vec![
            project("zeta", None, &[]),
            project("alpha", None, &[]),
            project("mu", None, &[]),
        ]);
        assert_eq!(
            graph.names(),
            vec!["zeta".to_string(), "alpha".to_string(), "mu".to_string()]
        );
    }

    #[test]
    fn ancestors_breaks_on_cycle() {
        let graph = ProjectGraph::build(vec![
            project("a", Some("b"), &[]),
            project("b", Some("a"), &[]),
        ]);
        let chain = graph.ancestors("a");
        assert!(chain.len() <= 2);
    }

    #[test]
    fn hierarchy_of_grafts_included_projects_beneath_self() {
        let graph = ProjectGraph::build(vec![
            project("proj1", None, &[("param1", "v1", false)]),
            project("proj2", None, &[("param1", "v2", false)]),
            project("proj3", None, &[]),
        ]);

        let tree = graph.hierarchy_of("proj1", &["proj2".to_string()]);
        assert_eq!(tree, serde_json::json!({"proj1": {"proj2": {}}}));
    }

    #[test]
    fn hierarchy_names_includes_self_last() {
        let graph = ProjectGraph::build(vec![
            project("root", None, &[]),
            project("mid", Some("root"), &[]),
            project("leaf", Some("mid"), &[]),
        ]);
        assert_eq!(
            graph.hierarchy_names("leaf"),
            vec!["root".to_string(), "mid".to_string(), "leaf".to_string()]
        );
    }
}
