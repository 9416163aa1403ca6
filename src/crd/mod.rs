//! # Custom Resource Definitions
//!
//! The `ProjectMapping` CRD that drives this controller: each document
//! declares which CloudTruth projects to include, how to name the generated
//! `ConfigMap`/`Secret` resources, and which templates to render them with.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `ProjectMapping` Custom Resource Definition.
///
/// Exactly one `ProjectMapping` in a cluster must carry `scope: root`; any
/// number of additional documents may carry `scope: override` and patch the
/// root spec per-project (see [`crate::config`]).
///
/// # Example
///
/// ```yaml
/// apiVersion: kubetruth.cloudtruth.com/v1
/// kind: ProjectMapping
/// metadata:
///   name: root
/// spec:
///   scope: root
///   projectSelector: ""
///   configmapTemplate: |
///     apiVersion: v1
///     kind: ConfigMap
///     metadata:
///       name: "{{ project }}"
///     data:
///       {% for param in parameters %}"{{ param[0] }}": "{{ param[1] }}"
///       {% endfor %}
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "ProjectMapping",
    group = "kubetruth.cloudtruth.com",
    version = "v1",
    namespaced,
    status = "ProjectMappingStatus",
    shortname = "pm",
    printcolumn = r#"{"name":"Scope", "type":"string", "jsonPath":".spec.scope"}, {"name":"Selector", "type":"string", "jsonPath":".spec.projectSelector"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMappingSpec {
    /// Exactly one `ProjectMapping` in the cluster must be `Root`; the rest
    /// are `Override` and are applied, in declared order, over the root.
    #[serde(default)]
    pub scope: Scope,

    /// Regular expression matched against project names. Empty matches all.
    #[serde(default)]
    pub project_selector: String,

    /// If true, matching projects are excluded from output entirely.
    #[serde(default)]
    pub skip: bool,

    /// If true, secret parameters are omitted from the ConfigMap view and no
    /// Secret manifest is rendered for matching projects.
    #[serde(default)]
    pub skip_secrets: bool,

    /// Additional project names whose parameters are inherited, in order, as
    /// if they were parents of the matching project.
    #[serde(default)]
    pub included_projects: Vec<String>,

    /// Liquid-compatible template rendering a ConfigMap manifest. Empty
    /// means "render nothing" for the non-secret side.
    #[serde(default)]
    pub configmap_template: String,

    /// Liquid-compatible template rendering a Secret manifest. Empty means
    /// "render nothing" for the secret side.
    #[serde(default)]
    pub secret_template: String,

    /// Template for the generated resource's `metadata.name`. Defaults to
    /// the project name when unset.
    #[serde(default)]
    pub resource_name: Option<String>,

    /// Template for the generated resource's `metadata.namespace`. Defaults
    /// to the gateway's default namespace when unset.
    #[serde(default)]
    pub resource_namespace: Option<String>,
}

/// Whether a `ProjectMapping` is the base spec or a per-project override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Root,
    Override,
}

/// Status of the `ProjectMapping` resource (root spec only; overrides don't
/// carry independent status since they never drive a reconciliation tick on
/// their own).
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMappingStatus {
    /// Timestamp (RFC3339) of the most recently completed reconciliation
    /// tick that consumed this spec.
    #[serde(default)]
    pub last_reconcile_time: Option<String>,

    /// Number of projects that produced at least one applied/skipped
    /// resource on the last tick.
    #[serde(default)]
    pub projects_processed: Option<i32>,

    /// Human-readable description of the last outcome.
    #[serde(default)]
    pub description: Option<String>,
}
