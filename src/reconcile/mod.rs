//! # Reconciliation Engine
//!
//! Ties `ParameterSource`, `ProjectGraph`, `Config`, `TemplateRenderer` and
//! `ClusterGateway` together into the single reconciliation tick described
//! in §4: fetch everything, compose the effective spec per project, render
//! templates, apply to the cluster. One project's failure never aborts the
//! others (§4.6, §7).

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::{error, info};

use crate::config::{selector_matches, Config};
use crate::crd::ProjectMappingSpec;
use crate::error::ReconcileError;
use crate::gateway::{ApplyOutcome, ClusterGateway, ResourceKind};
use crate::graph::ProjectGraph;
use crate::observability::metrics;
use crate::source::ParameterSource;
use crate::template::{TemplateContext, TemplateRenderer};

/// Outcome of reconciling a single project.
#[derive(Debug)]
pub struct ProjectOutcome {
    pub project: String,
    pub configmap: Option<ApplyOutcome>,
    pub secret: Option<ApplyOutcome>,
}

/// Outcome of a full reconciliation tick.
#[derive(Debug, Default)]
pub struct TickReport {
    pub projects: Vec<ProjectOutcome>,
    pub errors: Vec<(String, ReconcileError)>,
}

/// Orchestrates one reconciliation tick. Stateless across ticks — every
/// piece of state it needs is fetched fresh each time it's invoked.
pub struct ReconcileEngine<S, G, R> {
    source: Arc<S>,
    gateway: Arc<G>,
    renderer: Arc<R>,
    dry_run: bool,
}

impl<S, G, R> ReconcileEngine<S, G, R>
where
    S: ParameterSource,
    G: ClusterGateway,
    R: TemplateRenderer,
{
    pub fn new(source: Arc<S>, gateway: Arc<G>, renderer: Arc<R>) -> Self {
        Self {
            source,
            gateway,
            renderer,
            dry_run: false,
        }
    }

    /// In dry-run mode no `apply_resource`/`ensure_namespace` call is ever
    /// issued (spec.md §4's "dry-run purity" property); rendered manifests
    /// are logged instead.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run one full reconciliation tick.
    pub async fn run(&self) -> Result<TickReport, ReconcileError> {
        let mappings = self.gateway.get_project_mappings().await?;
        let specs: Vec<ProjectMappingSpec> = mappings.into_iter().map(|m| m.spec).collect();
        let config = Config::load(specs)?;

        let want_secrets = !config.root().skip_secrets;
        let projects = self.source.list_projects(want_secrets).await?;
        let graph = ProjectGraph::build(projects);

        let names = graph.names();

        let mut report = TickReport::default();

        for name in names {
            match self.reconcile_project(&config, &graph, &name).await {
                Ok(Some(outcome)) => report.projects.push(outcome),
                Ok(None) => info!(project = %name, "skipped"),
                Err(e) => {
                    error!(project = %name, error = %e, kind = e.kind(), "project reconciliation failed");
                    report.errors.push((name, e));
                }
            }
        }

        Ok(report)
    }

    async fn reconcile_project(
        &self,
        config: &Config,
        graph: &ProjectGraph,
        project: &str,
    ) -> Result<Option<ProjectOutcome>, ReconcileError> {
        let span = tracing::info_span!("reconcile_project", project);
        let _guard = span.enter();

        let spec = config.spec_for(project)?;
        // §4.6.b: `project_selector` is never merged from an override (see
        // `config::merge_override`), so this is always the root's selector —
        // it gates which project *names* get a resource at all. An
        // `included_projects` entry only contributes parameters to whichever
        // project names it, it never earns that name a resource of its own.
        if !selector_matches(&spec.project_selector, project)? {
            return Ok(None);
        }
        if spec.skip {
            return Ok(None);
        }

        let (parameters, origins) = graph.flatten(project, &spec.included_projects);

        // §4.6.e-g: the ConfigMap template only ever sees non-secret values;
        // the Secret template only ever sees secret values, pre-base64-encoded
        // (keys stay plain). Never let one leak into the other's render.
        let non_secret_params: Vec<(String, String, bool)> = parameters
            .iter()
            .filter(|(_, _, secret)| !secret)
            .cloned()
            .collect();

        let hierarchy = graph.hierarchy_of(project, &spec.included_projects);

        let namespace = spec
            .resource_namespace
            .clone()
            .unwrap_or_else(|| self.gateway.default_namespace().to_string());
        if !self.dry_run {
            self.gateway.ensure_namespace(&namespace).await?;
        }

        let resource_name = spec.resource_name.clone().unwrap_or_else(|| project.to_string());

        let configmap_context = TemplateContext {
            project,
            project_heirarchy: &hierarchy,
            parameters: &non_secret_params,
            parameter_origins: &origins,
            debug: tracing::enabled!(tracing::Level::DEBUG),
        };
        let configmap = self
            .apply_rendered(
                &spec.configmap_template,
                &configmap_context,
                ResourceKind::ConfigMap,
                &namespace,
                &resource_name,
            )
            .await?;

        let secret = if spec.skip_secrets {
            None
        } else {
            let secret_params: Vec<(String, String, bool)> = parameters
                .iter()
                .filter(|(_, _, secret)| *secret)
                .map(|(key, value, secret)| (key.clone(), BASE64.encode(value.as_bytes()), *secret))
                .collect();
            let secret_context = TemplateContext {
                project,
                project_heirarchy: &hierarchy,
                parameters: &secret_params,
                parameter_origins: &origins,
                debug: false,
            };
            self.apply_rendered(
                &spec.secret_template,
                &secret_context,
                ResourceKind::Secret,
                &namespace,
                &resource_name,
            )
            .await?
        };

        Ok(Some(ProjectOutcome {
            project: project.to_string(),
            configmap,
            secret,
        }))
    }

    async fn apply_rendered(
        &self,
        template: &str,
        context: &TemplateContext<'_>,
        kind: ResourceKind,
        namespace: &str,
        resource_name: &str,
    ) -> Result<Option<ApplyOutcome>, ReconcileError> {
        if template.trim().is_empty() {
            return Ok(None);
        }

        let rendered = self.renderer.render(template, context)?;
        let mut manifest: serde_json::Value = serde_yaml::from_str(&rendered)
            .map_err(|e| ReconcileError::ManifestParse(format!("{kind:?} template: {e}")))?;

        inject_management_metadata(&mut manifest, resource_name, namespace);

        if self.dry_run {
            info!(kind = kind.as_str(), namespace, resource_name, manifest = %manifest, "dry-run: would apply");
            return Ok(None);
        }

        // §4.3: a resource that exists but isn't under our management is an
        // informational skip, not a tick-aborting failure.
        match self.gateway.apply_resource(kind, namespace, manifest).await {
            Ok(outcome) => {
                metrics::increment_resources_applied(kind.as_str(), outcome.as_str());
                Ok(Some(outcome))
            }
            Err(ReconcileError::ManagementConflict { kind, namespace, name }) => {
                info!(kind, namespace, name, "skipping, not under kubetruth management");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Ensure the rendered manifest has `metadata.name`, `metadata.namespace`
/// and the managed-by label, overriding anything the template itself set
/// for name/namespace so `resource_name`/`resource_namespace` always win.
fn inject_management_metadata(manifest: &mut serde_json::Value, name: &str, namespace: &str) {
    let metadata = manifest
        .as_object_mut()
        .and_then(|obj| obj.entry("metadata").or_insert_with(|| serde_json::json!({})).as_object_mut());

    if let Some(metadata) = metadata {
        metadata.insert("name".to_string(), serde_json::json!(name));
        metadata.insert("namespace".to_string(), serde_json::json!(namespace));
        let labels = metadata
            .entry("labels")
            .or_insert_with(|| serde_json::json!({}))
            .as_object_mut();
        if let Some(labels) = labels {
            labels.insert(
                crate::constants::MANAGED_BY_LABEL.to_string(),
                serde_json::json!(crate::constants::MANAGED_BY_VALUE),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fake::FakeGateway;
    use crate::model::{Parameter, Project};
    use crate::source::fake::FakeSource;
    use crate::template::LiquidRenderer;

    fn mapping(spec: ProjectMappingSpec) -> crate::crd::ProjectMapping {
        crate::crd::ProjectMapping::new("root", spec)
    }

    fn root_spec() -> ProjectMappingSpec {
        ProjectMappingSpec {
            scope: crate::crd::Scope::Root,
            project_selector: String::new(),
            skip: false,
            skip_secrets: false,
            included_projects: vec![],
            configmap_template: "apiVersion: v1\nkind: ConfigMap\nmetadata: {}\ndata:\n{% for p in parameters %}  {{ p.key }}: \"{{ p.value }}\"\n{% endfor %}".to_string(),
            secret_template: String::new(),
            resource_name: None,
            resource_namespace: None,
        }
    }

    #[tokio::test]
    async fn reconciles_a_single_project_into_a_configmap() {
        let project = Project::new("myapp")
            .with_parameters(vec![Parameter::new("KEY", "value", false)]);

        let source = Arc::new(FakeSource::new(vec![project]));
        let gateway = Arc::new(FakeGateway::new("default"));
        gateway
            .mappings
            .lock()
            .unwrap()
            .push(mapping(root_spec()));
        let renderer = Arc::new(LiquidRenderer);

        let engine = ReconcileEngine::new(source, gateway.clone(), renderer);
        let report = engine.run().await.unwrap();

        assert!(report.errors.is_empty());
        assert_eq!(report.projects.len(), 1);
        assert_eq!(report.projects[0].project, "myapp");
        assert!(matches!(
            report.projects[0].configmap,
            Some(ApplyOutcome::Created)
        ));
    }

    #[tokio::test]
    async fn skip_flag_produces_no_resources() {
        let mut spec = root_spec();
        spec.skip = true;

        let project = Project::new("myapp").with_parameters(vec![]);
        let source = Arc::new(FakeSource::new(vec![project]));
        let gateway = Arc::new(FakeGateway::new("default"));
        gateway.mappings.lock().unwrap().push(mapping(spec));
        let renderer = Arc::new(LiquidRenderer);

        let engine = ReconcileEngine::new(source, gateway, renderer);
        let report = engine.run().await.unwrap();

        assert!(report.projects.is_empty());
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn second_identical_tick_reports_unchanged() {
        let project = Project::new("myapp")
            .with_parameters(vec![Parameter::new("KEY", "value", false)]);

        let source = Arc::new(FakeSource::new(vec![project]));
        let gateway = Arc::new(FakeGateway::new("default"));
        gateway.mappings.lock().unwrap().push(mapping(root_spec()));
        let renderer = Arc::new(LiquidRenderer);

        let engine = ReconcileEngine::new(source, gateway, renderer);
        engine.run().await.unwrap();
        let second = engine.run().await.unwrap();

        assert!(matches!(
            second.projects[0].configmap,
            Some(ApplyOutcome::Unchanged)
        ));
    }

    #[tokio::test]
    async fn selector_honored_only_matching_projects_reconciled() {
        let mut spec = root_spec();
        spec.project_selector = "oo".to_string();

        let projects = vec![
            Project::new("proj1").with_parameters(vec![]),
            Project::new("foo").with_parameters(vec![]),
            Project::new("bar").with_parameters(vec![]),
        ];
        let source = Arc::new(FakeSource::new(projects));
        let gateway = Arc::new(FakeGateway::new("default"));
        gateway.mappings.lock().unwrap().push(mapping(spec));
        let renderer = Arc::new(LiquidRenderer);

        let engine = ReconcileEngine::new(source, gateway, renderer);
        let report = engine.run().await.unwrap();

        assert_eq!(report.projects.len(), 1);
        assert_eq!(report.projects[0].project, "foo");
    }

    #[tokio::test]
    async fn override_included_projects_are_flattened_onto_the_one_selected_project() {
        // Scenario 4: root selector narrows reconciliation down to `proj1`;
        // an override (itself matching `proj1`) adds `proj2` as an
        // included project. Only `proj1` gets a resource; `proj2` never
        // earns one of its own just by being included elsewhere.
        let mut root = root_spec();
        root.project_selector = "^proj1$".to_string();

        let mut over = root_spec();
        over.scope = crate::crd::Scope::Override;
        over.project_selector = "^proj1$".to_string();
        over.included_projects = vec!["proj2".to_string()];

        let projects = vec![
            Project::new("proj1").with_parameters(vec![Parameter::new("param1", "v1", false)]),
            Project::new("proj2").with_parameters(vec![Parameter::new("param1", "v2", false)]),
            Project::new("proj3").with_parameters(vec![]),
        ];
        let source = Arc::new(FakeSource::new(projects));
        let gateway = Arc::new(FakeGateway::new("default"));
        gateway.mappings.lock().unwrap().push(mapping(root));
        gateway.mappings.lock().unwrap().push(mapping(over));
        let renderer = Arc::new(LiquidRenderer);

        let engine = ReconcileEngine::new(source, gateway, renderer);
        let report = engine.run().await.unwrap();

        assert!(report.errors.is_empty());
        assert_eq!(report.projects.len(), 1);
        assert_eq!(report.projects[0].project, "proj1");
    }

    #[tokio::test]
    async fn projects_are_reconciled_in_source_order_not_alphabetical() {
        let projects = vec![
            Project::new("zeta").with_parameters(vec![]),
            Project::new("alpha").with_parameters(vec![]),
            Project::new("mu").with_parameters(vec![]),
        ];
        let source = Arc::new(FakeSource::new(projects));
        let gateway = Arc::new(FakeGateway::new("default"));
        gateway.mappings.lock().unwrap().push(mapping(root_spec()));
        let renderer = Arc::new(LiquidRenderer);

        let engine = ReconcileEngine::new(source, gateway, renderer);
        let report = engine.run().await.unwrap();

        let names: Vec<&str> = report.projects.iter().map(|p| p.project.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mu"]);
    }

    #[tokio::test]
    async fn existing_resource_not_under_management_is_skipped() {
        let project = Project::new("myapp")
            .with_parameters(vec![Parameter::new("KEY", "value", false)]);

        let source = Arc::new(FakeSource::new(vec![project]));
        let gateway = Arc::new(FakeGateway::new("default"));
        gateway.mappings.lock().unwrap().push(mapping(root_spec()));
        gateway.resources.lock().unwrap().insert(
            ("ConfigMap".to_string(), "default".to_string(), "myapp".to_string()),
            serde_json::json!({
                "metadata": {"name": "myapp", "namespace": "default"},
                "data": {"KEY": "someone-elses-value"}
            }),
        );
        let renderer = Arc::new(LiquidRenderer);

        let engine = ReconcileEngine::new(source, gateway, renderer);
        let report = engine.run().await.unwrap();

        assert!(report.errors.is_empty());
        assert_eq!(report.projects.len(), 1);
        assert_eq!(report.projects[0].configmap, None);
    }

    #[tokio::test]
    async fn secret_values_are_base64_encoded_and_isolated_from_configmap() {
        let mut spec = root_spec();
        spec.secret_template = "apiVersion: v1\nkind: Secret\nmetadata: {}\ndata:\n{% for p in parameters %}  {{ p.key }}: \"{{ p.value }}\"\n{% endfor %}".to_string();

        let project = Project::new("myapp").with_parameters(vec![
            Parameter::new("PLAIN", "visible", false),
            Parameter::new("TOKEN", "shh", true),
        ]);
        let source = Arc::new(FakeSource::new(vec![project]));
        let gateway = Arc::new(FakeGateway::new("default"));
        gateway.mappings.lock().unwrap().push(mapping(spec));
        let renderer = Arc::new(LiquidRenderer);

        let engine = ReconcileEngine::new(source, gateway.clone(), renderer);
        let report = engine.run().await.unwrap();

        assert!(report.errors.is_empty());
        assert!(matches!(report.projects[0].secret, Some(ApplyOutcome::Created)));

        let resources = gateway.resources.lock().unwrap();
        let configmap = &resources[&("ConfigMap".to_string(), "default".to_string(), "myapp".to_string())];
        let secret = &resources[&("Secret".to_string(), "default".to_string(), "myapp".to_string())];

        assert!(configmap["data"].get("TOKEN").is_none());
        assert!(secret["data"].get("PLAIN").is_none());
        assert_eq!(secret["data"]["TOKEN"], serde_json::json!(BASE64.encode(b"shh")));
    }

    #[tokio::test]
    async fn skip_secrets_produces_no_secret_manifest() {
        let mut spec = root_spec();
        spec.skip_secrets = true;
        spec.secret_template = "apiVersion: v1\nkind: Secret\nmetadata: {}\ndata:\n{% for p in parameters %}  {{ p.key }}: \"{{ p.value }}\"\n{% endfor %}".to_string();

        let project = Project::new("myapp").with_parameters(vec![
            Parameter::new("PLAIN", "visible", false),
            Parameter::new("TOKEN", "shh", true),
        ]);
        let source = Arc::new(FakeSource::new(vec![project]));
        let gateway = Arc::new(FakeGateway::new("default"));
        gateway.mappings.lock().unwrap().push(mapping(spec));
        let renderer = Arc::new(LiquidRenderer);

        let engine = ReconcileEngine::new(source, gateway, renderer);
        let report = engine.run().await.unwrap();

        assert!(report.errors.is_empty());
        assert_eq!(report.projects[0].secret, None);
    }

    #[tokio::test]
    async fn dry_run_never_touches_the_gateway() {
        let project = Project::new("myapp")
            .with_parameters(vec![Parameter::new("KEY", "value", false)]);

        let source = Arc::new(FakeSource::new(vec![project]));
        let gateway = Arc::new(FakeGateway::new("default"));
        gateway.mappings.lock().unwrap().push(mapping(root_spec()));
        let renderer = Arc::new(LiquidRenderer);

        let engine = ReconcileEngine::new(source, gateway.clone(), renderer).with_dry_run(true);
        let report = engine.run().await.unwrap();

        assert!(report.errors.is_empty());
        assert_eq!(report.projects[0].configmap, None);
        assert!(gateway.resources.lock().unwrap().is_empty());
    }
}
