//! Kubernetes-backed [`super::ClusterGateway`].
//!
//! Resources are applied with server-side apply under a fixed field manager
//! (`crate::constants::FIELD_MANAGER`), mirroring the status-patch pattern
//! the reconciler uses elsewhere in this crate.

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use kube::api::{Api, DynamicObject, Patch, PatchParams, PostParams};
use kube::Client;
use kube_runtime::watcher;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::constants::{FIELD_MANAGER, MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use crate::crd::ProjectMapping;
use crate::error::ReconcileError;

use super::{ApplyOutcome, ClusterGateway, ProjectMappingWatch, ResourceKind};

/// Real `ClusterGateway` backed by a live `kube::Client`.
pub struct KubeGateway {
    client: Client,
    default_namespace: String,
}

impl KubeGateway {
    pub fn new(client: Client, default_namespace: impl Into<String>) -> Self {
        Self {
            client,
            default_namespace: default_namespace.into(),
        }
    }

    fn dynamic_api(&self, kind: ResourceKind, namespace: &str) -> Api<DynamicObject> {
        let api_resource = match kind {
            ResourceKind::ConfigMap => {
                kube::api::ApiResource::erase::<ConfigMap>(&())
            }
            ResourceKind::Secret => kube::api::ApiResource::erase::<Secret>(&()),
        };
        Api::namespaced_with(self.client.clone(), namespace, &api_resource)
    }
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn get_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Value>, ReconcileError> {
        let api = self.dynamic_api(kind, namespace);
        match api.get(name).await {
            Ok(obj) => Ok(Some(serde_json::to_value(obj).map_err(|e| {
                ReconcileError::ManifestParse(format!("failed to serialize existing resource: {e}"))
            })?)),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(None),
            Err(e) => Err(ReconcileError::Cluster(e)),
        }
    }

    async fn apply_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        manifest: Value,
    ) -> Result<ApplyOutcome, ReconcileError> {
        let name = manifest["metadata"]["name"]
            .as_str()
            .ok_or_else(|| ReconcileError::ManifestParse("missing metadata.name".to_string()))?
            .to_string();

        let existing = self.get_resource(kind, namespace, &name).await?;

        if let Some(existing) = &existing {
            if !self.under_management(existing) {
                return Err(ReconcileError::ManagementConflict {
                    kind: kind.as_str().to_string(),
                    namespace: namespace.to_string(),
                    name,
                });
            }
            if manifests_equivalent(existing, &manifest) {
                debug!(kind = kind.as_str(), namespace, name, "resource unchanged, skipping apply");
                return Ok(ApplyOutcome::Unchanged);
            }
        }

        let api = self.dynamic_api(kind, namespace);
        let dynamic: DynamicObject = serde_json::from_value(manifest)
            .map_err(|e| ReconcileError::ManifestParse(format!("invalid manifest: {e}")))?;

        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&dynamic),
        )
        .await
        .map_err(ReconcileError::Cluster)?;

        let outcome = if existing.is_some() {
            ApplyOutcome::Updated
        } else {
            ApplyOutcome::Created
        };
        info!(kind = kind.as_str(), namespace, name, outcome = ?outcome, "applied resource");
        Ok(outcome)
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<(), ReconcileError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.get(namespace).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => {
                let ns = Namespace {
                    metadata: kube::api::ObjectMeta {
                        name: Some(namespace.to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                };
                api.create(&PostParams::default(), &ns)
                    .await
                    .map_err(ReconcileError::Cluster)?;
                info!(namespace, "created namespace");
                Ok(())
            }
            Err(e) => Err(ReconcileError::Cluster(e)),
        }
    }

    fn under_management(&self, existing: &Value) -> bool {
        existing["metadata"]["labels"][MANAGED_BY_LABEL] == json!(MANAGED_BY_VALUE)
    }

    async fn get_project_mappings(&self) -> Result<Vec<ProjectMapping>, ReconcileError> {
        let api: Api<ProjectMapping> = Api::all(self.client.clone());
        let list = api
            .list(&Default::default())
            .await
            .map_err(ReconcileError::Cluster)?;
        Ok(list.items)
    }

    async fn watch_project_mappings(&self) -> Result<ProjectMappingWatch, ReconcileError> {
        let api: Api<ProjectMapping> = Api::all(self.client.clone());
        let stream = watcher(api, watcher::Config::default()).filter_map(|event| async move {
            match event {
                Ok(_) => Some(()),
                Err(e) => {
                    warn!(error = %e, "project mapping watch error");
                    None
                }
            }
        });
        Ok(ProjectMappingWatch::new(stream.boxed()))
    }

    fn default_namespace(&self) -> &str {
        &self.default_namespace
    }
}

/// Structural equality that ignores fields the API server populates on
/// read (`resourceVersion`, `uid`, `creationTimestamp`, `generation`,
/// `managedFields`, `status`) so an unchanged spec doesn't trigger a patch.
fn manifests_equivalent(existing: &Value, desired: &Value) -> bool {
    strip_server_fields(existing.clone()) == strip_server_fields(desired.clone())
}

fn strip_server_fields(mut value: Value) -> Value {
    if let Some(metadata) = value.get_mut("metadata").and_then(Value::as_object_mut) {
        for field in [
            "resourceVersion",
            "uid",
            "creationTimestamp",
            "generation",
            "managedFields",
            "selfLink",
            "ownerReferences",
        ] {
            metadata.remove(field);
        }
    }
    if let Some(obj) = value.as_object_mut() {
        obj.remove("status");
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strip_server_fields_ignores_noise() {
        let manifest = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "myapp",
                "resourceVersion": "123",
                "uid": "abc",
                "labels": {"app.kubernetes.io/managed-by": "kubetruth"}
            },
            "data": {"KEY": "value"}
        });
        let mut updated = manifest.clone();
        updated["metadata"]["resourceVersion"] = json!("456");

        assert!(manifests_equivalent(&manifest, &updated));
    }

    #[test]
    fn strip_server_fields_detects_data_drift() {
        let manifest = json!({"metadata": {"name": "myapp"}, "data": {"KEY": "value"}});
        let mut updated = manifest.clone();
        updated["data"]["KEY"] = json!("different");

        assert!(!manifests_equivalent(&manifest, &updated));
    }
}
