//! CloudTruth REST client implementation of [`super::ParameterSource`].
//!
//! Uses `reqwest` with rustls (no native-tls/OpenSSL dependency), matching
//! the rest of this crate's HTTP stack.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ReconcileError;
use crate::model::{Parameter, Project};

use super::ParameterSource;

const DEFAULT_BASE_URL: &str = "https://api.cloudtruth.io/api/v1";

/// REST client for the CloudTruth API.
pub struct CloudTruthSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CloudTruthSource {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, ReconcileError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Api-Key {}", self.api_key))
            .send()
            .await
            .map_err(|e| ReconcileError::Source(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ReconcileError::Source(format!(
                "{url} returned {}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ReconcileError::Source(format!("failed to decode response from {url}: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct ProjectListResponse {
    results: Vec<ProjectEnvelope>,
}

#[derive(Debug, Deserialize)]
struct ProjectEnvelope {
    id: String,
    name: String,
    parent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParameterListResponse {
    results: Vec<ParameterEnvelope>,
}

#[derive(Debug, Deserialize)]
struct ParameterEnvelope {
    name: String,
    secret: bool,
    #[serde(default)]
    value: Option<String>,
}

#[async_trait]
impl ParameterSource for CloudTruthSource {
    async fn list_projects(&self, want_secrets: bool) -> Result<Vec<Project>, ReconcileError> {
        let projects: ProjectListResponse = self.get_json("/projects/").await?;
        let mut by_id = std::collections::HashMap::new();
        for envelope in &projects.results {
            by_id.insert(envelope.id.clone(), envelope.name.clone());
        }

        let mut result = Vec::with_capacity(projects.results.len());
        for envelope in projects.results {
            let path = if want_secrets {
                format!("/projects/{}/parameters/?values=true", envelope.id)
            } else {
                format!("/projects/{}/parameters/?values=true&secrets=false", envelope.id)
            };
            let parameters: ParameterListResponse = self.get_json(&path).await?;

            let params: Vec<Parameter> = parameters
                .results
                .into_iter()
                .filter(|p| want_secrets || !p.secret)
                .map(|p| Parameter::new(p.name, p.value.unwrap_or_default(), p.secret))
                .collect();

            let parent = envelope.parent.and_then(|id| by_id.get(&id).cloned());

            let mut project = Project::new(envelope.name).with_parameters(params);
            if let Some(parent) = parent {
                project = project.with_parent(parent);
            }
            result.push(project);
        }

        Ok(result)
    }
}
