//! # Parameter Source
//!
//! Abstracts the upstream system that owns projects and parameters. The
//! only shipped implementation talks to the CloudTruth REST API; the trait
//! boundary exists so the reconciler can be driven by an in-memory fake in
//! tests (§6, "ParameterSource is out of scope for the core").

pub mod cloudtruth;

use async_trait::async_trait;

use crate::error::ReconcileError;
use crate::model::Project;

pub use cloudtruth::CloudTruthSource;

/// Read-only view onto the upstream project/parameter store.
#[async_trait]
pub trait ParameterSource: Send + Sync {
    /// Fetch every project, including secret values when `want_secrets` is
    /// true. Implementations that can't cheaply omit secrets may ignore
    /// the flag and return them anyway; the graph/template layer is
    /// responsible for honoring `skip_secrets` downstream.
    async fn list_projects(&self, want_secrets: bool) -> Result<Vec<Project>, ReconcileError>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;

    /// Fixed in-memory `ParameterSource` for reconciler/graph tests.
    pub struct FakeSource {
        pub projects: Vec<Project>,
    }

    impl FakeSource {
        pub fn new(projects: Vec<Project>) -> Self {
            Self { projects }
        }
    }

    #[async_trait]
    impl ParameterSource for FakeSource {
        async fn list_projects(&self, _want_secrets: bool) -> Result<Vec<Project>, ReconcileError> {
            Ok(self.projects.clone())
        }
    }
}
