//! # Cluster Gateway
//!
//! Abstracts every Kubernetes API interaction the reconciler needs behind a
//! trait so the core engine (`crate::reconcile`) can be tested with an
//! in-memory fake instead of a real API server (§6).

pub mod kube_impl;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::crd::ProjectMapping;
use crate::error::ReconcileError;

pub use kube_impl::KubeGateway;

/// The two resource kinds this controller ever writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    ConfigMap,
    Secret,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Secret => "Secret",
        }
    }
}

/// What happened when a rendered manifest was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
}

impl ApplyOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplyOutcome::Created => "created",
            ApplyOutcome::Updated => "updated",
            ApplyOutcome::Unchanged => "unchanged",
        }
    }
}

/// A single `watch_project_mappings()` session (§4.2, §4.7).
///
/// The reconciler's poll loop opens exactly one of these per iteration,
/// reads change notices from it, and `finish()`es it before the next
/// iteration starts (§5's "every opened watcher is finish()ed exactly once
/// per iteration" invariant). `finish()` and an un-finished drop (e.g. the
/// reader task being aborted because the poll interval elapsed with no
/// event) are equivalent — either one runs the completion hook exactly
/// once, so the invariant holds whichever path a given iteration takes.
pub struct ProjectMappingWatch {
    stream: BoxStream<'static, ()>,
    on_finish: Option<Box<dyn FnOnce() + Send>>,
    finished: bool,
}

impl ProjectMappingWatch {
    pub fn new(stream: BoxStream<'static, ()>) -> Self {
        Self {
            stream,
            on_finish: None,
            finished: false,
        }
    }

    /// Like [`Self::new`], but runs `hook` the first time this watch is
    /// finished (by explicit `finish()` or by being dropped). Used by tests
    /// to observe watcher hygiene.
    pub fn with_finish_hook(stream: BoxStream<'static, ()>, hook: impl FnOnce() + Send + 'static) -> Self {
        Self {
            stream,
            on_finish: Some(Box::new(hook)),
            finished: false,
        }
    }

    /// Wait for the next change notice, or `None` once the upstream stream
    /// has ended.
    pub async fn next_change(&mut self) -> Option<()> {
        self.stream.next().await
    }

    /// Explicitly end this watch session.
    pub fn finish(mut self) {
        self.run_hook();
    }

    fn run_hook(&mut self) {
        if !self.finished {
            self.finished = true;
            if let Some(hook) = self.on_finish.take() {
                hook();
            }
        }
    }
}

impl Drop for ProjectMappingWatch {
    fn drop(&mut self) {
        self.run_hook();
    }
}

impl std::fmt::Debug for ProjectMappingWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectMappingWatch").finish_non_exhaustive()
    }
}

/// Everything the reconciler needs from the Kubernetes API.
///
/// Implementations must be safe to call from multiple concurrent calls
/// within a single reconciliation tick, although the engine itself never
/// calls more than one at a time (see `crate::poll`).
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Fetch the named resource, or `None` if it doesn't exist.
    async fn get_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Value>, ReconcileError>;

    /// Server-side apply a rendered manifest. Compares the manifest against
    /// any existing resource first (ignoring server-populated fields) and
    /// skips the API call entirely when nothing would change (§4.3).
    async fn apply_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        manifest: Value,
    ) -> Result<ApplyOutcome, ReconcileError>;

    /// Create the namespace if it doesn't already exist.
    async fn ensure_namespace(&self, namespace: &str) -> Result<(), ReconcileError>;

    /// Whether `existing` carries this controller's management label, i.e.
    /// it's safe to overwrite without clobbering a resource some other
    /// system owns.
    fn under_management(&self, existing: &Value) -> bool;

    /// Fetch every `ProjectMapping` visible to this controller.
    async fn get_project_mappings(&self) -> Result<Vec<ProjectMapping>, ReconcileError>;

    /// Open a fresh watch session that yields one item every time a
    /// `ProjectMapping` is created, updated or deleted anywhere in the
    /// cluster. Used by `crate::poll` to wake an otherwise-sleeping
    /// reconciliation loop. The caller opens one of these per iteration and
    /// finishes it before the next (§4.2, §4.7).
    async fn watch_project_mappings(&self) -> Result<ProjectMappingWatch, ReconcileError>;

    /// The namespace this gateway defaults generated resources into when a
    /// `ProjectMappingSpec` doesn't set `resource_namespace`.
    fn default_namespace(&self) -> &str;
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory `ClusterGateway` used by reconciler and poll-loop tests.
    ///
    /// `watch_project_mappings` can be called any number of times (the poll
    /// loop opens a fresh watch every iteration); each call subscribes a new
    /// receiver to a shared broadcast channel so `trigger_watch()` reaches
    /// every currently-open watch, the way every replica of a real
    /// `kube_runtime::watcher` would observe the same cluster event.
    pub struct FakeGateway {
        pub resources: Mutex<HashMap<(String, String, String), Value>>,
        pub mappings: Mutex<Vec<ProjectMapping>>,
        pub namespace: String,
        watch_tx: tokio::sync::broadcast::Sender<()>,
        pub watch_opens: std::sync::atomic::AtomicUsize,
        pub watch_finishes: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl FakeGateway {
        pub fn new(namespace: impl Into<String>) -> Self {
            let (tx, _rx) = tokio::sync::broadcast::channel(16);
            Self {
                resources: Mutex::new(HashMap::new()),
                mappings: Mutex::new(Vec::new()),
                namespace: namespace.into(),
                watch_tx: tx,
                watch_opens: std::sync::atomic::AtomicUsize::new(0),
                watch_finishes: std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0)),
            }
        }

        /// Signal a simulated `ProjectMapping` change to every watch session
        /// currently open via `watch_project_mappings`.
        pub fn trigger_watch(&self) {
            let _ = self.watch_tx.send(());
        }

        fn key(kind: ResourceKind, namespace: &str, name: &str) -> (String, String, String) {
            (kind.as_str().to_string(), namespace.to_string(), name.to_string())
        }
    }

    #[async_trait]
    impl ClusterGateway for FakeGateway {
        async fn get_resource(
            &self,
            kind: ResourceKind,
            namespace: &str,
            name: &str,
        ) -> Result<Option<Value>, ReconcileError> {
            Ok(self
                .resources
                .lock()
                .expect("lock poisoned")
                .get(&Self::key(kind, namespace, name))
                .cloned())
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
            let key = Self::key(kind, namespace, &name);
            let mut resources = self.resources.lock().expect("lock poisoned");
            if let Some(existing) = resources.get(&key) {
                if !self.under_management(existing) {
                    return Err(ReconcileError::ManagementConflict {
                        kind: kind.as_str().to_string(),
                        namespace: namespace.to_string(),
                        name,
                    });
                }
            }
            let outcome = match resources.get(&key) {
                None => ApplyOutcome::Created,
                Some(existing) if existing == &manifest => ApplyOutcome::Unchanged,
                Some(_) => ApplyOutcome::Updated,
            };
            resources.insert(key, manifest);
            Ok(outcome)
        }

        async fn ensure_namespace(&self, _namespace: &str) -> Result<(), ReconcileError> {
            Ok(())
        }

        fn under_management(&self, existing: &Value) -> bool {
            existing["metadata"]["labels"][crate::constants::MANAGED_BY_LABEL]
                == crate::constants::MANAGED_BY_VALUE
        }

        async fn get_project_mappings(&self) -> Result<Vec<ProjectMapping>, ReconcileError> {
            Ok(self.mappings.lock().expect("lock poisoned").clone())
        }

        async fn watch_project_mappings(&self) -> Result<ProjectMappingWatch, ReconcileError> {
            use futures::StreamExt;
            use tokio_stream::wrappers::BroadcastStream;

            self.watch_opens.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let rx = self.watch_tx.subscribe();
            let stream = BroadcastStream::new(rx).filter_map(|item| async move { item.ok() }).boxed();
            let finishes = self.watch_finishes.clone();
            Ok(ProjectMappingWatch::with_finish_hook(stream, move || {
                finishes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }))
        }

        fn default_namespace(&self) -> &str {
            &self.namespace
        }
    }
}
