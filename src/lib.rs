//! Kubetruth Controller Library
//!
//! Core reconciliation engine for projecting CloudTruth projects and
//! parameters into Kubernetes `ConfigMap`/`Secret` resources. The binary
//! entry points (`main.rs`, `bin/crdgen.rs`, `bin/kubetruthctl.rs`) are thin
//! wrappers around what's exported here.

pub mod cli;
pub mod config;
pub mod constants;
pub mod crd;
pub mod error;
pub mod gateway;
pub mod graph;
pub mod model;
pub mod observability;
pub mod poll;
pub mod reconcile;
pub mod server;
pub mod sleep;
pub mod source;
pub mod template;

pub use crd::ProjectMapping;
pub use error::ReconcileError;
