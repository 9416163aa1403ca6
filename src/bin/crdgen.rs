//! Prints the `ProjectMapping` CustomResourceDefinition as YAML, for
//! `kubectl apply -f <(cargo run --bin crdgen)`.

use kube::CustomResourceExt;
use kubetruth_controller::ProjectMapping;

fn main() -> anyhow::Result<()> {
    let crd = ProjectMapping::crd();
    println!("{}", serde_yaml::to_string(&crd)?);
    Ok(())
}
