//! # kubetruthctl
//!
//! Small operator CLI for inspecting `ProjectMapping` resources, in the
//! style of `kubectl` plugins: read-only, talks to the same cluster the
//! controller watches.
//!
//! ```bash
//! kubetruthctl list
//! kubetruthctl describe --name root --namespace default
//! kubetruthctl effective-spec --project my-service
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube::{api::Api, Client};

use kubetruth_controller::config::Config;
use kubetruth_controller::crd::ProjectMapping;

#[derive(Parser)]
#[command(name = "kubetruthctl")]
#[command(about = "Inspect ProjectMapping resources", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every ProjectMapping in the cluster
    List {
        /// Restrict to a single namespace (defaults to all namespaces)
        #[arg(short, long)]
        namespace: Option<String>,
    },
    /// Show the full spec and status of one ProjectMapping
    Describe {
        /// Resource name
        #[arg(short, long)]
        name: String,

        /// Namespace the resource lives in
        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
    /// Compute and print the effective spec for a project name: the root
    /// ProjectMapping with every matching override shallow-merged on top,
    /// exactly as the controller would see it on the next tick.
    EffectiveSpec {
        /// Project name to resolve
        #[arg(short, long)]
        project: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kubetruthctl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client. Ensure KUBECONFIG is configured.")?;

    match cli.command {
        Commands::List { namespace } => list_command(client, namespace).await,
        Commands::Describe { name, namespace } => describe_command(client, name, namespace).await,
        Commands::EffectiveSpec { project } => effective_spec_command(client, project).await,
    }
}

async fn effective_spec_command(client: Client, project: String) -> Result<()> {
    let api: Api<ProjectMapping> = Api::all(client);
    let mappings = api
        .list(&Default::default())
        .await
        .context("failed to list ProjectMapping resources")?;

    let specs = mappings.items.into_iter().map(|m| m.spec).collect();
    let config = Config::load(specs).context("failed to compose ProjectMapping set")?;
    let effective = config
        .spec_for(&project)
        .with_context(|| format!("failed to resolve effective spec for project '{project}'"))?;

    println!("Effective spec for project '{project}':");
    println!("  Skip:        {}", effective.skip);
    println!("  SkipSecrets: {}", effective.skip_secrets);
    if !effective.included_projects.is_empty() {
        println!("  IncludedProjects: {}", effective.included_projects.join(", "));
    }
    println!(
        "  ConfigMap template set: {}",
        !effective.configmap_template.trim().is_empty()
    );
    println!(
        "  Secret template set:    {}",
        !effective.secret_template.trim().is_empty()
    );
    if let Some(name) = &effective.resource_name {
        println!("  Resource name:      {name}");
    }
    if let Some(namespace) = &effective.resource_namespace {
        println!("  Resource namespace: {namespace}");
    }

    Ok(())
}

async fn list_command(client: Client, namespace: Option<String>) -> Result<()> {
    let api: Api<ProjectMapping> = match &namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };

    let mappings = api
        .list(&Default::default())
        .await
        .context("failed to list ProjectMapping resources")?;

    if mappings.items.is_empty() {
        println!("No ProjectMapping resources found.");
        return Ok(());
    }

    println!("{:<30} {:<20} {:<10} {:<30}", "NAME", "NAMESPACE", "SCOPE", "SELECTOR");
    println!("{}", "-".repeat(90));
    for mapping in &mappings.items {
        let name = mapping.metadata.name.as_deref().unwrap_or("<unknown>");
        let ns = mapping.metadata.namespace.as_deref().unwrap_or("<unknown>");
        let scope = format!("{:?}", mapping.spec.scope);
        let selector = if mapping.spec.project_selector.is_empty() {
            "*".to_string()
        } else {
            mapping.spec.project_selector.clone()
        };
        println!("{name:<30} {ns:<20} {scope:<10} {selector:<30}");
    }

    Ok(())
}

async fn describe_command(client: Client, name: String, namespace: String) -> Result<()> {
    let api: Api<ProjectMapping> = Api::namespaced(client, &namespace);
    let mapping = api
        .get(&name)
        .await
        .with_context(|| format!("failed to get ProjectMapping '{namespace}/{name}'"))?;

    println!("Name:      {name}");
    println!("Namespace: {namespace}");
    println!("Scope:     {:?}", mapping.spec.scope);
    println!("Selector:  {}", mapping.spec.project_selector);
    println!("Skip:      {}", mapping.spec.skip);
    println!("SkipSecrets: {}", mapping.spec.skip_secrets);
    if !mapping.spec.included_projects.is_empty() {
        println!("IncludedProjects: {}", mapping.spec.included_projects.join(", "));
    }
    if let Some(status) = &mapping.status {
        println!("\nStatus:");
        if let Some(time) = &status.last_reconcile_time {
            println!("  Last Reconcile Time: {time}");
        }
        if let Some(count) = status.projects_processed {
            println!("  Projects Processed: {count}");
        }
        if let Some(description) = &status.description {
            println!("  Description: {description}");
        }
    } else {
        println!("\nStatus: no status reported yet");
    }

    Ok(())
}
