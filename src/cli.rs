//! # KMSCTL CLI
//!
//! Command-line interface for the Key Management Controller.
//!
//! ## Usage
//!
//! ```bash
//! # Force a fetch for a specific KeyManagementSystem
//! kmsctl reconcile --namespace default --name signing-certs
//!
//! # List all KeyManagementSystem resources
//! kmsctl list
//!
//! # Show status of a KeyManagementSystem
//! kmsctl status --namespace default --name signing-certs
//!
//! # Check a PEM bundle before putting it into an inline provider
//! kmsctl decode --file chain.pem
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use key_management_controller::constants::RECONCILE_ANNOTATION;
use key_management_controller::provider::decode_certificates;
use key_management_controller::KeyManagementSystem;
use kube::{
    api::{Api, ListParams, Patch, PatchParams},
    Client,
};
use serde_json::json;
use std::path::{Path, PathBuf};

/// Key Management Controller CLI
#[derive(Debug, Parser)]
#[command(name = "kmsctl")]
#[command(about = "Key Management Controller CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace (defaults to "default")
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Trigger a fetch for a KeyManagementSystem resource
    Reconcile {
        /// Name of the KeyManagementSystem resource
        #[arg(long)]
        name: String,
    },
    /// List KeyManagementSystem resources (all namespaces unless --namespace is given)
    List,
    /// Show status of a KeyManagementSystem resource
    Status {
        /// Name of the KeyManagementSystem resource
        #[arg(long)]
        name: String,
    },
    /// Decode a PEM bundle the way the inline provider does
    Decode {
        /// Path to the PEM file
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kmsctl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Reconcile { name } => reconcile_command(connect().await?, &name, cli.namespace).await,
        Commands::List => list_command(connect().await?, cli.namespace).await,
        Commands::Status { name } => status_command(connect().await?, &name, cli.namespace).await,
        Commands::Decode { file } => decode_command(&file),
    }
}

async fn connect() -> Result<Client> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")
}

/// Trigger reconciliation by updating the reconcile annotation
async fn reconcile_command(client: Client, name: &str, namespace: Option<String>) -> Result<()> {
    let ns = namespace.as_deref().unwrap_or("default");
    println!("Triggering fetch for KeyManagementSystem '{ns}/{name}'...");

    let api: Api<KeyManagementSystem> = Api::namespaced(client, ns);
    let timestamp = Utc::now().to_rfc3339();
    let patch = json!({
        "metadata": {
            "annotations": {
                RECONCILE_ANNOTATION: timestamp
            }
        }
    });

    api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
        .await
        .with_context(|| format!("Failed to trigger reconciliation for '{ns}/{name}'"))?;

    println!("Reconciliation triggered");
    println!("   Resource: {ns}/{name}");
    println!("   Timestamp: {timestamp}");
    Ok(())
}

/// List KeyManagementSystem resources
async fn list_command(client: Client, namespace: Option<String>) -> Result<()> {
    let api: Api<KeyManagementSystem> = match namespace {
        Some(ns) => Api::namespaced(client, &ns),
        None => Api::all(client),
    };

    let resources = api
        .list(&ListParams::default())
        .await
        .context("Failed to list KeyManagementSystem resources")?;

    if resources.items.is_empty() {
        println!("No KeyManagementSystem resources found.");
        return Ok(());
    }

    println!(
        "{:<30} {:<20} {:<16} {:<10} {:<35} {:<30}",
        "NAME", "NAMESPACE", "TYPE", "SUCCESS", "ERROR", "LAST FETCHED"
    );
    println!("{}", "-".repeat(140));

    for kms in resources.items {
        let name = kms.metadata.name.as_deref().unwrap_or("<unknown>");
        let ns = kms.metadata.namespace.as_deref().unwrap_or("<unknown>");
        let (success, error, fetched) = match &kms.status {
            Some(status) => (
                status.is_success.to_string(),
                status.brief_error.clone(),
                status.last_fetched_time.clone().unwrap_or_else(|| "-".to_string()),
            ),
            None => ("Unknown".to_string(), String::new(), "-".to_string()),
        };
        println!(
            "{:<30} {:<20} {:<16} {:<10} {:<35} {:<30}",
            name, ns, kms.spec.r#type, success, error, fetched
        );
    }

    Ok(())
}

/// Show detailed status of a KeyManagementSystem resource
async fn status_command(client: Client, name: &str, namespace: Option<String>) -> Result<()> {
    let ns = namespace.as_deref().unwrap_or("default");
    let api: Api<KeyManagementSystem> = Api::namespaced(client, ns);
    let kms = api
        .get(name)
        .await
        .with_context(|| format!("Failed to get KeyManagementSystem '{ns}/{name}'"))?;

    println!("Status for KeyManagementSystem '{ns}/{name}':\n");
    println!("Spec:");
    println!("  Type: {}", kms.spec.r#type);
    if let Some(generation) = kms.metadata.generation {
        println!("  Generation: {generation}");
    }

    let Some(status) = kms.status else {
        println!("\nStatus: No status available (resource may not have been reconciled yet)");
        return Ok(());
    };

    println!("\nStatus:");
    println!("  Success: {}", status.is_success);
    if let Some(time) = &status.last_fetched_time {
        println!("  Last Fetched Time: {time}");
    }
    if !status.error.is_empty() {
        println!("  Error: {}", status.error);
    }
    if let Some(properties) = &status.properties {
        println!(
            "  Properties:\n{}",
            serde_json::to_string_pretty(properties).context("Failed to render properties")?
        );
    }

    Ok(())
}

fn decode_command(file: &Path) -> Result<()> {
    let content =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let certificates = decode_certificates(&content)?;

    println!("Decoded {} certificate(s) from {}", certificates.len(), file.display());
    for (index, certificate) in certificates.iter().enumerate() {
        println!("\n[{index}]");
        println!("  Subject: {}", certificate.subject());
        println!("  Issuer: {}", certificate.issuer());
        println!("  Serial: {}", certificate.serial_number());
        match certificate.not_after() {
            Some(not_after) => println!("  Not After: {}", not_after.to_rfc3339()),
            None => println!("  Not After: -"),
        }
    }
    Ok(())
}
