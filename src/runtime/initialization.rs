//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, registries, the shared cache and Kubernetes client setup.

use crate::auth::{self, AuthProvider};
use crate::cache;
use crate::config::{self, ServerConfig};
use crate::controller::orchestrator::KubeOrchestrator;
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::crd::KeyManagementSystem;
use crate::observability;
use crate::provider;
use crate::store::CertificateMap;
use anyhow::{Context, Result};
use kube::{api::Api, api::ListParams, Client};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

/// Initialization result containing all necessary components for the watch loop
#[allow(
    missing_debug_implementations,
    reason = "Api and the reconciler context are not meaningfully printable"
)]
pub struct InitializationResult {
    /// API for KeyManagementSystem CRD, all namespaces
    pub resources: Api<KeyManagementSystem>,
    /// Reconciler context
    pub reconciler: Arc<Reconciler>,
    /// Cancelled on SIGINT
    pub shutdown: CancellationToken,
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Provider registries and the shared cache
/// - Kubernetes client creation
/// - Reconciler setup
///
/// Existing resources are reconciled by the watch loop's initial list.
#[allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    reason = "Startup failures are fatal and reported by main"
)]
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before any TLS connection is made
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "key_management_controller=info".into()),
        )
        .init();

    info!(
        "Starting Key Management Controller v{}",
        env!("CARGO_PKG_VERSION")
    );

    let (controller_config, server_config) = config::load_config();
    info!(?controller_config, ?server_config, "Configuration loaded");

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_handle = {
        let server_state = Arc::clone(&server_state);
        let port = server_config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_server(port, server_state).await {
                error!("HTTP server error: {}", e);
            }
        })
    };

    // Probes must pass before reconciliation starts
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    // Shared by every provider, so access tokens outlive a single cycle
    let cache = cache::global().get_or_init(controller_config.cache_config());

    let kms_registry =
        provider::kms_registry(cache).context("Failed to build provider registry")?;
    info!(
        providers = ?kms_registry.registered_names(),
        "Key management system providers registered"
    );

    let auth_registry = auth::auth_registry().context("Failed to build auth registry")?;
    // Fails startup on a broken default configuration
    let auth_provider: Box<dyn AuthProvider> = auth_registry
        .create_from_config(
            None,
            &controller_config.config_version,
            &controller_config.plugin_directory,
        )
        .context("Failed to create default auth provider")?;
    info!(
        providers = ?auth_registry.registered_names(),
        enabled = auth_provider.enabled(),
        "Auth providers registered"
    );

    let client = Client::try_default().await?;
    let resources: Api<KeyManagementSystem> = Api::all(client.clone());

    let reconciler = Arc::new(Reconciler::new(
        Arc::new(KubeOrchestrator::new(client.clone())),
        Arc::new(kms_registry),
        Arc::new(CertificateMap::new()),
        controller_config,
    ));

    log_existing_resources(&resources)
        .instrument(info_span!("controller.startup.existing_resources"))
        .await;

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        resources,
        reconciler,
        shutdown,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &ServerState,
    server_handle: &tokio::task::JoinHandle<()>,
    config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(config.startup_timeout_secs);
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Log a startup summary of existing resources
///
/// A failed list only warns: the watch loop retries on its own.
async fn log_existing_resources(resources: &Api<KeyManagementSystem>) {
    let list = match resources.list(&ListParams::default()).await {
        Ok(list) => list,
        Err(e) => {
            error!("CRD is not queryable; {:?}. Is the CRD installed?", e);
            error!("Installation: crdgen | kubectl apply -f -");
            warn!("Continuing despite CRD queryability check failure - watch will retry");
            return;
        }
    };

    if list.items.is_empty() {
        info!("No existing KeyManagementSystem resources found, watch will pick up new resources");
        return;
    }

    let mut by_namespace: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for item in &list.items {
        by_namespace
            .entry(item.metadata.namespace.as_deref().unwrap_or("default"))
            .or_default()
            .push(item.metadata.name.as_deref().unwrap_or("unknown"));
    }

    info!(
        "Found {} existing KeyManagementSystem resources in {} namespaces",
        list.items.len(),
        by_namespace.len()
    );
    for (namespace, names) in &mut by_namespace {
        names.sort_unstable();
        let shown = if names.len() <= 3 {
            names.join(", ")
        } else {
            format!("{}, ... ({} total)", names[..3].join(", "), names.len())
        };
        info!("  {}: {}", namespace, shown);
    }
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });
}
