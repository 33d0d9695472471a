//! # Key Management Controller
//!
//! A Kubernetes controller that fetches trust material (certificates) from key
//! management systems and publishes it to a process-wide certificate store.
//!
//! ## Overview
//!
//! 1. **Watching resources** - Monitors `KeyManagementSystem` resources in all namespaces
//! 2. **Resolving providers** - Looks up the declared `type` in the provider registry
//! 3. **Fetching certificates** - Inline PEM or Azure Key Vault
//! 4. **Publishing** - Stores the chain under `namespace/name` and reports status
//!
//! `CertificateStore` resources are mutually exclusive with `KeyManagementSystem`:
//! while any exist, every fetch is refused with a conflict status.
//!
//! ## Usage
//!
//! See the [README.md](../README.md) for detailed usage instructions and examples.

use anyhow::Result;
use key_management_controller::runtime::initialization::initialize;
use key_management_controller::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;

    run_watch_loop(
        init_result.resources,
        init_result.reconciler,
        init_result.shutdown,
    )
    .await?;

    Ok(())
}
