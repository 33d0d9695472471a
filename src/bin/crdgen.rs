//! Prints the controller's CustomResourceDefinitions as a multi-document YAML stream.
//!
//! ```bash
//! crdgen | kubectl apply -f -
//! ```

use anyhow::Result;
use key_management_controller::{CertificateStore, KeyManagementSystem};
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let documents = [
        serde_yaml::to_string(&KeyManagementSystem::crd())?,
        serde_yaml::to_string(&CertificateStore::crd())?,
    ];
    print!("{}", documents.join("---\n"));
    Ok(())
}
