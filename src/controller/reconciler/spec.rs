//! # Spec Resolution
//!
//! Turns a `KeyManagementSystem` spec into a provider instance.

use super::ReconcilerError;
use crate::config::ControllerConfig;
use crate::crd::KeyManagementSystemSpec;
use crate::provider::{KeyManagementSystemProvider, KmsRegistry};
use crate::registry::{ProviderConfig, TYPE_KEY};
use serde_json::Value;

/// Convert the opaque parameters into registry configuration
///
/// The resource's `type` is injected as the registry discriminator, replacing
/// any `type` key inside the parameters.
///
/// # Errors
///
/// Returns [`ReconcilerError::InvalidConfig`] when the parameters are absent
/// or are not a JSON object.
pub fn parameters_to_config(
    parameters: Option<&Value>,
    kms_type: &str,
) -> Result<ProviderConfig, ReconcilerError> {
    let mut config = match parameters {
        None | Some(Value::Null) => {
            return Err(ReconcilerError::InvalidConfig(
                "no key management system parameters provided".to_string(),
            ))
        }
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return Err(ReconcilerError::InvalidConfig(format!(
                "unable to decode key management system parameters: expected an object, got {other}"
            )))
        }
    };

    config.insert(TYPE_KEY.to_string(), Value::String(kms_type.to_string()));
    Ok(config)
}

/// Build the provider declared by a spec
///
/// # Errors
///
/// Returns [`ReconcilerError::InvalidConfig`] for unusable parameters and
/// [`ReconcilerError::ProviderCreation`] when the registry rejects the config.
pub fn spec_to_provider(
    registry: &KmsRegistry,
    spec: &KeyManagementSystemSpec,
    config: &ControllerConfig,
) -> Result<Box<dyn KeyManagementSystemProvider>, ReconcilerError> {
    let provider_config = parameters_to_config(spec.parameters.as_ref(), &spec.r#type)?;
    registry
        .create_from_config(
            Some(&provider_config),
            &config.config_version,
            &config.plugin_directory,
        )
        .map_err(ReconcilerError::ProviderCreation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_is_injected() {
        let parameters = json!({"contentType": "certificate", "value": "pem"});
        let config = parameters_to_config(Some(&parameters), "inline").unwrap();
        assert_eq!(config[TYPE_KEY], "inline");
        assert_eq!(config["contentType"], "certificate");
    }

    #[test]
    fn test_declared_type_overrides_parameters() {
        let parameters = json!({"type": "azurekeyvault"});
        let config = parameters_to_config(Some(&parameters), "inline").unwrap();
        assert_eq!(config[TYPE_KEY], "inline");
    }

    #[test]
    fn test_missing_parameters() {
        let err = parameters_to_config(None, "inline").unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to parse key management system config: no key management system parameters provided"
        );
    }

    #[test]
    fn test_non_object_parameters() {
        let err = parameters_to_config(Some(&json!(["a"])), "inline").unwrap_err();
        assert!(err.to_string().contains("unable to decode key management system parameters"));
    }

    fn test_registry() -> crate::provider::KmsRegistry {
        let cache = crate::cache::MemoryCache::new(&crate::cache::CacheConfig::default());
        crate::provider::kms_registry(std::sync::Arc::new(cache)).unwrap()
    }

    #[test]
    fn test_unregistered_type() {
        let registry = test_registry();
        let spec = KeyManagementSystemSpec {
            r#type: "hsm".to_string(),
            parameters: Some(json!({})),
        };
        let err = spec_to_provider(&registry, &spec, &ControllerConfig::default()).unwrap_err();
        assert!(err
            .to_string()
            .contains("key management system factory with name hsm not found"));
    }

    #[test]
    fn test_empty_type() {
        let registry = test_registry();
        let spec = KeyManagementSystemSpec {
            r#type: String::new(),
            parameters: Some(json!({})),
        };
        let err = spec_to_provider(&registry, &spec, &ControllerConfig::default()).unwrap_err();
        assert!(matches!(err, ReconcilerError::ProviderCreation(_)));
    }
}
