//! Credentials from a Docker `config.json`.

use super::{AuthConfig, AuthProvider};
use crate::provider::{ComponentType, ProviderError};
use crate::registry::{ProviderConfig, ProviderFactory};
use async_trait::async_trait;
use base64::prelude::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Registration name of the docker config provider
pub const PROVIDER_NAME: &str = "dockerConfig";

const DOCKER_HUB_KEY: &str = "https://index.docker.io/v1/";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerConfigParameters {
    #[serde(default)]
    config_path: Option<PathBuf>,
}

#[derive(Default, Deserialize)]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, DockerAuthEntry>,
}

#[derive(Clone, Default, Deserialize)]
struct DockerAuthEntry {
    #[serde(default)]
    auth: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default, rename = "identitytoken")]
    identity_token: String,
}

/// Provider backed by a docker config file
///
/// Disabled (but constructible) when the file does not exist.
#[derive(Debug)]
pub struct DockerConfigAuthProvider {
    path: PathBuf,
    entries: Option<HashMap<String, AuthConfig>>,
}

impl DockerConfigAuthProvider {
    /// Load credentials from `path`
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::ConfigInvalid`] if the file exists but cannot
    /// be read or decoded.
    pub fn load(path: PathBuf) -> Result<Self, ProviderError> {
        let component = ComponentType::AuthProvider;
        if !path.exists() {
            info!(path = %path.display(), "Docker config not found, auth provider disabled");
            return Ok(Self {
                path,
                entries: None,
            });
        }

        let contents = Zeroizing::new(std::fs::read_to_string(&path).map_err(|e| {
            ProviderError::config_invalid(
                component,
                format!("failed to read docker config {}: {e}", path.display()),
            )
        })?);
        let file: DockerConfigFile = serde_json::from_str(&contents).map_err(|e| {
            ProviderError::config_invalid(
                component,
                format!("failed to parse docker config {}: {e}", path.display()),
            )
        })?;

        let mut entries = HashMap::with_capacity(file.auths.len());
        for (host, entry) in file.auths {
            let credentials = decode_entry(&host, &entry)?;
            entries.insert(normalize_host(&host), credentials);
        }
        debug!(path = %path.display(), hosts = entries.len(), "Loaded docker config");

        Ok(Self {
            path,
            entries: Some(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn decode_entry(host: &str, entry: &DockerAuthEntry) -> Result<AuthConfig, ProviderError> {
    let (username, password) = if entry.auth.is_empty() {
        (entry.username.clone(), entry.password.clone())
    } else {
        let decoded = Zeroizing::new(BASE64_STANDARD.decode(entry.auth.trim()).map_err(|e| {
            ProviderError::config_invalid(
                ComponentType::AuthProvider,
                format!("failed to decode auth entry for {host}: {e}"),
            )
        })?);
        let decoded = std::str::from_utf8(&decoded).map_err(|e| {
            ProviderError::config_invalid(
                ComponentType::AuthProvider,
                format!("auth entry for {host} is not valid UTF-8: {e}"),
            )
        })?;
        let (username, password) = decoded.split_once(':').ok_or_else(|| {
            ProviderError::config_invalid(
                ComponentType::AuthProvider,
                format!("auth entry for {host} is not in user:password form"),
            )
        })?;
        (username.to_string(), password.to_string())
    };

    Ok(AuthConfig {
        username,
        password,
        identity_token: entry.identity_token.clone(),
        expires_on: None,
    })
}

/// Reduce `https://host/v1/` style keys to the bare host
fn normalize_host(key: &str) -> String {
    if key == DOCKER_HUB_KEY {
        return "docker.io".to_string();
    }
    let without_scheme = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}

/// Default location: `$DOCKER_CONFIG/config.json`, then `$HOME/.docker/config.json`
fn default_config_path() -> PathBuf {
    if let Some(dir) = std::env::var_os("DOCKER_CONFIG") {
        return PathBuf::from(dir).join("config.json");
    }
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("/root"), PathBuf::from);
    home.join(".docker").join("config.json")
}

#[async_trait]
impl AuthProvider for DockerConfigAuthProvider {
    fn enabled(&self) -> bool {
        self.entries.is_some()
    }

    async fn provide(&self, host: &str) -> Result<AuthConfig, ProviderError> {
        let entries = self.entries.as_ref().ok_or_else(|| {
            ProviderError::fetch(
                ComponentType::AuthProvider,
                format!("docker config {} not found", self.path.display()),
            )
        })?;

        entries
            .get(&normalize_host(host))
            .cloned()
            .ok_or_else(|| {
                ProviderError::fetch(
                    ComponentType::AuthProvider,
                    format!("no credentials found for {host}"),
                )
            })
    }
}

/// Factory registered as `dockerConfig`
#[derive(Debug, Default)]
pub struct DockerConfigAuthFactory;

impl ProviderFactory<dyn AuthProvider> for DockerConfigAuthFactory {
    fn create(
        &self,
        _version: &str,
        config: &ProviderConfig,
        _plugin_directory: &Path,
    ) -> Result<Box<dyn AuthProvider>, ProviderError> {
        let parameters: DockerConfigParameters =
            serde_json::from_value(serde_json::Value::Object(config.clone())).map_err(|e| {
                ProviderError::config_invalid(
                    ComponentType::AuthProvider,
                    format!("failed to parse config: {e}"),
                )
            })?;

        let path = parameters.config_path.unwrap_or_else(default_config_path);
        Ok(Box::new(DockerConfigAuthProvider::load(path)?))
    }
}
