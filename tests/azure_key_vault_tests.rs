//! # Azure Key Vault Provider Tests
//!
//! Fetches against a local Axum mock of the Key Vault certificates API.
//!
//! These tests verify:
//! - Bearer authentication and RESTful paths with the api-version query parameter
//! - Pinned and latest versions, reported in provider status
//! - Missing, disabled and unauthorized certificates fail the fetch
//! - Workload identity tokens are exchanged once and shared across providers

use axum::{
    extract::{Form, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use base64::prelude::*;
use key_management_controller::cache::{CacheConfig, CacheProvider, MemoryCache};
use key_management_controller::provider::azure::{
    AzureKeyVaultConfig, AzureKeyVaultProvider, StaticTokenCredential, TokenCredential,
    WorkloadIdentityCredential,
};
use key_management_controller::provider::{KeyManagementSystemProvider, ProviderError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const TOKEN: &str = "test-access-token";
const TENANT_ID: &str = "00000000-0000-0000-0000-000000000000";
const CLIENT_ID: &str = "11111111-1111-1111-1111-111111111111";
const FEDERATED_TOKEN: &str = "projected-service-account-token";

#[derive(Clone)]
struct VaultState {
    base_url: String,
    /// name -> (latest version, DER, enabled)
    certificates: Arc<HashMap<String, (String, Vec<u8>, bool)>>,
    token_requests: Arc<AtomicUsize>,
}

struct MockVault {
    base_url: String,
    token_requests: Arc<AtomicUsize>,
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({"error": {"code": code, "message": message}})),
    )
        .into_response()
}

fn authorize(headers: &HeaderMap, query: &HashMap<String, String>) -> Option<Response> {
    let expected = format!("Bearer {TOKEN}");
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some(expected.as_str()) {
        return Some(error_response(StatusCode::UNAUTHORIZED, "Unauthorized", "invalid token"));
    }
    if query.get("api-version").map(String::as_str) != Some("7.4") {
        return Some(error_response(StatusCode::BAD_REQUEST, "BadParameter", "api-version"));
    }
    None
}

fn bundle(state: &VaultState, name: &str, version: Option<&str>) -> Response {
    let Some((latest, der, enabled)) = state.certificates.get(name) else {
        return error_response(
            StatusCode::NOT_FOUND,
            "CertificateNotFound",
            &format!("A certificate with (name/id) {name} was not found in this key vault"),
        );
    };
    let version = version.unwrap_or(latest);
    Json(json!({
        "id": format!("{}/certificates/{name}/{version}", state.base_url),
        "cer": BASE64_STANDARD.encode(der),
        "attributes": {"enabled": enabled}
    }))
    .into_response()
}

/// GET certificate, path: /certificates/{name}/{version}
async fn get_certificate_version(
    State(state): State<VaultState>,
    Path((name, version)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Some(rejection) = authorize(&headers, &query) {
        return rejection;
    }
    bundle(&state, &name, Some(&version))
}

/// GET latest certificate, path: /certificates/{name}/ (with trailing slash)
async fn get_certificate_latest(
    State(state): State<VaultState>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Some(rejection) = authorize(&headers, &query) {
        return rejection;
    }
    bundle(&state, &name, None)
}

/// POST token exchange, path: /{tenant}/oauth2/v2.0/token
async fn issue_token(
    State(state): State<VaultState>,
    Path(tenant): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.token_requests.fetch_add(1, Ordering::SeqCst);
    let expected = [
        ("client_id", CLIENT_ID),
        ("grant_type", "client_credentials"),
        ("scope", "https://vault.azure.net/.default"),
        ("client_assertion", FEDERATED_TOKEN),
    ];
    if tenant != TENANT_ID
        || expected
            .iter()
            .any(|(field, value)| form.get(*field).map(String::as_str) != Some(*value))
    {
        return error_response(StatusCode::UNAUTHORIZED, "invalid_client", "assertion rejected");
    }
    Json(json!({
        "token_type": "Bearer",
        "expires_in": 3600,
        "access_token": TOKEN
    }))
    .into_response()
}

fn der_of(name: &str) -> Vec<u8> {
    rcgen::generate_simple_self_signed(vec![name.to_string()])
        .unwrap()
        .cert
        .der()
        .to_vec()
}

/// Start the mock vault, which also serves the token endpoint
async fn start_vault(certificates: HashMap<String, (String, Vec<u8>, bool)>) -> MockVault {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let token_requests = Arc::new(AtomicUsize::new(0));
    let state = VaultState {
        base_url: base_url.clone(),
        certificates: Arc::new(certificates),
        token_requests: Arc::clone(&token_requests),
    };
    let app = Router::new()
        .route("/certificates/{name}/{version}", get(get_certificate_version))
        .route("/certificates/{name}/", get(get_certificate_latest))
        .route("/{tenant}/oauth2/v2.0/token", post(issue_token))
        .with_state(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    MockVault {
        base_url,
        token_requests,
    }
}

fn federated_token_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn parse_config(vault_uri: &str, certificates: Value) -> AzureKeyVaultConfig {
    let parameters = json!({
        "vaultURI": vault_uri,
        "tenantID": TENANT_ID,
        "clientID": CLIENT_ID,
        "certificates": certificates,
    });
    AzureKeyVaultConfig::from_provider_config(parameters.as_object().unwrap()).unwrap()
}

fn provider(vault_uri: &str, certificates: Value, token: &str) -> AzureKeyVaultProvider {
    AzureKeyVaultProvider::with_credential(
        parse_config(vault_uri, certificates),
        Arc::new(StaticTokenCredential::new(token)),
    )
    .unwrap()
}

fn workload_identity(
    vault: &MockVault,
    token_file: &tempfile::NamedTempFile,
    tokens: &Arc<dyn CacheProvider>,
) -> WorkloadIdentityCredential {
    WorkloadIdentityCredential::new(
        TENANT_ID,
        CLIENT_ID,
        vault.base_url.as_str(),
        Some(token_file.path().to_path_buf()),
        Arc::clone(tokens),
    )
}

#[tokio::test]
async fn test_fetches_pinned_and_latest_versions() {
    let signer = der_of("signer.example.com");
    let root = der_of("root.example.com");
    let vault = start_vault(HashMap::from([
        ("signer".to_string(), ("v3".to_string(), signer.clone(), true)),
        ("root".to_string(), ("r9".to_string(), root.clone(), true)),
    ]))
    .await;

    let provider = provider(
        &vault.base_url,
        json!([{"name": "signer", "version": "v1"}, {"name": "root"}]),
        TOKEN,
    );
    let fetched = provider
        .fetch_certificates(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(fetched.certificates.len(), 2);
    assert_eq!(fetched.certificates[0].der(), signer.as_slice());
    assert_eq!(fetched.certificates[1].der(), root.as_slice());

    let status = fetched.status.expect("provider status");
    let reported = status["certificates"].as_array().unwrap();
    assert_eq!(reported.len(), 2);
    assert_eq!(reported[0]["name"], "signer");
    assert_eq!(reported[0]["version"], "v1");
    assert_eq!(reported[1]["name"], "root");
    assert_eq!(reported[1]["version"], "r9");
    assert!(reported[0]["lastRefreshed"].is_string());
}

#[tokio::test]
async fn test_missing_certificate_fails_fetch() {
    let vault = start_vault(HashMap::new()).await;
    let provider = provider(&vault.base_url, json!([{"name": "missing"}]), TOKEN);

    let err = provider
        .fetch_certificates(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Fetch { .. }));
    assert!(err.to_string().contains("404"));
    assert!(err.to_string().contains("missing"));
}

#[tokio::test]
async fn test_disabled_certificate_fails_fetch() {
    let vault = start_vault(HashMap::from([(
        "retired".to_string(),
        ("v1".to_string(), der_of("retired.example.com"), false),
    )]))
    .await;
    let provider = provider(&vault.base_url, json!([{"name": "retired"}]), TOKEN);

    let err = provider
        .fetch_certificates(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("certificate retired is disabled"));
}

#[tokio::test]
async fn test_rejected_token_fails_fetch() {
    let vault = start_vault(HashMap::from([(
        "signer".to_string(),
        ("v1".to_string(), der_of("signer.example.com"), true),
    )]))
    .await;
    let provider = provider(&vault.base_url, json!([{"name": "signer"}]), "wrong-token");

    let err = provider
        .fetch_certificates(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_one_failure_fails_whole_fetch() {
    let vault = start_vault(HashMap::from([(
        "signer".to_string(),
        ("v1".to_string(), der_of("signer.example.com"), true),
    )]))
    .await;
    let provider = provider(
        &vault.base_url,
        json!([{"name": "signer"}, {"name": "missing"}]),
        TOKEN,
    );

    let err = provider
        .fetch_certificates(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("missing"));
}

#[tokio::test]
async fn test_token_is_exchanged_once_across_cycles() {
    let vault = start_vault(HashMap::from([(
        "signer".to_string(),
        ("v1".to_string(), der_of("signer.example.com"), true),
    )]))
    .await;
    let token_file = federated_token_file(FEDERATED_TOKEN);
    let tokens: Arc<dyn CacheProvider> = Arc::new(MemoryCache::new(&CacheConfig::default()));

    // A fresh provider and credential per cycle, as the registry builds them
    for _ in 0..3 {
        let provider = AzureKeyVaultProvider::with_credential(
            parse_config(&vault.base_url, json!([{"name": "signer"}])),
            Arc::new(workload_identity(&vault, &token_file, &tokens)),
        )
        .unwrap();
        let fetched = provider
            .fetch_certificates(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fetched.certificates.len(), 1);
    }

    assert_eq!(vault.token_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rejected_federated_token_is_not_cached() {
    let vault = start_vault(HashMap::new()).await;
    let token_file = federated_token_file("not-the-projected-token");
    let tokens: Arc<dyn CacheProvider> = Arc::new(MemoryCache::new(&CacheConfig::default()));
    let http = reqwest::Client::new();

    for _ in 0..2 {
        let err = workload_identity(&vault, &token_file, &tokens)
            .get_token(&http)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Fetch { .. }));
        assert!(err.to_string().contains("401"));
    }

    assert_eq!(vault.token_requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_separate_caches_do_not_share_tokens() {
    let vault = start_vault(HashMap::new()).await;
    let token_file = federated_token_file(FEDERATED_TOKEN);
    let http = reqwest::Client::new();

    for _ in 0..2 {
        let tokens: Arc<dyn CacheProvider> =
            Arc::new(MemoryCache::new(&CacheConfig::default()));
        let token = workload_identity(&vault, &token_file, &tokens)
            .get_token(&http)
            .await
            .unwrap();
        assert_eq!(token.secret(), TOKEN);
    }

    assert_eq!(vault.token_requests.load(Ordering::SeqCst), 2);
}
