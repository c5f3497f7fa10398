use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use url::Url;

use maestro_sdk::auth::session::{CODE_VERIFIER_KEY, STATE_KEY};
use maestro_sdk::storage::BACKUP_SUFFIX;
use maestro_sdk::{
    Config, Error, HostBindings, InMemoryHost, InMemoryTransport, InteractiveHost, Maestro,
    MemoryBackend, Method, RequestSpec, SessionState, StorageBackend, TransportResponse,
    code_challenge,
};

const TOKEN_URL: &str = "https://cloud.local/identity_/connect/token";

fn secret_config() -> Config {
    Config {
        base_url: "https://cloud.local".into(),
        org_name: "org-a".into(),
        tenant_name: "tenant-b".into(),
        secret: Some("abc".into()),
        ..Config::default()
    }
}

fn pkce_config() -> Config {
    Config {
        base_url: "https://cloud.local".into(),
        org_name: "org-a".into(),
        tenant_name: "tenant-b".into(),
        client_id: Some("client-1".into()),
        redirect_uri: Some("https://app.local/callback".into()),
        ..Config::default()
    }
}

fn token_response(access_token: &str) -> TransportResponse {
    TransportResponse {
        status: 200,
        headers: vec![],
        body: serde_json::to_vec(&json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": 3600
        }))
        .unwrap(),
    }
}

struct Session {
    maestro: Maestro,
    host: Arc<InMemoryHost>,
    primary: Arc<MemoryBackend>,
    backup: Arc<MemoryBackend>,
    transport: Arc<InMemoryTransport>,
}

fn interactive_session(config: Config, location: &str) -> Session {
    let host = Arc::new(InMemoryHost::new(Url::parse(location).unwrap()));
    let primary = Arc::new(MemoryBackend::new());
    let backup = Arc::new(MemoryBackend::new());
    let transport = Arc::new(InMemoryTransport::new());
    let maestro = Maestro::with_transport(
        config,
        Some(HostBindings {
            host: host.clone(),
            primary: primary.clone(),
            backup: backup.clone(),
        }),
        transport.clone(),
    )
    .unwrap();
    Session {
        maestro,
        host,
        primary,
        backup,
        transport,
    }
}

fn header(request: &maestro_sdk::TransportRequest, name: &str) -> Option<String> {
    request
        .headers
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.clone())
}

#[tokio::test]
async fn test_secret_mode_is_ready_without_network() {
    let transport = Arc::new(InMemoryTransport::new());
    let maestro = Maestro::with_transport(secret_config(), None, transport.clone()).unwrap();

    let state = maestro.initialize().await.unwrap();
    assert_eq!(state, SessionState::Ready);
    assert!(transport.requests().is_empty());
    // The secret stays a request-time fallback; no token is minted.
    assert_eq!(maestro.context().token(), None);
}

#[tokio::test]
async fn test_initialize_is_reentrant_once_ready() {
    let transport = Arc::new(InMemoryTransport::new());
    let maestro = Maestro::with_transport(secret_config(), None, transport.clone()).unwrap();

    assert_eq!(maestro.initialize().await.unwrap(), SessionState::Ready);
    assert_eq!(maestro.initialize().await.unwrap(), SessionState::Ready);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_invalid_config_fails_closed() {
    let mut config = secret_config();
    config.org_name = String::new();
    assert!(matches!(Maestro::new(config), Err(Error::Config(_))));

    let mut config = pkce_config();
    config.redirect_uri = None;
    assert!(matches!(Maestro::new(config), Err(Error::Config(_))));

    let config = Config {
        base_url: "https://cloud.local".into(),
        org_name: "org-a".into(),
        tenant_name: "tenant-b".into(),
        ..Config::default()
    };
    assert!(matches!(Maestro::new(config), Err(Error::Config(_))));
}

#[tokio::test]
async fn test_flow_start_persists_state_and_redirects() {
    let session = interactive_session(pkce_config(), "https://app.local/dashboard");

    let state = session.maestro.initialize().await.unwrap();
    let authorize_url = match state {
        SessionState::RedirectIssued { authorize_url } => authorize_url,
        other => panic!("expected redirect, got {other:?}"),
    };
    assert!(authorize_url.starts_with("https://cloud.local/identity_/connect/authorize?"));

    let parsed = Url::parse(&authorize_url).unwrap();
    let query: HashMap<String, String> = parsed.query_pairs().into_owned().collect();
    assert_eq!(query["response_type"], "code");
    assert_eq!(query["client_id"], "client-1");
    assert_eq!(query["redirect_uri"], "https://app.local/callback");
    assert_eq!(query["code_challenge_method"], "S256");

    let verifier = session.primary.get(CODE_VERIFIER_KEY).await.unwrap().unwrap();
    assert_eq!(query["code_challenge"], code_challenge(&verifier));
    assert_eq!(
        session.primary.get(STATE_KEY).await.unwrap().as_deref(),
        Some(query["state"].as_str())
    );
    // Both values were mirrored into the backup store.
    let backup_state = session
        .backup
        .get(&format!("{STATE_KEY}{BACKUP_SUFFIX}"))
        .await
        .unwrap();
    assert_eq!(backup_state.as_deref(), Some(query["state"].as_str()));

    assert_eq!(session.host.redirects(), vec![authorize_url]);
    assert!(session.transport.requests().is_empty());
}

#[tokio::test]
async fn test_callback_exchanges_code_and_becomes_ready() {
    let session = interactive_session(pkce_config(), "https://app.local/dashboard");

    session.maestro.initialize().await.unwrap();
    let verifier = session.primary.get(CODE_VERIFIER_KEY).await.unwrap().unwrap();
    let state_token = session.primary.get(STATE_KEY).await.unwrap().unwrap();

    session.host.set_location(
        Url::parse(&format!(
            "https://app.local/callback?code=CODE123&state={state_token}&tab=2#section"
        ))
        .unwrap(),
    );
    session.transport.insert_response(TOKEN_URL, token_response("T"));

    let state = session.maestro.initialize().await.unwrap();
    assert_eq!(state, SessionState::Ready);
    assert_eq!(session.maestro.context().token().as_deref(), Some("T"));

    // One exchange request, carrying the persisted verifier.
    let requests = session.transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::Post);
    assert_eq!(requests[0].url, TOKEN_URL);
    assert_eq!(
        header(&requests[0], "Content-Type").as_deref(),
        Some("application/x-www-form-urlencoded")
    );
    let body = String::from_utf8(requests[0].body.clone().unwrap()).unwrap();
    assert!(body.contains("grant_type=authorization_code"));
    assert!(body.contains("code=CODE123"));
    assert!(body.contains(&format!("code_verifier={verifier}")));

    // The stored triple is gone from both backends.
    assert_eq!(session.primary.get(CODE_VERIFIER_KEY).await.unwrap(), None);
    assert_eq!(session.primary.get(STATE_KEY).await.unwrap(), None);
    let backup_state = session
        .backup
        .get(&format!("{STATE_KEY}{BACKUP_SUFFIX}"))
        .await
        .unwrap();
    assert_eq!(backup_state, None);

    // code and state were stripped; the rest of the location survives.
    assert_eq!(
        session.host.location().as_str(),
        "https://app.local/callback?tab=2#section"
    );
}

#[tokio::test]
async fn test_next_request_carries_exchanged_token() {
    let session = interactive_session(pkce_config(), "https://app.local/dashboard");

    session.maestro.initialize().await.unwrap();
    let state_token = session.primary.get(STATE_KEY).await.unwrap().unwrap();
    session.host.set_location(
        Url::parse(&format!("https://app.local/callback?code=C&state={state_token}")).unwrap(),
    );
    session.transport.insert_response(TOKEN_URL, token_response("T"));
    session.maestro.initialize().await.unwrap();

    session.transport.insert_response(
        "https://cloud.local/org-a/tenant-b/odata/Jobs",
        TransportResponse {
            status: 200,
            headers: vec![],
            body: b"{}".to_vec(),
        },
    );
    session
        .maestro
        .api()
        .get("odata/Jobs", RequestSpec::new())
        .await
        .unwrap();

    let requests = session.transport.requests();
    let api_request = requests.last().unwrap();
    assert_eq!(header(api_request, "Authorization").as_deref(), Some("Bearer T"));
}

#[tokio::test]
async fn test_callback_survives_cleared_primary_store() {
    let session = interactive_session(pkce_config(), "https://app.local/dashboard");

    session.maestro.initialize().await.unwrap();
    let state_token = session.primary.get(STATE_KEY).await.unwrap().unwrap();

    // The session-scoped store was wiped across the redirect; only the
    // backup retains the flow state.
    session.primary.remove(CODE_VERIFIER_KEY).await.unwrap();
    session.primary.remove(STATE_KEY).await.unwrap();

    session.host.set_location(
        Url::parse(&format!("https://app.local/callback?code=C&state={state_token}")).unwrap(),
    );
    session.transport.insert_response(TOKEN_URL, token_response("T"));

    let state = session.maestro.initialize().await.unwrap();
    assert_eq!(state, SessionState::Ready);
    assert_eq!(session.maestro.context().token().as_deref(), Some("T"));
}

#[tokio::test]
async fn test_state_mismatch_restarts_flow_without_exchange() {
    let session = interactive_session(
        pkce_config(),
        "https://app.local/callback?code=C&state=returned-state",
    );
    session.primary.set(STATE_KEY, "stored-state").await.unwrap();
    session.primary.set(CODE_VERIFIER_KEY, "stored-verifier").await.unwrap();

    let state = session.maestro.initialize().await.unwrap();
    assert!(matches!(state, SessionState::RedirectIssued { .. }));

    // No token exchange happened; a fresh attempt was persisted instead.
    assert!(session.transport.requests().is_empty());
    let new_state = session.primary.get(STATE_KEY).await.unwrap().unwrap();
    assert_ne!(new_state, "stored-state");
    let new_verifier = session.primary.get(CODE_VERIFIER_KEY).await.unwrap().unwrap();
    assert_ne!(new_verifier, "stored-verifier");
    assert_eq!(session.host.redirects().len(), 1);
}

#[tokio::test]
async fn test_lost_state_restarts_flow_exactly_once() {
    let session = interactive_session(
        pkce_config(),
        "https://app.local/callback?code=C&state=returned-state",
    );

    let state = session.maestro.initialize().await.unwrap();
    assert!(matches!(state, SessionState::RedirectIssued { .. }));

    // Exactly one restart: one redirect, no exchange attempts.
    assert_eq!(session.host.redirects().len(), 1);
    assert!(session.transport.requests().is_empty());
}

#[tokio::test]
async fn test_exchange_failure_is_fatal_and_clears_state() {
    let session = interactive_session(pkce_config(), "https://app.local/dashboard");

    session.maestro.initialize().await.unwrap();
    let state_token = session.primary.get(STATE_KEY).await.unwrap().unwrap();
    session.host.set_location(
        Url::parse(&format!("https://app.local/callback?code=BAD&state={state_token}")).unwrap(),
    );
    session.transport.insert_response(
        TOKEN_URL,
        TransportResponse {
            status: 400,
            headers: vec![],
            body: serde_json::to_vec(&json!({
                "error": "invalid_grant",
                "error_description": "The provided authorization code is invalid or expired."
            }))
            .unwrap(),
        },
    );

    let err = session.maestro.initialize().await.unwrap_err();
    match err {
        Error::TokenExchange(message) => {
            assert!(message.contains("invalid or expired"), "{message}");
        }
        other => panic!("expected token exchange failure, got {other:?}"),
    }

    // The triple never outlives a verified exchange.
    assert_eq!(session.primary.get(CODE_VERIFIER_KEY).await.unwrap(), None);
    assert_eq!(session.primary.get(STATE_KEY).await.unwrap(), None);
    assert_eq!(session.maestro.context().token(), None);
}

#[tokio::test]
async fn test_non_interactive_host_exposes_authorization_url() {
    let transport = Arc::new(InMemoryTransport::new());
    let maestro = Maestro::with_transport(pkce_config(), None, transport.clone()).unwrap();

    let state = maestro.initialize().await.unwrap();
    let authorize_url = match state {
        SessionState::AuthorizationRequired { authorize_url } => authorize_url,
        other => panic!("expected authorization-required, got {other:?}"),
    };
    assert!(authorize_url.starts_with("https://cloud.local/identity_/connect/authorize?"));
    assert!(authorize_url.contains("code_challenge="));
    assert!(transport.requests().is_empty());
}

/// Accepts writes but never retains them, like a storage area that is
/// present but disabled.
struct DroppingBackend;

#[async_trait]
impl StorageBackend for DroppingBackend {
    async fn set(&self, _key: &str, _value: &str) -> Result<(), Error> {
        Ok(())
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, Error> {
        Ok(None)
    }

    async fn remove(&self, _key: &str) -> Result<(), Error> {
        Ok(())
    }
}

#[tokio::test]
async fn test_unverifiable_write_fails_before_redirect() {
    let host = Arc::new(InMemoryHost::new(
        Url::parse("https://app.local/dashboard").unwrap(),
    ));
    let transport = Arc::new(InMemoryTransport::new());
    let maestro = Maestro::with_transport(
        pkce_config(),
        Some(HostBindings {
            host: host.clone(),
            primary: Arc::new(DroppingBackend),
            backup: Arc::new(DroppingBackend),
        }),
        transport,
    )
    .unwrap();

    let err = maestro.initialize().await.unwrap_err();
    assert!(matches!(err, Error::StorageUnavailable(_)));
    // Never redirect with unpersisted state.
    assert!(host.redirects().is_empty());
}
