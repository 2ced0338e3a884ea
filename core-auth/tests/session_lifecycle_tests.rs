//! Integration tests for the sign-in and session lifecycle
//!
//! These tests drive `AuthManager` and its components through the public API
//! against in-memory bridges:
//! - Authorization Code + PKCE sign-in and the token request it produces
//! - Session restore across manager instances
//! - Expiry-aware credential reads and refresh-token rotation
//! - Single-flight refresh and reject-fast sign-in

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    AuthorizationPresenter, Clock, HttpClient, HttpRequest, HttpResponse, RedirectResult,
    SecureStore,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_auth::{
    AuthError, AuthManager, CredentialStore, FlowOutcome, PkceVerifier, SessionState,
    TokenExchangeClient, TokenSet,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use url::Url;

const T0: i64 = 1_700_000_000_000;
const TOKEN_URL: &str = "https://accounts.test/api/token";
const PROFILE_URL: &str = "https://api.test/v1/me";

struct TestClock(AtomicI64);

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.unix_timestamp_millis()).unwrap()
    }

    fn unix_timestamp_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct InMemoryStore {
    secrets: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl SecureStore for InMemoryStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
        self.secrets
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
        Ok(self.secrets.lock().unwrap().get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
        self.secrets.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Fixed responses per URL, with every request recorded.
#[derive(Default)]
struct FakeWebApi {
    responses: Mutex<HashMap<String, (u16, serde_json::Value)>>,
    requests: Mutex<Vec<HttpRequest>>,
    latency: Mutex<Option<Duration>>,
}

impl FakeWebApi {
    fn respond(&self, url: &str, status: u16, body: serde_json::Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body));
    }

    fn calls_to(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    fn last_form(&self, url: &str) -> HashMap<String, String> {
        let requests = self.requests.lock().unwrap();
        let request = requests.iter().rev().find(|r| r.url == url).unwrap();
        serde_urlencoded::from_bytes(request.body.as_ref().unwrap()).unwrap()
    }
}

#[async_trait]
impl HttpClient for FakeWebApi {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let (status, body) = self
            .responses
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .ok_or_else(|| BridgeError::NotAvailable(format!("unreachable: {}", request.url)))?;

        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        })
    }
}

/// Completes consent by echoing `state` back with a fixed code, optionally
/// waiting for the test to release it.
struct ConsentingPresenter {
    code: String,
    gate: Option<Arc<Notify>>,
    authorize_urls: Mutex<Vec<String>>,
    presented: AtomicUsize,
}

impl ConsentingPresenter {
    fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            gate: None,
            authorize_urls: Mutex::new(Vec::new()),
            presented: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AuthorizationPresenter for ConsentingPresenter {
    async fn present(&self, authorize_url: &str, redirect_uri: &str) -> BridgeResult<RedirectResult> {
        self.presented.fetch_add(1, Ordering::SeqCst);
        self.authorize_urls
            .lock()
            .unwrap()
            .push(authorize_url.to_string());

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let state = query_param(authorize_url, "state").unwrap();
        Ok(RedirectResult::Redirected {
            url: format!("{}?code={}&state={}", redirect_uri, self.code, state),
        })
    }
}

fn query_param(url: &str, name: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

fn token_grant(access: &str, refresh: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "access_token": access,
        "token_type": "Bearer",
        "scope": "user-read-email",
        "expires_in": 3600,
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = refresh.into();
    }
    body
}

struct TestEnv {
    api: Arc<FakeWebApi>,
    store: Arc<InMemoryStore>,
    clock: Arc<TestClock>,
    presenter: Arc<ConsentingPresenter>,
}

impl TestEnv {
    fn new() -> Self {
        Self::with_presenter(ConsentingPresenter::new("abc"))
    }

    fn with_presenter(presenter: ConsentingPresenter) -> Self {
        let api = Arc::new(FakeWebApi::default());
        api.respond(
            PROFILE_URL,
            200,
            serde_json::json!({"id": "wizzler", "display_name": "JM Wizzler"}),
        );
        Self {
            api,
            store: Arc::new(InMemoryStore::default()),
            clock: Arc::new(TestClock(AtomicI64::new(T0))),
            presenter: Arc::new(presenter),
        }
    }

    fn config(&self) -> CoreConfig {
        CoreConfig::builder()
            .client_id("client-123")
            .authorize_url("https://accounts.test/authorize")
            .token_url(TOKEN_URL)
            .api_base_url("https://api.test/")
            .http_client(self.api.clone())
            .secure_store(self.store.clone())
            .presenter(self.presenter.clone())
            .clock(self.clock.clone())
            .build()
            .unwrap()
    }

    fn manager(&self) -> AuthManager {
        AuthManager::new(&self.config(), EventBus::new(64))
    }

    fn credential_store(&self) -> CredentialStore {
        CredentialStore::from_config(&self.config())
    }

    fn exchange_client(&self) -> TokenExchangeClient {
        let config = self.config();
        TokenExchangeClient::from_config(
            &config,
            Arc::new(CredentialStore::from_config(&config)),
            EventBus::new(16),
        )
    }
}

#[tokio::test]
async fn test_sign_in_exchanges_code_with_matching_verifier() {
    let env = TestEnv::new();
    env.api.respond(TOKEN_URL, 200, token_grant("A1", Some("R1")));
    let manager = env.manager();

    let outcome = manager.login().await.unwrap();

    let FlowOutcome::SignedIn(session) = outcome else {
        panic!("expected a signed-in session");
    };
    let tokens = session.tokens.unwrap();
    assert_eq!(tokens.access_token, "A1");
    assert_eq!(tokens.expires_at, T0 + 3_600_000);
    assert_eq!(session.user.unwrap().id, "wizzler");

    let form = env.api.last_form(TOKEN_URL);
    assert_eq!(form["grant_type"], "authorization_code");
    assert_eq!(form["code"], "abc");
    assert_eq!(form["client_id"], "client-123");
    assert_eq!(form["redirect_uri"], "musicplayerapp://auth");

    let authorize_url = env.presenter.authorize_urls.lock().unwrap()[0].clone();
    let verifier = PkceVerifier::from_string(form["code_verifier"].clone());
    assert_eq!(
        query_param(&authorize_url, "code_challenge"),
        Some(verifier.challenge())
    );
}

#[tokio::test]
async fn test_session_survives_restart() {
    let env = TestEnv::new();
    env.api.respond(TOKEN_URL, 200, token_grant("A1", Some("R1")));
    env.manager().login().await.unwrap();

    let restarted = env.manager();
    let session = restarted.bootstrap().await;

    assert!(session.is_authenticated);
    assert_eq!(session.access_token(), Some("A1"));
    assert_eq!(session.user.unwrap().name(), "JM Wizzler");
    assert_eq!(env.api.calls_to(TOKEN_URL), 1);
}

#[tokio::test]
async fn test_bootstrap_with_rejected_profile_is_logged_out() {
    let env = TestEnv::new();
    env.credential_store()
        .write(&TokenSet::from_grant("A1", "R1", "Bearer", "", 3600, T0))
        .await;
    env.api
        .respond(PROFILE_URL, 401, serde_json::json!({"error": {"status": 401}}));

    let session = env.manager().bootstrap().await;

    assert!(!session.is_authenticated);
    assert!(session.user.is_none());
    assert!(session.tokens.is_none());
    assert!(env.credential_store().read_raw().await.is_none());
}

#[tokio::test]
async fn test_logout_removes_persisted_credentials() {
    let env = TestEnv::new();
    env.api.respond(TOKEN_URL, 200, token_grant("A1", Some("R1")));
    let manager = env.manager();
    manager.login().await.unwrap();

    manager.logout().await;

    let store = env.credential_store();
    assert!(store.read(&env.exchange_client()).await.is_none());
    assert!(store.read_user().await.is_none());
    assert_eq!(manager.state(), SessionState::logged_out());
}

#[tokio::test]
async fn test_refresh_without_rotation_keeps_refresh_token() {
    let env = TestEnv::new();
    env.api.respond(TOKEN_URL, 200, token_grant("A2", None));

    let tokens = env.exchange_client().refresh("R1").await.unwrap();

    assert_eq!(tokens.access_token, "A2");
    assert_eq!(tokens.refresh_token, "R1");
    assert_eq!(
        env.credential_store().read_raw().await.unwrap().refresh_token,
        "R1"
    );
    assert_eq!(env.api.last_form(TOKEN_URL)["grant_type"], "refresh_token");
}

#[tokio::test]
async fn test_failed_refresh_clears_credentials() {
    let env = TestEnv::new();
    let store = env.credential_store();
    store
        .write(&TokenSet::from_grant("A1", "R1", "Bearer", "", 3600, T0))
        .await;
    env.api.respond(
        TOKEN_URL,
        400,
        serde_json::json!({"error": "invalid_grant", "error_description": "Refresh token revoked"}),
    );

    let err = env.exchange_client().refresh("R1").await.unwrap_err();

    assert_eq!(err, AuthError::TokenRefresh("Refresh token revoked".to_string()));
    assert!(store.read_raw().await.is_none());
}

#[tokio::test]
async fn test_stale_access_token_is_never_returned() {
    let env = TestEnv::new();
    let store = env.credential_store();
    let exchange = env.exchange_client();
    env.api.respond(TOKEN_URL, 500, serde_json::json!({}));

    for offset in [3_300_000, 3_450_000, 3_600_000, 7_200_000] {
        store
            .write(&TokenSet::from_grant("A1", "R1", "Bearer", "", 3600, T0))
            .await;
        env.clock.0.store(T0 + offset, Ordering::SeqCst);

        let read = store.read(&exchange).await;
        assert!(read.is_none(), "offset {} returned stored token", offset);
    }

    env.api.respond(TOKEN_URL, 200, token_grant("A2", Some("R2")));
    store
        .write(&TokenSet::from_grant("A1", "R1", "Bearer", "", 3600, T0))
        .await;
    let read = store.read(&exchange).await.unwrap();
    assert_eq!(read.access_token, "A2");
}

#[tokio::test]
async fn test_concurrent_token_requests_share_one_refresh() {
    let env = TestEnv::new();
    env.api.respond(TOKEN_URL, 200, token_grant("A1", Some("R1")));
    let manager = env.manager();
    manager.login().await.unwrap();

    env.clock.0.store(T0 + 3_500_000, Ordering::SeqCst);
    env.api.respond(TOKEN_URL, 200, token_grant("A2", Some("R2")));
    *env.api.latency.lock().unwrap() = Some(Duration::from_millis(50));

    let (first, second) = tokio::join!(manager.valid_access_token(), manager.valid_access_token());

    assert_eq!(first.unwrap(), "A2");
    assert_eq!(second.unwrap(), "A2");
    assert_eq!(env.api.calls_to(TOKEN_URL), 2);
    assert_eq!(manager.state().access_token(), Some("A2"));
}

#[tokio::test]
async fn test_second_sign_in_is_rejected_while_consent_is_open() {
    let gate = Arc::new(Notify::new());
    let env = TestEnv::with_presenter(ConsentingPresenter {
        gate: Some(gate.clone()),
        ..ConsentingPresenter::new("abc")
    });
    env.api.respond(TOKEN_URL, 200, token_grant("A1", Some("R1")));
    let manager = env.manager();

    let (first, second) = tokio::join!(manager.login(), async {
        let second = manager.login().await;
        gate.notify_one();
        second
    });

    assert!(matches!(first.unwrap(), FlowOutcome::SignedIn(_)));
    assert_eq!(second.unwrap_err(), AuthError::SignInInProgress);
    assert_eq!(env.presenter.presented.load(Ordering::SeqCst), 1);
    assert_eq!(env.api.calls_to(TOKEN_URL), 1);
}
