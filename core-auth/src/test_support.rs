//! Fakes shared by the unit tests of this crate.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    AuthorizationPresenter, Clock, HttpClient, HttpRequest, HttpResponse, RedirectResult,
    SecureStore,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_runtime::config::{CoreConfig, OAuthConfig};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const T0: i64 = 1_700_000_000_000;
pub const TOKEN_URL: &str = "https://accounts.test/api/token";
pub const AUTHORIZE_URL: &str = "https://accounts.test/authorize";
pub const API_BASE: &str = "https://api.test/";
pub const REDIRECT_URI: &str = "musicplayerapp://auth";

pub fn oauth_config() -> OAuthConfig {
    let mut config = OAuthConfig::new("client-123");
    config.authorize_url = AUTHORIZE_URL.to_string();
    config.token_url = TOKEN_URL.to_string();
    config.redirect_uri = REDIRECT_URI.to_string();
    config.scopes = vec!["user-read-email".to_string(), "streaming".to_string()];
    config
}

pub fn core_config(
    http: Arc<ScriptedHttpClient>,
    store: Arc<MemorySecureStore>,
    presenter: Arc<ScriptedPresenter>,
    clock: Arc<FixedClock>,
) -> CoreConfig {
    CoreConfig::builder()
        .client_id("client-123")
        .authorize_url(AUTHORIZE_URL)
        .token_url(TOKEN_URL)
        .redirect_uri(REDIRECT_URI)
        .scopes(["user-read-email", "streaming"])
        .api_base_url(API_BASE)
        .http_client(http)
        .secure_store(store)
        .presenter(presenter)
        .clock(clock)
        .build()
        .unwrap()
}

pub fn json_response(status: u16, body: serde_json::Value) -> HttpResponse {
    HttpResponse {
        status,
        headers: HashMap::new(),
        body: Bytes::from(body.to_string()),
    }
}

pub fn token_body(access: &str, refresh: Option<&str>, expires_in: i64) -> serde_json::Value {
    let mut body = serde_json::json!({
        "access_token": access,
        "token_type": "Bearer",
        "scope": "user-read-email",
        "expires_in": expires_in,
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = serde_json::Value::String(refresh.to_string());
    }
    body
}

pub fn profile_body(id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "display_name": "Test Listener",
        "email": "listener@example.com",
        "images": [],
    })
}

/// Clock pinned to a settable instant.
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn new(millis: i64) -> Self {
        Self(AtomicI64::new(millis))
    }

    pub fn set(&self, millis: i64) {
        self.0.store(millis, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0.load(Ordering::SeqCst)).unwrap()
    }

    fn unix_timestamp_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// In-memory secure store with switchable failures.
#[derive(Default)]
pub struct MemorySecureStore {
    storage: tokio::sync::Mutex<HashMap<String, Vec<u8>>>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_raw(&self, key: &str, value: &[u8]) {
        self.storage
            .lock()
            .await
            .insert(key.to_string(), value.to_vec());
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.storage.lock().await.contains_key(key)
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("keychain locked".to_string()));
        }
        self.storage
            .lock()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("keychain locked".to_string()));
        }
        Ok(self.storage.lock().await.get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("keychain locked".to_string()));
        }
        self.storage.lock().await.remove(key);
        Ok(())
    }
}

/// HTTP fake answering from per-route queues. A route matches when the
/// request URL starts with it. The last queued reply for a route repeats.
#[derive(Default)]
pub struct ScriptedHttpClient {
    routes: Mutex<Vec<(String, VecDeque<HttpResponse>)>>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, route: &str, response: HttpResponse) {
        let mut routes = self.routes.lock().unwrap();
        match routes.iter_mut().find(|(r, _)| r == route) {
            Some((_, queue)) => queue.push_back(response),
            None => routes.push((route.to_string(), VecDeque::from([response]))),
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_to(&self, route: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.starts_with(route))
            .count()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut routes = self.routes.lock().unwrap();
        let queue = routes
            .iter_mut()
            .find(|(route, _)| request.url.starts_with(route.as_str()))
            .map(|(_, queue)| queue)
            .ok_or_else(|| BridgeError::NotAvailable(format!("no route for {}", request.url)))?;

        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            queue
                .front()
                .cloned()
                .ok_or_else(|| BridgeError::NotAvailable("empty route".to_string()))
        }
    }
}

/// Presenter returning a scripted result, optionally after the test releases it.
pub struct ScriptedPresenter {
    result: Mutex<Option<BridgeResult<RedirectResult>>>,
    gate: Option<Arc<tokio::sync::Notify>>,
    pub calls: AtomicUsize,
    pub last_url: Mutex<Option<String>>,
}

impl ScriptedPresenter {
    pub fn returning(result: BridgeResult<RedirectResult>) -> Self {
        Self {
            result: Mutex::new(Some(result)),
            gate: None,
            calls: AtomicUsize::new(0),
            last_url: Mutex::new(None),
        }
    }

    /// Waits on `gate` before answering.
    pub fn gated(result: BridgeResult<RedirectResult>, gate: Arc<tokio::sync::Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::returning(result)
        }
    }

    pub fn set_result(&self, result: BridgeResult<RedirectResult>) {
        *self.result.lock().unwrap() = Some(result);
    }
}

#[async_trait]
impl AuthorizationPresenter for ScriptedPresenter {
    async fn present(&self, authorize_url: &str, _redirect_uri: &str) -> BridgeResult<RedirectResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_url.lock().unwrap() = Some(authorize_url.to_string());

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        self.result
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Ok(RedirectResult::Dismissed))
    }
}
