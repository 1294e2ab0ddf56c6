//! Authenticated HTTPS client for the vendor monitoring API.
//!
//! Requests are form-encoded POSTs; responses are JSON. The session cookie
//! lives in the HTTP client's cookie jar; its expiry clock is tracked here
//! so a re-login happens before the server would reject us. A short-lived
//! in-memory response cache dampens UI polling, and an exponential backoff
//! is applied while consecutive transport errors accumulate.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub mod endpoints;
pub mod models;

pub use endpoints::{
    AnalyticsEndpoints, ControlEndpoints, DeviceEndpoints, FirmwareEndpoints, PlantEndpoints,
};

/// Production monitoring endpoint; override for self-hosted or EU portals.
pub const DEFAULT_BASE_URL: &str = "https://monitor.eg4electronics.com";

/// Server sessions live ~30 minutes; refresh a minute early so an in-flight
/// request never straddles the expiry.
const SESSION_TTL: Duration = Duration::from_secs(30 * 60);
const SESSION_REFRESH_MARGIN: Duration = Duration::from_secs(60);

const BACKOFF_BASE_SECS: f64 = 1.0;
const BACKOFF_CAP_SECS: f64 = 60.0;

const LOGIN_PATH: &str = "/WManage/web/login";

/// Per-endpoint cache lifetimes: seconds for telemetry, minutes for
/// topology. Best-effort only; never a consistency mechanism.
fn cache_ttl(endpoint: &str) -> Duration {
    match endpoint {
        "inverter_runtime" | "midbox_runtime" => Duration::from_secs(10),
        "inverter_energy" | "battery_info" => Duration::from_secs(20),
        "parameter_read" | "quick_charge_status" => Duration::from_secs(5),
        "firmware" | "chart" => Duration::from_secs(60),
        _ => Duration::from_secs(300),
    }
}

struct SessionState {
    expires_at: Option<Instant>,
}

struct CacheEntry {
    stored_at: Instant,
    ttl: Duration,
    value: serde_json::Value,
}

struct BackoffState {
    consecutive_errors: u32,
}

/// Cloud API client. Cheap to share behind an `Arc`; all interior state is
/// mutex-guarded and never held across I/O.
pub struct LuxpowerClient {
    base_url: String,
    username: String,
    password: String,
    http: reqwest::Client,
    session: Mutex<SessionState>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    backoff: Mutex<BackoffState>,
}

impl LuxpowerClient {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        Self::with_base_url(username, password, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        username: impl Into<String>,
        password: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| Error::connection_with("failed to build HTTP client", err))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            http,
            session: Mutex::new(SessionState { expires_at: None }),
            cache: Mutex::new(HashMap::new()),
            backoff: Mutex::new(BackoffState {
                consecutive_errors: 0,
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn plants(&self) -> PlantEndpoints<'_> {
        PlantEndpoints::new(self)
    }

    pub fn devices(&self) -> DeviceEndpoints<'_> {
        DeviceEndpoints::new(self)
    }

    pub fn control(&self) -> ControlEndpoints<'_> {
        ControlEndpoints::new(self)
    }

    pub fn firmware(&self) -> FirmwareEndpoints<'_> {
        FirmwareEndpoints::new(self)
    }

    pub fn analytics(&self) -> AnalyticsEndpoints<'_> {
        AnalyticsEndpoints::new(self)
    }

    /// Consecutive transport errors since the last success.
    pub fn consecutive_errors(&self) -> u32 {
        self.lock_backoff().consecutive_errors
    }

    /// Backoff delay the next request will wait, in seconds.
    pub fn current_backoff_delay(&self) -> f64 {
        let errors = self.lock_backoff().consecutive_errors;
        if errors == 0 {
            0.0
        } else {
            (BACKOFF_BASE_SECS * 2f64.powi(errors as i32 - 1)).min(BACKOFF_CAP_SECS)
        }
    }

    fn lock_backoff(&self) -> std::sync::MutexGuard<'_, BackoffState> {
        self.backoff.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_error(&self) {
        self.lock_backoff().consecutive_errors += 1;
    }

    fn record_success(&self) {
        self.lock_backoff().consecutive_errors = 0;
    }

    async fn apply_backoff(&self) {
        let delay = self.current_backoff_delay();
        if delay > 0.0 {
            debug!(delay_secs = delay, "backing off before request");
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
        }
    }

    fn session_expired(&self) -> bool {
        match self.lock_session().expires_at {
            Some(expires_at) => {
                Instant::now() + SESSION_REFRESH_MARGIN >= expires_at
            }
            None => true,
        }
    }

    fn invalidate_session(&self) {
        self.lock_session().expires_at = None;
    }

    /// Log in with the configured credentials, refreshing the session cookie
    /// and the client-side expiry clock.
    pub async fn login(&self) -> Result<models::LoginResponse> {
        self.apply_backoff().await;

        let url = format!("{}{}", self.base_url, LOGIN_PATH);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("account", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await
            .map_err(|err| {
                self.record_error();
                Error::connection_with("login request failed", err)
            })?;

        let value: serde_json::Value = response.json().await.map_err(|err| {
            self.record_error();
            Error::read_transient_with("login", "malformed login response", err)
        })?;

        let login: models::LoginResponse = parse_response("login", value)?;
        if !login.success {
            self.record_error();
            return Err(Error::auth(
                login
                    .msg
                    .clone()
                    .unwrap_or_else(|| "invalid credentials".to_string()),
            ));
        }

        self.record_success();
        self.lock_session().expires_at = Some(Instant::now() + SESSION_TTL);
        debug!(username = %self.username, "logged in");
        Ok(login)
    }

    /// Log in if there is no live session (or it is about to lapse).
    pub async fn ensure_authenticated(&self) -> Result<()> {
        if self.session_expired() {
            self.login().await?;
        }
        Ok(())
    }

    /// Drop the session clock and the response cache. The cookie jar is
    /// refreshed by the next login.
    pub fn logout(&self) {
        self.invalidate_session();
        self.lock_cache().clear();
    }

    fn cache_get(&self, key: &str) -> Option<serde_json::Value> {
        let cache = self.lock_cache();
        let entry = cache.get(key)?;
        if entry.stored_at.elapsed() < entry.ttl {
            debug!(key, "cache hit");
            Some(entry.value.clone())
        } else {
            None
        }
    }

    fn cache_put(&self, key: String, endpoint: &str, value: serde_json::Value) {
        let ttl = cache_ttl(endpoint);
        self.lock_cache().insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                ttl,
                value,
            },
        );
    }

    /// Issue one API request. On an authentication rejection the client
    /// re-logs-in silently and replays the request exactly once; a second
    /// rejection surfaces as an auth error.
    pub(crate) async fn request(
        &self,
        path: &str,
        form: &[(&str, String)],
        cache: Option<(String, &str)>,
    ) -> Result<serde_json::Value> {
        if let Some((key, _)) = &cache {
            if let Some(hit) = self.cache_get(key) {
                return Ok(hit);
            }
        }

        self.ensure_authenticated().await?;
        self.apply_backoff().await;

        let url = format!("{}{}", self.base_url, path);
        let mut auth_retried = false;

        loop {
            let response = self
                .http
                .post(&url)
                .form(form)
                .send()
                .await
                .map_err(|err| {
                    self.record_error();
                    Error::connection_with(format!("request to {path} failed"), err)
                })?;

            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                if auth_retried {
                    self.record_error();
                    return Err(Error::auth("re-login rejected by server"));
                }
                warn!(path, %status, "session lost, re-logging in");
                self.invalidate_session();
                self.login().await?;
                auth_retried = true;
                continue;
            }

            let value: serde_json::Value = response.json().await.map_err(|err| {
                self.record_error();
                Error::read_transient_with(path.to_string(), "malformed JSON response", err)
            })?;

            if is_auth_denied(&value) {
                if auth_retried {
                    self.record_error();
                    return Err(Error::auth("re-login rejected by server"));
                }
                warn!(path, "session rejected by server, re-logging in");
                self.invalidate_session();
                self.login().await?;
                auth_retried = true;
                continue;
            }

            self.record_success();
            if let Some((key, endpoint)) = cache {
                self.cache_put(key, endpoint, value.clone());
            }
            return Ok(value);
        }
    }
}

/// Body-level authentication rejection: the API answers 200 with
/// `success:false` and a login hint once the cookie lapses.
fn is_auth_denied(value: &serde_json::Value) -> bool {
    let denied_success = value
        .get("success")
        .and_then(serde_json::Value::as_bool)
        .map(|ok| !ok)
        .unwrap_or(false);
    if !denied_success {
        return false;
    }
    value
        .get("msg")
        .and_then(serde_json::Value::as_str)
        .map(|msg| {
            let msg = msg.to_ascii_lowercase();
            msg.contains("login") || msg.contains("session")
        })
        .unwrap_or(false)
}

/// Deserialize an endpoint response, classifying schema drift as a read
/// error rather than a panic.
pub(crate) fn parse_response<T: DeserializeOwned>(
    operation: &str,
    value: serde_json::Value,
) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|err| Error::read_rejected(operation, format!("unexpected response shape: {err}")))
}

/// Build a cache key from an endpoint name and its stable parameters.
pub(crate) fn cache_key(endpoint: &str, params: &[(&str, &str)]) -> String {
    let mut key = String::from(endpoint);
    for (name, value) in params {
        key.push(':');
        key.push_str(name);
        key.push('=');
        key.push_str(value);
    }
    key
}
