//! Array Session Client
//!
//! Owns one authenticated HTTP session (cookie jar + `X-Auth-Token`) against
//! one storage array. Requests transparently re-authenticate when the array
//! reports the session as expired, and concurrent callers hitting the same
//! expiry collapse onto a single relogin.

use crate::client::codes::{self, describe, error_code, is_hard_auth_failure, result_code};
use crate::client::limiter::RequestLimiter;
use crate::domain::ports::{ClaimStatusRef, CredentialSourceRef};
use crate::error::{Error, Result};
use crate::metrics;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, CONTENT_TYPE, REFERER};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

// =============================================================================
// Endpoints
// =============================================================================

pub const LOGIN_PATH: &str = "/dsware/service/v1.3/sec/login";
pub const LOGOUT_PATH: &str = "/dsware/service/v1.3/sec/logout";
pub const KEEP_ALIVE_PATH: &str = "/dsware/service/v1.3/sec/keepAlive";
pub const STORAGE_POOL_PATH: &str = "/dsware/service/v1.3/storagePool";
pub const ACCOUNTS_PATH: &str = "/dfv/service/obsPOE/accounts";
pub const NFS_SERVICE_CONFIG_PATH: &str = "/api/v2/nas_protocol/nfs_service_config";

/// Header carrying the session token
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Tenant used when no account name is configured
pub const DEFAULT_ACCOUNT_NAME: &str = "system";
pub const DEFAULT_ACCOUNT_ID: i64 = 0;

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// Configuration
// =============================================================================

/// Connection identity of one array session
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Array management URL (scheme, host and port)
    pub url: String,
    /// Management user
    pub user: String,
    /// Secret holding the password, for validation logins
    pub secret_name: String,
    pub secret_namespace: String,
    /// Namespaced claim identity of the backend
    pub backend_id: String,
    /// Tenant to scope requests to; empty selects the default tenant
    pub account_name: String,
    /// Skip TLS certificate verification (arrays ship self-signed certs)
    pub insecure_skip_verify: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "https://127.0.0.1:28443".to_string(),
            user: "admin".to_string(),
            secret_name: String::new(),
            secret_namespace: String::new(),
            backend_id: String::new(),
            account_name: String::new(),
            insecure_skip_verify: true,
        }
    }
}

// =============================================================================
// Request Logging
// =============================================================================

/// How much of a request/response pair gets logged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogTier {
    /// Carries credentials or fires constantly
    Suppressed,
    /// High-frequency polling
    Debug,
    Info,
}

fn log_tier(method: &Method, path: &str) -> LogTier {
    let path = path.split('?').next().unwrap_or(path);
    match (method.as_str(), path) {
        ("POST", LOGIN_PATH) | ("POST", KEEP_ALIVE_PATH) => LogTier::Suppressed,
        ("GET", STORAGE_POOL_PATH) | ("GET", ACCOUNTS_PATH) | ("GET", NFS_SERVICE_CONFIG_PATH) => {
            LogTier::Debug
        }
        _ => LogTier::Info,
    }
}

fn filtered_log(tier: LogTier, message: std::fmt::Arguments<'_>) {
    match tier {
        LogTier::Suppressed => {}
        LogTier::Debug => debug!("{}", message),
        LogTier::Info => info!("{}", message),
    }
}

// =============================================================================
// Session State
// =============================================================================

#[derive(Debug, Default)]
struct SessionState {
    /// Empty means logged out
    auth_token: String,
    /// Rebuilt on every login
    http: Option<reqwest::Client>,
    account_name: String,
    account_id: i64,
}

/// Clears the session when dropped, whatever path logout took
struct ClearSession<'a>(&'a RwLock<SessionState>);

impl Drop for ClearSession<'_> {
    fn drop(&mut self) {
        let mut state = self.0.write();
        state.auth_token.clear();
        state.http = None;
    }
}

struct ClientInner {
    config: ClientConfig,
    limiter: Arc<RequestLimiter>,
    credentials: CredentialSourceRef,
    claims: ClaimStatusRef,
    session: RwLock<SessionState>,
    relogin: tokio::sync::Mutex<()>,
}

// =============================================================================
// Session Client
// =============================================================================

/// Authenticated client for one storage array.
///
/// Cloning is cheap and every clone shares the same session; use
/// [`SessionClient::duplicate`] for an independent session.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("url", &self.inner.config.url)
            .field("user", &self.inner.config.user)
            .field("backend_id", &self.inner.config.backend_id)
            .field("logged_in", &self.is_logged_in())
            .finish()
    }
}

impl SessionClient {
    /// Create a logged-out client
    pub fn new(
        config: ClientConfig,
        limiter: Arc<RequestLimiter>,
        credentials: CredentialSourceRef,
        claims: ClaimStatusRef,
    ) -> Self {
        let session = SessionState {
            account_name: config.account_name.clone(),
            ..Default::default()
        };

        Self {
            inner: Arc::new(ClientInner {
                config,
                limiter,
                credentials,
                claims,
                session: RwLock::new(session),
                relogin: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// A logged-out client with the same identity and request limiter
    pub fn duplicate(&self) -> Self {
        Self::new(
            self.inner.config.clone(),
            self.inner.limiter.clone(),
            self.inner.credentials.clone(),
            self.inner.claims.clone(),
        )
    }

    pub fn url(&self) -> &str {
        &self.inner.config.url
    }

    pub fn backend_id(&self) -> &str {
        &self.inner.config.backend_id
    }

    pub fn is_logged_in(&self) -> bool {
        !self.inner.session.read().auth_token.is_empty()
    }

    pub fn account_id(&self) -> i64 {
        self.inner.session.read().account_id
    }

    pub fn account_name(&self) -> String {
        self.inner.session.read().account_name.clone()
    }

    pub(crate) fn auth_token(&self) -> String {
        self.inner.session.read().auth_token.clone()
    }

    // =========================================================================
    // Session Lifecycle
    // =========================================================================

    /// Log in with the backend's current password.
    ///
    /// Credentials rejected as wrong or locked report the backend's claim
    /// offline before the error is returned.
    pub async fn login(&self) -> Result<()> {
        let config = &self.inner.config;
        info!("Try to login {}.", config.url);

        let password = self
            .inner
            .credentials
            .password_by_backend_id(&config.backend_id)
            .await?;

        let http = self.build_http_client()?;
        let headers = self.authenticate(&http, &password, true).await?;

        let token = headers
            .get(AUTH_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::MissingToken {
                url: config.url.clone(),
            })?;

        {
            let mut state = self.inner.session.write();
            state.auth_token = token;
            state.http = Some(http);
        }

        self.set_account_id().await.map_err(|e| {
            error!("setAccountId failed, error: {}", e);
            e
        })?;

        info!("Login {} success", config.url);
        Ok(())
    }

    /// Check candidate credentials held by the configured secret.
    ///
    /// Uses a throwaway transport; the client's own session and the claim's
    /// online status are left untouched.
    pub async fn validate_login(&self) -> Result<()> {
        let config = &self.inner.config;
        info!("Try to login {}.", config.url);

        let password = self
            .inner
            .credentials
            .password_by_secret(&config.secret_name, &config.secret_namespace)
            .await?;

        let http = self.build_http_client()?;
        self.authenticate(&http, &password, false).await?;

        info!("Validate login [{}] success", config.url);
        Ok(())
    }

    /// End the session. Best-effort: the local session is cleared even when
    /// the array cannot be reached.
    pub async fn logout(&self) {
        let _clear = ClearSession(&self.inner.session);
        let (http, token) = {
            let state = self.inner.session.read();
            (state.http.clone(), state.auth_token.clone())
        };

        let Some(http) = http else {
            return;
        };

        let url = &self.inner.config.url;
        match self.base_call_with(&http, &token, Method::POST, LOGOUT_PATH, None).await {
            Err(e) => warn!("Logout {} error: {}", url, e),
            Ok((_, resp)) => match result_code(&resp) {
                Some(0) => info!("Logout {} success.", url),
                code => warn!("Logout {} error: {:?}", url, code),
            },
        }
    }

    /// Refresh the session's idle timer. Failures are only logged.
    pub async fn keep_alive(&self) {
        if let Err(e) = self.post(KEEP_ALIVE_PATH, None).await {
            warn!("Keep token alive error: {}", e);
        }
    }

    /// Resolve a tenant's numeric id from its name
    pub async fn account_id_by_name(&self, name: &str) -> Result<i64> {
        let path = format!("{}?name={}", ACCOUNTS_PATH, urlencoding::encode(name));
        let (_, resp) = self.base_call(Method::GET, &path, None).await?;
        Self::parse_account_id(&resp, name)
    }

    fn parse_account_id(resp: &Value, name: &str) -> Result<i64> {
        if let Some(code) = result_code(resp).filter(|c| *c != 0) {
            return Err(Error::Api {
                operation: format!("get account {}", name),
                code,
                message: describe(resp),
            });
        }

        resp.get("data")
            .and_then(|data| data.get("id"))
            .and_then(codes::as_code)
            .ok_or_else(|| Error::Api {
                operation: format!("get account {}", name),
                code: -1,
                message: format!("account id missing in {}", resp),
            })
    }

    /// Resolve the tenant for this login from the configured account name
    async fn set_account_id(&self) -> Result<()> {
        let name = self.inner.config.account_name.clone();
        if name.is_empty() {
            let mut state = self.inner.session.write();
            state.account_name = DEFAULT_ACCOUNT_NAME.to_string();
            state.account_id = DEFAULT_ACCOUNT_ID;
            return Ok(());
        }

        let id = self.account_id_by_name(&name).await?;
        {
            let mut state = self.inner.session.write();
            state.account_name = name.clone();
            state.account_id = id;
        }
        info!(
            "setAccountId finish, account name: {}, account id: {}",
            name, id
        );
        Ok(())
    }

    async fn authenticate(
        &self,
        http: &reqwest::Client,
        password: &str,
        report_offline: bool,
    ) -> Result<HeaderMap> {
        let config = &self.inner.config;
        let data = json!({
            "userName": config.user,
            "password": password,
        });

        let (headers, resp) = self
            .base_call_with(http, "", Method::POST, LOGIN_PATH, Some(&data))
            .await?;

        if result_code(&resp) == Some(0) {
            return Ok(headers);
        }

        let code = error_code(&resp);
        if report_offline && code.is_some_and(is_hard_auth_failure) {
            if let Err(e) = self
                .inner
                .claims
                .set_backend_online_status(&config.backend_id, false)
                .await
            {
                error!(
                    "SetStorageBackendContentOffline [{}] failed. error: {}",
                    config.backend_id, e
                );
            }
        }

        Err(Error::Authentication {
            url: config.url.clone(),
            code,
            response: resp.to_string(),
        })
    }

    /// Re-authenticate unless another caller already replaced `observed`.
    ///
    /// Runs on its own task so a caller that gives up mid-way cannot leave
    /// the session half rebuilt for everyone else waiting on the lock.
    async fn relogin(&self, observed: String) -> Result<()> {
        let this = self.clone();
        let task = tokio::spawn(async move {
            let _guard = this.inner.relogin.lock().await;

            let current = this.auth_token();
            if !current.is_empty() && current != observed {
                debug!("Session of {} was already renewed", this.url());
                return Ok(());
            }
            if !current.is_empty() {
                this.logout().await;
            }

            metrics::global().relogins.inc();
            this.login().await.map_err(|e| {
                error!("Try to relogin error: {}", e);
                e
            })
        });

        task.await
            .map_err(|e| Error::Internal(format!("relogin task failed: {}", e)))?
    }

    // =========================================================================
    // Request Dispatch
    // =========================================================================

    fn build_http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(self.inner.config.insecure_skip_verify)
            .timeout(RESPONSE_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("Construct http client error: {}", e)))
    }

    /// Send one request over `http`, holding a limiter permit until the body is read
    async fn send(
        &self,
        http: &reqwest::Client,
        token: &str,
        method: Method,
        path: &str,
        data: Option<&Value>,
    ) -> Result<(HeaderMap, Vec<u8>)> {
        let url = format!("{}{}", self.inner.config.url, path);
        let tier = log_tier(&method, path);

        let mut request = http
            .request(method.clone(), &url)
            .header(REFERER, &self.inner.config.url)
            .header(CONTENT_TYPE, "application/json");
        if !token.is_empty() {
            request = request.header(AUTH_TOKEN_HEADER, token);
        }
        if let Some(data) = data {
            request = request.body(serde_json::to_vec(data)?);
        }

        filtered_log(
            tier,
            format_args!(
                "Request method: {}, url: {}, body: {}",
                method,
                url,
                data.unwrap_or(&Value::Null)
            ),
        );

        let _permit = self.inner.limiter.acquire().await?;

        let response = request.send().await.map_err(|e| {
            error!("Send request method: {}, url: {}, error: {}", method, url, e);
            Error::Unconnected {
                url: url.clone(),
                reason: e.to_string(),
            }
        })?;

        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            error!("Read response data error: {}", e);
            Error::Internal(format!("Read response of {} error: {}", url, e))
        })?;

        filtered_log(
            tier,
            format_args!(
                "Response method: {}, url: {}, body: {}",
                method,
                url,
                String::from_utf8_lossy(&body)
            ),
        );

        Ok((headers, body.to_vec()))
    }

    /// Send over the session's current transport and token
    async fn do_call(
        &self,
        method: Method,
        path: &str,
        data: Option<&Value>,
    ) -> Result<(HeaderMap, Vec<u8>)> {
        let (http, token) = {
            let state = self.inner.session.read();
            (state.http.clone(), state.auth_token.clone())
        };

        let http = http.ok_or_else(|| Error::Unconnected {
            url: self.inner.config.url.clone(),
            reason: "session not established".into(),
        })?;

        self.send(&http, &token, method, path, data).await
    }

    fn decode(method: &Method, path: &str, body: &[u8]) -> Result<Value> {
        serde_json::from_slice(body).map_err(|e| {
            let body = String::from_utf8_lossy(body).into_owned();
            error!("Unmarshal response body {} error: {}", body, e);
            Error::Decode {
                method: method.to_string(),
                path: path.to_string(),
                body,
            }
        })
    }

    async fn base_call_with(
        &self,
        http: &reqwest::Client,
        token: &str,
        method: Method,
        path: &str,
        data: Option<&Value>,
    ) -> Result<(HeaderMap, Value)> {
        let (headers, body) = self.send(http, token, method.clone(), path, data).await?;
        Ok((headers, Self::decode(&method, path, &body)?))
    }

    /// One attempt, no relogin
    async fn base_call(
        &self,
        method: Method,
        path: &str,
        data: Option<&Value>,
    ) -> Result<(HeaderMap, Value)> {
        let (headers, body) = self.do_call(method.clone(), path, data).await?;
        Ok((headers, Self::decode(&method, path, &body)?))
    }

    /// Send a request, re-authenticating once on transport failure or an
    /// expired session
    async fn call(
        &self,
        method: Method,
        path: &str,
        data: Option<&Value>,
    ) -> Result<(HeaderMap, Value)> {
        let observed = self.auth_token();

        match self.do_call(method.clone(), path, data).await {
            Err(Error::Unconnected { .. }) => {}
            Err(e) => return Err(e),
            Ok((headers, body)) => {
                let resp = Self::decode(&method, path, &body)?;
                if !codes::is_session_expired(&resp) {
                    return Ok((headers, resp));
                }
                warn!("User offline, try to relogin {}", self.url());
            }
        }

        self.relogin(observed).await?;
        self.base_call(method, path, data).await
    }

    pub async fn get(&self, path: &str, data: Option<&Value>) -> Result<Value> {
        Ok(self.call(Method::GET, path, data).await?.1)
    }

    pub async fn post(&self, path: &str, data: Option<&Value>) -> Result<Value> {
        Ok(self.call(Method::POST, path, data).await?.1)
    }

    pub async fn put(&self, path: &str, data: Option<&Value>) -> Result<Value> {
        Ok(self.call(Method::PUT, path, data).await?.1)
    }

    pub async fn delete(&self, path: &str, data: Option<&Value>) -> Result<Value> {
        Ok(self.call(Method::DELETE, path, data).await?.1)
    }
}
