//! HTTP/WebSocket client for a remote table service.
//!
//! [`MirrorClient`] bundles the row transport, the change-feed transport,
//! authentication, and a handful of account/object-storage helpers behind
//! one handle. It implements [`TableStore`], so a [`TableMirror`] can sit
//! directly on top of it.

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock as StdRwLock, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::auth::AuthProvider;
use crate::error::{MirrorError, Result};
use crate::event_handlers::EventHandlers;
use crate::feed;
use crate::mirror::TableMirror;
use crate::models::{LoginRequest, QuerySpec, Row, Session};
use crate::query::RowExecutor;
use crate::store::{ChangeFeed, TableStore};
use crate::timeouts::MirrorTimeouts;

const HEALTH_CHECK_TTL: Duration = Duration::from_secs(10);

/// Server liveness report returned by [`MirrorClient::health_check`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Overall status string, e.g. `"ok"`.
    pub status: String,

    /// Server software version, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Default)]
struct HealthCheckCache {
    last_check: Option<Instant>,
    last_response: Option<HealthStatus>,
}

type AuthCallback = Arc<dyn Fn(Option<&Session>) + Send + Sync>;

/// Current session plus listeners notified whenever it changes.
#[derive(Default)]
struct AuthState {
    session: StdRwLock<Option<Session>>,
    listeners: StdRwLock<Vec<(u64, AuthCallback)>>,
    next_listener_id: AtomicU64,
}

impl AuthState {
    fn set_session(&self, session: Option<Session>) {
        if let Ok(mut current) = self.session.write() {
            *current = session;
        }
        self.notify();
    }

    fn current(&self) -> Option<Session> {
        self.session.read().ok().and_then(|s| s.clone())
    }

    fn notify(&self) {
        let session = self.current();
        if let Ok(listeners) = self.listeners.read() {
            for (_, cb) in listeners.iter() {
                cb(session.as_ref());
            }
        }
    }

    fn add_listener(self: &Arc<Self>, cb: AuthCallback) -> AuthStateSubscription {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push((id, cb));
        }
        AuthStateSubscription {
            id,
            state: Arc::downgrade(self),
        }
    }

    fn remove_listener(&self, id: u64) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.retain(|(lid, _)| *lid != id);
        }
    }
}

/// Registration handle returned by [`MirrorClient::on_auth_state_change`].
/// Dropping it unregisters the callback.
pub struct AuthStateSubscription {
    id: u64,
    state: Weak<AuthState>,
}

impl AuthStateSubscription {
    /// Unregister the callback now.
    pub fn unsubscribe(self) {}
}

impl Drop for AuthStateSubscription {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.remove_listener(self.id);
        }
    }
}

/// Client for a remote table service: row queries and mutations over HTTP,
/// change feeds over WebSocket.
///
/// Use [`MirrorClient::builder`] to construct instances with custom
/// configuration.
#[derive(Clone)]
pub struct MirrorClient {
    base_url: String,
    http_client: reqwest::Client,
    auth: AuthProvider,
    rows: RowExecutor,
    timeouts: MirrorTimeouts,
    event_handlers: EventHandlers,
    health_cache: Arc<Mutex<HealthCheckCache>>,
    auth_state: Arc<AuthState>,
}

impl MirrorClient {
    /// Start building a client.
    pub fn builder() -> MirrorClientBuilder {
        MirrorClientBuilder::new()
    }

    /// The configured server base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The configured timeouts.
    pub fn timeouts(&self) -> &MirrorTimeouts {
        &self.timeouts
    }

    /// Create an uninitialized [`TableMirror`] of `table` backed by this
    /// client. Call [`TableMirror::initialize`] to populate it.
    pub fn mirror(&self, table: impl Into<String>) -> TableMirror {
        TableMirror::new(Arc::new(self.clone()), table)
    }

    /// Check server health.
    ///
    /// Responses are cached for a short TTL so UI code can poll freely.
    pub async fn health_check(&self) -> Result<HealthStatus> {
        {
            let cache = self.health_cache.lock().await;
            if let (Some(last_check), Some(response)) =
                (cache.last_check, cache.last_response.clone())
            {
                if last_check.elapsed() < HEALTH_CHECK_TTL {
                    debug!(
                        "[HEALTH_CHECK] Returning cached response (age: {:?})",
                        last_check.elapsed()
                    );
                    return Ok(response);
                }
            }
        }

        let url = format!("{}/v1/health", self.base_url);
        debug!("[HEALTH_CHECK] Fetching from url={}", url);
        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::ServerError {
                status_code: status.as_u16(),
                message: format!("Health check failed with status {}", status),
            });
        }
        let health: HealthStatus = response.json().await?;

        let mut cache = self.health_cache.lock().await;
        cache.last_check = Some(Instant::now());
        cache.last_response = Some(health.clone());

        Ok(health)
    }

    /// Authenticate with email and password.
    ///
    /// Returns a [`Session`] whose access token can be attached to a new
    /// client via [`AuthProvider::bearer`].
    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let url = format!("{}/v1/auth/login", self.base_url);
        debug!("[AUTH] Logging in '{}' at url={}", email, url);

        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.http_client.post(&url).json(&request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!("[AUTH] Login failed ({}): {}", status, body);
            return Err(MirrorError::AuthenticationError(format!(
                "Login failed ({}): {}",
                status, body
            )));
        }

        let session: Session = response.json().await?;
        debug!("[AUTH] Logged in as user '{}'", session.user.id);
        self.auth_state.set_session(Some(session.clone()));
        Ok(session)
    }

    /// The session from the most recent successful [`login`], if any.
    ///
    /// [`login`]: MirrorClient::login
    pub fn session(&self) -> Option<Session> {
        self.auth_state.current()
    }

    /// Register a callback invoked whenever the session changes (login and
    /// sign-out). The callback receives the new session, or `None` after
    /// sign-out. Dropping the returned handle unregisters it.
    pub fn on_auth_state_change(
        &self,
        cb: impl Fn(Option<&Session>) + Send + Sync + 'static,
    ) -> AuthStateSubscription {
        self.auth_state.add_listener(Arc::new(cb))
    }

    /// Invalidate the current session on the server.
    pub async fn sign_out(&self) -> Result<()> {
        let url = format!("{}/v1/auth/sign_out", self.base_url);
        debug!("[AUTH] Signing out at url={}", url);
        let response = self
            .auth
            .apply_to_request(self.http_client.post(&url))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MirrorError::ServerError {
                status_code: status.as_u16(),
                message: format!("Sign out failed: {}", body),
            });
        }
        self.auth_state.set_session(None);
        Ok(())
    }

    /// Upload an object to a storage bucket, overwriting any existing object
    /// at `path`. Returns the stored path, suitable for [`public_url`].
    ///
    /// [`public_url`]: MirrorClient::public_url
    pub async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        content: bytes::Bytes,
    ) -> Result<String> {
        let url = self.object_url(bucket, path);
        debug!(
            "[STORAGE] Uploading {} bytes to bucket='{}' path='{}'",
            content.len(),
            bucket,
            path
        );
        let response = self
            .auth
            .apply_to_request(self.http_client.put(&url).body(content))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MirrorError::ServerError {
                status_code: status.as_u16(),
                message: format!("Upload failed: {}", body),
            });
        }
        Ok(path.trim_start_matches('/').to_string())
    }

    /// Publicly reachable URL for an object in a public bucket.
    ///
    /// Purely string assembly; no request is made and no existence check is
    /// performed.
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/v1/storage/public/{}/{}",
            self.base_url,
            bucket,
            path.trim_start_matches('/')
        )
    }

    /// Remove objects from a storage bucket. Unknown paths are ignored by
    /// the server.
    pub async fn remove_objects(&self, bucket: &str, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let url = format!("{}/v1/storage/{}", self.base_url, bucket);
        debug!(
            "[STORAGE] Removing {} object(s) from bucket='{}'",
            paths.len(),
            bucket
        );
        let response = self
            .auth
            .apply_to_request(
                self.http_client
                    .delete(&url)
                    .json(&serde_json::json!({ "paths": paths })),
            )
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MirrorError::ServerError {
                status_code: status.as_u16(),
                message: format!("Remove failed: {}", body),
            });
        }
        Ok(())
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/v1/storage/{}/{}",
            self.base_url,
            bucket,
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl TableStore for MirrorClient {
    async fn fetch_rows(&self, table: &str, query: &QuerySpec) -> Result<Vec<Row>> {
        self.rows.fetch(table, query).await
    }

    async fn insert_row(&self, table: &str, row: Row) -> Result<Row> {
        self.rows.insert(table, &row).await
    }

    async fn update_row(&self, table: &str, id: &str, partial: Row) -> Result<()> {
        self.rows.update(table, id, &partial).await
    }

    async fn upsert_row(&self, table: &str, row: Row) -> Result<Row> {
        self.rows.upsert(table, &row).await
    }

    async fn delete_row(&self, table: &str, id: &str) -> Result<()> {
        self.rows.delete(table, id).await
    }

    async fn delete_rows(&self, table: &str, query: &QuerySpec) -> Result<()> {
        self.rows.delete_where(table, query).await
    }

    async fn subscribe(&self, table: &str, query: &QuerySpec) -> Result<ChangeFeed> {
        feed::open_feed(
            &self.base_url,
            table,
            query,
            &self.auth,
            &self.timeouts,
            &self.event_handlers,
        )
        .await
    }
}

/// Builder for [`MirrorClient`].
#[derive(Clone)]
pub struct MirrorClientBuilder {
    base_url: Option<String>,
    auth: AuthProvider,
    timeouts: MirrorTimeouts,
    max_retries: u32,
    event_handlers: EventHandlers,
}

impl Default for MirrorClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MirrorClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            auth: AuthProvider::None,
            timeouts: MirrorTimeouts::default(),
            max_retries: 3,
            event_handlers: EventHandlers::default(),
        }
    }

    /// Server base URL, e.g. `http://localhost:3000`. Required.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Authentication used for HTTP requests and the feed handshake.
    pub fn auth(mut self, auth: AuthProvider) -> Self {
        self.auth = auth;
        self
    }

    /// Timeout configuration.
    pub fn timeouts(mut self, timeouts: MirrorTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Retries for transient row-transport failures. Defaults to 3.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Connection lifecycle callbacks for the change feed.
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<MirrorClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| MirrorError::ConfigurationError("base_url is required".into()))?;
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(MirrorError::ConfigurationError(
                "base_url must not be empty".into(),
            ));
        }

        // Keep-alive pooling; idle window slightly longer than typical
        // server-side keep-alive.
        let mut client_builder = reqwest::Client::builder()
            .connect_timeout(self.timeouts.connection_timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90));
        if !MirrorTimeouts::is_no_timeout(self.timeouts.request_timeout) {
            client_builder = client_builder.timeout(self.timeouts.request_timeout);
        }

        let http_client = client_builder
            .build()
            .map_err(|e| MirrorError::ConfigurationError(e.to_string()))?;

        let rows = RowExecutor::new(
            base_url.clone(),
            http_client.clone(),
            self.auth.clone(),
            self.max_retries,
        );

        Ok(MirrorClient {
            base_url,
            http_client,
            auth: self.auth,
            rows,
            timeouts: self.timeouts,
            event_handlers: self.event_handlers,
            health_cache: Arc::new(Mutex::new(HealthCheckCache::default())),
            auth_state: Arc::new(AuthState::default()),
        })
    }
}
