//! Authentication provider for the mirror client.
//!
//! Attaches the appropriate headers to HTTP requests and the feed socket
//! handshake. The hosted service accepts a project API key (anonymous or
//! service role) and, for session-bearing apps, a per-user bearer token
//! obtained from [`login`](crate::MirrorClient::login).

use crate::error::{MirrorError, Result};
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};

/// Name of the project API key header.
pub const API_KEY_HEADER: &str = "apikey";

/// Authentication credentials for the hosted store.
///
/// # Examples
///
/// ```rust
/// use table_mirror::AuthProvider;
///
/// // Project API key (most apps)
/// let auth = AuthProvider::api_key("public-anon-key");
///
/// // Per-user session token
/// let auth = AuthProvider::bearer("eyJhbGc...");
///
/// // No authentication (open local instance)
/// let auth = AuthProvider::none();
/// ```
#[derive(Debug, Clone)]
pub enum AuthProvider {
    /// Project API key sent in the `apikey` header.
    ApiKey(String),

    /// Per-user bearer token from an authenticated session.
    Bearer(String),

    /// No authentication.
    None,
}

impl AuthProvider {
    /// Authenticate with a project API key.
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::ApiKey(key.into())
    }

    /// Authenticate with a session bearer token.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer(token.into())
    }

    /// No authentication.
    pub fn none() -> Self {
        Self::None
    }

    /// The raw token to present on the feed socket handshake, if any.
    pub(crate) fn feed_token(&self) -> Option<&str> {
        match self {
            Self::ApiKey(key) => Some(key),
            Self::Bearer(token) => Some(token),
            Self::None => None,
        }
    }

    /// Attach authentication headers to an HTTP request builder.
    pub fn apply_to_request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::ApiKey(key) => builder
                .header(API_KEY_HEADER, key)
                .bearer_auth(key),
            Self::Bearer(token) => builder.bearer_auth(token),
            Self::None => builder,
        }
    }

    /// Attach authentication headers to a feed socket handshake request.
    pub(crate) fn apply_to_ws_request(
        &self,
        request: &mut tokio_tungstenite::tungstenite::http::Request<()>,
    ) -> Result<()> {
        if let Some(token) = self.feed_token() {
            let value = format!("Bearer {}", token);
            let header_value = HeaderValue::from_str(&value).map_err(|e| {
                MirrorError::ConfigurationError(format!(
                    "Credential is not a valid Authorization header: {}",
                    e
                ))
            })?;
            request.headers_mut().insert(AUTHORIZATION, header_value);
        }
        Ok(())
    }
}
