use serde::{Deserialize, Serialize};

/// Request payload for password login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Account email address.
    pub email: String,
    /// Account password.
    pub password: String,
}

/// Minimal user information attached to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    /// Opaque user identifier.
    pub id: String,
    /// Account email address.
    pub email: String,
}

/// Authenticated session returned by a successful login.
///
/// The access token can be attached to subsequent calls via
/// [`AuthProvider::bearer`](crate::AuthProvider::bearer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token for authenticated requests.
    pub access_token: String,

    /// Seconds until the token expires, when the server reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// The authenticated user.
    pub user: UserInfo,
}
