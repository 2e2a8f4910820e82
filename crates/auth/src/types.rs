//! Types for authentication and session management

use serde::{Deserialize, Serialize};

/// ユーザー情報
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub app_metadata: serde_json::Value,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub last_sign_in_at: Option<String>,
}

impl User {
    /// The provider the user signed in with (`email`, `google`, ...), if GoTrue reported one.
    pub fn provider(&self) -> Option<&str> {
        self.app_metadata.get("provider").and_then(|v| v.as_str())
    }
}

/// セッション情報
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    /// Unix timestamp (seconds). Filled in from `expires_in` when the server omits it.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub token_type: String,
    pub user: User,
}

impl Session {
    /// Ensure `expires_at` is populated, counting `expires_in` from now.
    pub(crate) fn stamped(mut self) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = Some(chrono::Utc::now().timestamp() + self.expires_in);
        }
        self
    }

    /// True if the session expires within `margin_secs` from now.
    pub fn expires_within(&self, margin_secs: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => chrono::Utc::now().timestamp() + margin_secs >= expires_at,
            None => false,
        }
    }

    /// True if the access token has already expired.
    pub fn is_expired(&self) -> bool {
        self.expires_within(0)
    }
}

/// サインアップのレスポンス
///
/// GoTrue only returns a session when e-mail confirmation is disabled.
#[derive(Debug, Clone)]
pub struct AuthResponse {
    pub user: User,
    pub session: Option<Session>,
}

/// 認証状態の変更イベント
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthChangeEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// A single auth state change, delivered to every subscriber in emission order.
#[derive(Debug, Clone)]
pub struct AuthStateChange {
    pub event: AuthChangeEvent,
    pub session: Option<Session>,
}

/// クライアントオプション
#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub auto_refresh_token: bool,
    pub persist_session: bool,
    /// Key under which the session is written to [`crate::SessionStorage`].
    pub storage_key: String,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            auto_refresh_token: true,
            persist_session: true,
            storage_key: "sb-auth-token".to_string(),
        }
    }
}
