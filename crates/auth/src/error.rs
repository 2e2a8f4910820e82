use serde::Deserialize;
use thiserror::Error;

/// エラー型
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("API error: {message} (Status: {status})")]
    ApiError {
        message: String,
        status: reqwest::StatusCode,
    },

    #[error("Invalid login credentials: {0}")]
    InvalidCredentials(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Missing session")]
    MissingSession,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Session storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// GoTrue のエラーレスポンスを分類する
    ///
    /// Older GoTrue releases answer a bad password with
    /// `{"error":"invalid_grant"}`, newer ones with
    /// `{"error_code":"invalid_credentials"}`; both become
    /// [`AuthError::InvalidCredentials`].
    pub(crate) fn from_response(status: reqwest::StatusCode, body: &str) -> Self {
        let parsed = serde_json::from_str::<GoTrueErrorBody>(body).unwrap_or_default();
        let message = parsed.message().unwrap_or_else(|| body.to_string());

        let rejected = matches!(parsed.error.as_deref(), Some("invalid_grant"))
            || matches!(parsed.error_code.as_deref(), Some("invalid_credentials"));

        if status == reqwest::StatusCode::BAD_REQUEST && rejected {
            AuthError::InvalidCredentials(message)
        } else {
            AuthError::ApiError { message, status }
        }
    }

    /// True when the auth server could not be reached at all.
    pub fn is_network(&self) -> bool {
        matches!(self, AuthError::NetworkError(_))
    }
}

#[derive(Debug, Default, Deserialize)]
struct GoTrueErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl GoTrueErrorBody {
    fn message(&self) -> Option<String> {
        self.error_description
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.message.clone())
            .or_else(|| self.error.clone())
    }
}
