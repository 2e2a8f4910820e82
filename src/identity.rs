//! Authenticated principals and the identity provider seam

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use thiserror::Error;

/// How an [`Identity`] came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// Issued by the identity provider.
    Provider,
    /// Fabricated locally by demo sign-in; the provider knows nothing about it.
    Demo,
}

/// Read-only copy of an authenticated principal
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub id: String,
    pub email: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
    /// Sign-in method reported by the provider (`email`, `google`, ...).
    pub provider: Option<String>,
    pub app_metadata: serde_json::Value,
    pub source: IdentitySource,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            id: id.into(),
            email,
            created_at: None,
            last_sign_in_at: None,
            provider: None,
            app_metadata: serde_json::Value::Null,
            source: IdentitySource::Provider,
        }
    }

    pub fn is_demo(&self) -> bool {
        self.source == IdentitySource::Demo
    }
}

/// Why the provider's session changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// One session change as emitted by the provider
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityChange {
    pub event: ChangeEvent,
    pub identity: Option<Identity>,
}

/// Ordered stream of session changes. Dropping it unsubscribes.
pub type IdentityEvents = BoxStream<'static, IdentityChange>;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("identity provider unreachable: {0}")]
    Unreachable(String),

    #[error("identity provider error: {0}")]
    Provider(String),
}

/// External identity service the session tracker observes
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The persisted session, if there is one.
    async fn current_session(&self) -> Result<Option<Identity>, IdentityError>;

    /// Subscribe to session changes. Events arrive in emission order.
    fn subscribe(&self) -> IdentityEvents;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, IdentityError>;

    async fn sign_out(&self) -> Result<(), IdentityError>;
}
