use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use lapas_auth::{Auth, AuthChangeEvent, AuthError, AuthStateChange, User};
use tracing::debug;

use crate::identity::{
    ChangeEvent, Identity, IdentityChange, IdentityError, IdentityEvents, IdentityProvider,
    IdentitySource,
};

/// [`IdentityProvider`] backed by Supabase Auth (GoTrue)
#[derive(Clone)]
pub struct SupabaseIdentityProvider {
    auth: Arc<Auth>,
}

impl SupabaseIdentityProvider {
    pub fn new(auth: Arc<Auth>) -> Self {
        Self { auth }
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|t| t.with_timezone(&Utc))
}

pub(crate) fn identity_from_user(user: &User) -> Identity {
    Identity {
        id: user.id.clone(),
        email: user.email.clone().filter(|e| !e.is_empty()),
        created_at: parse_timestamp(user.created_at.as_deref()),
        last_sign_in_at: parse_timestamp(user.last_sign_in_at.as_deref()),
        provider: user.provider().map(str::to_string),
        app_metadata: user.app_metadata.clone(),
        source: IdentitySource::Provider,
    }
}

fn change_from(change: AuthStateChange) -> IdentityChange {
    let event = match change.event {
        AuthChangeEvent::SignedIn => ChangeEvent::SignedIn,
        AuthChangeEvent::SignedOut => ChangeEvent::SignedOut,
        AuthChangeEvent::TokenRefreshed => ChangeEvent::TokenRefreshed,
        AuthChangeEvent::UserUpdated => ChangeEvent::UserUpdated,
    };
    IdentityChange {
        event,
        identity: change.session.map(|s| identity_from_user(&s.user)),
    }
}

impl From<AuthError> for IdentityError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials(_) => IdentityError::InvalidCredentials,
            AuthError::NetworkError(e) => IdentityError::Unreachable(e.to_string()),
            other => IdentityError::Provider(other.to_string()),
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentityProvider {
    async fn current_session(&self) -> Result<Option<Identity>, IdentityError> {
        let session = self.auth.get_session().await?;
        Ok(session.map(|s| identity_from_user(&s.user)))
    }

    fn subscribe(&self) -> IdentityEvents {
        let rx = self.auth.on_auth_state_change();
        stream::unfold(rx, |mut rx| async move {
            let change = rx.recv().await?;
            Some((change_from(change), rx))
        })
        .boxed()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let session = self.auth.sign_in_with_password(email, password).await?;
        Ok(identity_from_user(&session.user))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let response = self.auth.sign_up(email, password).await?;
        if response.session.is_none() {
            debug!(identity = %response.user.id, "sign up pending email confirmation");
        }
        Ok(identity_from_user(&response.user))
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        match self.auth.sign_out().await {
            Ok(()) | Err(AuthError::MissingSession) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
