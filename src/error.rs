//! Error handling for the Lapas session component

use std::fmt;
use thiserror::Error;

use crate::identity::IdentityError;
use crate::store::StoreError;

/// Errors raised while configuring or wiring the backend clients
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database client errors
    #[error("Database error: {0}")]
    Database(#[from] lapas_postgrest::PostgrestError),
}

impl Error {
    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }
}

/// Tag identifying a session problem, suitable for choosing a user-facing
/// message. `SessionRestore` and `ProfileNotFound` only ever appear as
/// [`SessionSnapshot::last_error`](crate::session::SessionSnapshot::last_error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionErrorKind {
    SessionRestore,
    CredentialRejected,
    ProfileNotFound,
    ProfileFetch,
    ProfileCreate,
    ProfileUpdate,
    DemoAccountMissing,
    DemoDisabled,
    NotSignedIn,
    Provider,
}

/// Failure of a session operation.
///
/// Session state is always left in a consistent state when one of these is
/// returned; the caller decides what to show.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("email or password was rejected")]
    CredentialRejected,

    #[error("profile could not be loaded: {0}")]
    ProfileFetch(#[source] StoreError),

    #[error("profile could not be created: {0}")]
    ProfileCreate(#[source] StoreError),

    #[error("profile could not be updated: {0}")]
    ProfileUpdate(#[source] StoreError),

    #[error("demo account is not available")]
    DemoAccountMissing,

    #[error("demo sign-in is disabled")]
    DemoDisabled,

    #[error("no user is signed in")]
    NotSignedIn,

    #[error("identity provider error: {0}")]
    Provider(#[source] IdentityError),
}

impl SessionError {
    pub fn kind(&self) -> SessionErrorKind {
        match self {
            SessionError::CredentialRejected => SessionErrorKind::CredentialRejected,
            SessionError::ProfileFetch(_) => SessionErrorKind::ProfileFetch,
            SessionError::ProfileCreate(_) => SessionErrorKind::ProfileCreate,
            SessionError::ProfileUpdate(_) => SessionErrorKind::ProfileUpdate,
            SessionError::DemoAccountMissing => SessionErrorKind::DemoAccountMissing,
            SessionError::DemoDisabled => SessionErrorKind::DemoDisabled,
            SessionError::NotSignedIn => SessionErrorKind::NotSignedIn,
            SessionError::Provider(_) => SessionErrorKind::Provider,
        }
    }
}

impl From<IdentityError> for SessionError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidCredentials => SessionError::CredentialRejected,
            other => SessionError::Provider(other),
        }
    }
}
