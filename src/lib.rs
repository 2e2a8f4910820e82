//! Session and profile resolution for the Lapas application
//!
//! Tracks who is signed in through Supabase Auth, resolves each identity to
//! a row of the `profiles` table, and publishes the combined state for the
//! UI layer. Demo sign-in works without contacting the identity provider.

pub mod config;
pub mod error;
pub mod identity;
pub mod profile;
pub mod session;
pub mod store;
pub mod supabase;

use std::sync::Arc;

use lapas_auth::{Auth, AuthOptions, FileStorage};
use lapas_postgrest::PostgrestClient;
use reqwest::Client;

use crate::config::SessionConfig;
use crate::error::Error;
use crate::session::SessionManager;
use crate::supabase::{PostgrestProfileStore, SupabaseIdentityProvider};

/// The main entry point: wires the Supabase clients into a [`SessionManager`]
pub struct Lapas {
    /// HTTP client shared by the auth and database clients
    pub http_client: Client,
    auth: Arc<Auth>,
    config: SessionConfig,
}

impl Lapas {
    /// Create the backend clients for `config`
    ///
    /// # Example
    ///
    /// ```
    /// use lapas_session::{Lapas, config::SessionConfig};
    ///
    /// let config = SessionConfig::new("https://your-project-url.supabase.co", "your-anon-key").unwrap();
    /// let lapas = Lapas::new(config).unwrap();
    /// ```
    pub fn new(config: SessionConfig) -> Result<Self, Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        let options = AuthOptions {
            auto_refresh_token: config.auto_refresh_token,
            persist_session: config.persist_session,
            ..AuthOptions::default()
        };
        let mut auth = Auth::new(&config.url, &config.anon_key, http_client.clone(), options);
        if let Some(dir) = &config.session_dir {
            auth = auth.with_storage(Arc::new(FileStorage::new(dir.clone())));
        }

        Ok(Self {
            http_client,
            auth: Arc::new(auth),
            config,
        })
    }

    /// Create the backend clients from environment variables
    pub fn from_env() -> Result<Self, Error> {
        Self::new(SessionConfig::from_env()?)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The Supabase Auth client
    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    /// A PostgREST query on `table`, authorized as the signed-in user when
    /// there is one
    pub fn from(&self, table: &str) -> Result<PostgrestClient, Error> {
        let client = PostgrestClient::new(
            &self.config.url,
            &self.config.anon_key,
            table,
            self.http_client.clone(),
        )?;
        match self.auth.session() {
            Some(session) => Ok(client.with_auth(&session.access_token)?),
            None => Ok(client.with_auth(&self.config.anon_key)?),
        }
    }

    pub fn identity_provider(&self) -> SupabaseIdentityProvider {
        SupabaseIdentityProvider::new(Arc::clone(&self.auth))
    }

    pub fn profile_store(&self) -> PostgrestProfileStore {
        PostgrestProfileStore::new(
            &self.config.url,
            &self.config.anon_key,
            &self.config.profiles_table,
            self.http_client.clone(),
            Arc::clone(&self.auth),
        )
    }

    /// A session manager over these clients. Call
    /// [`SessionManager::start`] on it from inside a Tokio runtime.
    pub fn session_manager(&self) -> SessionManager {
        SessionManager::new(
            Arc::new(self.identity_provider()),
            Arc::new(self.profile_store()),
            self.config.clone(),
        )
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::config::{DemoOptions, DemoSource, SessionConfig};
    pub use crate::error::{Error, SessionError, SessionErrorKind};
    pub use crate::identity::{Identity, IdentityProvider};
    pub use crate::profile::{Profile, ProfileFields, ProfilePatch, ProfileSource, Role};
    pub use crate::session::{SessionManager, SessionSnapshot, SessionState};
    pub use crate::store::ProfileStore;
    pub use crate::Lapas;
}
