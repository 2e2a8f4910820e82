//! Configuration options for the session component

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::Error;
use crate::profile::Role;

/// How demo sign-in obtains its profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoSource {
    /// Look up a pre-seeded row in the profiles table by the role's demo email.
    Seeded,
    /// Fabricate identity and profile in memory.
    Synthetic,
}

/// Demo sign-in options
#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub enabled: bool,
    pub source: DemoSource,
    pub admin_email: String,
    pub partner_email: String,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            source: DemoSource::Synthetic,
            admin_email: "admin@lapas.demo".to_string(),
            partner_email: "mitra@company.demo".to_string(),
        }
    }
}

impl DemoOptions {
    pub fn email_for(&self, role: Role) -> &str {
        match role {
            Role::Administrator => &self.admin_email,
            Role::Partner => &self.partner_email,
        }
    }
}

/// Configuration for the session component and its Supabase backend
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The base URL for the Supabase project
    pub url: String,

    /// The anonymous API key for the Supabase project
    pub anon_key: String,

    /// Upper bound on the initial session restore
    pub restore_timeout: Duration,

    /// The HTTP request timeout
    pub request_timeout: Option<Duration>,

    /// Table holding profile rows
    pub profiles_table: String,

    /// Whether to refresh an expired persisted session on restore
    pub auto_refresh_token: bool,

    /// Whether to persist the session between runs
    pub persist_session: bool,

    /// Directory for the persisted session; in memory when unset
    pub session_dir: Option<PathBuf>,

    /// Email used on fallback profiles when the identity has none
    pub fallback_email: String,

    pub demo: DemoOptions,
}

impl SessionConfig {
    /// Creates a new configuration, validating the URL and key.
    pub fn new(url: &str, anon_key: &str) -> Result<Self, Error> {
        Url::parse(url)?;
        if anon_key.is_empty() {
            return Err(Error::config("anon_key cannot be empty"));
        }

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            restore_timeout: Duration::from_secs(10),
            request_timeout: Some(Duration::from_secs(30)),
            profiles_table: "profiles".to_string(),
            auto_refresh_token: true,
            persist_session: true,
            session_dir: None,
            fallback_email: "demo@test.com".to_string(),
            demo: DemoOptions::default(),
        })
    }

    /// Reads the configuration from environment variables.
    ///
    /// `SUPABASE_URL` and `SUPABASE_ANON_KEY` are required. Optional:
    /// `LAPAS_RESTORE_TIMEOUT_SECS`, `LAPAS_DEMO_ENABLED`,
    /// `LAPAS_DEMO_SOURCE` (`seeded` or `synthetic`), `LAPAS_SESSION_DIR`.
    pub fn from_env() -> Result<Self, Error> {
        let url = env::var("SUPABASE_URL")
            .map_err(|_| Error::config("SUPABASE_URL environment variable not found"))?;
        let anon_key = env::var("SUPABASE_ANON_KEY")
            .map_err(|_| Error::config("SUPABASE_ANON_KEY environment variable not found"))?;
        let mut config = Self::new(&url, &anon_key)?;

        if let Ok(secs) = env::var("LAPAS_RESTORE_TIMEOUT_SECS") {
            let secs = secs
                .parse::<u64>()
                .map_err(|_| Error::config(format!("invalid LAPAS_RESTORE_TIMEOUT_SECS: {secs}")))?;
            config.restore_timeout = Duration::from_secs(secs);
        }
        if let Ok(enabled) = env::var("LAPAS_DEMO_ENABLED") {
            config.demo.enabled = parse_bool(&enabled)
                .ok_or_else(|| Error::config(format!("invalid LAPAS_DEMO_ENABLED: {enabled}")))?;
        }
        if let Ok(source) = env::var("LAPAS_DEMO_SOURCE") {
            config.demo.source = parse_demo_source(&source)?;
        }
        if let Ok(dir) = env::var("LAPAS_SESSION_DIR") {
            config.session_dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    /// Set the restore timeout
    pub fn with_restore_timeout(mut self, value: Duration) -> Self {
        self.restore_timeout = value;
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the profiles table
    pub fn with_profiles_table(mut self, value: &str) -> Self {
        self.profiles_table = value.to_string();
        self
    }

    /// Set whether to automatically refresh the token
    pub fn with_auto_refresh_token(mut self, value: bool) -> Self {
        self.auto_refresh_token = value;
        self
    }

    /// Set whether to persist the session
    pub fn with_persist_session(mut self, value: bool) -> Self {
        self.persist_session = value;
        self
    }

    /// Set the directory the session is persisted to
    pub fn with_session_dir(mut self, value: impl Into<PathBuf>) -> Self {
        self.session_dir = Some(value.into());
        self
    }

    /// Set the demo options
    pub fn with_demo(mut self, value: DemoOptions) -> Self {
        self.demo = value;
        self
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_demo_source(value: &str) -> Result<DemoSource, Error> {
    match value.trim().to_ascii_lowercase().as_str() {
        "seeded" => Ok(DemoSource::Seeded),
        "synthetic" => Ok(DemoSource::Synthetic),
        other => Err(Error::config(format!("invalid LAPAS_DEMO_SOURCE: {other}"))),
    }
}
