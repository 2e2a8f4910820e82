//! Session state as observed by the UI layer

use crate::error::SessionErrorKind;
use crate::identity::Identity;
use crate::profile::{Profile, ProfileSource, Role};

/// Where the session currently stands
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    /// `start` has not been called yet.
    #[default]
    Uninitialized,
    /// Waiting on the session restore (`identity` is `None`) or on the
    /// profile lookup for a known identity.
    Resolving { identity: Option<Identity> },
    Authenticated {
        identity: Identity,
        profile: Profile,
        source: ProfileSource,
    },
    /// Signed in, but the profile could not be loaded. Role-gated content
    /// must stay hidden.
    AuthenticatedNoProfile { identity: Identity },
    Anonymous,
}

impl SessionState {
    pub fn tag(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Resolving { .. } => "resolving",
            SessionState::Authenticated { .. } => "authenticated",
            SessionState::AuthenticatedNoProfile { .. } => "authenticated-no-profile",
            SessionState::Anonymous => "anonymous",
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Resolving { identity } => identity.as_ref(),
            SessionState::Authenticated { identity, .. }
            | SessionState::AuthenticatedNoProfile { identity } => Some(identity),
            SessionState::Uninitialized | SessionState::Anonymous => None,
        }
    }

    pub fn profile(&self) -> Option<&Profile> {
        match self {
            SessionState::Authenticated { profile, .. } => Some(profile),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            SessionState::Uninitialized | SessionState::Resolving { .. }
        )
    }
}

/// Read-only view of the session handed to subscribers
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Most recent non-fatal problem, cleared by the next clean transition.
    pub last_error: Option<SessionErrorKind>,
    pub(crate) epoch: u64,
}

impl SessionSnapshot {
    /// Counter bumped on every identity transition; resolutions started under
    /// an older epoch are discarded.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.state.identity()
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.state.profile()
    }

    pub fn profile_source(&self) -> Option<ProfileSource> {
        match &self.state {
            SessionState::Authenticated { source, .. } => Some(*source),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    pub fn is_demo(&self) -> bool {
        self.profile().map(|p| p.is_demo).unwrap_or(false)
    }

    pub fn role(&self) -> Option<Role> {
        self.profile().map(|p| p.role)
    }

    /// True only with a resolved profile carrying `role`.
    pub fn has_role(&self, role: Role) -> bool {
        self.role() == Some(role)
    }
}
