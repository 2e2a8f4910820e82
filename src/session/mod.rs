//! Session tracking and profile resolution
//!
//! [`SessionManager`] follows the identity provider's session, resolves a
//! [`Profile`] for every new identity, and publishes the result as a
//! [`SessionSnapshot`] on a `watch` channel.
//!
//! All state changes go through one `watch::Sender`, whose lock serializes
//! them. Each identity transition bumps the snapshot epoch; a profile lookup
//! commits only if the epoch it started under is still current, so a slow
//! lookup for an older identity can never overwrite a newer one.

mod demo;
mod resolver;
mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{DemoSource, SessionConfig};
use crate::error::{SessionError, SessionErrorKind};
use crate::identity::{ChangeEvent, Identity, IdentityChange, IdentityEvents, IdentityProvider};
use crate::profile::{NewProfile, Profile, ProfileFields, ProfilePatch, ProfileSource, Role};
use crate::store::ProfileStore;

pub use resolver::{ProfileResolver, Resolution};
pub use state::{SessionSnapshot, SessionState};

/// Owns the session state for one application instance.
///
/// Call [`start`](Self::start) once from inside a Tokio runtime. Dropping the
/// manager unsubscribes from the provider and stops all further updates.
pub struct SessionManager {
    inner: Arc<Inner>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn ProfileStore>,
    resolver: ProfileResolver,
    config: SessionConfig,
    state: watch::Sender<SessionSnapshot>,
    alive: AtomicBool,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn ProfileStore>,
        config: SessionConfig,
    ) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        let resolver = ProfileResolver::new(Arc::clone(&store), config.fallback_email.clone());

        Self {
            inner: Arc::new(Inner {
                provider,
                store,
                resolver,
                config,
                state,
                alive: AtomicBool::new(true),
            }),
            listener: Mutex::new(None),
        }
    }

    /// Subscribe to provider events and restore any persisted session.
    ///
    /// The subscription is taken before the restore begins so no event is
    /// missed. Calling this more than once has no effect.
    pub fn start(&self) {
        let mut listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        if listener.is_some() || !self.inner.is_alive() {
            return;
        }

        let events = self.inner.provider.subscribe();
        let Some(epoch) = self
            .inner
            .commit_state(None, SessionState::Resolving { identity: None }, None)
        else {
            return;
        };

        let inner = Arc::clone(&self.inner);
        *listener = Some(tokio::spawn(inner.run(events, epoch)));
    }

    /// Stop following the provider. No state changes are published afterwards.
    pub fn shutdown(&self) {
        if let Some(handle) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        // Flipped under the state lock so no commit can interleave; waiters
        // are woken to notice.
        let alive = &self.inner.alive;
        self.inner
            .state
            .send_modify(|_| alive.store(false, Ordering::SeqCst));
        debug!("session manager shut down");
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    /// Wait until the session is neither uninitialized nor resolving.
    ///
    /// Returns the current snapshot right away if [`start`](Self::start) has
    /// not been called, and as soon as the manager is shut down.
    pub async fn wait_until_settled(&self) -> SessionSnapshot {
        self.wait_until(|snapshot| !snapshot.is_loading()).await
    }

    /// Wait until the session has settled on the identity `identity_id`.
    ///
    /// Use after [`sign_in`](Self::sign_in): the sign-in returns before the
    /// provider's event has been processed, so the session may still show
    /// the previous state for a moment.
    pub async fn wait_for_identity(&self, identity_id: &str) -> SessionSnapshot {
        self.wait_until(|snapshot| {
            !snapshot.is_loading()
                && snapshot
                    .identity()
                    .is_some_and(|identity| identity.id == identity_id)
        })
        .await
    }

    async fn wait_until(&self, pred: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
        let started = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        if !started {
            return self.snapshot();
        }

        let inner = &self.inner;
        let mut rx = self.subscribe();
        let settled = match rx
            .wait_for(|snapshot| pred(snapshot) || !inner.is_alive())
            .await
        {
            Ok(snapshot) => Some(snapshot.clone()),
            Err(_) => None,
        };
        settled.unwrap_or_else(|| self.snapshot())
    }

    /// Sign in with email and password.
    ///
    /// Session state is not touched here; it follows from the provider's
    /// `SignedIn` event. A rejected sign-in leaves the state as it was.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, SessionError> {
        match self.inner.provider.sign_in(email, password).await {
            Ok(identity) => {
                info!(identity = %identity.id, "signed in");
                Ok(identity)
            }
            Err(e) => {
                warn!(error = %e, "sign in failed");
                Err(e.into())
            }
        }
    }

    /// Sign out. Local state is cleared even if the provider call fails.
    ///
    /// Demo sessions never reach the provider.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        let demo = self
            .snapshot()
            .identity()
            .map(Identity::is_demo)
            .unwrap_or(false);

        self.inner.commit_state(None, SessionState::Anonymous, None);
        if demo {
            info!("demo session ended");
            return Ok(());
        }

        self.inner.provider.sign_out().await.map_err(|e| {
            warn!(error = %e, "provider sign out failed, local session already cleared");
            SessionError::Provider(e)
        })
    }

    /// Enter demo mode as `role` without contacting the identity provider.
    pub async fn sign_in_demo(&self, role: Role) -> Result<Profile, SessionError> {
        let options = &self.inner.config.demo;
        if !options.enabled {
            return Err(SessionError::DemoDisabled);
        }

        let (identity, profile, source) = match options.source {
            DemoSource::Synthetic => {
                let (identity, profile) = demo::synthesize(role, options);
                (identity, profile, ProfileSource::SyntheticDemo)
            }
            DemoSource::Seeded => {
                let email = options.email_for(role);
                let profile = self.inner.store.find_demo(email).await.map_err(|e| {
                    warn!(%email, error = %e, "demo account lookup failed");
                    SessionError::DemoAccountMissing
                })?;
                if !profile.is_demo || profile.role != role {
                    warn!(%email, "seeded row is not a demo profile for {}", role);
                    return Err(SessionError::DemoAccountMissing);
                }
                (demo::identity_for(&profile), profile, ProfileSource::SeededDemo)
            }
        };

        info!(identity = %identity.id, %role, "demo sign in");
        self.inner.commit_state(
            None,
            SessionState::Authenticated {
                identity,
                profile: profile.clone(),
                source,
            },
            None,
        );
        Ok(profile)
    }

    /// Register a new account and create its profile row.
    ///
    /// If the provider's sign-in event already put this identity in the
    /// session, the freshly inserted row replaces whatever the resolver found.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        fields: ProfileFields,
    ) -> Result<Profile, SessionError> {
        let identity = self.inner.provider.sign_up(email, password).await.map_err(|e| {
            warn!(error = %e, "sign up failed");
            SessionError::from(e)
        })?;

        let new_profile = NewProfile::from_fields(&identity.id, email, fields);
        let profile = self.inner.store.insert(&new_profile).await.map_err(|e| {
            error!(identity = %identity.id, error = %e, "creating profile failed");
            SessionError::ProfileCreate(e)
        })?;

        if self.inner.adopt_profile(&identity.id, profile.clone()) {
            debug!(identity = %identity.id, "adopted newly created profile");
        }
        Ok(profile)
    }

    /// Update the signed-in profile.
    ///
    /// Stored profiles are patched in the profiles table; fallback and
    /// synthetic demo profiles only change in memory. An empty patch returns
    /// the current profile untouched.
    pub async fn update_profile(&self, patch: ProfilePatch) -> Result<Profile, SessionError> {
        let snapshot = self.snapshot();
        let SessionState::Authenticated {
            identity,
            profile,
            source,
        } = snapshot.state
        else {
            return Err(SessionError::NotSignedIn);
        };
        if patch.is_empty() {
            return Ok(profile);
        }

        let updated = if source.is_persisted() {
            self.inner
                .store
                .update(&profile.user_id, &patch)
                .await
                .map_err(|e| {
                    error!(identity = %identity.id, error = %e, "profile update failed");
                    SessionError::ProfileUpdate(e)
                })?
        } else {
            let mut profile = profile;
            profile.apply(&patch);
            profile
        };

        self.inner.replace_profile(snapshot.epoch, updated.clone());
        Ok(updated)
    }

    /// Look the profile up again, e.g. to retry after a failed lookup.
    pub async fn reload_profile(&self) -> Result<Profile, SessionError> {
        let snapshot = self.snapshot();
        let identity = match snapshot.state {
            SessionState::Authenticated {
                identity, profile, ..
            } if identity.is_demo() => {
                return Ok(profile);
            }
            SessionState::Authenticated { identity, .. }
            | SessionState::AuthenticatedNoProfile { identity } => identity,
            _ => return Err(SessionError::NotSignedIn),
        };

        let resolution = self.inner.resolver.resolve(&identity).await;
        let result = match &resolution {
            Resolution::Found(profile) | Resolution::Fallback(profile) => Ok(profile.clone()),
            Resolution::Failed(e) => Err(SessionError::ProfileFetch(e.clone())),
        };

        let (state, error) = settle(identity, resolution);
        self.inner.commit_state(Some(snapshot.epoch), state, error);
        result
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The state a finished resolution leads to.
fn settle(identity: Identity, resolution: Resolution) -> (SessionState, Option<SessionErrorKind>) {
    match resolution {
        Resolution::Found(profile) => (
            SessionState::Authenticated {
                identity,
                profile,
                source: ProfileSource::Stored,
            },
            None,
        ),
        Resolution::Fallback(profile) => (
            SessionState::Authenticated {
                identity,
                profile,
                source: ProfileSource::Fallback,
            },
            Some(SessionErrorKind::ProfileNotFound),
        ),
        Resolution::Failed(_) => (
            SessionState::AuthenticatedNoProfile { identity },
            Some(SessionErrorKind::ProfileFetch),
        ),
    }
}

impl Inner {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Run `modify` under the state lock unless the manager is shut down.
    fn publish(&self, modify: impl FnOnce(&mut SessionSnapshot) -> bool) -> bool {
        self.state.send_if_modified(|snapshot| {
            if !self.is_alive() {
                return false;
            }
            modify(snapshot)
        })
    }

    /// Replace the state and bump the epoch. With `expected` set, only
    /// commits if the epoch is still `expected`. Returns the new epoch.
    fn commit_state(
        &self,
        expected: Option<u64>,
        state: SessionState,
        error: Option<SessionErrorKind>,
    ) -> Option<u64> {
        let mut committed = None;
        self.publish(|snapshot| {
            if expected.is_some_and(|epoch| epoch != snapshot.epoch) {
                return false;
            }
            snapshot.epoch += 1;
            debug!(
                from = snapshot.state.tag(),
                to = state.tag(),
                epoch = snapshot.epoch,
                "session transition"
            );
            snapshot.state = state;
            snapshot.last_error = error;
            committed = Some(snapshot.epoch);
            true
        });
        committed
    }

    /// Swap the profile of an authenticated session in place, keeping the epoch.
    fn replace_profile(&self, epoch: u64, profile: Profile) -> bool {
        self.publish(|snapshot| {
            if snapshot.epoch != epoch {
                return false;
            }
            match &mut snapshot.state {
                SessionState::Authenticated { profile: current, .. } => {
                    *current = profile;
                    true
                }
                _ => false,
            }
        })
    }

    /// Commit a newly created profile if the session is on its identity.
    fn adopt_profile(&self, identity_id: &str, profile: Profile) -> bool {
        self.publish(|snapshot| {
            let identity = match &snapshot.state {
                SessionState::Resolving {
                    identity: Some(identity),
                }
                | SessionState::Authenticated { identity, .. }
                | SessionState::AuthenticatedNoProfile { identity }
                    if identity.id == identity_id && !identity.is_demo() =>
                {
                    identity.clone()
                }
                _ => return false,
            };
            snapshot.epoch += 1;
            snapshot.state = SessionState::Authenticated {
                identity,
                profile,
                source: ProfileSource::Stored,
            };
            snapshot.last_error = None;
            true
        })
    }

    /// Refresh the cached identity when the provider re-announces the one
    /// already in the session. Returns false if the session is elsewhere.
    fn refresh_identity(&self, identity: &Identity) -> bool {
        self.publish(|snapshot| match &mut snapshot.state {
            SessionState::Authenticated {
                identity: current, ..
            }
            | SessionState::AuthenticatedNoProfile { identity: current }
                if current.id == identity.id && !current.is_demo() =>
            {
                *current = identity.clone();
                true
            }
            _ => false,
        })
    }

    async fn run(self: Arc<Self>, mut events: IdentityEvents, epoch: u64) {
        let restore = self.restore(epoch);
        tokio::pin!(restore);
        let mut restoring = true;

        loop {
            tokio::select! {
                _ = &mut restore, if restoring => restoring = false,
                change = events.next() => match change {
                    Some(change) => {
                        if !self.is_alive() {
                            break;
                        }
                        self.apply_change(change);
                    }
                    None => {
                        if restoring {
                            (&mut restore).await;
                        }
                        debug!("identity event stream closed");
                        break;
                    }
                },
            }
        }
    }

    async fn restore(self: &Arc<Self>, epoch: u64) {
        let restored =
            tokio::time::timeout(self.config.restore_timeout, self.provider.current_session())
                .await;

        match restored {
            Ok(Ok(Some(identity))) => {
                info!(identity = %identity.id, "restored session");
                self.begin_resolve(Some(epoch), identity);
            }
            Ok(Ok(None)) => {
                debug!("no session to restore");
                self.commit_state(Some(epoch), SessionState::Anonymous, None);
            }
            Ok(Err(e)) => {
                warn!(error = %e, "session restore failed, continuing signed out");
                self.commit_state(
                    Some(epoch),
                    SessionState::Anonymous,
                    Some(SessionErrorKind::SessionRestore),
                );
            }
            Err(_) => {
                warn!(
                    timeout = ?self.config.restore_timeout,
                    "session restore timed out, continuing signed out"
                );
                self.commit_state(
                    Some(epoch),
                    SessionState::Anonymous,
                    Some(SessionErrorKind::SessionRestore),
                );
            }
        }
    }

    fn apply_change(self: &Arc<Self>, change: IdentityChange) {
        debug!(event = ?change.event, "identity change");
        match change.identity {
            None => {
                self.commit_state(None, SessionState::Anonymous, None);
            }
            Some(identity) => {
                let same_session =
                    matches!(change.event, ChangeEvent::TokenRefreshed | ChangeEvent::UserUpdated);
                if same_session && self.refresh_identity(&identity) {
                    return;
                }
                self.begin_resolve(None, identity);
            }
        }
    }

    /// Move to `Resolving` for `identity` and look its profile up in the
    /// background. The result is dropped if the session moved on meanwhile.
    fn begin_resolve(self: &Arc<Self>, expected: Option<u64>, identity: Identity) {
        let Some(epoch) = self.commit_state(
            expected,
            SessionState::Resolving {
                identity: Some(identity.clone()),
            },
            None,
        ) else {
            debug!(identity = %identity.id, "session moved on, not resolving");
            return;
        };

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let resolution = inner.resolver.resolve(&identity).await;
            let id = identity.id.clone();
            let (state, error) = settle(identity, resolution);
            if inner.commit_state(Some(epoch), state, error).is_none() {
                debug!(identity = %id, "discarding stale profile resolution");
            }
        });
    }
}
