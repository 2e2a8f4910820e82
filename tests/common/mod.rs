//! In-memory identity provider and profile store for session tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use tokio::sync::{mpsc, Semaphore};

use lapas_session::config::SessionConfig;
use lapas_session::identity::{
    ChangeEvent, Identity, IdentityChange, IdentityError, IdentityEvents, IdentityProvider,
};
use lapas_session::profile::{NewProfile, Profile, ProfilePatch, Role};
use lapas_session::session::{SessionManager, SessionSnapshot};
use lapas_session::store::{ProfileStore, StoreError};

pub enum Restore {
    Session(Identity),
    Nothing,
    Fail,
    Hang,
}

pub struct FakeIdentityProvider {
    restore: Mutex<Restore>,
    accounts: Mutex<HashMap<String, (String, Identity)>>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<IdentityChange>>>,
    pub subscribe_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
    pub fail_sign_out: AtomicBool,
}

impl FakeIdentityProvider {
    pub fn new(restore: Restore) -> Arc<Self> {
        Arc::new(Self {
            restore: Mutex::new(restore),
            accounts: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            subscribe_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            fail_sign_out: AtomicBool::new(false),
        })
    }

    pub fn add_account(&self, email: &str, password: &str, identity: Identity) {
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (password.to_string(), identity));
    }

    pub fn emit(&self, event: ChangeEvent, identity: Option<Identity>) {
        let change = IdentityChange { event, identity };
        self.listeners
            .lock()
            .unwrap()
            .retain(|tx| tx.send(change.clone()).is_ok());
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn current_session(&self) -> Result<Option<Identity>, IdentityError> {
        let outcome = match &*self.restore.lock().unwrap() {
            Restore::Session(identity) => Some(Ok(Some(identity.clone()))),
            Restore::Nothing => Some(Ok(None)),
            Restore::Fail => Some(Err(IdentityError::Unreachable("offline".into()))),
            Restore::Hang => None,
        };
        match outcome {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    fn subscribe(&self) -> IdentityEvents {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().unwrap().push(tx);
        stream::unfold(rx, |mut rx| async move {
            let change = rx.recv().await?;
            Some((change, rx))
        })
        .boxed()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let account = self.accounts.lock().unwrap().get(email).cloned();
        match account {
            Some((expected, identity)) if expected == password => {
                self.emit(ChangeEvent::SignedIn, Some(identity.clone()));
                Ok(identity)
            }
            _ => Err(IdentityError::InvalidCredentials),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let identity = Identity::new(format!("new-{email}"), Some(email.to_string()));
        self.add_account(email, password, identity.clone());
        self.emit(ChangeEvent::SignedIn, Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.emit(ChangeEvent::SignedOut, None);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(IdentityError::Unreachable("logout timed out".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeProfileStore {
    profiles: Mutex<HashMap<String, Profile>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    lookups: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
    pub inserted: Mutex<Vec<NewProfile>>,
    pub updated: Mutex<Vec<(String, ProfilePatch)>>,
    pub unreachable: AtomicBool,
}

impl FakeProfileStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(&self, profile: Profile) {
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.user_id.clone(), profile);
    }

    /// Hold lookups for `identity_id` until [`release`](Self::release) is called.
    pub fn hold(&self, identity_id: &str) {
        self.gates
            .lock()
            .unwrap()
            .insert(identity_id.to_string(), Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, identity_id: &str) {
        if let Some(gate) = self.gates.lock().unwrap().get(identity_id) {
            gate.add_permits(1);
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.lock().unwrap().len()
    }

    pub fn completed_for(&self, identity_id: &str) -> usize {
        self.completed
            .lock()
            .unwrap()
            .iter()
            .filter(|id| *id == identity_id)
            .count()
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for FakeProfileStore {
    async fn find_by_identity(&self, identity_id: &str) -> Result<Profile, StoreError> {
        self.lookups.lock().unwrap().push(identity_id.to_string());
        let gate = self.gates.lock().unwrap().get(identity_id).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        let result = self.check_reachable().and_then(|_| {
            self.profiles
                .lock()
                .unwrap()
                .get(identity_id)
                .cloned()
                .ok_or(StoreError::NotFound)
        });
        self.completed.lock().unwrap().push(identity_id.to_string());
        result
    }

    async fn find_demo(&self, email: &str) -> Result<Profile, StoreError> {
        self.check_reachable()?;
        self.profiles
            .lock()
            .unwrap()
            .values()
            .find(|p| p.email == email && p.is_demo)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn insert(&self, new: &NewProfile) -> Result<Profile, StoreError> {
        self.check_reachable()?;
        self.inserted.lock().unwrap().push(new.clone());
        let now = Utc::now();
        let profile = Profile {
            id: format!("row-{}", new.user_id),
            user_id: new.user_id.clone(),
            email: new.email.clone(),
            full_name: new.full_name.clone(),
            role: new.role,
            phone: new.phone.clone(),
            organization: new.organization.clone(),
            is_demo: new.is_demo,
            created_at: now,
            updated_at: now,
        };
        self.put(profile.clone());
        Ok(profile)
    }

    async fn update(&self, identity_id: &str, patch: &ProfilePatch) -> Result<Profile, StoreError> {
        self.check_reachable()?;
        self.updated
            .lock()
            .unwrap()
            .push((identity_id.to_string(), patch.clone()));
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles.get_mut(identity_id).ok_or(StoreError::NotFound)?;
        profile.apply(patch);
        Ok(profile.clone())
    }
}

pub fn profile(user_id: &str, role: Role) -> Profile {
    let now = Utc::now();
    Profile {
        id: format!("row-{user_id}"),
        user_id: user_id.to_string(),
        email: format!("{user_id}@lapas.id"),
        full_name: format!("Petugas {user_id}"),
        role,
        phone: None,
        organization: None,
        is_demo: false,
        created_at: now,
        updated_at: now,
    }
}

pub fn identity(id: &str) -> Identity {
    Identity::new(id, Some(format!("{id}@lapas.id")))
}

pub fn config() -> SessionConfig {
    SessionConfig::new("http://localhost:54321", "anon-key")
        .unwrap()
        .with_restore_timeout(Duration::from_millis(200))
}

pub fn manager(
    provider: &Arc<FakeIdentityProvider>,
    store: &Arc<FakeProfileStore>,
    config: SessionConfig,
) -> SessionManager {
    SessionManager::new(provider.clone(), store.clone(), config)
}

/// Wait until the published snapshot satisfies `pred`.
pub async fn wait_for_state(
    manager: &SessionManager,
    pred: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut rx = manager.subscribe();
    let snapshot = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| pred(s)))
        .await
        .expect("timed out waiting for session state")
        .expect("session channel closed");
    snapshot.clone()
}

/// Give spawned tasks a moment to run.
pub async fn settle_tasks() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
