//! GoTrue (Supabase Auth) client for the Lapas session component
//!
//! This crate covers the subset of the auth API the session component needs:
//! password sign up / sign in, session persistence and restore, token
//! refresh, sign out, and an ordered auth-state-change subscription.

mod error;
pub mod jwt;
mod storage;
mod types;

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, warn};
use reqwest::Client;
use tokio::sync::mpsc;

pub use error::AuthError;
pub use storage::{FileStorage, MemoryStorage, SessionStorage};
pub use types::*;

/// Sessions this close to expiry are refreshed before being handed out.
const EXPIRY_MARGIN_SECS: i64 = 10;

/// Receiving half of [`Auth::on_auth_state_change`]. Dropping it unsubscribes.
pub type AuthSubscription = mpsc::UnboundedReceiver<AuthStateChange>;

/// Auth クライアント
pub struct Auth {
    url: String,
    key: String,
    http_client: Client,
    options: AuthOptions,
    current_session: Arc<RwLock<Option<Session>>>,
    storage: Arc<dyn SessionStorage>,
    listeners: Arc<Mutex<Vec<mpsc::UnboundedSender<AuthStateChange>>>>,
}

impl Auth {
    /// 新しい Auth クライアントを作成
    pub fn new(url: &str, key: &str, http_client: Client, options: AuthOptions) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            http_client,
            options,
            current_session: Arc::new(RwLock::new(None)),
            storage: Arc::new(MemoryStorage::new()),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// セッションの保存先を差し替える
    pub fn with_storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn options(&self) -> &AuthOptions {
        &self.options
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.url, path)
    }

    /// 認証状態の変更を購読
    ///
    /// Every subscriber receives every event in the order it was emitted.
    pub fn on_auth_state_change(&self) -> AuthSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    fn notify(&self, event: AuthChangeEvent, session: Option<Session>) {
        let change = AuthStateChange { event, session };
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        // Closed receivers are dropped here, which is how unsubscribe works.
        listeners.retain(|tx| tx.send(change.clone()).is_ok());
        debug!("auth event {:?} delivered to {} subscriber(s)", event, listeners.len());
    }

    /// ユーザー登録
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });

        let body: serde_json::Value = self.post_json(&self.endpoint("/signup"), &payload).await?;

        if body.get("access_token").is_some() {
            let session: Session = serde_json::from_value(body)?;
            let session = self.save_session(session)?;
            self.notify(AuthChangeEvent::SignedIn, Some(session.clone()));
            Ok(AuthResponse {
                user: session.user.clone(),
                session: Some(session),
            })
        } else {
            let user: User = serde_json::from_value(body)?;
            Ok(AuthResponse {
                user,
                session: None,
            })
        }
    }

    /// メール・パスワードでログイン
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });

        let session: Session = self
            .post_json(&self.endpoint("/token?grant_type=password"), &payload)
            .await?;
        let session = self.save_session(session)?;
        self.notify(AuthChangeEvent::SignedIn, Some(session.clone()));

        Ok(session)
    }

    /// メモリ上の現在のセッション
    pub fn session(&self) -> Option<Session> {
        self.current_session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 現在のセッションを取得（必要なら永続化ストレージから復元）
    ///
    /// A stored session whose access token is not a decodable JWT is thrown
    /// away. An expired one is refreshed when `auto_refresh_token` is set and
    /// discarded otherwise.
    pub async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let session = match self.session() {
            Some(session) => Some(session),
            None => self.load_persisted()?,
        };
        let Some(session) = session else {
            return Ok(None);
        };

        if let Err(e) = jwt::decode_claims(&session.access_token) {
            warn!("discarding stored session with unreadable access token: {}", e);
            self.clear_local()?;
            return Ok(None);
        }

        if session.expires_within(EXPIRY_MARGIN_SECS) {
            if !self.options.auto_refresh_token {
                debug!("stored session expired and auto refresh is off");
                self.clear_local()?;
                return Ok(None);
            }
            return match self.refresh_with(&session.refresh_token).await {
                Ok(session) => Ok(Some(session)),
                Err(e) => {
                    // A network failure keeps the stored token for the next attempt.
                    if !e.is_network() {
                        self.clear_local()?;
                    }
                    Err(e)
                }
            };
        }

        self.set_current(Some(session.clone()));
        Ok(Some(session))
    }

    /// 現在のユーザーを取得
    pub async fn get_user(&self) -> Result<User, AuthError> {
        let session = self.session().ok_or(AuthError::MissingSession)?;

        let response = self
            .http_client
            .get(self.endpoint("/user"))
            .header("apikey", &self.key)
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(AuthError::from_response(status, &error_text));
        }

        Ok(response.json().await?)
    }

    /// セッションをリフレッシュ
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let session = match self.session() {
            Some(session) => session,
            None => self.load_persisted()?.ok_or(AuthError::MissingSession)?,
        };
        self.refresh_with(&session.refresh_token).await
    }

    async fn refresh_with(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let payload = serde_json::json!({
            "refresh_token": refresh_token,
        });

        let session: Session = self
            .post_json(&self.endpoint("/token?grant_type=refresh_token"), &payload)
            .await?;
        let session = self.save_session(session)?;
        self.notify(AuthChangeEvent::TokenRefreshed, Some(session.clone()));

        Ok(session)
    }

    /// サインアウト
    ///
    /// The local session is cleared and `SignedOut` emitted even when the
    /// logout request fails; the request error is still returned.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let session = match self.session() {
            Some(session) => session,
            None => self.load_persisted()?.ok_or(AuthError::MissingSession)?,
        };

        let revoke = self.revoke(&session.access_token).await;
        if let Err(e) = &revoke {
            warn!("logout request failed, clearing local session anyway: {}", e);
        }

        self.clear_local()?;
        self.notify(AuthChangeEvent::SignedOut, None);

        revoke
    }

    async fn revoke(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .http_client
            .post(self.endpoint("/logout"))
            .header("apikey", &self.key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(AuthError::from_response(status, &error_text));
        }
        Ok(())
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<T, AuthError> {
        let response = self
            .http_client
            .post(url)
            .header("apikey", &self.key)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(AuthError::from_response(status, &error_text));
        }

        Ok(response.json().await?)
    }

    fn set_current(&self, session: Option<Session>) {
        let mut write_guard = self
            .current_session
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *write_guard = session;
    }

    fn save_session(&self, session: Session) -> Result<Session, AuthError> {
        let session = session.stamped();
        self.set_current(Some(session.clone()));

        if self.options.persist_session {
            let serialized = serde_json::to_string(&session)?;
            self.storage.store(&self.options.storage_key, &serialized)?;
        }
        Ok(session)
    }

    fn load_persisted(&self) -> Result<Option<Session>, AuthError> {
        if !self.options.persist_session {
            return Ok(None);
        }
        let Some(raw) = self.storage.load(&self.options.storage_key)? else {
            return Ok(None);
        };
        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!("discarding unreadable stored session: {}", e);
                self.storage.remove(&self.options.storage_key)?;
                Ok(None)
            }
        }
    }

    fn clear_local(&self) -> Result<(), AuthError> {
        self.set_current(None);
        if self.options.persist_session {
            self.storage.remove(&self.options.storage_key)?;
        }
        Ok(())
    }
}
