// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GoTrue auth service client.
//!
//! Handles:
//! - Password sign-in and refresh-token grants
//! - Remote sign-out
//! - Background token refresh ahead of expiry
//! - Auth-state events on a broadcast channel
//!
//! The session lives in memory only. Offline persistence belongs to the
//! session client's cache, which is written from the events emitted here.

use crate::error::AuthError;
use crate::models::{AuthEvent, Session};
use crate::services::AuthProvider;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Margin before token expiration when we proactively refresh (5 minutes).
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Lower bound on the background refresh delay.
const MIN_REFRESH_DELAY_SECS: i64 = 2;

/// Capacity of the auth event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// GoTrue auth client. Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct GoTrueClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    session: RwLock<Option<Session>>,
    /// Serializes refresh-token grants so a token is never spent twice.
    refresh_lock: Mutex<()>,
    events: broadcast::Sender<AuthEvent>,
    refresher: StdMutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.refresher.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

/// Error body shapes GoTrue uses.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl GoTrueClient {
    /// Create a client for `{supabase_url}/auth/v1`.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Network(format!("HTTP client init failed: {}", e)))?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key: api_key.to_string(),
                session: RwLock::new(None),
                refresh_lock: Mutex::new(()),
                events,
                refresher: StdMutex::new(None),
            }),
        })
    }

    /// Snapshot of the in-memory session without refreshing.
    pub async fn current_session(&self) -> Option<Session> {
        self.inner.session.read().await.clone()
    }

    async fn password_grant(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let url = format!("{}/token?grant_type=password", self.inner.base_url);
        let response = self
            .inner
            .http
            .post(&url)
            .header("apikey", &self.inner.api_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        let session: Session = check_response_json(response).await?;
        Ok(session.normalized())
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let url = format!("{}/token?grant_type=refresh_token", self.inner.base_url);
        let response = self
            .inner
            .http
            .post(&url)
            .header("apikey", &self.inner.api_key)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        let session: Session = check_response_json(response).await?;
        Ok(session.normalized())
    }

    async fn logout_request(&self, access_token: &str) -> Result<(), AuthError> {
        let url = format!("{}/logout", self.inner.base_url);
        let response = self
            .inner
            .http
            .post(&url)
            .header("apikey", &self.inner.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        check_response(response).await
    }

    /// Store a new session, announce it and re-arm the refresh timer.
    async fn install_session(&self, session: Session, event: fn(Session) -> AuthEvent) {
        *self.inner.session.write().await = Some(session.clone());
        self.schedule_refresh(&session);
        // No receivers is fine.
        let _ = self.inner.events.send(event(session));
    }

    fn schedule_refresh(&self, session: &Session) {
        let margin = session.refresh_margin(TOKEN_REFRESH_MARGIN_SECS);
        let delay = (session.expires_at - crate::time_utils::unix_now() - margin)
            .max(MIN_REFRESH_DELAY_SECS) as u64;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let refresh_token = session.refresh_token.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay)).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let client = GoTrueClient { inner };
            tracing::debug!("Auto-refreshing access token");
            if let Err(e) = client.refresh_session(&refresh_token).await {
                tracing::warn!(error = %e, "Background token refresh failed");
            }
        });

        self.replace_refresher(Some(task));
    }

    fn replace_refresher(&self, task: Option<JoinHandle<()>>) {
        let mut slot = match self.inner.refresher.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(old) = std::mem::replace(&mut *slot, task) {
            old.abort();
        }
    }
}

#[async_trait]
impl AuthProvider for GoTrueClient {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let Some(session) = self.current_session().await else {
            return Ok(None);
        };
        if !session.needs_refresh(TOKEN_REFRESH_MARGIN_SECS) {
            return Ok(Some(session));
        }

        tracing::info!(user_id = %session.user.id, "Access token expiring, refreshing");
        self.refresh_session(&session.refresh_token).await.map(Some)
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::NoSession);
        }

        let _guard = self.inner.refresh_lock.lock().await;

        // Another task may have refreshed while we waited.
        if let Some(current) = self.current_session().await {
            if current.refresh_token != refresh_token
                && !current.needs_refresh(TOKEN_REFRESH_MARGIN_SECS)
            {
                return Ok(current);
            }
        }

        match self.refresh_grant(refresh_token).await {
            Ok(session) => {
                tracing::info!(user_id = %session.user.id, "Token refreshed");
                self.install_session(session.clone(), AuthEvent::TokenRefreshed)
                    .await;
                Ok(session)
            }
            Err(e) if e.is_invalid_grant() => {
                tracing::warn!(error = %e, "Refresh token rejected, dropping session");
                let had_session = self.inner.session.write().await.take().is_some();
                self.replace_refresher(None);
                if had_session {
                    let _ = self.inner.events.send(AuthEvent::SignedOut);
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let session = self.password_grant(email, password).await?;
        tracing::info!(user_id = %session.user.id, "Signed in");
        self.install_session(session.clone(), AuthEvent::SignedIn)
            .await;
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let session = self.inner.session.write().await.take();
        self.replace_refresher(None);
        let _ = self.inner.events.send(AuthEvent::SignedOut);

        match session {
            Some(session) => self.logout_request(&session.access_token).await,
            None => Ok(()),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }
}

/// Check response status and return error if not successful.
async fn check_response(response: reqwest::Response) -> Result<(), AuthError> {
    if response.status().is_success() {
        return Ok(());
    }
    Err(rejection(response).await)
}

/// Check response and parse JSON body.
async fn check_response_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, AuthError> {
    if !response.status().is_success() {
        return Err(rejection(response).await);
    }

    response
        .json()
        .await
        .map_err(|e| AuthError::Decode(e.to_string()))
}

async fn rejection(response: reqwest::Response) -> AuthError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();

    let message = parsed
        .error_description
        .or(parsed.msg)
        .or(parsed.message)
        .or(parsed.error)
        .unwrap_or(body);

    if status == 429 {
        tracing::warn!("Auth service rate limit hit (429)");
    }

    AuthError::Rejected { status, message }
}
