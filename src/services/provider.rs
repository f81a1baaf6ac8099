// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Auth service seam used by the session client.

use crate::error::AuthError;
use crate::models::{AuthEvent, Session};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Hosted auth service as seen by the session client.
///
/// Implementations own the live session and push [`AuthEvent`]s in
/// occurrence order on a single channel.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Current session, refreshed first if it is about to expire.
    async fn get_session(&self) -> Result<Option<Session>, AuthError>;

    /// Exchange a refresh token for a new session. Success is announced
    /// as `TOKEN_REFRESHED`.
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError>;

    /// Password grant.
    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<Session, AuthError>;

    /// Revoke the session remotely. The local session is dropped even when
    /// the remote call fails.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Subscribe to auth-state changes.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}
