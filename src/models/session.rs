// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Auth identity, session credentials and auth-state events.

use crate::time_utils::{is_expiring, unix_now};
use serde::{Deserialize, Serialize};

/// User record owned by the auth service (read-only copy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_confirmed_at: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: Option<&str>) -> Self {
        Self {
            id: id.into(),
            email: email.map(str::to_string),
            email_confirmed_at: None,
        }
    }

    pub fn is_email_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }
}

/// Session credentials as issued by the auth service.
///
/// This is also the exact blob persisted under the local cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds)
    #[serde(default)]
    pub expires_at: i64,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user: Identity,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// Build a session, deriving `expires_at` from `expires_in`.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: i64,
        user: Identity,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: unix_now() + expires_in,
            expires_in,
            token_type: default_token_type(),
            user,
        }
    }

    /// Fill in `expires_at` when the service only sent `expires_in`.
    pub fn normalized(mut self) -> Self {
        if self.expires_at == 0 && self.expires_in > 0 {
            self.expires_at = unix_now() + self.expires_in;
        }
        self
    }

    /// True when the access token expires within `margin_secs`.
    pub fn expires_within(&self, margin_secs: i64) -> bool {
        is_expiring(self.expires_at, margin_secs)
    }

    /// Refresh lead time: `max_margin_secs`, but never more than half the
    /// token lifetime, so a freshly issued short-lived token is not already
    /// due.
    pub fn refresh_margin(&self, max_margin_secs: i64) -> i64 {
        if self.expires_in > 0 {
            max_margin_secs.min(self.expires_in / 2)
        } else {
            max_margin_secs
        }
    }

    /// True when the token is inside its refresh window.
    pub fn needs_refresh(&self, max_margin_secs: i64) -> bool {
        self.expires_within(self.refresh_margin(max_margin_secs))
    }
}

/// Auth-state change pushed by the auth service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "session", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
    InitialSession(Option<Session>),
    UserUpdated(Session),
}

impl AuthEvent {
    /// Wire name of the event (e.g. `SIGNED_IN`).
    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::SignedIn(_) => "SIGNED_IN",
            AuthEvent::SignedOut => "SIGNED_OUT",
            AuthEvent::TokenRefreshed(_) => "TOKEN_REFRESHED",
            AuthEvent::InitialSession(_) => "INITIAL_SESSION",
            AuthEvent::UserUpdated(_) => "USER_UPDATED",
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthEvent::SignedIn(s) | AuthEvent::TokenRefreshed(s) | AuthEvent::UserUpdated(s) => {
                Some(s)
            }
            AuthEvent::InitialSession(s) => s.as_ref(),
            AuthEvent::SignedOut => None,
        }
    }
}
