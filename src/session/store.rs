// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory session store with version-stamped writes.
//!
//! Every writer takes a [`WriteTicket`] before it starts its (possibly slow)
//! work and commits with it afterwards. A commit whose ticket is older than
//! the last committed one is dropped, so the writer that *started* last
//! wins regardless of completion order.

use crate::models::{Identity, Profile};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::watch;

/// Authentication status as seen by the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    Authenticated,
    SignedOut,
    /// The auth service could not be reached; the user may still be signed in.
    Unreachable { reason: String },
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    /// True until the bootstrap finishes or its fallback timer fires
    pub loading: bool,
    pub status: AuthStatus,
    /// Ticket of the last committed write
    pub version: u64,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            identity: None,
            profile: None,
            loading: true,
            status: AuthStatus::SignedOut,
            version: 0,
        }
    }
}

/// Monotonic write stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WriteTicket(u64);

impl WriteTicket {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Session store shared by the bootstrapper, the event subscriber and logout.
pub struct SessionStore {
    state: watch::Sender<SessionSnapshot>,
    next_ticket: AtomicU64,
    closed: AtomicBool,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            state,
            next_ticket: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Take a ticket for a write that is about to start.
    pub fn begin(&self) -> WriteTicket {
        WriteTicket(self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Whether a write with this ticket would still be accepted.
    pub fn accepts(&self, ticket: WriteTicket) -> bool {
        !self.is_closed() && ticket.0 >= self.state.borrow().version
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Record an authenticated identity. The cached profile is dropped when
    /// the identity changes to a different user.
    pub fn set_identity(&self, ticket: WriteTicket, identity: Identity) -> bool {
        self.commit(ticket, |s| {
            let same_user = s.identity.as_ref().map(|i| i.id.as_str()) == Some(identity.id.as_str());
            if !same_user {
                s.profile = None;
            }
            s.identity = Some(identity);
            s.status = AuthStatus::Authenticated;
            true
        })
    }

    /// Record the profile fetched for `user_id`. Ignored when the store has
    /// moved on to a different identity.
    pub fn set_profile(&self, ticket: WriteTicket, user_id: &str, profile: Option<Profile>) -> bool {
        self.commit(ticket, |s| {
            if s.identity.as_ref().map(|i| i.id.as_str()) != Some(user_id) {
                return false;
            }
            s.profile = profile;
            true
        })
    }

    /// Drop identity and profile.
    pub fn clear(&self, ticket: WriteTicket, status: AuthStatus) -> bool {
        self.commit(ticket, |s| {
            s.identity = None;
            s.profile = None;
            s.status = status;
            true
        })
    }

    /// Mark initialization complete. Not versioned: it only ever flips once.
    pub fn finish_loading(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        self.state.send_if_modified(|s| std::mem::replace(&mut s.loading, false))
    }

    /// Stop accepting writes.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn commit(&self, ticket: WriteTicket, apply: impl FnOnce(&mut SessionSnapshot) -> bool) -> bool {
        if self.is_closed() {
            tracing::debug!(ticket = ticket.0, "Store closed, dropping write");
            return false;
        }
        self.state.send_if_modified(|s| {
            if ticket.0 < s.version {
                tracing::debug!(
                    ticket = ticket.0,
                    version = s.version,
                    "Discarding stale session write"
                );
                return false;
            }
            if !apply(s) {
                return false;
            }
            s.version = ticket.0;
            true
        })
    }
}
