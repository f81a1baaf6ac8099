// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Auth event subscriber.

use super::store::AuthStatus;
use super::SessionContext;
use crate::models::AuthEvent;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

/// Apply events until the channel closes or the store is torn down.
///
/// Events are handled one at a time, in delivery order.
pub(crate) async fn run(ctx: Arc<SessionContext>, mut events: broadcast::Receiver<AuthEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if ctx.store.is_closed() {
                    break;
                }
                handle(&ctx, event).await;
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Auth event subscriber lagged");
            }
            Err(RecvError::Closed) => {
                tracing::debug!("Auth event channel closed");
                break;
            }
        }
    }
}

pub(crate) async fn handle(ctx: &SessionContext, event: AuthEvent) {
    tracing::debug!(event = event.name(), "Auth state changed");

    match event {
        AuthEvent::SignedIn(session)
        | AuthEvent::TokenRefreshed(session)
        | AuthEvent::InitialSession(Some(session)) => {
            let ticket = ctx.store.begin();
            ctx.populate(ticket, &session).await;
        }
        AuthEvent::UserUpdated(session) => {
            let ticket = ctx.store.begin();
            ctx.install(ticket, &session);
        }
        AuthEvent::SignedOut => {
            let ticket = ctx.store.begin();
            ctx.store.clear(ticket, AuthStatus::SignedOut);
            let removed = ctx.purge_storage();
            tracing::info!(removed = removed.len(), "Signed out, local auth state cleared");
        }
        AuthEvent::InitialSession(None) => {}
    }
}
