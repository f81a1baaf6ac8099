// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session bootstrap: restore an existing session once at startup.

use super::store::AuthStatus;
use super::SessionContext;
use crate::error::AuthError;

/// How the bootstrap ended.
#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapOutcome {
    /// The auth service already had a session.
    Restored,
    /// The cached refresh token produced a new session.
    Recovered,
    /// Nobody is signed in.
    NoSession,
    Failed(AuthError),
}

/// Run the bootstrap. Always ends with `loading = false`.
pub(crate) async fn run(ctx: &SessionContext) -> BootstrapOutcome {
    let ticket = ctx.store.begin();

    let outcome = match ctx.auth.get_session().await {
        Ok(Some(session)) => {
            tracing::info!(user_id = %session.user.id, "Existing session restored");
            ctx.populate(ticket, &session).await;
            BootstrapOutcome::Restored
        }
        Ok(None) => recover(ctx, ticket).await,
        Err(e) => {
            tracing::warn!(error = %e, "Session lookup failed");
            ctx.store.clear(ticket, status_for(&e));
            BootstrapOutcome::Failed(e)
        }
    };

    ctx.store.finish_loading();
    outcome
}

/// One refresh attempt with the cached refresh token.
async fn recover(ctx: &SessionContext, ticket: super::store::WriteTicket) -> BootstrapOutcome {
    let cached = match ctx.cache.load() {
        Some(cached) if !cached.refresh_token.is_empty() => cached,
        Some(_) => {
            ctx.cache.invalidate();
            ctx.store.clear(ticket, AuthStatus::SignedOut);
            return BootstrapOutcome::NoSession;
        }
        None => {
            tracing::debug!("No session and no cached credentials");
            ctx.store.clear(ticket, AuthStatus::SignedOut);
            return BootstrapOutcome::NoSession;
        }
    };

    tracing::info!(user_id = %cached.user.id, "Recovering session from cached refresh token");

    match ctx.auth.refresh_session(&cached.refresh_token).await {
        Ok(session) => {
            // The refresh announces TOKEN_REFRESHED; the subscriber fetches
            // the profile for it.
            ctx.install(ticket, &session);
            BootstrapOutcome::Recovered
        }
        Err(e) => {
            tracing::warn!(error = %e, "Session recovery failed");
            ctx.cache.invalidate();
            ctx.store.clear(ticket, status_for(&e));
            BootstrapOutcome::Failed(e)
        }
    }
}

fn status_for(err: &AuthError) -> AuthStatus {
    if err.is_unreachable() {
        AuthStatus::Unreachable {
            reason: err.to_string(),
        }
    } else {
        AuthStatus::SignedOut
    }
}
