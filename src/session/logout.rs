// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Logout. Cannot fail from the caller's point of view.

use super::store::AuthStatus;
use super::SessionContext;

/// Result of a logout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutOutcome {
    /// Route the UI should navigate to
    pub redirect_to: String,
    /// Storage keys removed locally
    pub removed_keys: Vec<String>,
    /// Whether the remote sign-out call succeeded
    pub remote_signed_out: bool,
}

pub(crate) async fn run(ctx: &SessionContext) -> LogoutOutcome {
    let ticket = ctx.store.begin();
    ctx.store.clear(ticket, AuthStatus::SignedOut);

    let removed_keys = ctx.purge_storage();

    let remote_signed_out = match ctx.auth.sign_out().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Remote sign-out failed, continuing");
            false
        }
    };

    tracing::info!(
        removed = removed_keys.len(),
        remote_signed_out,
        "Logged out"
    );

    LogoutOutcome {
        redirect_to: ctx.config.login_route.clone(),
        removed_keys,
        remote_signed_out,
    }
}
