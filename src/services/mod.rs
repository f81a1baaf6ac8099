// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - external service clients.

pub mod gotrue;
pub mod provider;

pub use gotrue::GoTrueClient;
pub use provider::AuthProvider;
