// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Marketplace auth: session synchronization for the instructor/company
//! marketplace.
//!
//! This crate provides the client-side session controller (bootstrap, auth
//! event handling, profile fetching, logout) and the profile API it talks to.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod session;
pub mod time_utils;

use config::Config;
use db::RestDb;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: RestDb,
}
