// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Marketplace profile API server.
//!
//! Serves `/api/profile` for the session client, authenticating callers
//! with access tokens issued by the hosted auth service.

use marketplace_auth::{config::Config, db::RestDb, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting marketplace profile API");

    let db = match &config.supabase_service_key {
        Some(key) => RestDb::new(&config.rest_url(), key, config.http_timeout)?,
        None => {
            tracing::warn!("SUPABASE_SERVICE_KEY not set, using in-memory profile store");
            RestDb::new_in_memory()
        }
    };

    let state = Arc::new(AppState {
        config: config.clone(),
        db,
    });

    let app = marketplace_auth::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("marketplace_auth=debug,info"));

    tracing_subscriber::registry().with(filter).with(format).init();
}
