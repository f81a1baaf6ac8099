// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! PostgREST client wrapper with typed operations.
//!
//! Provides single-table operations on profiles: select by id, insert,
//! update by id, delete by id. Nothing spans tables; keeping a profile in
//! step with role-specific rows is the caller's job.

use crate::db::tables;
use crate::error::AppError;
use crate::models::{Profile, ProfileUpdate};
use crate::time_utils::format_utc_rfc3339;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Relational store client.
#[derive(Clone)]
pub struct RestDb {
    backend: Backend,
}

#[derive(Clone)]
enum Backend {
    Rest(RestClient),
    Memory(Arc<DashMap<String, Profile>>),
    Offline,
}

#[derive(Clone)]
struct RestClient {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl RestDb {
    /// Create a client for `{supabase_url}/rest/v1` authenticated with the
    /// service key.
    pub fn new(base_url: &str, service_key: &str, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Database(format!("Failed to build HTTP client: {}", e)))?;

        tracing::info!(url = base_url, "Using REST profile store");

        Ok(Self {
            backend: Backend::Rest(RestClient {
                http,
                base_url: base_url.trim_end_matches('/').to_string(),
                service_key: service_key.to_string(),
            }),
        })
    }

    /// In-process store for local development and tests.
    pub fn new_in_memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(DashMap::new())),
        }
    }

    /// Create an offline client for testing.
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self {
            backend: Backend::Offline,
        }
    }

    // ─── Profile Operations ──────────────────────────────────────

    /// Get a profile by identity id.
    pub async fn get_profile(&self, id: &str) -> Result<Option<Profile>, AppError> {
        match &self.backend {
            Backend::Rest(rest) => {
                let rows: Vec<Profile> = rest
                    .send(
                        rest.http
                            .get(rest.table_url(tables::PROFILES))
                            .query(&[("id", eq(id)), ("select", "*".to_string())]),
                    )
                    .await?;
                Ok(rows.into_iter().next())
            }
            Backend::Memory(map) => Ok(map.get(id).map(|p| p.clone())),
            Backend::Offline => Err(offline()),
        }
    }

    /// Insert a new profile row.
    pub async fn insert_profile(&self, profile: &Profile) -> Result<Profile, AppError> {
        let mut row = profile.clone();
        let now = format_utc_rfc3339(chrono::Utc::now());
        row.created_at.get_or_insert_with(|| now.clone());
        row.updated_at = Some(now);

        match &self.backend {
            Backend::Rest(rest) => {
                let rows: Vec<Profile> = rest
                    .send(
                        rest.http
                            .post(rest.table_url(tables::PROFILES))
                            .header("Prefer", "return=representation")
                            .json(&row),
                    )
                    .await?;
                rows.into_iter()
                    .next()
                    .ok_or_else(|| AppError::Database("Insert returned no row".to_string()))
            }
            Backend::Memory(map) => {
                if map.contains_key(&row.id) {
                    return Err(AppError::BadRequest(format!(
                        "Profile {} already exists",
                        row.id
                    )));
                }
                map.insert(row.id.clone(), row.clone());
                Ok(row)
            }
            Backend::Offline => Err(offline()),
        }
    }

    /// Update a profile by id. Returns `None` when no row matched.
    pub async fn update_profile(
        &self,
        id: &str,
        update: &ProfileUpdate,
    ) -> Result<Option<Profile>, AppError> {
        let updated_at = format_utc_rfc3339(chrono::Utc::now());

        match &self.backend {
            Backend::Rest(rest) => {
                let mut body = serde_json::to_value(update)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
                body["updated_at"] = serde_json::Value::String(updated_at);

                let rows: Vec<Profile> = rest
                    .send(
                        rest.http
                            .patch(rest.table_url(tables::PROFILES))
                            .query(&[("id", eq(id))])
                            .header("Prefer", "return=representation")
                            .json(&body),
                    )
                    .await?;
                Ok(rows.into_iter().next())
            }
            Backend::Memory(map) => Ok(map.get_mut(id).map(|mut entry| {
                entry.apply(update);
                entry.updated_at = Some(updated_at);
                entry.clone()
            })),
            Backend::Offline => Err(offline()),
        }
    }

    /// Delete a profile by id. Returns whether a row was removed.
    pub async fn delete_profile(&self, id: &str) -> Result<bool, AppError> {
        match &self.backend {
            Backend::Rest(rest) => {
                let rows: Vec<Profile> = rest
                    .send(
                        rest.http
                            .delete(rest.table_url(tables::PROFILES))
                            .query(&[("id", eq(id))])
                            .header("Prefer", "return=representation"),
                    )
                    .await?;
                Ok(!rows.is_empty())
            }
            Backend::Memory(map) => Ok(map.remove(id).is_some()),
            Backend::Offline => Err(offline()),
        }
    }
}

impl RestClient {
    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, AppError> {
        let response = request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(|e| AppError::Database(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Database(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Database(format!("JSON parse error: {}", e)))
    }
}

/// PostgREST equality filter value.
fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

fn offline() -> AppError {
    AppError::Database("Database not connected (offline mode)".to_string())
}
