// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile fetcher: one `GET /api/profile` per call, no retry.

use crate::error::AuthError;
use crate::models::{Identity, Profile, ProfileEnvelope};
use crate::services::AuthProvider;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a profile fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileFetch {
    Loaded(Profile),
    /// No session or access token available.
    NoToken,
    /// Non-2xx, or a 2xx body with `success: false`.
    Rejected { status: u16 },
    /// Transport or decode failure.
    Unreachable(String),
}

impl ProfileFetch {
    pub fn profile(&self) -> Option<&Profile> {
        match self {
            ProfileFetch::Loaded(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn into_profile(self) -> Option<Profile> {
        match self {
            ProfileFetch::Loaded(profile) => Some(profile),
            _ => None,
        }
    }
}

/// Client for the internal profile endpoint.
#[derive(Clone)]
pub struct ProfileFetcher {
    http: reqwest::Client,
    endpoint: String,
    auth: Arc<dyn AuthProvider>,
}

impl ProfileFetcher {
    pub fn new(
        api_base_url: &str,
        auth: Arc<dyn AuthProvider>,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/api/profile", api_base_url.trim_end_matches('/')),
            auth,
        })
    }

    /// Fetch the profile for `identity` using the current access token.
    pub async fn fetch(&self, identity: &Identity) -> ProfileFetch {
        let access_token = match self.auth.get_session().await {
            Ok(Some(session)) if !session.access_token.is_empty() => session.access_token,
            Ok(_) => {
                tracing::debug!(user_id = %identity.id, "No access token, skipping profile fetch");
                return ProfileFetch::NoToken;
            }
            Err(e) if e.is_unreachable() => {
                tracing::warn!(user_id = %identity.id, error = %e, "Auth service unreachable");
                return ProfileFetch::Unreachable(e.to_string());
            }
            Err(e) => {
                tracing::warn!(user_id = %identity.id, error = %e, "Could not read session");
                return ProfileFetch::NoToken;
            }
        };

        let response = match self
            .http
            .get(&self.endpoint)
            .bearer_auth(&access_token)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(user_id = %identity.id, error = %e, "Profile request failed");
                return ProfileFetch::Unreachable(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(user_id = %identity.id, status = %status, "Profile request rejected");
            return ProfileFetch::Rejected {
                status: status.as_u16(),
            };
        }

        match response.json::<ProfileEnvelope>().await {
            Ok(ProfileEnvelope {
                success: true,
                data: Some(profile),
                ..
            }) => {
                tracing::debug!(user_id = %identity.id, "Profile loaded");
                ProfileFetch::Loaded(profile)
            }
            Ok(envelope) => {
                tracing::warn!(
                    user_id = %identity.id,
                    error = envelope.error.as_deref().unwrap_or("missing data"),
                    "Profile endpoint reported failure"
                );
                ProfileFetch::Rejected {
                    status: status.as_u16(),
                }
            }
            Err(e) => {
                tracing::warn!(user_id = %identity.id, error = %e, "Failed to decode profile");
                ProfileFetch::Unreachable(e.to_string())
            }
        }
    }
}
