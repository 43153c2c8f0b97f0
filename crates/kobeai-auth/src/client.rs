// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Auth endpoint wrappers: login, refresh, logout, profile.

use std::sync::Arc;

use async_trait::async_trait;
use kobeai_core::{CredentialRefresher, IssuedToken, KobeError, UserProfile};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::guard::TokenGuard;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    user: UserProfile,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    token: String,
}

/// Client for the `/auth/*` endpoints.
///
/// Successful login and refresh calls store the new credential through the
/// [`TokenGuard`]; logout always clears local state.
#[derive(Clone)]
pub struct AuthClient {
    api: ApiClient,
    guard: Arc<TokenGuard>,
}

impl AuthClient {
    pub fn new(api: ApiClient, guard: Arc<TokenGuard>) -> Self {
        Self { api, guard }
    }

    /// Sign in and cache the returned profile.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, KobeError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(KobeError::Validation("用户名和密码不能为空".into()));
        }

        let req = self
            .api
            .request(Method::POST, "/auth/login", None)
            .json(&LoginRequest { username, password });
        let response: LoginResponse = self.api.send_data(req).await?;

        self.guard.set_credential(Some(&response.token), None).await;
        self.guard.set_profile(&response.user).await;
        info!(username = %response.user.username, "signed in");
        Ok(response.user)
    }

    /// Exchange the current credential for a fresh one and store it.
    pub async fn refresh_and_store(&self) -> Result<(), KobeError> {
        let bearer = self.guard.bearer().ok_or_else(|| KobeError::AuthExpired {
            message: "no valid credential to refresh".into(),
        })?;
        let issued = self.guard.check(self.refresh(&bearer).await).await?;
        self.guard
            .set_credential(Some(&issued.token), issued.ttl)
            .await;
        Ok(())
    }

    /// Sign out. Local auth state is cleared even when the server call fails.
    pub async fn logout(&self) -> Result<(), KobeError> {
        let result = match self.guard.bearer() {
            Some(bearer) => {
                let req = self.api.request(Method::POST, "/auth/logout", Some(&bearer));
                match self.api.send::<serde_json::Value>(req).await {
                    Ok(_) => Ok(()),
                    // An already-invalid session is signed out either way.
                    Err(KobeError::AuthExpired { .. }) => Ok(()),
                    Err(KobeError::Api { code: 403, .. }) => Ok(()),
                    Err(e) => {
                        warn!(error = %e, "logout request failed; clearing local state anyway");
                        Err(e)
                    }
                }
            }
            None => Ok(()),
        };
        self.guard.clear().await;
        info!("signed out");
        result
    }

    /// Fetch the profile from the server and refresh the cache.
    pub async fn profile(&self) -> Result<UserProfile, KobeError> {
        let bearer = self.guard.bearer().ok_or_else(|| KobeError::AuthExpired {
            message: "not signed in".into(),
        })?;
        let req = self.api.request(Method::GET, "/auth/profile", Some(&bearer));
        let profile: UserProfile = self.guard.check(self.api.send_data(req).await).await?;
        self.guard.set_profile(&profile).await;
        Ok(profile)
    }
}

#[async_trait]
impl CredentialRefresher for AuthClient {
    async fn refresh(&self, bearer: &str) -> Result<IssuedToken, KobeError> {
        let req = self.api.request(Method::POST, "/auth/refresh", Some(bearer));
        let response: RefreshResponse = self.api.send_data(req).await.map_err(|e| match e {
            KobeError::Api { message, .. } => KobeError::AuthExpired {
                message: format!("token refresh rejected: {message}"),
            },
            other => other,
        })?;
        debug!("credential refreshed");
        Ok(IssuedToken {
            token: response.token,
            ttl: None,
        })
    }
}
