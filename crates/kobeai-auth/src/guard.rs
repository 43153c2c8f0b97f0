// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer credential tracking.
//!
//! The token is stored without its scheme and always handed out in the single
//! canonical `Bearer <token>` form, whatever form it was issued in.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use kobeai_config::model::AuthConfig;
use kobeai_core::{ClientStore, KobeError, StorageKey, UserProfile};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::redact::{SecretValues, register_secret};

const BEARER_PREFIX: &str = "Bearer ";

/// Session-wide notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The credential was rejected and has been cleared.
    SignedOut,
}

/// A bearer token and the instant it stops being accepted.
pub struct Credential {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

impl Credential {
    /// Build from a token in any accepted form. Returns `None` for blank tokens.
    pub fn new(token: &str, expires_at: DateTime<Utc>) -> Option<Self> {
        let raw = strip_scheme(token);
        if raw.is_empty() {
            return None;
        }
        Some(Self {
            token: SecretString::from(raw.to_string()),
            expires_at,
        })
    }

    /// Header value in canonical form.
    pub fn bearer(&self) -> String {
        format!("{BEARER_PREFIX}{}", self.token.expose_secret())
    }

    /// The token without its scheme.
    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Valid, but expiring within `lookahead` of `now`.
    pub fn is_refresh_due_at(&self, now: DateTime<Utc>, lookahead: Duration) -> bool {
        if !self.is_valid_at(now) {
            return false;
        }
        let remaining = (self.expires_at - now).to_std().unwrap_or_default();
        remaining <= lookahead
    }
}

impl Clone for Credential {
    fn clone(&self) -> Self {
        Self {
            token: SecretString::from(self.token.expose_secret().to_string()),
            expires_at: self.expires_at,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Remove any number of leading `Bearer` schemes and surrounding whitespace.
fn strip_scheme(token: &str) -> &str {
    const SCHEME: &str = "bearer";
    let mut raw = token.trim();
    loop {
        let Some(head) = raw.get(..SCHEME.len()) else {
            return raw;
        };
        let rest = &raw[SCHEME.len()..];
        if !head.eq_ignore_ascii_case(SCHEME)
            || !(rest.is_empty() || rest.starts_with(char::is_whitespace))
        {
            return raw;
        }
        raw = rest.trim_start();
    }
}

/// Owner of the bearer credential.
///
/// Every mutation is written to the [`ClientStore`] before it returns. Reads
/// are served from an in-memory mirror loaded once at startup.
pub struct TokenGuard {
    store: Arc<dyn ClientStore>,
    lookahead: Duration,
    default_ttl: Duration,
    current: RwLock<Option<Credential>>,
    secrets: Option<SecretValues>,
    events: broadcast::Sender<SessionEvent>,
}

impl TokenGuard {
    /// Load the stored credential. Malformed or partial state loads as signed out.
    pub async fn load(store: Arc<dyn ClientStore>, config: &AuthConfig) -> Self {
        let token = store.get(StorageKey::Token).await;
        let expiry = store.get(StorageKey::TokenExpiry).await;

        let current = match (token, expiry) {
            (Some(token), Some(expiry)) => match DateTime::parse_from_rfc3339(&expiry) {
                Ok(at) => Credential::new(&token, at.with_timezone(&Utc)),
                Err(e) => {
                    warn!(error = %e, "stored credential expiry is malformed; ignoring credential");
                    None
                }
            },
            (Some(_), None) => {
                warn!("stored credential has no expiry; ignoring credential");
                None
            }
            _ => None,
        };

        debug!(signed_in = current.is_some(), "credential loaded");
        Self {
            store,
            lookahead: config.refresh_lookahead(),
            default_ttl: config.default_token_ttl(),
            current: RwLock::new(current),
            secrets: None,
            events: broadcast::channel(16).0,
        }
    }

    /// Register every token this guard holds with a redaction list.
    pub fn with_redaction(mut self, secrets: SecretValues) -> Self {
        if let Some(cred) = self.credential() {
            register_secret(&secrets, cred.token());
        }
        self.secrets = Some(secrets);
        self
    }

    /// The current credential, if any, regardless of expiry.
    pub fn credential(&self) -> Option<Credential> {
        self.current.read().ok().and_then(|c| c.clone())
    }

    /// Canonical `Bearer <token>` header value of a valid credential.
    pub fn bearer(&self) -> Option<String> {
        self.credential()
            .filter(|c| c.is_valid_at(Utc::now()))
            .map(|c| c.bearer())
    }

    /// Store `token` with lifetime `ttl` (default when `None`), or clear all
    /// auth state when `token` is `None`.
    pub async fn set_credential(&self, token: Option<&str>, ttl: Option<Duration>) {
        let Some(token) = token else {
            self.clear().await;
            return;
        };

        let ttl = ttl.unwrap_or(self.default_ttl);
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let Some(credential) = Credential::new(token, expires_at) else {
            warn!("refusing to store a blank token; clearing credential");
            self.clear().await;
            return;
        };

        self.store.set(StorageKey::Token, credential.token()).await;
        self.store
            .set(StorageKey::TokenExpiry, &expires_at.to_rfc3339())
            .await;

        if let Some(secrets) = &self.secrets {
            register_secret(secrets, credential.token());
        }
        if let Ok(mut current) = self.current.write() {
            *current = Some(credential);
        }
        info!(expires_at = %expires_at, "credential stored");
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.credential().is_some_and(|c| c.is_valid_at(now))
    }

    pub fn is_refresh_due(&self) -> bool {
        self.is_refresh_due_at(Utc::now())
    }

    pub fn is_refresh_due_at(&self, now: DateTime<Utc>) -> bool {
        self.credential()
            .is_some_and(|c| c.is_refresh_due_at(now, self.lookahead))
    }

    /// Erase the credential, the cached profile, and session-scoped
    /// conversation state. The offline queue is kept.
    pub async fn clear(&self) {
        for key in [
            StorageKey::Token,
            StorageKey::TokenExpiry,
            StorageKey::UserProfile,
            StorageKey::Conversations,
            StorageKey::CurrentConversation,
        ] {
            self.store.remove(key).await;
        }
        if let Ok(mut current) = self.current.write() {
            *current = None;
        }
        info!("credential cleared");
    }

    /// Clear everything [`clear`](Self::clear) does and announce
    /// [`SessionEvent::SignedOut`].
    pub async fn sign_out(&self, reason: &KobeError) {
        warn!(error = %reason, "credential rejected; signing out");
        self.clear().await;
        let _ = self.events.send(SessionEvent::SignedOut);
    }

    /// Pass `result` through, signing out first when the server rejected the
    /// credential.
    pub async fn check<T>(&self, result: Result<T, KobeError>) -> Result<T, KobeError> {
        if let Err(e) = &result
            && e.is_auth()
        {
            self.sign_out(e).await;
        }
        result
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Cache the signed-in user's profile.
    pub async fn set_profile(&self, profile: &UserProfile) {
        match serde_json::to_string(profile) {
            Ok(json) => self.store.set(StorageKey::UserProfile, &json).await,
            Err(e) => warn!(error = %e, "failed to serialize profile"),
        }
    }

    /// The cached profile, if present and readable.
    pub async fn profile(&self) -> Option<UserProfile> {
        let json = self.store.get(StorageKey::UserProfile).await?;
        serde_json::from_str(&json)
            .inspect_err(|e| warn!(error = %e, "cached profile is malformed"))
            .ok()
    }
}
