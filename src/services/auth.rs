// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access token providers for both services.
//!
//! The governor asks a provider for a valid token before each call and asks
//! it to refresh once when a service rejects the token. Interactive login is
//! out of scope: Strava tokens come from the environment or a token file and
//! are refreshed through the OAuth refresh grant; Garmin tokens are written to
//! disk by an external login tool and simply re-read.

use crate::config::{Config, ConfigError};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Strava OAuth token endpoint.
const STRAVA_TOKEN_URL: &str = "https://www.strava.com/oauth/token";

/// File garth writes the Garmin OAuth2 token to.
const GARMIN_OAUTH2_FILE: &str = "oauth2_token.json";

/// Source of access tokens for one service.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A token believed to be valid, refreshing first if it is about to expire.
    async fn access_token(&self) -> Result<String>;

    /// Obtain a fresh token after the service rejected the current one.
    async fn refresh(&self) -> Result<String>;
}

/// Strava tokens as persisted in the token file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StravaTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp
    pub expires_at: i64,
}

impl StravaTokens {
    fn is_fresh(&self) -> bool {
        Utc::now().timestamp() + TOKEN_REFRESH_MARGIN_SECS < self.expires_at
    }
}

/// Token refresh response from Strava.
#[derive(Debug, Clone, Deserialize)]
struct TokenRefreshResponse {
    access_token: String,
    refresh_token: String,
    expires_at: i64,
}

/// Strava token provider with refresh-grant support and on-disk persistence.
pub struct StravaTokenProvider {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    token_file: PathBuf,
    tokens: Mutex<StravaTokens>,
}

impl StravaTokenProvider {
    pub fn new(
        client_id: String,
        client_secret: String,
        token_file: PathBuf,
        tokens: StravaTokens,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: STRAVA_TOKEN_URL.to_string(),
            client_id,
            client_secret,
            token_file,
            tokens: Mutex::new(tokens),
        }
    }

    /// Point the refresh grant at a different endpoint (tests).
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// Build from configuration, preferring tokens persisted by a previous run.
    pub fn from_config(config: &Config) -> std::result::Result<Self, ConfigError> {
        let tokens = match load_token_file(&config.strava_token_file) {
            Some(tokens) => {
                tracing::info!(path = %config.strava_token_file.display(), "Strava token loaded from file");
                tokens
            }
            None => StravaTokens {
                access_token: config
                    .strava_access_token
                    .clone()
                    .ok_or(ConfigError::Missing("STRAVA_ACCESS_TOKEN"))?,
                refresh_token: config
                    .strava_refresh_token
                    .clone()
                    .ok_or(ConfigError::Missing("STRAVA_REFRESH_TOKEN"))?,
                expires_at: config.strava_token_expires_at,
            },
        };

        Ok(Self::new(
            config.strava_client_id.clone(),
            config.strava_client_secret.clone(),
            config.strava_token_file.clone(),
            tokens,
        ))
    }

    /// Run the refresh grant. Caller holds the token lock.
    async fn refresh_locked(&self, tokens: &mut StravaTokens) -> Result<String> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", tokens.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| SyncError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Strava token refresh failed");
            // A rejected refresh token means the grant was revoked.
            return Err(match status.as_u16() {
                400 | 401 | 403 => {
                    SyncError::AuthExpired(format!("Token refresh rejected: HTTP {}", status))
                }
                code => SyncError::from_status(code, body, None),
            });
        }

        let refreshed: TokenRefreshResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Fatal(format!("Failed to parse token response: {}", e)))?;

        *tokens = StravaTokens {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token,
            expires_at: refreshed.expires_at,
        };

        if let Err(e) = save_token_file(&self.token_file, tokens) {
            tracing::warn!(
                error = %e,
                path = %self.token_file.display(),
                "Failed to persist Strava token"
            );
        }

        tracing::info!(expires_at = tokens.expires_at, "Strava token refreshed");
        Ok(tokens.access_token.clone())
    }
}

#[async_trait]
impl TokenProvider for StravaTokenProvider {
    async fn access_token(&self) -> Result<String> {
        let mut tokens = self.tokens.lock().await;
        if tokens.is_fresh() {
            return Ok(tokens.access_token.clone());
        }
        tracing::info!("Strava access token expired, refreshing");
        self.refresh_locked(&mut tokens).await
    }

    async fn refresh(&self) -> Result<String> {
        let mut tokens = self.tokens.lock().await;
        self.refresh_locked(&mut tokens).await
    }
}

fn load_token_file(path: &Path) -> Option<StravaTokens> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "Failed to read Strava token file");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(tokens) => Some(tokens),
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "Failed to parse Strava token file");
            None
        }
    }
}

fn save_token_file(path: &Path, tokens: &StravaTokens) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(tokens).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}

/// Garmin OAuth2 token as written by garth.
#[derive(Debug, Clone, Deserialize)]
struct GarminOAuth2Token {
    access_token: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

impl GarminOAuth2Token {
    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| Utc::now().timestamp() >= at)
    }
}

/// Garmin token provider backed by a token directory.
pub struct GarminTokenProvider {
    token_path: PathBuf,
    current: Mutex<Option<GarminOAuth2Token>>,
}

impl GarminTokenProvider {
    pub fn new(tokens_dir: impl AsRef<Path>) -> Self {
        Self {
            token_path: tokens_dir.as_ref().join(GARMIN_OAUTH2_FILE),
            current: Mutex::new(None),
        }
    }

    fn read_token(&self) -> Result<GarminOAuth2Token> {
        let raw = std::fs::read_to_string(&self.token_path).map_err(|e| {
            SyncError::AuthExpired(format!(
                "Cannot read Garmin token {}: {}",
                self.token_path.display(),
                e
            ))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| SyncError::AuthExpired(format!("Invalid Garmin token file: {}", e)))
    }
}

#[async_trait]
impl TokenProvider for GarminTokenProvider {
    async fn access_token(&self) -> Result<String> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.access_token.clone());
        }
        let token = self.read_token()?;
        if token.is_expired() {
            return Err(SyncError::AuthExpired(
                "Garmin token expired; log in again to renew it".to_string(),
            ));
        }
        let access = token.access_token.clone();
        *current = Some(token);
        Ok(access)
    }

    async fn refresh(&self) -> Result<String> {
        let mut current = self.current.lock().await;
        let token = self.read_token()?;
        let unchanged = current
            .as_ref()
            .is_some_and(|old| old.access_token == token.access_token);
        if unchanged || token.is_expired() {
            return Err(SyncError::AuthExpired(
                "Garmin rejected the stored token and no newer one is available".to_string(),
            ));
        }
        tracing::info!(path = %self.token_path.display(), "Garmin token reloaded");
        let access = token.access_token.clone();
        *current = Some(token);
        Ok(access)
    }
}
