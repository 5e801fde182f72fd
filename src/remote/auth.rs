use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use url::Url;

use super::error::TransportError;

/// Account credentials sent with every API request.
pub struct Credentials {
    pub user_id: String,
    pub access_token: SecretString,
}

impl Credentials {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: SecretString::from(access_token.into()),
        }
    }

    /// True when both credentials carry the same access token.
    pub fn same_token(&self, other: &Credentials) -> bool {
        self.access_token.expose_secret() == other.access_token.expose_secret()
    }
}

/// SEC-015: Never print the token.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Mints fresh credentials after the server rejected the current ones.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn reauthorize(&self, current: &Credentials) -> Result<Credentials, TransportError>;
}

// ============================================================================
// OAuth refresh-token grant
// ============================================================================

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'static str,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    id: Option<String>,
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// [`Authorizer`] that exchanges a long-lived refresh token for a new access
/// token at `<base>/v3/auth/token`. Keeps whichever refresh token the server
/// returned most recently.
pub struct OAuthRefresher {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: SecretString,
    refresh_token: Mutex<SecretString>,
}

impl OAuthRefresher {
    pub fn new(
        http: reqwest::Client,
        base_url: &Url,
        client_id: impl Into<String>,
        client_secret: SecretString,
        refresh_token: SecretString,
    ) -> Result<Self, TransportError> {
        let token_url = base_url
            .join("v3/auth/token")
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(Self {
            http,
            token_url,
            client_id: client_id.into(),
            client_secret,
            refresh_token: Mutex::new(refresh_token),
        })
    }

    fn current_refresh_token(&self) -> String {
        match self.refresh_token.lock() {
            Ok(guard) => guard.expose_secret().to_string(),
            Err(poisoned) => poisoned.into_inner().expose_secret().to_string(),
        }
    }
}

#[async_trait]
impl Authorizer for OAuthRefresher {
    async fn reauthorize(&self, current: &Credentials) -> Result<Credentials, TransportError> {
        let refresh_token = self.current_refresh_token();
        let body = RefreshRequest {
            refresh_token: &refresh_token,
            client_id: &self.client_id,
            client_secret: self.client_secret.expose_secret(),
            grant_type: "refresh_token",
        };

        let response = self.http.post(self.token_url.clone()).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Access token refresh rejected");
            return Err(if status.as_u16() == 401 {
                TransportError::Unauthorized
            } else {
                TransportError::HttpStatus(status.as_u16())
            });
        }
        let token: TokenResponse = response.json().await?;

        if let Some(new_refresh) = token.refresh_token {
            match self.refresh_token.lock() {
                Ok(mut guard) => *guard = SecretString::from(new_refresh),
                Err(poisoned) => *poisoned.into_inner() = SecretString::from(new_refresh),
            }
        }

        tracing::info!(user_id = %current.user_id, "Refreshed access token");
        Ok(Credentials {
            user_id: token.id.unwrap_or_else(|| current.user_id.clone()),
            access_token: SecretString::from(token.access_token),
        })
    }
}
