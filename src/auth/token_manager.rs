//! OAuth2 token lifecycle for the provider's `oauth2/token` endpoint.
//!
//! [`TokenManager`] owns the only copy of the current [`TokenState`]. Callers ask
//! for a valid access token and never see the state being replaced: renewal
//! happens while the state lock is held, and the new state is swapped in whole.

use crate::api::schema::describe_error;
use crate::auth::error::{AuthError, GrantType};
use crate::config::{Credentials, NetatmoOptions};
use crate::transport::Transport;
use crate::utils::to_delta;
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

const TOKEN_PATH: &str = "oauth2/token";
const SCOPE: &str = "read_station";

/// Access and refresh token pair as issued by the provider.
///
/// Serializable so a credentials store can keep it between runs and hand it back
/// through [`TokenManager::with_tokens`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    access_token: String,
    refresh_token: String,
    scope: Vec<String>,
    expires_at: DateTime<Utc>,
}

impl TokenState {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        scope: Vec<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            scope,
            expires_at,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn scope(&self) -> &[String] {
        &self.scope
    }

    fn is_expiring(&self, now: DateTime<Utc>, margin: TimeDelta) -> bool {
        match self.expires_at.checked_sub_signed(margin) {
            Some(renew_at) => now >= renew_at,
            None => true,
        }
    }
}

impl fmt::Debug for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenState")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScopeField {
    List(Vec<String>),
    Joined(String),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
    scope: Option<ScopeField>,
}

/// Hands out valid access tokens, renewing them when they are about to expire.
pub struct TokenManager<T: Transport> {
    transport: Arc<T>,
    credentials: Credentials,
    token_url: String,
    safety_margin: TimeDelta,
    state: Mutex<Option<TokenState>>,
}

impl<T: Transport> TokenManager<T> {
    /// Authenticates with the password grant.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if the provider rejects the credentials or cannot be reached.
    pub async fn authenticate(
        transport: Arc<T>,
        credentials: Credentials,
        options: &NetatmoOptions,
    ) -> Result<Self, AuthError> {
        let manager = Self::new(transport, credentials, None, options);
        let tokens = manager.password_grant().await?;
        *manager.state.lock().await = Some(tokens);
        Ok(manager)
    }

    /// Resumes from a previously issued token pair without contacting the provider.
    pub fn with_tokens(
        transport: Arc<T>,
        credentials: Credentials,
        tokens: TokenState,
        options: &NetatmoOptions,
    ) -> Self {
        Self::new(transport, credentials, Some(tokens), options)
    }

    fn new(
        transport: Arc<T>,
        credentials: Credentials,
        tokens: Option<TokenState>,
        options: &NetatmoOptions,
    ) -> Self {
        Self {
            transport,
            credentials,
            token_url: options.url(TOKEN_PATH),
            safety_margin: to_delta(options.token_safety_margin),
            state: Mutex::new(tokens),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// A copy of the current token pair, for saving.
    pub async fn tokens(&self) -> Option<TokenState> {
        self.state.lock().await.clone()
    }

    /// Returns an access token that is valid for at least the safety margin.
    ///
    /// Renews first if the current token is missing or expiring: one refresh grant,
    /// falling back to one password grant.
    pub async fn valid_token(&self) -> Result<String, AuthError> {
        let mut state = self.state.lock().await;
        if let Some(tokens) = state.as_ref() {
            if !tokens.is_expiring(Utc::now(), self.safety_margin) {
                debug!("access token still valid");
                return Ok(tokens.access_token.clone());
            }
        }
        let renewed = self.renew(state.as_ref()).await?;
        let access_token = renewed.access_token.clone();
        *state = Some(renewed);
        Ok(access_token)
    }

    /// Renews after the provider refused `stale_token`.
    ///
    /// If the stored token has already moved on from `stale_token`, that newer token
    /// is returned without another grant.
    pub async fn force_renewal(&self, stale_token: &str) -> Result<String, AuthError> {
        let mut state = self.state.lock().await;
        if let Some(tokens) = state.as_ref() {
            if tokens.access_token != stale_token
                && !tokens.is_expiring(Utc::now(), self.safety_margin)
            {
                return Ok(tokens.access_token.clone());
            }
        }
        let renewed = self.renew(state.as_ref()).await?;
        let access_token = renewed.access_token.clone();
        *state = Some(renewed);
        Ok(access_token)
    }

    async fn renew(&self, current: Option<&TokenState>) -> Result<TokenState, AuthError> {
        let Some(current) = current else {
            return self.password_grant().await;
        };
        match self.refresh_grant(&current.refresh_token).await {
            Ok(tokens) => Ok(tokens),
            Err(refresh) => {
                warn!(
                    "Token refresh failed, re-authenticating with password: {}",
                    refresh
                );
                self.password_grant()
                    .await
                    .map_err(|password| AuthError::RenewalFailed {
                        refresh: Box::new(refresh),
                        password: Box::new(password),
                    })
            }
        }
    }

    async fn password_grant(&self) -> Result<TokenState, AuthError> {
        let form = [
            ("grant_type", GrantType::Password.as_str().to_string()),
            ("client_id", self.credentials.client_id.clone()),
            ("client_secret", self.credentials.client_secret.clone()),
            ("username", self.credentials.username.clone()),
            ("password", self.credentials.password.clone()),
            ("scope", SCOPE.to_string()),
        ];
        self.grant(GrantType::Password, &form, None).await
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenState, AuthError> {
        let form = [
            ("grant_type", GrantType::RefreshToken.as_str().to_string()),
            ("refresh_token", refresh_token.to_string()),
            ("client_id", self.credentials.client_id.clone()),
            ("client_secret", self.credentials.client_secret.clone()),
        ];
        self.grant(GrantType::RefreshToken, &form, Some(refresh_token))
            .await
    }

    async fn grant(
        &self,
        grant: GrantType,
        form: &[(&str, String)],
        previous_refresh_token: Option<&str>,
    ) -> Result<TokenState, AuthError> {
        let issued_at = Utc::now();
        let response = self
            .transport
            .post_form(&self.token_url, form)
            .await
            .map_err(|source| AuthError::Unreachable { grant, source })?;

        if !response.is_success() {
            return Err(AuthError::Rejected {
                grant,
                status: response.status,
                reason: describe_error(&response.body),
            });
        }

        let value: serde_json::Value = serde_json::from_slice(&response.body)
            .map_err(|source| AuthError::MalformedResponse { grant, source })?;
        if value.get("error").is_some() {
            return Err(AuthError::Rejected {
                grant,
                status: response.status,
                reason: describe_error(&response.body),
            });
        }
        let parsed: TokenResponse = serde_json::from_value(value)
            .map_err(|source| AuthError::MalformedResponse { grant, source })?;

        let refresh_token = match (parsed.refresh_token, previous_refresh_token) {
            (Some(token), _) => token,
            (None, Some(previous)) => previous.to_string(),
            (None, None) => String::new(),
        };
        let scope = match parsed.scope {
            Some(ScopeField::List(list)) => list,
            Some(ScopeField::Joined(joined)) => joined
                .split([' ', ','])
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => vec![SCOPE.to_string()],
        };
        let expires_at = TimeDelta::try_seconds(parsed.expires_in.max(0))
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        info!(
            "Obtained access token with {} grant, expires at {}",
            grant, expires_at
        );

        Ok(TokenState {
            access_token: parsed.access_token,
            refresh_token,
            scope,
            expires_at,
        })
    }
}
