use crate::transport::error::TransportError;
use std::fmt;
use thiserror::Error;

/// OAuth2 grant used against the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    Password,
    RefreshToken,
}

impl GrantType {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            GrantType::Password => "password",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("The {grant} grant was rejected with status {status}: {reason}")]
    Rejected {
        grant: GrantType,
        status: u16,
        reason: String,
    },

    #[error("Token endpoint unreachable during the {grant} grant")]
    Unreachable {
        grant: GrantType,
        #[source]
        source: TransportError,
    },

    #[error("Malformed token response to the {grant} grant")]
    MalformedResponse {
        grant: GrantType,
        #[source]
        source: serde_json::Error,
    },

    #[error("Token refresh failed ({refresh}) and re-authentication failed too")]
    RenewalFailed {
        refresh: Box<AuthError>,
        #[source]
        password: Box<AuthError>,
    },
}
