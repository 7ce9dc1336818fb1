//! Account credentials and client tuning knobs.
//!
//! Loading these from a file or the command line is left to the caller; both types
//! implement `serde::Deserialize` so any configuration format can produce them.

use crate::transport::http::DEFAULT_REQUEST_TIMEOUT;
use crate::types::metric::Scale;
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.netatmo.com";
/// Tokens are renewed this long before the provider says they expire.
pub const DEFAULT_TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(60);
/// Maximum number of rows `getmeasure` returns per call.
pub const DEFAULT_PAGE_LIMIT: usize = 1024;
/// First-fetch window for entities whose setup date is unknown.
pub const DEFAULT_FIRST_FETCH_LOOKBACK: Duration = Duration::from_secs(30 * 24 * 3600);

/// Application and account credentials for the password grant.
///
/// # Examples
///
/// ```
/// use netatmo_ledger::Credentials;
///
/// let credentials = Credentials::builder()
///     .client_id("5f0000000000000000000000")
///     .client_secret("s3cr3t")
///     .username("rene@example.com")
///     .password("hunter2")
///     .default_station("Maison")
///     .build();
///
/// // Secrets never end up in logs.
/// assert!(!format!("{:?}", credentials).contains("hunter2"));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
pub struct Credentials {
    #[builder(into)]
    pub client_id: String,
    #[builder(into)]
    pub client_secret: String,
    #[builder(into)]
    pub username: String,
    #[builder(into)]
    pub password: String,
    /// Station name or MAC address fetched when none is given explicitly.
    #[serde(default, alias = "device")]
    #[builder(into)]
    pub default_station: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("default_station", &self.default_station)
            .finish()
    }
}

/// Tuning for the API client and the incremental fetcher.
///
/// # Examples
///
/// ```
/// use netatmo_ledger::{NetatmoOptions, Scale};
/// use std::time::Duration;
///
/// let options = NetatmoOptions::builder()
///     .scale(Scale::ThirtyMinutes)
///     .first_fetch_lookback(Duration::from_secs(7 * 24 * 3600))
///     .build();
/// assert_eq!(options.page_limit, 1024);
/// ```
#[derive(Debug, Clone, Builder)]
pub struct NetatmoOptions {
    /// Provider root, without trailing slash.
    #[builder(into, default = DEFAULT_BASE_URL.to_string())]
    pub base_url: String,
    #[builder(default = DEFAULT_TOKEN_SAFETY_MARGIN)]
    pub token_safety_margin: Duration,
    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    pub request_timeout: Duration,
    #[builder(default)]
    pub scale: Scale,
    #[builder(default = DEFAULT_PAGE_LIMIT)]
    pub page_limit: usize,
    /// Caps how far back the first fetch of a new entity reaches. When unset the
    /// entity's setup date is used, or [`DEFAULT_FIRST_FETCH_LOOKBACK`] if unknown.
    pub first_fetch_lookback: Option<Duration>,
}

impl Default for NetatmoOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl NetatmoOptions {
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_accept_legacy_device_key() {
        let credentials: Credentials = serde_json::from_str(
            r#"{
                "client_id": "id", "client_secret": "s", "username": "u", "password": "p",
                "device": "70:ee:50:aa:aa:aa"
            }"#,
        )
        .unwrap();
        assert_eq!(
            credentials.default_station.as_deref(),
            Some("70:ee:50:aa:aa:aa")
        );
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let options = NetatmoOptions::builder()
            .base_url("http://localhost:8080/")
            .build();
        assert_eq!(
            options.url("api/getmeasure"),
            "http://localhost:8080/api/getmeasure"
        );
        assert_eq!(NetatmoOptions::default().scale, Scale::Max);
    }
}
