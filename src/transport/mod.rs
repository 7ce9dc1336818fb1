//! The HTTP capability the client is built on.
//!
//! Everything above this module talks to the provider through [`Transport`], which
//! only knows how to send a form-encoded POST or an authorized GET and hand back the
//! status code with the raw body. [`HttpTransport`] is the `reqwest` implementation.

pub mod error;
pub mod http;
#[cfg(test)]
pub(crate) mod mock;

use error::TransportError;
use std::future::Future;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests to the provider.
///
/// Implementations must not retry on their own; the callers own the retry policy.
pub trait Transport: Send + Sync {
    /// POSTs `form` as `application/x-www-form-urlencoded`.
    fn post_form(
        &self,
        url: &str,
        form: &[(&str, String)],
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;

    /// GETs `url` with `query` parameters and a bearer token.
    fn get(
        &self,
        url: &str,
        bearer_token: &str,
        query: &[(&str, String)],
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}
