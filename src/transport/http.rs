use crate::transport::error::TransportError;
use crate::transport::{HttpResponse, Transport};
use log::debug;
use reqwest::{Client, Response};
use std::time::{Duration, Instant};

/// Default timeout for a single provider request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`Transport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(TransportError::ClientBuild)?;
        Ok(Self { client })
    }

    /// Wraps an already configured client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn read(
        url: &str,
        response: Response,
        started: Instant,
    ) -> Result<HttpResponse, TransportError> {
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::BodyRead(url.to_string(), e))?;
        debug!(
            "<<<< {} {} bytes in {:.3} s",
            status,
            body.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

impl Transport for HttpTransport {
    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, String)],
    ) -> Result<HttpResponse, TransportError> {
        debug!(">>>> POST {}", url);
        let started = Instant::now();
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| TransportError::NetworkRequest(url.to_string(), e))?;
        Self::read(url, response, started).await
    }

    async fn get(
        &self,
        url: &str,
        bearer_token: &str,
        query: &[(&str, String)],
    ) -> Result<HttpResponse, TransportError> {
        debug!(">>>> GET {}", url);
        let started = Instant::now();
        let response = self
            .client
            .get(url)
            .bearer_auth(bearer_token)
            .query(query)
            .send()
            .await
            .map_err(|e| TransportError::NetworkRequest(url.to_string(), e))?;
        Self::read(url, response, started).await
    }
}
