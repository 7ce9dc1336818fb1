//! Authenticated access to the `getstationsdata` and `getmeasure` endpoints.

use crate::api::error::{ApiError, ApiErrorKind};
use crate::api::schema::{describe_error, provider_error, MeasureEnvelope, StationDataEnvelope};
use crate::auth::token_manager::TokenManager;
use crate::config::NetatmoOptions;
use crate::registry::StationRegistry;
use crate::transport::Transport;
use crate::types::device::Entity;
use crate::types::measurement::{from_unix, MeasureRow, MeasurementBatch};
use crate::types::metric::{Metric, Scale};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

const STATION_DATA_PATH: &str = "api/getstationsdata";
const MEASURE_PATH: &str = "api/getmeasure";

/// Parameters of one `getmeasure` call.
#[derive(Debug, Clone)]
pub struct MeasureRequest<'a> {
    pub entity: &'a Entity,
    /// Requested metrics; the response carries one value per metric, in this order.
    pub metrics: &'a [Metric],
    pub scale: Scale,
    /// Inclusive lower bound.
    pub date_begin: DateTime<Utc>,
    pub date_end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Client for the two data endpoints.
///
/// Every call takes its token from the [`TokenManager`]. If the provider refuses
/// the token anyway, the client renews once and repeats the call once.
pub struct ApiClient<T: Transport> {
    transport: Arc<T>,
    tokens: TokenManager<T>,
    station_data_url: String,
    measure_url: String,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: Arc<T>, tokens: TokenManager<T>, options: &NetatmoOptions) -> Self {
        Self {
            transport,
            tokens,
            station_data_url: options.url(STATION_DATA_PATH),
            measure_url: options.url(MEASURE_PATH),
        }
    }

    pub fn tokens(&self) -> &TokenManager<T> {
        &self.tokens
    }

    /// Fetches station and module metadata.
    ///
    /// `device_id` limits the answer to one station; `None` returns every station
    /// the account can read.
    pub async fn station_data(&self, device_id: Option<&str>) -> Result<StationRegistry, ApiError> {
        let mut query = vec![("get_favorites", "false".to_string())];
        if let Some(device_id) = device_id {
            query.push(("device_id", device_id.to_string()));
        }
        let url = &self.station_data_url;
        let body = self.authorized_get(url, &query).await?;
        let envelope: StationDataEnvelope =
            serde_json::from_slice(&body).map_err(|source| ApiError::JsonParse {
                url: url.clone(),
                source,
            })?;
        let registry =
            StationRegistry::build(envelope.body.devices).map_err(|source| ApiError::InvalidData {
                url: url.clone(),
                source,
            })?;
        debug!("device count: {}", registry.devices().len());
        Ok(registry)
    }

    /// Fetches one page of measurements for an entity.
    pub async fn measure(
        &self,
        request: &MeasureRequest<'_>,
    ) -> Result<MeasurementBatch, ApiError> {
        let entity = request.entity;
        let mut query = vec![("device_id", entity.device_id.clone())];
        if let Some(module_id) = &entity.module_id {
            query.push(("module_id", module_id.clone()));
        }
        query.push(("scale", request.scale.to_string()));
        query.push(("type", Metric::join(request.metrics)));
        query.push(("date_begin", request.date_begin.timestamp().to_string()));
        if let Some(date_end) = request.date_end {
            query.push(("date_end", date_end.timestamp().to_string()));
        }
        if let Some(limit) = request.limit {
            query.push(("limit", limit.to_string()));
        }
        query.push(("optimize", "false".to_string()));
        query.push(("real_time", "false".to_string()));

        let url = &self.measure_url;
        let body = self.authorized_get(url, &query).await?;
        let envelope: MeasureEnvelope =
            serde_json::from_slice(&body).map_err(|source| ApiError::JsonParse {
                url: url.clone(),
                source,
            })?;
        let malformed = |reason: String| ApiError::Malformed {
            url: url.clone(),
            reason,
        };

        let mut rows = Vec::new();
        for (timestamp, values) in envelope.body.into_rows().map_err(malformed)? {
            if values.len() != request.metrics.len() {
                return Err(malformed(format!(
                    "{} values at {} for {} requested metrics",
                    values.len(),
                    timestamp,
                    request.metrics.len()
                )));
            }
            let timestamp = from_unix(timestamp).map_err(|e| malformed(e.to_string()))?;
            let values: BTreeMap<Metric, Option<f64>> =
                request.metrics.iter().copied().zip(values).collect();
            rows.push(MeasureRow::new(timestamp, values));
        }

        MeasurementBatch::new(entity.id(), rows).map_err(|source| ApiError::InvalidData {
            url: url.clone(),
            source,
        })
    }

    /// Attempt, and on an authorization failure renew the token once and retry once.
    async fn authorized_get(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<u8>, ApiError> {
        let token = self.tokens.valid_token().await?;
        match self.get_once(url, &token, query).await {
            Err(err) if err.kind() == ApiErrorKind::Auth => {
                warn!("{} refused the access token, renewing and retrying once: {}", url, err);
                let renewed = self.tokens.force_renewal(&token).await?;
                self.get_once(url, &renewed, query).await
            }
            result => result,
        }
    }

    async fn get_once(
        &self,
        url: &str,
        token: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<u8>, ApiError> {
        let response = self.transport.get(url, token, query).await?;
        let provider = provider_error(&response.body);
        if response.is_success() && provider.is_none() {
            return Ok(response.body);
        }

        let url = url.to_string();
        let reason = describe_error(&response.body);
        let code = provider.and_then(|e| e.code);
        let status = response.status;
        // A provider code decides on its own; the status only matters without one.
        Err(match (code, status) {
            (Some(1..=3), _) | (None, 401 | 403) => ApiError::Unauthorized {
                url,
                status,
                reason,
            },
            (Some(26), _) | (None, 429) => ApiError::RateLimited { url, reason },
            (Some(9), _) | (None, 404) => ApiError::NotFound { url, reason },
            _ => ApiError::HttpStatus {
                url,
                status,
                reason,
            },
        })
    }
}
