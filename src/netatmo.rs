//! The main entry point: authenticate once, then run fetch cycles that bring a
//! [`CsvLedger`] up to date with everything a station and its modules recorded.

use crate::api::client::ApiClient;
use crate::auth::token_manager::{TokenManager, TokenState};
use crate::config::{Credentials, NetatmoOptions};
use crate::error::NetatmoError;
use crate::fetch::incremental::IncrementalFetcher;
use crate::ledger::csv_ledger::CsvLedger;
use crate::registry::{is_mac_address, StationRegistry};
use crate::transport::http::HttpTransport;
use crate::transport::Transport;
use crate::types::device::{Entity, EntityKind};
use bon::bon;
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::sync::Arc;

/// What one fetch cycle did for one station or module.
#[derive(Debug)]
pub struct EntityReport {
    pub entity: Entity,
    /// Number of rows appended, or why the entity was skipped this cycle.
    pub outcome: Result<usize, NetatmoError>,
    /// Last stored timestamp after the cycle. `None` when the entity has no rows yet,
    /// or when the ledger could not be read and `outcome` holds that error.
    pub watermark: Option<DateTime<Utc>>,
}

impl EntityReport {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Per-entity results of one fetch cycle, station first.
#[derive(Debug)]
pub struct FetchReport {
    pub station_id: String,
    pub entities: Vec<EntityReport>,
}

impl FetchReport {
    /// Total rows appended across all entities.
    pub fn appended(&self) -> usize {
        self.entities
            .iter()
            .filter_map(|e| e.outcome.as_ref().ok())
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &EntityReport> {
        self.entities.iter().filter(|e| !e.is_ok())
    }

    pub fn get(&self, entity_id: &str) -> Option<&EntityReport> {
        self.entities.iter().find(|e| e.entity.id() == entity_id)
    }
}

/// The Netatmo client.
///
/// Holds the authenticated [`ApiClient`]. Each call to [`Netatmo::fetch`] is one
/// sequential cycle: station metadata, then every entity of the selected station one
/// after another, each appended to the ledger before the next is requested.
///
/// # Examples
///
/// ```no_run
/// use netatmo_ledger::{Credentials, CsvLedger, Netatmo, NetatmoError, NetatmoOptions};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), NetatmoError> {
/// let credentials = Credentials::builder()
///     .client_id("5f0000000000000000000000")
///     .client_secret("s3cr3t")
///     .username("rene@example.com")
///     .password("hunter2")
///     .build();
/// let netatmo = Netatmo::connect(credentials, NetatmoOptions::default()).await?;
/// let mut ledger = CsvLedger::open("netatmo-data")?;
///
/// let report = netatmo
///     .fetch()
///     .ledger(&mut ledger)
///     .station("Maison")
///     .call()
///     .await?;
/// println!("{} new rows", report.appended());
/// # Ok(())
/// # }
/// ```
pub struct Netatmo<T: Transport = HttpTransport> {
    client: ApiClient<T>,
    options: NetatmoOptions,
}

impl Netatmo<HttpTransport> {
    /// Authenticates over HTTPS with the password grant.
    ///
    /// # Errors
    ///
    /// Returns [`NetatmoError::Transport`] if the HTTP client cannot be built and
    /// [`NetatmoError::Auth`] if the provider refuses the credentials.
    pub async fn connect(
        credentials: Credentials,
        options: NetatmoOptions,
    ) -> Result<Self, NetatmoError> {
        let transport = Arc::new(HttpTransport::new(options.request_timeout)?);
        Self::with_transport(transport, credentials, options).await
    }
}

#[bon]
impl<T: Transport> Netatmo<T> {
    /// Authenticates over any [`Transport`].
    pub async fn with_transport(
        transport: Arc<T>,
        credentials: Credentials,
        options: NetatmoOptions,
    ) -> Result<Self, NetatmoError> {
        let tokens = TokenManager::authenticate(transport.clone(), credentials, &options).await?;
        Ok(Self {
            client: ApiClient::new(transport, tokens, &options),
            options,
        })
    }

    /// Resumes with a saved token pair. Nothing is sent until the first request.
    pub fn with_tokens(
        transport: Arc<T>,
        credentials: Credentials,
        tokens: TokenState,
        options: NetatmoOptions,
    ) -> Self {
        let tokens = TokenManager::with_tokens(transport.clone(), credentials, tokens, &options);
        Self {
            client: ApiClient::new(transport, tokens, &options),
            options,
        }
    }

    pub fn client(&self) -> &ApiClient<T> {
        &self.client
    }

    pub fn options(&self) -> &NetatmoOptions {
        &self.options
    }

    /// The current token pair, for saving between runs.
    pub async fn tokens(&self) -> Option<TokenState> {
        self.client.tokens().tokens().await
    }

    /// Every station the account can read, with their modules.
    pub async fn stations(&self) -> Result<StationRegistry, NetatmoError> {
        Ok(self.client.station_data(None).await?)
    }

    /// Runs one fetch cycle for a station and its modules.
    ///
    /// # Arguments
    ///
    /// * `.ledger(&mut CsvLedger)`: **Required.** Where new rows are appended.
    /// * `.station(&str)`: Optional. Station name or MAC address. Defaults to the
    ///   credentials' `default_station`, then to the first station of the account.
    ///
    /// # Errors
    ///
    /// Authorization failures, an unknown station and a failed `getstationsdata` call
    /// end the cycle with an error. Failures of a single entity are recorded in its
    /// [`EntityReport`] and the cycle moves on to the next entity.
    #[builder]
    pub async fn fetch(
        &self,
        ledger: &mut CsvLedger,
        station: Option<&str>,
    ) -> Result<FetchReport, NetatmoError> {
        let selector = station.or(self.client.tokens().credentials().default_station.as_deref());
        let filter = selector.filter(|s| is_mac_address(s));
        let registry = self.client.station_data(filter).await?;
        let device = registry.station(selector).ok_or_else(|| match selector {
            Some(selector) if !selector.trim().is_empty() => {
                NetatmoError::StationNotFound(selector.to_string())
            }
            _ => NetatmoError::NoStation,
        })?;
        info!(
            "Fetching {} ({}) with {} modules",
            device.station_name.as_deref().unwrap_or("unnamed station"),
            device.id,
            device.modules.len()
        );

        let entities = device.entities();
        let fetcher = IncrementalFetcher::new(&self.client, &self.options);
        let mut report = FetchReport {
            station_id: device.id.clone(),
            entities: Vec::with_capacity(entities.len()),
        };
        for entity in &entities {
            let (outcome, watermark) = match Self::fetch_entity(&fetcher, ledger, entity).await {
                Ok((appended, watermark)) => (Ok(appended), watermark),
                Err(err) if err.is_auth() => return Err(err),
                Err(err) => {
                    warn!("Skipping {}: {}", entity, err);
                    // Only fails if the ledger could not be read, which `err` already says.
                    let watermark = ledger
                        .last_timestamp(entity.kind, entity.id())
                        .unwrap_or_default();
                    (Err(err), watermark)
                }
            };
            report.entities.push(EntityReport {
                entity: entity.clone(),
                outcome,
                watermark,
            });
        }
        info!(
            "Fetch cycle done: {} rows appended, {} entities failed",
            report.appended(),
            report.failures().count()
        );
        Ok(report)
    }

    async fn fetch_entity<'a>(
        fetcher: &IncrementalFetcher<'a, T>,
        ledger: &mut CsvLedger,
        entity: &'a Entity,
    ) -> Result<(usize, Option<DateTime<Utc>>), NetatmoError> {
        let kind: EntityKind = entity.kind;
        let watermark = ledger.last_timestamp(kind, entity.id())?;
        let rows = fetcher.new_rows(entity, watermark).await?;
        let appended = ledger.append(kind, entity.id(), &rows)?;
        Ok((appended, ledger.last_timestamp(kind, entity.id())?))
    }
}
