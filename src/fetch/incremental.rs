//! Watermark-driven, paginated retrieval of new measurements for one entity.

use crate::api::client::{ApiClient, MeasureRequest};
use crate::api::error::ApiError;
use crate::config::{NetatmoOptions, DEFAULT_FIRST_FETCH_LOOKBACK};
use crate::fetch::error::FetchError;
use crate::ledger::csv_ledger::CsvLedger;
use crate::transport::Transport;
use crate::types::device::Entity;
use crate::types::measurement::{ensure_increasing, MeasureRow, MeasurementBatch};
use crate::types::metric::{Metric, Scale};
use crate::utils::to_delta;
use chrono::{DateTime, TimeDelta, Utc};
use futures_util::stream::{self, Stream, TryStreamExt};
use log::{debug, info};
use std::time::Duration;

/// Time span one fetch covers. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

struct PageCursor {
    metrics: Vec<Metric>,
    start: DateTime<Utc>,
    previous: Option<DateTime<Utc>>,
    done: bool,
}

/// Pulls every measurement an entity recorded after its watermark.
///
/// Pages are requested one at a time. A page holding `page_limit` rows means more may
/// follow, and the next request starts one second after its last timestamp.
pub struct IncrementalFetcher<'a, T: Transport> {
    client: &'a ApiClient<T>,
    scale: Scale,
    page_limit: usize,
    first_fetch_lookback: Option<Duration>,
}

impl<T: Transport> Clone for IncrementalFetcher<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Transport> Copy for IncrementalFetcher<'_, T> {}

impl<'a, T: Transport + 'a> IncrementalFetcher<'a, T> {
    pub fn new(client: &'a ApiClient<T>, options: &NetatmoOptions) -> Self {
        Self {
            client,
            scale: options.scale,
            page_limit: options.page_limit.max(1),
            first_fetch_lookback: options.first_fetch_lookback,
        }
    }

    /// Ledger columns of the entity's kind that the entity actually measures.
    ///
    /// An entity advertising no data types gets every column.
    pub fn metrics_for(entity: &Entity) -> Vec<Metric> {
        let columns = CsvLedger::columns(entity.kind);
        if entity.data_types.is_empty() {
            return columns.to_vec();
        }
        columns
            .iter()
            .copied()
            .filter(|metric| entity.data_types.contains(metric))
            .collect()
    }

    /// Computes the span to request, ending at `now`.
    pub fn window(
        &self,
        entity: &Entity,
        watermark: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> FetchWindow {
        let start = match watermark {
            Some(watermark) => watermark
                .checked_add_signed(TimeDelta::seconds(1))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            None => {
                let lookback = self
                    .first_fetch_lookback
                    .unwrap_or(DEFAULT_FIRST_FETCH_LOOKBACK);
                let floor = now
                    .checked_sub_signed(to_delta(lookback))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                match (entity.first_available, self.first_fetch_lookback) {
                    (Some(setup), Some(_)) => setup.max(floor),
                    (Some(setup), None) => setup,
                    (None, _) => floor,
                }
            }
        };
        FetchWindow { start, end: now }
    }

    /// Pages of rows newer than `watermark`, up to now.
    pub fn pages(
        &self,
        entity: &'a Entity,
        watermark: Option<DateTime<Utc>>,
    ) -> impl Stream<Item = Result<MeasurementBatch, FetchError>> + 'a {
        let window = self.window(entity, watermark, Utc::now());
        self.pages_in(entity, watermark, window)
    }

    /// Pages of rows within `window`. Every row must be later than `watermark` and than
    /// every row before it.
    pub fn pages_in(
        &self,
        entity: &'a Entity,
        watermark: Option<DateTime<Utc>>,
        window: FetchWindow,
    ) -> impl Stream<Item = Result<MeasurementBatch, FetchError>> + 'a {
        let metrics = Self::metrics_for(entity);
        let done = metrics.is_empty() || window.is_empty();
        if metrics.is_empty() {
            debug!("{} shares no metric with its ledger, skipping", entity);
        }
        let cursor = PageCursor {
            metrics,
            start: window.start,
            previous: watermark,
            done,
        };

        let fetcher = *self;
        stream::try_unfold(cursor, move |cursor| fetcher.next_page(entity, window, cursor))
    }

    async fn next_page(
        self,
        entity: &'a Entity,
        window: FetchWindow,
        cursor: PageCursor,
    ) -> Result<Option<(MeasurementBatch, PageCursor)>, FetchError> {
        if cursor.done {
            return Ok(None);
        }
        let request = MeasureRequest {
            entity,
            metrics: &cursor.metrics,
            scale: self.scale,
            date_begin: cursor.start,
            date_end: Some(window.end),
            limit: Some(self.page_limit),
        };
        let batch = self
            .client
            .measure(&request)
            .await
            .map_err(|err| match err {
                ApiError::InvalidData { source, .. } => FetchError::Data(source),
                other => FetchError::Api(other),
            })?;
        let Some(last) = batch.last_timestamp() else {
            debug!("{}: empty page from {}", entity, cursor.start);
            return Ok(None);
        };
        ensure_increasing(entity.id(), cursor.previous, batch.rows())?;
        debug!(
            "{}: {} rows from {} to {}",
            entity,
            batch.len(),
            cursor.start,
            last
        );

        let next_start = if batch.len() >= self.page_limit && last < window.end {
            last.checked_add_signed(TimeDelta::seconds(1))
        } else {
            None
        };
        let next = PageCursor {
            metrics: cursor.metrics,
            start: next_start.unwrap_or(window.end),
            previous: Some(last),
            done: next_start.is_none(),
        };
        Ok(Some((batch, next)))
    }

    /// Collects every page newer than `watermark` into one strictly increasing sequence.
    pub async fn new_rows(
        &self,
        entity: &'a Entity,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<Vec<MeasureRow>, FetchError> {
        let rows = self
            .pages(entity, watermark)
            .try_fold(Vec::new(), |mut rows, batch| async move {
                rows.extend(batch.into_rows());
                Ok(rows)
            })
            .await?;
        info!("{}: {} new rows", entity, rows.len());
        Ok(rows)
    }
}
