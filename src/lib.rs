//! Incrementally download Netatmo weather station measurements into append-only CSV
//! files.
//!
//! A fetch cycle authenticates, reads the station's metadata, and for the station and
//! each of its modules requests every measurement newer than the last one already in
//! the [`CsvLedger`], page by page. Requests are sent one at a time.

mod api;
mod auth;
mod config;
mod error;
mod fetch;
mod ledger;
mod netatmo;
mod registry;
mod transport;
mod types;
mod utils;

pub use error::NetatmoError;
pub use netatmo::*;

pub use config::{
    Credentials, NetatmoOptions, DEFAULT_BASE_URL, DEFAULT_FIRST_FETCH_LOOKBACK,
    DEFAULT_PAGE_LIMIT, DEFAULT_TOKEN_SAFETY_MARGIN,
};

pub use auth::error::{AuthError, GrantType};
pub use auth::token_manager::{TokenManager, TokenState};

pub use api::client::{ApiClient, MeasureRequest};
pub use api::error::{ApiError, ApiErrorKind};
pub use api::schema::{RawDashboard, RawDevice, RawModule};

pub use fetch::error::FetchError;
pub use fetch::incremental::{FetchWindow, IncrementalFetcher};

pub use ledger::csv_ledger::{
    CsvLedger, DEVICE_COLUMNS, DEVICE_FILE_NAME, MODULE_COLUMNS, MODULE_FILE_NAME,
};
pub use ledger::error::LedgerError;
pub use ledger::frame::LedgerFrame;

pub use registry::{is_mac_address, ModuleRef, StationRegistry};

pub use transport::error::TransportError;
pub use transport::http::{HttpTransport, DEFAULT_REQUEST_TIMEOUT};
pub use transport::{HttpResponse, Transport};

pub use types::device::{Device, Entity, EntityKind, Module, INDOOR_MODULE_TYPE, STATION_TYPE};
pub use types::error::DataError;
pub use types::measurement::{MeasureRow, MeasurementBatch, Watermark};
pub use types::metric::{Metric, Scale};
pub use utils::get_data_dir;
