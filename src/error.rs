use crate::api::error::{ApiError, ApiErrorKind};
use crate::auth::error::AuthError;
use crate::fetch::error::FetchError;
use crate::ledger::error::LedgerError;
use crate::transport::error::TransportError;
use crate::types::error::DataError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetatmoError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("No station named '{0}' on this account")]
    StationNotFound(String),

    #[error("The account has no weather station")]
    NoStation,
}

impl NetatmoError {
    /// Authorization failures end a fetch cycle; every other error only affects one entity.
    pub fn is_auth(&self) -> bool {
        match self {
            NetatmoError::Auth(_) => true,
            NetatmoError::Api(e) => e.kind() == ApiErrorKind::Auth,
            _ => false,
        }
    }
}

impl From<FetchError> for NetatmoError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Api(e) => NetatmoError::Api(e),
            FetchError::Data(e) => NetatmoError::Data(e),
        }
    }
}
