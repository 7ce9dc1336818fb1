use crate::api::error::{ApiError, ApiErrorKind};
use crate::types::error::DataError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Data(#[from] DataError),
}

impl FetchError {
    /// True when the provider refused authorization even after a renewal.
    pub fn is_auth(&self) -> bool {
        matches!(self, FetchError::Api(e) if e.kind() == ApiErrorKind::Auth)
    }
}
