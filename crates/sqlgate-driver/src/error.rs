//! Driver-boundary errors.

use sqlgate_commons::GatewayError;
use thiserror::Error;

pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Error, Debug)]
pub enum DriverError {
    /// Statement-level failure from the backing database.
    #[error("{message}")]
    Sql {
        message: String,
        /// Full driver error chain, kept for diagnostics.
        detail: Option<String>,
    },

    /// Missing table or other addressable object.
    #[error("{0}")]
    NotFound(String),

    /// The backend cannot express this operation or value.
    #[error("{0}")]
    Unsupported(String),
}

impl DriverError {
    pub fn sql(message: impl Into<String>, detail: Option<String>) -> Self {
        DriverError::Sql {
            message: message.into(),
            detail,
        }
    }
}

impl From<rusqlite::Error> for DriverError {
    fn from(err: rusqlite::Error) -> Self {
        DriverError::Sql {
            message: err.to_string(),
            detail: Some(format!("{err:?}")),
        }
    }
}

impl From<DriverError> for GatewayError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Sql { message, detail } => GatewayError::database(message, detail),
            DriverError::NotFound(what) => GatewayError::NotFound(what),
            DriverError::Unsupported(what) => GatewayError::Parameter(what),
        }
    }
}
