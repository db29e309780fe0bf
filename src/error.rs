//! Error handling utilities for the crate
use thiserror::Error;

use reqwest::Error as ReqwestError;

/// All errors raised by this crate will be instances of BlobError
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("No authentication token. Expected environment variable BLOB_READ_WRITE_TOKEN to contain a token")]
    NotAuthenticated(),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Access denied, please provide a valid token for this resource")]
    Forbidden(),
    #[error("The requested store does not exist")]
    StoreNotFound(),
    #[error("The requested store has been suspended")]
    StoreSuspended(),
    #[error("The requested blob does not exist")]
    BlobNotFound(),
    #[error("Internal HTTP error: {0}")]
    HttpError(#[from] ReqwestError),
    #[error("Unknown error, please visit https://vercel.com/help ({0}): {1}")]
    UnknownError(u16, String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// An operation was invoked from the wrong side of the client/server split
    #[error("{0}")]
    WrongContext(String),
    #[error("{0}")]
    InvalidCredential(String),
    #[error("Unable to sign client token")]
    SigningFailed(),
    #[error("Invalid client token: {0}")]
    InvalidClientToken(String),
    #[error("Invalid hex input: {0}")]
    InvalidHex(String),
    #[error("Missing callback signature")]
    MissingSignature(),
    #[error("Invalid callback signature")]
    InvalidSignature(),
    #[error("Failed to retrieve the client token: {0}")]
    TokenRetrieval(String),
    #[error("{0}")]
    PolicyViolation(String),
    #[error("Invalid event type: {0}")]
    InvalidEvent(String),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl BlobError {
    pub fn unknown_error(status_code: reqwest::StatusCode) -> Self {
        BlobError::UnknownError(
            status_code.as_u16(),
            status_code
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
        )
    }

    pub fn required(field_name: &str) -> Self {
        BlobError::InvalidInput(format!("{} is required", field_name))
    }

    pub(crate) fn server_only(operation: &str) -> Self {
        BlobError::WrongContext(format!(
            "\"{}\" must be called from a server environment",
            operation
        ))
    }

    pub(crate) fn client_only(operation: &str) -> Self {
        BlobError::WrongContext(format!(
            "client/`{}` must be called from a client environment",
            operation
        ))
    }
}

pub(crate) type Result<T> = std::result::Result<T, BlobError>;
