use thiserror::Error;

/// Errors surfaced by the record stores and the sheets adapter.
///
/// `Validation` and `NotFound` are recoverable request-level conditions;
/// everything else is an upstream failure that aborts the request.
#[derive(Debug, Error)]
pub enum Error {
    /// A required field was missing or a value failed boundary validation.
    #[error("{0}")]
    Validation(String),

    /// The requested record does not exist. Carries the entity name
    /// ("Lead" or "Student") for the response message.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Transport or HTTP-level failure talking to the Sheets API.
    #[error("sheets api request failed: {0}")]
    Sheets(#[from] reqwest::Error),

    /// A stored cell (the logs column) holds text that is not valid JSON.
    #[error("stored cell is not valid JSON: {0}")]
    Data(#[from] serde_json::Error),

    /// Service-account key rejected or JWT signing failed.
    #[error("google auth failed: {0}")]
    Auth(#[from] jsonwebtoken::errors::Error),

    /// The configured tab title does not exist in the spreadsheet.
    #[error("no sheet tab named {0:?}")]
    UnknownTab(String),
}

pub type Result<T> = std::result::Result<T, Error>;
