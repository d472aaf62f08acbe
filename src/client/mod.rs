pub mod weatherbit;

pub use weatherbit::WeatherbitClient;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;

/// Mode-specific query parameters
#[derive(Debug, Clone, PartialEq)]
pub enum FetchParams {
    Forecast { hours: u32 },
    History {
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub params: FetchParams,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Network request failed for {url}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("HTTP request failed for {url} with status {status}: {body}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Response from {url} is not valid JSON")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid request parameters: {0}")]
    InvalidParameters(String),
}

impl FetchError {
    /// Upstream HTTP status, when the failure carried one
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            FetchError::HttpStatus { status, .. } => Some(*status),
            FetchError::Request { source, .. } | FetchError::Decode { source, .. } => {
                source.status()
            }
            _ => None,
        }
    }
}

/// The upstream weather API.
///
/// Implementations own their retry, backoff and timeout policy; callers
/// see either a decoded JSON payload or the final error.
#[async_trait]
pub trait WeatherFetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<serde_json::Value, FetchError>;
}

#[async_trait]
impl<T: WeatherFetcher + ?Sized> WeatherFetcher for Arc<T> {
    async fn fetch(&self, request: &FetchRequest) -> Result<serde_json::Value, FetchError> {
        (**self).fetch(request).await
    }
}
