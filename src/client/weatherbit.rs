use crate::client::{FetchError, FetchParams, FetchRequest, WeatherFetcher};
use crate::utils::constants::{
    DEFAULT_HTTP_MAX_RETRIES, DEFAULT_HTTP_TIMEOUT_SECS, FORECAST_ENDPOINT, HISTORY_ENDPOINT,
    MAX_FORECAST_HOURS, MIN_FORECAST_HOURS, RETRY_DELAY_BASE_MS, WEATHERBIT_BASE_URL,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Weatherbit hourly history/forecast client with bounded retries
pub struct WeatherbitClient {
    client: Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
    retry_delay_base: Duration,
}

impl WeatherbitClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, FetchError> {
        Self::builder(api_key).build()
    }

    pub fn builder(api_key: impl Into<String>) -> WeatherbitClientBuilder {
        WeatherbitClientBuilder::new(api_key)
    }

    /// Endpoint URL and query pairs (without the API key) for a request
    pub fn query_for(
        &self,
        request: &FetchRequest,
    ) -> Result<(String, Vec<(&'static str, String)>), FetchError> {
        let mut query = vec![
            ("lat", request.latitude.to_string()),
            ("lon", request.longitude.to_string()),
        ];

        let endpoint = match &request.params {
            FetchParams::Forecast { hours } => {
                if !(MIN_FORECAST_HOURS..=MAX_FORECAST_HOURS).contains(hours) {
                    return Err(FetchError::InvalidParameters(format!(
                        "forecast hours must be within {}..={}, got {}",
                        MIN_FORECAST_HOURS, MAX_FORECAST_HOURS, hours
                    )));
                }
                query.push(("hours", hours.to_string()));
                query.push(("units", "M".to_string()));
                FORECAST_ENDPOINT
            }
            FetchParams::History {
                start_date,
                end_date,
            } => {
                if start_date > end_date {
                    return Err(FetchError::InvalidParameters(format!(
                        "start_date {} is after end_date {}",
                        start_date, end_date
                    )));
                }
                query.push(("start_date", start_date.format("%Y-%m-%d").to_string()));
                query.push(("end_date", end_date.format("%Y-%m-%d").to_string()));
                HISTORY_ENDPOINT
            }
        };

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint);
        Ok((url, query))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay_base * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Transient upstream statuses worth another attempt
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl WeatherFetcher for WeatherbitClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<Value, FetchError> {
        let (url, mut query) = self.query_for(request)?;
        query.push(("key", self.api_key.clone()));

        let mut attempt = 0;
        loop {
            attempt += 1;
            info!(
                url = %url,
                lat = request.latitude,
                lon = request.longitude,
                "Fetching weather data (attempt {}/{})",
                attempt,
                self.max_retries
            );

            let last_attempt = attempt >= self.max_retries;
            let outcome = self.client.get(&url).query(&query).send().await;

            let failure = match outcome {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let payload: Value = response.json().await.map_err(|source| {
                            FetchError::Decode {
                                url: url.clone(),
                                source,
                            }
                        })?;
                        let count = payload
                            .get("data")
                            .and_then(Value::as_array)
                            .map_or(0, Vec::len);
                        info!(url = %url, "Successfully fetched {} records", count);
                        return Ok(payload);
                    }

                    let body = response.text().await.unwrap_or_default();
                    let err = FetchError::HttpStatus {
                        url: url.clone(),
                        status,
                        body,
                    };
                    if !is_retryable_status(status) {
                        error!(url = %url, status = %status, "HTTP error, not retrying");
                        return Err(err);
                    }
                    err
                }
                Err(source) if source.is_timeout() => FetchError::Timeout { url: url.clone() },
                Err(source) => FetchError::Request {
                    url: url.clone(),
                    source,
                },
            };

            if last_attempt {
                error!(url = %url, "Request failed after {} attempts: {}", attempt, failure);
                return Err(failure);
            }

            let delay = self.backoff(attempt);
            warn!(
                url = %url,
                "Request failed: {}, retrying in {:?}",
                failure,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

pub struct WeatherbitClientBuilder {
    api_key: String,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    retry_delay_base: Duration,
    verify_ssl: bool,
    proxy_url: Option<String>,
}

impl WeatherbitClientBuilder {
    fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: WEATHERBIT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            max_retries: DEFAULT_HTTP_MAX_RETRIES,
            retry_delay_base: Duration::from_millis(RETRY_DELAY_BASE_MS),
            verify_ssl: true,
            proxy_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_retry_delay_base(mut self, delay: Duration) -> Self {
        self.retry_delay_base = delay;
        self
    }

    pub fn with_verify_ssl(mut self, verify_ssl: bool) -> Self {
        self.verify_ssl = verify_ssl;
        self
    }

    pub fn with_proxy_url(mut self, proxy_url: Option<String>) -> Self {
        self.proxy_url = proxy_url.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn build(self) -> Result<WeatherbitClient, FetchError> {
        let mut builder = Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(!self.verify_ssl);

        if let Some(proxy_url) = &self.proxy_url {
            debug!("Using proxy {}", proxy_url);
            let proxy = reqwest::Proxy::all(proxy_url).map_err(FetchError::ClientBuild)?;
            builder = builder.proxy(proxy);
        }

        if !self.verify_ssl {
            warn!("TLS certificate verification is disabled");
        }

        let client = builder.build().map_err(FetchError::ClientBuild)?;

        Ok(WeatherbitClient {
            client,
            api_key: self.api_key,
            base_url: self.base_url,
            max_retries: self.max_retries,
            retry_delay_base: self.retry_delay_base,
        })
    }
}
