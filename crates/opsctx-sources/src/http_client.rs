use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;

use crate::SourceError;

const MAX_RETRY_DELAY_MS: u64 = 30_000;
const ERROR_BODY_MAX_CHARS: usize = 800;
pub const RETRY_ATTEMPT_HEADER: &str = "x-opsctx-retry-attempt";

/// Transport settings shared by every HTTP adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

/// Authorization scheme sent with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceAuth {
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// `Authorization: Token token=<token>`
    Token(String),
}

impl SourceAuth {
    fn header_value(&self) -> String {
        match self {
            Self::Bearer(token) => format!("Bearer {}", token.trim()),
            Self::Token(token) => format!("Token token={}", token.trim()),
        }
    }
}

/// JSON-over-HTTP client with bounded retries for one external system.
#[derive(Clone)]
pub struct SourceHttpClient {
    http: reqwest::Client,
    system: &'static str,
    base_url: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl SourceHttpClient {
    pub fn new(
        system: &'static str,
        base_url: &str,
        auth: &SourceAuth,
        settings: &HttpSettings,
    ) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("opsctx"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let auth_value =
            HeaderValue::from_str(&auth.header_value()).map_err(|_| SourceError::InvalidConfig {
                system,
                message: "authorization token contains invalid header characters".to_string(),
            })?;
        headers.insert(AUTHORIZATION, auth_value);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(settings.request_timeout_ms.max(1)))
            .build()
            .map_err(|error| SourceError::InvalidConfig {
                system,
                message: format!("failed to create http client: {error}"),
            })?;
        Ok(Self {
            http,
            system,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            retry_max_attempts: settings.retry_max_attempts.max(1),
            retry_base_delay_ms: settings.retry_base_delay_ms.max(1),
        })
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http.get(format!("{}{}", self.base_url, path))
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http.post(format!("{}{}", self.base_url, path))
    }

    /// Sends the request built by `request_builder`, retrying rate limits,
    /// server errors and connect/timeout failures with exponential backoff.
    pub async fn request_json<T, F>(
        &self,
        operation: &str,
        mut request_builder: F,
    ) -> Result<T, SourceError>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let operation = format!("{} {operation}", self.system);
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = request_builder()
                .header(RETRY_ATTEMPT_HEADER, attempt.saturating_sub(1).to_string())
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<T>().await.map_err(|error| {
                            SourceError::Decode {
                                operation: operation.clone(),
                                message: error.to_string(),
                            }
                        });
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if is_retryable_status(status.as_u16()) {
                        if attempt < self.retry_max_attempts {
                            tracing::debug!(
                                operation = operation.as_str(),
                                status = status.as_u16(),
                                attempt,
                                "retrying after retryable status"
                            );
                            tokio::time::sleep(retry_delay(
                                self.retry_base_delay_ms,
                                attempt,
                                retry_after,
                            ))
                            .await;
                            continue;
                        }
                        if status.as_u16() == 429 {
                            return Err(SourceError::RateLimited {
                                operation,
                                attempts: attempt,
                            });
                        }
                    }

                    return Err(SourceError::HttpStatus {
                        operation,
                        status: status.as_u16(),
                        body: truncate_for_error(&body, ERROR_BODY_MAX_CHARS),
                    });
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(SourceError::Transport { operation, error });
                }
            }
        }
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get("retry-after")?.to_str().ok()?;
    let seconds = raw.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds))
}

fn retry_delay(base_delay_ms: u64, attempt: usize, retry_after: Option<Duration>) -> Duration {
    let ceiling = Duration::from_millis(MAX_RETRY_DELAY_MS);
    if let Some(delay) = retry_after {
        return delay.clamp(Duration::from_millis(base_delay_ms).min(ceiling), ceiling);
    }
    let exponent = attempt.saturating_sub(1).min(10) as u32;
    let scaled = base_delay_ms.saturating_mul(2_u64.saturating_pow(exponent));
    Duration::from_millis(scaled).min(ceiling)
}

fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || status >= 500
}

fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
