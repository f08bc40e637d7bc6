//! HTTP utilities for provider REST API calls
//!
//! One [`ApiHttpClient`] is owned by each provider client. The underlying
//! connection pool is built on first use and dropped by [`ApiHttpClient::close`].

use crate::config::ClientSettings;
use crate::error::RequestError;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

const USER_AGENT: &str = concat!("cloudschema/", env!("CARGO_PKG_VERSION"));

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// HTTP client wrapper with lazy connection setup and retry policy
pub struct ApiHttpClient {
    client: Mutex<Option<Client>>,
    settings: ClientSettings,
}

impl ApiHttpClient {
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            client: Mutex::new(None),
            settings,
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Get the connection pool, creating it on first use
    pub fn open(&self) -> Result<Client, RequestError> {
        let mut guard = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.settings.timeout())
            .build()
            .map_err(RequestError::Client)?;

        tracing::debug!("Opened HTTP client (timeout {:?})", self.settings.timeout());
        *guard = Some(client.clone());
        Ok(client)
    }

    pub fn is_open(&self) -> bool {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Release the connection pool. Safe to call repeatedly.
    pub fn close(&self) {
        let released = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            tracing::debug!("Closed HTTP client");
        }
    }

    /// Delay before the retry that follows `attempt` (0-indexed): base * 2^attempt
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.settings
            .backoff_base()
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// GET a JSON document with bearer auth
    ///
    /// 429, transient transport failures and interrupted response bodies are
    /// retried with exponential backoff until `max_retries` attempts have
    /// been made. Any other error status fails immediately.
    pub async fn get_json(&self, url: &str, token: &str) -> Result<Value, RequestError> {
        let client = self.open()?;
        let attempts = self.settings.max_retries.max(1);
        let mut last = String::new();

        for attempt in 0..attempts {
            tracing::debug!("GET {} (attempt {}/{})", url, attempt + 1, attempts);

            match client.get(url).bearer_auth(token).send().await {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    tracing::warn!("Rate limited: {}", url);
                    last = format!("rate limited ({})", response.status());
                }
                Ok(response) if !response.status().is_success() => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    // Security: Only log sanitized/truncated error body
                    tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
                    return Err(RequestError::Status {
                        status: status.as_u16(),
                        url: url.to_string(),
                    });
                }
                Ok(response) => match response.text().await {
                    Ok(body) if body.is_empty() => return Ok(Value::Null),
                    Ok(body) => return Ok(serde_json::from_str(&body)?),
                    // Headers arrived but the body stalled or was cut off
                    Err(err) => {
                        tracing::warn!("Failed to read body from {}: {}", url, err);
                        last = err.to_string();
                    }
                },
                Err(err) if RequestError::is_transient(&err) => {
                    tracing::warn!("Transient error for {}: {}", url, err);
                    last = err.to_string();
                }
                Err(err) => return Err(RequestError::Transport(err)),
            }

            if attempt + 1 < attempts {
                tokio::time::sleep(self.backoff_delay(attempt)).await;
            }
        }

        Err(RequestError::RetriesExhausted { attempts, last })
    }
}
