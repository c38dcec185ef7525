//! External Authorization Client
//!
//! Yes/no gate consulted before a transfer mutates anything. The remote
//! contract carries no transfer payload: a plain `GET` whose answer is
//! interpreted by [`interpret_response`].
//!
//! # Failure policy
//!
//! - Any HTTP response is definitive and never retried
//! - Non-2xx → denied
//! - 2xx with an ambiguous body → approved (fail-open)
//! - Timeout / connection error → retried up to `max_attempts`, then `Err`,
//!   which the transfer core treats as denied (fail-closed)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Authorization transport errors
#[derive(Debug, Error)]
pub enum AuthorizationError {
    #[error("Authorizer transport error after {attempts} attempt(s): {message}")]
    Transport { attempts: u32, message: String },

    #[error("Authorizer client configuration error: {0}")]
    Config(String),
}

/// Yes/no authorization gate
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// `Ok(true)` approves, `Ok(false)` denies, `Err` is a transport failure
    async fn authorize(&self) -> Result<bool, AuthorizationError>;
}

/// Authorizer client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizerConfig {
    pub url: String,
    pub timeout_ms: u64,
    /// Total attempts for transient transport errors (1 = no retry)
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    /// Approve every request without a network call
    pub bypass: bool,
}

impl Default for AuthorizerConfig {
    fn default() -> Self {
        Self {
            url: "https://util.devi.tools/api/v2/authorize".to_string(),
            timeout_ms: 5_000,
            max_attempts: 2,
            retry_delay_ms: 1_000,
            bypass: false,
        }
    }
}

impl AuthorizerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Build the authorizer selected by `config`
pub fn build_authorizer(
    config: &AuthorizerConfig,
) -> Result<std::sync::Arc<dyn Authorizer>, AuthorizationError> {
    if config.bypass {
        warn!("Authorizer bypass enabled - every transfer will be approved");
        return Ok(std::sync::Arc::new(BypassAuthorizer));
    }
    Ok(std::sync::Arc::new(HttpAuthorizer::new(config.clone())?))
}

/// Interpret a definitive authorizer response.
///
/// Non-2xx denies. A 2xx body is checked for a `status` field (approved iff
/// `"success"`), then for a free-text `message` field (approved iff it reads
/// "authorized"/"autorizado"). Neither field present approves.
pub fn interpret_response(status: StatusCode, body: &str) -> bool {
    if !status.is_success() {
        return false;
    }

    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return true,
    };

    if let Some(s) = value.get("status").and_then(|v| v.as_str()) {
        return s == "success";
    }

    if let Some(msg) = value.get("message").and_then(|v| v.as_str()) {
        let msg = msg.trim();
        return msg.eq_ignore_ascii_case("authorized") || msg.eq_ignore_ascii_case("autorizado");
    }

    true
}

/// HTTP authorizer client
pub struct HttpAuthorizer {
    client: Client,
    config: AuthorizerConfig,
}

impl HttpAuthorizer {
    pub fn new(config: AuthorizerConfig) -> Result<Self, AuthorizationError> {
        if config.url.is_empty() {
            return Err(AuthorizationError::Config("authorizer url not configured".into()));
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AuthorizationError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Timeouts and connection errors may succeed on a second try
    fn is_transient(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect()
    }
}

#[async_trait]
impl Authorizer for HttpAuthorizer {
    async fn authorize(&self) -> Result<bool, AuthorizationError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let err = match self.client.get(&self.config.url).send().await {
                Ok(response) => {
                    let status = response.status();
                    match response.text().await {
                        Ok(body) => {
                            let approved = interpret_response(status, &body);
                            debug!(status = %status, approved, attempt, "Authorizer responded");
                            return Ok(approved);
                        }
                        // A non-2xx status is already a denial without reading the body
                        Err(_) if !status.is_success() => return Ok(false),
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            if attempt < max_attempts && Self::is_transient(&err) {
                warn!(
                    attempt,
                    max_attempts,
                    error = %err,
                    "Authorizer transport error, retrying"
                );
                tokio::time::sleep(self.config.retry_delay()).await;
                continue;
            }

            return Err(AuthorizationError::Transport {
                attempts: attempt,
                message: err.to_string(),
            });
        }
    }
}

/// Always approves; for environments without the external dependency
pub struct BypassAuthorizer;

#[async_trait]
impl Authorizer for BypassAuthorizer {
    async fn authorize(&self) -> Result<bool, AuthorizationError> {
        Ok(true)
    }
}
