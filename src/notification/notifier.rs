//! Outbound notifier client
//!
//! `POST {url}` with `{"email": ..., "message": ...}`. Any 2xx is a
//! delivery; anything else, including transport errors, is a failed attempt
//! left to the retry engine.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::error::NotifyError;
use super::policy::NotifierConfig;

/// Delivery channel for one message
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns the response body on success
    async fn send(&self, email: &str, message: &str) -> Result<String, NotifyError>;
}

#[derive(Serialize)]
struct NotifyPayload<'a> {
    email: &'a str,
    message: &'a str,
}

/// HTTP notifier
pub struct HttpNotifier {
    client: Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(config: &NotifierConfig) -> Result<Self, NotifyError> {
        if config.url.is_empty() {
            return Err(NotifyError::Config("notifier url not configured".into()));
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| NotifyError::Config(e.to_string()))?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, email: &str, message: &str) -> Result<String, NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&NotifyPayload { email, message })
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!(status = %status, "Notifier responded");

        if status.is_success() {
            Ok(body)
        } else {
            Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Mock notifier for testing
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls, then succeeds
    pub struct MockNotifier {
        failures: AtomicUsize,
        calls: AtomicUsize,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl MockNotifier {
        pub fn ok() -> Self {
            Self::failing(0)
        }

        pub fn failing(failures: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
            }
        }

        pub fn always_failing() -> Self {
            Self::failing(usize::MAX)
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Successfully delivered (email, message) pairs
        pub fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn send(&self, email: &str, message: &str) -> Result<String, NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(NotifyError::Rejected {
                    status: 503,
                    body: "mock unavailable".to_string(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((email.to_string(), message.to_string()));
            Ok(r#"{"status":"success"}"#.to_string())
        }
    }
}
