//! Transport: one HTTP POST per call to the backend RPC endpoint.
use crate::error::TransportError;
use crate::wire::ENVELOPE_CONTENT_TYPE;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::{Duration, Instant};

/// Applied when the caller supplies no timeout, or a zero one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Carries an encoded envelope to the backend and returns the raw reply.
///
/// Implementations never retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, envelope: Vec<u8>, timeout: Option<Duration>) -> Result<Vec<u8>, TransportError>;
}

/// [`Transport`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    address: String,
    default_timeout: Duration,
}

impl HttpTransport {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            address: address.into(),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn classify(&self, err: reqwest::Error, timeout: Duration) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(timeout)
        } else if err.is_connect() {
            TransportError::Connect {
                address: self.address.clone(),
                source: err,
            }
        } else {
            TransportError::Request(err)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, envelope: Vec<u8>, timeout: Option<Duration>) -> Result<Vec<u8>, TransportError> {
        let timeout = timeout.filter(|t| !t.is_zero()).unwrap_or(self.default_timeout);
        let started = Instant::now();

        let response = self
            .client
            .post(&self.address)
            .header(CONTENT_TYPE, ENVELOPE_CONTENT_TYPE)
            .timeout(timeout)
            .body(envelope)
            .send()
            .await
            .map_err(|e| self.classify(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), address = %self.address, "backend rejected API call");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(timeout)
            } else {
                TransportError::Body(e)
            }
        })?;

        tracing::debug!(
            status = status.as_u16(),
            bytes = body.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "backend API call completed"
        );
        Ok(body.to_vec())
    }
}
