//! Outbound transport boundary.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::{Error, Result};

/// A reply as the transport saw it, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReply {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl RawReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            body: body.into(),
        }
    }

    pub fn with_status(status: u16, status_text: &str) -> Self {
        Self {
            status,
            status_text: status_text.to_string(),
            body: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status / 100 == 2
    }
}

/// Performs one outbound call.
///
/// An `Err` means no reply was obtained at all; any reply, whatever its
/// status, comes back as `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn invoke(&self, target: &str) -> Result<RawReply>;
}

/// HTTP GET transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("muster/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Connection(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn invoke(&self, target: &str) -> Result<RawReply> {
        let response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(|e| Error::Connection(format!("GET {}: {}", target, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Connection(format!("reading body of {}: {}", target, e)))?;

        Ok(RawReply {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            body,
        })
    }
}
