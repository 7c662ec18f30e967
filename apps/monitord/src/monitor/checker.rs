use std::error::Error as StdError;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

/// What a completed request reports back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status_code: u16,
    pub elapsed: Duration,
}

/// A request that did not produce a response
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Transport(String),
}

/// Outbound request client used by the polling loops
#[async_trait]
pub trait Checker: Send + Sync {
    /// Issue one GET against `url`, giving up after `timeout`
    async fn check(&self, url: &str, timeout: Duration) -> Result<ProbeResponse, CheckError>;
}

/// HTTP/HTTPS checker backed by one shared connection pool
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("monitord/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// reqwest wraps the interesting part (refused, dns, tls) in its source chain
fn describe(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[async_trait]
impl Checker for HttpChecker {
    async fn check(&self, url: &str, timeout: Duration) -> Result<ProbeResponse, CheckError> {
        let start = Instant::now();

        let response = self.client.get(url).timeout(timeout).send().await.map_err(|e| {
            if e.is_timeout() { CheckError::Timeout(timeout) } else { CheckError::Transport(describe(&e)) }
        })?;

        Ok(ProbeResponse { status_code: response.status().as_u16(), elapsed: start.elapsed() })
    }
}
