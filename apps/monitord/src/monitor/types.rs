use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Endpoint;

/// Classification of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    /// The endpoint answered with exactly 200
    Up,
    /// The endpoint answered, but with any other status code
    Degraded,
    /// No response was received
    Error,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Up => "UP",
            CheckStatus::Degraded => "DEGRADED",
            CheckStatus::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CheckStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(CheckStatus::Up),
            "DEGRADED" => Ok(CheckStatus::Degraded),
            "ERROR" => Ok(CheckStatus::Error),
            other => Err(format!("unknown check status: {other}")),
        }
    }
}

/// Result of a single health check.
///
/// Built once per probe through [`HealthCheck::up`], [`HealthCheck::degraded`]
/// or [`HealthCheck::error`], so the optional fields always match the status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    /// Endpoint name at probe time
    pub name: String,

    /// URL that was checked
    pub url: String,

    /// Status of the check
    pub status: CheckStatus,

    /// HTTP status code, present for UP and DEGRADED
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    /// Response time in milliseconds, present when a response arrived
    #[serde(default, rename = "responseTime", skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    /// When the probe started
    pub timestamp: DateTime<Utc>,

    /// Failure description, present for ERROR
    #[serde(default, rename = "error", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Endpoint tags at probe time
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl HealthCheck {
    fn base(endpoint: &Endpoint, timestamp: DateTime<Utc>, status: CheckStatus) -> Self {
        Self {
            name: endpoint.name.clone(),
            url: endpoint.url.clone(),
            status,
            status_code: None,
            response_time_ms: None,
            timestamp,
            error_message: None,
            tags: endpoint.tags.clone(),
        }
    }

    pub fn up(endpoint: &Endpoint, timestamp: DateTime<Utc>, response_time_ms: u64) -> Self {
        Self {
            status_code: Some(200),
            response_time_ms: Some(response_time_ms),
            ..Self::base(endpoint, timestamp, CheckStatus::Up)
        }
    }

    pub fn degraded(
        endpoint: &Endpoint,
        timestamp: DateTime<Utc>,
        status_code: u16,
        response_time_ms: u64,
    ) -> Self {
        Self {
            status_code: Some(status_code),
            response_time_ms: Some(response_time_ms),
            ..Self::base(endpoint, timestamp, CheckStatus::Degraded)
        }
    }

    pub fn error(endpoint: &Endpoint, timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::base(endpoint, timestamp, CheckStatus::Error)
        }
    }
}
