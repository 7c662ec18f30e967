use chrono::Utc;
use tracing::{debug, info, warn};

use super::checker::Checker;
use super::types::HealthCheck;
use crate::config::Endpoint;

/// Probe `endpoint` once and classify the outcome.
///
/// Exactly 200 is UP, any other answer is DEGRADED, no answer at all is
/// ERROR. There is no retry here; the next tick is the retry.
pub async fn perform_health_check(checker: &dyn Checker, endpoint: &Endpoint) -> HealthCheck {
    debug!("Starting health check for endpoint: {}", endpoint.url);
    let started_at = Utc::now();

    match checker.check(&endpoint.url, endpoint.timeout).await {
        Err(e) => {
            warn!("Error checking endpoint {}: {}", endpoint.url, e);
            HealthCheck::error(endpoint, started_at, e.to_string())
        }
        Ok(response) => {
            let elapsed_ms = response.elapsed.as_millis() as u64;
            if response.status_code == 200 {
                info!(
                    "Health check successful for {} - Response time: {}ms",
                    endpoint.url, elapsed_ms
                );
                HealthCheck::up(endpoint, started_at, elapsed_ms)
            } else {
                warn!(
                    "Health check degraded for {} - Status code: {}, Response time: {}ms",
                    endpoint.url, response.status_code, elapsed_ms
                );
                HealthCheck::degraded(endpoint, started_at, response.status_code, elapsed_ms)
            }
        }
    }
}
