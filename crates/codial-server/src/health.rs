//! `/v1/health/*` endpoints (unauthenticated).

use serde::Serialize;

/// Health response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` or `"unavailable"`.
    pub status: String,
}

impl HealthResponse {
    /// A healthy response.
    #[must_use]
    pub fn ok() -> Self {
        Self { status: "ok".into() }
    }

    /// An unhealthy response.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            status: "unavailable".into(),
        }
    }
}

/// Readiness decision: configuration present and the worker pool running.
#[must_use]
pub fn readiness(config_ready: bool, workers_running: bool) -> HealthResponse {
    if config_ready && workers_running {
        HealthResponse::ok()
    } else {
        HealthResponse::unavailable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_when_configured_and_running() {
        assert_eq!(readiness(true, true).status, "ok");
    }

    #[test]
    fn unready_when_config_missing() {
        assert_eq!(readiness(false, true).status, "unavailable");
    }

    #[test]
    fn unready_when_workers_stopped() {
        assert_eq!(readiness(true, false).status, "unavailable");
    }

    #[test]
    fn serializes_status() {
        let json = serde_json::to_value(HealthResponse::ok()).unwrap();
        assert_eq!(json["status"], "ok");
    }
}
