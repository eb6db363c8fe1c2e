//! Structured health report for a graph store client

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ConnectionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub connected: bool,
    /// Round-trip time of the liveness probe
    pub response_time_ms: Option<f64>,
    pub database: String,
    pub host: String,
    pub port: u16,
    pub test_query_success: Option<bool>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HealthStatus {
    pub fn healthy(config: &ConnectionConfig, response_time_ms: f64, test_query_success: bool) -> Self {
        Self {
            status: HealthState::Healthy,
            connected: true,
            response_time_ms: Some(response_time_ms),
            database: config.database.clone(),
            host: config.host.clone(),
            port: config.port,
            test_query_success: Some(test_query_success),
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// `connected` is the client state at the time of the failure.
    pub fn unhealthy(
        config: &ConnectionConfig,
        connected: bool,
        response_time_ms: Option<f64>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            status: HealthState::Unhealthy,
            connected,
            response_time_ms,
            database: config.database.clone(),
            host: config.host.clone(),
            port: config.port,
            test_query_success: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}
