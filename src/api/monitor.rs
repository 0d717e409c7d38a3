use serde::{Deserialize, Serialize};

use crate::api::client::ApiClient;
use crate::error::{ClientError, Result};

/// Response of `GET /monitor/health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub database_connected: bool,
}

/// Service-wide counters from `GET /monitor/stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_tasks: u64,
    pub running_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub total_templates: u64,
    pub custom_templates: u64,
}

impl ApiClient {
    pub async fn health(&self) -> Result<HealthStatus> {
        self.get("/monitor/health")
            .await?
            .ok_or_else(|| ClientError::MissingData("/monitor/health".to_string()))
    }

    pub async fn system_stats(&self) -> Result<SystemStats> {
        self.get("/monitor/stats")
            .await?
            .ok_or_else(|| ClientError::MissingData("/monitor/stats".to_string()))
    }
}
