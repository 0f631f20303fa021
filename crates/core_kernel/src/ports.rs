//! Ports and Adapters Infrastructure
//!
//! Each domain crate defines its own repository port that extends the marker
//! traits here. Adapters implement those ports either in memory (single
//! process, one writer per key) or against PostgreSQL (`infra_db`).
//!
//! ```text
//!   LedgerStore / LoanUnderwritingService
//!                  │
//!                  ▼
//!   LedgerRepository / LoanRepository  (port traits, domain crates)
//!          ▲                   ▲
//!          │                   │
//!   in-memory adapter    PostgreSQL adapter
//! ```

use serde::{Deserialize, Serialize};

/// Shared bound for repository ports
pub trait DomainPort: Send + Sync + 'static {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    Healthy,
    Unhealthy,
}

/// One adapter's answer to a readiness probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub adapter_id: String,
    pub status: AdapterHealth,
    /// Round trip of the probe query; zero for in-memory adapters
    pub latency_ms: u64,
    pub message: Option<String>,
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

impl HealthCheckResult {
    pub fn healthy(adapter_id: impl Into<String>) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: None,
            checked_at: chrono::Utc::now(),
        }
    }

    pub fn unhealthy(adapter_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status: AdapterHealth::Unhealthy,
            latency_ms: 0,
            message: Some(message.into()),
            checked_at: chrono::Utc::now(),
        }
    }

    pub fn is_operational(&self) -> bool {
        self.status == AdapterHealth::Healthy
    }
}

#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> HealthCheckResult;
}
