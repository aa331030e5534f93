//! Service configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the workflow service.
///
/// Loaded from a TOML file at startup. Every field has a default, so an
/// empty or missing file yields a runnable configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub service: ServiceSection,
    pub database: DatabaseSection,
    pub bus: BusSection,
    pub retry: RetrySection,
    pub orchestrator: OrchestratorSection,
}

impl ServiceConfig {
    /// `<service>_exchange`
    pub fn exchange_name(&self) -> String {
        format!("{}_exchange", self.service.name)
    }

    /// `<service>_queue`
    pub fn queue_name(&self) -> String {
        format!("{}_queue", self.service.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    pub name: String,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: "workflow_service".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// SQLite URL, e.g. `sqlite://flho.db`. Overridden by `FLHO_DATABASE_URL`.
    pub url: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: "sqlite://flho.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSection {
    /// Upper bound on how long a publish may block its caller.
    pub publish_timeout_secs: u64,
    /// Buffered deliveries per queue before publishes are dropped.
    pub queue_capacity: usize,
    /// Partner exchanges whose events this service consumes.
    pub partners: Vec<PartnerBinding>,
}

impl BusSection {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            publish_timeout_secs: 5,
            queue_capacity: 1024,
            partners: vec![PartnerBinding {
                exchange: "identity_service_exchange".to_string(),
                entities: vec!["identity".to_string()],
            }],
        }
    }
}

/// A partner exchange and the entities bound from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerBinding {
    pub exchange: String,
    pub entities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub http_timeout_secs: u64,
    /// Workers invoking retry targets.
    pub workers: usize,
    /// Pending invocations before new ones are rejected.
    pub queue_capacity: usize,
    pub user_agent: String,
}

impl RetrySection {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            http_timeout_secs: 10,
            workers: 4,
            queue_capacity: 256,
            user_agent: concat!("flho/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// Re-arm countdowns for persisted runs at startup.
    pub recover_on_startup: bool,
    /// How often `serve` rescans persisted runs for retry states without a
    /// live countdown, e.g. runs started or advanced by another process.
    /// `0` disables the sweep.
    pub sweep_interval_secs: u64,
}

impl OrchestratorSection {
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            recover_on_startup: true,
            sweep_interval_secs: 30,
        }
    }
}
