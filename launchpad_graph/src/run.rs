use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on node executions per run when no budget is configured.
/// Loops are bounded by their routers; this only catches a runaway router.
pub const DEFAULT_MAX_SUPERSTEPS: i64 = 256;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunConfig {
    #[serde(default)]
    pub budgets: Option<BudgetConfig>,
    #[serde(default)]
    pub concurrency: Option<ConcurrencyConfig>,
    /// Per-node wall-clock limit. A node exceeding it fails with a timeout.
    #[serde(default)]
    pub node_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BudgetConfig {
    pub max_time_ms: Option<u64>,
    pub max_supersteps: Option<i64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConcurrencyConfig {
    pub max_concurrent_nodes: Option<i64>,
}

impl RunConfig {
    pub fn max_supersteps(&self) -> i64 {
        self.budgets
            .as_ref()
            .and_then(|b| b.max_supersteps)
            .unwrap_or(DEFAULT_MAX_SUPERSTEPS)
    }

    pub fn max_time(&self) -> Option<Duration> {
        self.budgets
            .as_ref()
            .and_then(|b| b.max_time_ms)
            .map(Duration::from_millis)
    }

    pub fn max_concurrent_nodes(&self) -> usize {
        self.concurrency
            .as_ref()
            .and_then(|c| c.max_concurrent_nodes)
            .map(|n| n.max(1) as usize)
            .unwrap_or(usize::MAX)
    }

    pub fn node_timeout(&self) -> Option<Duration> {
        self.node_timeout_ms.map(Duration::from_millis)
    }
}
