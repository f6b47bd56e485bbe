//! Process-wide min-interval gate and concurrency cap per provider.
//!
//! Every call to provider `p` waits until `last_call[p] + min_interval[p]` and
//! holds one of `max_concurrent[p]` permits for its duration. Waits are plain
//! tokio timers, so dropping the calling future abandons the wait.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::error::{GraphError, Result};
use crate::provider::Provider;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    pub min_interval: Duration,
    pub max_concurrent: usize,
}

impl GateConfig {
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            min_interval: provider.default_min_interval(),
            max_concurrent: 1,
        }
    }
}

pub struct ProviderGate {
    provider: Provider,
    config: GateConfig,
    semaphore: Arc<Semaphore>,
    last_call: Mutex<Option<Instant>>,
}

/// Held for the duration of one outbound call.
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ProviderGate {
    pub fn new(provider: Provider, config: GateConfig) -> Self {
        let permits = config.max_concurrent.max(1);
        Self {
            provider,
            config,
            semaphore: Arc::new(Semaphore::new(permits)),
            last_call: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub async fn acquire(&self) -> Result<GatePermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GraphError::unavailable(format!("{} gate closed", self.provider)))?;

        // The lock is held across the sleep so waiters leave one interval apart.
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let ready_at = previous + self.config.min_interval;
            let now = Instant::now();
            if ready_at > now {
                tracing::debug!(
                    provider = %self.provider,
                    delay_ms = (ready_at - now).as_millis() as u64,
                    "rate limit gate waiting"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last_call = Some(Instant::now());
        Ok(GatePermit { _permit: permit })
    }
}

#[derive(Default)]
pub struct RateLimiter {
    configs: HashMap<Provider, GateConfig>,
    gates: DashMap<Provider, Arc<ProviderGate>>,
}

impl RateLimiter {
    /// Limiter with per-provider overrides; providers not listed use their
    /// defaults.
    pub fn new(configs: HashMap<Provider, GateConfig>) -> Self {
        Self {
            configs,
            gates: DashMap::new(),
        }
    }

    pub fn gate(&self, provider: Provider) -> Arc<ProviderGate> {
        self.gates
            .entry(provider)
            .or_insert_with(|| {
                let config = self
                    .configs
                    .get(&provider)
                    .cloned()
                    .unwrap_or_else(|| GateConfig::for_provider(provider));
                Arc::new(ProviderGate::new(provider, config))
            })
            .clone()
    }

    pub async fn acquire(&self, provider: Provider) -> Result<GatePermit> {
        self.gate(provider).acquire().await
    }
}
