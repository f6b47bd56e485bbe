use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ProviderErrorKind, Result};
use crate::provider::Provider;
use crate::ratelimit::RateLimiter;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryPolicy {
    /// Retries after the first attempt for quota and overload errors.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    /// Base used for `Overloaded`; overloads clear faster than quotas.
    pub overload_base_delay_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 2_000,
            overload_base_delay_ms: 1_000,
            max_backoff_ms: 60_000,
            jitter_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    /// Whether a failure of `kind` on zero-based `attempt` may be retried.
    pub fn allows(&self, kind: ProviderErrorKind, attempt: u32) -> bool {
        match kind {
            ProviderErrorKind::QuotaExceeded | ProviderErrorKind::Overloaded => {
                attempt < self.max_retries
            }
            ProviderErrorKind::Transient => attempt < self.max_retries.min(1),
            ProviderErrorKind::AuthInvalid | ProviderErrorKind::BadRequest => false,
        }
    }

    /// `min(max_backoff, base * 2^attempt)` before jitter.
    pub fn backoff(&self, kind: ProviderErrorKind, attempt: u32) -> Duration {
        let base = match kind {
            ProviderErrorKind::Overloaded => self.overload_base_delay_ms,
            _ => self.base_delay_ms,
        };
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        Duration::from_millis(base.saturating_mul(factor).min(self.max_backoff_ms))
    }

    pub fn delay(&self, kind: ProviderErrorKind, attempt: u32) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        self.backoff(kind, attempt) + Duration::from_millis(jitter)
    }
}

/// Rate-limit gate plus retry policy, shared by every node that calls a
/// provider.
#[derive(Clone)]
pub struct ProviderService {
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl ProviderService {
    pub fn new(limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self { limiter, policy }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `call` against `provider` behind its gate, retrying retriable
    /// failures with backoff.
    pub async fn call<T, F, Fut>(&self, provider: Provider, mut call: F) -> Result<T>
    where
        F: FnMut(Provider) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            let result = {
                let _permit = self.limiter.acquire(provider).await?;
                call(provider).await
            };
            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let Some(kind) = err.provider_kind() else {
                return Err(err);
            };
            if !self.policy.allows(kind, attempt) {
                if attempt > 0 {
                    tracing::warn!(%provider, %kind, attempt, "giving up after retries");
                }
                return Err(err);
            }
            let delay = self.policy.delay(kind, attempt);
            tracing::info!(
                %provider,
                %kind,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying provider call"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Like [`call`](Self::call), moving to the next provider in `chain` when
    /// one stays over quota after its retries.
    pub async fn call_with_fallback<T, F, Fut>(&self, chain: &[Provider], mut call: F) -> Result<T>
    where
        F: FnMut(Provider) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some((last, rest)) = chain.split_last() else {
            return Err(crate::error::GraphError::bad_request("empty provider chain"));
        };
        for provider in rest {
            match self.call(*provider, &mut call).await {
                Err(err) if err.is_quota_exceeded() => {
                    tracing::warn!(%provider, error = %err, "provider over quota, falling back");
                }
                other => return other,
            }
        }
        self.call(*last, &mut call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GraphError, ProviderError};
    use crate::ratelimit::GateConfig;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn service(max_retries: u32) -> ProviderService {
        let configs = Provider::ALL
            .iter()
            .map(|p| {
                (
                    *p,
                    GateConfig {
                        min_interval: Duration::ZERO,
                        max_concurrent: 1,
                    },
                )
            })
            .collect::<HashMap<_, _>>();
        ProviderService::new(
            Arc::new(RateLimiter::new(configs)),
            RetryPolicy {
                max_retries,
                base_delay_ms: 1_000,
                overload_base_delay_ms: 100,
                max_backoff_ms: 3_000,
                jitter_ms: 0,
            },
        )
    }

    fn failure(provider: Provider, kind: ProviderErrorKind) -> GraphError {
        ProviderError::new(provider, kind, "boom").into()
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = service(5).policy;
        let quota = ProviderErrorKind::QuotaExceeded;
        assert_eq!(policy.backoff(quota, 0), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(quota, 1), Duration::from_millis(2_000));
        assert_eq!(policy.backoff(quota, 2), Duration::from_millis(3_000));
        assert_eq!(policy.backoff(quota, 40), Duration::from_millis(3_000));
        assert_eq!(
            policy.backoff(ProviderErrorKind::Overloaded, 0),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = RetryPolicy {
            jitter_ms: 250,
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let delay = policy.delay(ProviderErrorKind::QuotaExceeded, 0);
            assert!(delay >= Duration::from_millis(2_000));
            assert!(delay <= Duration::from_millis(2_250));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn quota_errors_retry_with_backoff_then_succeed() {
        let service = service(3);
        let attempts = AtomicU32::new(0);
        let started = Instant::now();
        let value = service
            .call(Provider::Gemini, |provider| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(failure(provider, ProviderErrorKind::QuotaExceeded))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(3_000));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let service = service(2);
        let attempts = AtomicU32::new(0);
        let err = service
            .call(Provider::Groq, |provider| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move { Err::<(), _>(failure(provider, ProviderErrorKind::Overloaded)) }
            })
            .await
            .unwrap_err();
        assert_eq!(err.provider_kind(), Some(ProviderErrorKind::Overloaded));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_and_bad_request_fail_immediately_transient_retries_once() {
        let service = service(3);
        for (kind, expected) in [
            (ProviderErrorKind::AuthInvalid, 1),
            (ProviderErrorKind::BadRequest, 1),
            (ProviderErrorKind::Transient, 2),
        ] {
            let attempts = AtomicU32::new(0);
            let _ = service
                .call(Provider::OpenAi, |provider| {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async move { Err::<(), _>(failure(provider, kind)) }
                })
                .await;
            assert_eq!(attempts.load(Ordering::SeqCst), expected, "{kind}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_moves_on_only_for_quota() {
        let service = service(1);
        let value = service
            .call_with_fallback(&[Provider::Gemini, Provider::Groq], |provider| async move {
                match provider {
                    Provider::Gemini => Err(failure(provider, ProviderErrorKind::QuotaExceeded)),
                    _ => Ok(provider),
                }
            })
            .await
            .unwrap();
        assert_eq!(value, Provider::Groq);

        let err = service
            .call_with_fallback(&[Provider::Gemini, Provider::Groq], |provider| async move {
                match provider {
                    Provider::Gemini => Err(failure(provider, ProviderErrorKind::AuthInvalid)),
                    _ => Ok(provider),
                }
            })
            .await
            .unwrap_err();
        assert_eq!(err.provider_kind(), Some(ProviderErrorKind::AuthInvalid));
    }
}
