//! Provider health tracking with a windowed error-count circuit breaker
//!
//! A provider whose errors reach the threshold inside the window is taken
//! out of rotation for the recovery period. After that the circuit is
//! half-open: the next outcome either closes it or opens it again.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use switchboard_config::CircuitBreakerConfig;
use switchboard_core::Provider;

/// Circuit breaker state for a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow through
    Closed,
    /// Provider is failing, route elsewhere
    Open,
    /// Recovery period elapsed, next request is a trial
    HalfOpen,
}

#[derive(Debug)]
struct ProviderHealth {
    errors: AtomicU32,
    /// Unix seconds
    window_start: AtomicU64,
    /// Unix seconds, 0 while closed
    opened_at: AtomicU64,
}

impl ProviderHealth {
    fn new(now: u64) -> Self {
        Self {
            errors: AtomicU32::new(0),
            window_start: AtomicU64::new(now),
            opened_at: AtomicU64::new(0),
        }
    }
}

/// Per-provider circuit breakers
#[derive(Debug)]
pub struct ProviderHealthTracker {
    providers: DashMap<Provider, ProviderHealth>,
    config: CircuitBreakerConfig,
}

impl ProviderHealthTracker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            providers: DashMap::new(),
            config,
        }
    }

    /// Current circuit state for a provider
    pub fn state(&self, provider: Provider) -> CircuitState {
        self.state_at(provider, now_secs())
    }

    fn state_at(&self, provider: Provider, now: u64) -> CircuitState {
        let Some(health) = self.providers.get(&provider) else {
            return CircuitState::Closed;
        };

        match health.opened_at.load(Ordering::Acquire) {
            0 => CircuitState::Closed,
            opened_at if now.saturating_sub(opened_at) >= self.config.recovery_seconds => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }

    /// Whether requests may be sent to the provider
    pub fn is_available(&self, provider: Provider) -> bool {
        self.state(provider) != CircuitState::Open
    }

    /// Record a successful call; closes the circuit
    pub fn record_success(&self, provider: Provider) {
        let now = now_secs();
        let health = self.providers.entry(provider).or_insert_with(|| ProviderHealth::new(now));

        health.opened_at.store(0, Ordering::Release);
        health.errors.store(0, Ordering::Relaxed);
        health.window_start.store(now, Ordering::Relaxed);
    }

    /// Record a failed call
    pub fn record_failure(&self, provider: Provider) {
        self.record_failure_at(provider, now_secs());
    }

    fn record_failure_at(&self, provider: Provider, now: u64) {
        let was_half_open = self.state_at(provider, now) == CircuitState::HalfOpen;
        let health = self.providers.entry(provider).or_insert_with(|| ProviderHealth::new(now));

        if was_half_open {
            health.opened_at.store(now, Ordering::Release);
            drop(health);
            tracing::warn!(%provider, "trial request failed, circuit re-opened");
            return;
        }

        let window_start = health.window_start.load(Ordering::Relaxed);
        let errors = if now.saturating_sub(window_start) >= self.config.window_seconds {
            health.window_start.store(now, Ordering::Relaxed);
            health.errors.store(1, Ordering::Relaxed);
            1
        } else {
            health.errors.fetch_add(1, Ordering::Relaxed) + 1
        };

        if errors >= self.config.error_threshold && health.opened_at.load(Ordering::Acquire) == 0 {
            health.opened_at.store(now, Ordering::Release);
            drop(health);
            tracing::warn!(%provider, errors, "circuit breaker opened for provider");
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ProviderHealthTracker {
        ProviderHealthTracker::new(CircuitBreakerConfig {
            error_threshold: 3,
            window_seconds: 60,
            recovery_seconds: 5,
        })
    }

    #[test]
    fn unknown_provider_is_closed() {
        let tracker = tracker();
        assert_eq!(tracker.state(Provider::OpenAi), CircuitState::Closed);
        assert!(tracker.is_available(Provider::OpenAi));
    }

    #[test]
    fn threshold_opens_circuit() {
        let tracker = tracker();
        tracker.record_failure(Provider::Qwen);
        tracker.record_failure(Provider::Qwen);
        assert!(tracker.is_available(Provider::Qwen));

        tracker.record_failure(Provider::Qwen);
        assert_eq!(tracker.state(Provider::Qwen), CircuitState::Open);
        assert!(tracker.is_available(Provider::OpenAi));
    }

    #[test]
    fn errors_outside_window_do_not_accumulate() {
        let tracker = tracker();
        tracker.record_failure_at(Provider::OpenAi, 1_000);
        tracker.record_failure_at(Provider::OpenAi, 1_001);
        tracker.record_failure_at(Provider::OpenAi, 1_100);
        assert_eq!(tracker.state_at(Provider::OpenAi, 1_100), CircuitState::Closed);
    }

    #[test]
    fn recovery_period_half_opens_then_failure_reopens() {
        let tracker = tracker();
        for _ in 0..3 {
            tracker.record_failure_at(Provider::OpenAi, 1_000);
        }
        assert_eq!(tracker.state_at(Provider::OpenAi, 1_004), CircuitState::Open);
        assert_eq!(tracker.state_at(Provider::OpenAi, 1_005), CircuitState::HalfOpen);

        tracker.record_failure_at(Provider::OpenAi, 1_006);
        assert_eq!(tracker.state_at(Provider::OpenAi, 1_007), CircuitState::Open);
    }

    #[test]
    fn success_closes_circuit() {
        let tracker = tracker();
        for _ in 0..3 {
            tracker.record_failure(Provider::Local);
        }
        assert!(!tracker.is_available(Provider::Local));

        tracker.record_success(Provider::Local);
        assert_eq!(tracker.state(Provider::Local), CircuitState::Closed);
    }
}
