use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use switchboard_core::BudgetScope;

use crate::error::BudgetError;

const MICROS_PER_BRL: f64 = 1_000_000.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    pub scope: BudgetScope,
    pub id: String,
}

impl ScopeKey {
    pub fn new(scope: BudgetScope, id: &str) -> Self {
        Self {
            scope,
            id: id.to_owned(),
        }
    }
}

struct ScopeCounter {
    /// Window index the spend belongs to; only changed under the shard write lock
    window: u64,
    spent_micros: AtomicU64,
}

/// Fixed-window spend counters
///
/// Additions happen under the shard read lock; a stale window is rolled
/// over under the write lock, so an addition can never race a reset.
pub struct Counters {
    counters: DashMap<ScopeKey, ScopeCounter>,
    window: Duration,
    epoch: Instant,
}

impl Counters {
    pub fn new(window: Duration) -> Self {
        Self {
            counters: DashMap::new(),
            window: window.max(Duration::from_millis(1)),
            epoch: Instant::now(),
        }
    }

    /// Spend in the current window
    pub fn spent(&self, key: &ScopeKey) -> u64 {
        let window = self.current_window();
        match self.counters.get(key) {
            Some(counter) if counter.window == window => counter.spent_micros.load(Ordering::Acquire),
            _ => 0,
        }
    }

    pub fn add(&self, key: &ScopeKey, micros: u64) {
        let window = self.current_window();

        if let Some(counter) = self.counters.get(key)
            && counter.window == window
        {
            counter.spent_micros.fetch_add(micros, Ordering::AcqRel);
            return;
        }

        let mut counter = self.counters.entry(key.clone()).or_insert_with(|| ScopeCounter {
            window,
            spent_micros: AtomicU64::new(0),
        });
        if counter.window != window {
            counter.window = window;
            *counter.spent_micros.get_mut() = 0;
        }
        *counter.spent_micros.get_mut() += micros;
    }

    pub fn clear(&self) {
        self.counters.clear();
    }

    fn current_window(&self) -> u64 {
        let index = self.epoch.elapsed().as_nanos() / self.window.as_nanos();
        u64::try_from(index).unwrap_or(u64::MAX)
    }
}

/// Convert a BRL amount to micro-BRL
pub fn to_micros(brl: f64) -> Result<u64, BudgetError> {
    if !brl.is_finite() || brl < 0.0 {
        return Err(BudgetError::InvalidCost(brl));
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let micros = (brl * MICROS_PER_BRL).round() as u64;
    Ok(micros)
}

#[allow(clippy::cast_precision_loss)]
pub fn to_brl(micros: u64) -> f64 {
    micros as f64 / MICROS_PER_BRL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn micro_conversion() {
        assert_eq!(to_micros(0.01).unwrap(), 10_000);
        assert_eq!(to_micros(0.0).unwrap(), 0);
        assert!((to_brl(20_000) - 0.02).abs() < f64::EPSILON);
    }

    #[test]
    fn counters_are_keyed_by_scope_and_id() {
        let counters = Counters::new(Duration::from_secs(60));
        counters.add(&ScopeKey::new(BudgetScope::Tenant, "a"), 5);
        counters.add(&ScopeKey::new(BudgetScope::Service, "a"), 7);
        counters.add(&ScopeKey::new(BudgetScope::Tenant, "a"), 1);

        assert_eq!(counters.spent(&ScopeKey::new(BudgetScope::Tenant, "a")), 6);
        assert_eq!(counters.spent(&ScopeKey::new(BudgetScope::Service, "a")), 7);
        assert_eq!(counters.spent(&ScopeKey::new(BudgetScope::Tenant, "b")), 0);
    }
}
