//! Request statistics for the `/hash` endpoints.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Point-in-time view of [`Stats`], serialized as the `/stats` body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Requests seen.
    pub total: u64,
    /// Mean handling time in whole milliseconds; 0 with no requests.
    pub average: u64,
}

#[derive(Debug, Default)]
struct Totals {
    requests: u64,
    elapsed: Duration,
}

/// Running request count and handling time.
#[derive(Debug, Default)]
pub struct Stats {
    totals: Mutex<Totals>,
}

impl Stats {
    /// Create empty statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request that took `elapsed` to handle.
    pub fn record(&self, elapsed: Duration) {
        let mut totals = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        totals.requests += 1;
        totals.elapsed += elapsed;
    }

    /// Record one request that started at `started`.
    pub fn record_since(&self, started: Instant) {
        self.record(started.elapsed());
    }

    /// Current totals.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let totals = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        if totals.requests == 0 {
            return StatsSnapshot::default();
        }
        let average = totals.elapsed.as_millis() / u128::from(totals.requests);
        StatsSnapshot {
            total: totals.requests,
            average: u64::try_from(average).unwrap_or(u64::MAX),
        }
    }
}
