//! Per-source health bookkeeping.
//!
//! The monitor wraps individual adapter calls and records the outcome. It is
//! observational: a `down` source is still called on the next request.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::data_source::SourceError;
use crate::{ProviderId, UtcDateTime};

/// Consecutive failures that move a source to `down`.
pub const DOWN_AFTER_ERRORS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Down,
}

impl HealthStatus {
    pub const fn from_error_count(error_count: u32) -> Self {
        match error_count {
            0 => Self::Healthy,
            count if count >= DOWN_AFTER_ERRORS => Self::Down,
            _ => Self::Degraded,
        }
    }
}

/// Health snapshot for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source: ProviderId,
    pub status: HealthStatus,
    pub last_check: Option<UtcDateTime>,
    /// Consecutive failures since the last success.
    pub error_count: u32,
    pub latency_ms: Option<u64>,
    pub last_error: Option<String>,
}

impl SourceHealth {
    pub const fn new(source: ProviderId) -> Self {
        Self {
            source,
            status: HealthStatus::Healthy,
            last_check: None,
            error_count: 0,
            latency_ms: None,
            last_error: None,
        }
    }

    fn record_success(&mut self, latency_ms: u64) {
        self.status = HealthStatus::Healthy;
        self.error_count = 0;
        self.latency_ms = Some(latency_ms);
        self.last_check = Some(UtcDateTime::now());
        self.last_error = None;
    }

    fn record_failure(&mut self, latency_ms: u64, error: &SourceError) {
        self.error_count = self.error_count.saturating_add(1);
        self.status = HealthStatus::from_error_count(self.error_count);
        self.latency_ms = Some(latency_ms);
        self.last_check = Some(UtcDateTime::now());
        self.last_error = Some(error.to_string());
    }
}

/// Tracks [`SourceHealth`] for every configured source.
#[derive(Debug, Default)]
pub struct HealthMonitor {
    sources: Mutex<HashMap<ProviderId, SourceHealth>>,
}

impl HealthMonitor {
    /// Create a monitor with one healthy entry per source.
    pub fn new(sources: impl IntoIterator<Item = ProviderId>) -> Self {
        let sources = sources
            .into_iter()
            .map(|source| (source, SourceHealth::new(source)))
            .collect();
        Self {
            sources: Mutex::new(sources),
        }
    }

    /// Await `call` and record its outcome against `source`. The result is
    /// passed through unchanged.
    pub async fn track<T, F>(&self, source: ProviderId, call: F) -> Result<T, SourceError>
    where
        F: Future<Output = Result<T, SourceError>>,
    {
        let started = Instant::now();
        let result = call.await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(_) => self.record_success(source, latency_ms),
            Err(error) if error.counts_against_health() => {
                self.record_failure(source, latency_ms, error)
            }
            Err(error) => {
                debug!(%source, code = error.code(), "source answered without data");
            }
        }

        result
    }

    pub fn record_success(&self, source: ProviderId, latency_ms: u64) {
        let mut sources = self.lock();
        sources
            .entry(source)
            .or_insert_with(|| SourceHealth::new(source))
            .record_success(latency_ms);
    }

    pub fn record_failure(&self, source: ProviderId, latency_ms: u64, error: &SourceError) {
        let mut sources = self.lock();
        let health = sources
            .entry(source)
            .or_insert_with(|| SourceHealth::new(source));
        health.record_failure(latency_ms, error);
        warn!(
            %source,
            code = error.code(),
            error_count = health.error_count,
            status = ?health.status,
            "source call failed"
        );
    }

    pub fn get(&self, source: ProviderId) -> Option<SourceHealth> {
        self.lock().get(&source).cloned()
    }

    /// Every tracked source, sorted by provider id.
    pub fn snapshot(&self) -> Vec<SourceHealth> {
        let mut snapshot = self.lock().values().cloned().collect::<Vec<_>>();
        snapshot.sort_by_key(|health| health.source);
        snapshot
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ProviderId, SourceHealth>> {
        self.sources.lock().unwrap_or_else(|poisoned| {
            warn!("health monitor mutex poisoned; recovering");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fail(monitor: &HealthMonitor) {
        let _ = monitor
            .track(ProviderId::Polygon, async {
                Err::<(), _>(SourceError::transport("connection reset"))
            })
            .await;
    }

    #[tokio::test]
    async fn three_failures_mark_source_down_and_success_resets() {
        let monitor = HealthMonitor::new([ProviderId::Polygon]);

        fail(&monitor).await;
        let health = monitor.get(ProviderId::Polygon).expect("tracked");
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.error_count, 1);

        fail(&monitor).await;
        fail(&monitor).await;
        let health = monitor.get(ProviderId::Polygon).expect("tracked");
        assert_eq!(health.status, HealthStatus::Down);
        assert_eq!(health.error_count, 3);
        assert!(health.last_error.is_some());

        let value = monitor
            .track(ProviderId::Polygon, async { Ok(42) })
            .await
            .expect("passes through");
        assert_eq!(value, 42);

        let health = monitor.get(ProviderId::Polygon).expect("tracked");
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.error_count, 0);
        assert!(health.latency_ms.is_some());
        assert!(health.last_error.is_none());
    }

    #[tokio::test]
    async fn not_found_leaves_health_untouched() {
        let monitor = HealthMonitor::new([ProviderId::Fred]);
        let err = monitor
            .track(ProviderId::Fred, async {
                Err::<(), _>(SourceError::not_found("no such series"))
            })
            .await
            .expect_err("propagated");
        assert_eq!(err.code(), "source.not_found");

        let health = monitor.get(ProviderId::Fred).expect("tracked");
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health.last_check.is_none());
    }

    #[test]
    fn snapshot_is_sorted_by_provider() {
        let monitor = HealthMonitor::new([ProviderId::Sec, ProviderId::Alphavantage]);
        let order = monitor
            .snapshot()
            .into_iter()
            .map(|health| health.source)
            .collect::<Vec<_>>();
        assert_eq!(order, vec![ProviderId::Alphavantage, ProviderId::Sec]);
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(HealthStatus::from_error_count(0), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_error_count(2), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_error_count(7), HealthStatus::Down);
    }
}
