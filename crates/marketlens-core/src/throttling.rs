//! Per-source request queue.
//!
//! Each source owns one [`RequestQueue`]. Tasks are drained sequentially by a
//! single worker that waits on a governor rate limiter before starting each
//! task, so consecutive starts are at least `min_interval` apart. A separate
//! [`QuotaCounter`] enforces the long-window budget at enqueue time: once it
//! is exhausted, `enqueue` fails with `QuotaExceeded` without running the task.
//! An upstream 429 also starts a cooldown during which every task, queued or
//! new, fails the same way without touching the network.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::data_source::SourceError;
use crate::provider_policy::{LongWindowQuota, ProviderPolicy, QuotaWindow};
use crate::ProviderId;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Unit of work owned by a queue until its worker dequeues it.
type QueueTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Cooldown after a 429 that carried no `Retry-After`, unless the source's
/// own `min_interval` is longer.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Serializing, rate-limited queue for one source.
pub struct RequestQueue {
    provider: ProviderId,
    min_interval: Duration,
    limiter: Option<Arc<DirectRateLimiter>>,
    quota: Option<QuotaCounter>,
    cooldown: Arc<Cooldown>,
    sender: OnceLock<mpsc::UnboundedSender<QueueTask>>,
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("provider", &self.provider)
            .field("min_interval", &self.min_interval)
            .field("quota", &self.quota)
            .finish_non_exhaustive()
    }
}

impl RequestQueue {
    pub fn new(
        provider: ProviderId,
        min_interval: Duration,
        quota: Option<LongWindowQuota>,
    ) -> Self {
        let limiter = Quota::with_period(min_interval)
            .map(|quota| Arc::new(RateLimiter::direct(quota)));
        Self {
            provider,
            min_interval,
            limiter,
            quota: quota.map(QuotaCounter::new),
            cooldown: Arc::new(Cooldown::default()),
            sender: OnceLock::new(),
        }
    }

    pub fn from_policy(policy: &ProviderPolicy) -> Self {
        Self::new(policy.provider_id, policy.min_interval, policy.quota)
    }

    pub const fn provider(&self) -> ProviderId {
        self.provider
    }

    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Run `task` on this source's worker and wait for its outcome.
    ///
    /// Fails immediately with `QuotaExceeded` when the long-window budget is
    /// spent or a rate-limit cooldown is active. Must be called from within a
    /// tokio runtime.
    pub async fn enqueue<T, F>(&self, task: F) -> Result<T, SourceError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, SourceError>> + Send + 'static,
    {
        self.cooldown.check(self.provider)?;

        if let Some(quota) = &self.quota {
            quota.try_consume().map_err(|error| {
                warn!(provider = %self.provider, "long-window quota exhausted");
                error
            })?;
        }

        let (result_tx, result_rx) = oneshot::channel();
        let cooldown = Arc::clone(&self.cooldown);
        let provider = self.provider;
        let job: QueueTask = Box::pin(async move {
            // tasks queued before a 429 must not reach the network either
            let outcome = match cooldown.check(provider) {
                Ok(()) => task.await,
                Err(error) => Err(error),
            };
            let _ = result_tx.send(outcome);
        });

        self.worker()
            .send(job)
            .map_err(|_| SourceError::transport(format!("{} queue is closed", self.provider)))?;

        result_rx.await.map_err(|_| {
            SourceError::transport(format!("{} queue dropped the task", self.provider))
        })?
    }

    /// Spend the rest of the current quota window, typically after an upstream 429.
    pub fn mark_exhausted(&self) {
        if let Some(quota) = &self.quota {
            quota.mark_exhausted();
        }
    }

    /// React to an upstream 429: spend the long-window budget and refuse
    /// every task until `retry_after` (or the default cooldown) elapses.
    pub fn mark_rate_limited(&self, retry_after: Option<Duration>) {
        self.mark_exhausted();
        let cooldown = retry_after.unwrap_or_else(|| DEFAULT_COOLDOWN.max(self.min_interval));
        warn!(provider = %self.provider, ?cooldown, "rate limited upstream; cooling down");
        self.cooldown.block_for(cooldown);
    }

    /// Whether a rate-limit cooldown is currently active.
    pub fn is_cooling_down(&self) -> bool {
        self.cooldown.active_until(Instant::now()).is_some()
    }

    /// Remaining long-window budget, `None` when the source has no quota.
    pub fn quota_remaining(&self) -> Option<u32> {
        self.quota.as_ref().map(QuotaCounter::remaining)
    }

    fn worker(&self) -> &mpsc::UnboundedSender<QueueTask> {
        self.sender.get_or_init(|| {
            let (sender, receiver) = mpsc::unbounded_channel();
            tokio::spawn(run_worker(
                self.provider,
                receiver,
                self.limiter.clone(),
            ));
            debug!(provider = %self.provider, "queue worker started");
            sender
        })
    }
}

async fn run_worker(
    provider: ProviderId,
    mut receiver: mpsc::UnboundedReceiver<QueueTask>,
    limiter: Option<Arc<DirectRateLimiter>>,
) {
    while let Some(job) = receiver.recv().await {
        if let Some(limiter) = &limiter {
            limiter.until_ready().await;
        }
        job.await;
    }
    debug!(%provider, "queue worker stopped");
}

#[derive(Debug, Default)]
struct Cooldown {
    until: Mutex<Option<Instant>>,
}

impl Cooldown {
    fn block_for(&self, duration: Duration) {
        let until = Instant::now() + duration;
        let mut slot = self.lock();
        // never shorten a cooldown that is already running
        if slot.map_or(true, |current| current < until) {
            *slot = Some(until);
        }
    }

    fn active_until(&self, now: Instant) -> Option<Instant> {
        let mut slot = self.lock();
        match *slot {
            Some(until) if until > now => Some(until),
            Some(_) => {
                *slot = None;
                None
            }
            None => None,
        }
    }

    fn check(&self, provider: ProviderId) -> Result<(), SourceError> {
        let now = Instant::now();
        match self.active_until(now) {
            Some(until) => {
                debug!(%provider, remaining = ?until.duration_since(now), "cooldown active");
                Err(SourceError::quota_exceeded(format!(
                    "{provider} is rate limited for another {}s",
                    until.duration_since(now).as_secs().max(1)
                )))
            }
            None => Ok(()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.until.lock().unwrap_or_else(|poisoned| {
            warn!("cooldown mutex poisoned; recovering");
            poisoned.into_inner()
        })
    }
}

/// Long-window request counter with calendar rollover.
#[derive(Debug)]
pub struct QuotaCounter {
    quota: LongWindowQuota,
    state: Mutex<QuotaState>,
}

#[derive(Debug, Clone, Copy)]
struct QuotaState {
    period: PeriodKey,
    used: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PeriodKey(i32, u16);

impl PeriodKey {
    fn at(window: QuotaWindow, now: OffsetDateTime) -> Self {
        let now = now.to_offset(time::UtcOffset::UTC);
        match window {
            QuotaWindow::Daily => Self(now.year(), now.ordinal()),
            QuotaWindow::Monthly => Self(now.year(), u16::from(u8::from(now.month()))),
        }
    }
}

impl QuotaCounter {
    pub fn new(quota: LongWindowQuota) -> Self {
        Self::starting_at(quota, OffsetDateTime::now_utc())
    }

    pub fn starting_at(quota: LongWindowQuota, now: OffsetDateTime) -> Self {
        Self {
            quota,
            state: Mutex::new(QuotaState {
                period: PeriodKey::at(quota.window, now),
                used: 0,
            }),
        }
    }

    pub fn try_consume(&self) -> Result<u32, SourceError> {
        self.try_consume_at(OffsetDateTime::now_utc())
    }

    /// Check and increment in one critical section. Returns the budget left.
    pub fn try_consume_at(&self, now: OffsetDateTime) -> Result<u32, SourceError> {
        let mut state = self.lock_rolled(now);
        if state.used >= self.quota.limit {
            return Err(SourceError::quota_exceeded(format!(
                "{} request quota of {} exhausted",
                window_label(self.quota.window),
                self.quota.limit
            )));
        }
        state.used += 1;
        Ok(self.quota.limit - state.used)
    }

    pub fn mark_exhausted(&self) {
        self.mark_exhausted_at(OffsetDateTime::now_utc());
    }

    pub fn mark_exhausted_at(&self, now: OffsetDateTime) {
        let mut state = self.lock_rolled(now);
        state.used = self.quota.limit;
    }

    pub fn remaining(&self) -> u32 {
        self.remaining_at(OffsetDateTime::now_utc())
    }

    pub fn remaining_at(&self, now: OffsetDateTime) -> u32 {
        let state = self.lock_rolled(now);
        self.quota.limit.saturating_sub(state.used)
    }

    fn lock_rolled(&self, now: OffsetDateTime) -> std::sync::MutexGuard<'_, QuotaState> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| {
            warn!("quota counter mutex poisoned; recovering");
            poisoned.into_inner()
        });
        let period = PeriodKey::at(self.quota.window, now);
        if state.period != period {
            state.period = period;
            state.used = 0;
        }
        state
    }
}

const fn window_label(window: QuotaWindow) -> &'static str {
    match window {
        QuotaWindow::Daily => "daily",
        QuotaWindow::Monthly => "monthly",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use time::macros::datetime;

    use super::*;
    use crate::data_source::SourceErrorKind;

    #[tokio::test]
    async fn tasks_on_one_queue_start_at_least_min_interval_apart() {
        let queue = Arc::new(RequestQueue::new(
            ProviderId::Finnhub,
            Duration::from_millis(40),
            None,
        ));
        let starts = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            let starts = Arc::clone(&starts);
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(async move {
                        starts.lock().expect("lock").push(Instant::now());
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("task");
        }

        let starts = starts.lock().expect("lock").clone();
        assert_eq!(starts.len(), 4);
        for pair in starts.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(gap >= Duration::from_millis(35), "gap was {gap:?}");
        }
    }

    #[tokio::test]
    async fn tasks_execute_sequentially() {
        let queue = Arc::new(RequestQueue::new(ProviderId::Sec, Duration::ZERO, None));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let queue = Arc::clone(&queue);
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("task");
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_quota_fails_without_running_task() {
        let queue = RequestQueue::new(
            ProviderId::Newsapi,
            Duration::ZERO,
            Some(LongWindowQuota::daily(2)),
        );
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let runs = Arc::clone(&runs);
            queue
                .enqueue(async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .expect("within quota");
        }

        let runs_clone = Arc::clone(&runs);
        let err = queue
            .enqueue(async move {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .expect_err("quota spent");

        assert_eq!(err.kind(), SourceErrorKind::QuotaExceeded);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(queue.quota_remaining(), Some(0));
    }

    #[tokio::test]
    async fn rate_limit_cooldown_refuses_tasks_until_it_elapses() {
        let queue = RequestQueue::new(ProviderId::Polygon, Duration::ZERO, None);
        let runs = Arc::new(AtomicUsize::new(0));

        queue.mark_rate_limited(Some(Duration::from_millis(60)));
        assert!(queue.is_cooling_down());

        let runs_clone = Arc::clone(&runs);
        let err = queue
            .enqueue(async move {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .expect_err("cooling down");
        assert_eq!(err.kind(), SourceErrorKind::QuotaExceeded);
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!queue.is_cooling_down());

        let runs_clone = Arc::clone(&runs);
        queue
            .enqueue(async move {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .expect("cooldown over");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limit_without_retry_after_uses_default_cooldown() {
        let queue = RequestQueue::new(
            ProviderId::Alphavantage,
            Duration::ZERO,
            Some(LongWindowQuota::daily(25)),
        );
        queue.mark_rate_limited(None);

        assert!(queue.is_cooling_down());
        assert_eq!(queue.quota_remaining(), Some(0));
    }

    #[tokio::test]
    async fn task_errors_are_returned_to_the_caller() {
        let queue = RequestQueue::new(ProviderId::Fred, Duration::ZERO, None);
        let err = queue
            .enqueue(async { Err::<(), _>(SourceError::malformed("bad")) })
            .await
            .expect_err("task failed");
        assert_eq!(err.kind(), SourceErrorKind::MalformedResponse);
    }

    #[test]
    fn daily_quota_resets_at_utc_midnight() {
        let counter = QuotaCounter::starting_at(
            LongWindowQuota::daily(1),
            datetime!(2026-03-10 08:00 UTC),
        );

        assert_eq!(counter.try_consume_at(datetime!(2026-03-10 08:00 UTC)).ok(), Some(0));
        assert!(counter.try_consume_at(datetime!(2026-03-10 23:59:59 UTC)).is_err());
        // 01:00 at +02:00 is still the previous UTC day
        assert!(counter.try_consume_at(datetime!(2026-03-11 01:00 +02:00)).is_err());
        assert!(counter.try_consume_at(datetime!(2026-03-11 00:00 UTC)).is_ok());
    }

    #[test]
    fn monthly_quota_resets_on_the_first() {
        let counter = QuotaCounter::starting_at(
            LongWindowQuota::monthly(3),
            datetime!(2026-01-31 12:00 UTC),
        );

        counter.mark_exhausted_at(datetime!(2026-01-31 12:00 UTC));
        assert_eq!(counter.remaining_at(datetime!(2026-01-31 23:00 UTC)), 0);
        assert_eq!(counter.remaining_at(datetime!(2026-02-01 00:00 UTC)), 3);
    }
}
