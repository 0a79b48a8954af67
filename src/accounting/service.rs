use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};

use super::{
    buffer::PendingBuffer,
    clock::{history_days, DayClock, SystemClock, HISTORY_DAYS},
    event::RedirectEvent,
    stats::{DailyStats, SyncReport},
};
use crate::{auth::IdentityProvider, store::RemoteLogStore};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Counts focus redirects locally and reconciles them with the remote log
/// store.
///
/// Recording never touches the network. Remote-facing reads and syncs never
/// fail; they degrade to local values and log the cause instead.
///
/// Syncs are single-flight: a second caller waits for the first to finish
/// and then only sees whatever is still pending. The buffer is snapshotted
/// (not drained) before the write, so events recorded while a write is in
/// flight stay queued and `pending_count` stays exact throughout.
#[derive(Clone)]
pub struct RedirectAccountingService {
    buffer: Arc<Mutex<PendingBuffer>>,
    sync_gate: Arc<tokio::sync::Mutex<()>>,
    store: Arc<dyn RemoteLogStore>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn DayClock>,
}

impl RedirectAccountingService {
    pub fn new(store: Arc<dyn RemoteLogStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self::with_clock(store, identity, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn RemoteLogStore>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn DayClock>,
    ) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(PendingBuffer::new())),
            sync_gate: Arc::new(tokio::sync::Mutex::new(())),
            store,
            identity,
            clock,
        }
    }

    fn lock_buffer(&self) -> MutexGuard<'_, PendingBuffer> {
        match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Ring press: one whole redirect. Returns the new local count.
    pub fn record_full_click(&self, timestamp: DateTime<Utc>) -> f64 {
        self.lock_buffer().push(RedirectEvent::full_click(timestamp))
    }

    /// Shortcut press: half a redirect, so a show + hide pair sums to one.
    pub fn record_half_click(&self, timestamp: DateTime<Utc>) -> f64 {
        self.lock_buffer().push(RedirectEvent::half_click(timestamp))
    }

    pub fn pending_count(&self) -> usize {
        self.lock_buffer().len()
    }

    pub fn session_count(&self) -> f64 {
        self.lock_buffer().local_count()
    }

    pub fn reset_session(&self) {
        self.lock_buffer().reset();
        log_info!("Redirect session reset");
    }

    pub async fn sync_pending_logs(&self) -> SyncReport {
        let Some(user_id) = self.identity.current_user_id() else {
            let pending = self.pending_count();
            if pending > 0 {
                log_warn!("Cannot sync {pending} redirects: no signed-in user");
            }
            return SyncReport {
                synced: 0,
                errors: pending,
            };
        };

        let _in_flight = self.sync_gate.lock().await;

        let snapshot = self.lock_buffer().snapshot();
        let batch_len = snapshot.events.len();
        if batch_len == 0 {
            return SyncReport::default();
        }

        match self.store.insert_batch(&user_id, &snapshot.events).await {
            Ok(()) => {
                self.lock_buffer().acknowledge(snapshot.epoch, batch_len);
                log_info!("Synced {batch_len} redirects for user {user_id}");
                SyncReport {
                    synced: batch_len,
                    errors: 0,
                }
            }
            Err(err) => {
                log_warn!("Redirect sync failed, keeping {batch_len} pending: {err:?}");
                SyncReport {
                    synced: 0,
                    errors: batch_len,
                }
            }
        }
    }

    /// Today's total. Pending events are added by count rather than weight,
    /// so an unsynced half click reads as a whole one until it lands remotely.
    pub async fn today_count(&self) -> f64 {
        let Some(user_id) = self.identity.current_user_id() else {
            return self.session_count();
        };

        match self.remote_today(&user_id).await {
            Ok(total) => total,
            Err(err) => {
                log_warn!("Falling back to session count for today: {err:?}");
                self.session_count()
            }
        }
    }

    pub async fn daily_stats(&self) -> DailyStats {
        let Some(user_id) = self.identity.current_user_id() else {
            return DailyStats::local_only(self.session_count());
        };

        let today = self.remote_today(&user_id).await;

        let mut history = [0.0; HISTORY_DAYS];
        let mut failed_days = 0;
        for (slot, day) in history.iter_mut().zip(history_days(self.clock.today())) {
            match self.remote_day_total(&user_id, day).await {
                Ok(total) => *slot = total,
                Err(err) => {
                    failed_days += 1;
                    log_warn!("History lookup for {day} failed: {err:?}");
                }
            }
        }

        match today {
            Ok(today) => DailyStats { today, history },
            Err(_) if failed_days == HISTORY_DAYS => {
                log_warn!("All stats lookups failed; showing session count only");
                DailyStats::local_only(self.session_count())
            }
            Err(err) => {
                log_warn!("Falling back to session count for today: {err:?}");
                DailyStats {
                    today: self.session_count(),
                    history,
                }
            }
        }
    }

    async fn remote_today(&self, user_id: &str) -> Result<f64> {
        let remote = self.remote_day_total(user_id, self.clock.today()).await?;
        Ok(remote + self.pending_count() as f64)
    }

    async fn remote_day_total(&self, user_id: &str, day: NaiveDate) -> Result<f64> {
        let (from, to) = self.clock.day_bounds(day);
        let records = self.store.query_range(user_id, from, to).await?;
        Ok(records.iter().map(|record| record.value).sum())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use anyhow::bail;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};
    use tokio::sync::Notify;

    use super::*;
    use crate::accounting::{clock::FixedClock, RedirectRecord};
    use crate::auth::AuthSession;

    const NOW: &str = "2024-03-10T15:00:00+00:00";

    #[derive(Default)]
    struct FakeStore {
        rows: Mutex<Vec<RedirectRecord>>,
        fail_inserts: AtomicBool,
        fail_all_queries: AtomicBool,
        failing_ranges: Mutex<HashSet<DateTime<Utc>>>,
        insert_calls: AtomicUsize,
        entered: Notify,
        release: Option<Notify>,
    }

    impl FakeStore {
        fn holding() -> Self {
            Self {
                release: Some(Notify::new()),
                ..Self::default()
            }
        }

        fn seed(&self, user_id: &str, timestamp: DateTime<Utc>, value: f64) {
            let mut rows = self.rows.lock().unwrap();
            let id = rows.len().to_string();
            rows.push(RedirectRecord {
                id,
                user_id: user_id.to_string(),
                timestamp,
                value,
                source: crate::accounting::RedirectSource::Ring,
            });
        }

        fn fail_range_starting(&self, from: DateTime<Utc>) {
            self.failing_ranges.lock().unwrap().insert(from);
        }

        fn rows_for(&self, user_id: &str) -> Vec<RedirectRecord> {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl RemoteLogStore for FakeStore {
        async fn insert_batch(&self, user_id: &str, events: &[RedirectEvent]) -> Result<()> {
            self.insert_calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            if let Some(release) = &self.release {
                release.notified().await;
            }
            if self.fail_inserts.load(Ordering::SeqCst) {
                bail!("remote rejected batch");
            }
            for event in events {
                self.seed(user_id, event.timestamp, event.value());
            }
            Ok(())
        }

        async fn query_range(
            &self,
            user_id: &str,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Vec<RedirectRecord>> {
            if self.fail_all_queries.load(Ordering::SeqCst)
                || self.failing_ranges.lock().unwrap().contains(&from)
            {
                bail!("query timed out");
            }
            Ok(self
                .rows_for(user_id)
                .into_iter()
                .filter(|r| r.timestamp >= from && r.timestamp < to)
                .collect())
        }
    }

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(DateTime::parse_from_rfc3339(NOW).unwrap()))
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(NOW).unwrap().with_timezone(&Utc)
    }

    fn service(store: Arc<FakeStore>, auth: Arc<AuthSession>) -> RedirectAccountingService {
        RedirectAccountingService::with_clock(store, auth, clock())
    }

    fn signed_in() -> Arc<AuthSession> {
        Arc::new(AuthSession::signed_in("user-1"))
    }

    #[test]
    fn test_full_clicks_are_counted_exactly() {
        let svc = service(Arc::new(FakeStore::default()), signed_in());
        for n in 1..=25 {
            assert_eq!(svc.record_full_click(now()), n as f64);
        }
        assert_eq!(svc.session_count(), 25.0);
        assert_eq!(svc.pending_count(), 25);
    }

    #[test]
    fn test_two_half_clicks_equal_one_full_click() {
        let svc = service(Arc::new(FakeStore::default()), signed_in());
        svc.record_full_click(now());
        let before = svc.session_count();
        svc.record_half_click(now());
        svc.record_half_click(now());
        assert_eq!(svc.session_count() - before, 1.0);
    }

    #[test]
    fn test_reset_session_clears_everything() {
        let svc = service(Arc::new(FakeStore::default()), signed_in());
        svc.record_full_click(now());
        svc.record_half_click(now());
        svc.reset_session();
        assert_eq!(svc.session_count(), 0.0);
        assert_eq!(svc.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_mixed_clicks_sync_and_drain() {
        let store = Arc::new(FakeStore::default());
        let svc = service(store.clone(), signed_in());

        svc.record_full_click(now());
        svc.record_half_click(now());
        svc.record_half_click(now());
        assert_eq!(svc.session_count(), 2.0);
        assert_eq!(svc.pending_count(), 3);

        let report = svc.sync_pending_logs().await;
        assert_eq!(report, SyncReport { synced: 3, errors: 0 });
        assert_eq!(svc.pending_count(), 0);

        let rows = store.rows_for("user-1");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.iter().map(|r| r.value).sum::<f64>(), 2.0);
        // syncing does not touch the session counter
        assert_eq!(svc.session_count(), 2.0);
    }

    #[tokio::test]
    async fn test_failed_sync_keeps_buffer_for_retry() {
        let store = Arc::new(FakeStore::default());
        store.fail_inserts.store(true, Ordering::SeqCst);
        let svc = service(store.clone(), signed_in());

        svc.record_full_click(now());
        svc.record_half_click(now());

        let report = svc.sync_pending_logs().await;
        assert_eq!(report, SyncReport { synced: 0, errors: 2 });
        assert_eq!(svc.pending_count(), 2);
        assert!(store.rows_for("user-1").is_empty());

        store.fail_inserts.store(false, Ordering::SeqCst);
        let retry = svc.sync_pending_logs().await;
        assert_eq!(retry, SyncReport { synced: 2, errors: 0 });
        assert_eq!(svc.pending_count(), 0);
        assert_eq!(store.rows_for("user-1").len(), 2);
    }

    #[tokio::test]
    async fn test_unauthenticated_sync_reports_all_pending_as_errors() {
        let store = Arc::new(FakeStore::default());
        let svc = service(store.clone(), Arc::new(AuthSession::new()));

        svc.record_full_click(now());
        svc.record_full_click(now());

        let report = svc.sync_pending_logs().await;
        assert_eq!(report, SyncReport { synced: 0, errors: 2 });
        assert_eq!(svc.pending_count(), 2);
        assert_eq!(store.insert_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_buffer_skips_remote_write() {
        let store = Arc::new(FakeStore::default());
        let svc = service(store.clone(), signed_in());

        assert_eq!(svc.sync_pending_logs().await, SyncReport::default());
        assert_eq!(store.insert_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_clicks_recorded_during_sync_stay_pending() {
        let store = Arc::new(FakeStore::holding());
        let svc = service(store.clone(), signed_in());
        svc.record_full_click(now());
        svc.record_full_click(now());

        let in_flight = tokio::spawn({
            let svc = svc.clone();
            async move { svc.sync_pending_logs().await }
        });

        store.entered.notified().await;
        svc.record_half_click(now());
        assert_eq!(svc.pending_count(), 3);

        store.release.as_ref().unwrap().notify_one();
        let report = in_flight.await.unwrap();

        assert_eq!(report.synced, 2);
        assert_eq!(svc.pending_count(), 1);
        assert_eq!(store.rows_for("user-1").len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_syncs_do_not_double_submit() {
        let store = Arc::new(FakeStore::holding());
        let svc = service(store.clone(), signed_in());
        svc.record_full_click(now());
        svc.record_half_click(now());

        let first = tokio::spawn({
            let svc = svc.clone();
            async move { svc.sync_pending_logs().await }
        });
        store.entered.notified().await;

        let second = tokio::spawn({
            let svc = svc.clone();
            async move { svc.sync_pending_logs().await }
        });
        tokio::task::yield_now().await;

        store.release.as_ref().unwrap().notify_one();
        let first = first.await.unwrap();
        let second = second.await.unwrap();

        assert_eq!(first, SyncReport { synced: 2, errors: 0 });
        assert_eq!(second, SyncReport::default());
        assert_eq!(store.insert_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.rows_for("user-1").len(), 2);
    }

    #[tokio::test]
    async fn test_reset_during_sync_does_not_drop_new_clicks() {
        let store = Arc::new(FakeStore::holding());
        let svc = service(store.clone(), signed_in());
        svc.record_full_click(now());

        let in_flight = tokio::spawn({
            let svc = svc.clone();
            async move { svc.sync_pending_logs().await }
        });
        store.entered.notified().await;

        svc.reset_session();
        svc.record_half_click(now());

        store.release.as_ref().unwrap().notify_one();
        in_flight.await.unwrap();

        assert_eq!(svc.pending_count(), 1);
        assert_eq!(svc.session_count(), 0.5);
    }

    #[tokio::test]
    async fn test_today_count_unauthenticated_is_session_count() {
        let store = Arc::new(FakeStore::default());
        store.seed("user-1", now(), 1.0);
        let svc = service(store, Arc::new(AuthSession::new()));
        svc.record_half_click(now());

        assert_eq!(svc.today_count().await, 0.5);
    }

    #[tokio::test]
    async fn test_today_count_sums_remote_day() {
        let store = Arc::new(FakeStore::default());
        store.seed("user-1", now() - Duration::hours(14), 1.0);
        store.seed("user-1", now(), 0.5);
        // yesterday and another user are excluded
        store.seed("user-1", now() - Duration::hours(16), 1.0);
        store.seed("user-2", now(), 1.0);
        let svc = service(store, signed_in());

        assert_eq!(svc.today_count().await, 1.5);
    }

    #[tokio::test]
    async fn test_today_count_adds_pending_events_by_count_not_weight() {
        let store = Arc::new(FakeStore::default());
        store.seed("user-1", now(), 1.0);
        let svc = service(store, signed_in());

        svc.record_half_click(now());
        svc.record_half_click(now());

        // Two pending half clicks weigh 1.0 but are added as 2 until synced.
        assert_eq!(svc.today_count().await, 3.0);

        svc.sync_pending_logs().await;
        assert_eq!(svc.today_count().await, 2.0);
    }

    #[tokio::test]
    async fn test_today_count_falls_back_on_query_failure() {
        let store = Arc::new(FakeStore::default());
        store.seed("user-1", now(), 1.0);
        store.fail_all_queries.store(true, Ordering::SeqCst);
        let svc = service(store, signed_in());
        svc.record_full_click(now());
        svc.record_half_click(now());

        assert_eq!(svc.today_count().await, 1.5);
    }

    #[tokio::test]
    async fn test_daily_stats_unauthenticated() {
        let svc = service(Arc::new(FakeStore::default()), Arc::new(AuthSession::new()));
        svc.record_full_click(now());
        svc.record_full_click(now());

        let stats = svc.daily_stats().await;
        assert_eq!(stats, DailyStats::local_only(2.0));
        assert_eq!(stats.history, [0.0; HISTORY_DAYS]);
    }

    #[tokio::test]
    async fn test_daily_stats_history_is_oldest_first() {
        let store = Arc::new(FakeStore::default());
        for days_ago in 1..=7 {
            for _ in 0..days_ago {
                store.seed("user-1", now() - Duration::days(days_ago), 1.0);
            }
        }
        store.seed("user-1", now() - Duration::days(8), 1.0);
        store.seed("user-1", now(), 0.5);
        let svc = service(store, signed_in());

        let stats = svc.daily_stats().await;
        assert_eq!(stats.today, 0.5);
        assert_eq!(stats.history, [7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0]);
    }

    #[tokio::test]
    async fn test_daily_stats_zeroes_only_the_failed_day() {
        let store = Arc::new(FakeStore::default());
        for days_ago in 1..=7 {
            store.seed("user-1", now() - Duration::days(days_ago), 1.0);
        }
        let clock = clock();
        let three_days_ago = history_days(clock.today())[4];
        store.fail_range_starting(clock.day_bounds(three_days_ago).0);
        let svc = service(store, signed_in());

        let stats = svc.daily_stats().await;
        assert_eq!(stats.history.len(), HISTORY_DAYS);
        assert_eq!(stats.history, [1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0]);
    }

    #[tokio::test]
    async fn test_daily_stats_total_failure_falls_back_to_local() {
        let store = Arc::new(FakeStore::default());
        store.seed("user-1", now() - Duration::days(2), 1.0);
        store.fail_all_queries.store(true, Ordering::SeqCst);
        let svc = service(store, signed_in());
        svc.record_half_click(now());

        assert_eq!(svc.daily_stats().await, DailyStats::local_only(0.5));
    }
}
