//! Get-or-compute access to statistics
//!
//! The cache is an optimization only: every miss falls back to computing
//! the statistic from the user's transactions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use tally_core::{Clock, SharedClock};

use crate::aggregate::{compute, Transaction};
use crate::cache::StatisticsCache;
use crate::error::Result;
use crate::key::{Period, StatType};
use crate::payload::StatisticPayload;

/// Supplier of a user's transactions
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// All transactions of `user_id`
    async fn transactions(&self, user_id: &str) -> Result<Vec<Transaction>>;
}

/// Outcome of a precache pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrecacheReport {
    /// Expired entries removed before warming
    pub purged: usize,
    /// Statistics computed and stored
    pub warmed: usize,
    /// Statistics that were already valid
    pub skipped: usize,
}

/// Statistics with cache-first lookup
pub struct StatisticsService {
    cache: Arc<StatisticsCache>,
    source: Arc<dyn TransactionSource>,
    clock: SharedClock,
    /// TTL for entries this service writes
    ttl: Duration,
}

impl StatisticsService {
    pub fn new(
        cache: Arc<StatisticsCache>,
        source: Arc<dyn TransactionSource>,
        clock: SharedClock,
        ttl: Duration,
    ) -> Self {
        Self {
            cache,
            source,
            clock,
            ttl,
        }
    }

    /// The cache behind this service
    pub fn cache(&self) -> &Arc<StatisticsCache> {
        &self.cache
    }

    /// Cached statistic, computed and cached on a miss
    pub async fn statistic(
        &self,
        user_id: &str,
        stat_type: StatType,
        period: Period,
    ) -> Result<StatisticPayload> {
        if let Some(cached) = self
            .cache
            .get_cached_statistic(user_id, stat_type, period)
            .await
        {
            debug!("Cache hit for {} {} of {}", period, stat_type, user_id);
            return Ok(cached);
        }

        self.refresh(user_id, stat_type, period).await
    }

    /// Recompute a statistic and overwrite its cache entry
    pub async fn refresh(
        &self,
        user_id: &str,
        stat_type: StatType,
        period: Period,
    ) -> Result<StatisticPayload> {
        let transactions = self.source.transactions(user_id).await?;
        Ok(self
            .compute_and_store(user_id, stat_type, period, &transactions)
            .await)
    }

    /// Purge expired entries, then compute every requested statistic that is not valid
    ///
    /// Transactions are loaded at most once per pass. A failed purge is
    /// logged and does not stop warming.
    pub async fn precache(
        &self,
        user_id: &str,
        requests: &[(StatType, Period)],
    ) -> Result<PrecacheReport> {
        let mut report = PrecacheReport {
            purged: match self.cache.clear_expired_cache().await {
                Ok(purged) => purged,
                Err(e) => {
                    warn!("Expired cache purge failed: {}", e);
                    0
                }
            },
            ..PrecacheReport::default()
        };

        let mut transactions: Option<Vec<Transaction>> = None;
        for &(stat_type, period) in requests {
            if self.cache.is_cache_valid(user_id, stat_type, period).await {
                report.skipped += 1;
                continue;
            }

            let loaded = match transactions.take() {
                Some(loaded) => loaded,
                None => self.source.transactions(user_id).await?,
            };
            self.compute_and_store(user_id, stat_type, period, &loaded)
                .await;
            transactions = Some(loaded);
            report.warmed += 1;
        }

        info!(
            "Precache for {}: {} purged, {} warmed, {} skipped",
            user_id, report.purged, report.warmed, report.skipped
        );
        Ok(report)
    }

    /// Drop every cached statistic of a user after their transactions changed
    pub async fn transactions_changed(&self, user_id: &str) -> Result<usize> {
        self.cache.invalidate_all_cache(user_id).await
    }

    async fn compute_and_store(
        &self,
        user_id: &str,
        stat_type: StatType,
        period: Period,
        transactions: &[Transaction],
    ) -> StatisticPayload {
        let payload = compute(stat_type, period, transactions, self.clock.now());
        if !self
            .cache
            .cache_statistic(user_id, stat_type, &payload, period, self.ttl)
            .await
        {
            warn!(
                "Serving uncached {} {} for {}",
                period, stat_type, user_id
            );
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::TransactionKind;
    use crate::StatsError;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tally_core::{ManualClock, MemoryStore};
    use tokio::sync::Mutex;

    const TIMEOUT: Duration = Duration::from_secs(1);
    const TTL: Duration = Duration::from_secs(600);

    /// In-memory ledger that counts how often it is read
    #[derive(Default)]
    struct Ledger {
        transactions: Mutex<Vec<Transaction>>,
        loads: AtomicUsize,
        fail: bool,
    }

    impl Ledger {
        async fn book(&self, amount: i64, kind: TransactionKind, occurred_at: DateTime<Utc>) {
            let mut transactions = self.transactions.lock().await;
            let id = format!("tx-{}", transactions.len());
            transactions.push(Transaction {
                id,
                amount,
                kind,
                category: "general".to_string(),
                occurred_at,
            });
        }
    }

    #[async_trait]
    impl TransactionSource for Ledger {
        async fn transactions(&self, _user_id: &str) -> Result<Vec<Transaction>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StatsError::Source("ledger offline".to_string()));
            }
            Ok(self.transactions.lock().await.clone())
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 16, 15, 0, 0).unwrap()
    }

    fn test_service(ledger: Arc<Ledger>) -> (StatisticsService, ManualClock) {
        let clock = ManualClock::new(start());
        let cache = Arc::new(
            StatisticsCache::new(Arc::new(MemoryStore::new()), clock.shared(), TIMEOUT)
                .with_freshness_window(Duration::from_secs(60)),
        );
        let service = StatisticsService::new(cache, ledger, clock.shared(), TTL);
        (service, clock)
    }

    #[tokio::test]
    async fn test_miss_computes_then_hits() {
        let ledger = Arc::new(Ledger::default());
        ledger.book(5_000, TransactionKind::Income, start()).await;
        let (service, _clock) = test_service(ledger.clone());

        let first = service
            .statistic("u1", StatType::TotalIncome, Period::Daily)
            .await
            .unwrap();
        let second = service
            .statistic("u1", StatType::TotalIncome, Period::Daily)
            .await
            .unwrap();

        assert_eq!(first, StatisticPayload::Amount(5_000));
        assert_eq!(second, first);
        assert_eq!(ledger.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_value_served_until_invalidated() {
        let ledger = Arc::new(Ledger::default());
        ledger.book(5_000, TransactionKind::Income, start()).await;
        let (service, _clock) = test_service(ledger.clone());

        service
            .statistic("u1", StatType::TotalIncome, Period::Daily)
            .await
            .unwrap();
        ledger.book(1_000, TransactionKind::Income, start()).await;

        assert_eq!(
            service
                .statistic("u1", StatType::TotalIncome, Period::Daily)
                .await
                .unwrap(),
            StatisticPayload::Amount(5_000)
        );

        assert_eq!(service.transactions_changed("u1").await.unwrap(), 1);
        assert_eq!(
            service
                .statistic("u1", StatType::TotalIncome, Period::Daily)
                .await
                .unwrap(),
            StatisticPayload::Amount(6_000)
        );
    }

    #[tokio::test]
    async fn test_refresh_overwrites() {
        let ledger = Arc::new(Ledger::default());
        let (service, _clock) = test_service(ledger.clone());
        service
            .statistic("u1", StatType::TransactionCount, Period::Monthly)
            .await
            .unwrap();

        ledger.book(700, TransactionKind::Expense, start()).await;
        let refreshed = service
            .refresh("u1", StatType::TransactionCount, Period::Monthly)
            .await
            .unwrap();

        assert_eq!(refreshed, StatisticPayload::Count(1));
        assert_eq!(
            service
                .cache()
                .get_cached_statistic::<StatisticPayload>(
                    "u1",
                    StatType::TransactionCount,
                    Period::Monthly
                )
                .await,
            Some(StatisticPayload::Count(1))
        );
    }

    #[tokio::test]
    async fn test_precache_loads_once_and_skips_valid() {
        let ledger = Arc::new(Ledger::default());
        ledger.book(2_500, TransactionKind::Expense, start()).await;
        let (service, clock) = test_service(ledger.clone());

        let requests = [
            (StatType::TotalExpense, Period::Daily),
            (StatType::NetBalance, Period::Monthly),
            (StatType::SpendingTrend, Period::Weekly),
        ];

        let report = service.precache("u1", &requests).await.unwrap();
        assert_eq!(
            report,
            PrecacheReport {
                purged: 0,
                warmed: 3,
                skipped: 0
            }
        );
        assert_eq!(ledger.loads.load(Ordering::SeqCst), 1);

        let report = service.precache("u1", &requests).await.unwrap();
        assert_eq!(report.skipped, 3);
        assert_eq!(ledger.loads.load(Ordering::SeqCst), 1);

        // Past the freshness window everything is warmed again
        clock.advance(Duration::from_secs(120));
        let report = service.precache("u1", &requests).await.unwrap();
        assert_eq!(report.warmed, 3);

        // Past the TTL the old entries are purged first
        clock.advance(TTL);
        let report = service.precache("u1", &requests[..1]).await.unwrap();
        assert_eq!(report.purged, 3);
        assert_eq!(report.warmed, 1);
    }

    #[tokio::test]
    async fn test_source_failure_propagates() {
        let ledger = Arc::new(Ledger {
            fail: true,
            ..Ledger::default()
        });
        let (service, _clock) = test_service(ledger);

        assert!(matches!(
            service
                .statistic("u1", StatType::NetBalance, Period::Daily)
                .await,
            Err(StatsError::Source(_))
        ));
        assert!(service
            .precache("u1", &[(StatType::NetBalance, Period::Daily)])
            .await
            .is_err());
    }
}
