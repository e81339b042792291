//! Watermark collection and backfill
//!
//! Pulls per-participant difficulty observations for a block from the
//! upstream source and upserts the highest one as the block's watermark,
//! along with every participant's own best submission. All writes are
//! monotonic upserts, so re-collecting a block is idempotent and can never
//! regress stored state.

use crate::models::SubmissionObservation;
use crate::observability::OperationTimer;
use crate::store::DifficultyStore;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// External source of per-participant difficulty observations for a block.
#[async_trait]
pub trait SubmissionSource: Send + Sync {
    async fn fetch_submissions(&self, block_height: u64) -> Result<Vec<SubmissionObservation>>;
}

pub struct WatermarkCollector {
    source: Arc<dyn SubmissionSource>,
    store: Arc<dyn DifficultyStore>,
}

impl WatermarkCollector {
    pub fn new(source: Arc<dyn SubmissionSource>, store: Arc<dyn DifficultyStore>) -> Self {
        Self { source, store }
    }

    /// Ensure a watermark exists for `block_height` from the currently
    /// observable submissions.
    ///
    /// Returns Ok(false) when the block is not resolvable yet (no
    /// observations, or the upstream is unreachable); both are expected
    /// outcomes, not errors. Only persistence failures propagate as Err.
    pub async fn collect(&self, block_height: u64) -> Result<bool> {
        collect_block(self.source.as_ref(), self.store.as_ref(), block_height).await
    }

    /// Collect several blocks with bounded concurrency and a hard overall
    /// deadline. Blocks not finished by the deadline are reported as failed;
    /// their tasks are detached and still complete their store writes, so a
    /// watermark is never left half-updated.
    pub async fn collect_many(
        &self,
        block_heights: &[u64],
        max_concurrent: usize,
        deadline: Duration,
    ) -> HashMap<u64, bool> {
        let mut results: HashMap<u64, bool> =
            block_heights.iter().map(|height| (*height, false)).collect();
        if results.is_empty() {
            return results;
        }

        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let (tx, mut rx) = mpsc::channel(results.len());

        for height in results.keys().copied().collect::<Vec<_>>() {
            let source = Arc::clone(&self.source);
            let store = Arc::clone(&self.store);
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();
            tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                let ok = match collect_block(source.as_ref(), store.as_ref(), height).await {
                    Ok(ok) => ok,
                    Err(e) => {
                        warn!(block_height = height, error = %e, "collection failed");
                        false
                    }
                };
                let _ = tx.send((height, ok)).await;
            });
        }
        drop(tx);

        let cutoff = tokio::time::Instant::now() + deadline;
        let mut outstanding = results.len();
        while outstanding > 0 {
            match tokio::time::timeout_at(cutoff, rx.recv()).await {
                Ok(Some((height, ok))) => {
                    results.insert(height, ok);
                    outstanding -= 1;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        outstanding,
                        "collection deadline elapsed, outstanding blocks reported as failed"
                    );
                    break;
                }
            }
        }
        results
    }
}

/// One block's collection pass, shared by the direct and spawned paths.
async fn collect_block(
    source: &dyn SubmissionSource,
    store: &dyn DifficultyStore,
    block_height: u64,
) -> Result<bool> {
    let observations = match source.fetch_submissions(block_height).await {
        Ok(observations) => observations,
        Err(e) => {
            warn!(block_height, error = %e, "submission source unavailable");
            return Ok(false);
        }
    };
    if observations.is_empty() {
        debug!(block_height, "no submissions observed yet");
        return Ok(false);
    }

    // Strictly-greater comparison: the earliest-seen observation wins ties,
    // keeping the winner stable across re-collection.
    let mut best = &observations[0];
    for observation in &observations[1..] {
        if observation.difficulty > best.difficulty {
            best = observation;
        }
    }

    store
        .upsert_watermark(block_height, &best.address, best.difficulty, best.timestamp)
        .await?;

    for observation in &observations {
        let new_interval = store
            .upsert_submission(block_height, &observation.address, observation.difficulty)
            .await?;
        store
            .upsert_participant_observation(
                &observation.address,
                observation.difficulty,
                new_interval,
            )
            .await?;
    }

    Ok(true)
}

// ============================================================================
// BACKGROUND RECONCILIATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub period: Duration,
    /// How far behind the newest stored watermark to look for gaps.
    pub scan_back: u64,
    /// Gaps backfilled per pass.
    pub batch: usize,
    pub max_concurrent: usize,
    pub deadline: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(600),
            scan_back: 1440,
            batch: 25,
            max_concurrent: 5,
            deadline: Duration::from_secs(60),
        }
    }
}

/// Periodically backfills gaps in the stored watermark range. Shares the
/// collect contract with the on-demand trigger endpoint, so behavior is
/// identical regardless of which path requested a block.
pub fn spawn_reconciler(
    collector: Arc<WatermarkCollector>,
    store: Arc<dyn DifficultyStore>,
    config: ReconcilerConfig,
    stop: Arc<Notify>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(config.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let gaps = match store.get_missing_intervals(config.scan_back, config.batch).await {
                        Ok(gaps) => gaps,
                        Err(e) => {
                            warn!(error = %e, "gap scan failed");
                            continue;
                        }
                    };
                    if gaps.is_empty() {
                        continue;
                    }
                    info!(gaps = gaps.len(), "backfilling missing watermarks");
                    let timer = OperationTimer::start();
                    let results = collector
                        .collect_many(&gaps, config.max_concurrent, config.deadline)
                        .await;
                    let collected = results.values().filter(|ok| **ok).count();
                    debug!(
                        collected,
                        requested = gaps.len(),
                        duration_ms = timer.elapsed_ms(),
                        "reconciliation pass done"
                    );
                }
                _ = stop.notified() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::sync::Mutex;

    /// Scripted source: returns the configured observations for any block,
    /// counting in-flight calls to verify the concurrency bound.
    struct FakeSource {
        observations: Mutex<Vec<SubmissionObservation>>,
        delay: Duration,
        in_flight: Arc<std::sync::atomic::AtomicUsize>,
        max_in_flight: Arc<std::sync::atomic::AtomicUsize>,
        fail: bool,
    }

    impl FakeSource {
        fn with(observations: Vec<(&str, f64)>) -> Self {
            Self {
                observations: Mutex::new(
                    observations
                        .into_iter()
                        .map(|(address, difficulty)| SubmissionObservation {
                            address: address.to_string(),
                            difficulty,
                            timestamp: None,
                        })
                        .collect(),
                ),
                delay: Duration::ZERO,
                in_flight: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
                max_in_flight: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
                fail: false,
            }
        }

        fn set(&self, observations: Vec<(&str, f64)>) {
            *self.observations.lock().unwrap() = observations
                .into_iter()
                .map(|(address, difficulty)| SubmissionObservation {
                    address: address.to_string(),
                    difficulty,
                    timestamp: None,
                })
                .collect();
        }
    }

    #[async_trait]
    impl SubmissionSource for FakeSource {
        async fn fetch_submissions(&self, _block_height: u64) -> Result<Vec<SubmissionObservation>> {
            use std::sync::atomic::Ordering;
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("upstream unreachable");
            }
            Ok(self.observations.lock().unwrap().clone())
        }
    }

    fn collector_with(source: FakeSource) -> (Arc<WatermarkCollector>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let collector = Arc::new(WatermarkCollector::new(
            Arc::new(source),
            store.clone() as Arc<dyn DifficultyStore>,
        ));
        (collector, store)
    }

    #[tokio::test]
    async fn test_collect_picks_highest_difficulty() {
        let (collector, store) =
            collector_with(FakeSource::with(vec![("A", 500.0), ("B", 900.0), ("C", 300.0)]));
        assert!(collector.collect(100).await.unwrap());

        let watermark = store.get_watermark(100).await.unwrap().unwrap();
        assert_eq!(watermark.address, "B");
        assert_eq!(watermark.difficulty, 900.0);
        assert_eq!(store.watermark_count(), 1);

        let submissions = store.get_interval_submissions(100, 10).await.unwrap();
        assert_eq!(submissions.len(), 3);
        assert_eq!(submissions[0].address, "B");
    }

    #[tokio::test]
    async fn test_collect_never_regresses_watermark() {
        let source = Arc::new(FakeSource::with(vec![("A", 500.0), ("B", 900.0), ("C", 300.0)]));
        let store = Arc::new(MemoryStore::new());
        let collector = Arc::new(WatermarkCollector::new(
            source.clone(),
            store.clone() as Arc<dyn DifficultyStore>,
        ));

        assert!(collector.collect(100).await.unwrap());

        // B's reported value decreased and D appeared; the watermark must
        // stay at (B, 900).
        source.set(vec![("A", 500.0), ("B", 850.0), ("D", 200.0)]);
        assert!(collector.collect(100).await.unwrap());

        let watermark = store.get_watermark(100).await.unwrap().unwrap();
        assert_eq!(watermark.address, "B");
        assert_eq!(watermark.difficulty, 900.0);
        assert_eq!(store.watermark_count(), 1);

        // D's submission was still recorded.
        let submissions = store.get_interval_submissions(100, 10).await.unwrap();
        assert_eq!(submissions.len(), 4);
    }

    #[tokio::test]
    async fn test_collect_is_idempotent() {
        let (collector, store) = collector_with(FakeSource::with(vec![("A", 500.0), ("B", 900.0)]));

        assert!(collector.collect(7).await.unwrap());
        let first = store.get_watermark(7).await.unwrap().unwrap();
        let participant_first = store.get_participant("A").await.unwrap().unwrap();

        assert!(collector.collect(7).await.unwrap());
        let second = store.get_watermark(7).await.unwrap().unwrap();
        let participant_second = store.get_participant("A").await.unwrap().unwrap();

        assert_eq!(first.address, second.address);
        assert_eq!(first.difficulty, second.difficulty);
        // Re-collection must not inflate participation counts.
        assert_eq!(
            participant_first.blocks_participated,
            participant_second.blocks_participated
        );
    }

    #[tokio::test]
    async fn test_collect_ties_keep_earliest_observation() {
        let (collector, store) = collector_with(FakeSource::with(vec![("A", 900.0), ("B", 900.0)]));
        assert!(collector.collect(1).await.unwrap());
        let watermark = store.get_watermark(1).await.unwrap().unwrap();
        assert_eq!(watermark.address, "A");
    }

    #[tokio::test]
    async fn test_collect_empty_and_failing_source() {
        let (collector, store) = collector_with(FakeSource::with(vec![]));
        assert!(!collector.collect(42).await.unwrap());
        assert_eq!(store.watermark_count(), 0);

        let mut failing = FakeSource::with(vec![("A", 1.0)]);
        failing.fail = true;
        let (collector, store) = collector_with(failing);
        // Upstream failure is a failed collection, not an error.
        assert!(!collector.collect(42).await.unwrap());
        assert_eq!(store.watermark_count(), 0);
    }

    #[tokio::test]
    async fn test_collect_updates_participant_registry() {
        let (collector, store) = collector_with(FakeSource::with(vec![("A", 500.0)]));
        collector.collect(1).await.unwrap();

        let collector = Arc::new(WatermarkCollector::new(
            Arc::new(FakeSource::with(vec![("A", 700.0)])),
            store.clone() as Arc<dyn DifficultyStore>,
        ));
        collector.collect(2).await.unwrap();

        let participant = store.get_participant("A").await.unwrap().unwrap();
        assert_eq!(participant.best_difficulty, 700.0);
        assert_eq!(participant.blocks_participated, 2);
        assert_eq!(participant.is_public, None);
    }

    #[tokio::test]
    async fn test_collect_many_bounds_concurrency() {
        let mut source = FakeSource::with(vec![("A", 10.0)]);
        source.delay = Duration::from_millis(20);
        let max_in_flight = source.max_in_flight.clone();
        let (collector, _store) = collector_with(source);

        let heights: Vec<u64> = (1..=8).collect();
        let results = collector
            .collect_many(&heights, 2, Duration::from_secs(5))
            .await;

        assert_eq!(results.len(), 8);
        assert!(results.values().all(|ok| *ok));
        assert!(max_in_flight.load(std::sync::atomic::Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_collect_many_deadline_detaches_work() {
        let mut source = FakeSource::with(vec![("A", 10.0)]);
        source.delay = Duration::from_millis(80);
        let (collector, store) = collector_with(source);

        let results = collector
            .collect_many(&[1], 5, Duration::from_millis(10))
            .await;
        // Not finished by the deadline: reported failed...
        assert_eq!(results[&1], false);

        // ...but the detached task still completes its store write.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.get_watermark(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_collect_many_isolates_failures() {
        struct SplitSource;
        #[async_trait]
        impl SubmissionSource for SplitSource {
            async fn fetch_submissions(
                &self,
                block_height: u64,
            ) -> Result<Vec<SubmissionObservation>> {
                if block_height % 2 == 0 {
                    anyhow::bail!("transient upstream error");
                }
                Ok(vec![SubmissionObservation {
                    address: "A".to_string(),
                    difficulty: 5.0,
                    timestamp: None,
                }])
            }
        }

        let store = Arc::new(MemoryStore::new());
        let collector = Arc::new(WatermarkCollector::new(
            Arc::new(SplitSource),
            store.clone() as Arc<dyn DifficultyStore>,
        ));
        let results = collector
            .collect_many(&[1, 2, 3, 4], 4, Duration::from_secs(5))
            .await;

        assert!(results[&1] && results[&3]);
        assert!(!results[&2] && !results[&4]);
        assert_eq!(store.watermark_count(), 2);
    }

    #[tokio::test]
    async fn test_reconciler_backfills_gaps() {
        let (collector, store) = collector_with(FakeSource::with(vec![("A", 10.0)]));
        store.upsert_watermark(100, "A", 1.0, None).await.unwrap();
        store.upsert_watermark(103, "A", 1.0, None).await.unwrap();

        let stop = Arc::new(Notify::new());
        let handle = spawn_reconciler(
            collector,
            store.clone() as Arc<dyn DifficultyStore>,
            ReconcilerConfig {
                period: Duration::from_millis(10),
                ..Default::default()
            },
            stop.clone(),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        stop.notify_one();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;

        assert!(store.get_watermark(101).await.unwrap().is_some());
        assert!(store.get_watermark(102).await.unwrap().is_some());
    }
}
