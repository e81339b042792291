//! Persistence contracts for watermark and submission records
//!
//! The trait is the seam between the collection/ranking logic and the
//! PostgreSQL queries, so both can be exercised against an in-memory store
//! in tests. Every read is bounded by a row-count cap; every write follows
//! the monotonic-max rule enforced by the backing queries.

use crate::db::{queries, DbPool};
use crate::models::{
    CombinedCandidate, IntervalWatermark, MonitoredParticipant, ParticipantIntervalSubmission,
    WinCountRow,
};
use anyhow::Result;
use async_trait::async_trait;

/// Hard cap on recent-watermark listings.
pub const MAX_RECENT_LIMIT: usize = 500;
/// Hard cap on per-block submission scans, independent of caller limits.
pub const MAX_INTERVAL_SUBMISSIONS: usize = 1000;
/// Candidate pool fetched for in-memory combined ranking.
pub const COMBINED_CANDIDATE_CAP: usize = 500;

/// Clamp a caller-supplied limit into [1, max].
pub fn clamp_limit(limit: usize, max: usize) -> usize {
    limit.clamp(1, max)
}

#[async_trait]
pub trait DifficultyStore: Send + Sync {
    async fn get_watermark(&self, block_height: u64) -> Result<Option<IntervalWatermark>>;
    async fn get_recent_watermarks(&self, limit: usize) -> Result<Vec<IntervalWatermark>>;
    async fn upsert_watermark(
        &self,
        block_height: u64,
        address: &str,
        difficulty: f64,
        block_time: Option<i64>,
    ) -> Result<()>;
    async fn get_participant_watermark_wins(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<IntervalWatermark>>;
    async fn get_missing_intervals(&self, scan_back: u64, limit: usize) -> Result<Vec<u64>>;

    /// Returns true when this created the (block, address) row.
    async fn upsert_submission(
        &self,
        block_height: u64,
        address: &str,
        difficulty: f64,
    ) -> Result<bool>;
    async fn get_interval_submissions(
        &self,
        block_height: u64,
        limit: usize,
    ) -> Result<Vec<ParticipantIntervalSubmission>>;
    async fn get_participant_submission_history(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<ParticipantIntervalSubmission>>;

    async fn get_participant(&self, address: &str) -> Result<Option<MonitoredParticipant>>;
    async fn upsert_participant_observation(
        &self,
        address: &str,
        difficulty: f64,
        new_interval: bool,
    ) -> Result<()>;
    async fn set_participant_visibility(&self, address: &str, public: bool) -> Result<bool>;
    async fn deactivate_participant(&self, address: &str) -> Result<bool>;

    async fn get_win_count_leaderboard(&self, limit: usize) -> Result<Vec<WinCountRow>>;
    async fn get_combined_candidates(&self, limit: usize) -> Result<Vec<CombinedCandidate>>;
}

/// PostgreSQL-backed store.
pub struct PgDifficultyStore {
    pool: DbPool,
}

impl PgDifficultyStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DifficultyStore for PgDifficultyStore {
    async fn get_watermark(&self, block_height: u64) -> Result<Option<IntervalWatermark>> {
        queries::get_watermark(&self.pool, block_height).await
    }

    async fn get_recent_watermarks(&self, limit: usize) -> Result<Vec<IntervalWatermark>> {
        let limit = clamp_limit(limit, MAX_RECENT_LIMIT);
        queries::get_recent_watermarks(&self.pool, limit).await
    }

    async fn upsert_watermark(
        &self,
        block_height: u64,
        address: &str,
        difficulty: f64,
        block_time: Option<i64>,
    ) -> Result<()> {
        queries::upsert_watermark(&self.pool, block_height, address, difficulty, block_time).await
    }

    async fn get_participant_watermark_wins(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<IntervalWatermark>> {
        let limit = clamp_limit(limit, MAX_RECENT_LIMIT);
        queries::get_participant_watermark_wins(&self.pool, address, limit).await
    }

    async fn get_missing_intervals(&self, scan_back: u64, limit: usize) -> Result<Vec<u64>> {
        queries::get_missing_intervals(&self.pool, scan_back, limit).await
    }

    async fn upsert_submission(
        &self,
        block_height: u64,
        address: &str,
        difficulty: f64,
    ) -> Result<bool> {
        queries::upsert_submission(&self.pool, block_height, address, difficulty).await
    }

    async fn get_interval_submissions(
        &self,
        block_height: u64,
        limit: usize,
    ) -> Result<Vec<ParticipantIntervalSubmission>> {
        let limit = clamp_limit(limit, MAX_INTERVAL_SUBMISSIONS);
        queries::get_interval_submissions(&self.pool, block_height, limit).await
    }

    async fn get_participant_submission_history(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<ParticipantIntervalSubmission>> {
        let limit = clamp_limit(limit, MAX_RECENT_LIMIT);
        queries::get_participant_submission_history(&self.pool, address, limit).await
    }

    async fn get_participant(&self, address: &str) -> Result<Option<MonitoredParticipant>> {
        queries::get_participant(&self.pool, address).await
    }

    async fn upsert_participant_observation(
        &self,
        address: &str,
        difficulty: f64,
        new_interval: bool,
    ) -> Result<()> {
        queries::upsert_participant_observation(&self.pool, address, difficulty, new_interval).await
    }

    async fn set_participant_visibility(&self, address: &str, public: bool) -> Result<bool> {
        queries::set_participant_visibility(&self.pool, address, public).await
    }

    async fn deactivate_participant(&self, address: &str) -> Result<bool> {
        queries::deactivate_participant(&self.pool, address).await
    }

    async fn get_win_count_leaderboard(&self, limit: usize) -> Result<Vec<WinCountRow>> {
        let limit = clamp_limit(limit, MAX_RECENT_LIMIT);
        queries::get_win_count_leaderboard(&self.pool, limit).await
    }

    async fn get_combined_candidates(&self, limit: usize) -> Result<Vec<CombinedCandidate>> {
        let limit = clamp_limit(limit, COMBINED_CANDIDATE_CAP);
        queries::get_combined_candidates(&self.pool, limit).await
    }
}
