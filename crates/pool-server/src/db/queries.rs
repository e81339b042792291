//! Database queries for the pool dashboard server (PostgreSQL)
//!
//! Watermark and submission writes are conditional upserts: a row is only
//! replaced when the incoming difficulty is strictly greater, so concurrent
//! collection attempts can never regress a stored value.

use crate::models::{
    CombinedCandidate, IntervalWatermark, MonitoredParticipant, ParticipantIntervalSubmission,
    WinCountRow,
};
use anyhow::Result;
use deadpool_postgres::Pool;
use tokio_postgres::Row;

// ============================================================================
// WATERMARKS (block_highest_diff)
// ============================================================================

fn watermark_from_row(row: &Row) -> IntervalWatermark {
    IntervalWatermark {
        block_height: row.get::<_, i64>(0) as u64,
        address: row.get(1),
        difficulty: row.get(2),
        block_time: row
            .get::<_, Option<chrono::DateTime<chrono::Utc>>>(3)
            .map(|dt| dt.timestamp()),
        collected_at: row.get::<_, chrono::DateTime<chrono::Utc>>(4).timestamp(),
    }
}

pub async fn get_watermark(pool: &Pool, block_height: u64) -> Result<Option<IntervalWatermark>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            "SELECT block_height, address, difficulty, block_time, collected_at
             FROM block_highest_diff WHERE block_height = $1",
            &[&(block_height as i64)],
        )
        .await?;
    Ok(row.as_ref().map(watermark_from_row))
}

pub async fn get_recent_watermarks(pool: &Pool, limit: usize) -> Result<Vec<IntervalWatermark>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT block_height, address, difficulty, block_time, collected_at
             FROM block_highest_diff ORDER BY block_height DESC LIMIT $1",
            &[&(limit as i64)],
        )
        .await?;
    Ok(rows.iter().map(watermark_from_row).collect())
}

/// Insert the watermark for a block, or replace it only when the incoming
/// difficulty is strictly greater than the stored one.
pub async fn upsert_watermark(
    pool: &Pool,
    block_height: u64,
    address: &str,
    difficulty: f64,
    block_time: Option<i64>,
) -> Result<()> {
    let client = pool.get().await?;
    let block_time = block_time.and_then(|t| chrono::DateTime::from_timestamp(t, 0));
    client
        .execute(
            "INSERT INTO block_highest_diff (block_height, address, difficulty, block_time, collected_at)
             VALUES ($1, $2, $3, $4, NOW())
             ON CONFLICT (block_height) DO UPDATE SET
                address = EXCLUDED.address,
                difficulty = EXCLUDED.difficulty,
                block_time = COALESCE(EXCLUDED.block_time, block_highest_diff.block_time),
                collected_at = EXCLUDED.collected_at
             WHERE block_highest_diff.difficulty < EXCLUDED.difficulty",
            &[&(block_height as i64), &address, &difficulty, &block_time],
        )
        .await?;
    Ok(())
}

pub async fn get_participant_watermark_wins(
    pool: &Pool,
    address: &str,
    limit: usize,
) -> Result<Vec<IntervalWatermark>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT block_height, address, difficulty, block_time, collected_at
             FROM block_highest_diff WHERE address = $1
             ORDER BY block_height DESC LIMIT $2",
            &[&address, &(limit as i64)],
        )
        .await?;
    Ok(rows.iter().map(watermark_from_row).collect())
}

/// Blocks missing from the stored watermark range, newest first. Scans at
/// most `scan_back` blocks behind the highest stored height.
pub async fn get_missing_intervals(pool: &Pool, scan_back: u64, limit: usize) -> Result<Vec<u64>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT gs.height FROM generate_series(
                (SELECT GREATEST(MIN(block_height), MAX(block_height) - $1::BIGINT)
                 FROM block_highest_diff),
                (SELECT MAX(block_height) FROM block_highest_diff)
             ) AS gs(height)
             LEFT JOIN block_highest_diff b ON b.block_height = gs.height
             WHERE b.block_height IS NULL
             ORDER BY gs.height DESC
             LIMIT $2",
            &[&(scan_back as i64), &(limit as i64)],
        )
        .await?;
    Ok(rows.iter().map(|r| r.get::<_, i64>(0) as u64).collect())
}

// ============================================================================
// SUBMISSIONS (user_block_diff)
// ============================================================================

fn submission_from_row(row: &Row) -> ParticipantIntervalSubmission {
    ParticipantIntervalSubmission {
        block_height: row.get::<_, i64>(0) as u64,
        address: row.get(1),
        difficulty: row.get(2),
    }
}

/// Upsert one participant's best difficulty for a block under the
/// monotonic-max rule. Returns true when this created the (block, address)
/// row, so the caller can count the participation exactly once.
pub async fn upsert_submission(
    pool: &Pool,
    block_height: u64,
    address: &str,
    difficulty: f64,
) -> Result<bool> {
    let client = pool.get().await?;
    // xmax = 0 distinguishes a fresh insert from a conflict update.
    let row = client
        .query_opt(
            "INSERT INTO user_block_diff (block_height, address, difficulty)
             VALUES ($1, $2, $3)
             ON CONFLICT (block_height, address) DO UPDATE SET
                difficulty = EXCLUDED.difficulty
             WHERE user_block_diff.difficulty < EXCLUDED.difficulty
             RETURNING (xmax = 0) AS inserted",
            &[&(block_height as i64), &address, &difficulty],
        )
        .await?;
    Ok(row.map(|r| r.get(0)).unwrap_or(false))
}

pub async fn get_interval_submissions(
    pool: &Pool,
    block_height: u64,
    limit: usize,
) -> Result<Vec<ParticipantIntervalSubmission>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT block_height, address, difficulty
             FROM user_block_diff WHERE block_height = $1
             ORDER BY difficulty DESC, address ASC LIMIT $2",
            &[&(block_height as i64), &(limit as i64)],
        )
        .await?;
    Ok(rows.iter().map(submission_from_row).collect())
}

pub async fn get_participant_submission_history(
    pool: &Pool,
    address: &str,
    limit: usize,
) -> Result<Vec<ParticipantIntervalSubmission>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT block_height, address, difficulty
             FROM user_block_diff WHERE address = $1
             ORDER BY block_height DESC LIMIT $2",
            &[&address, &(limit as i64)],
        )
        .await?;
    Ok(rows.iter().map(submission_from_row).collect())
}

// ============================================================================
// PARTICIPANT REGISTRY
// ============================================================================

fn participant_from_row(row: &Row) -> MonitoredParticipant {
    MonitoredParticipant {
        address: row.get(0),
        is_active: row.get(1),
        is_public: row.get(2),
        best_difficulty: row.get(3),
        blocks_participated: row.get::<_, i64>(4) as u64,
        first_seen: row.get::<_, chrono::DateTime<chrono::Utc>>(5).timestamp(),
        updated_at: row
            .get::<_, Option<chrono::DateTime<chrono::Utc>>>(6)
            .map(|dt| dt.timestamp()),
    }
}

pub async fn get_participant(pool: &Pool, address: &str) -> Result<Option<MonitoredParticipant>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            "SELECT address, is_active, is_public, best_difficulty, blocks_participated,
                    first_seen, updated_at
             FROM monitored_participants WHERE address = $1",
            &[&address],
        )
        .await?;
    Ok(row.as_ref().map(participant_from_row))
}

/// Record one observed submission against the registry: creates the row on
/// first sight, raises the best-ever difficulty high-water mark, and counts
/// the block exactly once (`new_interval` is true only when the caller just
/// created the participant's row for that block).
pub async fn upsert_participant_observation(
    pool: &Pool,
    address: &str,
    difficulty: f64,
    new_interval: bool,
) -> Result<()> {
    let client = pool.get().await?;
    let delta: i64 = if new_interval { 1 } else { 0 };
    client
        .execute(
            "INSERT INTO monitored_participants
                (address, best_difficulty, blocks_participated, first_seen, updated_at)
             VALUES ($1, $2, $3, NOW(), NOW())
             ON CONFLICT (address) DO UPDATE SET
                best_difficulty = GREATEST(monitored_participants.best_difficulty, EXCLUDED.best_difficulty),
                blocks_participated = monitored_participants.blocks_participated + $3,
                updated_at = NOW()",
            &[&address, &difficulty, &delta],
        )
        .await?;
    Ok(())
}

/// Owner-controlled visibility toggle. Returns false for unknown addresses.
pub async fn set_participant_visibility(pool: &Pool, address: &str, public: bool) -> Result<bool> {
    let client = pool.get().await?;
    let updated = client
        .execute(
            "UPDATE monitored_participants SET is_public = $2, updated_at = NOW()
             WHERE address = $1",
            &[&address, &public],
        )
        .await?;
    Ok(updated > 0)
}

/// Participants are never deleted, only deactivated.
pub async fn deactivate_participant(pool: &Pool, address: &str) -> Result<bool> {
    let client = pool.get().await?;
    let updated = client
        .execute(
            "UPDATE monitored_participants SET is_active = FALSE, updated_at = NOW()
             WHERE address = $1",
            &[&address],
        )
        .await?;
    Ok(updated > 0)
}

// ============================================================================
// LEADERBOARDS
// ============================================================================

/// Watermark wins grouped by winning address, public participants only.
/// COALESCE(is_public, TRUE) is the tri-state visibility rule: no registry
/// row and an unset flag both count as public (see privacy::is_public).
pub async fn get_win_count_leaderboard(pool: &Pool, limit: usize) -> Result<Vec<WinCountRow>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT b.address, COUNT(*)::BIGINT AS wins,
                    SUM(b.difficulty) AS total_difficulty,
                    AVG(b.difficulty) AS average_difficulty
             FROM block_highest_diff b
             LEFT JOIN monitored_participants p ON p.address = b.address
             WHERE COALESCE(p.is_public, TRUE)
             GROUP BY b.address
             ORDER BY wins DESC, b.address ASC
             LIMIT $1",
            &[&(limit as i64)],
        )
        .await?;
    Ok(rows
        .iter()
        .map(|row| WinCountRow {
            address: row.get(0),
            wins: row.get::<_, i64>(1) as u64,
            total_difficulty: row.get(2),
            average_difficulty: row.get(3),
        })
        .collect())
}

/// Candidate set for the combined leaderboard: every active registered
/// participant with their best-ever difficulty and total watermark wins.
/// Ranking happens in memory; the row order here (difficulty descending,
/// address ascending) is the stable tie-break order.
pub async fn get_combined_candidates(pool: &Pool, limit: usize) -> Result<Vec<CombinedCandidate>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT p.address, p.best_difficulty, COALESCE(w.wins, 0)::BIGINT AS wins, p.is_public
             FROM monitored_participants p
             LEFT JOIN (
                SELECT address, COUNT(*) AS wins FROM block_highest_diff GROUP BY address
             ) w ON w.address = p.address
             WHERE p.is_active
             ORDER BY p.best_difficulty DESC, p.address ASC
             LIMIT $1",
            &[&(limit as i64)],
        )
        .await?;
    Ok(rows
        .iter()
        .map(|row| CombinedCandidate {
            address: row.get(0),
            best_difficulty: row.get(1),
            wins: row.get::<_, i64>(2) as u64,
            is_public: row.get(3),
        })
        .collect())
}
