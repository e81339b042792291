//! Ranked, privacy-filtered public views
//!
//! Every operation here returns truncated addresses only and applies the
//! opt-out visibility rule before anything leaves the engine. Privacy
//! denial is silent: a non-public participant's history is an empty
//! sequence, never an error.

use crate::models::{
    CombinedCandidate, CombinedView, SubmissionView, WatermarkView, WinCountView,
};
use crate::privacy;
use crate::store::{DifficultyStore, COMBINED_CANDIDATE_CAP, MAX_INTERVAL_SUBMISSIONS};
use anyhow::Result;
use std::cmp::Ordering;

/// Default page size for public reads when the caller does not supply one.
pub const DEFAULT_READ_LIMIT: usize = 25;

// ============================================================================
// RECENT WATERMARKS
// ============================================================================

/// Recent block watermarks. When a block's winner has opted out, the view
/// shows the highest-difficulty public submitter for that block instead of
/// hiding the block; a block with no public submitter at all keeps its
/// difficulty but carries no address. The per-block fallback lookup is
/// bounded by the caller's limit.
pub async fn recent_watermarks(
    store: &dyn DifficultyStore,
    limit: usize,
) -> Result<Vec<WatermarkView>> {
    let watermarks = store.get_recent_watermarks(limit).await?;
    let mut views = Vec::with_capacity(watermarks.len());

    for watermark in watermarks {
        let winner = store.get_participant(&watermark.address).await?;
        if privacy::is_public(winner.as_ref()) {
            views.push(WatermarkView {
                block_height: watermark.block_height,
                miner: Some(privacy::truncate(&watermark.address)),
                difficulty: watermark.difficulty,
                block_time: watermark.block_time,
            });
            continue;
        }

        let mut replacement = None;
        for submission in store
            .get_interval_submissions(watermark.block_height, limit)
            .await?
        {
            let participant = store.get_participant(&submission.address).await?;
            if privacy::is_public(participant.as_ref()) {
                replacement = Some(submission);
                break;
            }
        }

        views.push(match replacement {
            Some(submission) => WatermarkView {
                block_height: watermark.block_height,
                miner: Some(privacy::truncate(&submission.address)),
                difficulty: submission.difficulty,
                block_time: watermark.block_time,
            },
            None => WatermarkView {
                block_height: watermark.block_height,
                miner: None,
                difficulty: watermark.difficulty,
                block_time: watermark.block_time,
            },
        });
    }

    Ok(views)
}

/// One block's watermark, under the same public-winner fallback as the
/// recent listing. None when the block has not been collected yet.
pub async fn watermark_detail(
    store: &dyn DifficultyStore,
    block_height: u64,
) -> Result<Option<WatermarkView>> {
    let watermark = match store.get_watermark(block_height).await? {
        Some(watermark) => watermark,
        None => return Ok(None),
    };

    let winner = store.get_participant(&watermark.address).await?;
    if privacy::is_public(winner.as_ref()) {
        return Ok(Some(WatermarkView {
            block_height: watermark.block_height,
            miner: Some(privacy::truncate(&watermark.address)),
            difficulty: watermark.difficulty,
            block_time: watermark.block_time,
        }));
    }

    for submission in store
        .get_interval_submissions(block_height, MAX_INTERVAL_SUBMISSIONS)
        .await?
    {
        let participant = store.get_participant(&submission.address).await?;
        if privacy::is_public(participant.as_ref()) {
            return Ok(Some(WatermarkView {
                block_height: watermark.block_height,
                miner: Some(privacy::truncate(&submission.address)),
                difficulty: submission.difficulty,
                block_time: watermark.block_time,
            }));
        }
    }

    Ok(Some(WatermarkView {
        block_height: watermark.block_height,
        miner: None,
        difficulty: watermark.difficulty,
        block_time: watermark.block_time,
    }))
}

// ============================================================================
// LEADERBOARDS
// ============================================================================

/// Win-count leaderboard over public participants.
pub async fn watermark_leaderboard(
    store: &dyn DifficultyStore,
    limit: usize,
) -> Result<Vec<WinCountView>> {
    let rows = store.get_win_count_leaderboard(limit).await?;
    Ok(rows
        .into_iter()
        .map(|row| WinCountView {
            miner: privacy::truncate(&row.address),
            wins: row.wins,
            total_difficulty: row.total_difficulty,
            average_difficulty: row.average_difficulty,
        })
        .collect())
}

/// Combined leaderboard: dense ranks by best-ever difficulty and by total
/// watermark wins, computed independently and averaged. Lower combined
/// score is better; ties keep the candidate set's stable order.
pub async fn combined_leaderboard(
    store: &dyn DifficultyStore,
    limit: usize,
) -> Result<Vec<CombinedView>> {
    let candidates: Vec<CombinedCandidate> = store
        .get_combined_candidates(COMBINED_CANDIDATE_CAP)
        .await?
        .into_iter()
        .filter(|candidate| candidate.is_public.unwrap_or(true))
        .collect();

    let mut ranked = rank_combined(&candidates);
    ranked.truncate(limit.max(1));
    Ok(ranked)
}

/// Dense (1, 2, 3, ...) descending ranks for one metric. Equal values share
/// a rank.
fn dense_ranks(candidates: &[CombinedCandidate], key: impl Fn(&CombinedCandidate) -> f64) -> Vec<u32> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        key(&candidates[b])
            .partial_cmp(&key(&candidates[a]))
            .unwrap_or(Ordering::Equal)
    });

    let mut ranks = vec![0u32; candidates.len()];
    let mut rank = 0u32;
    let mut previous: Option<f64> = None;
    for &index in &order {
        let value = key(&candidates[index]);
        if previous != Some(value) {
            rank += 1;
            previous = Some(value);
        }
        ranks[index] = rank;
    }
    ranks
}

fn rank_combined(candidates: &[CombinedCandidate]) -> Vec<CombinedView> {
    let difficulty_ranks = dense_ranks(candidates, |c| c.best_difficulty);
    let wins_ranks = dense_ranks(candidates, |c| c.wins as f64);

    let mut views: Vec<CombinedView> = candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| CombinedView {
            miner: privacy::truncate(&candidate.address),
            best_difficulty: candidate.best_difficulty,
            wins: candidate.wins,
            difficulty_rank: difficulty_ranks[index],
            wins_rank: wins_ranks[index],
            combined_score: (difficulty_ranks[index] + wins_ranks[index]) as f64 / 2.0,
        })
        .collect();

    // Stable: ties keep the candidate set's own order.
    views.sort_by(|a, b| {
        a.combined_score
            .partial_cmp(&b.combined_score)
            .unwrap_or(Ordering::Equal)
    });
    views
}

// ============================================================================
// PER-PARTICIPANT HISTORIES
// ============================================================================

/// Blocks this participant won. Empty when the participant has opted out of
/// public views; the emptiness is indistinguishable from an unknown address.
pub async fn participant_watermark_history(
    store: &dyn DifficultyStore,
    address: &str,
    limit: usize,
) -> Result<Vec<WatermarkView>> {
    let participant = store.get_participant(address).await?;
    if !privacy::is_public(participant.as_ref()) {
        return Ok(Vec::new());
    }

    let wins = store.get_participant_watermark_wins(address, limit).await?;
    Ok(wins
        .into_iter()
        .map(|watermark| WatermarkView {
            block_height: watermark.block_height,
            miner: Some(privacy::truncate(&watermark.address)),
            difficulty: watermark.difficulty,
            block_time: watermark.block_time,
        })
        .collect())
}

/// This participant's best submission per block, winners or not.
pub async fn participant_submission_history(
    store: &dyn DifficultyStore,
    address: &str,
    limit: usize,
) -> Result<Vec<SubmissionView>> {
    let participant = store.get_participant(address).await?;
    if !privacy::is_public(participant.as_ref()) {
        return Ok(Vec::new());
    }

    let history = store
        .get_participant_submission_history(address, limit)
        .await?;
    Ok(history
        .into_iter()
        .map(|submission| SubmissionView {
            block_height: submission.block_height,
            difficulty: submission.difficulty,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn candidate(address: &str, best: f64, wins: u64) -> CombinedCandidate {
        CombinedCandidate {
            address: address.to_string(),
            best_difficulty: best,
            wins,
            is_public: None,
        }
    }

    #[test]
    fn test_dense_ranks_share_on_ties() {
        let candidates = vec![
            candidate("a", 100.0, 0),
            candidate("b", 300.0, 0),
            candidate("c", 300.0, 0),
            candidate("d", 200.0, 0),
        ];
        let ranks = dense_ranks(&candidates, |c| c.best_difficulty);
        assert_eq!(ranks, vec![3, 1, 1, 2]);
    }

    #[test]
    fn test_rank_combined_orders_and_averages() {
        let candidates = vec![
            candidate("dominant", 900.0, 9),
            candidate("quality", 500.0, 1),
            candidate("loyal", 100.0, 5),
            candidate("idle", 50.0, 0),
        ];
        let views = rank_combined(&candidates);

        // dominant: rank 1 on both metrics.
        assert_eq!(views[0].miner, "dominant");
        assert_eq!(views[0].combined_score, 1.0);
        // quality (2+3)/2 and loyal (3+2)/2 tie at 2.5; the candidate
        // set's order breaks the tie, nothing re-sorts further.
        assert_eq!(views[1].miner, "quality");
        assert_eq!(views[1].combined_score, 2.5);
        assert_eq!(views[2].miner, "loyal");
        assert_eq!(views[2].combined_score, 2.5);
        assert_eq!(views[3].miner, "idle");
        assert_eq!(views[3].combined_score, 4.0);
    }

    #[test]
    fn test_rank_combined_is_deterministic() {
        let candidates = vec![
            candidate("aa", 500.0, 3),
            candidate("bb", 500.0, 3),
            candidate("cc", 200.0, 7),
        ];
        let first = rank_combined(&candidates);
        let second = rank_combined(&candidates);
        let order_first: Vec<&str> = first.iter().map(|v| v.miner.as_str()).collect();
        let order_second: Vec<&str> = second.iter().map(|v| v.miner.as_str()).collect();
        assert_eq!(order_first, order_second);
        // Identical inputs share both metric ranks.
        assert_eq!(first[0].difficulty_rank, first[1].difficulty_rank);
        assert_eq!(first[0].wins_rank, first[1].wins_rank);
    }

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        // Block 10: private "ghost" wins, public "alice" runner-up.
        store.seed_participant("ghost", Some(false));
        store.upsert_watermark(10, "ghost", 900.0, None).await.unwrap();
        store.upsert_submission(10, "ghost", 900.0).await.unwrap();
        store.upsert_submission(10, "alice", 700.0).await.unwrap();
        store
            .upsert_participant_observation("alice", 700.0, true)
            .await
            .unwrap();
        // Block 11: public winner.
        store.upsert_watermark(11, "bobaddr99", 400.0, None).await.unwrap();
        store.upsert_submission(11, "bobaddr99", 400.0).await.unwrap();
        store
            .upsert_participant_observation("bobaddr99", 400.0, true)
            .await
            .unwrap();
        // Block 12: only private submitters.
        store.upsert_watermark(12, "ghost", 800.0, None).await.unwrap();
        store.upsert_submission(12, "ghost", 800.0).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_recent_watermarks_rederives_public_winner() {
        let store = seeded_store().await;
        let views = recent_watermarks(&store, 10).await.unwrap();
        assert_eq!(views.len(), 3);

        // Block 12: no public submitter -> difficulty kept, no address.
        assert_eq!(views[0].block_height, 12);
        assert_eq!(views[0].miner, None);
        assert_eq!(views[0].difficulty, 800.0);

        // Block 11: public winner shown as-is (short address unchanged by
        // truncation is still the truncated form).
        assert_eq!(views[1].block_height, 11);
        assert_eq!(views[1].miner.as_deref(), Some("boba...dr99"));

        // Block 10: private winner replaced by best public submitter.
        assert_eq!(views[2].block_height, 10);
        assert_eq!(views[2].miner.as_deref(), Some("alice"));
        assert_eq!(views[2].difficulty, 700.0);
    }

    #[tokio::test]
    async fn test_watermark_detail_not_found_vs_private() {
        let store = seeded_store().await;
        assert!(watermark_detail(&store, 9999).await.unwrap().is_none());

        // Private winner, no public fallback: difficulty shown, no address.
        let view = watermark_detail(&store, 12).await.unwrap().unwrap();
        assert_eq!(view.miner, None);
        assert_eq!(view.difficulty, 800.0);

        // Private winner with a public runner-up.
        let view = watermark_detail(&store, 10).await.unwrap().unwrap();
        assert_eq!(view.miner.as_deref(), Some("alice"));
        assert_eq!(view.difficulty, 700.0);
    }

    #[tokio::test]
    async fn test_privacy_containment() {
        let store = seeded_store().await;

        // Silent empty histories for the opted-out participant.
        assert!(participant_watermark_history(&store, "ghost", 10)
            .await
            .unwrap()
            .is_empty());
        assert!(participant_submission_history(&store, "ghost", 10)
            .await
            .unwrap()
            .is_empty());

        // Never named in either leaderboard.
        let wins = watermark_leaderboard(&store, 10).await.unwrap();
        assert!(wins.iter().all(|row| !row.miner.contains("ghost")));
        let combined = combined_leaderboard(&store, 10).await.unwrap();
        assert!(combined.iter().all(|row| !row.miner.contains("ghost")));
    }

    #[tokio::test]
    async fn test_unknown_address_history_is_public_and_empty() {
        let store = seeded_store().await;
        // No registry row: public by default, with nothing to show.
        let history = participant_watermark_history(&store, "nobody", 10)
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_submission_history_truncates_nothing_but_addresses() {
        let store = seeded_store().await;
        let history = participant_submission_history(&store, "alice", 10)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].block_height, 10);
        assert_eq!(history[0].difficulty, 700.0);
    }

    #[tokio::test]
    async fn test_watermark_leaderboard_truncates_addresses() {
        let store = MemoryStore::new();
        let long = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
        store.upsert_watermark(1, long, 10.0, None).await.unwrap();
        store.upsert_watermark(2, long, 20.0, None).await.unwrap();

        let rows = watermark_leaderboard(&store, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].miner, "bc1q...f3t4");
        assert_eq!(rows[0].wins, 2);
        assert_eq!(rows[0].total_difficulty, 30.0);
        assert_eq!(rows[0].average_difficulty, 15.0);
        assert!(!rows[0].miner.contains("ejxtdg"));
    }
}
