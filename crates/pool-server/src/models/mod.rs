//! Data models for the pool dashboard server

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// PARTICIPANTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredParticipant {
    pub address: String,
    pub is_active: bool,
    /// None means the participant never set a preference. Both None and
    /// Some(true) resolve to public (opt-out model).
    pub is_public: Option<bool>,
    pub best_difficulty: f64,
    pub blocks_participated: u64,
    pub first_seen: i64,
    pub updated_at: Option<i64>,
}

// ============================================================================
// WATERMARKS & SUBMISSIONS
// ============================================================================

/// The single highest-difficulty submission recorded for one block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalWatermark {
    pub block_height: u64,
    pub address: String,
    pub difficulty: f64,
    pub block_time: Option<i64>,
    pub collected_at: i64,
}

/// One participant's best difficulty within one block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantIntervalSubmission {
    pub block_height: u64,
    pub address: String,
    pub difficulty: f64,
}

/// One per-participant observation reported by the upstream pool API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionObservation {
    pub address: String,
    pub difficulty: f64,
    /// Block timestamp when the upstream includes it.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

// ============================================================================
// AGGREGATES
// ============================================================================

/// One row of the win-count leaderboard, grouped by winning address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinCountRow {
    pub address: String,
    pub wins: u64,
    pub total_difficulty: f64,
    pub average_difficulty: f64,
}

/// Candidate row for the combined (difficulty + wins) leaderboard.
/// Ranks are computed in memory from the candidate set.
#[derive(Debug, Clone)]
pub struct CombinedCandidate {
    pub address: String,
    pub best_difficulty: f64,
    pub wins: u64,
    pub is_public: Option<bool>,
}

// ============================================================================
// PUBLIC VIEWS (truncated addresses only)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkView {
    pub block_height: u64,
    /// Truncated address of the best public submitter; None when every
    /// submitter for the block has opted out of public views.
    pub miner: Option<String>,
    pub difficulty: f64,
    pub block_time: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinCountView {
    pub miner: String,
    pub wins: u64,
    pub total_difficulty: f64,
    pub average_difficulty: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedView {
    pub miner: String,
    pub best_difficulty: f64,
    pub wins: u64,
    pub difficulty_rank: u32,
    pub wins_rank: u32,
    pub combined_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionView {
    pub block_height: u64,
    pub difficulty: f64,
}

// ============================================================================
// COLLECTION TRIGGER
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectRequest {
    pub block_heights: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectResponse {
    /// Per-block success flag. False means the block was not resolvable yet
    /// or its collection did not finish before the deadline; retry later.
    pub results: HashMap<u64, bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_timestamp_defaults_to_none() {
        let obs: SubmissionObservation =
            serde_json::from_str(r#"{"address": "bc1qabc", "difficulty": 12.5}"#).unwrap();
        assert_eq!(obs.address, "bc1qabc");
        assert_eq!(obs.difficulty, 12.5);
        assert_eq!(obs.timestamp, None);
    }

    #[test]
    fn test_watermark_view_serialization() {
        let view = WatermarkView {
            block_height: 840000,
            miner: Some("bc1q...xy7k".to_string()),
            difficulty: 123456.0,
            block_time: None,
        };
        let json = serde_json::to_string(&view).unwrap();
        assert!(json.contains("840000"));
        assert!(json.contains("bc1q...xy7k"));
    }
}
