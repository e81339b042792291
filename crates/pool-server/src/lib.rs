//! Pool Server - Dashboard backend for a shared-work mining pool
//!
//! Participants submit proof-of-work shares; for every block interval the
//! server records which participant produced the single best share, tracks
//! every participant's own best share per block, and serves ranked public
//! views of that history.
//!
//! Architecture:
//! - Collector: pulls per-participant difficulty observations from the
//!   upstream pool API and upserts block watermarks (monotonic, idempotent)
//! - Store: PostgreSQL tables for watermarks, per-user best shares, and the
//!   participant registry
//! - Ranking: leaderboards and per-user histories behind the privacy filter
//! - Rate governor: sliding-window admission control on all public reads
//!
//! Key invariants:
//! - At most one watermark row per block; a watermark is only ever replaced
//!   by a strictly higher difficulty
//! - Participants with no registry row, or an unset visibility flag, are
//!   treated as public; full addresses never appear in public responses

pub mod api;
pub mod collector;
pub mod db;
pub mod models;
pub mod observability;
pub mod privacy;
pub mod ranking;
pub mod ratelimit;
pub mod state;
pub mod store;
pub mod upstream;

pub use db::DbPool;
pub use observability::init_sentry;
pub use ratelimit::RateGovernor;
pub use state::AppState;
