//! Database schema and migrations

use anyhow::Result;
use deadpool_postgres::Object;
use tracing::info;

pub async fn run_migrations(client: &Object) -> Result<()> {
    client.batch_execute(SCHEMA_SQL).await?;
    info!("Database migrations applied");
    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Pool Dashboard Server Database Schema

-- Participant registry. Rows are created on first observed submission and
-- never deleted, only deactivated. A NULL is_public flag means the
-- participant never set a preference and is treated as public.
CREATE TABLE IF NOT EXISTS monitored_participants (
    address VARCHAR(128) PRIMARY KEY,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    is_public BOOLEAN,
    best_difficulty DOUBLE PRECISION NOT NULL DEFAULT 0,
    blocks_participated BIGINT NOT NULL DEFAULT 0,
    first_seen TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS idx_participants_best_difficulty
    ON monitored_participants(best_difficulty DESC);

-- Highest-difficulty submission per block. At most one row per block; a row
-- is only ever replaced by a strictly greater difficulty.
CREATE TABLE IF NOT EXISTS block_highest_diff (
    block_height BIGINT PRIMARY KEY,
    address VARCHAR(128) NOT NULL,
    difficulty DOUBLE PRECISION NOT NULL CHECK (difficulty >= 0),
    block_time TIMESTAMPTZ,
    collected_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_block_highest_diff_address
    ON block_highest_diff(address);

-- Each participant's best difficulty within one block.
CREATE TABLE IF NOT EXISTS user_block_diff (
    block_height BIGINT NOT NULL,
    address VARCHAR(128) NOT NULL,
    difficulty DOUBLE PRECISION NOT NULL CHECK (difficulty >= 0),
    PRIMARY KEY (block_height, address)
);

CREATE INDEX IF NOT EXISTS idx_user_block_diff_address
    ON user_block_diff(address);
CREATE INDEX IF NOT EXISTS idx_user_block_diff_height_difficulty
    ON user_block_diff(block_height, difficulty DESC);
"#;
