//! Sliding-window admission control for public read endpoints
//!
//! One counter entry per client identifier, keyed by a fixed time window.
//! Denial is a normal outcome, not an error; callers map it to 429 and
//! surface the window metadata either way.
//!
//! Entry mutation happens under the map's per-shard entry lock, so
//! concurrent requests from the same client cannot lose increments and a
//! check never holds an exclusive lock over the whole table. A background
//! sweep drops elapsed windows on a coarse period to bound memory.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct GovernorConfig {
    pub window: Duration,
    pub max_requests: u32,
    pub sweep_period: Duration,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 100,
            sweep_period: Duration::from_secs(300),
        }
    }
}

/// Outcome of one admission check. Built on every request, allowed or not,
/// so governed responses can always surface the window metadata.
#[derive(Debug, Clone)]
pub struct Admission {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix seconds at which the client's current window expires.
    pub reset_at: i64,
}

#[derive(Debug)]
struct WindowEntry {
    count: u32,
    started: Instant,
    reset_at: i64,
}

impl WindowEntry {
    fn start(now: Instant, window: Duration) -> Self {
        Self {
            count: 0,
            started: now,
            reset_at: chrono::Utc::now().timestamp() + window.as_secs() as i64,
        }
    }
}

pub struct RateGovernor {
    config: GovernorConfig,
    entries: DashMap<String, WindowEntry>,
    stop: Notify,
}

impl RateGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            stop: Notify::new(),
        }
    }

    /// Admit or deny one request from `client_id` within the current window,
    /// using the configured cap.
    pub fn admit(&self, client_id: &str) -> Admission {
        self.admit_with_limit(client_id, None)
    }

    /// Like `admit`, with an optional per-call cap override. The counter is
    /// shared per client either way; only the threshold changes.
    pub fn admit_with_limit(&self, client_id: &str, limit: Option<u32>) -> Admission {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(client_id.to_string())
            .or_insert_with(|| WindowEntry::start(now, self.config.window));

        // An elapsed window is replaced, not incremented.
        if now.duration_since(entry.started) >= self.config.window {
            *entry = WindowEntry::start(now, self.config.window);
        }
        entry.count += 1;

        let limit = limit.unwrap_or(self.config.max_requests);
        Admission {
            allowed: entry.count <= limit,
            limit,
            remaining: limit.saturating_sub(entry.count),
            reset_at: entry.reset_at,
        }
    }

    /// Drop entries whose window has elapsed. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        let window = self.config.window;
        self.entries.retain(|_, entry| entry.started.elapsed() < window);
        before.saturating_sub(self.entries.len())
    }

    /// Runs the periodic sweep until `shutdown` is called.
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let governor = self;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(governor.config.sweep_period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let removed = governor.sweep();
                        if removed > 0 {
                            debug!(removed, "rate limit sweep");
                        }
                    }
                    _ = governor.stop.notified() => break,
                }
            }
        })
    }

    /// Stops the background sweep task. Safe to call before the sweeper has
    /// reached its first wait; the notification is held until consumed.
    pub fn shutdown(&self) {
        self.stop.notify_one();
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.entries.len()
    }
}
