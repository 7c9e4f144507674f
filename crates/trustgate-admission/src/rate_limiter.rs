// crates/trustgate-admission/src/rate_limiter.rs
//
// Per-sender token buckets with violation counting and temporary bans.
//
// Each sender (peer address, connection id, ...) gets a bucket refilled at
// `per_sender_rate` tokens per second holding at most
// `per_sender_rate * burst_multiplier`. Every verification attempt costs one
// token. Authentication failures count as violations; after
// `violations_before_ban` of them the sender is refused outright for
// `ban_duration_secs`. State is sharded per sender so concurrent tasks do
// not contend on one lock.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;

pub const DEFAULT_PER_SENDER_RATE: u32 = 50;
pub const DEFAULT_BURST_MULTIPLIER: u32 = 2;
pub const DEFAULT_VIOLATIONS_BEFORE_BAN: u32 = 20;
pub const DEFAULT_BAN_DURATION_SECS: u64 = 60;

/// Idle senders are forgotten after this long.
const CLEANUP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub per_sender_rate: u32,
    pub burst_multiplier: u32,
    pub violations_before_ban: u32,
    pub ban_duration_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_sender_rate: DEFAULT_PER_SENDER_RATE,
            burst_multiplier: DEFAULT_BURST_MULTIPLIER,
            violations_before_ban: DEFAULT_VIOLATIONS_BEFORE_BAN,
            ban_duration_secs: DEFAULT_BAN_DURATION_SECS,
        }
    }
}

impl RateLimitConfig {
    pub fn with_per_sender_rate(mut self, rate: u32) -> Self {
        self.per_sender_rate = rate;
        self
    }

    pub fn with_burst_multiplier(mut self, multiplier: u32) -> Self {
        self.burst_multiplier = multiplier;
        self
    }

    pub fn with_violations_before_ban(mut self, count: u32) -> Self {
        self.violations_before_ban = count;
        self
    }

    pub fn with_ban_duration_secs(mut self, secs: u64) -> Self {
        self.ban_duration_secs = secs;
        self
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate: u32, burst_multiplier: u32, now: Instant) -> Self {
        let rate = rate as f64;
        let max_tokens = rate * burst_multiplier.max(1) as f64;
        Self {
            tokens: max_tokens,
            max_tokens,
            rate,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.max_tokens);
        self.last_refill = now;
    }

    fn try_consume(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn is_full(&self) -> bool {
        self.tokens >= self.max_tokens
    }
}

#[derive(Debug)]
struct SenderState {
    bucket: TokenBucket,
    violations: u32,
    banned_until: Option<Instant>,
}

/// Concurrent per-sender limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    senders: DashMap<String, SenderState>,
    last_cleanup: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            senders: DashMap::new(),
            last_cleanup: Mutex::new(Instant::now()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn new_state(&self, now: Instant) -> SenderState {
        SenderState {
            bucket: TokenBucket::new(
                self.config.per_sender_rate,
                self.config.burst_multiplier,
                now,
            ),
            violations: 0,
            banned_until: None,
        }
    }

    /// Spend one token for `sender`. False if banned or out of tokens.
    pub fn check(&self, sender: &str) -> bool {
        self.check_at(sender, Instant::now())
    }

    fn check_at(&self, sender: &str, now: Instant) -> bool {
        self.maybe_cleanup(now);
        let mut state = self
            .senders
            .entry(sender.to_string())
            .or_insert_with(|| self.new_state(now));

        if let Some(until) = state.banned_until {
            if now < until {
                return false;
            }
            state.banned_until = None;
            tracing::info!("Ban on {} expired", sender);
        }
        state.bucket.try_consume(now)
    }

    /// Count a violation. Returns true if this one triggered a ban.
    pub fn record_violation(&self, sender: &str) -> bool {
        self.record_violation_at(sender, Instant::now())
    }

    fn record_violation_at(&self, sender: &str, now: Instant) -> bool {
        let mut state = self
            .senders
            .entry(sender.to_string())
            .or_insert_with(|| self.new_state(now));
        state.violations = state.violations.saturating_add(1);
        if state.violations >= self.config.violations_before_ban {
            state.violations = 0;
            state.banned_until = Some(now + Duration::from_secs(self.config.ban_duration_secs));
            tracing::warn!(
                "Banning {} for {}s after repeated violations",
                sender,
                self.config.ban_duration_secs
            );
            true
        } else {
            false
        }
    }

    pub fn is_banned(&self, sender: &str) -> bool {
        let now = Instant::now();
        self.senders
            .get(sender)
            .and_then(|s| s.banned_until)
            .is_some_and(|until| now < until)
    }

    pub fn violation_count(&self, sender: &str) -> u32 {
        self.senders.get(sender).map(|s| s.violations).unwrap_or(0)
    }

    pub fn tracked_senders(&self) -> usize {
        self.senders.len()
    }

    /// Drop senders with a full bucket, no violations and no ban.
    fn maybe_cleanup(&self, now: Instant) {
        let Ok(mut last) = self.last_cleanup.try_lock() else {
            return;
        };
        if now.saturating_duration_since(*last) < Duration::from_secs(CLEANUP_INTERVAL_SECS) {
            return;
        }
        *last = now;
        drop(last);

        self.senders.retain(|_, state| {
            state.bucket.refill(now);
            let banned = state.banned_until.is_some_and(|until| now < until);
            banned || state.violations > 0 || !state.bucket.is_full()
        });
    }
}
