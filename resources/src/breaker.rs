//! Per-executor circuit breaker.
//!
//! Closed → Open once consecutive failures reach the threshold. Open → HalfOpen
//! when an execution starts after the cooldown. HalfOpen admits one probe at a
//! time; it moves to Closed after enough probe successes and back to Open on any
//! probe failure. `reset` forces Closed.
//!
//! History gets exactly one entry per transition; failures while already open
//! only bump the counter. Every method takes `now` explicitly so callers (and
//! tests) control the clock.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown_secs: f64,
    /// Successful probes needed in half-open before closing.
    pub probe_successes: u32,
    /// Executions using more than this are recorded as failures.
    pub memory_threshold_mb: f64,
    pub history_limit: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 60.0,
            probe_successes: 1,
            memory_threshold_mb: 2048.0,
            history_limit: 100,
        }
    }
}

impl BreakerConfig {
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.cooldown_secs).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChange {
    pub from: BreakerState,
    pub to: BreakerState,
    pub failure_count: u32,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: BreakerState,
    failure_count: u32,
    probe_successes: u32,
    probe_in_flight: bool,
    opened_at: Option<Instant>,
    history: VecDeque<StateChange>,
    total_changes: u64,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: BreakerState::Closed,
            failure_count: 0,
            probe_successes: 0,
            probe_in_flight: false,
            opened_at: None,
            history: VecDeque::new(),
            total_changes: 0,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &BreakerConfig {
        &self.config
    }

    #[must_use]
    pub const fn state(&self) -> BreakerState {
        self.state
    }

    #[must_use]
    pub const fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Retained transitions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &StateChange> {
        self.history.iter()
    }

    /// Every transition ever made, including ones evicted from `history`.
    #[must_use]
    pub const fn total_changes(&self) -> u64 {
        self.total_changes
    }

    /// Time left before an open breaker may probe. `None` unless open.
    #[must_use]
    pub fn remaining_cooldown(&self, now: Instant) -> Option<Duration> {
        if self.state != BreakerState::Open {
            return None;
        }
        let opened = self.opened_at?;
        Some(
            self.config
                .cooldown()
                .saturating_sub(now.saturating_duration_since(opened)),
        )
    }

    /// Pure admission check.
    #[must_use]
    pub fn allows(&self, now: Instant) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => !self.probe_in_flight,
            BreakerState::Open => self
                .remaining_cooldown(now)
                .is_some_and(|left| left.is_zero()),
        }
    }

    /// Called when an admitted execution starts. Moves an open breaker whose
    /// cooldown has elapsed to half-open; in half-open the execution is the probe.
    pub fn on_start(&mut self, now: Instant) {
        match self.state {
            BreakerState::Open if self.allows(now) => {
                self.probe_successes = 0;
                self.probe_in_flight = true;
                self.transition(BreakerState::HalfOpen, "cooldown elapsed, probing");
            }
            BreakerState::HalfOpen => self.probe_in_flight = true,
            BreakerState::Closed | BreakerState::Open => {}
        }
    }

    pub fn record_success(&mut self) {
        match self.state {
            BreakerState::Closed => self.failure_count = 0,
            BreakerState::HalfOpen => {
                self.probe_in_flight = false;
                self.probe_successes += 1;
                if self.probe_successes >= self.config.probe_successes {
                    self.failure_count = 0;
                    self.opened_at = None;
                    self.transition(BreakerState::Closed, "probe succeeded");
                }
            }
            // a straggler that was admitted before the breaker opened
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&mut self, now: Instant, reason: &str) {
        self.failure_count = self.failure_count.saturating_add(1);
        match self.state {
            BreakerState::Closed if self.failure_count >= self.config.failure_threshold => {
                self.opened_at = Some(now);
                self.transition(BreakerState::Open, reason);
            }
            BreakerState::HalfOpen => {
                self.probe_in_flight = false;
                self.opened_at = Some(now);
                self.transition(BreakerState::Open, reason);
            }
            BreakerState::Closed | BreakerState::Open => {}
        }
    }

    /// Administrative reset to closed with a zero failure count.
    pub fn reset(&mut self) {
        self.failure_count = 0;
        self.probe_successes = 0;
        self.probe_in_flight = false;
        self.opened_at = None;
        if self.state != BreakerState::Closed {
            self.transition(BreakerState::Closed, "manual reset");
        }
    }

    fn transition(&mut self, to: BreakerState, reason: &str) {
        let change = StateChange {
            from: self.state,
            to,
            failure_count: self.failure_count,
            reason: reason.to_string(),
            at: Utc::now(),
        };
        self.state = to;
        self.total_changes += 1;
        if self.history.len() >= self.config.history_limit.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(change);
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{BreakerConfig, BreakerState, CircuitBreaker};

    fn breaker(threshold: u32, cooldown_secs: f64) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            cooldown_secs,
            ..BreakerConfig::default()
        })
    }

    #[test]
    fn threshold_failures_open_once() {
        let now = Instant::now();
        let mut b = breaker(3, 60.0);
        for _ in 0..2 {
            b.record_failure(now, "boom");
        }
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.history().count(), 0);

        b.record_failure(now, "boom");
        assert_eq!(b.state(), BreakerState::Open);
        assert_eq!(b.history().count(), 1);

        for _ in 0..50 {
            b.record_failure(now, "boom");
        }
        assert_eq!(b.history().count(), 1);
        assert_eq!(b.total_changes(), 1);
        assert_eq!(b.failure_count(), 53);
    }

    #[test]
    fn allows_is_pure_and_start_moves_to_half_open() {
        let t0 = Instant::now();
        let mut b = breaker(1, 10.0);
        b.record_failure(t0, "boom");
        assert!(!b.allows(t0 + Duration::from_secs(5)));

        let later = t0 + Duration::from_secs(11);
        assert!(b.allows(later));
        assert!(b.allows(later));
        assert_eq!(b.state(), BreakerState::Open);

        b.on_start(later);
        assert_eq!(b.state(), BreakerState::HalfOpen);
        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.failure_count(), 0);
        let path: Vec<_> = b.history().map(|c| (c.from, c.to)).collect();
        assert_eq!(
            path,
            [
                (BreakerState::Closed, BreakerState::Open),
                (BreakerState::Open, BreakerState::HalfOpen),
                (BreakerState::HalfOpen, BreakerState::Closed),
            ]
        );
    }

    #[test]
    fn failed_probe_reopens() {
        let t0 = Instant::now();
        let mut b = breaker(1, 0.0);
        b.record_failure(t0, "first");
        b.on_start(t0);
        assert_eq!(b.state(), BreakerState::HalfOpen);
        b.record_failure(t0, "probe failed");
        assert_eq!(b.state(), BreakerState::Open);
        assert_eq!(b.history().count(), 3);
    }

    #[test]
    fn half_open_admits_one_probe_at_a_time() {
        let t0 = Instant::now();
        let mut b = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            cooldown_secs: 0.0,
            probe_successes: 2,
            ..BreakerConfig::default()
        });
        b.record_failure(t0, "boom");
        b.on_start(t0);
        assert_eq!(b.state(), BreakerState::HalfOpen);
        assert!(!b.allows(t0));

        b.record_success();
        assert_eq!(b.state(), BreakerState::HalfOpen);
        assert!(b.allows(t0));

        b.on_start(t0);
        assert!(!b.allows(t0));
        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.allows(t0));
    }

    #[test]
    fn success_while_closed_clears_consecutive_failures() {
        let now = Instant::now();
        let mut b = breaker(3, 60.0);
        b.record_failure(now, "a");
        b.record_failure(now, "b");
        b.record_success();
        b.record_failure(now, "c");
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.failure_count(), 1);
    }

    #[test]
    fn reset_closes_and_history_is_bounded() {
        let now = Instant::now();
        let mut b = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            history_limit: 4,
            ..BreakerConfig::default()
        });
        for _ in 0..5 {
            b.record_failure(now, "boom");
            b.reset();
        }
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.total_changes(), 10);
        assert_eq!(b.history().count(), 4);

        b.reset();
        assert_eq!(b.total_changes(), 10);
    }
}
