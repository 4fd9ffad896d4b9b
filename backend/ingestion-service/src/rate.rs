//! Target emission rate with a timer-driven burst schedule

use std::time::Duration;
use tokio::time::Instant;

use crate::config::RateConfig;

/// Change of rate mode reported by [`RateController::poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateTransition {
    BurstStarted { rate: u32, duration: Duration },
    BurstEnded { rate: u32 },
}

/// Tracks whether a burst is active and what the current target rate is.
///
/// Bursts start on a fixed schedule measured from `start`: at `start + k * interval`
/// for k >= 1. A scheduled start that falls inside a running burst is skipped.
/// Each burst ends `duration` after it started.
#[derive(Debug)]
pub struct RateController {
    config: RateConfig,
    next_burst_at: Instant,
    burst_ends_at: Option<Instant>,
}

impl RateController {
    pub fn new(config: RateConfig, start: Instant) -> Self {
        let next_burst_at = start + config.burst_interval;
        Self {
            config,
            next_burst_at,
            burst_ends_at: None,
        }
    }

    /// Advance the timers to `now`, returning the transition that fired, if any.
    pub fn poll(&mut self, now: Instant) -> Option<RateTransition> {
        if let Some(ends_at) = self.burst_ends_at {
            if now >= ends_at {
                self.burst_ends_at = None;
                return Some(RateTransition::BurstEnded {
                    rate: self.config.events_per_second,
                });
            }
        }

        if now < self.next_burst_at {
            return None;
        }

        while self.next_burst_at <= now {
            self.next_burst_at += self.config.burst_interval;
        }

        if self.burst_ends_at.is_some() {
            return None;
        }

        self.burst_ends_at = Some(now + self.config.burst_duration);
        Some(RateTransition::BurstStarted {
            rate: self.current_rate(),
            duration: self.config.burst_duration,
        })
    }

    pub fn is_burst(&self) -> bool {
        self.burst_ends_at.is_some()
    }

    /// Target events per second in the current mode
    pub fn current_rate(&self) -> u32 {
        if self.is_burst() {
            self.config
                .events_per_second
                .saturating_mul(self.config.burst_multiplier)
        } else {
            self.config.events_per_second
        }
    }

    /// Pause between two events at the current rate
    pub fn delay(&self) -> Duration {
        Duration::from_secs(1) / self.current_rate().max(1)
    }
}
