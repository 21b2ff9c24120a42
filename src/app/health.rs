//! Sensor health policy.
//!
//! Consecutive failed acquisition cycles escalate through three tiers:
//!
//! | failures                         | tier      | action                          |
//! |----------------------------------|-----------|---------------------------------|
//! | `< warn_threshold`               | `Normal`  | keep showing last good reading  |
//! | `warn_threshold..restart`        | `Warn`    | warning screen (once per streak)|
//! | `>= restart_threshold`           | `Restart` | fatal screen, then restart      |
//!
//! A single successful cycle resets the streak.  The tier function is pure
//! so the thresholds can be exercised without a sensor.

use crate::config::SystemConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthTier {
    Normal,
    Warn,
    Restart,
}

/// Thresholds in consecutive failed cycles.  `warn < restart` is enforced
/// by [`SystemConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    pub warn_threshold: u32,
    pub restart_threshold: u32,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            warn_threshold: 3,
            restart_threshold: 6,
        }
    }
}

impl From<&SystemConfig> for HealthPolicy {
    fn from(cfg: &SystemConfig) -> Self {
        Self {
            warn_threshold: cfg.warn_threshold,
            restart_threshold: cfg.restart_threshold,
        }
    }
}

/// Map a failure count onto a tier.
pub fn tier_for(consecutive_failures: u32, policy: &HealthPolicy) -> HealthTier {
    if consecutive_failures >= policy.restart_threshold {
        HealthTier::Restart
    } else if consecutive_failures >= policy.warn_threshold {
        HealthTier::Warn
    } else {
        HealthTier::Normal
    }
}

/// What the acquisition loop should do after a failed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthAction {
    /// Below the warning tier: re-present the last known-good reading.
    PresentCached,
    /// Entered the warning tier.
    Warn { failures: u32 },
    /// Reached the restart tier.  Issued once per streak.
    Restart { failures: u32 },
    /// Already warned or already restarting; leave the display alone.
    Hold,
}

/// Failure streak bookkeeping, owned by the acquisition loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FailureState {
    consecutive_failures: u32,
    warned: bool,
    restart_requested: bool,
}

impl FailureState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_requested
    }

    /// Clear the streak.  Returns the length of the streak that ended.
    pub fn record_success(&mut self) -> u32 {
        let ended = self.consecutive_failures;
        *self = Self::default();
        ended
    }

    pub fn record_failure(&mut self, policy: &HealthPolicy) -> HealthAction {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let failures = self.consecutive_failures;
        match tier_for(failures, policy) {
            HealthTier::Normal => HealthAction::PresentCached,
            HealthTier::Warn if !self.warned => {
                self.warned = true;
                HealthAction::Warn { failures }
            }
            HealthTier::Restart if !self.restart_requested => {
                self.restart_requested = true;
                HealthAction::Restart { failures }
            }
            HealthTier::Warn | HealthTier::Restart => HealthAction::Hold,
        }
    }
}
