//! Turn-taking timers on the audio clock
//!
//! Timers advance by the exact duration of each frame they are fed instead of
//! wall-clock time, so a queue backlog or a slow host cannot shift a turn
//! boundary.

use std::time::Duration;

/// Restartable, cancellable threshold timer
#[derive(Debug, Clone)]
pub struct AudioClockTimer {
    threshold: Duration,
    elapsed: Duration,
    armed: bool,
}

impl AudioClockTimer {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            elapsed: Duration::ZERO,
            armed: false,
        }
    }

    /// Start counting from zero
    pub fn arm(&mut self) {
        self.elapsed = Duration::ZERO;
        self.armed = true;
    }

    /// Back to zero, stays armed
    pub fn restart(&mut self) {
        self.elapsed = Duration::ZERO;
    }

    /// Disarm; a cancelled timer never fires
    pub fn cancel(&mut self) {
        self.elapsed = Duration::ZERO;
        self.armed = false;
    }

    /// Advance by one frame; true once the threshold is reached
    pub fn advance(&mut self, by: Duration) -> bool {
        if !self.armed {
            return false;
        }
        self.elapsed += by;
        self.elapsed >= self.threshold
    }

    /// Threshold reached, without advancing
    pub fn has_elapsed(&self) -> bool {
        self.armed && self.elapsed >= self.threshold
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}
