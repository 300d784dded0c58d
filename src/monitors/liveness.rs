//! Flap-suppressed liveness state of one device
//!
//! The first probe sets the baseline at once and is reported as a wakeup.
//! After that a state flip needs `threshold` consecutive disagreeing
//! probes; any agreeing probe in between starts the count over.

use crate::Liveness;

/// Outcome of feeding one probe result into a [`LivenessTracker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First reading after creation; the baseline is now `alive`
    Wakeup(bool),

    /// Confirmed flip to `alive`
    Changed(bool),

    /// Probe disagrees with the state; `remaining` more are needed to flip
    Pending { remaining: u32 },

    /// Probe agrees with the state
    Steady,
}

#[derive(Debug, Clone)]
pub struct LivenessTracker {
    state: Liveness,
    threshold: u32,
    remaining: u32,
}

impl LivenessTracker {
    /// A threshold of 0 behaves like 1 (flip on the first disagreement)
    pub fn new(threshold: u32) -> Self {
        let threshold = threshold.max(1);
        Self {
            state: Liveness::Unknown,
            threshold,
            remaining: threshold,
        }
    }

    pub fn state(&self) -> Liveness {
        self.state
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Disagreeing probes still needed before the state flips
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn observe(&mut self, alive: bool) -> Observation {
        let current = match self.state {
            Liveness::Unknown => {
                self.state = Liveness::from_alive(alive);
                self.remaining = self.threshold;
                return Observation::Wakeup(alive);
            }
            Liveness::Alive => true,
            Liveness::Dead => false,
        };

        if alive == current {
            self.remaining = self.threshold;
            return Observation::Steady;
        }

        self.remaining -= 1;
        if self.remaining > 0 {
            return Observation::Pending {
                remaining: self.remaining,
            };
        }

        self.state = Liveness::from_alive(alive);
        self.remaining = self.threshold;
        Observation::Changed(alive)
    }
}
