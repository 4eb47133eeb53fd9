// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Retry timer with capped exponential backoff.

use std::time::Duration;

use tokio::time::Instant;

use crate::node::ReconnectPolicy;

/// Retry deadline tracking for one reconnect target.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
    deadline: Option<Instant>,
}

impl Backoff {
    pub(crate) fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            deadline: None,
        }
    }

    /// Returns to the floor interval and disarms the timer.
    pub(crate) fn reset(&mut self) {
        self.attempts = 0;
        self.deadline = None;
    }

    /// Current retry interval.
    pub(crate) fn interval(&self) -> Duration {
        self.policy.delay_for_attempt(self.attempts)
    }

    /// Arms the timer one interval after `now`.
    pub(crate) fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.interval());
    }

    /// Disarms the timer without changing the interval.
    pub(crate) fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Returns true once an armed deadline has passed.
    pub(crate) fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Records an attempt, growing the next interval up to the ceiling.
    pub(crate) fn escalate(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }
}
