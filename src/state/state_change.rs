// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! State change notifications.
//!
//! A [`StateChange`] is delivered exactly once per effective transition of a
//! [`StateEngine`](super::StateEngine). It carries both the state that was
//! *requested* (what a rule or reconnect asked for) and the state that was
//! actually *entered*, which differ when disconnection overrides the request
//! or when the requested state is unknown.
//!
//! # Examples
//!
//! ```
//! use statemq::state::{ChangeCause, StateEngine};
//!
//! let engine = StateEngine::new();
//! let hello = engine.declare_state_rule("s", "hi", "HELLO");
//!
//! engine.on_state_change(move |change| {
//!     if change.cause == ChangeCause::RuleMatch {
//!         assert_eq!(change.current, hello);
//!         assert_eq!(change.topic.as_deref(), Some("s"));
//!     }
//! });
//!
//! engine.set_connected(true);
//! engine.apply_message("s", "hi");
//! ```

use serde::Serialize;

use super::StateId;

/// What caused a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChangeCause {
    /// An inbound message matched a rule.
    RuleMatch,
    /// The message-bus session was established.
    Connected,
    /// The message-bus session (or the link beneath it) was lost.
    Disconnected,
}

/// Context of a single effective state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChange {
    /// State before the transition.
    pub previous: StateId,
    /// State that the cause asked for.
    pub requested: StateId,
    /// State actually entered.
    pub current: StateId,
    /// What triggered the transition.
    pub cause: ChangeCause,
    /// Index of the matching rule, for [`ChangeCause::RuleMatch`].
    pub rule_index: Option<usize>,
    /// Topic of the matching message, for [`ChangeCause::RuleMatch`].
    pub topic: Option<String>,
    /// Payload of the matching message, for [`ChangeCause::RuleMatch`].
    pub payload: Option<String>,
}

impl StateChange {
    /// Returns true if the entered state differs from the requested one.
    #[must_use]
    pub fn was_overridden(&self) -> bool {
        self.requested != self.current
    }

    /// Returns true if this transition left the `OFFLINE` state.
    #[must_use]
    pub fn came_online(&self) -> bool {
        self.previous == StateId::OFFLINE && self.current != StateId::OFFLINE
    }
}

/// Message that triggered a rule match.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RuleOrigin<'a> {
    pub index: usize,
    pub topic: &'a str,
    pub payload: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(previous: u8, requested: u8, current: u8) -> StateChange {
        StateChange {
            previous: StateId::from_raw(previous),
            requested: StateId::from_raw(requested),
            current: StateId::from_raw(current),
            cause: ChangeCause::Disconnected,
            rule_index: None,
            topic: None,
            payload: None,
        }
    }

    #[test]
    fn override_detection() {
        assert!(change(2, 3, 0).was_overridden());
        assert!(!change(2, 3, 3).was_overridden());
    }

    #[test]
    fn came_online_only_from_offline() {
        assert!(change(0, 1, 1).came_online());
        assert!(!change(1, 2, 2).came_online());
        assert!(!change(0, 0, 0).came_online());
    }

    #[test]
    fn serializes_cause_by_name() {
        let json = serde_json::to_value(change(2, 0, 0)).unwrap();
        assert_eq!(json["cause"], "Disconnected");
        assert_eq!(json["previous"], 2);
        assert!(json["rule_index"].is_null());
    }
}
